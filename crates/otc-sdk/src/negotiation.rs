use chrono::Utc;
use rayon::prelude::*;

use crate::error::Result;
use crate::ledger::LedgerBackend;
use crate::quote::{Dealer, Quote};
use crate::rfq::Rfq;
use crate::verify::{ensure_rfq_valid, verify_quote};

/// Outcome of offering one RFQ to one dealer.
#[derive(Debug)]
pub struct DealerResponse {
    pub dealer_id: String,
    pub outcome: Result<Option<Quote>>,
}

/// Offer `rfq` to every dealer concurrently.
///
/// Each dealer checks the RFQ's signature and expiry before pricing it. A
/// failing dealer does not affect the others; responses come back in the
/// same order as `dealers`.
pub fn collect_quotes<L>(ledger: &L, rfq: &Rfq, dealers: &[Dealer]) -> Vec<DealerResponse>
where
    L: LedgerBackend + Sync + ?Sized,
{
    collect_quotes_at(ledger, rfq, dealers, Utc::now().timestamp())
}

pub fn collect_quotes_at<L>(
    ledger: &L,
    rfq: &Rfq,
    dealers: &[Dealer],
    now: i64,
) -> Vec<DealerResponse>
where
    L: LedgerBackend + Sync + ?Sized,
{
    dealers
        .par_iter()
        .map(|dealer| {
            let outcome = ensure_rfq_valid(ledger, rfq, now)
                .and_then(|()| dealer.process_rfq_at(ledger, rfq, now));
            if let Err(e) = &outcome {
                log::warn!("dealer {} failed on rfq {}: {e}", dealer.id, rfq.id);
            }
            DealerResponse {
                dealer_id: dealer.id.clone(),
                outcome,
            }
        })
        .collect()
}

/// Pick the quote giving the client the most of its buy asset.
///
/// Quotes that answer another RFQ, disagree with the RFQ's amount, carry an
/// inconsistent price, have expired, or fail signature verification are
/// skipped. A quote whose verification cannot run is skipped too, with a
/// warning. Ties go to the lexicographically smallest dealer id.
pub fn select_best_quote<L: LedgerBackend + ?Sized>(
    ledger: &L,
    rfq: &Rfq,
    quotes: &[Quote],
    now: i64,
) -> Option<Quote> {
    quotes
        .iter()
        .filter(|q| {
            let usable = q.rfq_id == rfq.id
                && q.exact_amount_sell == rfq.approx_amount
                && q.price_is_consistent()
                && !q.is_expired_at(now)
                && match verify_quote(ledger, q) {
                    Ok(valid) => valid,
                    Err(e) => {
                        log::warn!("cannot verify quote from {}: {e}", q.dealer_id);
                        false
                    }
                };
            if !usable {
                log::debug!("skipping quote from {} for rfq {}", q.dealer_id, rfq.id);
            }
            usable
        })
        .max_by(|a, b| {
            a.exact_amount_buy
                .cmp(&b.exact_amount_buy)
                .then_with(|| b.dealer_id.cmp(&a.dealer_id))
        })
        .cloned()
}
