use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::amount::{Amount, Price};
use crate::codec::{CanonicalMessage, CanonicalPayload, SignedMessage};
use crate::error::{Error, Result};
use crate::ledger::LedgerBackend;
use crate::pricing::PricingPolicy;
use crate::rfq::Rfq;

/// Default lifetime of a firm quote, in seconds.
pub const DEFAULT_QUOTE_TTL_SECS: u64 = 120;

/// A dealer's firm, signed answer to one RFQ.
///
/// Unlike the RFQ's approximate size, both amounts here are exact: they are
/// what ends up in the settlement transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub rfq_id: String,
    pub dealer_id: String,
    pub dealer_address: String,
    pub exact_amount_sell: Amount,
    pub exact_amount_buy: Amount,
    /// `round8(exact_amount_buy / exact_amount_sell)`
    pub price: Price,
    /// Unix timestamp (seconds); always before the RFQ's own expiry.
    pub expiry: i64,
    pub signature: String,
}

impl Quote {
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expiry
    }

    pub fn ensure_live(&self, now: i64) -> Result<()> {
        if self.is_expired_at(now) {
            return Err(Error::Expired {
                kind: Self::KIND,
                expiry: self.expiry,
                now,
            });
        }
        Ok(())
    }

    /// Whether `price` is exactly `round8(buy / sell)`.
    pub fn price_is_consistent(&self) -> bool {
        Price::ratio(self.exact_amount_buy, self.exact_amount_sell)
            .map(|p| p == self.price)
            .unwrap_or(false)
    }
}

impl CanonicalMessage for Quote {
    const KIND: &'static str = "quote";

    fn canonical_payload(&self) -> CanonicalPayload {
        CanonicalPayload::new()
            .text("rfq_id", &self.rfq_id)
            .text("dealer_id", &self.dealer_id)
            .text("dealer_address", &self.dealer_address)
            .text("exact_amount_sell", self.exact_amount_sell)
            .text("exact_amount_buy", self.exact_amount_buy)
            .text("price", self.price)
            .integer("expiry", self.expiry)
    }
}

impl SignedMessage for Quote {
    fn signer_address(&self) -> &str {
        &self.dealer_address
    }

    fn signature(&self) -> &str {
        &self.signature
    }
}

/// A dealer desk: identity, settlement address and pricing.
///
/// Holds no mutable state, so several dealers can price the same RFQ
/// concurrently.
#[derive(Debug, Clone)]
pub struct Dealer {
    pub id: String,
    pub address: String,
    pub policy: PricingPolicy,
    pub quote_ttl_secs: u64,
}

impl Dealer {
    pub fn new(id: impl Into<String>, address: impl Into<String>, policy: PricingPolicy) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            policy,
            quote_ttl_secs: DEFAULT_QUOTE_TTL_SECS,
        }
    }

    pub fn with_quote_ttl(mut self, secs: u64) -> Self {
        self.quote_ttl_secs = secs;
        self
    }

    /// Price `rfq` and return a signed quote, or `None` to decline.
    pub fn process_rfq<L: LedgerBackend + ?Sized>(
        &self,
        ledger: &L,
        rfq: &Rfq,
    ) -> Result<Option<Quote>> {
        self.process_rfq_at(ledger, rfq, Utc::now().timestamp())
    }

    /// Same as [`Dealer::process_rfq`] with an explicit clock reading.
    ///
    /// Declines when the RFQ has expired, when the pair is not traded, when
    /// the priced amount rounds to zero, or when no quote expiry fits before
    /// the RFQ's.
    pub fn process_rfq_at<L: LedgerBackend + ?Sized>(
        &self,
        ledger: &L,
        rfq: &Rfq,
        now: i64,
    ) -> Result<Option<Quote>> {
        if rfq.is_expired_at(now) {
            log::debug!("{}: rfq {} expired, declining", self.id, rfq.id);
            return Ok(None);
        }
        let Some(pair) = self.policy.lookup(&rfq.asset_sell, &rfq.asset_buy) else {
            log::debug!(
                "{}: no market for {}/{}, declining rfq {}",
                self.id,
                rfq.asset_sell,
                rfq.asset_buy,
                rfq.id
            );
            return Ok(None);
        };
        let pair = pair?;

        let exact_amount_sell = rfq.approx_amount;
        let exact_amount_buy = exact_amount_sell.mul_rounded(pair.rate)?;
        if exact_amount_buy.is_zero() {
            log::debug!("{}: rfq {} prices to zero, declining", self.id, rfq.id);
            return Ok(None);
        }
        let price = Price::ratio(exact_amount_buy, exact_amount_sell)?;

        let ttl = i64::try_from(self.quote_ttl_secs).unwrap_or(i64::MAX);
        let expiry = now.saturating_add(ttl).min(rfq.expiry - 1);
        if expiry <= now {
            log::debug!("{}: no room before rfq {} expiry", self.id, rfq.id);
            return Ok(None);
        }

        let mut quote = Quote {
            rfq_id: rfq.id.clone(),
            dealer_id: self.id.clone(),
            dealer_address: self.address.clone(),
            exact_amount_sell,
            exact_amount_buy,
            price,
            expiry,
            signature: String::new(),
        };
        let message = quote.canonical_message()?;
        quote.signature = ledger
            .sign_message(&self.address, &message)
            .map_err(|e| Error::Signing(e.to_string()))?;

        log::info!(
            "{}: quoting rfq {}: {} -> {} ({:?} @ {})",
            self.id,
            rfq.id,
            quote.exact_amount_sell,
            quote.exact_amount_buy,
            pair.side,
            quote.price
        );
        Ok(Some(quote))
    }
}
