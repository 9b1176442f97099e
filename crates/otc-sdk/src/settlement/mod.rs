//! Turning a winning quote into one atomic, confidential transaction.

pub mod execute;
pub mod plan;
pub mod protection;

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::ledger::LedgerBackend;
use crate::negotiation::select_best_quote;
use crate::quote::Quote;
use crate::rfq::Rfq;
use crate::verify::ensure_rfq_valid;

pub use execute::{SettlementSigners, execute_settlement};
pub use plan::{
    OutputRole, PlannedInput, PlannedOutput, SettlementPlan, SettlementPolicy, plan_settlement,
    plan_settlement_with,
};
pub use protection::ProtectionPolicy;

/// Signing identities for the client and every dealer it may trade with,
/// keyed by dealer id.
#[derive(Debug, Clone, Default)]
pub struct SignerBook {
    pub client: String,
    pub dealers: HashMap<String, String>,
}

impl SignerBook {
    pub fn new(client: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            dealers: HashMap::new(),
        }
    }

    pub fn with_dealer(mut self, dealer_id: impl Into<String>, signer: impl Into<String>) -> Self {
        self.dealers.insert(dealer_id.into(), signer.into());
        self
    }

    pub fn signers_for(&self, quote: &Quote) -> Result<SettlementSigners> {
        let dealer = self.dealers.get(&quote.dealer_id).ok_or_else(|| {
            Error::InvalidQuote(format!("no signer known for dealer {}", quote.dealer_id))
        })?;
        Ok(SettlementSigners::new(dealer.clone(), self.client.clone()))
    }
}

/// Result of a completed settlement.
#[derive(Debug, Clone)]
pub struct SettlementReceipt {
    pub txid: String,
    pub quote: Quote,
    pub plan: SettlementPlan,
}

/// Verify the RFQ, pick the best quote and plan against it, without
/// touching the chain.
///
/// `ledger` is the client's view. The winning dealer's UTXOs and keys are
/// looked up through that dealer's wallet from `signers`.
pub fn prepare_settlement<L: LedgerBackend>(
    ledger: &L,
    rfq: &Rfq,
    quotes: &[Quote],
    policy: &SettlementPolicy,
    signers: &SignerBook,
    now: i64,
) -> Result<(Quote, SettlementPlan)> {
    ensure_rfq_valid(ledger, rfq, now)?;
    let quote = select_best_quote(ledger, rfq, quotes, now)
        .ok_or_else(|| Error::InvalidQuote(format!("no usable quote for rfq {}", rfq.id)))?;
    log::info!(
        "rfq {}: best quote from {} ({} for {})",
        rfq.id,
        quote.dealer_id,
        quote.exact_amount_buy,
        quote.exact_amount_sell
    );
    let dealer_ledger = ledger.wallet_view(&signers.signers_for(&quote)?.dealer)?;
    let plan = plan_settlement_with(ledger, &dealer_ledger, rfq, &quote, policy, now)?;
    Ok((quote, plan))
}

/// The client-side flow end to end: verify, select, plan, execute.
pub fn settle<L: LedgerBackend>(
    ledger: &L,
    rfq: &Rfq,
    quotes: &[Quote],
    policy: &SettlementPolicy,
    signers: &SignerBook,
    now: i64,
) -> Result<SettlementReceipt> {
    let (quote, plan) = prepare_settlement(ledger, rfq, quotes, policy, signers, now)?;
    let settlement_signers = signers.signers_for(&quote)?;
    let txid = execute_settlement(ledger, &plan, &settlement_signers)?;
    Ok(SettlementReceipt { txid, quote, plan })
}
