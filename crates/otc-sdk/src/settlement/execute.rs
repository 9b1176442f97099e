use crate::error::{Error, Party, Result};
use crate::ledger::LedgerBackend;
use crate::settlement::plan::SettlementPlan;

/// Who signs each side of the settlement, in the backend's terms (a wallet
/// name for an Elements node).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementSigners {
    pub dealer: String,
    pub client: String,
}

impl SettlementSigners {
    pub fn new(dealer: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            dealer: dealer.into(),
            client: client.into(),
        }
    }
}

/// Turn a plan into a broadcast transaction and return its txid.
///
/// ```text
/// build -> attach metadata -> blind -> dealer signs -> client signs
///       -> finalize -> broadcast
/// ```
///
/// Steps run strictly in order and nothing is retried: on any failure the
/// caller decides whether to re-plan.
pub fn execute_settlement<L: LedgerBackend + ?Sized>(
    ledger: &L,
    plan: &SettlementPlan,
    signers: &SettlementSigners,
) -> Result<String> {
    let rfq_id = &plan.rfq_id;

    let skeleton = ledger.build_transaction(&plan.tx_inputs(), &plan.tx_outputs())?;
    log::info!("settlement {rfq_id}: built transaction");

    let enriched = ledger.attach_input_metadata(&skeleton, &plan.input_metadata())?;
    log::info!("settlement {rfq_id}: attached input metadata");

    let blinded = ledger.blind(&enriched)?;
    log::info!("settlement {rfq_id}: blinded outputs");

    // The dealer cannot complete the transaction alone; an unchanged
    // transaction means it added nothing.
    let dealer_signed = ledger.partial_sign(&blinded, &signers.dealer)?;
    if dealer_signed.tx == blinded {
        return Err(Error::IncompleteSignature(Party::Dealer));
    }
    log::info!("settlement {rfq_id}: dealer signed");

    let client_signed = ledger.partial_sign(&dealer_signed.tx, &signers.client)?;
    if !client_signed.complete {
        return Err(Error::IncompleteSignature(Party::Client));
    }
    log::info!("settlement {rfq_id}: client signed");

    let finalized = ledger.finalize(&client_signed.tx)?;
    if !finalized.complete {
        return Err(Error::Finalization);
    }

    let txid = ledger.broadcast(&finalized.hex)?;
    log::info!("settlement {rfq_id}: broadcast {txid}");
    Ok(txid)
}
