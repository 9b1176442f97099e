use std::collections::BTreeMap;

use crate::amount::{Amount, AmountError};
use crate::asset::AssetId;
use crate::error::{Error, Party, Result};
use crate::ledger::{InputMetadata, LedgerBackend, TxInput, TxOutput, Utxo};
use crate::quote::Quote;
use crate::rfq::Rfq;
use crate::settlement::protection::{DEFAULT_CSV_DELAY, ProtectionPolicy};

/// Flat network fee, in the sell asset.
pub const DEFAULT_FEE_SATS: u64 = 1_000;

/// Fee and timelock parameters applied to every settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPolicy {
    /// Paid entirely from the client's leg.
    pub fee: Amount,
    /// Confirmations before the client may reclaim the dealer's leg.
    pub csv_delay: u16,
    /// When set, the client's sell asset must be this asset.
    pub fee_asset: Option<AssetId>,
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        Self {
            fee: Amount::from_sat(DEFAULT_FEE_SATS),
            csv_delay: DEFAULT_CSV_DELAY,
            fee_asset: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputRole {
    ClientReceive,
    DealerProtected,
    DealerChange,
    ClientChange,
    Fee,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedInput {
    pub party: Party,
    pub utxo: Utxo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOutput {
    pub role: OutputRole,
    pub output: TxOutput,
}

/// The transaction shape for one settlement attempt.
///
/// ```text
/// Inputs:  [0] dealer UTXO (asset_buy)
///          [1] client UTXO (asset_sell)
/// Outputs: [0] client receives exact_amount_buy
///          [1] protected dealer address receives exact_amount_sell
///          [2] dealer change (if any)
///          [3] client change (if any)
///          [4] fee
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlan {
    pub rfq_id: String,
    pub dealer_id: String,
    pub inputs: Vec<PlannedInput>,
    pub outputs: Vec<PlannedOutput>,
    pub protection_descriptor: String,
    pub protected_address: String,
    pub fee: Amount,
    pub dealer_change: Amount,
    pub client_change: Amount,
}

impl SettlementPlan {
    pub fn tx_inputs(&self) -> Vec<TxInput> {
        self.inputs
            .iter()
            .map(|i| TxInput {
                txid: i.utxo.txid,
                vout: i.utxo.vout,
            })
            .collect()
    }

    pub fn tx_outputs(&self) -> Vec<TxOutput> {
        self.outputs.iter().map(|o| o.output.clone()).collect()
    }

    pub fn input_metadata(&self) -> Vec<InputMetadata> {
        self.inputs.iter().map(|i| InputMetadata::from(&i.utxo)).collect()
    }

    pub fn output(&self, role: OutputRole) -> Option<&TxOutput> {
        self.outputs
            .iter()
            .find(|o| o.role == role)
            .map(|o| &o.output)
    }

    /// Per-asset sum of inputs equals per-asset sum of outputs (fee included).
    pub fn is_balanced(&self) -> bool {
        let totals = |items: &mut dyn Iterator<Item = (AssetId, Amount)>| {
            let mut sums: BTreeMap<AssetId, Amount> = BTreeMap::new();
            for (asset, amount) in items {
                let entry = sums.entry(asset).or_default();
                match entry.checked_add(amount) {
                    Ok(sum) => *entry = sum,
                    Err(_) => return None,
                }
            }
            Some(sums)
        };
        let ins = totals(&mut self.inputs.iter().map(|i| (i.utxo.asset, i.utxo.amount)));
        let outs = totals(&mut self.outputs.iter().map(|o| (o.output.asset(), o.output.amount())));
        matches!((ins, outs), (Some(a), Some(b)) if a == b)
    }
}

/// Select inputs, compute change and fee, and lay out the settlement outputs.
///
/// Both messages must already have passed signature verification; this only
/// re-checks expiry, that the quote answers `rfq`, and the fee policy. Each
/// leg is funded by the first listed UTXO of the right asset large enough on
/// its own; nothing is aggregated or reserved.
///
/// Every lookup goes through `ledger`, so it must see both parties' wallets.
/// Use [`plan_settlement_with`] when client and dealer keep separate wallets.
pub fn plan_settlement<L: LedgerBackend + ?Sized>(
    ledger: &L,
    rfq: &Rfq,
    quote: &Quote,
    policy: &SettlementPolicy,
    now: i64,
) -> Result<SettlementPlan> {
    plan_settlement_with(ledger, ledger, rfq, quote, policy, now)
}

/// [`plan_settlement`] with the dealer's UTXOs and key material looked up
/// through `dealer_ledger` and everything else through `client_ledger`.
pub fn plan_settlement_with<C, D>(
    client_ledger: &C,
    dealer_ledger: &D,
    rfq: &Rfq,
    quote: &Quote,
    policy: &SettlementPolicy,
    now: i64,
) -> Result<SettlementPlan>
where
    C: LedgerBackend + ?Sized,
    D: LedgerBackend + ?Sized,
{
    rfq.ensure_live(now)?;
    quote.ensure_live(now)?;
    if quote.rfq_id != rfq.id {
        return Err(Error::QuoteMismatch {
            rfq_id: rfq.id.clone(),
            quote_rfq_id: quote.rfq_id.clone(),
        });
    }
    if quote.exact_amount_sell.is_zero() || quote.exact_amount_buy.is_zero() {
        return Err(Error::InvalidQuote("quote amounts must be positive".into()));
    }
    if !quote.price_is_consistent() {
        return Err(Error::InvalidQuote(format!(
            "price {} does not match {} / {}",
            quote.price, quote.exact_amount_buy, quote.exact_amount_sell
        )));
    }
    if policy.fee.is_zero() {
        return Err(Error::FeePolicy("fee must be positive".into()));
    }
    if let Some(fee_asset) = policy.fee_asset
        && fee_asset != rfq.asset_sell
    {
        return Err(Error::FeePolicy(format!(
            "fee is paid in {fee_asset} but the client sells {}",
            rfq.asset_sell
        )));
    }

    let dealer_utxo = select_utxo(
        dealer_ledger,
        Party::Dealer,
        &quote.dealer_address,
        rfq.asset_buy,
        quote.exact_amount_buy,
    )?;
    let client_required = quote.exact_amount_sell.checked_add(policy.fee)?;
    let client_utxo = select_utxo(
        client_ledger,
        Party::Client,
        &rfq.client_address,
        rfq.asset_sell,
        client_required,
    )?;

    let dealer_change = change(dealer_utxo.amount, quote.exact_amount_buy, Party::Dealer)?;
    let client_change = change(client_utxo.amount, client_required, Party::Client)?;

    let dealer_info = dealer_ledger.address_info(&quote.dealer_address)?;
    let client_info = client_ledger.address_info(&rfq.client_address)?;
    let protection =
        ProtectionPolicy::new(&dealer_info.pubkey, &client_info.pubkey, policy.csv_delay)?;
    let protected = client_ledger
        .derive_protected_address(&protection.request(dealer_info.confidential_key))?;
    if !protection.matches(&protected.descriptor) {
        return Err(Error::Descriptor(format!(
            "derived descriptor {} does not match {}",
            protected.descriptor,
            protection.descriptor()
        )));
    }

    let mut outputs = vec![
        PlannedOutput {
            role: OutputRole::ClientReceive,
            output: TxOutput::Payment {
                address: rfq.client_address.clone(),
                amount: quote.exact_amount_buy,
                asset: rfq.asset_buy,
            },
        },
        PlannedOutput {
            role: OutputRole::DealerProtected,
            output: TxOutput::Payment {
                address: protected.address.clone(),
                amount: quote.exact_amount_sell,
                asset: rfq.asset_sell,
            },
        },
    ];
    if !dealer_change.is_zero() {
        outputs.push(PlannedOutput {
            role: OutputRole::DealerChange,
            output: TxOutput::Payment {
                address: quote.dealer_address.clone(),
                amount: dealer_change,
                asset: rfq.asset_buy,
            },
        });
    }
    if !client_change.is_zero() {
        outputs.push(PlannedOutput {
            role: OutputRole::ClientChange,
            output: TxOutput::Payment {
                address: rfq.client_address.clone(),
                amount: client_change,
                asset: rfq.asset_sell,
            },
        });
    }
    outputs.push(PlannedOutput {
        role: OutputRole::Fee,
        output: TxOutput::Fee {
            amount: policy.fee,
            asset: rfq.asset_sell,
        },
    });

    let plan = SettlementPlan {
        rfq_id: rfq.id.clone(),
        dealer_id: quote.dealer_id.clone(),
        inputs: vec![
            PlannedInput {
                party: Party::Dealer,
                utxo: dealer_utxo,
            },
            PlannedInput {
                party: Party::Client,
                utxo: client_utxo,
            },
        ],
        outputs,
        protection_descriptor: protection.descriptor(),
        protected_address: protected.address,
        fee: policy.fee,
        dealer_change,
        client_change,
    };
    log::info!(
        "planned settlement of rfq {} with {}: {} inputs, {} outputs, fee {}",
        plan.rfq_id,
        plan.dealer_id,
        plan.inputs.len(),
        plan.outputs.len(),
        plan.fee
    );
    Ok(plan)
}

/// First listed UTXO of `asset` holding at least `required`.
fn select_utxo<L: LedgerBackend + ?Sized>(
    ledger: &L,
    party: Party,
    address: &str,
    asset: AssetId,
    required: Amount,
) -> Result<Utxo> {
    ledger
        .list_utxos(address, Some(&asset))?
        .into_iter()
        .find(|u| u.asset == asset && u.amount >= required)
        .ok_or(Error::InsufficientFunds {
            party,
            asset,
            required,
        })
}

fn change(available: Amount, spent: Amount, party: Party) -> Result<Amount> {
    available.checked_sub(spent).map_err(|e| match e {
        AmountError::Negative => {
            Error::FeePolicy(format!("{party} change would be negative ({available} < {spent})"))
        }
        other => Error::Amount(other),
    })
}
