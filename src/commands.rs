use std::fs;
use std::path::Path;

use otc_sdk::{
    Amount, CreateRfqParams, ElementsRpcClient, Error, LedgerBackend, Market, OutputRole, Price,
    PricingPolicy, Quote, Rfq, SettlementPlan, SettlementSigners, TxOutput, collect_quotes_at,
    create_rfq_at, ensure_quote_valid, ensure_rfq_valid, execute_settlement, plan_settlement,
    prepare_settlement, select_best_quote, settle,
};
use otc_sdk::{AssetId, Dealer};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::AppConfig;
use crate::error::AppError;

// ============================================================================
// Message files
// ============================================================================

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let contents = fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
    serde_json::from_str(&contents)
        .map_err(|e| AppError::InvalidArgument(format!("{}: {e}", path.display())))
}

/// Pretty-print `value` to `out`, or return it for stdout when `out` is `None`.
pub fn write_json<T: Serialize>(value: &T, out: Option<&Path>) -> Result<String, AppError> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(path) = out {
        fs::write(path, &json).map_err(|e| AppError::io(path, e))?;
        log::info!("wrote {}", path.display());
    }
    Ok(json)
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub kind: String,
    pub id: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSummary {
    pub party: String,
    pub txid: String,
    pub vout: u32,
    pub asset: AssetId,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSummary {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub asset: AssetId,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub rfq_id: String,
    pub dealer_id: String,
    pub protected_address: String,
    pub protection_descriptor: String,
    pub fee: Amount,
    pub dealer_change: Amount,
    pub client_change: Amount,
    pub inputs: Vec<InputSummary>,
    pub outputs: Vec<OutputSummary>,
}

impl From<&SettlementPlan> for PlanSummary {
    fn from(plan: &SettlementPlan) -> Self {
        Self {
            rfq_id: plan.rfq_id.clone(),
            dealer_id: plan.dealer_id.clone(),
            protected_address: plan.protected_address.clone(),
            protection_descriptor: plan.protection_descriptor.clone(),
            fee: plan.fee,
            dealer_change: plan.dealer_change,
            client_change: plan.client_change,
            inputs: plan
                .inputs
                .iter()
                .map(|input| InputSummary {
                    party: input.party.to_string(),
                    txid: input.utxo.txid.to_string(),
                    vout: input.utxo.vout,
                    asset: input.utxo.asset,
                    amount: input.utxo.amount,
                })
                .collect(),
            outputs: plan
                .outputs
                .iter()
                .map(|planned| OutputSummary {
                    role: role_label(planned.role).to_string(),
                    address: match &planned.output {
                        TxOutput::Payment { address, .. } => Some(address.clone()),
                        TxOutput::Fee { .. } => None,
                    },
                    asset: planned.output.asset(),
                    amount: planned.output.amount(),
                })
                .collect(),
        }
    }
}

fn role_label(role: OutputRole) -> &'static str {
    match role {
        OutputRole::ClientReceive => "client_receive",
        OutputRole::DealerProtected => "dealer_protected",
        OutputRole::DealerChange => "dealer_change",
        OutputRole::ClientChange => "client_change",
        OutputRole::Fee => "fee",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleResponse {
    /// `None` for a dry run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
    pub quote: Quote,
    pub plan: PlanSummary,
}

// ============================================================================
// Commands
// ============================================================================

pub struct CreateRfqRequest<'a> {
    pub sell: &'a str,
    pub buy: &'a str,
    pub amount: &'a str,
    pub ttl_secs: Option<u64>,
}

pub fn create_rfq_command<L: LedgerBackend + ?Sized>(
    ledger: &L,
    config: &AppConfig,
    request: &CreateRfqRequest<'_>,
    now: i64,
) -> Result<Rfq, AppError> {
    if config.client.address.is_empty() {
        return Err(AppError::Config("client.address is not set".into()));
    }
    let approx_amount = Amount::parse_rounded(request.amount)
        .map_err(|e| AppError::InvalidArgument(format!("amount {:?}: {e}", request.amount)))?;
    let params = CreateRfqParams {
        client_address: config.client.address.clone(),
        asset_sell: config.resolve_asset(request.sell)?,
        asset_buy: config.resolve_asset(request.buy)?,
        approx_amount,
        expiry_seconds: request.ttl_secs.unwrap_or(config.rfq_ttl_secs),
    };
    let rfq = create_rfq_at(ledger, &params, now)?;
    log::info!("created rfq {} expiring at {}", rfq.id, rfq.expiry);
    Ok(rfq)
}

/// Answer `rfq` as the configured dealer `dealer_id`. `None` means the
/// dealer declines.
pub fn quote_command<L: LedgerBackend + ?Sized>(
    ledger: &L,
    config: &AppConfig,
    rfq: &Rfq,
    dealer_id: &str,
    now: i64,
) -> Result<Option<Quote>, AppError> {
    let dealer = config.dealer(dealer_id)?;
    ensure_rfq_valid(ledger, rfq, now)?;
    Ok(dealer.process_rfq_at(ledger, rfq, now)?)
}

pub fn verify_rfq_command<L: LedgerBackend + ?Sized>(
    ledger: &L,
    rfq: &Rfq,
    now: i64,
) -> Result<VerifyResponse, AppError> {
    verdict("rfq", &rfq.id, ensure_rfq_valid(ledger, rfq, now))
}

pub fn verify_quote_command<L: LedgerBackend + ?Sized>(
    ledger: &L,
    quote: &Quote,
    now: i64,
) -> Result<VerifyResponse, AppError> {
    let id = format!("{}/{}", quote.rfq_id, quote.dealer_id);
    verdict("quote", &id, ensure_quote_valid(ledger, quote, now))
}

/// Expired and badly signed messages are a verdict; node failures are errors.
fn verdict(kind: &str, id: &str, outcome: otc_sdk::Result<()>) -> Result<VerifyResponse, AppError> {
    let reason = match outcome {
        Ok(()) => None,
        Err(e @ (Error::Expired { .. } | Error::SignatureInvalid { .. })) => Some(e.to_string()),
        Err(e) => return Err(e.into()),
    };
    Ok(VerifyResponse {
        kind: kind.to_string(),
        id: id.to_string(),
        valid: reason.is_none(),
        reason,
    })
}

/// `ledger` is the client's wallet view; the winning dealer's wallet comes
/// from the dealer's `wallet` in the config.
pub fn settle_command<L: LedgerBackend>(
    ledger: &L,
    config: &AppConfig,
    rfq: &Rfq,
    quotes: &[Quote],
    dry_run: bool,
    now: i64,
) -> Result<SettleResponse, AppError> {
    let policy = config.settlement_policy();
    let signers = config.signer_book();
    if dry_run {
        let (quote, plan) = prepare_settlement(ledger, rfq, quotes, &policy, &signers, now)?;
        return Ok(SettleResponse {
            txid: None,
            plan: PlanSummary::from(&plan),
            quote,
        });
    }
    let receipt = settle(ledger, rfq, quotes, &policy, &signers, now)?;
    Ok(SettleResponse {
        txid: Some(receipt.txid),
        plan: PlanSummary::from(&receipt.plan),
        quote: receipt.quote,
    })
}

// ============================================================================
// Regtest demo
// ============================================================================

const DEMO_MID_PRICE: &str = "50000";
const DEMO_ISSUANCE: u64 = 200_000;
const DEMO_DEALER_FUNDING: u64 = 100_000;

#[derive(Debug, Clone, Serialize)]
pub struct DemoReport {
    pub lbtc: AssetId,
    pub usdt: AssetId,
    pub client_address: String,
    pub rfq: Rfq,
    pub quotes: Vec<Quote>,
    pub best: Quote,
    pub plan: PlanSummary,
    pub txid: String,
}

fn demo_dealer(
    id: &str,
    address: String,
    lbtc: AssetId,
    usdt: AssetId,
    spread: Decimal,
    quote_ttl_secs: u64,
) -> Result<Dealer, AppError> {
    let mid_price: Price = DEMO_MID_PRICE
        .parse()
        .map_err(|e| AppError::InvalidArgument(format!("mid price: {e}")))?;
    let policy = PricingPolicy::new().with_market(Market {
        base: lbtc,
        quote: usdt,
        mid_price,
        spread,
    })?;
    Ok(Dealer::new(id, address, policy).with_quote_ttl(quote_ttl_secs))
}

fn parse_asset(value: &Value) -> Result<AssetId, AppError> {
    value
        .as_str()
        .ok_or_else(|| AppError::InvalidArgument(format!("expected asset id, got {value}")))?
        .parse()
        .map_err(AppError::InvalidArgument)
}

/// Run the whole flow against a regtest node: fund one client and two
/// dealers from the node wallet, sell 1 L-BTC for a freshly issued test
/// asset and settle with the better of two quotes.
pub fn demo_command(
    rpc: &ElementsRpcClient,
    config: &AppConfig,
    now: impl Fn() -> i64,
) -> Result<DemoReport, AppError> {
    let client_address: String = rpc.call("getnewaddress", vec![json!("client"), json!("bech32")])?;
    let alpha_address: String = rpc.call("getnewaddress", vec![json!("dealer1"), json!("bech32")])?;
    let beta_address: String = rpc.call("getnewaddress", vec![json!("dealer2"), json!("bech32")])?;
    log::info!("client {client_address}, dealers {alpha_address} / {beta_address}");

    let _: Value = rpc.call("generatetoaddress", vec![json!(101), json!(client_address)])?;

    let labels: Value = rpc.call("dumpassetlabels", vec![])?;
    let lbtc = parse_asset(&labels["bitcoin"])?;
    let issuance: Value = rpc.call("issueasset", vec![json!(DEMO_ISSUANCE), json!(0)])?;
    let usdt = parse_asset(&issuance["asset"])?;
    log::info!("L-BTC {lbtc}, test asset {usdt}");

    for address in [&alpha_address, &beta_address] {
        let _: String = rpc.call(
            "sendtoaddress",
            vec![
                json!(address),
                json!(DEMO_DEALER_FUNDING),
                json!(""),
                json!(""),
                json!(false),
                json!(false),
                json!(1),
                json!("UNSET"),
                json!(false),
                json!(usdt.to_string()),
            ],
        )?;
    }
    let _: Value = rpc.call("generatetoaddress", vec![json!(1), json!(client_address)])?;

    let params = CreateRfqParams {
        client_address: client_address.clone(),
        asset_sell: lbtc,
        asset_buy: usdt,
        approx_amount: Amount::from_sat(100_000_000),
        expiry_seconds: config.rfq_ttl_secs,
    };
    let rfq = create_rfq_at(rpc, &params, now())?;
    log::info!("rfq {} for ~{} L-BTC", rfq.id, rfq.approx_amount);

    let dealers = [
        demo_dealer(
            "Dealer_Alpha",
            alpha_address,
            lbtc,
            usdt,
            Decimal::new(1, 3),
            config.quote_ttl_secs,
        )?,
        demo_dealer(
            "Dealer_Beta",
            beta_address,
            lbtc,
            usdt,
            Decimal::new(15, 4),
            config.quote_ttl_secs,
        )?,
    ];
    let quotes: Vec<Quote> = collect_quotes_at(rpc, &rfq, &dealers, now())
        .into_iter()
        .filter_map(|response| response.outcome.ok().flatten())
        .collect();
    for quote in &quotes {
        log::info!(
            "{} quotes {} ({} for {})",
            quote.dealer_id,
            quote.price,
            quote.exact_amount_buy,
            quote.exact_amount_sell
        );
    }

    let best = select_best_quote(rpc, &rfq, &quotes, now())
        .ok_or_else(|| AppError::Sdk(Error::InvalidQuote("no dealer quoted".into())))?;
    let mut policy = config.settlement_policy();
    policy.fee_asset = Some(lbtc);
    let plan = plan_settlement(rpc, &rfq, &best, &policy, now())?;

    // every demo address lives in the node's default wallet
    let signers = SettlementSigners::new("", "");
    let txid = execute_settlement(rpc, &plan, &signers)?;
    let _: Value = rpc.call("generatetoaddress", vec![json!(1), json!(client_address)])?;

    Ok(DemoReport {
        lbtc,
        usdt,
        client_address,
        plan: PlanSummary::from(&plan),
        rfq,
        quotes,
        best,
        txid,
    })
}
