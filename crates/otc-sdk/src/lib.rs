pub use lwk_wollet::elements;

pub mod amount;
pub mod asset;
pub mod codec;
pub mod error;
pub mod ledger;
pub mod negotiation;
pub mod network;
pub mod pricing;
pub mod quote;
pub mod rfq;
pub mod rpc;
pub mod settlement;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod verify;

// Core types
pub use amount::{Amount, AmountError, Price};
pub use asset::AssetId;
pub use codec::{CanonicalMessage, CanonicalPayload, SignedMessage};
pub use error::{Error, Party, Result};
pub use network::Network;

// Capability interface and the Elements node implementation
pub use ledger::{
    AddressInfo, FinalizedTx, InputMetadata, LedgerBackend, ProtectedAddress, ProtectionRequest,
    SignedTx, TxInput, TxOutput, Utxo,
};
pub use rpc::{ElementsRpcClient, RpcConfig};

// Negotiation
pub use negotiation::{DealerResponse, collect_quotes, collect_quotes_at, select_best_quote};
pub use pricing::{Market, PairQuote, PricingPolicy, QuoteSide};
pub use quote::{Dealer, Quote};
pub use rfq::{CreateRfqParams, Rfq, create_rfq, create_rfq_at};
pub use verify::{ensure_quote_valid, ensure_rfq_valid, verify_quote, verify_rfq};

// Settlement
pub use settlement::{
    OutputRole, PlannedInput, PlannedOutput, ProtectionPolicy, SettlementPlan, SettlementPolicy,
    SettlementReceipt, SettlementSigners, SignerBook, execute_settlement, plan_settlement,
    plan_settlement_with, prepare_settlement, settle,
};

// Re-export LWK for app-layer use
pub use lwk_wollet;
