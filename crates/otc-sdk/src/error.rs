use thiserror::Error;

use crate::amount::{Amount, AmountError};
use crate::asset::AssetId;

/// Which side of the trade an error or step refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Party {
    Client,
    Dealer,
}

impl std::fmt::Display for Party {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Party::Client => write!(f, "client"),
            Party::Dealer => write!(f, "dealer"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind} expired at {expiry} (now {now})")]
    Expired {
        kind: &'static str,
        expiry: i64,
        now: i64,
    },

    #[error("signature invalid for {kind} from {address}")]
    SignatureInvalid { kind: &'static str, address: String },

    #[error("insufficient funds: no {party} UTXO of asset {asset} holding at least {required}")]
    InsufficientFunds {
        party: Party,
        asset: AssetId,
        required: Amount,
    },

    #[error("fee policy violation: {0}")]
    FeePolicy(String),

    #[error("incomplete signature after {0} signing step")]
    IncompleteSignature(Party),

    #[error("finalized transaction is incomplete")]
    Finalization,

    #[error("protected address import failed: {0}")]
    DescriptorImport(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("amount error: {0}")]
    Amount(#[from] AmountError),

    #[error("invalid RFQ: {0}")]
    InvalidRfq(String),

    #[error("invalid quote: {0}")]
    InvalidQuote(String),

    #[error("quote {quote_rfq_id} does not answer RFQ {rfq_id}")]
    QuoteMismatch { rfq_id: String, quote_rfq_id: String },

    #[error("descriptor error: {0}")]
    Descriptor(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("PSET error: {0}")]
    Pset(String),

    #[error("codec error: {0}")]
    Codec(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Codec(e.to_string())
    }
}
