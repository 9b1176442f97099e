use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::amount::Amount;
use crate::asset::AssetId;
use crate::codec::{CanonicalMessage, CanonicalPayload, SignedMessage};
use crate::error::{Error, Result};
use crate::ledger::LedgerBackend;

/// Hex characters kept from the id hash.
const RFQ_ID_LEN: usize = 16;

/// A client's signed request for quotes.
///
/// `approx_amount` is deliberately imprecise; dealers commit to exact
/// amounts in their [`Quote`](crate::quote::Quote). The signature covers the
/// canonical encoding of every other field, so an RFQ is effectively
/// immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rfq {
    pub id: String,
    pub client_address: String,
    pub asset_sell: AssetId,
    pub asset_buy: AssetId,
    pub approx_amount: Amount,
    /// Unix timestamp (seconds) after which the RFQ must not be used.
    pub expiry: i64,
    pub signature: String,
}

impl Rfq {
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expiry
    }

    /// Fail with [`Error::Expired`] if the RFQ is no longer usable at `now`.
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
}

impl CanonicalMessage for Rfq {
    const KIND: &'static str = "rfq";

    fn canonical_payload(&self) -> CanonicalPayload {
        CanonicalPayload::new()
            .text("id", &self.id)
            .text("client_address", &self.client_address)
            .text("asset_sell", self.asset_sell)
            .text("asset_buy", self.asset_buy)
            .text("approx_amount", self.approx_amount)
            .integer("expiry", self.expiry)
    }
}

impl SignedMessage for Rfq {
    fn signer_address(&self) -> &str {
        &self.client_address
    }

    fn signature(&self) -> &str {
        &self.signature
    }
}

/// Parameters for [`create_rfq`].
#[derive(Debug, Clone)]
pub struct CreateRfqParams {
    /// Address the client receives on; its key signs the RFQ.
    pub client_address: String,
    pub asset_sell: AssetId,
    pub asset_buy: AssetId,
    pub approx_amount: Amount,
    /// Lifetime of the RFQ from now, in seconds.
    pub expiry_seconds: u64,
}

/// Create and sign a new RFQ expiring `expiry_seconds` from now.
pub fn create_rfq<L: LedgerBackend + ?Sized>(ledger: &L, params: &CreateRfqParams) -> Result<Rfq> {
    create_rfq_at(ledger, params, Utc::now().timestamp())
}

/// Same as [`create_rfq`] with an explicit clock reading (unix seconds).
pub fn create_rfq_at<L: LedgerBackend + ?Sized>(
    ledger: &L,
    params: &CreateRfqParams,
    now: i64,
) -> Result<Rfq> {
    if params.expiry_seconds == 0 {
        return Err(Error::InvalidRfq("expiry must be in the future".into()));
    }
    if params.approx_amount.is_zero() {
        return Err(Error::InvalidRfq("approx_amount must be positive".into()));
    }
    if params.asset_sell == params.asset_buy {
        return Err(Error::InvalidRfq(
            "asset_sell and asset_buy must differ".into(),
        ));
    }
    let ttl = i64::try_from(params.expiry_seconds)
        .map_err(|_| Error::InvalidRfq("expiry_seconds out of range".into()))?;
    let expiry = now
        .checked_add(ttl)
        .ok_or_else(|| Error::InvalidRfq("expiry_seconds out of range".into()))?;

    let mut rfq = Rfq {
        id: new_rfq_id(&params.client_address),
        client_address: params.client_address.clone(),
        asset_sell: params.asset_sell,
        asset_buy: params.asset_buy,
        approx_amount: params.approx_amount,
        expiry,
        signature: String::new(),
    };

    let message = rfq.canonical_message()?;
    rfq.signature = ledger
        .sign_message(&rfq.client_address, &message)
        .map_err(|e| Error::Signing(e.to_string()))?;

    log::info!(
        "created rfq {} selling ~{} of {} for {}",
        rfq.id,
        rfq.approx_amount,
        rfq.asset_sell,
        rfq.asset_buy
    );
    Ok(rfq)
}

/// `hex(SHA256(address || nanos || nonce))[..16]`
fn new_rfq_id(client_address: &str) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);

    let mut hasher = Sha256::new();
    hasher.update(client_address.as_bytes());
    hasher.update(nanos.to_be_bytes());
    hasher.update(nonce);
    let digest = hex::encode(hasher.finalize());
    digest[..RFQ_ID_LEN].to_string()
}
