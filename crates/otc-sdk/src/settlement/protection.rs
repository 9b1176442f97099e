use lwk_wollet::elements::secp256k1_zkp::PublicKey;

use crate::error::{Error, Result};
use crate::ledger::ProtectionRequest;

/// Default relative timelock before the client may reclaim the dealer's leg.
pub const DEFAULT_CSV_DELAY: u16 = 144;

/// Spending policy for the dealer's received leg.
///
/// ```text
/// or_d(pk(DEALER), and_v(v:pk(CLIENT), older(CSV)))
/// ```
///
/// The dealer can spend immediately; the client can recover the output once
/// it has `csv_delay` confirmations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionPolicy {
    dealer_pubkey: String,
    client_pubkey: String,
    csv_delay: u16,
}

impl ProtectionPolicy {
    pub fn new(dealer_pubkey: &str, client_pubkey: &str, csv_delay: u16) -> Result<Self> {
        let dealer_pubkey = normalize_pubkey("dealer", dealer_pubkey)?;
        let client_pubkey = normalize_pubkey("client", client_pubkey)?;
        if csv_delay == 0 {
            return Err(Error::Descriptor("csv delay must be at least 1 block".into()));
        }
        if dealer_pubkey == client_pubkey {
            return Err(Error::Descriptor(
                "dealer and client keys must differ".into(),
            ));
        }
        Ok(Self {
            dealer_pubkey,
            client_pubkey,
            csv_delay,
        })
    }

    pub fn dealer_pubkey(&self) -> &str {
        &self.dealer_pubkey
    }

    pub fn client_pubkey(&self) -> &str {
        &self.client_pubkey
    }

    pub fn csv_delay(&self) -> u16 {
        self.csv_delay
    }

    pub fn miniscript(&self) -> String {
        format!(
            "or_d(pk({}),and_v(v:pk({}),older({})))",
            self.dealer_pubkey, self.client_pubkey, self.csv_delay
        )
    }

    /// Elements segwit-v0 descriptor, without checksum.
    pub fn descriptor(&self) -> String {
        format!("elwsh({})", self.miniscript())
    }

    /// Whether `descriptor` (with or without a `#checksum` suffix) is this policy.
    pub fn matches(&self, descriptor: &str) -> bool {
        strip_checksum(descriptor) == self.descriptor()
    }

    pub fn request(&self, blinding_pubkey: Option<String>) -> ProtectionRequest {
        ProtectionRequest {
            dealer_pubkey: self.dealer_pubkey.clone(),
            client_pubkey: self.client_pubkey.clone(),
            csv_delay: self.csv_delay,
            blinding_pubkey,
        }
    }
}

impl TryFrom<&ProtectionRequest> for ProtectionPolicy {
    type Error = Error;

    fn try_from(request: &ProtectionRequest) -> Result<Self> {
        Self::new(
            &request.dealer_pubkey,
            &request.client_pubkey,
            request.csv_delay,
        )
    }
}

pub fn strip_checksum(descriptor: &str) -> &str {
    descriptor
        .split_once('#')
        .map_or(descriptor, |(body, _)| body)
        .trim()
}

/// Validate a 33-byte compressed key and return its lowercase hex.
fn normalize_pubkey(role: &str, hex_key: &str) -> Result<String> {
    let bytes = hex::decode(hex_key.trim())
        .map_err(|e| Error::Descriptor(format!("{role} pubkey is not hex: {e}")))?;
    if bytes.len() != 33 {
        return Err(Error::Descriptor(format!(
            "{role} pubkey must be 33 bytes compressed, got {}",
            bytes.len()
        )));
    }
    let key = PublicKey::from_slice(&bytes)
        .map_err(|e| Error::Descriptor(format!("{role} pubkey invalid: {e}")))?;
    Ok(hex::encode(key.serialize()))
}
