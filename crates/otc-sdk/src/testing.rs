//! In-memory [`LedgerBackend`] for tests.
//!
//! `MockLedger` keeps a UTXO set keyed by address, signs messages with a
//! per-address HMAC key, and walks transactions through the same
//! build/attach/blind/sign/finalize/broadcast states a node would, so the
//! planner and executor can be exercised without a running `elementsd`.
//! An address belongs to the wallet named after it unless
//! [`MockLedger::assign_wallet`] says otherwise; signers are wallet names and
//! each one may sign the inputs its addresses own. A view from
//! [`LedgerBackend::wallet_view`] shares the ledger but only lists UTXOs and
//! keys of its own wallet.
//!
//! Failures can be injected per step to drive the error paths.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use hmac::{Hmac, Mac};
use lwk_wollet::elements;
use lwk_wollet::elements::secp256k1_zkp::{PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::amount::Amount;
use crate::asset::AssetId;
use crate::error::{Error, Result};
use crate::ledger::{
    AddressInfo, FinalizedTx, InputMetadata, LedgerBackend, ProtectedAddress, ProtectionRequest,
    SignedTx, TxInput, TxOutput, Utxo,
};
use crate::settlement::protection::ProtectionPolicy;

pub const LBTC_HEX: &str = "6f0279e9ed041c3d710a9f57d0c02928416460c4b722ae3457a11eec381c526d";
pub const USDT_HEX: &str = "ce091c998b83c78bb71a632313ba3760f1763d9cfcffae02258ffa9865a37bd2";

pub fn lbtc() -> AssetId {
    LBTC_HEX.parse().expect("valid L-BTC id")
}

pub fn usdt() -> AssetId {
    USDT_HEX.parse().expect("valid USDt id")
}

/// A throwaway asset id made of one repeated byte.
pub fn asset(byte: u8) -> AssetId {
    AssetId::from(elements::AssetId::from_slice(&[byte; 32]).expect("32-byte asset id"))
}

fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Deterministic compressed public key for a seed string.
pub fn mock_pubkey(seed: &str) -> String {
    let secp = Secp256k1::new();
    let digest = sha256(&[b"mock-key:".as_slice(), seed.as_bytes()]);
    let secret = SecretKey::from_slice(&digest).expect("valid scalar");
    hex::encode(PublicKey::from_secret_key(&secp, &secret).serialize())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MockOutput {
    /// `None` for the fee output.
    address: Option<String>,
    amount: Amount,
    asset: AssetId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MockInput {
    txid: String,
    vout: u32,
}

/// The opaque transaction string handed between steps, as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MockTx {
    inputs: Vec<MockInput>,
    outputs: Vec<MockOutput>,
    metadata_attached: bool,
    blinded: bool,
    signed_by: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    utxos: Vec<(String, Utxo)>,
    /// address -> wallet, for addresses not in a wallet of their own name
    wallets: HashMap<String, String>,
    next_txid: u64,
    denied_signers: HashSet<String>,
    unverifiable: HashSet<String>,
    incomplete_signers: HashSet<String>,
    import_error: Option<String>,
    tamper_descriptor: bool,
    fail_finalize: bool,
    calls: Vec<&'static str>,
}

#[derive(Debug, Default)]
pub struct MockLedger {
    state: Arc<Mutex<State>>,
    /// `None` sees every wallet.
    scope: Option<String>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("mock ledger state poisoned")
    }

    /// Fund `address` with a fresh UTXO and return it.
    pub fn add_utxo(&self, address: &str, asset: AssetId, amount: &str) -> Utxo {
        let mut state = self.state();
        state.next_txid += 1;
        let utxo = Utxo {
            txid: format!("{:064x}", state.next_txid)
                .parse()
                .expect("valid txid hex"),
            vout: 0,
            asset,
            amount: amount.parse().expect("valid amount"),
            script_pubkey: None,
            amount_commitment: None,
            asset_commitment: None,
        };
        state.utxos.push((address.to_string(), utxo.clone()));
        utxo
    }

    /// Sum of unspent `asset` held by `address`.
    pub fn balance(&self, address: &str, asset: AssetId) -> Amount {
        self.state()
            .utxos
            .iter()
            .filter(|(owner, u)| owner == address && u.asset == asset)
            .fold(Amount::ZERO, |acc, (_, u)| {
                acc.checked_add(u.amount).expect("balance overflow")
            })
    }

    /// Move `address` into `wallet`.
    pub fn assign_wallet(&self, address: &str, wallet: &str) {
        self.state()
            .wallets
            .insert(address.to_string(), wallet.to_string());
    }

    /// Capability calls made so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub fn deny_signing(&self, address: &str) {
        self.state().denied_signers.insert(address.to_string());
    }

    /// Verifying a signature by `address` fails as if the node were down.
    pub fn fail_verify(&self, address: &str) {
        self.state().unverifiable.insert(address.to_string());
    }

    /// `signer` will return the transaction unchanged and incomplete.
    pub fn sign_incomplete(&self, signer: &str) {
        self.state().incomplete_signers.insert(signer.to_string());
    }

    /// Make protected-address registration fail with `message`.
    pub fn fail_import(&self, message: &str) {
        self.state().import_error = Some(message.to_string());
    }

    /// Return a descriptor that differs from the requested policy.
    pub fn tamper_descriptor(&self) {
        self.state().tamper_descriptor = true;
    }

    pub fn fail_finalize(&self) {
        self.state().fail_finalize = true;
    }

    fn record(&self, call: &'static str) {
        self.state().calls.push(call);
    }

    /// Wallet holding the key of the output `txid:vout`.
    fn owner_of(state: &State, txid: &str, vout: u32) -> Option<String> {
        state
            .utxos
            .iter()
            .find(|(_, u)| u.txid.to_string() == txid && u.vout == vout)
            .map(|(owner, _)| Self::wallet_of(state, owner))
    }

    fn wallet_of(state: &State, address: &str) -> String {
        state
            .wallets
            .get(address)
            .cloned()
            .unwrap_or_else(|| address.to_string())
    }

    fn sees(&self, state: &State, address: &str) -> bool {
        self.scope
            .as_ref()
            .is_none_or(|wallet| *wallet == Self::wallet_of(state, address))
    }
}

fn decode(tx: &str) -> Result<MockTx> {
    serde_json::from_str(tx).map_err(|e| Error::Pset(format!("not a mock transaction: {e}")))
}

fn encode(tx: &MockTx) -> Result<String> {
    Ok(serde_json::to_string(tx)?)
}

fn mac(address: &str, message: &str) -> String {
    let key = sha256(&[b"mock-signing:".as_slice(), address.as_bytes()]);
    let mut mac = Hmac::<Sha256>::new_from_slice(&key).expect("hmac accepts any key length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

impl LedgerBackend for MockLedger {
    fn sign_message(&self, address: &str, message: &str) -> Result<String> {
        self.record("sign_message");
        if self.state().denied_signers.contains(address) {
            return Err(Error::Rpc {
                code: -4,
                message: format!("private key for {address} is not known"),
            });
        }
        Ok(mac(address, message))
    }

    fn verify_message(&self, address: &str, signature: &str, message: &str) -> Result<bool> {
        self.record("verify_message");
        if self.state().unverifiable.contains(address) {
            return Err(Error::Transport(format!("cannot reach node to verify {address}")));
        }
        Ok(mac(address, message) == signature)
    }

    fn list_utxos(&self, address: &str, asset: Option<&AssetId>) -> Result<Vec<Utxo>> {
        self.record("list_utxos");
        let state = self.state();
        if !self.sees(&state, address) {
            return Ok(Vec::new());
        }
        Ok(state
            .utxos
            .iter()
            .filter(|(owner, u)| owner == address && asset.is_none_or(|a| *a == u.asset))
            .map(|(_, u)| u.clone())
            .collect())
    }

    fn address_info(&self, address: &str) -> Result<AddressInfo> {
        self.record("address_info");
        if !self.sees(&self.state(), address) {
            return Err(Error::Descriptor(format!(
                "no public key for {address} in wallet {}",
                self.scope.as_deref().unwrap_or_default()
            )));
        }
        Ok(AddressInfo {
            pubkey: mock_pubkey(address),
            confidential_key: Some(mock_pubkey(&format!("blinding:{address}"))),
        })
    }

    fn derive_protected_address(&self, request: &ProtectionRequest) -> Result<ProtectedAddress> {
        self.record("derive_protected_address");
        let policy = ProtectionPolicy::try_from(request)?;
        let state = self.state();

        let mut descriptor = policy.descriptor();
        if state.tamper_descriptor {
            descriptor = descriptor.replace("older(", "older(1");
        }
        let checksum = hex::encode(&sha256(&[descriptor.as_bytes()])[..4]);
        let address = format!(
            "el1qprot{}",
            hex::encode(&sha256(&[descriptor.as_bytes()])[..12])
        );

        if let Some(message) = &state.import_error
            && !message.contains("already")
        {
            return Err(Error::DescriptorImport(message.clone()));
        }

        let address = match &request.blinding_pubkey {
            Some(key) => format!("{address}b{}", key.get(..8).unwrap_or(key)),
            None => address,
        };
        Ok(ProtectedAddress {
            address,
            descriptor: format!("{descriptor}#{checksum}"),
        })
    }

    fn build_transaction(&self, inputs: &[TxInput], outputs: &[TxOutput]) -> Result<String> {
        self.record("build_transaction");
        let tx = MockTx {
            inputs: inputs
                .iter()
                .map(|i| MockInput {
                    txid: i.txid.to_string(),
                    vout: i.vout,
                })
                .collect(),
            outputs: outputs
                .iter()
                .map(|o| MockOutput {
                    address: match o {
                        TxOutput::Payment { address, .. } => Some(address.clone()),
                        TxOutput::Fee { .. } => None,
                    },
                    amount: o.amount(),
                    asset: o.asset(),
                })
                .collect(),
            metadata_attached: false,
            blinded: false,
            signed_by: Vec::new(),
        };
        encode(&tx)
    }

    fn attach_input_metadata(&self, tx: &str, metadata: &[InputMetadata]) -> Result<String> {
        self.record("attach_input_metadata");
        let mut decoded = decode(tx)?;
        for input in &decoded.inputs {
            let found = metadata
                .iter()
                .any(|m| m.txid.to_string() == input.txid && m.vout == input.vout);
            if !found {
                return Err(Error::Pset(format!(
                    "no metadata for input {}:{}",
                    input.txid, input.vout
                )));
            }
        }
        decoded.metadata_attached = true;
        encode(&decoded)
    }

    fn blind(&self, tx: &str) -> Result<String> {
        self.record("blind");
        let mut decoded = decode(tx)?;
        if !decoded.metadata_attached {
            return Err(Error::Pset("cannot blind without input metadata".into()));
        }
        decoded.blinded = true;
        encode(&decoded)
    }

    fn partial_sign(&self, tx: &str, signer: &str) -> Result<SignedTx> {
        self.record("partial_sign");
        let mut decoded = decode(tx)?;
        let state = self.state();
        if state.incomplete_signers.contains(signer) {
            return Ok(SignedTx {
                tx: tx.to_string(),
                complete: false,
            });
        }
        let owners: Vec<Option<String>> = decoded
            .inputs
            .iter()
            .map(|i| Self::owner_of(&state, &i.txid, i.vout))
            .collect();
        if owners.iter().any(|o| o.as_deref() == Some(signer))
            && !decoded.signed_by.iter().any(|s| s == signer)
        {
            decoded.signed_by.push(signer.to_string());
        }
        let complete = owners.iter().all(|o| {
            o.as_ref()
                .is_some_and(|owner| decoded.signed_by.contains(owner))
        });
        Ok(SignedTx {
            tx: encode(&decoded)?,
            complete,
        })
    }

    fn finalize(&self, tx: &str) -> Result<FinalizedTx> {
        self.record("finalize");
        let decoded = decode(tx)?;
        let state = self.state();
        let all_signed = decoded.inputs.iter().all(|i| {
            Self::owner_of(&state, &i.txid, i.vout)
                .is_some_and(|owner| decoded.signed_by.contains(&owner))
        });
        if state.fail_finalize || !all_signed || !decoded.blinded {
            return Ok(FinalizedTx {
                hex: String::new(),
                complete: false,
            });
        }
        Ok(FinalizedTx {
            hex: hex::encode(tx.as_bytes()),
            complete: true,
        })
    }

    fn broadcast(&self, final_tx: &str) -> Result<String> {
        self.record("broadcast");
        let bytes =
            hex::decode(final_tx).map_err(|e| Error::Pset(format!("bad final tx hex: {e}")))?;
        let text = String::from_utf8(bytes).map_err(|e| Error::Pset(e.to_string()))?;
        let decoded = decode(&text)?;

        let mut state = self.state();
        for input in &decoded.inputs {
            let before = state.utxos.len();
            state
                .utxos
                .retain(|(_, u)| !(u.txid.to_string() == input.txid && u.vout == input.vout));
            if state.utxos.len() == before {
                return Err(Error::Rpc {
                    code: -25,
                    message: format!("bad-txns-inputs-missingorspent {}", input.txid),
                });
            }
        }

        let txid_hex = hex::encode(sha256(&[text.as_bytes()]));
        let txid: elements::Txid = txid_hex
            .parse()
            .map_err(|e| Error::Pset(format!("txid: {e}")))?;
        for (vout, output) in decoded.outputs.iter().enumerate() {
            if let Some(address) = &output.address {
                let utxo = Utxo {
                    txid,
                    vout: vout as u32,
                    asset: output.asset,
                    amount: output.amount,
                    script_pubkey: None,
                    amount_commitment: None,
                    asset_commitment: None,
                };
                state.utxos.push((address.clone(), utxo));
            }
        }
        Ok(txid.to_string())
    }

    fn wallet_view(&self, wallet: &str) -> Result<Self> {
        Ok(Self {
            state: Arc::clone(&self.state),
            scope: if wallet.is_empty() {
                self.scope.clone()
            } else {
                Some(wallet.to_string())
            },
        })
    }
}
