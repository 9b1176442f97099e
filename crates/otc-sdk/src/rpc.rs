//! Blocking JSON-RPC client for an Elements node, implementing
//! [`LedgerBackend`].

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lwk_wollet::elements::confidential::{Asset, Nonce, Value as ConfValue};
use lwk_wollet::elements::pset::PartiallySignedTransaction;
use lwk_wollet::elements::{Script, TxOut, TxOutWitness};
use reqwest::blocking::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::amount::{Amount, AmountError};
use crate::asset::AssetId;
use crate::error::{Error, Result};
use crate::ledger::{
    AddressInfo, FinalizedTx, InputMetadata, LedgerBackend, ProtectedAddress, ProtectionRequest,
    SignedTx, TxInput, TxOutput, Utxo,
};
use crate::settlement::protection::ProtectionPolicy;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for [`ElementsRpcClient`].
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub timeout: Duration,
}

pub struct ElementsRpcClient {
    http: Client,
    config: RpcConfig,
    wallet: Option<String>,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct UnspentEntry {
    txid: String,
    vout: u32,
    asset: String,
    amount: Value,
    #[serde(rename = "scriptPubKey")]
    script_pubkey: Option<String>,
    amountcommitment: Option<String>,
    assetcommitment: Option<String>,
}

#[derive(Deserialize)]
struct AddressInfoResponse {
    pubkey: Option<String>,
    confidential_key: Option<String>,
}

#[derive(Deserialize)]
struct DescriptorInfo {
    descriptor: String,
}

#[derive(Deserialize)]
struct ProcessedPsbt {
    psbt: String,
    complete: bool,
}

#[derive(Deserialize)]
struct FinalizedPsbt {
    hex: Option<String>,
    complete: bool,
}

impl ElementsRpcClient {
    pub fn new(config: RpcConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self {
            http,
            config,
            wallet: None,
            next_id: AtomicU64::new(1),
        })
    }

    /// A client whose calls go to `/wallet/<name>` on the same node.
    ///
    /// Shares the HTTP connection pool but keeps its own request ids.
    pub fn for_wallet(&self, wallet: impl Into<String>) -> Self {
        Self {
            http: self.http.clone(),
            config: self.config.clone(),
            wallet: Some(wallet.into()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn wallet(&self) -> Option<&str> {
        self.wallet.as_deref()
    }

    /// Call any RPC method on this client's wallet (or the node when unscoped).
    pub fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        self.call_on(self.wallet.as_deref(), method, params)
    }

    fn call_on<T: DeserializeOwned>(
        &self,
        wallet: Option<&str>,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let url = match wallet {
            Some(name) => format!("{}/wallet/{}", self.config.url.trim_end_matches('/'), name),
            None => self.config.url.clone(),
        };
        log::debug!("rpc #{id} {method} -> {url}");

        let body = json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.config.user, Some(&self.config.password))
            .json(&body)
            .send()
            .map_err(|e| Error::Transport(format!("{method}: {e}")))?;

        // The node reports RPC errors with a non-2xx status and a JSON body,
        // so the body is decoded before looking at the status.
        let status = response.status();
        let text = response
            .text()
            .map_err(|e| Error::Transport(format!("{method}: {e}")))?;
        let parsed: RpcResponse = serde_json::from_str(&text)
            .map_err(|_| Error::Transport(format!("{method}: http {status}: {text}")))?;
        if let Some(err) = parsed.error {
            return Err(Error::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        serde_json::from_value(parsed.result)
            .map_err(|e| Error::Codec(format!("{method} result: {e}")))
    }
}

impl LedgerBackend for ElementsRpcClient {
    fn sign_message(&self, address: &str, message: &str) -> Result<String> {
        self.call("signmessage", vec![json!(address), json!(message)])
    }

    fn verify_message(&self, address: &str, signature: &str, message: &str) -> Result<bool> {
        match self.call(
            "verifymessage",
            vec![json!(address), json!(signature), json!(message)],
        ) {
            Ok(valid) => Ok(valid),
            // malformed signature or address: not a valid signature
            Err(Error::Rpc { code, message }) => {
                log::debug!("verifymessage rejected input ({code}): {message}");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn list_utxos(&self, address: &str, asset: Option<&AssetId>) -> Result<Vec<Utxo>> {
        let mut params = vec![json!(1), json!(9_999_999), json!([address]), json!(true)];
        if let Some(asset) = asset {
            params.push(json!({ "asset": asset.to_string() }));
        }
        let entries: Vec<UnspentEntry> = self.call("listunspent", params)?;
        entries
            .into_iter()
            .map(|e| {
                Ok(Utxo {
                    txid: e
                        .txid
                        .parse()
                        .map_err(|err| Error::Codec(format!("txid {}: {err}", e.txid)))?,
                    vout: e.vout,
                    asset: e.asset.parse().map_err(Error::Codec)?,
                    amount: amount_from_json(&e.amount)?,
                    script_pubkey: e.script_pubkey,
                    amount_commitment: e.amountcommitment,
                    asset_commitment: e.assetcommitment,
                })
            })
            .collect()
    }

    fn address_info(&self, address: &str) -> Result<AddressInfo> {
        let info: AddressInfoResponse = self.call("getaddressinfo", vec![json!(address)])?;
        let pubkey = info.pubkey.ok_or_else(|| {
            Error::Descriptor(format!("wallet knows no public key for {address}"))
        })?;
        Ok(AddressInfo {
            pubkey,
            confidential_key: info.confidential_key.filter(|k| !k.is_empty()),
        })
    }

    fn derive_protected_address(&self, request: &ProtectionRequest) -> Result<ProtectedAddress> {
        let policy = ProtectionPolicy::try_from(request)?;
        let info: DescriptorInfo =
            self.call("getdescriptorinfo", vec![json!(policy.descriptor())])?;
        let addresses: Vec<String> =
            self.call("deriveaddresses", vec![json!(info.descriptor)])?;
        let unconfidential = addresses
            .into_iter()
            .next()
            .ok_or_else(|| Error::Descriptor("descriptor derived no address".into()))?;

        match self.call::<Value>(
            "importaddress",
            vec![json!(unconfidential), json!(""), json!(false)],
        ) {
            Ok(_) => {}
            Err(Error::Rpc { message, .. }) if message.to_lowercase().contains("already") => {
                log::debug!("protected address {unconfidential} already imported");
            }
            Err(Error::Rpc { message, .. }) => return Err(Error::DescriptorImport(message)),
            Err(e) => return Err(e),
        }

        let address = match &request.blinding_pubkey {
            Some(key) => self.call(
                "createblindedaddress",
                vec![json!(unconfidential), json!(key)],
            )?,
            None => unconfidential,
        };
        Ok(ProtectedAddress {
            address,
            descriptor: info.descriptor,
        })
    }

    fn build_transaction(&self, inputs: &[TxInput], outputs: &[TxOutput]) -> Result<String> {
        let inputs: Vec<Value> = inputs
            .iter()
            .map(|i| json!({ "txid": i.txid.to_string(), "vout": i.vout }))
            .collect();
        let outputs: Vec<Value> = outputs
            .iter()
            .map(|o| match o {
                TxOutput::Payment {
                    address,
                    amount,
                    asset,
                } => {
                    let mut out = serde_json::Map::new();
                    out.insert(address.clone(), json!(amount.to_string()));
                    out.insert("asset".into(), json!(asset.to_string()));
                    Value::Object(out)
                }
                TxOutput::Fee { amount, .. } => json!({ "fee": amount.to_string() }),
            })
            .collect();
        self.call("createpsbt", vec![json!(inputs), json!(outputs)])
    }

    fn attach_input_metadata(&self, tx: &str, metadata: &[InputMetadata]) -> Result<String> {
        let mut pset = PartiallySignedTransaction::from_str(tx)
            .map_err(|e| Error::Pset(format!("decode: {e}")))?;
        for meta in metadata {
            let input = pset
                .inputs_mut()
                .iter_mut()
                .find(|i| i.previous_txid == meta.txid && i.previous_output_index == meta.vout)
                .ok_or_else(|| {
                    Error::Pset(format!("no input spends {}:{}", meta.txid, meta.vout))
                })?;
            input.witness_utxo = Some(witness_utxo(meta)?);
        }
        Ok(pset.to_string())
    }

    fn blind(&self, tx: &str) -> Result<String> {
        let processed: ProcessedPsbt =
            self.call("walletprocesspsbt", vec![json!(tx), json!(false)])?;
        Ok(processed.psbt)
    }

    fn partial_sign(&self, tx: &str, signer: &str) -> Result<SignedTx> {
        // an empty signer means this client's own wallet
        let wallet = if signer.is_empty() {
            self.wallet.as_deref()
        } else {
            Some(signer)
        };
        let processed: ProcessedPsbt = self.call_on(
            wallet,
            "walletprocesspsbt",
            vec![json!(tx), json!(true), json!("ALL"), json!(true), json!(false)],
        )?;
        Ok(SignedTx {
            tx: processed.psbt,
            complete: processed.complete,
        })
    }

    fn finalize(&self, tx: &str) -> Result<FinalizedTx> {
        let finalized: FinalizedPsbt = self.call("finalizepsbt", vec![json!(tx)])?;
        Ok(FinalizedTx {
            hex: finalized.hex.unwrap_or_default(),
            complete: finalized.complete,
        })
    }

    fn broadcast(&self, final_tx: &str) -> Result<String> {
        self.call("sendrawtransaction", vec![json!(final_tx)])
    }

    fn wallet_view(&self, wallet: &str) -> Result<Self> {
        Ok(self.for_wallet(wallet))
    }
}

/// Rebuild the spent output from listed metadata, keeping commitments when the
/// output is confidential.
fn witness_utxo(meta: &InputMetadata) -> Result<TxOut> {
    let script_pubkey = match &meta.script_pubkey {
        Some(spk) => Script::from(
            hex::decode(spk).map_err(|e| Error::Pset(format!("scriptPubKey {spk}: {e}")))?,
        ),
        None => Script::new(),
    };
    let asset = match &meta.asset_commitment {
        Some(c) => Asset::from_commitment(&decode_commitment(c)?)
            .map_err(|e| Error::Pset(format!("asset commitment {c}: {e}")))?,
        None => Asset::Explicit(meta.asset.into_elements()),
    };
    let value = match &meta.amount_commitment {
        Some(c) => ConfValue::from_commitment(&decode_commitment(c)?)
            .map_err(|e| Error::Pset(format!("amount commitment {c}: {e}")))?,
        None => ConfValue::Explicit(meta.amount.to_sat()?),
    };
    Ok(TxOut {
        asset,
        value,
        nonce: Nonce::Null,
        script_pubkey,
        witness: TxOutWitness::default(),
    })
}

fn decode_commitment(hex_str: &str) -> Result<Vec<u8>> {
    hex::decode(hex_str).map_err(|e| Error::Pset(format!("commitment {hex_str}: {e}")))
}

/// Node amounts arrive as JSON numbers; go through their decimal text so no
/// binary float is ever rounded into an [`Amount`].
fn amount_from_json(value: &Value) -> Result<Amount> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => return Err(Error::Codec(format!("amount is not a number: {other}"))),
    };
    let decimal = if text.contains(['e', 'E']) {
        Decimal::from_scientific(&text)
    } else {
        Decimal::from_str_exact(&text)
    }
    .map_err(|_| AmountError::Parse(text.clone()))?;
    Ok(Amount::round_from(decimal)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_amounts_parse_exactly() {
        let a = amount_from_json(&json!(49950.0)).unwrap();
        assert_eq!(a.to_string(), "49950.00000000");
        let a = amount_from_json(&json!(0.1)).unwrap();
        assert_eq!(a.to_string(), "0.10000000");
        let a = amount_from_json(&json!(1e-8)).unwrap();
        assert_eq!(a, Amount::MIN_UNIT);
        let a = amount_from_json(&json!(21)).unwrap();
        assert_eq!(a.to_string(), "21.00000000");
        let a = amount_from_json(&json!("0.00001000")).unwrap();
        assert_eq!(a.to_sat().unwrap(), 1_000);
        assert!(amount_from_json(&json!(null)).is_err());
    }

    #[test]
    fn wallet_scope_keeps_its_own_ids() {
        let node = ElementsRpcClient::new(RpcConfig {
            url: "http://127.0.0.1:18884/".into(),
            user: "user".into(),
            password: "pass".into(),
            timeout: DEFAULT_TIMEOUT,
        })
        .unwrap();
        node.next_id.fetch_add(5, Ordering::Relaxed);
        let wallet = node.for_wallet("dealer1");
        assert_eq!(wallet.wallet(), Some("dealer1"));
        assert_eq!(wallet.next_id.load(Ordering::Relaxed), 1);
        assert_eq!(node.wallet(), None);
    }

    #[test]
    fn explicit_witness_utxo_from_metadata() {
        let meta = InputMetadata {
            txid: "0000000000000000000000000000000000000000000000000000000000000001"
                .parse()
                .unwrap(),
            vout: 0,
            script_pubkey: Some("0014".to_string() + &"11".repeat(20)),
            amount: "1.5".parse().unwrap(),
            asset: "6f0279e9ed041c3d710a9f57d0c02928416460c4b722ae3457a11eec381c526d"
                .parse()
                .unwrap(),
            amount_commitment: None,
            asset_commitment: None,
        };
        let out = witness_utxo(&meta).unwrap();
        assert_eq!(out.value, ConfValue::Explicit(150_000_000));
        assert_eq!(out.asset, Asset::Explicit(meta.asset.into_elements()));
        assert_eq!(out.script_pubkey.len(), 22);
    }
}
