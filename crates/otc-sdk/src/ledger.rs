use lwk_wollet::elements::Txid;

use crate::amount::Amount;
use crate::asset::AssetId;
use crate::error::Result;

/// An unspent output as listed by the wallet, with the fields the planner and
/// the blinder need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub txid: Txid,
    pub vout: u32,
    pub asset: AssetId,
    pub amount: Amount,
    /// Hex scriptPubKey of the output being spent.
    pub script_pubkey: Option<String>,
    /// Hex Pedersen commitment when the output is confidential.
    pub amount_commitment: Option<String>,
    /// Hex asset generator when the output is confidential.
    pub asset_commitment: Option<String>,
}

/// Public key material behind a wallet address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressInfo {
    /// Compressed public key, hex.
    pub pubkey: String,
    /// Blinding public key for confidential addresses, hex.
    pub confidential_key: Option<String>,
}

/// Keys and delay for the timelock-protected output the dealer receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionRequest {
    pub dealer_pubkey: String,
    pub client_pubkey: String,
    pub csv_delay: u16,
    /// Blinding key for the derived address. `None` leaves it unconfidential.
    pub blinding_pubkey: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedAddress {
    pub address: String,
    pub descriptor: String,
}

/// Outpoint reference for a transaction input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxInput {
    pub txid: Txid,
    pub vout: u32,
}

/// One transaction output, either a payment or the explicit fee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutput {
    Payment {
        address: String,
        amount: Amount,
        asset: AssetId,
    },
    Fee {
        amount: Amount,
        asset: AssetId,
    },
}

impl TxOutput {
    pub fn amount(&self) -> Amount {
        match self {
            TxOutput::Payment { amount, .. } | TxOutput::Fee { amount, .. } => *amount,
        }
    }

    pub fn asset(&self) -> AssetId {
        match self {
            TxOutput::Payment { asset, .. } | TxOutput::Fee { asset, .. } => *asset,
        }
    }
}

/// Previous-output data attached to an input so blinding can derive factors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputMetadata {
    pub txid: Txid,
    pub vout: u32,
    pub script_pubkey: Option<String>,
    pub amount: Amount,
    pub asset: AssetId,
    pub amount_commitment: Option<String>,
    pub asset_commitment: Option<String>,
}

impl From<&Utxo> for InputMetadata {
    fn from(utxo: &Utxo) -> Self {
        Self {
            txid: utxo.txid,
            vout: utxo.vout,
            script_pubkey: utxo.script_pubkey.clone(),
            amount: utxo.amount,
            asset: utxo.asset,
            amount_commitment: utxo.amount_commitment.clone(),
            asset_commitment: utxo.asset_commitment.clone(),
        }
    }
}

/// A partially signed transaction and whether it now carries every signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub tx: String,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedTx {
    pub hex: String,
    pub complete: bool,
}

/// Capabilities the engine needs from the ledger node and its wallets.
///
/// Transactions travel between steps as opaque strings (hex or base64 PSET,
/// whatever the backend uses). Implementations must be `Sync` to be shared
/// across concurrently evaluating dealers.
pub trait LedgerBackend {
    /// Sign `message` with the key behind `address`.
    fn sign_message(&self, address: &str, message: &str) -> Result<String>;

    /// Check `signature` over `message` against `address`.
    fn verify_message(&self, address: &str, signature: &str, message: &str) -> Result<bool>;

    /// List spendable outputs paying to `address`, optionally only of `asset`.
    ///
    /// The order is whatever the wallet returns; the planner keeps it.
    fn list_utxos(&self, address: &str, asset: Option<&AssetId>) -> Result<Vec<Utxo>>;

    /// Look up the public key material behind a wallet address.
    fn address_info(&self, address: &str) -> Result<AddressInfo>;

    /// Derive (and register with the wallet) the timelock-protected address.
    ///
    /// Registering an address the wallet already tracks is not an error.
    fn derive_protected_address(&self, request: &ProtectionRequest) -> Result<ProtectedAddress>;

    /// Build a skeletal transaction spending `inputs` into `outputs`, in order.
    fn build_transaction(&self, inputs: &[TxInput], outputs: &[TxOutput]) -> Result<String>;

    /// Attach each input's previous-output script, amount and asset.
    fn attach_input_metadata(&self, tx: &str, metadata: &[InputMetadata]) -> Result<String>;

    /// Blind amounts and asset tags of the outputs.
    fn blind(&self, tx: &str) -> Result<String>;

    /// Add `signer`'s signatures to the inputs it controls.
    fn partial_sign(&self, tx: &str, signer: &str) -> Result<SignedTx>;

    fn finalize(&self, tx: &str) -> Result<FinalizedTx>;

    /// Broadcast a finalized transaction and return its txid.
    fn broadcast(&self, final_tx: &str) -> Result<String>;

    /// The same ledger seen through `wallet`: UTXO listings and key lookups
    /// cover that wallet's addresses. An empty name is the default wallet.
    fn wallet_view(&self, wallet: &str) -> Result<Self>
    where
        Self: Sized;
}
