use std::fs;
use std::path::Path;
use std::time::Duration;

use otc_sdk::{
    Amount, AssetId, Dealer, Market, Network, Price, PricingPolicy, RpcConfig, SettlementPolicy,
    SignerBook,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_CONFIG_FILE: &str = "liquid_otc.json";

pub const ENV_RPC_URL: &str = "LIQUID_OTC_RPC_URL";
pub const ENV_RPC_USER: &str = "LIQUID_OTC_RPC_USER";
pub const ENV_RPC_PASSWORD: &str = "LIQUID_OTC_RPC_PASSWORD";

// ============================================================================
// Config file layout
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    pub url: String,
    pub user: String,
    pub password: String,
    pub timeout_secs: u64,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            url: Network::LiquidRegtest.default_rpc_url(),
            user: "user".into(),
            password: "pass".into(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementSettings {
    pub fee: Amount,
    pub csv_delay: u16,
    /// Defaults to the network's policy asset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_asset: Option<AssetId>,
}

impl Default for SettlementSettings {
    fn default() -> Self {
        let policy = SettlementPolicy::default();
        Self {
            fee: policy.fee,
            csv_delay: policy.csv_delay,
            fee_asset: None,
        }
    }
}

/// An address and the node wallet that holds its key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartyConfig {
    pub address: String,
    pub wallet: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub base: AssetId,
    pub quote: AssetId,
    pub mid_price: Price,
    /// Decimal fraction, e.g. `"0.001"` for 10 bps.
    pub spread: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerConfig {
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub wallet: String,
    #[serde(default)]
    pub markets: Vec<MarketConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: Network,
    pub rpc: RpcSettings,
    pub rfq_ttl_secs: u64,
    pub quote_ttl_secs: u64,
    pub settlement: SettlementSettings,
    pub client: PartyConfig,
    pub dealers: Vec<DealerConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: Network::default(),
            rpc: RpcSettings::default(),
            rfq_ttl_secs: 300,
            quote_ttl_secs: 120,
            settlement: SettlementSettings::default(),
            client: PartyConfig::default(),
            dealers: Vec::new(),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl AppConfig {
    /// Read `path`, falling back to defaults when it does not exist, then
    /// apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let mut config = Self::read(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
        serde_json::from_str(&contents)
            .map_err(|e| AppError::Config(format!("{}: {e}", path.display())))
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_RPC_URL) {
            self.rpc.url = url;
        }
        if let Some(user) = lookup(ENV_RPC_USER) {
            self.rpc.user = user;
        }
        if let Some(password) = lookup(ENV_RPC_PASSWORD) {
            self.rpc.password = password;
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| AppError::io(path, e))
    }

    // --- Conversions into SDK types ---

    pub fn rpc_config(&self) -> RpcConfig {
        RpcConfig {
            url: self.rpc.url.clone(),
            user: self.rpc.user.clone(),
            password: self.rpc.password.clone(),
            timeout: Duration::from_secs(self.rpc.timeout_secs),
        }
    }

    pub fn settlement_policy(&self) -> SettlementPolicy {
        SettlementPolicy {
            fee: self.settlement.fee,
            csv_delay: self.settlement.csv_delay,
            fee_asset: Some(
                self.settlement
                    .fee_asset
                    .unwrap_or_else(|| self.network.policy_asset()),
            ),
        }
    }

    pub fn dealer_config(&self, id: &str) -> Result<&DealerConfig, AppError> {
        self.dealers
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| AppError::Config(format!("unknown dealer {id:?}")))
    }

    pub fn dealer(&self, id: &str) -> Result<Dealer, AppError> {
        self.dealer_config(id)?.to_dealer(self.quote_ttl_secs)
    }

    pub fn all_dealers(&self) -> Result<Vec<Dealer>, AppError> {
        self.dealers
            .iter()
            .map(|d| d.to_dealer(self.quote_ttl_secs))
            .collect()
    }

    pub fn signer_book(&self) -> SignerBook {
        self.dealers
            .iter()
            .fold(SignerBook::new(&self.client.wallet), |book, d| {
                book.with_dealer(&d.id, &d.wallet)
            })
    }

    /// Accept a hex asset id, or `lbtc` for the network's policy asset.
    pub fn resolve_asset(&self, value: &str) -> Result<AssetId, AppError> {
        match value.to_lowercase().as_str() {
            "lbtc" | "l-btc" | "policy" => Ok(self.network.policy_asset()),
            _ => value.parse().map_err(AppError::InvalidArgument),
        }
    }
}

impl DealerConfig {
    pub fn to_dealer(&self, quote_ttl_secs: u64) -> Result<Dealer, AppError> {
        let mut policy = PricingPolicy::new();
        for market in &self.markets {
            let spread = Decimal::from_str_exact(market.spread.trim()).map_err(|e| {
                AppError::Config(format!(
                    "dealer {}: bad spread {:?}: {e}",
                    self.id, market.spread
                ))
            })?;
            policy.add_market(Market {
                base: market.base,
                quote: market.quote,
                mid_price: market.mid_price,
                spread,
            })?;
        }
        Ok(Dealer::new(&self.id, &self.address, policy).with_quote_ttl(quote_ttl_secs))
    }
}
