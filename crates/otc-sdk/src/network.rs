use lwk_wollet::ElementsNetwork;
use serde::{Deserialize, Serialize};

use crate::asset::AssetId;

/// Network variants for Liquid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    Liquid,
    LiquidTestnet,
    #[default]
    LiquidRegtest,
}

impl Network {
    pub fn into_lwk(self) -> ElementsNetwork {
        match self {
            Network::Liquid => ElementsNetwork::Liquid,
            Network::LiquidTestnet => ElementsNetwork::LiquidTestnet,
            Network::LiquidRegtest => ElementsNetwork::default_regtest(),
        }
    }

    /// `elementsd` default RPC port.
    pub fn default_rpc_port(self) -> u16 {
        match self {
            Network::Liquid => 7041,
            Network::LiquidTestnet => 18891,
            Network::LiquidRegtest => 18884,
        }
    }

    pub fn default_rpc_url(self) -> String {
        format!("http://127.0.0.1:{}", self.default_rpc_port())
    }

    /// The network's native asset (L-BTC), which also pays fees.
    pub fn policy_asset(self) -> AssetId {
        AssetId::from(self.into_lwk().policy_asset())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Liquid => "mainnet",
            Network::LiquidTestnet => "testnet",
            Network::LiquidRegtest => "regtest",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "liquid" => Ok(Network::Liquid),
            "testnet" | "liquid-testnet" | "liquidtestnet" => Ok(Network::LiquidTestnet),
            "regtest" | "liquid-regtest" | "liquidregtest" => Ok(Network::LiquidRegtest),
            _ => Err(format!("invalid network: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases_and_serde_names() {
        assert_eq!("liquid".parse::<Network>().unwrap(), Network::Liquid);
        assert_eq!("Regtest".parse::<Network>().unwrap(), Network::LiquidRegtest);
        assert!("bitcoin".parse::<Network>().is_err());

        let n: Network = serde_json::from_str("\"liquid-testnet\"").unwrap();
        assert_eq!(n, Network::LiquidTestnet);
        assert_eq!(Network::default(), Network::LiquidRegtest);
    }

    #[test]
    fn regtest_defaults() {
        assert_eq!(Network::LiquidRegtest.default_rpc_url(), "http://127.0.0.1:18884");
        assert_eq!(
            Network::Liquid.policy_asset().to_string(),
            "6f0279e9ed041c3d710a9f57d0c02928416460c4b722ae3457a11eec381c526d"
        );
    }
}
