use std::fmt;
use std::str::FromStr;

use lwk_wollet::elements;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Liquid asset identifier, rendered as the 64-char hex string the node uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetId(elements::AssetId);

impl AssetId {
    pub fn into_elements(self) -> elements::AssetId {
        self.0
    }
}

impl From<elements::AssetId> for AssetId {
    fn from(id: elements::AssetId) -> Self {
        Self(id)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AssetId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<elements::AssetId>()
            .map(Self)
            .map_err(|e| format!("invalid asset id {s:?}: {e}"))
    }
}

impl Serialize for AssetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
