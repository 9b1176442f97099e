//! Canonical encoding of signed messages.
//!
//! The signed message for an RFQ or a quote is a compact JSON object whose
//! keys are emitted in lexicographic order with no whitespace. Amounts and
//! prices are strings with exactly 8 fractional digits, times are integers.
//!
//! ```text
//! {"approx_amount":"1.00000000","asset_buy":"ce09…","asset_sell":"6f02…",
//!  "client_address":"el1…","expiry":1700000300,"id":"3f9a0c1d2b4e5f60"}
//! ```
//!
//! Keys live in a `BTreeMap`, so the output only depends on the field values,
//! never on the order they were inserted in.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalPayload {
    fields: BTreeMap<&'static str, Value>,
}

impl CanonicalPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string-valued field. Amounts and ids go through here.
    pub fn text(mut self, key: &'static str, value: impl ToString) -> Self {
        self.fields.insert(key, Value::String(value.to_string()));
        self
    }

    pub fn integer(mut self, key: &'static str, value: i64) -> Self {
        self.fields.insert(key, Value::from(value));
        self
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.fields)?)
    }
}

/// A record with a canonical signing payload (all fields except the signature).
pub trait CanonicalMessage {
    /// Human-readable record kind used in errors and logs.
    const KIND: &'static str;

    fn canonical_payload(&self) -> CanonicalPayload;

    fn canonical_message(&self) -> Result<String> {
        self.canonical_payload().encode()
    }
}

/// A canonical message together with the signature and the address that made it.
pub trait SignedMessage: CanonicalMessage {
    fn signer_address(&self) -> &str;
    fn signature(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_sorted_regardless_of_insertion_order() {
        let a = CanonicalPayload::new()
            .text("zeta", "z")
            .integer("alpha", 7)
            .text("mid", "1.00000000");
        let b = CanonicalPayload::new()
            .text("mid", "1.00000000")
            .text("zeta", "z")
            .integer("alpha", 7);
        let encoded = a.encode().unwrap();
        assert_eq!(encoded, b.encode().unwrap());
        assert_eq!(encoded, r#"{"alpha":7,"mid":"1.00000000","zeta":"z"}"#);
    }

    #[test]
    fn strings_are_escaped_deterministically() {
        let p = CanonicalPayload::new().text("k", "quote\"and\\slash");
        assert_eq!(p.encode().unwrap(), r#"{"k":"quote\"and\\slash"}"#);
    }
}
