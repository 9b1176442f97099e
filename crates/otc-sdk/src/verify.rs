use crate::codec::SignedMessage;
use crate::error::{Error, Result};
use crate::ledger::LedgerBackend;
use crate::quote::Quote;
use crate::rfq::Rfq;

/// Check a record's signature against its own canonical encoding.
///
/// `Ok(false)` means the signature does not match; `Err` is reserved for the
/// backend failing to answer at all.
pub fn verify_signed<M, L>(ledger: &L, message: &M) -> Result<bool>
where
    M: SignedMessage,
    L: LedgerBackend + ?Sized,
{
    if message.signature().is_empty() {
        return Ok(false);
    }
    let canonical = message.canonical_message()?;
    ledger.verify_message(message.signer_address(), message.signature(), &canonical)
}

pub fn verify_rfq<L: LedgerBackend + ?Sized>(ledger: &L, rfq: &Rfq) -> Result<bool> {
    verify_signed(ledger, rfq)
}

pub fn verify_quote<L: LedgerBackend + ?Sized>(ledger: &L, quote: &Quote) -> Result<bool> {
    verify_signed(ledger, quote)
}

/// Signature and expiry check as one step, with typed failures.
pub fn ensure_rfq_valid<L: LedgerBackend + ?Sized>(ledger: &L, rfq: &Rfq, now: i64) -> Result<()> {
    rfq.ensure_live(now)?;
    ensure_signed(ledger, rfq)
}

pub fn ensure_quote_valid<L: LedgerBackend + ?Sized>(
    ledger: &L,
    quote: &Quote,
    now: i64,
) -> Result<()> {
    quote.ensure_live(now)?;
    ensure_signed(ledger, quote)
}

fn ensure_signed<M, L>(ledger: &L, message: &M) -> Result<()>
where
    M: SignedMessage,
    L: LedgerBackend + ?Sized,
{
    if verify_signed(ledger, message)? {
        Ok(())
    } else {
        Err(Error::SignatureInvalid {
            kind: M::KIND,
            address: message.signer_address().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::rfq::{CreateRfqParams, create_rfq_at};
    use crate::testing::{MockLedger, lbtc, usdt};

    const NOW: i64 = 1_700_000_000;

    fn signed_rfq(ledger: &MockLedger) -> Rfq {
        let params = CreateRfqParams {
            client_address: "el1qclient".into(),
            asset_sell: lbtc(),
            asset_buy: usdt(),
            approx_amount: "1".parse().unwrap(),
            expiry_seconds: 300,
        };
        create_rfq_at(ledger, &params, NOW).unwrap()
    }

    #[test]
    fn fresh_rfq_verifies() {
        let ledger = MockLedger::new();
        let rfq = signed_rfq(&ledger);
        assert!(verify_rfq(&ledger, &rfq).unwrap());
        ensure_rfq_valid(&ledger, &rfq, NOW + 10).unwrap();
    }

    #[test]
    fn any_tampered_field_fails() {
        let ledger = MockLedger::new();
        let rfq = signed_rfq(&ledger);

        let mut t = rfq.clone();
        t.approx_amount = "1.00000001".parse().unwrap();
        assert!(!verify_rfq(&ledger, &t).unwrap());

        let mut t = rfq.clone();
        t.expiry += 1;
        assert!(!verify_rfq(&ledger, &t).unwrap());

        let mut t = rfq.clone();
        t.asset_buy = crate::testing::asset(0x55);
        assert!(!verify_rfq(&ledger, &t).unwrap());

        let mut t = rfq.clone();
        t.id.push('0');
        assert!(!verify_rfq(&ledger, &t).unwrap());

        let mut t = rfq;
        t.signature.clear();
        assert!(!verify_rfq(&ledger, &t).unwrap());
    }

    #[test]
    fn signature_from_another_address_fails() {
        let ledger = MockLedger::new();
        let mut rfq = signed_rfq(&ledger);
        rfq.client_address = "el1qmallory".into();
        assert!(matches!(
            ensure_rfq_valid(&ledger, &rfq, NOW),
            Err(Error::SignatureInvalid { kind: "rfq", .. })
        ));
    }

    #[test]
    fn expiry_is_checked_before_signature() {
        let ledger = MockLedger::new();
        let mut rfq = signed_rfq(&ledger);
        rfq.approx_amount = Amount::MIN_UNIT;
        assert!(matches!(
            ensure_rfq_valid(&ledger, &rfq, NOW + 300),
            Err(Error::Expired { kind: "rfq", .. })
        ));
    }
}
