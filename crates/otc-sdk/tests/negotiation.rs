//! RFQ and quote messages as they travel between client and dealers.

use otc_sdk::testing::{MockLedger, lbtc, usdt};
use otc_sdk::{
    CanonicalMessage, CreateRfqParams, Dealer, Error, Market, PricingPolicy, Quote, Rfq,
    collect_quotes_at, create_rfq_at, ensure_quote_valid, select_best_quote, verify_quote,
    verify_rfq,
};
use rust_decimal::Decimal;

const NOW: i64 = 1_700_000_000;
const CLIENT: &str = "el1qclient";

fn rfq(ledger: &MockLedger) -> Rfq {
    let params = CreateRfqParams {
        client_address: CLIENT.into(),
        asset_sell: lbtc(),
        asset_buy: usdt(),
        approx_amount: "1.0".parse().unwrap(),
        expiry_seconds: 300,
    };
    create_rfq_at(ledger, &params, NOW).unwrap()
}

fn desk(n: usize) -> Dealer {
    let policy = PricingPolicy::new()
        .with_market(Market {
            base: lbtc(),
            quote: usdt(),
            mid_price: format!("{}", 49_000 + n * 100).parse().unwrap(),
            spread: Decimal::new(1, 3),
        })
        .unwrap();
    Dealer::new(format!("desk-{n:02}"), format!("el1qdesk{n:02}"), policy)
}

#[test]
fn rfq_verifies_right_after_creation() {
    let ledger = MockLedger::new();
    for _ in 0..20 {
        assert!(verify_rfq(&ledger, &rfq(&ledger)).unwrap());
    }
}

#[test]
fn canonical_encoding_ignores_field_order() {
    let ledger = MockLedger::new();
    let quote = desk(10)
        .process_rfq_at(&ledger, &rfq(&ledger), NOW)
        .unwrap()
        .unwrap();

    // the same record arriving with its keys in a different order
    let shuffled = format!(
        r#"{{"signature":"{}","price":"{}","expiry":{},"exact_amount_sell":"{}","dealer_address":"{}","rfq_id":"{}","exact_amount_buy":"{}","dealer_id":"{}"}}"#,
        quote.signature,
        quote.price,
        quote.expiry,
        quote.exact_amount_sell,
        quote.dealer_address,
        quote.rfq_id,
        quote.exact_amount_buy,
        quote.dealer_id,
    );
    let parsed: Quote = serde_json::from_str(&shuffled).unwrap();
    assert_eq!(parsed, quote);
    assert_eq!(
        parsed.canonical_message().unwrap(),
        quote.canonical_message().unwrap()
    );
    assert!(verify_quote(&ledger, &parsed).unwrap());
}

#[test]
fn flipping_one_digit_breaks_the_quote_signature() {
    let ledger = MockLedger::new();
    let quote = desk(10)
        .process_rfq_at(&ledger, &rfq(&ledger), NOW)
        .unwrap()
        .unwrap();
    assert_eq!(quote.exact_amount_buy.to_string(), "49950.00000000");

    let mut t = quote.clone();
    t.exact_amount_buy = "49951.00000000".parse().unwrap();
    assert!(!verify_quote(&ledger, &t).unwrap());

    let mut t = quote.clone();
    t.price = "49950.00000001".parse().unwrap();
    assert!(!verify_quote(&ledger, &t).unwrap());

    let mut t = quote.clone();
    t.dealer_id = "desk-11".into();
    assert!(!verify_quote(&ledger, &t).unwrap());

    let mut t = quote.clone();
    t.expiry -= 1;
    assert!(!verify_quote(&ledger, &t).unwrap());
    assert!(matches!(
        ensure_quote_valid(&ledger, &t, NOW),
        Err(Error::SignatureInvalid { kind: "quote", .. })
    ));
}

#[test]
fn many_dealers_quote_concurrently() {
    let ledger = MockLedger::new();
    let rfq = rfq(&ledger);
    let dealers: Vec<Dealer> = (0..32).map(desk).collect();

    let responses = collect_quotes_at(&ledger, &rfq, &dealers, NOW);
    assert_eq!(responses.len(), 32);
    for (response, dealer) in responses.iter().zip(&dealers) {
        assert_eq!(response.dealer_id, dealer.id);
    }
    let quotes: Vec<Quote> = responses
        .into_iter()
        .map(|r| r.outcome.unwrap().unwrap())
        .collect();
    assert!(quotes.iter().all(|q| q.price_is_consistent()));

    let best = select_best_quote(&ledger, &rfq, &quotes, NOW).unwrap();
    assert_eq!(best.dealer_id, "desk-31");
}

#[test]
fn dealer_without_the_pair_declines() {
    let ledger = MockLedger::new();
    let rfq = rfq(&ledger);
    let policy = PricingPolicy::new()
        .with_market(Market {
            base: otc_sdk::testing::asset(0x42),
            quote: usdt(),
            mid_price: "1".parse().unwrap(),
            spread: Decimal::ZERO,
        })
        .unwrap();
    let dealer = Dealer::new("other", "el1qother", policy);
    let responses = collect_quotes_at(&ledger, &rfq, &[dealer], NOW);
    assert!(matches!(responses[0].outcome, Ok(None)));
}

#[test]
fn expired_rfq_is_refused_before_pricing() {
    let ledger = MockLedger::new();
    let rfq = rfq(&ledger);
    let responses = collect_quotes_at(&ledger, &rfq, &[desk(1)], rfq.expiry);
    assert!(matches!(
        responses[0].outcome,
        Err(Error::Expired { kind: "rfq", .. })
    ));
}
