//! Planning and executing settlements against the in-memory ledger.

use otc_sdk::testing::{MockLedger, lbtc, usdt};
use otc_sdk::{
    Amount, CreateRfqParams, Dealer, Error, LedgerBackend, Market, OutputRole, Party,
    PricingPolicy, Quote, Rfq, SettlementPolicy, SettlementSigners, SignerBook, TxOutput,
    collect_quotes_at, create_rfq_at, execute_settlement, plan_settlement, settle,
};
use rust_decimal::Decimal;

const NOW: i64 = 1_700_000_000;
const CLIENT: &str = "el1qclient";
const ALPHA: &str = "el1qalpha";
const BETA: &str = "el1qbeta";

// ── Helpers ─────────────────────────────────────────────────────────────

fn amt(s: &str) -> Amount {
    s.parse().unwrap()
}

fn dealer(id: &str, address: &str, mid: &str, spread: Decimal) -> Dealer {
    let policy = PricingPolicy::new()
        .with_market(Market {
            base: lbtc(),
            quote: usdt(),
            mid_price: mid.parse().unwrap(),
            spread,
        })
        .unwrap();
    Dealer::new(id, address, policy)
}

fn alpha() -> Dealer {
    dealer("Dealer_Alpha", ALPHA, "50000", Decimal::new(1, 3))
}

fn beta() -> Dealer {
    dealer("Dealer_Beta", BETA, "49900", Decimal::new(1, 3))
}

fn funded_ledger() -> MockLedger {
    let ledger = MockLedger::new();
    ledger.add_utxo(CLIENT, lbtc(), "2");
    ledger.add_utxo(ALPHA, usdt(), "100000");
    ledger.add_utxo(BETA, usdt(), "100000");
    ledger
}

fn sell_btc_rfq(ledger: &MockLedger, amount: &str) -> Rfq {
    let params = CreateRfqParams {
        client_address: CLIENT.into(),
        asset_sell: lbtc(),
        asset_buy: usdt(),
        approx_amount: amt(amount),
        expiry_seconds: 300,
    };
    create_rfq_at(ledger, &params, NOW).unwrap()
}

fn quote_from(ledger: &MockLedger, dealer: &Dealer, rfq: &Rfq) -> Quote {
    dealer.process_rfq_at(ledger, rfq, NOW).unwrap().unwrap()
}

const EXECUTOR_STEPS: [&str; 7] = [
    "build_transaction",
    "attach_input_metadata",
    "blind",
    "partial_sign",
    "partial_sign",
    "finalize",
    "broadcast",
];

// ── End to end ──────────────────────────────────────────────────────────

#[test]
fn reference_scenario_settles_at_49950() {
    let ledger = funded_ledger();
    let rfq = sell_btc_rfq(&ledger, "1.0");

    let responses = collect_quotes_at(&ledger, &rfq, &[alpha(), beta()], NOW);
    let quotes: Vec<Quote> = responses
        .into_iter()
        .filter_map(|r| r.outcome.unwrap())
        .collect();
    assert_eq!(quotes.len(), 2);

    let signers = SignerBook::new(CLIENT)
        .with_dealer("Dealer_Alpha", ALPHA)
        .with_dealer("Dealer_Beta", BETA);
    let receipt = settle(
        &ledger,
        &rfq,
        &quotes,
        &SettlementPolicy::default(),
        &signers,
        NOW + 5,
    )
    .unwrap();

    assert_eq!(receipt.quote.dealer_id, "Dealer_Alpha");
    assert_eq!(receipt.quote.exact_amount_buy.to_string(), "49950.00000000");
    assert!(receipt.plan.is_balanced());

    // both legs moved in the one transaction
    assert_eq!(ledger.balance(CLIENT, usdt()), amt("49950"));
    assert_eq!(ledger.balance(CLIENT, lbtc()), amt("0.99999"));
    assert_eq!(ledger.balance(ALPHA, usdt()), amt("50050"));
    assert_eq!(
        ledger.balance(&receipt.plan.protected_address, lbtc()),
        amt("1")
    );
    assert_eq!(ledger.balance(BETA, usdt()), amt("100000"));
}

#[test]
fn separate_wallets_settle_through_each_partys_view() {
    let ledger = funded_ledger();
    ledger.assign_wallet(CLIENT, "client-w");
    ledger.assign_wallet(ALPHA, "alpha-w");
    ledger.assign_wallet(BETA, "beta-w");
    let client = ledger.wallet_view("client-w").unwrap();

    let rfq = sell_btc_rfq(&ledger, "1");
    let quotes = vec![quote_from(&ledger, &alpha(), &rfq), quote_from(&ledger, &beta(), &rfq)];
    let policy = SettlementPolicy::default();

    // the client wallet alone cannot see the dealer's coins
    let err = plan_settlement(&client, &rfq, &quotes[0], &policy, NOW).unwrap_err();
    assert!(matches!(
        err,
        Error::InsufficientFunds {
            party: Party::Dealer,
            ..
        }
    ));
    assert!(matches!(
        client.address_info(ALPHA),
        Err(Error::Descriptor(_))
    ));

    let signers = SignerBook::new("client-w")
        .with_dealer("Dealer_Alpha", "alpha-w")
        .with_dealer("Dealer_Beta", "beta-w");
    let receipt = settle(&client, &rfq, &quotes, &policy, &signers, NOW + 5).unwrap();

    assert_eq!(receipt.quote.dealer_id, "Dealer_Alpha");
    assert_eq!(ledger.balance(CLIENT, usdt()), amt("49950"));
    assert_eq!(ledger.balance(CLIENT, lbtc()), amt("0.99999"));
    assert_eq!(ledger.balance(ALPHA, usdt()), amt("50050"));
    assert_eq!(ledger.balance(BETA, usdt()), amt("100000"));
}

#[test]
fn executor_runs_steps_in_order() {
    let ledger = funded_ledger();
    let rfq = sell_btc_rfq(&ledger, "1");
    let quote = quote_from(&ledger, &alpha(), &rfq);
    let plan = plan_settlement(&ledger, &rfq, &quote, &SettlementPolicy::default(), NOW).unwrap();

    let before = ledger.calls().len();
    let txid = execute_settlement(&ledger, &plan, &SettlementSigners::new(ALPHA, CLIENT)).unwrap();
    assert_eq!(txid.len(), 64);
    assert_eq!(&ledger.calls()[before..], EXECUTOR_STEPS);
}

// ── Planning ────────────────────────────────────────────────────────────

#[test]
fn plan_layout_and_change_identities() {
    let ledger = funded_ledger();
    let rfq = sell_btc_rfq(&ledger, "1");
    let quote = quote_from(&ledger, &alpha(), &rfq);
    let policy = SettlementPolicy::default();
    let plan = plan_settlement(&ledger, &rfq, &quote, &policy, NOW).unwrap();

    let parties: Vec<Party> = plan.inputs.iter().map(|i| i.party).collect();
    assert_eq!(parties, [Party::Dealer, Party::Client]);
    let roles: Vec<OutputRole> = plan.outputs.iter().map(|o| o.role).collect();
    assert_eq!(
        roles,
        [
            OutputRole::ClientReceive,
            OutputRole::DealerProtected,
            OutputRole::DealerChange,
            OutputRole::ClientChange,
            OutputRole::Fee,
        ]
    );

    let dealer_utxo = plan.inputs[0].utxo.amount;
    let client_utxo = plan.inputs[1].utxo.amount;
    assert_eq!(
        plan.dealer_change.checked_add(quote.exact_amount_buy).unwrap(),
        dealer_utxo
    );
    assert_eq!(
        plan.client_change
            .checked_add(quote.exact_amount_sell)
            .unwrap()
            .checked_add(plan.fee)
            .unwrap(),
        client_utxo
    );
    assert!(plan.is_balanced());

    match plan.output(OutputRole::DealerProtected).unwrap() {
        TxOutput::Payment {
            address, amount, ..
        } => {
            assert_eq!(address, &plan.protected_address);
            assert_ne!(address, ALPHA);
            assert_eq!(*amount, quote.exact_amount_sell);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(plan.protection_descriptor.starts_with("elwsh(or_d(pk("));
    assert!(plan.protection_descriptor.ends_with("older(144))))"));
}

#[test]
fn planning_is_idempotent() {
    let ledger = funded_ledger();
    let rfq = sell_btc_rfq(&ledger, "1");
    let quote = quote_from(&ledger, &alpha(), &rfq);
    let policy = SettlementPolicy::default();
    let first = plan_settlement(&ledger, &rfq, &quote, &policy, NOW).unwrap();
    let second = plan_settlement(&ledger, &rfq, &quote, &policy, NOW + 1).unwrap();
    assert_eq!(first, second);
}

#[test]
fn exact_utxos_produce_no_change_outputs() {
    let ledger = MockLedger::new();
    ledger.add_utxo(CLIENT, lbtc(), "1.00001");
    ledger.add_utxo(ALPHA, usdt(), "49950");
    let rfq = sell_btc_rfq(&ledger, "1");
    let quote = quote_from(&ledger, &alpha(), &rfq);
    let plan = plan_settlement(&ledger, &rfq, &quote, &SettlementPolicy::default(), NOW).unwrap();

    assert_eq!(plan.dealer_change, Amount::ZERO);
    assert_eq!(plan.client_change, Amount::ZERO);
    assert_eq!(plan.outputs.len(), 3);
    assert!(plan.output(OutputRole::DealerChange).is_none());
    assert!(plan.output(OutputRole::ClientChange).is_none());
    assert!(plan.is_balanced());
}

#[test]
fn one_unit_of_change_is_kept() {
    let ledger = MockLedger::new();
    ledger.add_utxo(CLIENT, lbtc(), "1.00001001");
    ledger.add_utxo(ALPHA, usdt(), "49950");
    let rfq = sell_btc_rfq(&ledger, "1");
    let quote = quote_from(&ledger, &alpha(), &rfq);
    let plan = plan_settlement(&ledger, &rfq, &quote, &SettlementPolicy::default(), NOW).unwrap();
    assert_eq!(plan.client_change, Amount::MIN_UNIT);
    assert!(plan.output(OutputRole::ClientChange).is_some());
    assert!(plan.is_balanced());
}

#[test]
fn dealer_short_of_funds_fails_without_plan() {
    // client sells 50000 USDt for ~1.0 L-BTC; the dealer only holds 0.5
    let ledger = MockLedger::new();
    ledger.add_utxo(CLIENT, usdt(), "60000");
    ledger.add_utxo(ALPHA, lbtc(), "0.5");
    let params = CreateRfqParams {
        client_address: CLIENT.into(),
        asset_sell: usdt(),
        asset_buy: lbtc(),
        approx_amount: amt("50000"),
        expiry_seconds: 300,
    };
    let rfq = create_rfq_at(&ledger, &params, NOW).unwrap();
    let quote = quote_from(
        &ledger,
        &dealer("Dealer_Alpha", ALPHA, "50000", Decimal::ZERO),
        &rfq,
    );
    assert_eq!(quote.exact_amount_buy, amt("1"));

    let err = plan_settlement(&ledger, &rfq, &quote, &SettlementPolicy::default(), NOW)
        .unwrap_err();
    match err {
        Error::InsufficientFunds {
            party,
            asset,
            required,
        } => {
            assert_eq!(party, Party::Dealer);
            assert_eq!(asset, lbtc());
            assert_eq!(required, amt("1"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn client_must_cover_amount_plus_fee() {
    let ledger = MockLedger::new();
    ledger.add_utxo(CLIENT, lbtc(), "1");
    ledger.add_utxo(ALPHA, usdt(), "100000");
    let rfq = sell_btc_rfq(&ledger, "1");
    let quote = quote_from(&ledger, &alpha(), &rfq);
    let err = plan_settlement(&ledger, &rfq, &quote, &SettlementPolicy::default(), NOW)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InsufficientFunds {
            party: Party::Client,
            ..
        }
    ));
}

#[test]
fn expired_quote_is_rejected_despite_valid_signature() {
    let ledger = funded_ledger();
    let rfq = sell_btc_rfq(&ledger, "1");
    let quote = quote_from(&ledger, &alpha(), &rfq);
    assert!(otc_sdk::verify_quote(&ledger, &quote).unwrap());

    let err = plan_settlement(
        &ledger,
        &rfq,
        &quote,
        &SettlementPolicy::default(),
        quote.expiry,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Expired { kind: "quote", .. }));
}

#[test]
fn quote_for_another_rfq_is_rejected() {
    let ledger = funded_ledger();
    let rfq = sell_btc_rfq(&ledger, "1");
    let other = sell_btc_rfq(&ledger, "1");
    let quote = quote_from(&ledger, &alpha(), &other);
    let err = plan_settlement(&ledger, &rfq, &quote, &SettlementPolicy::default(), NOW)
        .unwrap_err();
    assert!(matches!(err, Error::QuoteMismatch { .. }));
}

#[test]
fn fee_policy_is_enforced() {
    let ledger = funded_ledger();
    let rfq = sell_btc_rfq(&ledger, "1");
    let quote = quote_from(&ledger, &alpha(), &rfq);

    let zero_fee = SettlementPolicy {
        fee: Amount::ZERO,
        ..SettlementPolicy::default()
    };
    assert!(matches!(
        plan_settlement(&ledger, &rfq, &quote, &zero_fee, NOW),
        Err(Error::FeePolicy(_))
    ));

    let wrong_asset = SettlementPolicy {
        fee_asset: Some(usdt()),
        ..SettlementPolicy::default()
    };
    assert!(matches!(
        plan_settlement(&ledger, &rfq, &quote, &wrong_asset, NOW),
        Err(Error::FeePolicy(_))
    ));

    let right_asset = SettlementPolicy {
        fee_asset: Some(lbtc()),
        ..SettlementPolicy::default()
    };
    assert!(plan_settlement(&ledger, &rfq, &quote, &right_asset, NOW).is_ok());
}

#[test]
fn descriptor_registration_failures() {
    let ledger = funded_ledger();
    let rfq = sell_btc_rfq(&ledger, "1");
    let quote = quote_from(&ledger, &alpha(), &rfq);
    let policy = SettlementPolicy::default();

    ledger.fail_import("Address already in wallet");
    assert!(plan_settlement(&ledger, &rfq, &quote, &policy, NOW).is_ok());

    ledger.fail_import("Rescan is disabled when blocks are pruned");
    assert!(matches!(
        plan_settlement(&ledger, &rfq, &quote, &policy, NOW),
        Err(Error::DescriptorImport(_))
    ));
}

#[test]
fn mismatched_derived_descriptor_is_refused() {
    let ledger = funded_ledger();
    let rfq = sell_btc_rfq(&ledger, "1");
    let quote = quote_from(&ledger, &alpha(), &rfq);
    ledger.tamper_descriptor();
    assert!(matches!(
        plan_settlement(&ledger, &rfq, &quote, &SettlementPolicy::default(), NOW),
        Err(Error::Descriptor(_))
    ));
}

// ── Execution failures ──────────────────────────────────────────────────

fn planned(ledger: &MockLedger) -> otc_sdk::SettlementPlan {
    let rfq = sell_btc_rfq(ledger, "1");
    let quote = quote_from(ledger, &alpha(), &rfq);
    plan_settlement(ledger, &rfq, &quote, &SettlementPolicy::default(), NOW).unwrap()
}

#[test]
fn dealer_that_adds_no_signature_stops_execution() {
    let ledger = funded_ledger();
    let plan = planned(&ledger);
    ledger.sign_incomplete(ALPHA);
    let err = execute_settlement(&ledger, &plan, &SettlementSigners::new(ALPHA, CLIENT))
        .unwrap_err();
    assert!(matches!(err, Error::IncompleteSignature(Party::Dealer)));
    assert!(!ledger.calls().contains(&"broadcast"));
    assert_eq!(ledger.balance(CLIENT, lbtc()), amt("2"));
}

#[test]
fn client_signature_must_complete_the_transaction() {
    let ledger = funded_ledger();
    let plan = planned(&ledger);
    ledger.sign_incomplete(CLIENT);
    let err = execute_settlement(&ledger, &plan, &SettlementSigners::new(ALPHA, CLIENT))
        .unwrap_err();
    assert!(matches!(err, Error::IncompleteSignature(Party::Client)));

    // a signer owning no input leaves the transaction incomplete too
    let ledger = funded_ledger();
    let plan = planned(&ledger);
    let err = execute_settlement(&ledger, &plan, &SettlementSigners::new(ALPHA, BETA))
        .unwrap_err();
    assert!(matches!(err, Error::IncompleteSignature(Party::Client)));
}

#[test]
fn incomplete_finalization_is_reported() {
    let ledger = funded_ledger();
    let plan = planned(&ledger);
    ledger.fail_finalize();
    let err = execute_settlement(&ledger, &plan, &SettlementSigners::new(ALPHA, CLIENT))
        .unwrap_err();
    assert!(matches!(err, Error::Finalization));
    assert!(!ledger.calls().contains(&"broadcast"));
}

#[test]
fn spent_inputs_cannot_settle_twice() {
    let ledger = funded_ledger();
    let plan = planned(&ledger);
    let signers = SettlementSigners::new(ALPHA, CLIENT);
    execute_settlement(&ledger, &plan, &signers).unwrap();
    assert!(execute_settlement(&ledger, &plan, &signers).is_err());
    assert!(ledger.list_utxos(CLIENT, Some(&usdt())).unwrap().len() == 1);
}
