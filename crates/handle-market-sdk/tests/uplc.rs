//! Listing and buying against real Plutus programs evaluated by `UplcVm`.

use handle_market_sdk::testing::{
    MemoryDeploymentStore, MockChain, MockSigner, deployed_validator, key_address,
    preprod_protocol, test_config, wallet_utxo,
};
use handle_market_sdk::{
    BuyRequest, Error, LOVELACE_PER_ADA, ListRequest, MarketConfig, MarketplaceSdk, Network,
    Payout, TxOutRef, UplcVm, Value, handle_asset_name,
};
use uplc::ast::{DeBruijn, Name, Program};

const ADA: u64 = LOVELACE_PER_ADA;

type Sdk = MarketplaceSdk<MockChain, UplcVm, MemoryDeploymentStore>;

/// Two parameters, then datum, redeemer and context.
const APPROVE: &str = "(program 1.0.0 (lam fee (lam auth (lam datum (lam redeemer (lam ctx (con unit ())))))))";

const REJECT: &str = "(program 1.0.0 (lam fee (lam auth (lam datum (lam redeemer (lam ctx (error)))))))";

const REJECT_TRACED: &str = r#"(program 1.0.0 (lam fee (lam auth (lam datum (lam redeemer (lam ctx
    (force [(force (builtin trace)) (con string "marketplace fee output missing") (delay (error))])))))))"#;

fn compile(source: &str) -> Vec<u8> {
    let named: Program<Name> = uplc::parser::program(source).unwrap();
    let program: Program<DeBruijn> = named.try_into().unwrap();
    program.to_cbor().unwrap()
}

fn market(program: &str, debug_program: &str) -> Sdk {
    let vm = UplcVm::new();
    let (record, reference) = deployed_validator(&vm, &compile(program), &compile(debug_program));
    let handle = Value::lovelace(1_500_000).with_asset(
        MarketConfig::default().handle_policy_id,
        handle_asset_name("alice"),
        1,
    );
    let chain = MockChain::new(preprod_protocol()).with_utxos(vec![
        reference,
        wallet_utxo(1, &key_address(1), Value::lovelace(50 * ADA)),
        wallet_utxo(4, &key_address(1), handle),
        wallet_utxo(3, &key_address(2), Value::lovelace(200 * ADA)),
    ]);
    MarketplaceSdk::new(
        Network::Preprod,
        test_config(),
        chain,
        vm,
        MemoryDeploymentStore::with(Network::Preprod, record),
    )
}

fn list_alice(sdk: &Sdk) -> TxOutRef {
    let listed = sdk
        .list(&ListRequest {
            owner_address: key_address(1),
            handle: handle_asset_name("alice"),
            payouts: vec![Payout::new(key_address(10), 100 * ADA)],
            custom_deployment: None,
            wallet_utxos: None,
        })
        .unwrap();
    let tx_hash = sdk
        .sign_and_submit(&listed, &[&MockSigner::new(1)])
        .unwrap();
    TxOutRef::new(tx_hash, 0)
}

fn buy(listing: TxOutRef) -> BuyRequest {
    BuyRequest {
        buyer_address: key_address(2),
        listing,
        handle: handle_asset_name("alice"),
        collateral: None,
        custom_deployment: None,
        wallet_utxos: None,
    }
}

#[test]
fn approving_validator_is_priced_by_evaluation() {
    let sdk = market(APPROVE, APPROVE);
    let listing = list_alice(&sdk);

    let bought = sdk.buy(&buy(listing)).unwrap();

    let dump: serde_json::Value = serde_json::from_str(&bought.tx.dump).unwrap();
    let redeemer = &dump["redeemers"][0];
    assert!(redeemer["mem"].as_u64().unwrap() > 0);
    assert!(redeemer["steps"].as_u64().unwrap() > 0);
    // Far below the per-transaction maximum the first pass assumes.
    assert!(redeemer["mem"].as_u64().unwrap() < 14_000_000);

    sdk.sign_and_submit(&bought.tx, &[&MockSigner::new(2)])
        .unwrap();
}

#[test]
fn rejecting_validator_is_traced_with_the_unoptimized_program() {
    let sdk = market(REJECT, REJECT_TRACED);
    let listing = list_alice(&sdk);

    let err = sdk.buy(&buy(listing)).unwrap_err();
    let Error::Validation(failure) = err else {
        panic!("expected validation failure, got {err:?}");
    };
    assert!(!failure.message.is_empty());
    let trace = failure.trace.unwrap();
    assert!(trace.contains("marketplace fee output missing"), "{trace}");
}
