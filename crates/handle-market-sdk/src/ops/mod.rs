//! Per-operation draft builders.
//!
//! Each builder takes chain data that has already been fetched and returns an
//! unbalanced [`TransactionDraft`]. Every precondition is checked here, before
//! any signing or submission can happen.

pub mod buy;
pub mod deploy;
pub mod list;
pub mod update;
pub mod withdraw;

use pallas_addresses::ShelleyAddress;
use pallas_crypto::hash::Hash;

use crate::address::{Credential, payment_credential, payment_key_hash};
use crate::contract::MarketplaceValidator;
use crate::datum::{ListingDatum, Payout};
use crate::error::{DecodeError, Error, Result};
use crate::plutus_data::{PlutusData, PlutusDataExt};
use crate::tx::{AssetName, PolicyId, TransactionDraft, Utxo};

pub use buy::{BuyDraft, BuyParams, build_buy_draft, build_buy_with_auth_draft};
pub use deploy::{DeployDraft, DeployParams, build_deploy_draft};
pub use list::{ListParams, build_list_draft};
pub use update::{UpdateParams, build_update_draft};
pub use withdraw::{WithdrawParams, build_withdraw_draft};

/// A listed handle about to be spent, together with the validator's
/// reference output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingSpend {
    pub listing: Utxo,
    /// Output carrying the validator as a reference script.
    pub reference: Utxo,
    pub policy: PolicyId,
    pub handle: AssetName,
    /// Explicit collateral; chosen from the wallet when absent.
    pub collateral: Option<Utxo>,
}

/// Payment key hash of `address`, which must be able to sign.
pub(crate) fn key_credential(address: &ShelleyAddress, action: &str) -> Result<Hash<28>> {
    payment_key_hash(address)
        .ok_or_else(|| Error::precondition(format!("must be a base address to perform {action}")))
}

pub(crate) fn require_payouts(payouts: &[Payout]) -> Result<()> {
    if payouts.is_empty() {
        return Err(Error::precondition("a listing needs at least one payout"));
    }
    Ok(())
}

/// Check the listing and reference outputs against `validator` and decode
/// the listing datum.
pub(crate) fn decode_listing(
    validator: &MarketplaceValidator,
    spend: &ListingSpend,
) -> Result<ListingDatum> {
    if spend.listing.value().quantity_of(&spend.policy, &spend.handle) == 0 {
        return Err(Error::precondition("listing UTxO doesn't have handle in it"));
    }

    let at_validator = spend
        .listing
        .output
        .shelley_address()
        .map(payment_credential)
        == Some(Credential::Script(*validator.hash()));
    if !at_validator {
        return Err(Error::precondition(format!(
            "listing UTxO {} is not locked by the marketplace validator",
            spend.listing.input
        )));
    }

    let carries_validator = spend
        .reference
        .output
        .script_ref
        .as_ref()
        .is_some_and(|s| s.hash() == *validator.hash());
    if !carries_validator {
        return Err(Error::precondition(format!(
            "reference UTxO {} does not carry the marketplace validator",
            spend.reference.input
        )));
    }

    let datum = spend
        .listing
        .output
        .inline_datum()
        .ok_or(DecodeError::MissingDatum)?;
    Ok(ListingDatum::from_plutus_data(
        datum,
        validator.network(),
        validator.layout(),
    )?)
}

/// Spend the listing with `redeemer`, referencing the validator.
pub(crate) fn attach_listing_spend(
    draft: &mut TransactionDraft,
    spend: &ListingSpend,
    redeemer: PlutusData,
) {
    draft.add_reference_input(spend.reference.clone());
    draft.add_script_input(spend.listing.clone(), redeemer);
    if let Some(collateral) = &spend.collateral {
        draft.collateral.push(collateral.clone());
    }
}

/// Shared test fixtures for the operation builders.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::datum::{DatumLayout, Payout};
    use crate::network::Network;
    use crate::params::MarketplaceParameters;
    use crate::testing::{MockVm, key_address};
    use crate::tx::{TxOutRef, TxOutput, Value};

    pub fn policy() -> PolicyId {
        Hash::new([0xf0; 28])
    }

    pub fn handle() -> AssetName {
        crate::config::handle_asset_name("mkt")
    }

    pub fn validator() -> MarketplaceValidator {
        let params = MarketplaceParameters::new(key_address(50), vec![Hash::new([60; 28])]);
        let vm = MockVm::default();
        let compiled =
            MarketplaceValidator::compile(&vm, b"base", b"debug", params, Network::Preprod)
                .unwrap();
        let reference = TxOutRef::new(Hash::new([77; 32]), 0);
        let record = compiled.to_record("mkt", Some((reference, &key_address(70))));
        MarketplaceValidator::from_record(&record, Network::Preprod).unwrap()
    }

    pub fn datum(owner_seed: u8) -> ListingDatum {
        ListingDatum {
            payouts: vec![
                Payout::new(key_address(10), 90_000_000),
                Payout::new(key_address(11), 10_000_000),
            ],
            owner: Hash::new([owner_seed; 28]),
        }
    }

    pub fn spend(validator: &MarketplaceValidator, datum: &ListingDatum) -> ListingSpend {
        let listing = Utxo::new(
            TxOutRef::new(Hash::new([40; 32]), 1),
            TxOutput::new(
                &validator.address(),
                Value::lovelace(2_000_000).with_asset(policy(), handle(), 1),
            )
            .with_inline_datum(datum.to_plutus_data(DatumLayout::Current).unwrap()),
        );
        let reference = Utxo::new(
            TxOutRef::new(Hash::new([77; 32]), 0),
            TxOutput::new(&key_address(70), Value::lovelace(20_000_000))
                .with_script_ref(validator.script_ref()),
        );
        ListingSpend {
            listing,
            reference,
            policy: policy(),
            handle: handle(),
            collateral: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::testing::{key_address, script_utxo};
    use crate::tx::Value;

    #[test]
    fn script_address_cannot_sign() {
        let v = validator();
        let err = key_credential(&v.address(), "list").unwrap_err();
        assert_eq!(err.to_string(), "must be a base address to perform list");
        assert_eq!(key_credential(&key_address(3), "list").unwrap(), Hash::new([3; 28]));
    }

    #[test]
    fn listing_decodes_against_validator() {
        let v = validator();
        let d = datum(5);
        assert_eq!(decode_listing(&v, &spend(&v, &d)).unwrap(), d);
    }

    #[test]
    fn listing_without_handle_is_rejected() {
        let v = validator();
        let mut s = spend(&v, &datum(5));
        s.handle = crate::config::handle_asset_name("other");
        assert!(matches!(decode_listing(&v, &s), Err(Error::Precondition(_))));
    }

    #[test]
    fn listing_elsewhere_is_rejected() {
        let v = validator();
        let mut s = spend(&v, &datum(5));
        // Same datum and token, but under a different script.
        let foreign = script_utxo(
            41,
            Value::lovelace(2_000_000).with_asset(policy(), handle(), 1),
            datum(5).to_plutus_data(v.layout()).unwrap(),
        );
        s.listing = foreign;
        assert!(matches!(decode_listing(&v, &s), Err(Error::Precondition(_))));
    }

    #[test]
    fn listing_without_datum_is_a_decode_error() {
        let v = validator();
        let mut s = spend(&v, &datum(5));
        s.listing.output.datum = None;
        assert!(matches!(
            decode_listing(&v, &s),
            Err(Error::Decode(DecodeError::MissingDatum))
        ));
    }

    #[test]
    fn reference_must_hold_validator() {
        let v = validator();
        let mut s = spend(&v, &datum(5));
        s.reference.output.script_ref = None;
        assert!(matches!(decode_listing(&v, &s), Err(Error::Precondition(_))));
    }
}
