use pallas_addresses::ShelleyAddress;

use crate::address::script_address;
use crate::config::handle_asset_name;
use crate::contract::MarketplaceValidator;
use crate::error::{Error, Result};
use crate::plutus_data::to_vec;
use crate::tx::{
    NativeScript, PolicyId, TransactionDraft, TxOutput, Utxo, Value, native_script_hash,
};

use super::key_credential;

/// Parameters for publishing the validator as a reference script.
pub struct DeployParams {
    pub owner_address: ShelleyAddress,
    pub wallet_utxos: Vec<Utxo>,
    pub policy: PolicyId,
    /// Handle (without `$`) that marks the deployment output.
    pub handle: String,
    /// Slot after which the owner may reclaim the deployment output.
    pub valid_from_slot: u64,
}

/// A deploy draft and the native script guarding its output.
#[derive(Debug, Clone)]
pub struct DeployDraft {
    pub draft: TransactionDraft,
    pub locker_script: NativeScript,
    pub locker_address: ShelleyAddress,
}

/// Build the draft placing the handle, the parameters datum and the
/// validator program at a time-and-signature locked address.
///
/// The deployment output is always output 0.
pub fn build_deploy_draft(
    validator: &MarketplaceValidator,
    params: &DeployParams,
) -> Result<DeployDraft> {
    let owner = key_credential(&params.owner_address, "deploy")?;

    let locker_script = NativeScript::ScriptAll(vec![
        NativeScript::InvalidBefore(params.valid_from_slot),
        NativeScript::ScriptPubkey(owner),
    ]);
    let locker_address = script_address(validator.network(), native_script_hash(&locker_script));

    let handle_value = Value::token(params.policy, handle_asset_name(&params.handle), 1);
    let handle_input = params
        .wallet_utxos
        .iter()
        .find(|u| u.value().covers(&handle_value))
        .ok_or_else(|| Error::precondition(format!("you don't have ${} handle", params.handle)))?;

    let mut draft = TransactionDraft::new(params.owner_address.clone());
    draft.add_output(
        TxOutput::new(&locker_address, handle_value)
            .with_inline_datum(validator.parameters().to_datum())
            .with_script_ref(validator.script_ref()),
    );
    draft.add_input(handle_input.clone());

    log::info!(
        "deploy locker script {} at {}",
        hex::encode(to_vec(&locker_script)),
        crate::address::to_bech32(&locker_address)
    );
    Ok(DeployDraft {
        draft,
        locker_script,
        locker_address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Credential, payment_credential};
    use crate::ops::fixtures::{policy, validator};
    use crate::params::MarketplaceParameters;
    use crate::testing::{key_address, wallet_utxo};
    use pallas_crypto::hash::Hash;

    fn params() -> DeployParams {
        let owner = key_address(1);
        DeployParams {
            wallet_utxos: vec![
                wallet_utxo(1, &owner, Value::lovelace(80_000_000)),
                wallet_utxo(
                    2,
                    &owner,
                    Value::lovelace(1_500_000).with_asset(policy(), handle_asset_name("mkt"), 1),
                ),
            ],
            owner_address: owner,
            policy: policy(),
            handle: "mkt".into(),
            valid_from_slot: 1_000,
        }
    }

    #[test]
    fn deployment_output_carries_handle_datum_and_script() {
        let v = validator();
        let deploy = build_deploy_draft(&v, &params()).unwrap();

        let out = &deploy.draft.outputs[0];
        assert_eq!(out.shelley_address(), Some(&deploy.locker_address));
        assert_eq!(
            out.value.quantity_of(&policy(), &handle_asset_name("mkt")),
            1
        );
        let parameters =
            MarketplaceParameters::from_datum(out.inline_datum().unwrap(), v.network()).unwrap();
        assert_eq!(&parameters, v.parameters());
        assert_eq!(out.script_ref.as_ref().unwrap().hash(), *v.hash());

        assert_eq!(deploy.draft.inputs.len(), 1);
        assert_eq!(deploy.draft.inputs[0].utxo.input.tx_hash, Hash::new([2; 32]));
    }

    #[test]
    fn locker_requires_owner_and_time() {
        let v = validator();
        let deploy = build_deploy_draft(&v, &params()).unwrap();
        assert_eq!(
            deploy.locker_script,
            NativeScript::ScriptAll(vec![
                NativeScript::InvalidBefore(1_000),
                NativeScript::ScriptPubkey(Hash::new([1; 28])),
            ])
        );
        assert_eq!(
            payment_credential(&deploy.locker_address),
            Credential::Script(native_script_hash(&deploy.locker_script))
        );
    }

    #[test]
    fn missing_handle_names_it() {
        let v = validator();
        let mut p = params();
        p.handle = "absent".into();
        let err = build_deploy_draft(&v, &p).unwrap_err();
        assert_eq!(err.to_string(), "you don't have $absent handle");
    }
}
