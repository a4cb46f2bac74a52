use pallas_addresses::ShelleyAddress;

use crate::contract::MarketplaceValidator;
use crate::datum::{ListingDatum, Payout};
use crate::error::{Error, Result};
use crate::tx::{AssetName, PolicyId, TransactionDraft, TxOutput, Utxo, Value};

use super::{key_credential, require_payouts};

/// Parameters for listing a handle.
pub struct ListParams {
    /// Seller's address; receives change and becomes the listing owner.
    pub owner_address: ShelleyAddress,
    pub wallet_utxos: Vec<Utxo>,
    pub policy: PolicyId,
    pub handle: AssetName,
    pub payouts: Vec<Payout>,
}

/// Build the draft locking the handle at the validator with a fresh
/// listing datum.
pub fn build_list_draft(
    validator: &MarketplaceValidator,
    params: &ListParams,
) -> Result<TransactionDraft> {
    let owner = key_credential(&params.owner_address, "list")?;
    require_payouts(&params.payouts)?;

    let handle_value = Value::token(params.policy, params.handle.clone(), 1);
    let handle_input = params
        .wallet_utxos
        .iter()
        .find(|u| u.value().covers(&handle_value))
        .ok_or_else(|| Error::precondition("you don't have the handle to list"))?;

    let datum = ListingDatum {
        payouts: params.payouts.clone(),
        owner,
    };

    let mut draft = TransactionDraft::new(params.owner_address.clone());
    draft.add_input(handle_input.clone());
    draft.add_output(
        TxOutput::new(&validator.address(), handle_value)
            .with_inline_datum(datum.to_plutus_data(validator.layout())?),
    );
    draft.add_signer(owner);

    log::debug!(
        "list draft: handle input {}, {} payouts",
        handle_input.input,
        params.payouts.len()
    );
    Ok(draft)
}
