use pallas_addresses::ShelleyAddress;

use crate::contract::MarketplaceValidator;
use crate::datum::{ListingDatum, Payout};
use crate::error::{Error, Result};
use crate::redeemer::MarketAction;
use crate::tx::{TransactionDraft, TxOutput};

use super::{ListingSpend, attach_listing_spend, decode_listing, key_credential, require_payouts};

/// Parameters for re-pricing a listing.
pub struct UpdateParams {
    pub owner_address: ShelleyAddress,
    pub spend: ListingSpend,
    pub new_payouts: Vec<Payout>,
}

/// Build the draft replacing a listing's payouts, keeping its owner and
/// its place under the validator.
pub fn build_update_draft(
    validator: &MarketplaceValidator,
    params: &UpdateParams,
) -> Result<TransactionDraft> {
    let owner = key_credential(&params.owner_address, "update")?;
    let datum = decode_listing(validator, &params.spend)?;
    if datum.owner != owner {
        return Err(Error::precondition("must be owner to update"));
    }
    require_payouts(&params.new_payouts)?;

    let listing = &params.spend.listing;
    let listing_address = listing
        .output
        .shelley_address()
        .cloned()
        .unwrap_or_else(|| validator.address());
    let updated = ListingDatum {
        payouts: params.new_payouts.clone(),
        owner: datum.owner,
    };

    let mut draft = TransactionDraft::new(params.owner_address.clone());
    draft.add_output(
        TxOutput::new(&listing_address, listing.value().assets_only())
            .with_inline_datum(updated.to_plutus_data(validator.layout())?),
    );
    attach_listing_spend(
        &mut draft,
        &params.spend,
        MarketAction::WithdrawOrUpdate.to_plutus_data(),
    );
    draft.add_signer(owner);

    log::debug!(
        "update draft for {}: {} -> {} payouts",
        listing.input,
        datum.payouts.len(),
        updated.payouts.len()
    );
    Ok(draft)
}
