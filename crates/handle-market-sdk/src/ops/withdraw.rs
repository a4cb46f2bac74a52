use pallas_addresses::ShelleyAddress;

use crate::contract::MarketplaceValidator;
use crate::error::{Error, Result};
use crate::redeemer::MarketAction;
use crate::tx::{TransactionDraft, TxOutput};

use super::{ListingSpend, attach_listing_spend, decode_listing, key_credential};

/// Parameters for taking a handle off the market.
pub struct WithdrawParams {
    pub owner_address: ShelleyAddress,
    pub spend: ListingSpend,
}

/// Build the draft returning a listed handle to its owner, datum-free.
pub fn build_withdraw_draft(
    validator: &MarketplaceValidator,
    params: &WithdrawParams,
) -> Result<TransactionDraft> {
    let owner = key_credential(&params.owner_address, "withdraw")?;
    let datum = decode_listing(validator, &params.spend)?;
    if datum.owner != owner {
        return Err(Error::precondition("must be owner to withdraw"));
    }

    let listing = &params.spend.listing;
    let mut draft = TransactionDraft::new(params.owner_address.clone());
    draft.add_output(TxOutput::new(
        &params.owner_address,
        listing.value().assets_only(),
    ));
    attach_listing_spend(
        &mut draft,
        &params.spend,
        MarketAction::WithdrawOrUpdate.to_plutus_data(),
    );
    draft.add_signer(owner);

    log::debug!("withdraw draft for {}", listing.input);
    Ok(draft)
}
