use pallas_addresses::ShelleyAddress;
use pallas_crypto::hash::Hash;

use crate::contract::MarketplaceValidator;
use crate::datum::ListingDatum;
use crate::error::{Error, Result};
use crate::fee::{marketplace_fee, total_payout_lovelace};
use crate::redeemer::MarketAction;
use crate::selection::build_datum_tag;
use crate::tx::{TransactionDraft, TxOutput, Value};

use super::{ListingSpend, attach_listing_spend, decode_listing, key_credential, require_payouts};

/// Parameters for buying a listed handle.
pub struct BuyParams {
    /// Receives the handle and any change.
    pub buyer_address: ShelleyAddress,
    pub spend: ListingSpend,
}

/// A buy draft together with the amounts it pays out.
#[derive(Debug, Clone)]
pub struct BuyDraft {
    pub draft: TransactionDraft,
    pub datum: ListingDatum,
    pub total_payout: u64,
    /// Zero for authorized buys, which pay no marketplace fee.
    pub marketplace_fee: u64,
    pub action: MarketAction,
}

/// Build the plain buy draft.
///
/// Outputs, in order: marketplace fee (tagged with the listing's out ref),
/// one output per payout, then the handle to the buyer.
pub fn build_buy_draft(validator: &MarketplaceValidator, params: &BuyParams) -> Result<BuyDraft> {
    let buyer = key_credential(&params.buyer_address, "buy")?;
    let datum = decode_listing(validator, &params.spend)?;
    require_payouts(&datum.payouts)?;

    let total_payout = total_payout_lovelace(&datum.payouts)?;
    let fee = marketplace_fee(total_payout);
    let listing = &params.spend.listing;

    let mut draft = TransactionDraft::new(params.buyer_address.clone());
    let offset = draft.add_output(
        TxOutput::new(
            &validator.parameters().marketplace_address,
            Value::lovelace(fee),
        )
        .with_inline_datum(build_datum_tag(&listing.input)),
    );
    for payout in &datum.payouts {
        draft.add_output(TxOutput::new(
            &payout.address,
            Value::lovelace(payout.amount_lovelace),
        ));
    }
    draft.add_output(TxOutput::new(
        &params.buyer_address,
        listing.value().assets_only(),
    ));

    let action = MarketAction::Buy {
        payout_outputs_offset: offset as u64,
    };
    attach_listing_spend(&mut draft, &params.spend, action.to_plutus_data());
    draft.add_signer(buyer);

    log::debug!("buy draft for {}: total payout {total_payout}, fee {fee}", listing.input);
    Ok(BuyDraft {
        draft,
        datum,
        total_payout,
        marketplace_fee: fee,
        action,
    })
}

/// Build a buy co-signed by a marketplace authorizer.
///
/// No marketplace fee output; the datum tag moves to the first payout and
/// the authorizer must sign alongside the buyer.
pub fn build_buy_with_auth_draft(
    validator: &MarketplaceValidator,
    params: &BuyParams,
    authorizer: &str,
) -> Result<BuyDraft> {
    if !validator.parameters().is_authorizer(authorizer) {
        return Err(Error::precondition(format!(
            "{authorizer} is not a marketplace authorizer"
        )));
    }
    let authorizer: Hash<28> = authorizer
        .trim()
        .parse()
        .map_err(|_| Error::precondition("authorizer must be a 28-byte key hash"))?;

    let buyer = key_credential(&params.buyer_address, "buy")?;
    let datum = decode_listing(validator, &params.spend)?;
    require_payouts(&datum.payouts)?;

    let total_payout = total_payout_lovelace(&datum.payouts)?;
    let listing = &params.spend.listing;
    let tag = build_datum_tag(&listing.input);

    let mut draft = TransactionDraft::new(params.buyer_address.clone());
    let mut offset = None;
    for payout in &datum.payouts {
        let output = TxOutput::new(&payout.address, Value::lovelace(payout.amount_lovelace));
        match offset {
            None => offset = Some(draft.add_output(output.with_inline_datum(tag.clone()))),
            Some(_) => {
                draft.add_output(output);
            }
        }
    }
    draft.add_output(TxOutput::new(
        &params.buyer_address,
        listing.value().assets_only(),
    ));

    let action = MarketAction::BuyWithAuthorizer {
        payout_outputs_offset: offset.unwrap_or_default() as u64,
    };
    attach_listing_spend(&mut draft, &params.spend, action.to_plutus_data());
    draft.add_signer(buyer);
    draft.add_signer(authorizer);

    log::debug!(
        "authorized buy draft for {}: total payout {total_payout}, authorizer {authorizer}",
        listing.input
    );
    Ok(BuyDraft {
        draft,
        datum,
        total_payout,
        marketplace_fee: 0,
        action,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fee::LOVELACE_PER_ADA;
    use crate::ops::fixtures::{datum, handle, policy, spend, validator};
    use crate::testing::key_address;
    use crate::tx::TxOutRef;

    fn params() -> (MarketplaceValidator, BuyParams) {
        let v = validator();
        let s = spend(&v, &datum(5));
        (
            v,
            BuyParams {
                buyer_address: key_address(2),
                spend: s,
            },
        )
    }

    #[test]
    fn outputs_are_fee_payouts_then_handle() {
        let (v, p) = params();
        let buy = build_buy_draft(&v, &p).unwrap();
        let outs = &buy.draft.outputs;

        assert_eq!(outs.len(), 4);
        assert_eq!(
            outs[0].shelley_address(),
            Some(&v.parameters().marketplace_address)
        );
        assert_eq!(outs[0].value.lovelace, buy.marketplace_fee);
        assert_eq!(
            outs[0].inline_datum(),
            Some(&build_datum_tag(&p.spend.listing.input))
        );
        assert_eq!(outs[1].shelley_address(), Some(&key_address(10)));
        assert_eq!(outs[1].value.lovelace, 90 * LOVELACE_PER_ADA);
        assert_eq!(outs[2].value.lovelace, 10 * LOVELACE_PER_ADA);
        assert_eq!(outs[3].shelley_address(), Some(&key_address(2)));
        assert_eq!(outs[3].value.lovelace, 0);
        assert_eq!(outs[3].value.quantity_of(&policy(), &handle()), 1);

        assert_eq!(buy.total_payout, 100 * LOVELACE_PER_ADA);
        assert_eq!(buy.marketplace_fee, marketplace_fee(100 * LOVELACE_PER_ADA));
        assert_eq!(
            buy.action,
            MarketAction::Buy {
                payout_outputs_offset: 0
            }
        );
        assert_eq!(buy.draft.required_signers, vec![Hash::new([2; 28])]);
        assert_eq!(buy.draft.reference_inputs.len(), 1);
        assert!(buy.draft.has_redeemers());
    }

    #[test]
    fn tag_binds_the_consumed_listing() {
        let (v, mut p) = params();
        p.spend.listing.input = TxOutRef::new(Hash::new([41; 32]), 3);
        let buy = build_buy_draft(&v, &p).unwrap();
        let other = build_datum_tag(&TxOutRef::new(Hash::new([40; 32]), 1));
        assert_ne!(buy.draft.outputs[0].inline_datum(), Some(&other));
        assert_eq!(
            buy.draft.outputs[0].inline_datum(),
            Some(&build_datum_tag(&p.spend.listing.input))
        );
    }

    #[test]
    fn authorized_buy_drops_fee_output() {
        let (v, p) = params();
        let auth = hex::encode([60u8; 28]).to_uppercase();
        let buy = build_buy_with_auth_draft(&v, &p, &auth).unwrap();
        let outs = &buy.draft.outputs;

        assert_eq!(outs.len(), 3);
        assert_eq!(outs[0].shelley_address(), Some(&key_address(10)));
        assert_eq!(
            outs[0].inline_datum(),
            Some(&build_datum_tag(&p.spend.listing.input))
        );
        assert_eq!(outs[1].inline_datum(), None);
        assert_eq!(buy.marketplace_fee, 0);
        assert_eq!(
            buy.draft.required_signers,
            vec![Hash::new([2; 28]), Hash::new([60; 28])]
        );
        assert!(matches!(
            buy.action,
            MarketAction::BuyWithAuthorizer {
                payout_outputs_offset: 0
            }
        ));
    }

    #[test]
    fn unknown_authorizer_is_rejected() {
        let (v, p) = params();
        let err = build_buy_with_auth_draft(&v, &p, &hex::encode([61u8; 28])).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn script_buyer_is_rejected() {
        let (v, mut p) = params();
        p.buyer_address = v.address();
        assert!(matches!(build_buy_draft(&v, &p), Err(Error::Precondition(_))));
    }
}
