use crate::plutus_data::{PlutusData, PlutusDataExt};

/// Spending action presented to the marketplace validator.
///
/// `Buy` and `BuyWithAuthorizer` share the validator's buy constructor; the
/// authorizer variant is kept distinct so the assembler can pick the right
/// output layout and signer set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketAction {
    /// `payout_outputs_offset` is the index of the first sale output.
    Buy { payout_outputs_offset: u64 },
    BuyWithAuthorizer { payout_outputs_offset: u64 },
    WithdrawOrUpdate,
}

impl MarketAction {
    pub fn to_plutus_data(&self) -> PlutusData {
        match self {
            MarketAction::Buy {
                payout_outputs_offset,
            }
            | MarketAction::BuyWithAuthorizer {
                payout_outputs_offset,
            } => PlutusData::constr(0, vec![PlutusData::integer(*payout_outputs_offset)]),
            MarketAction::WithdrawOrUpdate => PlutusData::constr(1, vec![]),
        }
    }
}
