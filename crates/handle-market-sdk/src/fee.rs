use crate::datum::Payout;
use crate::error::{Error, Result};

pub const LOVELACE_PER_ADA: u64 = 1_000_000;

/// Floor applied to every payout when totalling a listing.
pub const MIN_LOVELACE: u64 = 3_000_000;

/// Lovelace reserved for the network fee when pre-checking buyer funds.
pub const MIN_FEE: u64 = 5_000_000;

/// Sum of payouts, each counted as at least [`MIN_LOVELACE`].
///
/// ```text
/// total = Σ max(amount_i, MIN_LOVELACE)
/// ```
pub fn total_payout_lovelace(payouts: &[Payout]) -> Result<u64> {
    payouts.iter().try_fold(0u64, |acc, p| {
        acc.checked_add(p.amount_lovelace.max(MIN_LOVELACE))
            .ok_or(Error::Overflow)
    })
}

/// Marketplace cut for a sale of `total` lovelace.
///
/// ```text
/// fee = ((total * 50) / 49) / 50      (integer division at each step)
/// ```
///
/// The validator recomputes this with the same truncation, so the two-step
/// form must be preserved.
pub fn marketplace_fee(total: u64) -> u64 {
    let scaled = u128::from(total) * 50 / 49 / 50;
    // scaled <= total, so it always fits.
    scaled as u64
}

/// Lovelace a buyer must hold before building a plain buy.
pub fn required_buy_funding(total_payout: u64, fee: u64) -> Result<u64> {
    total_payout
        .checked_add(fee)
        .and_then(|v| v.checked_add(MIN_FEE))
        .ok_or(Error::Overflow)
}

/// Convert a decimal ADA string to lovelace, truncating beyond six decimals.
///
/// `"12.3456789"` → `12_345_678`.
pub fn ada_to_lovelace(ada: &str) -> Result<u64> {
    let ada = ada.trim();
    let invalid = || Error::InvalidAmount(format!("not a non-negative ADA amount: {ada:?}"));

    let (whole, frac) = match ada.split_once('.') {
        Some((w, f)) => (w, f),
        None => (ada, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let mut frac_digits: String = frac.chars().take(6).collect();
    while frac_digits.len() < 6 {
        frac_digits.push('0');
    }
    let frac: u64 = frac_digits.parse().map_err(|_| invalid())?;

    whole
        .checked_mul(LOVELACE_PER_ADA)
        .and_then(|v| v.checked_add(frac))
        .ok_or(Error::Overflow)
}
