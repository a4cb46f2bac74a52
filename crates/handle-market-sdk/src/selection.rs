use std::cmp::Reverse;

use crate::error::{Error, Result};
use crate::plutus_data::{PlutusData, PlutusDataExt};
use crate::tx::{TxOutRef, Utxo, Value};

/// Order UTXOs largest lovelace first, ties broken by output reference.
pub fn order_largest_first(utxos: &mut [Utxo]) {
    utxos.sort_by_key(|u| (Reverse(u.lovelace()), u.input));
}

/// Pick UTXOs covering `required`.
///
/// UTXOs carrying native assets the requirement names are taken first, then
/// the largest lovelace holders. Returns `(selected, unselected)`; the
/// unselected remain available to the balancer.
pub fn select_funding(utxos: &[Utxo], required: &Value) -> Result<(Vec<Utxo>, Vec<Utxo>)> {
    let mut candidates = utxos.to_vec();
    order_largest_first(&mut candidates);

    let mut selected: Vec<Utxo> = Vec::new();
    let mut gathered = Value::default();

    loop {
        if gathered.covers(required) {
            log::debug!(
                "selected {} of {} utxos covering {} lovelace",
                selected.len(),
                utxos.len(),
                required.lovelace
            );
            return Ok((selected, candidates));
        }
        let missing = gathered.missing_assets(required);
        let pick = candidates
            .iter()
            .position(|u| {
                missing.assets.iter().any(|(policy, names)| {
                    names.keys().any(|name| u.value().quantity_of(policy, name) > 0)
                })
            })
            .or(if candidates.is_empty() { None } else { Some(0) });

        match pick {
            Some(i) => {
                let utxo = candidates.remove(i);
                gathered = gathered.checked_add(utxo.value())?;
                selected.push(utxo);
            }
            None => {
                let available = Value::sum(utxos.iter().map(|u| u.value()))?;
                if !available.missing_assets(required).assets.is_empty() {
                    return Err(Error::precondition(
                        "wallet does not hold the native assets required",
                    ));
                }
                return Err(Error::InsufficientFunds {
                    required: required.lovelace,
                    available: available.lovelace,
                });
            }
        }
    }
}

/// Choose collateral: the smallest ADA-only UTXO covering `required`, or
/// failing that up to `max_inputs` ADA-only UTXOs largest first.
pub fn select_collateral(utxos: &[Utxo], required: u64, max_inputs: usize) -> Option<Vec<Utxo>> {
    let mut pure: Vec<Utxo> = utxos
        .iter()
        .filter(|u| !u.value().has_assets() && is_key_locked(u))
        .cloned()
        .collect();

    if let Some(single) = pure
        .iter()
        .filter(|u| u.lovelace() >= required)
        .min_by_key(|u| (u.lovelace(), u.input))
    {
        return Some(vec![single.clone()]);
    }

    order_largest_first(&mut pure);
    let mut picked = Vec::new();
    let mut total = 0u64;
    for utxo in pure.into_iter().take(max_inputs) {
        total = total.saturating_add(utxo.lovelace());
        picked.push(utxo);
        if total >= required {
            return Some(picked);
        }
    }
    None
}

fn is_key_locked(utxo: &Utxo) -> bool {
    utxo.output
        .shelley_address()
        .and_then(crate::address::payment_key_hash)
        .is_some()
}

/// Unique tag for the first sale output, binding it to the listing being
/// spent: blake2b-256 of the Plutus `TxOutRef` encoding.
///
/// Recomputed for every transaction; never cached.
pub fn build_datum_tag(out_ref: &TxOutRef) -> PlutusData {
    PlutusData::bytes(out_ref.to_plutus_data().datum_hash())
}
