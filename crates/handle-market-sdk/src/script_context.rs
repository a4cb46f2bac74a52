//! Plutus V2 `ScriptContext` for a spend, rebuilt from an evaluation request
//! so a rejected validator can be re-run locally with the arguments the
//! ledger handed it.
//!
//! ```text
//! ScriptContext = Constr0[TxInfo, Spending = Constr1[TxOutRef]]
//! TxInfo        = Constr0[inputs, reference_inputs, outputs, fee, mint,
//!                         dcert, wdrl, valid_range, signatories,
//!                         redeemers, data, id]
//! TxInInfo      = Constr0[TxOutRef, TxOut]
//! TxOut         = Constr0[Address, Value, OutputDatum, Maybe ScriptHash]
//! ```

use pallas_addresses::Address;
use pallas_primitives::babbage;

use crate::address::address_to_plutus_data;
use crate::error::{Error, Result};
use crate::network::SlotConfig;
use crate::plutus_data::{PlutusData, PlutusDataExt, from_slice, to_vec};
use crate::tx::{DatumOption, Redeemer, TxOutRef, TxOutput, Utxo, Value};
use crate::vm::{EvaluationRequest, FailureContext};

const SPENDING_PURPOSE: u64 = 1;

fn unit(index: u64) -> PlutusData {
    PlutusData::constr(index, vec![])
}

fn boolean(value: bool) -> PlutusData {
    unit(u64::from(value))
}

/// Ada sits first under the empty policy and name, as the ledger renders it.
pub fn value_data(value: &Value) -> PlutusData {
    let mut policies = vec![(
        PlutusData::bytes(b""),
        PlutusData::map(vec![(
            PlutusData::bytes(b""),
            PlutusData::integer(value.lovelace),
        )]),
    )];
    for (policy, names) in &value.assets {
        let names = names
            .iter()
            .filter(|(_, q)| **q > 0)
            .map(|(name, q)| (PlutusData::bytes(name), PlutusData::integer(*q)))
            .collect::<Vec<_>>();
        if !names.is_empty() {
            policies.push((PlutusData::bytes(policy), PlutusData::map(names)));
        }
    }
    PlutusData::map(policies)
}

pub fn output_data(output: &TxOutput) -> Result<PlutusData> {
    let address = match &output.address {
        Address::Shelley(shelley) => address_to_plutus_data(shelley)?,
        other => {
            return Err(Error::ScriptVm(format!(
                "address {} has no plutus representation",
                hex::encode(other.to_vec())
            )));
        }
    };
    let datum = match &output.datum {
        None => unit(0),
        Some(DatumOption::Hash(h)) => PlutusData::constr(1, vec![PlutusData::bytes(h)]),
        Some(DatumOption::Inline(data)) => PlutusData::constr(2, vec![data.clone()]),
    };
    let script_hash = match &output.script_ref {
        Some(script) => PlutusData::constr(0, vec![PlutusData::bytes(script.hash())]),
        None => unit(1),
    };
    Ok(PlutusData::constr(
        0,
        vec![address, value_data(&output.value), datum, script_hash],
    ))
}

/// `[valid_from, ttl)` in POSIX milliseconds; a missing bound is infinite.
fn validity_range(
    valid_from: Option<u64>,
    ttl: Option<u64>,
    slots: &SlotConfig,
) -> PlutusData {
    let finite = |slot: u64| PlutusData::constr(1, vec![PlutusData::integer(slots.posix_at(slot))]);
    let lower = match valid_from {
        Some(slot) => PlutusData::constr(0, vec![finite(slot), boolean(true)]),
        None => PlutusData::constr(0, vec![unit(0), boolean(true)]),
    };
    let upper = match ttl {
        Some(slot) => PlutusData::constr(0, vec![finite(slot), boolean(false)]),
        None => PlutusData::constr(0, vec![unit(2), boolean(true)]),
    };
    PlutusData::constr(0, vec![lower, upper])
}

fn resolve<'a>(resolved: &'a [Utxo], out_ref: &TxOutRef) -> Result<&'a Utxo> {
    resolved
        .iter()
        .find(|u| u.input == *out_ref)
        .ok_or_else(|| Error::ScriptVm(format!("input {out_ref} was not resolved")))
}

fn in_info(resolved: &[Utxo], out_ref: &TxOutRef) -> Result<PlutusData> {
    let utxo = resolve(resolved, out_ref)?;
    Ok(PlutusData::constr(
        0,
        vec![out_ref.to_plutus_data(), output_data(&utxo.output)?],
    ))
}

fn spending(out_ref: &TxOutRef) -> PlutusData {
    PlutusData::constr(SPENDING_PURPOSE, vec![out_ref.to_plutus_data()])
}

/// Datum, redeemer and script context of the spend `redeemer` points at.
pub fn spending_context(
    request: &EvaluationRequest<'_>,
    redeemer: &Redeemer,
) -> Result<FailureContext> {
    let tx: babbage::Tx = from_slice(request.tx_bytes)?;
    let body = &tx.transaction_body;
    let tx_hash = pallas_crypto::hash::Hasher::<256>::hash(&to_vec(body));

    let mut inputs: Vec<TxOutRef> = body.inputs.iter().cloned().map(TxOutRef::from).collect();
    inputs.sort();
    let mut reference_inputs: Vec<TxOutRef> = body
        .reference_inputs
        .iter()
        .flat_map(|refs| refs.iter().cloned().map(TxOutRef::from))
        .collect();
    reference_inputs.sort();

    let own = *inputs.get(redeemer.index as usize).ok_or_else(|| {
        Error::ScriptVm(format!("redeemer index {} has no input", redeemer.index))
    })?;
    let datum = resolve(request.resolved_inputs, &own)?
        .output
        .inline_datum()
        .cloned();

    let outputs = body
        .outputs
        .iter()
        .cloned()
        .map(|o| TxOutput::try_from(o).map_err(Error::ScriptVm))
        .map(|o| o.and_then(|o| output_data(&o)))
        .collect::<Result<Vec<_>>>()?;
    let signatories = body
        .required_signers
        .iter()
        .flat_map(|keys| keys.iter().map(PlutusData::bytes))
        .collect();
    let redeemers = request
        .redeemers
        .iter()
        .filter_map(|r| {
            inputs
                .get(r.index as usize)
                .map(|out_ref| (spending(out_ref), r.data.clone()))
        })
        .collect();

    let tx_info = PlutusData::constr(
        0,
        vec![
            PlutusData::list(
                inputs
                    .iter()
                    .map(|r| in_info(request.resolved_inputs, r))
                    .collect::<Result<_>>()?,
            ),
            PlutusData::list(
                reference_inputs
                    .iter()
                    .map(|r| in_info(request.resolved_inputs, r))
                    .collect::<Result<_>>()?,
            ),
            PlutusData::list(outputs),
            value_data(&Value::lovelace(body.fee)),
            value_data(&Value::default()),
            PlutusData::list(vec![]),
            PlutusData::map(vec![]),
            validity_range(
                body.validity_interval_start,
                body.ttl,
                &request.slot_config,
            ),
            PlutusData::list(signatories),
            PlutusData::map(redeemers),
            PlutusData::map(vec![]),
            PlutusData::constr(0, vec![PlutusData::bytes(tx_hash)]),
        ],
    );

    Ok(FailureContext {
        datum,
        redeemer: redeemer.data.clone(),
        script_context: PlutusData::constr(0, vec![tx_info, spending(&own)]),
    })
}
