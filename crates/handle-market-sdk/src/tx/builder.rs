//! Draft balancing: funding, collateral, script budgets and fee fixed point.
//!
//! ```text
//! loop:
//!   change = Σ inputs − Σ outputs − fee
//!   change short?        → pull the next spare UTXO
//!   scripts present?     → evaluate, adopt returned budgets
//!   fee' = a·size + b + exec(budgets) + refscript(bytes)
//!   fee' <= fee          → done
//!   fee  = fee'
//! ```

use std::collections::{BTreeMap, BTreeSet};

use pallas_addresses::Address;
use pallas_codec::utils::{Bytes, KeyValuePairs, Nullable};
use pallas_crypto::hash::{Hash, Hasher};
use pallas_primitives::babbage;
use serde::Serialize;

use super::{DraftInput, ExUnits, TransactionDraft, TxOutRef, TxOutput, Utxo, Value};
use crate::diagnostics;
use crate::error::{Error, Result};
use crate::network::Network;
use crate::plutus_data::{PlutusData, PlutusDataExt, to_vec};
use crate::selection::{order_largest_first, select_collateral};
use crate::tx::protocol::ProtocolParameters;
use crate::vm::{EvaluationRequest, ScriptVm};

/// Collateral candidates must hold at least this much so the pick stays
/// valid while the fee converges.
const COLLATERAL_FLOOR: u64 = 5_000_000;

/// Ledger language id of Plutus V2 in the cost-model view.
const PLUTUS_V2_LANGUAGE_ID: u8 = 1;

/// A spend redeemer bound to the input at `index` (sorted input order).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redeemer {
    pub index: u32,
    pub data: PlutusData,
    pub ex_units: ExUnits,
}

impl From<&Redeemer> for babbage::Redeemer {
    fn from(redeemer: &Redeemer) -> Self {
        babbage::Redeemer {
            tag: babbage::RedeemerTag::Spend,
            index: redeemer.index,
            data: redeemer.data.clone(),
            ex_units: babbage::ExUnits {
                mem: redeemer.ex_units.mem,
                steps: redeemer.ex_units.steps,
            },
        }
    }
}

/// Ed25519 verification key and signature over the transaction hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VKeyWitness {
    pub vkey: Vec<u8>,
    pub signature: Vec<u8>,
}

impl VKeyWitness {
    /// Correctly sized placeholder used for fee estimation.
    fn placeholder() -> Self {
        Self {
            vkey: vec![0; 32],
            signature: vec![0; 64],
        }
    }
}

impl From<&VKeyWitness> for babbage::VKeyWitness {
    fn from(witness: &VKeyWitness) -> Self {
        babbage::VKeyWitness {
            vkey: Bytes::from(witness.vkey.clone()),
            signature: Bytes::from(witness.signature.clone()),
        }
    }
}

/// Inputs to the balancer beyond the draft itself.
pub struct BuildContext<'a> {
    pub network: Network,
    pub protocol: &'a ProtocolParameters,
    pub vm: &'a dyn ScriptVm,
    /// Unoptimized validator used to trace script failures.
    pub debug_program: Option<&'a [u8]>,
    pub max_iterations: usize,
}

/// A balanced, unsigned transaction.
#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    pub tx_bytes: Vec<u8>,
    pub tx_hash: Hash<32>,
    pub fee: u64,
    pub inputs: Vec<TxOutRef>,
    pub outputs: Vec<TxOutput>,
    /// Every key hash whose signature the ledger will demand.
    pub signers: Vec<Hash<28>>,
    /// Pretty JSON rendering for logs and UIs.
    pub dump: String,
    body: babbage::TransactionBody,
    redeemers: Vec<Redeemer>,
}

impl BuiltTransaction {
    pub fn tx_hex(&self) -> String {
        hex::encode(&self.tx_bytes)
    }

    /// Serialized transaction with `witnesses` attached.
    pub fn with_witnesses(&self, witnesses: &[VKeyWitness]) -> Vec<u8> {
        assemble_tx(&self.body, witnesses, &self.redeemers)
    }
}

// ── Serialization ──────────────────────────────────────────────────────

struct Body<'a> {
    inputs: &'a [TxOutRef],
    outputs: &'a [TxOutput],
    fee: u64,
    ttl: Option<u64>,
    valid_from: Option<u64>,
    script_data_hash: Option<Hash<32>>,
    collateral: &'a [TxOutRef],
    required_signers: &'a [Hash<28>],
    collateral_return: Option<&'a TxOutput>,
    total_collateral: Option<u64>,
    reference_inputs: &'a [TxOutRef],
}

fn ledger_inputs(refs: &[TxOutRef]) -> Vec<babbage::TransactionInput> {
    refs.iter().map(babbage::TransactionInput::from).collect()
}

fn ledger_output(output: &TxOutput) -> Result<babbage::TransactionOutput> {
    babbage::TransactionOutput::try_from(output).map_err(Error::Build)
}

impl Body<'_> {
    fn to_ledger(&self) -> Result<babbage::TransactionBody> {
        let outputs = self
            .outputs
            .iter()
            .map(ledger_output)
            .collect::<Result<Vec<_>>>()?;
        Ok(babbage::TransactionBody {
            inputs: ledger_inputs(self.inputs).into(),
            outputs,
            fee: self.fee,
            ttl: self.ttl,
            certificates: None,
            withdrawals: None,
            update: None,
            auxiliary_data_hash: None,
            validity_interval_start: self.valid_from,
            mint: None,
            script_data_hash: self.script_data_hash,
            collateral: (!self.collateral.is_empty()).then(|| ledger_inputs(self.collateral).into()),
            required_signers: (!self.required_signers.is_empty())
                .then(|| self.required_signers.to_vec().into()),
            network_id: None,
            collateral_return: self.collateral_return.map(ledger_output).transpose()?,
            total_collateral: self.total_collateral,
            reference_inputs: (!self.reference_inputs.is_empty())
                .then(|| ledger_inputs(self.reference_inputs).into()),
        })
    }
}

fn witness_set(vkeys: &[VKeyWitness], redeemers: &[Redeemer]) -> babbage::WitnessSet {
    babbage::WitnessSet {
        vkeywitness: (!vkeys.is_empty())
            .then(|| vkeys.iter().map(babbage::VKeyWitness::from).collect()),
        native_script: None,
        bootstrap_witness: None,
        plutus_v1_script: None,
        plutus_data: None,
        redeemer: (!redeemers.is_empty())
            .then(|| redeemers.iter().map(babbage::Redeemer::from).collect()),
        plutus_v2_script: None,
    }
}

/// `blake2b256(redeemers || language views)`; there are never witness datums
/// because every datum here is inline.
fn script_data_hash(redeemers: &[Redeemer], cost_model: &[i64]) -> Hash<32> {
    let ledger: Vec<babbage::Redeemer> = redeemers.iter().map(babbage::Redeemer::from).collect();
    let views = KeyValuePairs::from(vec![(PLUTUS_V2_LANGUAGE_ID, cost_model.to_vec())]);
    let mut preimage = to_vec(&ledger);
    preimage.extend_from_slice(&to_vec(&views));
    Hasher::<256>::hash(&preimage)
}

/// A valid transaction without auxiliary data.
fn assemble_tx(
    body: &babbage::TransactionBody,
    vkeys: &[VKeyWitness],
    redeemers: &[Redeemer],
) -> Vec<u8> {
    to_vec(&babbage::Tx {
        transaction_body: body.clone(),
        transaction_witness_set: witness_set(vkeys, redeemers),
        success: true,
        auxiliary_data: Nullable::Null,
    })
}

// ── Balancing ──────────────────────────────────────────────────────────

struct CollateralPlan {
    inputs: Vec<Utxo>,
    total: u64,
    ret: Option<TxOutput>,
}

fn plan_collateral(
    draft: &TransactionDraft,
    pool: &[Utxo],
    fee: u64,
    protocol: &ProtocolParameters,
) -> Result<CollateralPlan> {
    let required = protocol.required_collateral(fee);
    let chosen = if draft.collateral.is_empty() {
        select_collateral(
            pool,
            required.max(COLLATERAL_FLOOR),
            protocol.max_collateral_inputs as usize,
        )
        .ok_or_else(|| Error::precondition("no ADA-only UTXO available for collateral"))?
    } else {
        draft.collateral.clone()
    };

    let held = Value::sum(chosen.iter().map(|u| u.value()))?;
    if held.lovelace < required {
        return Err(Error::InsufficientFunds {
            required,
            available: held.lovelace,
        });
    }

    let excess = held
        .checked_sub(&Value::lovelace(required))
        .ok_or(Error::Overflow)?;
    let ret = TxOutput::new(&draft.change_address, excess);
    if ret.value.lovelace >= protocol.min_lovelace(&ret) {
        Ok(CollateralPlan {
            inputs: chosen,
            total: required,
            ret: Some(ret),
        })
    } else {
        Ok(CollateralPlan {
            inputs: chosen,
            total: held.lovelace,
            ret: None,
        })
    }
}

fn pull_candidate(candidates: &mut Vec<Utxo>, missing: &Value) -> Option<Utxo> {
    if candidates.is_empty() {
        return None;
    }
    let index = candidates
        .iter()
        .position(|u| {
            missing.assets.iter().any(|(policy, names)| {
                names.keys().any(|name| u.value().quantity_of(policy, name) > 0)
            })
        })
        .unwrap_or(0);
    Some(candidates.remove(index))
}

fn reference_script_bytes(inputs: &[DraftInput], references: &[Utxo]) -> u64 {
    inputs
        .iter()
        .map(|i| &i.utxo)
        .chain(references)
        .filter_map(|u| u.output.script_ref.as_ref())
        .map(|s| match s.plutus_program() {
            Some(program) => program.len() as u64,
            None => 0,
        })
        .sum()
}

fn witness_key_hashes(
    inputs: &[DraftInput],
    collateral: &[Utxo],
    required_signers: &[Hash<28>],
) -> Vec<Hash<28>> {
    let mut keys: BTreeSet<Hash<28>> = inputs
        .iter()
        .filter(|i| i.redeemer.is_none())
        .map(|i| &i.utxo)
        .chain(collateral)
        .filter_map(|u| u.output.shelley_address())
        .filter_map(crate::address::payment_key_hash)
        .collect();
    keys.extend(required_signers.iter().copied());
    keys.into_iter().collect()
}

fn insufficient(input_value: &Value, needed: &Value) -> Error {
    if !input_value.missing_assets(needed).assets.is_empty() {
        return Error::precondition("wallet does not hold the native assets the outputs require");
    }
    Error::InsufficientFunds {
        required: needed.lovelace,
        available: input_value.lovelace,
    }
}

/// Balance `draft` into a complete transaction, funding it from `spare`.
pub fn balance(
    draft: &TransactionDraft,
    spare: &[Utxo],
    ctx: &BuildContext<'_>,
) -> Result<BuiltTransaction> {
    let protocol = ctx.protocol;
    let outputs: Vec<TxOutput> = draft
        .outputs
        .iter()
        .map(|o| protocol.with_min_lovelace(o))
        .collect();
    let output_value = Value::sum(outputs.iter().map(|o| &o.value))?;

    let mut inputs = draft.inputs.clone();
    let mut candidates: Vec<Utxo> = spare
        .iter()
        .filter(|u| !draft.spends(u))
        .filter(|u| !draft.reference_inputs.iter().any(|r| r.input == u.input))
        .cloned()
        .collect();
    order_largest_first(&mut candidates);

    let redeemer_count = inputs.iter().filter(|i| i.redeemer.is_some()).count() as u64;
    let mut budgets: Vec<ExUnits> = (0..redeemer_count)
        .map(|_| {
            ExUnits::new(
                protocol.max_tx_ex_units.mem / redeemer_count,
                protocol.max_tx_ex_units.steps / redeemer_count,
            )
        })
        .collect();

    let reference_refs: Vec<TxOutRef> = draft.reference_inputs.iter().map(|u| u.input).collect();
    let mut fee = 0u64;

    for iteration in 0..ctx.max_iterations {
        inputs.sort_by_key(|i| i.utxo.input);
        let input_value = Value::sum(inputs.iter().map(|i| i.utxo.value()))?;
        let needed = output_value.checked_add(&Value::lovelace(fee))?;

        let Some(change_value) = input_value.checked_sub(&needed) else {
            let missing = input_value.missing_assets(&needed);
            match pull_candidate(&mut candidates, &missing) {
                Some(utxo) => {
                    log::debug!("balance iteration {iteration}: adding input {}", utxo.input);
                    inputs.push(DraftInput {
                        utxo,
                        redeemer: None,
                    });
                    continue;
                }
                None => return Err(insufficient(&input_value, &needed)),
            }
        };

        let change = TxOutput::new(&draft.change_address, change_value);
        let min_change = protocol.min_lovelace(&change);
        if change.value.lovelace < min_change {
            match pull_candidate(&mut candidates, &Value::default()) {
                Some(utxo) => {
                    log::debug!(
                        "balance iteration {iteration}: change below minimum, adding input {}",
                        utxo.input
                    );
                    inputs.push(DraftInput {
                        utxo,
                        redeemer: None,
                    });
                    continue;
                }
                None => {
                    let mut with_change = needed.clone();
                    with_change.lovelace = needed.lovelace.saturating_add(min_change);
                    return Err(insufficient(&input_value, &with_change));
                }
            }
        }

        let mut all_outputs = outputs.clone();
        all_outputs.push(change);

        let redeemers: Vec<Redeemer> = inputs
            .iter()
            .enumerate()
            .filter_map(|(i, input)| input.redeemer.as_ref().map(|data| (i, data)))
            .zip(budgets.iter())
            .map(|((i, data), units)| Redeemer {
                index: i as u32,
                data: data.clone(),
                ex_units: *units,
            })
            .collect();

        let collateral = if redeemers.is_empty() {
            None
        } else {
            // Collateral may overlap regular inputs.
            let mut pool: Vec<Utxo> = inputs.iter().map(|i| i.utxo.clone()).collect();
            let unspent: Vec<Utxo> = spare
                .iter()
                .filter(|u| !pool.iter().any(|p| p.input == u.input))
                .cloned()
                .collect();
            pool.extend(unspent);
            Some(plan_collateral(draft, &pool, fee, protocol)?)
        };
        let collateral_refs: Vec<TxOutRef> = collateral
            .as_ref()
            .map(|c| c.inputs.iter().map(|u| u.input).collect())
            .unwrap_or_default();
        let input_refs: Vec<TxOutRef> = inputs.iter().map(|i| i.utxo.input).collect();

        let body = Body {
            inputs: &input_refs,
            outputs: &all_outputs,
            fee,
            ttl: draft.valid_until_slot,
            valid_from: draft.valid_from_slot,
            script_data_hash: (!redeemers.is_empty())
                .then(|| script_data_hash(&redeemers, &protocol.plutus_v2_cost_model)),
            collateral: &collateral_refs,
            required_signers: &draft.required_signers,
            collateral_return: collateral.as_ref().and_then(|c| c.ret.as_ref()),
            total_collateral: collateral.as_ref().map(|c| c.total),
            reference_inputs: &reference_refs,
        }
        .to_ledger()?;
        let body_bytes = to_vec(&body);

        let signers = witness_key_hashes(
            &inputs,
            collateral.as_ref().map(|c| c.inputs.as_slice()).unwrap_or(&[]),
            &draft.required_signers,
        );
        let tx_bytes = assemble_tx(&body, &[], &redeemers);

        if !redeemers.is_empty() {
            let mut resolved: Vec<Utxo> = inputs.iter().map(|i| i.utxo.clone()).collect();
            resolved.extend(draft.reference_inputs.iter().cloned());
            let request = EvaluationRequest {
                tx_bytes: &tx_bytes,
                redeemers: &redeemers,
                resolved_inputs: &resolved,
                slot_config: ctx.network.slot_config(),
                cost_model: &protocol.plutus_v2_cost_model,
            };
            match ctx.vm.evaluate(&request) {
                Ok(units) => {
                    if units.len() != redeemers.len() {
                        return Err(Error::Build(format!(
                            "evaluator returned {} budgets for {} redeemers",
                            units.len(),
                            redeemers.len()
                        )));
                    }
                    if units != budgets {
                        log::debug!("balance iteration {iteration}: adopting evaluated budgets");
                        budgets = units;
                        continue;
                    }
                }
                Err(failure) => {
                    return Err(diagnostics::recover(ctx.vm, ctx.debug_program, failure));
                }
            }
        }

        let placeholders = vec![VKeyWitness::placeholder(); signers.len()];
        let tx_size = assemble_tx(&body, &placeholders, &redeemers).len() as u64;
        if tx_size > protocol.max_tx_size {
            return Err(Error::Build(format!(
                "transaction size {tx_size} exceeds maximum {}",
                protocol.max_tx_size
            )));
        }

        let total_units = budgets
            .iter()
            .fold(ExUnits::default(), |acc, u| acc.saturating_add(*u));
        let min_fee = protocol
            .size_fee(tx_size)?
            .checked_add(protocol.execution_fee(total_units))
            .and_then(|v| {
                v.checked_add(protocol.reference_script_fee(reference_script_bytes(
                    &inputs,
                    &draft.reference_inputs,
                )))
            })
            .ok_or(Error::Overflow)?;

        if min_fee <= fee {
            let tx_hash = Hasher::<256>::hash(&body_bytes);
            let dump = render_dump(&DumpSource {
                tx_hash: &tx_hash,
                fee,
                size: tx_size,
                inputs: &inputs,
                reference_inputs: &reference_refs,
                collateral: collateral.as_ref(),
                outputs: &all_outputs,
                required_signers: &draft.required_signers,
                redeemers: &redeemers,
                draft,
            })?;
            log::info!(
                "balanced transaction {tx_hash}: {} inputs, {} outputs, fee {fee}, {tx_size} bytes",
                inputs.len(),
                all_outputs.len()
            );
            return Ok(BuiltTransaction {
                tx_bytes,
                tx_hash,
                fee,
                inputs: input_refs,
                outputs: all_outputs,
                signers,
                dump,
                body,
                redeemers,
            });
        }
        log::debug!("balance iteration {iteration}: fee {fee} -> {min_fee}");
        fee = min_fee;
    }

    Err(Error::Build(format!(
        "fee did not converge within {} iterations",
        ctx.max_iterations
    )))
}

// ── Dump ───────────────────────────────────────────────────────────────

struct DumpSource<'a> {
    tx_hash: &'a Hash<32>,
    fee: u64,
    size: u64,
    inputs: &'a [DraftInput],
    reference_inputs: &'a [TxOutRef],
    collateral: Option<&'a CollateralPlan>,
    outputs: &'a [TxOutput],
    required_signers: &'a [Hash<28>],
    redeemers: &'a [Redeemer],
    draft: &'a TransactionDraft,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TxDump {
    hash: String,
    fee: u64,
    size: u64,
    inputs: Vec<InputDump>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    reference_inputs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    collateral: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_collateral: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    collateral_return: Option<OutputDump>,
    outputs: Vec<OutputDump>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    required_signers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    redeemers: Vec<RedeemerDump>,
    #[serde(skip_serializing_if = "Option::is_none")]
    valid_from_slot: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    valid_until_slot: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InputDump {
    out_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    redeemer: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputDump {
    address: String,
    lovelace: u64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    assets: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_datum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    datum_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    script_ref_hash: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RedeemerDump {
    index: u32,
    data: String,
    mem: u64,
    steps: u64,
}

fn render_address(address: &Address) -> String {
    address
        .to_bech32()
        .unwrap_or_else(|_| hex::encode(address.to_vec()))
}

fn dump_output(output: &TxOutput) -> OutputDump {
    let mut assets = BTreeMap::new();
    for (policy, names) in &output.value.assets {
        for (name, qty) in names {
            assets.insert(format!("{policy}.{}", hex::encode(name)), *qty);
        }
    }
    OutputDump {
        address: render_address(&output.address),
        lovelace: output.value.lovelace,
        assets,
        inline_datum: output.inline_datum().map(|d| hex::encode(d.to_cbor())),
        datum_hash: match &output.datum {
            Some(super::DatumOption::Hash(h)) => Some(h.to_string()),
            _ => None,
        },
        script_ref_hash: output.script_ref.as_ref().map(|s| s.hash().to_string()),
    }
}

fn render_dump(src: &DumpSource<'_>) -> Result<String> {
    let dump = TxDump {
        hash: src.tx_hash.to_string(),
        fee: src.fee,
        size: src.size,
        inputs: src
            .inputs
            .iter()
            .map(|i| InputDump {
                out_ref: i.utxo.input.to_string(),
                redeemer: i.redeemer.as_ref().map(|r| hex::encode(r.to_cbor())),
            })
            .collect(),
        reference_inputs: src.reference_inputs.iter().map(|r| r.to_string()).collect(),
        collateral: src
            .collateral
            .map(|c| c.inputs.iter().map(|u| u.input.to_string()).collect())
            .unwrap_or_default(),
        total_collateral: src.collateral.map(|c| c.total),
        collateral_return: src.collateral.and_then(|c| c.ret.as_ref()).map(dump_output),
        outputs: src.outputs.iter().map(dump_output).collect(),
        required_signers: src.required_signers.iter().map(|h| h.to_string()).collect(),
        redeemers: src
            .redeemers
            .iter()
            .map(|r| RedeemerDump {
                index: r.index,
                data: hex::encode(r.data.to_cbor()),
                mem: r.ex_units.mem,
                steps: r.ex_units.steps,
            })
            .collect(),
        valid_from_slot: src.draft.valid_from_slot,
        valid_until_slot: src.draft.valid_until_slot,
    };
    serde_json::to_string_pretty(&dump).map_err(|e| Error::Build(format!("dump: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        MockVm, key_address, preprod_protocol, script_utxo, wallet_utxo,
    };
    use crate::plutus_data::from_slice;
    use pallas_crypto::hash::Hash;

    fn ctx<'a>(protocol: &'a ProtocolParameters, vm: &'a MockVm) -> BuildContext<'a> {
        BuildContext {
            network: Network::Preprod,
            protocol,
            vm,
            debug_program: Some(b"debug"),
            max_iterations: 16,
        }
    }

    #[test]
    fn simple_payment_balances_with_change() {
        let protocol = preprod_protocol();
        let vm = MockVm::default();
        let wallet = key_address(1);
        let mut draft = TransactionDraft::new(wallet.clone());
        draft.add_output(TxOutput::new(&key_address(2), Value::lovelace(10_000_000)));

        let spare = vec![wallet_utxo(1, &wallet, Value::lovelace(50_000_000))];
        let built = balance(&draft, &spare, &ctx(&protocol, &vm)).unwrap();

        assert_eq!(built.inputs.len(), 1);
        assert_eq!(built.outputs.len(), 2);
        let change = built.outputs[1].value.lovelace;
        assert_eq!(10_000_000 + change + built.fee, 50_000_000);
        assert!(built.fee > protocol.min_fee_b);
        assert_eq!(built.signers, vec![Hash::new([1; 28])]);
        assert_eq!(built.tx_bytes[0], 0x84);
        assert!(built.dump.contains("\"fee\""));
    }

    #[test]
    fn fee_covers_size_of_signed_transaction() {
        let protocol = preprod_protocol();
        let vm = MockVm::default();
        let wallet = key_address(1);
        let mut draft = TransactionDraft::new(wallet.clone());
        draft.add_output(TxOutput::new(&key_address(2), Value::lovelace(5_000_000)));
        let spare = vec![wallet_utxo(1, &wallet, Value::lovelace(20_000_000))];
        let built = balance(&draft, &spare, &ctx(&protocol, &vm)).unwrap();

        let signed = built.with_witnesses(&[VKeyWitness {
            vkey: vec![1; 32],
            signature: vec![2; 64],
        }]);
        let min = protocol.size_fee(signed.len() as u64).unwrap();
        assert!(built.fee >= min);
    }

    #[test]
    fn outputs_are_raised_to_min_lovelace() {
        let protocol = preprod_protocol();
        let vm = MockVm::default();
        let wallet = key_address(1);
        let mut draft = TransactionDraft::new(wallet.clone());
        draft.add_output(TxOutput::new(&key_address(2), Value::lovelace(1)));
        let spare = vec![wallet_utxo(1, &wallet, Value::lovelace(20_000_000))];
        let built = balance(&draft, &spare, &ctx(&protocol, &vm)).unwrap();
        assert!(built.outputs[0].value.lovelace >= protocol.min_lovelace(&built.outputs[0]));
        assert!(built.outputs[0].value.lovelace > 1);
    }

    #[test]
    fn pulls_more_inputs_until_funded() {
        let protocol = preprod_protocol();
        let vm = MockVm::default();
        let wallet = key_address(1);
        let mut draft = TransactionDraft::new(wallet.clone());
        draft.add_output(TxOutput::new(&key_address(2), Value::lovelace(30_000_000)));
        let spare = vec![
            wallet_utxo(1, &wallet, Value::lovelace(20_000_000)),
            wallet_utxo(2, &wallet, Value::lovelace(15_000_000)),
            wallet_utxo(3, &wallet, Value::lovelace(1_000_000)),
        ];
        let built = balance(&draft, &spare, &ctx(&protocol, &vm)).unwrap();
        assert_eq!(built.inputs.len(), 2);
    }

    #[test]
    fn empty_wallet_is_insufficient() {
        let protocol = preprod_protocol();
        let vm = MockVm::default();
        let wallet = key_address(1);
        let mut draft = TransactionDraft::new(wallet.clone());
        draft.add_output(TxOutput::new(&key_address(2), Value::lovelace(30_000_000)));
        let spare = vec![wallet_utxo(1, &wallet, Value::lovelace(10_000_000))];
        let err = balance(&draft, &spare, &ctx(&protocol, &vm)).unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));
    }

    #[test]
    fn script_spend_gets_budgets_collateral_and_data_hash() {
        let protocol = preprod_protocol();
        let vm = MockVm::default();
        let wallet = key_address(1);
        let mut draft = TransactionDraft::new(wallet.clone());
        draft.add_script_input(
            script_utxo(9, Value::lovelace(2_000_000), PlutusData::integer(0)),
            PlutusData::constr(1, vec![]),
        );
        draft.add_output(TxOutput::new(&key_address(2), Value::lovelace(3_000_000)));
        let spare = vec![
            wallet_utxo(1, &wallet, Value::lovelace(40_000_000)),
            wallet_utxo(2, &wallet, Value::lovelace(8_000_000)),
        ];
        let built = balance(&draft, &spare, &ctx(&protocol, &vm)).unwrap();

        assert_eq!(built.redeemers.len(), 1);
        assert_eq!(built.redeemers[0].ex_units, MockVm::BUDGET);
        assert!(built.fee > protocol.execution_fee(MockVm::BUDGET));
        assert!(built.dump.contains("collateral"));
        assert!(built.dump.contains("redeemers"));
        // Script inputs need no key witness; the collateral does.
        assert_eq!(built.signers, vec![Hash::new([1; 28])]);
    }

    #[test]
    fn signed_script_spend_decodes_as_ledger_transaction() {
        let protocol = preprod_protocol();
        let vm = MockVm::default();
        let wallet = key_address(1);
        let mut draft = TransactionDraft::new(wallet.clone());
        draft.add_script_input(
            script_utxo(9, Value::lovelace(2_000_000), PlutusData::integer(0)),
            PlutusData::constr(1, vec![]),
        );
        let spare = vec![wallet_utxo(1, &wallet, Value::lovelace(40_000_000))];
        let built = balance(&draft, &spare, &ctx(&protocol, &vm)).unwrap();
        let signed = built.with_witnesses(&[VKeyWitness {
            vkey: vec![1; 32],
            signature: vec![2; 64],
        }]);

        let tx: babbage::Tx = from_slice(&signed).unwrap();
        let body = &tx.transaction_body;
        assert_eq!(body.fee, built.fee);
        assert_eq!(body.inputs.len(), built.inputs.len());
        assert!(body.script_data_hash.is_some());
        assert!(body.collateral.is_some());
        assert!(tx.success);

        let witnesses = tx.transaction_witness_set;
        assert_eq!(witnesses.vkeywitness.map(|w| w.len()), Some(1));
        let redeemers = witnesses.redeemer.unwrap();
        assert_eq!(redeemers.len(), 1);
        assert_eq!(redeemers[0].tag, babbage::RedeemerTag::Spend);
        assert_eq!(redeemers[0].data, PlutusData::constr(1, vec![]));
        assert_eq!(redeemers[0].ex_units.mem, MockVm::BUDGET.mem);
    }

    #[test]
    fn redeemer_index_follows_sorted_inputs() {
        let protocol = preprod_protocol();
        let vm = MockVm::default();
        let wallet = key_address(1);
        let mut draft = TransactionDraft::new(wallet.clone());
        // Wallet input sorts before the script input (hash 0x01.. < 0x09..).
        draft.add_input(wallet_utxo(1, &wallet, Value::lovelace(30_000_000)));
        draft.add_script_input(
            script_utxo(9, Value::lovelace(2_000_000), PlutusData::integer(0)),
            PlutusData::constr(1, vec![]),
        );
        draft.add_output(TxOutput::new(&key_address(2), Value::lovelace(3_000_000)));
        let spare = vec![wallet_utxo(2, &wallet, Value::lovelace(8_000_000))];
        let built = balance(&draft, &spare, &ctx(&protocol, &vm)).unwrap();
        assert_eq!(built.redeemers[0].index, 1);
    }

    #[test]
    fn script_failure_becomes_validation_error_with_trace() {
        let protocol = preprod_protocol();
        let vm = MockVm::default()
            .failing_evaluation("validator failed")
            .with_debug_logs(vec!["payout missing".into()]);
        let wallet = key_address(1);
        let mut draft = TransactionDraft::new(wallet.clone());
        draft.add_script_input(
            script_utxo(9, Value::lovelace(2_000_000), PlutusData::integer(0)),
            PlutusData::constr(1, vec![]),
        );
        let spare = vec![wallet_utxo(1, &wallet, Value::lovelace(40_000_000))];
        let err = balance(&draft, &spare, &ctx(&protocol, &vm)).unwrap_err();
        let Error::Validation(failure) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(failure.message, "validator failed");
        assert!(failure.trace.unwrap().contains("payout missing"));
    }
}
