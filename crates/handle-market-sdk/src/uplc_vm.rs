//! [`ScriptVm`] backed by the `uplc` CEK machine.

use pallas_codec::minicbor;
use uplc::ast::{DeBruijn, NamedDeBruijn, Program};
use uplc::machine::cost_model::ExBudget;
use uplc::tx::{ResolvedInput, SlotConfig as UplcSlotConfig};

use crate::error::{Error, Result};
use crate::plutus_data::{PlutusData, from_slice, to_vec};
use crate::script_context::spending_context;
use crate::tx::{ExUnits, Utxo};
use crate::vm::{EvaluationRequest, ProgramRun, ScriptFailure, ScriptVm};

/// Evaluates Plutus V2 scripts locally.
///
/// Budgets come from the machine's default cost model; the request's cost
/// model still feeds the script data hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct UplcVm;

impl UplcVm {
    pub fn new() -> Self {
        Self
    }

    /// Attach the arguments of the first spend so the failure can be traced.
    fn failure(&self, request: &EvaluationRequest<'_>, message: String) -> ScriptFailure {
        let context = request.redeemers.first().and_then(|redeemer| {
            spending_context(request, redeemer)
                .map_err(|e| log::warn!("could not rebuild script context: {e}"))
                .ok()
        });
        ScriptFailure { message, context }
    }
}

fn decode_program(program: &[u8]) -> Result<Program<DeBruijn>> {
    let mut buffer = Vec::new();
    Program::<DeBruijn>::from_cbor(program, &mut buffer)
        .map_err(|e| Error::ScriptVm(format!("invalid program: {e}")))
}

fn apply_all(program: Program<DeBruijn>, args: &[PlutusData]) -> Program<DeBruijn> {
    args.iter()
        .fold(program, |program, arg| program.apply_data(arg.clone()))
}

fn resolved_input(utxo: &Utxo) -> std::result::Result<ResolvedInput, String> {
    let input = from_slice(&to_vec(&utxo.input)).map_err(|e| format!("{}: {e}", utxo.input))?;
    let output = from_slice(&to_vec(&utxo.output)).map_err(|e| format!("{}: {e}", utxo.input))?;
    Ok(ResolvedInput { input, output })
}

impl ScriptVm for UplcVm {
    fn apply_params(&self, program: &[u8], params: &[PlutusData]) -> Result<Vec<u8>> {
        apply_all(decode_program(program)?, params)
            .to_cbor()
            .map_err(|e| Error::ScriptVm(format!("encode applied program: {e}")))
    }

    fn evaluate(
        &self,
        request: &EvaluationRequest<'_>,
    ) -> std::result::Result<Vec<ExUnits>, ScriptFailure> {
        let not_evaluated = |message: String| ScriptFailure {
            message,
            context: None,
        };
        let minted_tx = minicbor::decode(request.tx_bytes)
            .map_err(|e| not_evaluated(format!("transaction does not decode: {e}")))?;
        let resolved = request
            .resolved_inputs
            .iter()
            .map(resolved_input)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| not_evaluated(format!("unusable resolved input {e}")))?;
        let slots = &request.slot_config;
        let slot_config = UplcSlotConfig {
            slot_length: u32::try_from(slots.slot_length_ms).unwrap_or(u32::MAX),
            zero_slot: slots.zero_slot,
            zero_time: slots.zero_time_ms,
        };

        let evaluated = uplc::tx::eval_phase_two(
            &minted_tx,
            resolved.as_slice(),
            None,
            None,
            &slot_config,
            false,
            |_| (),
        )
        .map_err(|e| self.failure(request, e.to_string()))?;

        let mut budgets = Vec::with_capacity(evaluated.len());
        for (redeemer, mut outcome) in evaluated {
            if outcome.failed(false) {
                let logs = outcome.logs();
                let mut message = format!("script for redeemer {} failed", redeemer.index);
                if !logs.is_empty() {
                    message = format!("{message}: {}", logs.join("; "));
                }
                return Err(self.failure(request, message));
            }
            budgets.push((
                redeemer.index,
                ExUnits::new(redeemer.ex_units.mem, redeemer.ex_units.steps),
            ));
        }

        request
            .redeemers
            .iter()
            .map(|wanted| {
                budgets
                    .iter()
                    .find(|(index, _)| *index == wanted.index)
                    .map(|(_, units)| *units)
                    .ok_or_else(|| {
                        not_evaluated(format!("no budget returned for redeemer {}", wanted.index))
                    })
            })
            .collect()
    }

    fn run_program(&self, program: &[u8], args: &[PlutusData]) -> Result<ProgramRun> {
        let program: Program<NamedDeBruijn> = apply_all(decode_program(program)?, args).into();
        let mut run = program.eval(ExBudget::default());
        let logs = run.logs();
        let result = run
            .result()
            .map(|term| term.to_pretty())
            .map_err(|e| e.to_string());
        log::debug!("program run produced {} trace lines", logs.len());
        Ok(ProgramRun { result, logs })
    }
}
