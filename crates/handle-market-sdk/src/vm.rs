//! Boundary to the UPLC evaluator.
//!
//! The engine never interprets validator code itself; parameter application,
//! transaction evaluation and debug runs are delegated to a [`ScriptVm`].

use crate::error::Result;
use crate::network::SlotConfig;
use crate::plutus_data::{PlutusData, PlutusDataExt};
use crate::tx::{ExUnits, Redeemer, Utxo};

/// Everything an evaluator needs to run the scripts of a transaction.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationRequest<'a> {
    pub tx_bytes: &'a [u8],
    pub redeemers: &'a [Redeemer],
    /// Spent and referenced outputs.
    pub resolved_inputs: &'a [Utxo],
    pub slot_config: SlotConfig,
    pub cost_model: &'a [i64],
}

/// Arguments of the failing script invocation, as reconstructed by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureContext {
    /// Present when the failing script was spending a datum-locked output.
    pub datum: Option<PlutusData>,
    pub redeemer: PlutusData,
    pub script_context: PlutusData,
}

impl FailureContext {
    /// Argument list for a direct program run: `[datum?, redeemer, context]`.
    pub fn program_args(&self) -> Vec<PlutusData> {
        let mut args = Vec::with_capacity(3);
        if let Some(datum) = &self.datum {
            args.push(datum.clone());
        }
        args.push(self.redeemer.clone());
        args.push(self.script_context.clone());
        args
    }
}

/// A script rejected the transaction during evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFailure {
    pub message: String,
    pub context: Option<FailureContext>,
}

/// Outcome of running a program directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramRun {
    /// `Ok` with the rendered result term, `Err` with the machine error.
    pub result: std::result::Result<String, String>,
    pub logs: Vec<String>,
}

pub trait ScriptVm {
    /// Apply constructor arguments to a CBOR-wrapped flat program.
    fn apply_params(&self, program: &[u8], params: &[PlutusData]) -> Result<Vec<u8>>;

    /// Evaluate every redeemer of a transaction, returning one budget per
    /// redeemer in the order given.
    fn evaluate(
        &self,
        request: &EvaluationRequest<'_>,
    ) -> std::result::Result<Vec<ExUnits>, ScriptFailure>;

    /// Run a program against explicit arguments (used for debug traces).
    fn run_program(&self, program: &[u8], args: &[PlutusData]) -> Result<ProgramRun>;
}
