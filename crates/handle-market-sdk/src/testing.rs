//! In-memory collaborators and fixtures for exercising the engine without a
//! network, an evaluator or a wallet.

use std::collections::HashMap;
use std::sync::Mutex;

use pallas_addresses::{Address, ShelleyAddress, ShelleyDelegationPart, ShelleyPaymentPart};
use pallas_codec::minicbor::Decoder;
use pallas_crypto::hash::{Hash, Hasher};
use pallas_primitives::babbage;

use crate::address::script_address;
use crate::chain::ChainBackend;
use crate::config::{MarketConfig, handle_asset_name};
use crate::contract::MarketplaceValidator;
use crate::deployment::{DeploymentStore, ScriptDeploymentRecord};
use crate::error::{Error, Result};
use crate::network::Network;
use crate::params::MarketplaceParameters;
use crate::plutus_data::{PlutusData, PlutusDataExt, from_slice};
use crate::signer::TxSigner;
use crate::tx::{
    ExUnits, ProtocolParameters, Ratio, TxOutRef, TxOutput, Utxo, VKeyWitness, Value,
};
use crate::vm::{EvaluationRequest, FailureContext, ProgramRun, ScriptFailure, ScriptVm};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Preprod base address whose payment and stake keys are `[seed; 28]`.
pub fn key_address(seed: u8) -> ShelleyAddress {
    ShelleyAddress::new(
        Network::Preprod.address_network(),
        ShelleyPaymentPart::Key(Hash::new([seed; 28])),
        ShelleyDelegationPart::Key(Hash::new([seed; 28])),
    )
}

/// Output `[seed; 32]#0` at `address`.
pub fn wallet_utxo(seed: u8, address: &ShelleyAddress, value: Value) -> Utxo {
    Utxo::new(
        TxOutRef::new(Hash::new([seed; 32]), 0),
        TxOutput::new(address, value),
    )
}

/// Output `[seed; 32]#0` locked by an unrelated script, with an inline datum.
pub fn script_utxo(seed: u8, value: Value, datum: PlutusData) -> Utxo {
    let address = script_address(Network::Preprod, Hash::new([0xee; 28]));
    Utxo::new(
        TxOutRef::new(Hash::new([seed; 32]), 0),
        TxOutput::new(&address, value).with_inline_datum(datum),
    )
}

/// Preprod protocol parameters (epoch 150 values, zeroed cost model).
pub fn preprod_protocol() -> ProtocolParameters {
    ProtocolParameters {
        min_fee_a: 44,
        min_fee_b: 155_381,
        max_tx_size: 16_384,
        coins_per_utxo_byte: 4_310,
        price_mem: Ratio::new(577, 10_000),
        price_step: Ratio::new(721, 10_000_000),
        max_tx_ex_units: ExUnits::new(14_000_000, 10_000_000_000),
        collateral_percentage: 150,
        max_collateral_inputs: 3,
        min_fee_ref_script_cost_per_byte: 15,
        plutus_v2_cost_model: vec![0; 175],
    }
}

/// Marketplace fee address `key_address(50)`, one authorizer `[60; 28]`.
pub fn marketplace_parameters() -> MarketplaceParameters {
    MarketplaceParameters::new(key_address(50), vec![Hash::new([60; 28])])
}

/// Config with the real handle policy and an immediate confirmation poll.
pub fn test_config() -> MarketConfig {
    MarketConfig {
        poll_interval: std::time::Duration::ZERO,
        max_confirmation_polls: Some(10),
        ..MarketConfig::default()
    }
}

/// A deployed marketplace validator: its record and the reference output
/// holding `$mkt`, the parameters datum and the program.
pub fn deployed_marketplace(vm: &MockVm) -> (ScriptDeploymentRecord, Utxo) {
    deployed_validator(vm, b"marketplace", b"marketplace-debug")
}

/// Like [`deployed_marketplace`], for any evaluator and unapplied programs.
pub fn deployed_validator(
    vm: &dyn ScriptVm,
    program: &[u8],
    debug_program: &[u8],
) -> (ScriptDeploymentRecord, Utxo) {
    let validator = MarketplaceValidator::compile(
        vm,
        program,
        debug_program,
        marketplace_parameters(),
        Network::Preprod,
    )
    .expect("vm applies parameters");
    let locker = key_address(70);
    let reference = Utxo::new(
        TxOutRef::new(Hash::new([77; 32]), 0),
        TxOutput::new(
            &locker,
            Value::lovelace(20_000_000).with_asset(
                MarketConfig::default().handle_policy_id,
                handle_asset_name("mkt"),
                1,
            ),
        )
        .with_inline_datum(validator.parameters().to_datum())
        .with_script_ref(validator.script_ref()),
    );
    let record = validator.to_record("mkt", Some((reference.input, &locker)));
    (record, reference)
}

// ---------------------------------------------------------------------------
// Script VM
// ---------------------------------------------------------------------------

/// Evaluator that approves every script at a fixed budget unless told to fail.
#[derive(Default)]
pub struct MockVm {
    evaluation_failure: Option<String>,
    debug_logs: Vec<String>,
    debug_runs_fail: bool,
    last_run_args: Mutex<Option<usize>>,
}

impl MockVm {
    pub const BUDGET: ExUnits = ExUnits {
        mem: 1_250_000,
        steps: 480_000_000,
    };

    /// Reject every evaluation with `message`, reporting a spending context.
    pub fn failing_evaluation(mut self, message: &str) -> Self {
        self.evaluation_failure = Some(message.to_string());
        self
    }

    /// Trace lines emitted by debug runs.
    pub fn with_debug_logs(mut self, logs: Vec<String>) -> Self {
        self.debug_logs = logs;
        self
    }

    pub fn failing_debug_runs(mut self) -> Self {
        self.debug_runs_fail = true;
        self
    }

    /// Argument count of the most recent debug run.
    pub fn last_run_arg_count(&self) -> Option<usize> {
        *self.last_run_args.lock().expect("mock vm lock")
    }
}

impl ScriptVm for MockVm {
    fn apply_params(&self, program: &[u8], params: &[PlutusData]) -> Result<Vec<u8>> {
        let mut applied = program.to_vec();
        for param in params {
            applied.extend_from_slice(&param.to_cbor());
        }
        Ok(applied)
    }

    fn evaluate(
        &self,
        request: &EvaluationRequest<'_>,
    ) -> std::result::Result<Vec<ExUnits>, ScriptFailure> {
        match &self.evaluation_failure {
            Some(message) => Err(ScriptFailure {
                message: message.clone(),
                context: request.redeemers.first().map(|r| FailureContext {
                    datum: Some(PlutusData::integer(0)),
                    redeemer: r.data.clone(),
                    script_context: PlutusData::constr(0, vec![]),
                }),
            }),
            None => Ok(vec![Self::BUDGET; request.redeemers.len()]),
        }
    }

    fn run_program(&self, _program: &[u8], args: &[PlutusData]) -> Result<ProgramRun> {
        *self.last_run_args.lock().expect("mock vm lock") = Some(args.len());
        if self.debug_runs_fail {
            return Err(Error::ScriptVm("machine budget exhausted".into()));
        }
        Ok(ProgramRun {
            result: Err("validator returned error".into()),
            logs: self.debug_logs.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

struct PendingOutput {
    utxo: Utxo,
    polls_left: u32,
}

/// Ledger stand-in: submitted transactions spend their inputs and create
/// their outputs, which become visible after `reveal_after` lookups.
pub struct MockChain {
    protocol: ProtocolParameters,
    utxos: Mutex<Vec<Utxo>>,
    pending: Mutex<Vec<PendingOutput>>,
    submitted: Mutex<Vec<Vec<u8>>>,
    reveal_after: u32,
}

impl MockChain {
    pub fn new(protocol: ProtocolParameters) -> Self {
        Self {
            protocol,
            utxos: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            reveal_after: 0,
        }
    }

    pub fn with_utxos(self, utxos: Vec<Utxo>) -> Self {
        self.utxos.lock().expect("mock chain lock").extend(utxos);
        self
    }

    /// Hide outputs of submitted transactions from the first `polls` lookups.
    pub fn reveal_after(mut self, polls: u32) -> Self {
        self.reveal_after = polls;
        self
    }

    pub fn add_utxo(&self, utxo: Utxo) {
        self.utxos.lock().expect("mock chain lock").push(utxo);
    }

    /// Raw bytes of every submitted transaction, oldest first.
    pub fn submitted(&self) -> Vec<Vec<u8>> {
        self.submitted.lock().expect("mock chain lock").clone()
    }
}

/// Body hash, spent inputs and created outputs of a serialized transaction.
fn parse_submitted(tx: &[u8]) -> Result<(Hash<32>, Vec<TxOutRef>, Vec<TxOutput>)> {
    let malformed = |e: pallas_codec::minicbor::decode::Error| Error::Submit(e.to_string());
    let mut d = Decoder::new(tx);
    d.array().map_err(malformed)?;
    let start = d.position();
    d.skip().map_err(malformed)?;
    let body_bytes = &tx[start..d.position()];

    let body: babbage::TransactionBody =
        from_slice(body_bytes).map_err(|e| Error::Submit(e.to_string()))?;
    let inputs = body.inputs.iter().cloned().map(TxOutRef::from).collect();
    let outputs = body
        .outputs
        .iter()
        .cloned()
        .map(TxOutput::try_from)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::Submit)?;
    Ok((Hasher::<256>::hash(body_bytes), inputs, outputs))
}

impl ChainBackend for MockChain {
    fn utxos_at(&self, address: &ShelleyAddress) -> Result<Vec<Utxo>> {
        let wanted = Address::Shelley(address.clone());
        Ok(self
            .utxos
            .lock()
            .expect("mock chain lock")
            .iter()
            .filter(|u| u.output.address == wanted)
            .cloned()
            .collect())
    }

    fn utxo(&self, out_ref: &TxOutRef) -> Result<Option<Utxo>> {
        if let Some(found) = self
            .utxos
            .lock()
            .expect("mock chain lock")
            .iter()
            .find(|u| u.input == *out_ref)
        {
            return Ok(Some(found.clone()));
        }

        let mut pending = self.pending.lock().expect("mock chain lock");
        let Some(index) = pending.iter().position(|p| p.utxo.input == *out_ref) else {
            return Ok(None);
        };
        if pending[index].polls_left > 0 {
            pending[index].polls_left -= 1;
            return Ok(None);
        }
        let revealed = pending.remove(index).utxo;
        self.add_utxo(revealed.clone());
        Ok(Some(revealed))
    }

    fn protocol_parameters(&self) -> Result<ProtocolParameters> {
        Ok(self.protocol.clone())
    }

    fn submit(&self, tx_bytes: &[u8]) -> Result<Hash<32>> {
        let (tx_hash, inputs, outputs) = parse_submitted(tx_bytes)?;
        {
            let mut utxos = self.utxos.lock().expect("mock chain lock");
            for input in &inputs {
                if !utxos.iter().any(|u| u.input == *input) {
                    return Err(Error::Submit(format!("input {input} is not spendable")));
                }
            }
            utxos.retain(|u| !inputs.contains(&u.input));
        }

        let created = outputs
            .into_iter()
            .enumerate()
            .map(|(i, output)| Utxo::new(TxOutRef::new(tx_hash, i as u64), output));
        if self.reveal_after == 0 {
            self.utxos.lock().expect("mock chain lock").extend(created);
        } else {
            self.pending
                .lock()
                .expect("mock chain lock")
                .extend(created.map(|utxo| PendingOutput {
                    utxo,
                    polls_left: self.reveal_after,
                }));
        }
        self.submitted
            .lock()
            .expect("mock chain lock")
            .push(tx_bytes.to_vec());
        Ok(tx_hash)
    }
}

// ---------------------------------------------------------------------------
// Signer and store
// ---------------------------------------------------------------------------

/// Signer whose key hash is `[seed; 28]`, matching [`key_address`].
pub struct MockSigner {
    seed: u8,
}

impl MockSigner {
    pub fn new(seed: u8) -> Self {
        Self { seed }
    }
}

impl TxSigner for MockSigner {
    fn key_hash(&self) -> Hash<28> {
        Hash::new([self.seed; 28])
    }

    fn sign(&self, _tx_hash: &Hash<32>) -> Result<VKeyWitness> {
        Ok(VKeyWitness {
            vkey: vec![self.seed; 32],
            signature: vec![self.seed; 64],
        })
    }
}

#[derive(Default)]
pub struct MemoryDeploymentStore {
    records: Mutex<HashMap<Network, ScriptDeploymentRecord>>,
}

impl MemoryDeploymentStore {
    pub fn with(network: Network, record: ScriptDeploymentRecord) -> Self {
        let store = Self::default();
        store
            .records
            .lock()
            .expect("store lock")
            .insert(network, record);
        store
    }
}

impl DeploymentStore for MemoryDeploymentStore {
    fn latest(&self, network: Network) -> Result<Option<ScriptDeploymentRecord>> {
        Ok(self.records.lock().expect("store lock").get(&network).cloned())
    }

    fn save(&self, network: Network, record: &ScriptDeploymentRecord) -> Result<()> {
        self.records
            .lock()
            .expect("store lock")
            .insert(network, record.clone());
        Ok(())
    }
}
