use pallas_addresses::ShelleyAddress;
use pallas_crypto::hash::Hash;

use super::{TxOutput, Utxo};
use crate::plutus_data::{PlutusData, PlutusDataExt};

/// A consumed input, with a redeemer when it is script-locked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftInput {
    pub utxo: Utxo,
    pub redeemer: Option<PlutusData>,
}

/// Unbalanced transaction produced by an operation builder.
///
/// Outputs keep their insertion order; the balancer appends the change
/// output last, so indices handed to redeemers stay valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    pub inputs: Vec<DraftInput>,
    pub reference_inputs: Vec<Utxo>,
    pub outputs: Vec<TxOutput>,
    pub required_signers: Vec<Hash<28>>,
    pub collateral: Vec<Utxo>,
    pub valid_from_slot: Option<u64>,
    pub valid_until_slot: Option<u64>,
    pub change_address: ShelleyAddress,
}

impl TransactionDraft {
    pub fn new(change_address: ShelleyAddress) -> Self {
        Self {
            inputs: Vec::new(),
            reference_inputs: Vec::new(),
            outputs: Vec::new(),
            required_signers: Vec::new(),
            collateral: Vec::new(),
            valid_from_slot: None,
            valid_until_slot: None,
            change_address,
        }
    }

    /// Spend a key-locked output.
    pub fn add_input(&mut self, utxo: Utxo) {
        if !self.spends(&utxo) {
            self.inputs.push(DraftInput {
                utxo,
                redeemer: None,
            });
        }
    }

    /// Spend a script-locked output with `redeemer`.
    pub fn add_script_input(&mut self, utxo: Utxo, redeemer: PlutusData) {
        self.inputs.retain(|i| i.utxo.input != utxo.input);
        self.inputs.push(DraftInput {
            utxo,
            redeemer: Some(redeemer),
        });
    }

    pub fn add_reference_input(&mut self, utxo: Utxo) {
        if !self.reference_inputs.iter().any(|u| u.input == utxo.input) {
            self.reference_inputs.push(utxo);
        }
    }

    /// Append an output and return its index.
    pub fn add_output(&mut self, output: TxOutput) -> usize {
        self.outputs.push(output);
        self.outputs.len() - 1
    }

    pub fn add_signer(&mut self, key_hash: Hash<28>) {
        if !self.required_signers.contains(&key_hash) {
            self.required_signers.push(key_hash);
        }
    }

    pub fn spends(&self, utxo: &Utxo) -> bool {
        self.inputs.iter().any(|i| i.utxo.input == utxo.input)
    }

    pub fn has_redeemers(&self) -> bool {
        self.inputs.iter().any(|i| i.redeemer.is_some())
    }
}
