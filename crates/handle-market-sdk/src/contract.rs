use pallas_addresses::ShelleyAddress;
use pallas_crypto::hash::Hash;

use crate::address::{script_address, to_bech32};
use crate::config::handle_asset_name;
use crate::datum::DatumLayout;
use crate::deployment::{MARKETPLACE_SCRIPT_TYPE, ScriptDeploymentRecord, TX_BUILD_VERSION};
use crate::error::{Error, Result};
use crate::network::Network;
use crate::params::MarketplaceParameters;
use crate::tx::{DatumOption, ScriptRef, TxOutRef, plutus_script_hash};
use crate::vm::ScriptVm;

const PLUTUS_V2: u8 = 2;

/// The marketplace validator applied to its parameters, ready for address
/// derivation and spending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketplaceValidator {
    program: Vec<u8>,
    debug_program: Option<Vec<u8>>,
    hash: Hash<28>,
    parameters: MarketplaceParameters,
    layout: DatumLayout,
    network: Network,
    reference: Option<TxOutRef>,
}

impl MarketplaceValidator {
    /// Apply `parameters` to the unapplied optimized and trace-preserving programs.
    pub fn compile(
        vm: &dyn ScriptVm,
        base_program: &[u8],
        base_debug_program: &[u8],
        parameters: MarketplaceParameters,
        network: Network,
    ) -> Result<Self> {
        let args = parameters.to_program_args()?;
        let program = vm.apply_params(base_program, &args)?;
        let debug_program = vm.apply_params(base_debug_program, &args)?;
        let hash = plutus_script_hash(PLUTUS_V2, &program);
        log::debug!("compiled marketplace validator {hash}");
        Ok(Self {
            program,
            debug_program: Some(debug_program),
            hash,
            parameters,
            layout: DatumLayout::Current,
            network,
            reference: None,
        })
    }

    /// Load a deployed validator, checking every field a spend relies on.
    pub fn from_record(record: &ScriptDeploymentRecord, network: Network) -> Result<Self> {
        let program = record.program()?;
        let parameters = record.parameters(network)?;
        let reference = record.ref_utxo()?;
        let debug_program = record.debug_program()?;
        let hash = plutus_script_hash(PLUTUS_V2, &program);

        let recorded = record.validator_hash.trim();
        if !recorded.is_empty() && !recorded.eq_ignore_ascii_case(&hash.to_string()) {
            return Err(Error::precondition(format!(
                "deployed script hash {recorded} does not match its program ({hash})"
            )));
        }

        Ok(Self {
            program,
            debug_program,
            hash,
            parameters,
            layout: record.datum_layout(),
            network,
            reference: Some(reference),
        })
    }

    pub fn hash(&self) -> &Hash<28> {
        &self.hash
    }

    pub fn program(&self) -> &[u8] {
        &self.program
    }

    pub fn debug_program(&self) -> Option<&[u8]> {
        self.debug_program.as_deref()
    }

    pub fn parameters(&self) -> &MarketplaceParameters {
        &self.parameters
    }

    pub fn layout(&self) -> DatumLayout {
        self.layout
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Output holding the validator as a reference script.
    pub fn reference(&self) -> Result<TxOutRef> {
        self.reference
            .ok_or_else(|| Error::precondition("deployed script UTxO is not defined"))
    }

    /// Enterprise script address where listings are locked.
    pub fn address(&self) -> ShelleyAddress {
        script_address(self.network, self.hash)
    }

    pub fn script_ref(&self) -> ScriptRef {
        ScriptRef::plutus_v2(self.program.clone())
    }

    /// Deployment record for this validator. `deployed` is the reference
    /// output and its address once on-chain.
    pub fn to_record(
        &self,
        handle: &str,
        deployed: Option<(TxOutRef, &ShelleyAddress)>,
    ) -> ScriptDeploymentRecord {
        let datum = DatumOption::Inline(self.parameters.to_datum());
        ScriptDeploymentRecord {
            handle: handle.to_string(),
            handle_hex: hex::encode(handle_asset_name(handle)),
            script_type: MARKETPLACE_SCRIPT_TYPE.to_string(),
            validator_hash: self.hash.to_string(),
            cbor: Some(hex::encode(&self.program)),
            unoptimized_cbor: self.debug_program.as_ref().map(hex::encode),
            datum_cbor: Some(hex::encode(datum.to_cbor())),
            latest: true,
            ref_script_address: deployed.map(|(_, address)| to_bech32(address)),
            ref_script_utxo: deployed.map(|(out_ref, _)| out_ref.to_string()),
            tx_build_version: TX_BUILD_VERSION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockVm, key_address};

    fn params() -> MarketplaceParameters {
        MarketplaceParameters::new(key_address(50), vec![Hash::new([60; 28])])
    }

    #[test]
    fn record_round_trips_through_validator() {
        let vm = MockVm::default();
        let compiled =
            MarketplaceValidator::compile(&vm, b"base", b"debug", params(), Network::Preprod)
                .unwrap();
        assert!(compiled.reference().is_err());

        let out_ref = TxOutRef::new(Hash::new([3; 32]), 0);
        let record = compiled.to_record("mkt", Some((out_ref, &key_address(9))));
        let loaded = MarketplaceValidator::from_record(&record, Network::Preprod).unwrap();

        assert_eq!(loaded.hash(), compiled.hash());
        assert_eq!(loaded.parameters(), compiled.parameters());
        assert_eq!(loaded.reference().unwrap(), out_ref);
        assert_eq!(loaded.debug_program(), compiled.debug_program());
        assert_eq!(loaded.layout(), DatumLayout::Current);
    }

    #[test]
    fn parameters_change_the_validator_hash() {
        let vm = MockVm::default();
        let a = MarketplaceValidator::compile(&vm, b"base", b"debug", params(), Network::Preprod)
            .unwrap();
        let other = MarketplaceParameters::new(key_address(51), vec![]);
        let b = MarketplaceValidator::compile(&vm, b"base", b"debug", other, Network::Preprod)
            .unwrap();
        assert_ne!(a.hash(), b.hash());
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn tampered_hash_is_rejected() {
        let vm = MockVm::default();
        let compiled =
            MarketplaceValidator::compile(&vm, b"base", b"debug", params(), Network::Preprod)
                .unwrap();
        let out_ref = TxOutRef::new(Hash::new([3; 32]), 0);
        let mut record = compiled.to_record("mkt", Some((out_ref, &key_address(9))));
        record.validator_hash = "11".repeat(28);
        assert!(matches!(
            MarketplaceValidator::from_record(&record, Network::Preprod),
            Err(Error::Precondition(_))
        ));
    }
}
