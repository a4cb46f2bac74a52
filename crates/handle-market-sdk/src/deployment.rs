use serde::{Deserialize, Serialize};

use crate::datum::DatumLayout;
use crate::error::{DecodeError, Error, Result};
use crate::network::Network;
use crate::params::MarketplaceParameters;
use crate::tx::TxOutRef;

pub const MARKETPLACE_SCRIPT_TYPE: &str = "marketplace_contract";

/// Build version written by this engine; selects [`DatumLayout::Current`].
pub const TX_BUILD_VERSION: u32 = 1;

/// Where the marketplace validator lives on-chain, as persisted after a deploy.
///
/// Field names follow the JSON shape shared with the handle indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptDeploymentRecord {
    pub handle: String,
    pub handle_hex: String,
    #[serde(rename = "type")]
    pub script_type: String,
    pub validator_hash: String,
    /// Optimized validator program (CBOR hex).
    pub cbor: Option<String>,
    /// Trace-preserving twin of `cbor`, used only for diagnostics.
    pub unoptimized_cbor: Option<String>,
    /// Parameters datum (CBOR hex).
    pub datum_cbor: Option<String>,
    pub latest: bool,
    pub ref_script_address: Option<String>,
    /// `<tx hash>#<index>`
    pub ref_script_utxo: Option<String>,
    /// Absent in records written before versioning; those carry the
    /// current layout. Only an explicit `0` selects the legacy one.
    #[serde(default = "current_build_version")]
    pub tx_build_version: u32,
}

fn current_build_version() -> u32 {
    TX_BUILD_VERSION
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value.trim())
        .map_err(|e| Error::Decode(DecodeError::Hex(format!("{field}: {e}"))))
}

impl ScriptDeploymentRecord {
    /// Optimized program bytes; empty or absent is a precondition failure.
    pub fn program(&self) -> Result<Vec<u8>> {
        match self.cbor.as_deref().map(str::trim) {
            Some(cbor) if !cbor.is_empty() => decode_hex("cbor", cbor),
            _ => Err(Error::precondition("deployed script cbor is empty")),
        }
    }

    pub fn debug_program(&self) -> Result<Option<Vec<u8>>> {
        match self.unoptimized_cbor.as_deref().map(str::trim) {
            Some(cbor) if !cbor.is_empty() => decode_hex("unoptimizedCbor", cbor).map(Some),
            _ => Ok(None),
        }
    }

    pub fn parameters(&self, network: Network) -> Result<MarketplaceParameters> {
        let datum = match self.datum_cbor.as_deref().map(str::trim) {
            Some(datum) if !datum.is_empty() => datum,
            _ => return Err(Error::precondition("deployed script's datum cbor is empty")),
        };
        Ok(MarketplaceParameters::from_datum_hex(datum, network)?)
    }

    pub fn ref_utxo(&self) -> Result<TxOutRef> {
        match (self.ref_script_utxo.as_deref(), self.ref_script_address.as_deref()) {
            (Some(utxo), Some(address)) if !utxo.is_empty() && !address.is_empty() => {
                Ok(utxo.parse()?)
            }
            _ => Err(Error::precondition("deployed script UTxO is not defined")),
        }
    }

    pub fn datum_layout(&self) -> DatumLayout {
        DatumLayout::from_build_version(self.tx_build_version)
    }
}

/// Persistence of deployment records, one latest record per network.
pub trait DeploymentStore {
    fn latest(&self, network: Network) -> Result<Option<ScriptDeploymentRecord>>;

    fn save(&self, network: Network, record: &ScriptDeploymentRecord) -> Result<()>;
}
