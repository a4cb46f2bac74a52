use std::time::Duration;

use pallas_addresses::{Address, ByronAddress, ShelleyAddress};
use pallas_crypto::hash::Hash;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::address::to_bech32;
use crate::error::{Error, Result};
use crate::network::Network;
use crate::plutus_data::{PlutusData, PlutusDataExt};
use crate::tx::{
    DatumOption, ExUnits, ProtocolParameters, Ratio, ScriptRef, TxOutRef, TxOutput, Utxo, Value,
};

/// Backend for querying and submitting to the Cardano ledger.
pub trait ChainBackend {
    /// Unspent outputs currently sitting at `address`.
    fn utxos_at(&self, address: &ShelleyAddress) -> Result<Vec<Utxo>>;

    /// A single output, or `None` if it is unknown or already spent.
    fn utxo(&self, out_ref: &TxOutRef) -> Result<Option<Utxo>>;

    /// Live protocol parameters of the current epoch.
    fn protocol_parameters(&self) -> Result<ProtocolParameters>;

    /// Submit a signed transaction and return its hash.
    fn submit(&self, tx_bytes: &[u8]) -> Result<Hash<32>>;
}

const PAGE_SIZE: usize = 100;

/// Blockfrost HTTP backend.
pub struct BlockfrostBackend {
    client: Client,
    base_url: String,
    project_id: String,
}

impl BlockfrostBackend {
    pub fn new(network: Network, project_id: &str) -> Result<Self> {
        Self::with_base_url(network.blockfrost_url(), project_id)
    }

    pub fn with_base_url(base_url: &str, project_id: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Chain(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str) -> Result<Response> {
        self.client
            .get(format!("{}{path}", self.base_url))
            .header("project_id", &self.project_id)
            .send()
            .map_err(|e| Error::Chain(format!("GET {path}: {e}")))
    }

    /// GET returning `None` on 404.
    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let response = self.get(path)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(path, response)?;
        response
            .json()
            .map(Some)
            .map_err(|e| Error::Chain(format!("GET {path}: invalid response: {e}")))
    }

    fn script_ref(&self, script_hash: &str) -> Result<Option<ScriptRef>> {
        let Some(info) = self.get_json::<BfScript>(&format!("/scripts/{script_hash}"))? else {
            return Ok(None);
        };
        let version = match info.script_type.as_str() {
            "plutusV1" => 1,
            "plutusV2" => 2,
            "plutusV3" => 3,
            other => {
                log::warn!("reference script {script_hash} has unsupported type {other}");
                return Ok(None);
            }
        };
        let Some(cbor) = self.get_json::<BfScriptCbor>(&format!("/scripts/{script_hash}/cbor"))?
        else {
            return Ok(None);
        };
        let Some(program) = cbor.cbor else {
            return Ok(None);
        };
        let program = hex::decode(&program)
            .map_err(|e| Error::Chain(format!("script {script_hash}: invalid cbor hex: {e}")))?;
        Ok(Some(ScriptRef::Plutus { version, program }))
    }

    fn to_output(
        &self,
        address: &str,
        amount: &[BfAmount],
        data_hash: Option<&str>,
        inline_datum: Option<&str>,
        reference_script_hash: Option<&str>,
    ) -> Result<TxOutput> {
        let address = parse_any_address(address)?;
        let value = parse_amount(amount)?;
        let datum = match (inline_datum, data_hash) {
            (Some(cbor), _) => Some(DatumOption::Inline(PlutusData::from_hex(cbor)?)),
            (None, Some(hash)) => Some(DatumOption::Hash(parse_hash::<32>(hash)?)),
            (None, None) => None,
        };
        let script_ref = match reference_script_hash {
            Some(hash) => self.script_ref(hash)?,
            None => None,
        };
        Ok(TxOutput {
            address,
            value,
            datum,
            script_ref,
        })
    }
}

fn check_status(path: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(Error::Chain(format!("{path}: HTTP {status}: {body}")))
}

fn parse_any_address(s: &str) -> Result<Address> {
    Address::from_bech32(s)
        .or_else(|_| ByronAddress::from_base58(s).map(Address::Byron))
        .map_err(|e| Error::Chain(format!("unparseable address {s}: {e}")))
}

fn parse_hash<const N: usize>(s: &str) -> Result<Hash<N>> {
    s.parse::<Hash<N>>()
        .map_err(|_| Error::Chain(format!("invalid {N}-byte hash {s:?}")))
}

fn parse_quantity(s: &str) -> Result<u64> {
    s.parse()
        .map_err(|_| Error::Chain(format!("invalid quantity {s:?}")))
}

/// Blockfrost units are `lovelace` or `<policy hex><asset name hex>`.
fn parse_amount(amount: &[BfAmount]) -> Result<Value> {
    let mut value = Value::default();
    for entry in amount {
        let quantity = parse_quantity(&entry.quantity)?;
        if entry.unit == "lovelace" {
            value.lovelace = value.lovelace.checked_add(quantity).ok_or(Error::Overflow)?;
            continue;
        }
        let (policy, name) = entry
            .unit
            .split_at_checked(56)
            .ok_or_else(|| Error::Chain(format!("invalid asset unit {:?}", entry.unit)))?;
        let name = hex::decode(name)
            .map_err(|e| Error::Chain(format!("invalid asset name in {:?}: {e}", entry.unit)))?;
        value = value.with_asset(parse_hash::<28>(policy)?, name, quantity);
    }
    Ok(value)
}

#[derive(Deserialize)]
struct BfAmount {
    unit: String,
    quantity: String,
}

#[derive(Deserialize)]
struct BfAddressUtxo {
    tx_hash: String,
    output_index: u64,
    amount: Vec<BfAmount>,
    data_hash: Option<String>,
    inline_datum: Option<String>,
    reference_script_hash: Option<String>,
}

#[derive(Deserialize)]
struct BfTxUtxos {
    outputs: Vec<BfTxOutput>,
}

#[derive(Deserialize)]
struct BfTxOutput {
    address: String,
    amount: Vec<BfAmount>,
    output_index: u64,
    data_hash: Option<String>,
    inline_datum: Option<String>,
    reference_script_hash: Option<String>,
    #[serde(default)]
    consumed_by_tx: Option<String>,
}

#[derive(Deserialize)]
struct BfScript {
    #[serde(rename = "type")]
    script_type: String,
}

#[derive(Deserialize)]
struct BfScriptCbor {
    cbor: Option<String>,
}

#[derive(Deserialize)]
struct BfParameters {
    min_fee_a: u64,
    min_fee_b: u64,
    max_tx_size: u64,
    coins_per_utxo_size: Option<String>,
    price_mem: Option<f64>,
    price_step: Option<f64>,
    max_tx_ex_mem: Option<String>,
    max_tx_ex_steps: Option<String>,
    collateral_percent: Option<u64>,
    max_collateral_inputs: Option<u64>,
    min_fee_ref_script_cost_per_byte: Option<f64>,
    cost_models_raw: Option<BfCostModels>,
}

#[derive(Deserialize)]
struct BfCostModels {
    #[serde(rename = "PlutusV2")]
    plutus_v2: Option<Vec<i64>>,
}

impl BfParameters {
    fn into_protocol(self) -> Result<ProtocolParameters> {
        let missing = |field: &str| Error::Chain(format!("protocol parameters missing {field}"));
        let number = |field: &str, v: Option<String>| -> Result<u64> {
            parse_quantity(&v.ok_or_else(|| missing(field))?)
        };
        Ok(ProtocolParameters {
            min_fee_a: self.min_fee_a,
            min_fee_b: self.min_fee_b,
            max_tx_size: self.max_tx_size,
            coins_per_utxo_byte: number("coins_per_utxo_size", self.coins_per_utxo_size)?,
            price_mem: Ratio::from_decimal(self.price_mem.ok_or_else(|| missing("price_mem"))?),
            price_step: Ratio::from_decimal(self.price_step.ok_or_else(|| missing("price_step"))?),
            max_tx_ex_units: ExUnits::new(
                number("max_tx_ex_mem", self.max_tx_ex_mem)?,
                number("max_tx_ex_steps", self.max_tx_ex_steps)?,
            ),
            collateral_percentage: self
                .collateral_percent
                .ok_or_else(|| missing("collateral_percent"))?,
            max_collateral_inputs: self
                .max_collateral_inputs
                .ok_or_else(|| missing("max_collateral_inputs"))?,
            min_fee_ref_script_cost_per_byte: self
                .min_fee_ref_script_cost_per_byte
                .unwrap_or(0.0)
                .round() as u64,
            plutus_v2_cost_model: self
                .cost_models_raw
                .and_then(|m| m.plutus_v2)
                .ok_or_else(|| missing("cost_models_raw.PlutusV2"))?,
        })
    }
}

impl ChainBackend for BlockfrostBackend {
    fn utxos_at(&self, address: &ShelleyAddress) -> Result<Vec<Utxo>> {
        let bech32 = to_bech32(address);
        let mut utxos = Vec::new();
        for page in 1.. {
            let path = format!("/addresses/{bech32}/utxos?count={PAGE_SIZE}&page={page}");
            let Some(entries) = self.get_json::<Vec<BfAddressUtxo>>(&path)? else {
                break;
            };
            let full_page = entries.len() == PAGE_SIZE;
            for entry in entries {
                let input = TxOutRef::new(parse_hash::<32>(&entry.tx_hash)?, entry.output_index);
                match self.to_output(
                    &bech32,
                    &entry.amount,
                    entry.data_hash.as_deref(),
                    entry.inline_datum.as_deref(),
                    entry.reference_script_hash.as_deref(),
                ) {
                    Ok(output) => utxos.push(Utxo::new(input, output)),
                    Err(e) => log::warn!("skipping utxo {input}: {e}"),
                }
            }
            if !full_page {
                break;
            }
        }
        log::debug!("fetched {} utxos at {bech32}", utxos.len());
        Ok(utxos)
    }

    fn utxo(&self, out_ref: &TxOutRef) -> Result<Option<Utxo>> {
        let path = format!("/txs/{}/utxos", out_ref.tx_hash);
        let Some(tx) = self.get_json::<BfTxUtxos>(&path)? else {
            return Ok(None);
        };
        let Some(output) = tx
            .outputs
            .into_iter()
            .find(|o| o.output_index == out_ref.index)
        else {
            return Ok(None);
        };
        if output.consumed_by_tx.is_some() {
            return Ok(None);
        }
        let decoded = self.to_output(
            &output.address,
            &output.amount,
            output.data_hash.as_deref(),
            output.inline_datum.as_deref(),
            output.reference_script_hash.as_deref(),
        )?;
        Ok(Some(Utxo::new(*out_ref, decoded)))
    }

    fn protocol_parameters(&self) -> Result<ProtocolParameters> {
        let path = "/epochs/latest/parameters";
        self.get_json::<BfParameters>(path)?
            .ok_or_else(|| Error::Chain(format!("{path}: not found")))?
            .into_protocol()
    }

    fn submit(&self, tx_bytes: &[u8]) -> Result<Hash<32>> {
        let path = "/tx/submit";
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("project_id", &self.project_id)
            .header("Content-Type", "application/cbor")
            .body(tx_bytes.to_vec())
            .send()
            .map_err(|e| Error::Submit(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::Submit(format!("HTTP {status}: {body}")));
        }
        let hash: String = response
            .json()
            .map_err(|e| Error::Submit(format!("invalid submit response: {e}")))?;
        let hash = parse_hash::<32>(&hash).map_err(|e| Error::Submit(e.to_string()))?;
        log::info!("submitted transaction {hash}");
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(unit: &str, quantity: &str) -> BfAmount {
        BfAmount {
            unit: unit.into(),
            quantity: quantity.into(),
        }
    }

    #[test]
    fn amounts_split_policy_and_name() {
        let policy = "f0ff48bbb7bbe9d59a40f1ce90e9e9d0ff5002ec48f232b49ca0fb9a";
        let value = parse_amount(&[
            amount("lovelace", "1500000"),
            amount(&format!("{policy}000de14068616e646c65"), "1"),
        ])
        .unwrap();
        assert_eq!(value.lovelace, 1_500_000);
        let policy: Hash<28> = policy.parse().unwrap();
        assert_eq!(value.quantity_of(&policy, &hex::decode("000de14068616e646c65").unwrap()), 1);
    }

    #[test]
    fn malformed_units_are_rejected() {
        assert!(parse_amount(&[amount("abcd", "1")]).is_err());
        assert!(parse_amount(&[amount("lovelace", "-1")]).is_err());
    }

    #[test]
    fn parameters_convert_from_blockfrost_json() {
        let json = r#"{
            "min_fee_a": 44,
            "min_fee_b": 155381,
            "max_tx_size": 16384,
            "coins_per_utxo_size": "4310",
            "price_mem": 0.0577,
            "price_step": 0.0000721,
            "max_tx_ex_mem": "14000000",
            "max_tx_ex_steps": "10000000000",
            "collateral_percent": 150,
            "max_collateral_inputs": 3,
            "min_fee_ref_script_cost_per_byte": 15,
            "cost_models_raw": { "PlutusV2": [100788, 420, 1] }
        }"#;
        let parsed: BfParameters = serde_json::from_str(json).unwrap();
        let protocol = parsed.into_protocol().unwrap();
        assert_eq!(protocol.coins_per_utxo_byte, 4_310);
        assert_eq!(protocol.max_tx_ex_units, ExUnits::new(14_000_000, 10_000_000_000));
        assert_eq!(protocol.price_mem, Ratio::new(57_700_000, 1_000_000_000));
        assert_eq!(protocol.min_fee_ref_script_cost_per_byte, 15);
        assert_eq!(protocol.plutus_v2_cost_model, vec![100_788, 420, 1]);
    }

    #[test]
    fn missing_cost_model_is_an_error() {
        let json = r#"{
            "min_fee_a": 44, "min_fee_b": 155381, "max_tx_size": 16384,
            "coins_per_utxo_size": "4310", "price_mem": 0.0577, "price_step": 0.0000721,
            "max_tx_ex_mem": "1", "max_tx_ex_steps": "1",
            "collateral_percent": 150, "max_collateral_inputs": 3
        }"#;
        let parsed: BfParameters = serde_json::from_str(json).unwrap();
        assert!(matches!(parsed.into_protocol(), Err(Error::Chain(_))));
    }

    #[test]
    fn base_url_is_normalised() {
        let backend = BlockfrostBackend::with_base_url("http://localhost:3000/", "preprodX").unwrap();
        assert_eq!(backend.base_url(), "http://localhost:3000");
    }
}
