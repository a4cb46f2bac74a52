//! Ledger-level building blocks: output references, multi-asset values,
//! outputs and their CBOR forms, plus the draft/balance pipeline.

pub mod builder;
pub mod draft;
pub mod native_script;
pub mod protocol;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use pallas_addresses::{Address, ShelleyAddress};
use pallas_codec::minicbor::{Decode, Decoder, Encode, Encoder, decode, encode};
use pallas_codec::utils::{Bytes, CborWrap, KeyValuePairs};
use pallas_crypto::hash::{Hash, Hasher};
use pallas_primitives::babbage;

use crate::error::{DecodeError, Error, Result};
use crate::plutus_data::{PlutusData, PlutusDataExt, cbor_error, from_slice, to_vec};

pub use builder::{BuildContext, BuiltTransaction, Redeemer, VKeyWitness, balance};
pub use draft::{DraftInput, TransactionDraft};
pub use native_script::{NativeScript, native_script_hash};
pub use protocol::{ExUnits, ProtocolParameters, Ratio};

// ── Output reference ───────────────────────────────────────────────────

/// A transaction output reference, displayed as `<tx hash>#<index>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxOutRef {
    pub tx_hash: Hash<32>,
    pub index: u64,
}

impl TxOutRef {
    pub fn new(tx_hash: Hash<32>, index: u64) -> Self {
        Self { tx_hash, index }
    }

    /// Plutus V2 `TxOutRef` data: `Constr0[Constr0[ByteString], Int]`.
    pub fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::constr(0, vec![PlutusData::bytes(self.tx_hash)]),
                PlutusData::integer(self.index),
            ],
        )
    }
}

impl fmt::Display for TxOutRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.index)
    }
}

impl FromStr for TxOutRef {
    type Err = DecodeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (hash, index) = s
            .trim()
            .split_once('#')
            .ok_or_else(|| DecodeError::Hex(format!("expected <hash>#<index>, got {s:?}")))?;
        let tx_hash = hash
            .parse::<Hash<32>>()
            .map_err(|_| DecodeError::Hex(format!("invalid transaction hash {hash:?}")))?;
        let index = index
            .parse::<u64>()
            .map_err(|_| DecodeError::Hex(format!("invalid output index {index:?}")))?;
        Ok(Self { tx_hash, index })
    }
}

impl From<&TxOutRef> for babbage::TransactionInput {
    fn from(out_ref: &TxOutRef) -> Self {
        babbage::TransactionInput {
            transaction_id: out_ref.tx_hash,
            index: out_ref.index,
        }
    }
}

impl From<babbage::TransactionInput> for TxOutRef {
    fn from(input: babbage::TransactionInput) -> Self {
        TxOutRef::new(input.transaction_id, input.index)
    }
}

impl<C> Encode<C> for TxOutRef {
    fn encode<W: encode::Write>(
        &self,
        e: &mut Encoder<W>,
        _ctx: &mut C,
    ) -> std::result::Result<(), encode::Error<W::Error>> {
        babbage::TransactionInput::from(self).encode(e, &mut ())
    }
}

impl<'b, C> Decode<'b, C> for TxOutRef {
    fn decode(d: &mut Decoder<'b>, _ctx: &mut C) -> std::result::Result<Self, decode::Error> {
        babbage::TransactionInput::decode(d, &mut ()).map(TxOutRef::from)
    }
}

// ── Value ──────────────────────────────────────────────────────────────

pub type PolicyId = Hash<28>;
pub type AssetName = Vec<u8>;

/// Lovelace plus native assets keyed by policy and asset name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Value {
    pub lovelace: u64,
    pub assets: BTreeMap<PolicyId, BTreeMap<AssetName, u64>>,
}

impl Value {
    pub fn lovelace(lovelace: u64) -> Self {
        Self {
            lovelace,
            assets: BTreeMap::new(),
        }
    }

    /// A single token with no lovelace; min-UTxO correction adds the ADA.
    pub fn token(policy: PolicyId, name: impl Into<AssetName>, quantity: u64) -> Self {
        Self::lovelace(0).with_asset(policy, name, quantity)
    }

    pub fn with_asset(mut self, policy: PolicyId, name: impl Into<AssetName>, quantity: u64) -> Self {
        if quantity > 0 {
            *self
                .assets
                .entry(policy)
                .or_default()
                .entry(name.into())
                .or_default() += quantity;
        }
        self
    }

    pub fn quantity_of(&self, policy: &PolicyId, name: &[u8]) -> u64 {
        self.assets
            .get(policy)
            .and_then(|names| names.get(name))
            .copied()
            .unwrap_or(0)
    }

    pub fn has_assets(&self) -> bool {
        self.assets.values().any(|names| names.values().any(|q| *q > 0))
    }

    /// Native assets only, lovelace zeroed.
    pub fn assets_only(&self) -> Value {
        Value {
            lovelace: 0,
            assets: self.assets.clone(),
        }
    }

    pub fn checked_add(&self, other: &Value) -> Result<Value> {
        let mut out = self.clone();
        out.lovelace = out
            .lovelace
            .checked_add(other.lovelace)
            .ok_or(Error::Overflow)?;
        for (policy, names) in &other.assets {
            for (name, qty) in names {
                let slot = out
                    .assets
                    .entry(*policy)
                    .or_default()
                    .entry(name.clone())
                    .or_default();
                *slot = slot.checked_add(*qty).ok_or(Error::Overflow)?;
            }
        }
        Ok(out)
    }

    /// `self - other`, or `None` if any component would go negative.
    pub fn checked_sub(&self, other: &Value) -> Option<Value> {
        let mut out = self.clone();
        out.lovelace = out.lovelace.checked_sub(other.lovelace)?;
        for (policy, names) in &other.assets {
            for (name, qty) in names {
                if *qty == 0 {
                    continue;
                }
                let policy_assets = out.assets.get_mut(policy)?;
                let have = policy_assets.get_mut(name)?;
                *have = have.checked_sub(*qty)?;
                if *have == 0 {
                    policy_assets.remove(name);
                }
                if policy_assets.is_empty() {
                    out.assets.remove(policy);
                }
            }
        }
        Some(out)
    }

    /// True when `self` holds at least every component of `other`.
    pub fn covers(&self, other: &Value) -> bool {
        self.checked_sub(other).is_some()
    }

    /// Native assets of `required` that `self` lacks, lovelace ignored.
    pub fn missing_assets(&self, required: &Value) -> Value {
        let mut missing = Value::default();
        for (policy, names) in &required.assets {
            for (name, qty) in names {
                let have = self.quantity_of(policy, name);
                if have < *qty {
                    missing = missing.with_asset(*policy, name.clone(), qty - have);
                }
            }
        }
        missing
    }

    pub fn sum<'a>(values: impl IntoIterator<Item = &'a Value>) -> Result<Value> {
        values
            .into_iter()
            .try_fold(Value::default(), |acc, v| acc.checked_add(v))
    }
}

impl From<&Value> for babbage::Value {
    fn from(value: &Value) -> Self {
        let multiasset: Vec<_> = value
            .assets
            .iter()
            .filter_map(|(policy, names)| {
                let names: Vec<(Bytes, u64)> = names
                    .iter()
                    .filter(|(_, q)| **q > 0)
                    .map(|(name, q)| (Bytes::from(name.clone()), *q))
                    .collect();
                (!names.is_empty()).then(|| (*policy, KeyValuePairs::from(names)))
            })
            .collect();
        if multiasset.is_empty() {
            babbage::Value::Coin(value.lovelace)
        } else {
            babbage::Value::Multiasset(value.lovelace, KeyValuePairs::from(multiasset))
        }
    }
}

impl From<babbage::Value> for Value {
    fn from(value: babbage::Value) -> Self {
        match value {
            babbage::Value::Coin(lovelace) => Value::lovelace(lovelace),
            babbage::Value::Multiasset(lovelace, multiasset) => {
                let mut out = Value::lovelace(lovelace);
                for (policy, names) in multiasset.iter() {
                    for (name, qty) in names.iter() {
                        out = out.with_asset(*policy, name.to_vec(), *qty);
                    }
                }
                out
            }
        }
    }
}

impl<C> Encode<C> for Value {
    fn encode<W: encode::Write>(
        &self,
        e: &mut Encoder<W>,
        _ctx: &mut C,
    ) -> std::result::Result<(), encode::Error<W::Error>> {
        babbage::Value::from(self).encode(e, &mut ())
    }
}

impl<'b, C> Decode<'b, C> for Value {
    fn decode(d: &mut Decoder<'b>, _ctx: &mut C) -> std::result::Result<Self, decode::Error> {
        babbage::Value::decode(d, &mut ()).map(Value::from)
    }
}

// ── Datum option & script reference ────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatumOption {
    Hash(Hash<32>),
    Inline(PlutusData),
}

impl DatumOption {
    pub fn to_cbor(&self) -> Vec<u8> {
        to_vec(self)
    }

    pub fn from_cbor(bytes: &[u8]) -> std::result::Result<Self, DecodeError> {
        from_slice(bytes)
    }
}

impl From<&DatumOption> for babbage::DatumOption {
    fn from(datum: &DatumOption) -> Self {
        match datum {
            DatumOption::Hash(h) => babbage::DatumOption::Hash(*h),
            DatumOption::Inline(data) => babbage::DatumOption::Data(CborWrap(data.clone())),
        }
    }
}

impl From<babbage::DatumOption> for DatumOption {
    fn from(datum: babbage::DatumOption) -> Self {
        match datum {
            babbage::DatumOption::Hash(h) => DatumOption::Hash(h),
            babbage::DatumOption::Data(CborWrap(data)) => DatumOption::Inline(data),
        }
    }
}

impl<C> Encode<C> for DatumOption {
    fn encode<W: encode::Write>(
        &self,
        e: &mut Encoder<W>,
        _ctx: &mut C,
    ) -> std::result::Result<(), encode::Error<W::Error>> {
        babbage::DatumOption::from(self).encode(e, &mut ())
    }
}

impl<'b, C> Decode<'b, C> for DatumOption {
    fn decode(d: &mut Decoder<'b>, _ctx: &mut C) -> std::result::Result<Self, decode::Error> {
        babbage::DatumOption::decode(d, &mut ()).map(DatumOption::from)
    }
}

/// A script attached to an output for use as a reference script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptRef {
    Native(NativeScript),
    /// `version` is the ledger language tag: 1 = V1, 2 = V2, 3 = V3.
    /// `program` is the single-CBOR-wrapped flat program.
    Plutus { version: u8, program: Vec<u8> },
}

impl ScriptRef {
    pub fn plutus_v2(program: Vec<u8>) -> Self {
        ScriptRef::Plutus {
            version: 2,
            program,
        }
    }

    /// Ledger script hash: blake2b-224 over the language tag and the script bytes.
    pub fn hash(&self) -> Hash<28> {
        match self {
            ScriptRef::Native(script) => native_script_hash(script),
            ScriptRef::Plutus { version, program } => plutus_script_hash(*version, program),
        }
    }

    pub fn plutus_program(&self) -> Option<&[u8]> {
        match self {
            ScriptRef::Plutus { program, .. } => Some(program),
            ScriptRef::Native(_) => None,
        }
    }
}

pub fn plutus_script_hash(version: u8, program: &[u8]) -> Hash<28> {
    let mut buf = Vec::with_capacity(program.len() + 1);
    buf.push(version);
    buf.extend_from_slice(program);
    Hasher::<224>::hash(&buf)
}

impl TryFrom<&ScriptRef> for babbage::ScriptRef {
    type Error = String;

    fn try_from(script: &ScriptRef) -> std::result::Result<Self, Self::Error> {
        match script {
            ScriptRef::Native(native) => Ok(babbage::ScriptRef::NativeScript(native.clone())),
            ScriptRef::Plutus { version: 1, program } => {
                Ok(babbage::ScriptRef::PlutusV1Script(babbage::PlutusV1Script {
                    0: Bytes::from(program.clone()),
                }))
            }
            ScriptRef::Plutus { version: 2, program } => {
                Ok(babbage::ScriptRef::PlutusV2Script(babbage::PlutusV2Script {
                    0: Bytes::from(program.clone()),
                }))
            }
            ScriptRef::Plutus { version, .. } => Err(format!(
                "plutus v{version} reference scripts cannot be carried by a babbage output"
            )),
        }
    }
}

impl TryFrom<babbage::ScriptRef> for ScriptRef {
    type Error = String;

    #[allow(unreachable_patterns)]
    fn try_from(script: babbage::ScriptRef) -> std::result::Result<Self, Self::Error> {
        match script {
            babbage::ScriptRef::NativeScript(native) => Ok(ScriptRef::Native(native)),
            babbage::ScriptRef::PlutusV1Script(s) => Ok(ScriptRef::Plutus {
                version: 1,
                program: s.0.to_vec(),
            }),
            babbage::ScriptRef::PlutusV2Script(s) => Ok(ScriptRef::Plutus {
                version: 2,
                program: s.0.to_vec(),
            }),
            _ => Err("unsupported reference script language".into()),
        }
    }
}

// ── Outputs ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub address: Address,
    pub value: Value,
    pub datum: Option<DatumOption>,
    pub script_ref: Option<ScriptRef>,
}

impl TxOutput {
    pub fn new(address: &ShelleyAddress, value: Value) -> Self {
        Self {
            address: Address::Shelley(address.clone()),
            value,
            datum: None,
            script_ref: None,
        }
    }

    pub fn with_inline_datum(mut self, data: PlutusData) -> Self {
        self.datum = Some(DatumOption::Inline(data));
        self
    }

    pub fn with_script_ref(mut self, script: ScriptRef) -> Self {
        self.script_ref = Some(script);
        self
    }

    pub fn shelley_address(&self) -> Option<&ShelleyAddress> {
        match &self.address {
            Address::Shelley(s) => Some(s),
            _ => None,
        }
    }

    pub fn inline_datum(&self) -> Option<&PlutusData> {
        match &self.datum {
            Some(DatumOption::Inline(data)) => Some(data),
            _ => None,
        }
    }

    pub fn to_cbor(&self) -> Vec<u8> {
        to_vec(self)
    }

    pub fn from_cbor(bytes: &[u8]) -> std::result::Result<Self, DecodeError> {
        let mut d = Decoder::new(bytes);
        TxOutput::decode(&mut d, &mut ()).map_err(cbor_error)
    }
}

/// Outputs are always written in the post-Alonzo map form.
impl TryFrom<&TxOutput> for babbage::TransactionOutput {
    type Error = String;

    fn try_from(output: &TxOutput) -> std::result::Result<Self, Self::Error> {
        let script_ref = output
            .script_ref
            .as_ref()
            .map(babbage::ScriptRef::try_from)
            .transpose()?;
        Ok(babbage::TransactionOutput::PostAlonzo(
            babbage::PostAlonzoTransactionOutput {
                address: Bytes::from(output.address.to_vec()),
                value: babbage::Value::from(&output.value),
                datum_option: output.datum.as_ref().map(babbage::DatumOption::from),
                script_ref: script_ref.map(CborWrap),
            },
        ))
    }
}

impl TryFrom<babbage::TransactionOutput> for TxOutput {
    type Error = String;

    fn try_from(output: babbage::TransactionOutput) -> std::result::Result<Self, Self::Error> {
        let parse_address = |bytes: &[u8]| Address::from_bytes(bytes).map_err(|e| e.to_string());
        match output {
            babbage::TransactionOutput::Legacy(legacy) => Ok(TxOutput {
                address: parse_address(&legacy.address)?,
                value: Value::from(legacy.amount),
                datum: legacy.datum_hash.map(DatumOption::Hash),
                script_ref: None,
            }),
            babbage::TransactionOutput::PostAlonzo(post) => Ok(TxOutput {
                address: parse_address(&post.address)?,
                value: Value::from(post.value),
                datum: post.datum_option.map(DatumOption::from),
                script_ref: post
                    .script_ref
                    .map(|CborWrap(script)| ScriptRef::try_from(script))
                    .transpose()?,
            }),
        }
    }
}

impl<C> Encode<C> for TxOutput {
    fn encode<W: encode::Write>(
        &self,
        e: &mut Encoder<W>,
        _ctx: &mut C,
    ) -> std::result::Result<(), encode::Error<W::Error>> {
        babbage::TransactionOutput::try_from(self)
            .map_err(encode::Error::message)?
            .encode(e, &mut ())
    }
}

impl<'b, C> Decode<'b, C> for TxOutput {
    fn decode(d: &mut Decoder<'b>, _ctx: &mut C) -> std::result::Result<Self, decode::Error> {
        let output = babbage::TransactionOutput::decode(d, &mut ())?;
        TxOutput::try_from(output).map_err(decode::Error::message)
    }
}

/// An unspent output together with its reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub input: TxOutRef,
    pub output: TxOutput,
}

impl Utxo {
    pub fn new(input: TxOutRef, output: TxOutput) -> Self {
        Self { input, output }
    }

    pub fn lovelace(&self) -> u64 {
        self.output.value.lovelace
    }

    pub fn value(&self) -> &Value {
        &self.output.value
    }

    /// `[input, output]` as produced by wallet `getUtxos`.
    pub fn to_cbor(&self) -> Vec<u8> {
        to_vec(self)
    }

    pub fn from_cbor(bytes: &[u8]) -> std::result::Result<Self, DecodeError> {
        from_slice(bytes)
    }

    pub fn from_cbor_hex(hex_str: &str) -> std::result::Result<Self, DecodeError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|e| DecodeError::Hex(e.to_string()))?;
        Self::from_cbor(&bytes)
    }
}

impl<C> Encode<C> for Utxo {
    fn encode<W: encode::Write>(
        &self,
        e: &mut Encoder<W>,
        ctx: &mut C,
    ) -> std::result::Result<(), encode::Error<W::Error>> {
        e.array(2)?;
        self.input.encode(e, ctx)?;
        self.output.encode(e, ctx)?;
        Ok(())
    }
}

impl<'b, C> Decode<'b, C> for Utxo {
    fn decode(d: &mut Decoder<'b>, ctx: &mut C) -> std::result::Result<Self, decode::Error> {
        d.array()?;
        let input = TxOutRef::decode(d, ctx)?;
        let output = TxOutput::decode(d, ctx)?;
        Ok(Self { input, output })
    }
}
