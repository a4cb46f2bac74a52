//! Plutus data: the ledger type from `pallas_primitives`, plus the
//! constructors and shape matchers the datum codecs are written against.
//!
//! Values built here serialize the way the ledger's `serialise_data` does,
//! so hashes computed off-chain agree with the validator's:
//!
//! ```text
//! Constr i, 0 <= i <= 6     tag 121 + i     fields
//! Constr i, 7 <= i <= 127   tag 1280 + i-7  fields
//! Constr i, otherwise       tag 102         [i, fields]
//! List (non-empty)          0x9f .. 0xff    (indefinite)
//! List (empty)              0x80
//! Bytes (> 64)              0x5f chunks(64) 0xff
//! Integer beyond 64 bits    tag 2 / tag 3   big-endian magnitude
//! ```

use pallas_codec::minicbor::{self, Decode, Decoder, Encode, decode};
use pallas_codec::utils::{Int, KeyValuePairs, MaybeIndefArray};
use pallas_crypto::hash::{Hash, Hasher};
pub use pallas_primitives::{BigInt, BoundedBytes, Constr, PlutusData};

use crate::error::DecodeError;

const GENERAL_CONSTR_TAG: u64 = 102;

/// Construction, serialization and matching helpers for [`PlutusData`].
pub trait PlutusDataExt: Sized {
    /// Constructor `index` (not the CBOR tag) with `fields`.
    fn constr(index: u64, fields: Vec<PlutusData>) -> Self;

    fn list(items: Vec<PlutusData>) -> Self;

    fn map(entries: Vec<(PlutusData, PlutusData)>) -> Self;

    fn bytes(bytes: impl AsRef<[u8]>) -> Self;

    fn integer(value: impl Into<i128>) -> Self;

    /// Canonical CBOR bytes.
    fn to_cbor(&self) -> Vec<u8>;

    /// Decode a single value; trailing bytes are rejected.
    fn from_cbor(bytes: &[u8]) -> Result<Self, DecodeError>;

    fn from_hex(hex_str: &str) -> Result<Self, DecodeError>;

    /// blake2b-256 of the canonical encoding (the ledger datum hash).
    fn datum_hash(&self) -> Hash<32>;

    fn kind_name(&self) -> &'static str;

    /// Any constructor, returning its index and fields.
    fn as_any_constr(&self) -> Result<(u64, &[PlutusData]), DecodeError>;

    /// Constructor `index` with exactly `arity` fields.
    fn as_constr(&self, index: u64, arity: usize) -> Result<&[PlutusData], DecodeError>;

    fn as_list(&self) -> Result<&[PlutusData], DecodeError>;

    /// A list of exactly `len` items.
    fn as_tuple(&self, len: usize) -> Result<&[PlutusData], DecodeError>;

    fn as_bytes(&self) -> Result<&[u8], DecodeError>;

    fn as_int(&self) -> Result<i128, DecodeError>;

    /// Non-negative integer that fits a `u64`.
    fn as_u64(&self) -> Result<u64, DecodeError>;

    /// Fixed-length byte string, e.g. a 28-byte credential hash.
    fn as_hash<const N: usize>(&self) -> Result<Hash<N>, DecodeError>;
}

fn array_of<A>(items: Vec<A>) -> MaybeIndefArray<A> {
    if items.is_empty() {
        MaybeIndefArray::Def(items)
    } else {
        MaybeIndefArray::Indef(items)
    }
}

fn constr_index(constr: &Constr<PlutusData>) -> Option<u64> {
    match constr.tag {
        121..=127 => Some(constr.tag - 121),
        1280..=1400 => Some(constr.tag - 1280 + 7),
        GENERAL_CONSTR_TAG => constr.any_constructor,
        _ => None,
    }
}

fn magnitude(bytes: &[u8]) -> Result<i128, DecodeError> {
    let significant: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
    if significant.len() > 16 {
        return Err(DecodeError::Cbor("bignum exceeds 128 bits".into()));
    }
    let mut buf = [0u8; 16];
    buf[16 - significant.len()..].copy_from_slice(&significant);
    i128::try_from(u128::from_be_bytes(buf))
        .map_err(|_| DecodeError::Cbor("bignum exceeds 128 bits".into()))
}

fn unexpected(expected: &'static str, found: &PlutusData) -> DecodeError {
    DecodeError::UnexpectedKind {
        expected,
        found: found.kind_name(),
    }
}

impl PlutusDataExt for PlutusData {
    fn constr(index: u64, fields: Vec<PlutusData>) -> Self {
        let (tag, any_constructor) = match index {
            0..=6 => (121 + index, None),
            7..=127 => (1280 + index - 7, None),
            _ => (GENERAL_CONSTR_TAG, Some(index)),
        };
        PlutusData::Constr(Constr {
            tag,
            any_constructor,
            fields: array_of(fields),
        })
    }

    fn list(items: Vec<PlutusData>) -> Self {
        PlutusData::Array(array_of(items))
    }

    fn map(entries: Vec<(PlutusData, PlutusData)>) -> Self {
        PlutusData::Map(KeyValuePairs::Def(entries))
    }

    fn bytes(bytes: impl AsRef<[u8]>) -> Self {
        PlutusData::BoundedBytes(BoundedBytes::from(bytes.as_ref().to_vec()))
    }

    fn integer(value: impl Into<i128>) -> Self {
        let value = value.into();
        if let Ok(int) = Int::try_from(value) {
            return PlutusData::BigInt(BigInt::Int(int));
        }
        // Outside the CBOR major type 0/1 range: bignum with minimal magnitude.
        let (negative, magnitude) = if value >= 0 {
            (false, value as u128)
        } else {
            (true, (-1 - value) as u128)
        };
        let bytes = magnitude.to_be_bytes();
        let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
        let bytes = BoundedBytes::from(bytes[start..].to_vec());
        PlutusData::BigInt(if negative {
            BigInt::BigNInt(bytes)
        } else {
            BigInt::BigUInt(bytes)
        })
    }

    fn to_cbor(&self) -> Vec<u8> {
        to_vec(self)
    }

    fn from_cbor(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut d = Decoder::new(bytes);
        let data = PlutusData::decode(&mut d, &mut ()).map_err(cbor_error)?;
        let rest = bytes.len() - d.position();
        if rest != 0 {
            return Err(DecodeError::TrailingBytes(rest));
        }
        Ok(data)
    }

    fn from_hex(hex_str: &str) -> Result<Self, DecodeError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|e| DecodeError::Hex(e.to_string()))?;
        Self::from_cbor(&bytes)
    }

    fn datum_hash(&self) -> Hash<32> {
        Hasher::<256>::hash(&self.to_cbor())
    }

    fn kind_name(&self) -> &'static str {
        match self {
            PlutusData::Constr(_) => "constructor",
            PlutusData::Map(_) => "map",
            PlutusData::Array(_) => "list",
            PlutusData::BigInt(_) => "integer",
            PlutusData::BoundedBytes(_) => "bytes",
        }
    }

    fn as_any_constr(&self) -> Result<(u64, &[PlutusData]), DecodeError> {
        match self {
            PlutusData::Constr(constr) => {
                let index = constr_index(constr)
                    .ok_or_else(|| DecodeError::Cbor(format!("constructor tag {}", constr.tag)))?;
                Ok((index, constr.fields.as_slice()))
            }
            other => Err(unexpected("constructor", other)),
        }
    }

    fn as_constr(&self, index: u64, arity: usize) -> Result<&[PlutusData], DecodeError> {
        let (found, fields) = self.as_any_constr()?;
        if found != index {
            return Err(DecodeError::ConstrTag {
                expected: index,
                found,
            });
        }
        if fields.len() != arity {
            return Err(DecodeError::FieldCount {
                expected: arity,
                found: fields.len(),
            });
        }
        Ok(fields)
    }

    fn as_list(&self) -> Result<&[PlutusData], DecodeError> {
        match self {
            PlutusData::Array(items) => Ok(items.as_slice()),
            other => Err(unexpected("list", other)),
        }
    }

    fn as_tuple(&self, len: usize) -> Result<&[PlutusData], DecodeError> {
        let items = self.as_list()?;
        if items.len() != len {
            return Err(DecodeError::FieldCount {
                expected: len,
                found: items.len(),
            });
        }
        Ok(items)
    }

    fn as_bytes(&self) -> Result<&[u8], DecodeError> {
        match self {
            PlutusData::BoundedBytes(b) => Ok(b.as_slice()),
            other => Err(unexpected("bytes", other)),
        }
    }

    fn as_int(&self) -> Result<i128, DecodeError> {
        match self {
            PlutusData::BigInt(BigInt::Int(int)) => Ok(i128::from(*int)),
            PlutusData::BigInt(BigInt::BigUInt(bytes)) => magnitude(bytes),
            PlutusData::BigInt(BigInt::BigNInt(bytes)) => Ok(-1 - magnitude(bytes)?),
            other => Err(unexpected("integer", other)),
        }
    }

    fn as_u64(&self) -> Result<u64, DecodeError> {
        let value = self.as_int()?;
        if value < 0 {
            return Err(DecodeError::NegativeInteger(value));
        }
        u64::try_from(value).map_err(|_| DecodeError::IntegerOutOfRange(value))
    }

    fn as_hash<const N: usize>(&self) -> Result<Hash<N>, DecodeError> {
        let bytes = self.as_bytes()?;
        let array: [u8; N] = bytes.try_into().map_err(|_| DecodeError::ByteLength {
            expected: N,
            found: bytes.len(),
        })?;
        Ok(Hash::new(array))
    }
}

pub(crate) fn cbor_error(e: decode::Error) -> DecodeError {
    DecodeError::Cbor(e.to_string())
}

/// Encode into a fresh buffer.
pub(crate) fn to_vec<T: Encode<()>>(value: &T) -> Vec<u8> {
    minicbor::to_vec(value).expect("encoding into a Vec is infallible")
}

/// Decode exactly one `T` from `bytes`.
pub(crate) fn from_slice<'b, T: Decode<'b, ()>>(bytes: &'b [u8]) -> Result<T, DecodeError> {
    let mut d = Decoder::new(bytes);
    let value = T::decode(&mut d, &mut ()).map_err(cbor_error)?;
    let rest = bytes.len() - d.position();
    if rest != 0 {
        return Err(DecodeError::TrailingBytes(rest));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_of(data: &PlutusData) -> String {
        hex::encode(data.to_cbor())
    }

    #[test]
    fn small_constructors_use_compact_tags() {
        assert_eq!(hex_of(&PlutusData::constr(0, vec![])), "d87980");
        assert_eq!(hex_of(&PlutusData::constr(1, vec![])), "d87a80");
        assert_eq!(
            hex_of(&PlutusData::constr(0, vec![PlutusData::integer(0)])),
            "d8799f00ff"
        );
        assert_eq!(hex_of(&PlutusData::constr(7, vec![])), "d9050080");
    }

    #[test]
    fn large_constructor_uses_general_form() {
        let data = PlutusData::constr(200, vec![PlutusData::integer(1)]);
        assert_eq!(hex_of(&data), "d8668218c89f01ff");
        let back = PlutusData::from_cbor(&data.to_cbor()).unwrap();
        assert_eq!(back, data);
        assert_eq!(back.as_constr(200, 1).unwrap()[0].as_u64().unwrap(), 1);
    }

    #[test]
    fn lists_are_indefinite_unless_empty() {
        assert_eq!(hex_of(&PlutusData::list(vec![])), "80");
        assert_eq!(
            hex_of(&PlutusData::list(vec![
                PlutusData::integer(1),
                PlutusData::integer(2)
            ])),
            "9f0102ff"
        );
    }

    #[test]
    fn long_bytes_are_chunked() {
        let data = PlutusData::bytes([0xab; 100]);
        let cbor = data.to_cbor();
        assert_eq!(cbor[0], 0x5f);
        assert_eq!(&cbor[1..3], &[0x58, 64]);
        assert_eq!(*cbor.last().unwrap(), 0xff);
        assert_eq!(PlutusData::from_cbor(&cbor).unwrap(), data);
    }

    #[test]
    fn big_integers_round_trip_through_bignum_tags() {
        for value in [
            i128::from(u64::MAX) + 1,
            -(i128::from(u64::MAX)) - 2,
            i128::MAX,
            i128::MIN + 1,
            -1,
            i128::from(u64::MAX),
        ] {
            let data = PlutusData::integer(value);
            let back = PlutusData::from_cbor(&data.to_cbor()).unwrap();
            assert_eq!(back.as_int().unwrap(), value);
        }
        assert_eq!(
            hex_of(&PlutusData::integer(i128::from(u64::MAX) + 1)),
            "c249010000000000000000"
        );
    }

    #[test]
    fn nested_value_round_trips() {
        let data = PlutusData::constr(
            0,
            vec![
                PlutusData::list(vec![PlutusData::constr(
                    1,
                    vec![PlutusData::bytes([1u8; 28]), PlutusData::integer(-5)],
                )]),
                PlutusData::map(vec![(PlutusData::integer(1), PlutusData::bytes(b"x"))]),
            ],
        );
        assert_eq!(PlutusData::from_cbor(&data.to_cbor()).unwrap(), data);
    }

    #[test]
    fn definite_arrays_are_accepted() {
        // d879 82 01 02 : Constr 0 with a definite field array
        let data = PlutusData::from_hex("d879820102").unwrap();
        let fields = data.as_constr(0, 2).unwrap();
        assert_eq!(fields[0].as_u64().unwrap(), 1);
        assert_eq!(fields[1].as_u64().unwrap(), 2);
        // The wire form is preserved, so the hash matches what was read.
        assert_eq!(hex_of(&data), "d879820102");
    }

    #[test]
    fn malformed_input_is_an_error_not_a_panic() {
        assert!(PlutusData::from_hex("").is_err());
        assert!(PlutusData::from_hex("d8").is_err());
        assert!(PlutusData::from_hex("9f01").is_err());
        assert!(PlutusData::from_hex("f5").is_err());
        assert!(PlutusData::from_hex("zz").is_err());
        assert_eq!(
            PlutusData::from_hex("0101").unwrap_err(),
            DecodeError::TrailingBytes(1)
        );
    }

    #[test]
    fn matchers_report_expected_shape() {
        let data = PlutusData::constr(1, vec![]);
        assert_eq!(
            data.as_constr(0, 0).unwrap_err(),
            DecodeError::ConstrTag {
                expected: 0,
                found: 1
            }
        );
        assert_eq!(
            data.as_constr(1, 2).unwrap_err(),
            DecodeError::FieldCount {
                expected: 2,
                found: 0
            }
        );
        assert_eq!(
            data.as_bytes().unwrap_err(),
            DecodeError::UnexpectedKind {
                expected: "bytes",
                found: "constructor"
            }
        );
        assert_eq!(
            PlutusData::integer(-1).as_u64().unwrap_err(),
            DecodeError::NegativeInteger(-1)
        );
        assert!(PlutusData::bytes([0u8; 27]).as_hash::<28>().is_err());
    }
}
