use pallas_addresses::ShelleyAddress;
use pallas_crypto::hash::Hash;

use crate::address::{address_to_plutus_data, shelley_from_bytes};
use crate::error::DecodeError;
use crate::network::Network;
use crate::plutus_data::{PlutusData, PlutusDataExt};
use crate::tx::DatumOption;

/// Compile-time parameters of the marketplace validator.
///
/// The validator is applied to these as constructor arguments; the same
/// values are also published as the inline datum of the reference-script
/// output so clients can recover them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketplaceParameters {
    /// Receives the marketplace fee on plain buys.
    pub marketplace_address: ShelleyAddress,
    /// Key hashes allowed to co-sign fee-free buys.
    pub authorizers: Vec<Hash<28>>,
}

impl MarketplaceParameters {
    /// Authorizers are kept in the given order, duplicates included, so the
    /// applied program and datum match what the caller configured.
    pub fn new(marketplace_address: ShelleyAddress, authorizers: Vec<Hash<28>>) -> Self {
        Self {
            marketplace_address,
            authorizers,
        }
    }

    fn authorizers_data(&self) -> PlutusData {
        PlutusData::list(self.authorizers.iter().map(PlutusData::bytes).collect())
    }

    /// Arguments the validator program is applied to:
    /// `[Address data, List<ByteString>]`.
    pub fn to_program_args(&self) -> Result<Vec<PlutusData>, DecodeError> {
        Ok(vec![
            address_to_plutus_data(&self.marketplace_address)?,
            self.authorizers_data(),
        ])
    }

    /// Companion datum: `List[ByteString address bytes, List<ByteString>]`.
    pub fn to_datum(&self) -> PlutusData {
        PlutusData::list(vec![
            PlutusData::bytes(self.marketplace_address.to_vec()),
            self.authorizers_data(),
        ])
    }

    pub fn from_datum(data: &PlutusData, network: Network) -> Result<Self, DecodeError> {
        let items = data.as_tuple(2)?;
        let marketplace_address = shelley_from_bytes(items[0].as_bytes()?, network)?;
        let authorizers = items[1]
            .as_list()?
            .iter()
            .map(|a| a.as_hash::<28>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(marketplace_address, authorizers))
    }

    /// Decode from either a datum-option encoding (`[1, #6.24(bytes)]`) or
    /// bare Plutus data.
    pub fn from_datum_cbor(bytes: &[u8], network: Network) -> Result<Self, DecodeError> {
        // Tag 24 is not valid Plutus data, so a datum option never parses as bare data.
        let data = match PlutusData::from_cbor(bytes) {
            Ok(data) => data,
            Err(_) => datum_option_data(bytes)?,
        };
        Self::from_datum(&data, network)
    }

    pub fn from_datum_hex(hex_str: &str, network: Network) -> Result<Self, DecodeError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|e| DecodeError::Hex(e.to_string()))?;
        Self::from_datum_cbor(&bytes, network)
    }

    /// Case-insensitive membership test on a hex key hash.
    pub fn is_authorizer(&self, key_hash_hex: &str) -> bool {
        let wanted = key_hash_hex.trim().to_ascii_lowercase();
        self.authorizers.iter().any(|a| hex::encode(a) == wanted)
    }
}

fn datum_option_data(bytes: &[u8]) -> Result<PlutusData, DecodeError> {
    match DatumOption::from_cbor(bytes)? {
        DatumOption::Inline(data) => Ok(data),
        DatumOption::Hash(_) => Err(DecodeError::MissingDatum),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pallas_addresses::{ShelleyDelegationPart, ShelleyPaymentPart};

    fn test_params() -> MarketplaceParameters {
        MarketplaceParameters::new(
            ShelleyAddress::new(
                Network::Preprod.address_network(),
                ShelleyPaymentPart::Key(Hash::new([0x11; 28])),
                ShelleyDelegationPart::Null,
            ),
            vec![Hash::new([0xab; 28]), Hash::new([0xcd; 28])],
        )
    }

    #[test]
    fn datum_round_trips_bare_and_wrapped() {
        let params = test_params();
        let bare = params.to_datum().to_cbor();
        assert_eq!(
            MarketplaceParameters::from_datum_cbor(&bare, Network::Preprod).unwrap(),
            params
        );

        let wrapped = DatumOption::Inline(params.to_datum()).to_cbor();
        assert_eq!(
            MarketplaceParameters::from_datum_cbor(&wrapped, Network::Preprod).unwrap(),
            params
        );
    }

    #[test]
    fn program_args_carry_structured_address() {
        let args = test_params().to_program_args().unwrap();
        assert_eq!(args.len(), 2);
        assert!(args[0].as_constr(0, 2).is_ok());
        assert_eq!(args[1].as_list().unwrap().len(), 2);
    }

    #[test]
    fn authorizer_check_ignores_case() {
        let params = test_params();
        assert!(params.is_authorizer(&"AB".repeat(28)));
        assert!(params.is_authorizer(&"cd".repeat(28)));
        assert!(!params.is_authorizer(&"ef".repeat(28)));
    }

    #[test]
    fn duplicate_authorizers_survive_the_datum() {
        let authorizers = vec![
            Hash::new([2; 28]),
            Hash::new([1; 28]),
            Hash::new([2; 28]),
        ];
        let params =
            MarketplaceParameters::new(test_params().marketplace_address, authorizers.clone());
        assert_eq!(params.authorizers, authorizers);

        let args = params.to_program_args().unwrap();
        assert_eq!(args[1].as_list().unwrap().len(), 3);

        let decoded =
            MarketplaceParameters::from_datum_cbor(&params.to_datum().to_cbor(), Network::Preprod)
                .unwrap();
        assert_eq!(decoded.authorizers, authorizers);
        assert_eq!(decoded, params);
    }

    #[test]
    fn malformed_parameters_are_rejected() {
        let bad = PlutusData::list(vec![PlutusData::bytes([0u8; 3])]);
        assert!(MarketplaceParameters::from_datum(&bad, Network::Preprod).is_err());
        assert!(MarketplaceParameters::from_datum_hex("00", Network::Preprod).is_err());
    }
}
