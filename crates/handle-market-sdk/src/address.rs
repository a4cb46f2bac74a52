use pallas_addresses::{Address, ShelleyAddress, ShelleyDelegationPart, ShelleyPaymentPart};
use pallas_crypto::hash::Hash;

use crate::error::DecodeError;
use crate::network::Network;
use crate::plutus_data::{PlutusData, PlutusDataExt};

/// A payment or staking credential: a key hash or a script hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Credential {
    Key(Hash<28>),
    Script(Hash<28>),
}

impl Credential {
    pub fn hash(&self) -> &Hash<28> {
        match self {
            Credential::Key(h) | Credential::Script(h) => h,
        }
    }

    pub fn is_key(&self) -> bool {
        matches!(self, Credential::Key(_))
    }

    /// `Constr0[bytes]` for keys, `Constr1[bytes]` for scripts.
    pub fn to_plutus_data(&self) -> PlutusData {
        let tag = match self {
            Credential::Key(_) => 0,
            Credential::Script(_) => 1,
        };
        PlutusData::constr(tag, vec![PlutusData::bytes(self.hash())])
    }

    pub fn from_plutus_data(data: &PlutusData) -> Result<Self, DecodeError> {
        let (tag, fields) = data.as_any_constr()?;
        let hash = match fields {
            [hash] => hash.as_hash::<28>()?,
            _ => {
                return Err(DecodeError::FieldCount {
                    expected: 1,
                    found: fields.len(),
                });
            }
        };
        match tag {
            0 => Ok(Credential::Key(hash)),
            1 => Ok(Credential::Script(hash)),
            found => Err(DecodeError::ConstrTag { expected: 0, found }),
        }
    }
}

/// Payment credential of a Shelley address.
pub fn payment_credential(address: &ShelleyAddress) -> Credential {
    match address.payment() {
        ShelleyPaymentPart::Key(h) => Credential::Key(*h),
        ShelleyPaymentPart::Script(h) => Credential::Script(*h),
    }
}

/// Key hash of an address whose payment part is a verification key.
pub fn payment_key_hash(address: &ShelleyAddress) -> Option<Hash<28>> {
    match payment_credential(address) {
        Credential::Key(h) => Some(h),
        Credential::Script(_) => None,
    }
}

fn stake_credential(address: &ShelleyAddress) -> Result<Option<Credential>, DecodeError> {
    match address.delegation() {
        ShelleyDelegationPart::Key(h) => Ok(Some(Credential::Key(*h))),
        ShelleyDelegationPart::Script(h) => Ok(Some(Credential::Script(*h))),
        ShelleyDelegationPart::Pointer(_) => Err(DecodeError::UnsupportedStakePointer),
        ShelleyDelegationPart::Null => Ok(None),
    }
}

/// Plutus `Address` data: `Constr0[credential, Maybe StakingCredential]`.
pub fn address_to_plutus_data(address: &ShelleyAddress) -> Result<PlutusData, DecodeError> {
    let staking = match stake_credential(address)? {
        // Just (StakingHash credential)
        Some(cred) => PlutusData::constr(
            0,
            vec![PlutusData::constr(0, vec![cred.to_plutus_data()])],
        ),
        None => PlutusData::constr(1, vec![]),
    };
    Ok(PlutusData::constr(
        0,
        vec![payment_credential(address).to_plutus_data(), staking],
    ))
}

pub fn address_from_plutus_data(
    data: &PlutusData,
    network: Network,
) -> Result<ShelleyAddress, DecodeError> {
    let fields = data.as_constr(0, 2)?;
    let payment = match Credential::from_plutus_data(&fields[0])? {
        Credential::Key(h) => ShelleyPaymentPart::Key(h),
        Credential::Script(h) => ShelleyPaymentPart::Script(h),
    };

    let delegation = match fields[1].as_any_constr()? {
        (1, []) => ShelleyDelegationPart::Null,
        (0, [staking]) => {
            let (tag, inner) = staking.as_any_constr()?;
            match (tag, inner) {
                (0, [cred]) => match Credential::from_plutus_data(cred)? {
                    Credential::Key(h) => ShelleyDelegationPart::Key(h),
                    Credential::Script(h) => ShelleyDelegationPart::Script(h),
                },
                (1, _) => return Err(DecodeError::UnsupportedStakePointer),
                (found, _) => return Err(DecodeError::ConstrTag { expected: 0, found }),
            }
        }
        (found, fields) if found <= 1 => {
            return Err(DecodeError::FieldCount {
                expected: 1 - found as usize,
                found: fields.len(),
            });
        }
        (found, _) => return Err(DecodeError::ConstrTag { expected: 0, found }),
    };

    Ok(ShelleyAddress::new(
        network.address_network(),
        payment,
        delegation,
    ))
}

/// Decode raw address bytes, requiring a Shelley address on `network`.
pub fn shelley_from_bytes(bytes: &[u8], network: Network) -> Result<ShelleyAddress, DecodeError> {
    let address = Address::from_bytes(bytes).map_err(|e| DecodeError::Address(e.to_string()))?;
    into_shelley(address, network)
}

/// Parse a bech32 address, requiring a Shelley address on `network`.
pub fn parse_address(bech32: &str, network: Network) -> Result<ShelleyAddress, DecodeError> {
    let address =
        Address::from_bech32(bech32.trim()).map_err(|e| DecodeError::Address(e.to_string()))?;
    into_shelley(address, network)
}

fn into_shelley(address: Address, network: Network) -> Result<ShelleyAddress, DecodeError> {
    match address {
        Address::Shelley(shelley) => {
            if shelley.network().value() != network.network_id() {
                return Err(DecodeError::Address(format!(
                    "address belongs to network id {}, expected {network}",
                    shelley.network().value()
                )));
            }
            Ok(shelley)
        }
        _ => Err(DecodeError::Address(
            "expected a Shelley payment address".into(),
        )),
    }
}

/// Enterprise address locked by a script hash.
pub fn script_address(network: Network, script_hash: Hash<28>) -> ShelleyAddress {
    ShelleyAddress::new(
        network.address_network(),
        ShelleyPaymentPart::Script(script_hash),
        ShelleyDelegationPart::Null,
    )
}

pub fn to_bech32(address: &ShelleyAddress) -> String {
    Address::Shelley(address.clone())
        .to_bech32()
        .unwrap_or_else(|_| hex::encode(address.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_address(network: Network, stake: Option<Hash<28>>) -> ShelleyAddress {
        ShelleyAddress::new(
            network.address_network(),
            ShelleyPaymentPart::Key(Hash::new([7u8; 28])),
            match stake {
                Some(h) => ShelleyDelegationPart::Key(h),
                None => ShelleyDelegationPart::Null,
            },
        )
    }

    #[test]
    fn base_address_round_trips_through_plutus_data() {
        let addr = key_address(Network::Preprod, Some(Hash::new([9u8; 28])));
        let data = address_to_plutus_data(&addr).unwrap();
        let back = address_from_plutus_data(&data, Network::Preprod).unwrap();
        assert_eq!(back.to_vec(), addr.to_vec());
    }

    #[test]
    fn enterprise_address_has_no_staking_part() {
        let addr = key_address(Network::Mainnet, None);
        let data = address_to_plutus_data(&addr).unwrap();
        let fields = data.as_constr(0, 2).unwrap();
        assert_eq!(fields[1], PlutusData::constr(1, vec![]));
        assert_eq!(
            address_from_plutus_data(&data, Network::Mainnet)
                .unwrap()
                .to_vec(),
            addr.to_vec()
        );
    }

    #[test]
    fn credentials_are_discriminated() {
        let key = Credential::Key(Hash::new([1u8; 28]));
        let script = Credential::Script(Hash::new([1u8; 28]));
        assert_ne!(key.to_plutus_data(), script.to_plutus_data());
        assert_eq!(
            Credential::from_plutus_data(&script.to_plutus_data()).unwrap(),
            script
        );
        assert!(Credential::from_plutus_data(&PlutusData::constr(2, vec![])).is_err());
    }

    #[test]
    fn script_address_uses_script_credential() {
        let addr = script_address(Network::Preview, Hash::new([3u8; 28]));
        assert_eq!(
            payment_credential(&addr),
            Credential::Script(Hash::new([3u8; 28]))
        );
        assert!(payment_key_hash(&addr).is_none());
        let bech = to_bech32(&addr);
        assert!(bech.starts_with("addr_test1"));
        assert_eq!(
            parse_address(&bech, Network::Preview).unwrap().to_vec(),
            addr.to_vec()
        );
    }

    #[test]
    fn wrong_network_is_rejected() {
        let addr = key_address(Network::Mainnet, None);
        assert!(shelley_from_bytes(&addr.to_vec(), Network::Preprod).is_err());
        assert!(shelley_from_bytes(&addr.to_vec(), Network::Mainnet).is_ok());
    }
}
