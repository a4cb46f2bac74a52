use pallas_addresses::ShelleyAddress;
use pallas_crypto::hash::Hash;

use crate::address::{address_from_plutus_data, address_to_plutus_data, shelley_from_bytes};
use crate::error::DecodeError;
use crate::network::Network;
use crate::plutus_data::{PlutusData, PlutusDataExt};

/// Wire layout of the payout addresses inside a listing datum.
///
/// Earlier validator revisions stored raw address bytes; current ones store
/// structured Plutus address data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatumLayout {
    Legacy,
    #[default]
    Current,
}

impl DatumLayout {
    /// Layout matching a deployment's `txBuildVersion`.
    pub fn from_build_version(version: u32) -> Self {
        if version == 0 {
            DatumLayout::Legacy
        } else {
            DatumLayout::Current
        }
    }
}

/// One recipient of sale proceeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    pub address: ShelleyAddress,
    pub amount_lovelace: u64,
}

impl Payout {
    pub fn new(address: ShelleyAddress, amount_lovelace: u64) -> Self {
        Self {
            address,
            amount_lovelace,
        }
    }

    fn to_plutus_data(&self, layout: DatumLayout) -> Result<PlutusData, DecodeError> {
        let address = match layout {
            DatumLayout::Current => address_to_plutus_data(&self.address)?,
            DatumLayout::Legacy => PlutusData::bytes(self.address.to_vec()),
        };
        Ok(PlutusData::constr(
            0,
            vec![address, PlutusData::integer(self.amount_lovelace)],
        ))
    }

    fn from_plutus_data(
        data: &PlutusData,
        network: Network,
        layout: DatumLayout,
    ) -> Result<Self, DecodeError> {
        let fields = data.as_constr(0, 2)?;
        let address = match layout {
            DatumLayout::Current => address_from_plutus_data(&fields[0], network)?,
            DatumLayout::Legacy => shelley_from_bytes(fields[0].as_bytes()?, network)?,
        };
        Ok(Self {
            address,
            amount_lovelace: fields[1].as_u64()?,
        })
    }
}

/// The inline datum attached to a listed handle.
///
/// `owner` is the verification-key hash allowed to withdraw or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingDatum {
    pub payouts: Vec<Payout>,
    pub owner: Hash<28>,
}

impl ListingDatum {
    /// `Constr0[List<Constr0[address, Int]>, ByteString owner]`
    pub fn to_plutus_data(&self, layout: DatumLayout) -> Result<PlutusData, DecodeError> {
        let payouts = self
            .payouts
            .iter()
            .map(|p| p.to_plutus_data(layout))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PlutusData::constr(
            0,
            vec![PlutusData::list(payouts), PlutusData::bytes(self.owner)],
        ))
    }

    pub fn from_plutus_data(
        data: &PlutusData,
        network: Network,
        layout: DatumLayout,
    ) -> Result<Self, DecodeError> {
        let fields = data.as_constr(0, 2)?;
        let payouts = fields[0]
            .as_list()?
            .iter()
            .map(|p| Payout::from_plutus_data(p, network, layout))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            payouts,
            owner: fields[1].as_hash::<28>()?,
        })
    }

    pub fn to_cbor(&self, layout: DatumLayout) -> Result<Vec<u8>, DecodeError> {
        Ok(self.to_plutus_data(layout)?.to_cbor())
    }

    pub fn from_cbor(
        bytes: &[u8],
        network: Network,
        layout: DatumLayout,
    ) -> Result<Self, DecodeError> {
        Self::from_plutus_data(&PlutusData::from_cbor(bytes)?, network, layout)
    }

    /// Owner key hash as lowercase hex.
    pub fn owner_hex(&self) -> String {
        hex::encode(self.owner)
    }
}
