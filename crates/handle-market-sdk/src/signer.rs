use pallas_crypto::hash::{Hash, Hasher};
use pallas_crypto::key::ed25519::SecretKey;

use crate::error::{Error, Result};
use crate::tx::VKeyWitness;

/// A key able to witness transactions.
pub trait TxSigner {
    /// blake2b-224 of the verification key.
    fn key_hash(&self) -> Hash<28>;

    /// Witness over a transaction body hash.
    fn sign(&self, tx_hash: &Hash<32>) -> Result<VKeyWitness>;
}

/// Signer holding a raw ed25519 payment key.
pub struct KeySigner {
    secret: SecretKey,
}

impl KeySigner {
    pub fn from_bytes(secret: [u8; 32]) -> Self {
        Self {
            secret: SecretKey::from(secret),
        }
    }

    /// 32-byte secret as hex, optionally CBOR-wrapped (`5820...`) as in
    /// `cardano-cli` `.skey` files.
    pub fn from_hex(secret_hex: &str) -> Result<Self> {
        let raw = secret_hex.trim();
        let raw = raw.strip_prefix("5820").filter(|r| r.len() == 64).unwrap_or(raw);
        let bytes = hex::decode(raw).map_err(|e| Error::Signer(format!("invalid key hex: {e}")))?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::Signer("signing key must be 32 bytes".into()))?;
        Ok(Self::from_bytes(secret))
    }
}

impl TxSigner for KeySigner {
    fn key_hash(&self) -> Hash<28> {
        Hasher::<224>::hash(self.secret.public_key().as_ref())
    }

    fn sign(&self, tx_hash: &Hash<32>) -> Result<VKeyWitness> {
        let signature = self.secret.sign(tx_hash);
        Ok(VKeyWitness {
            vkey: self.secret.public_key().as_ref().to_vec(),
            signature: signature.as_ref().to_vec(),
        })
    }
}
