//! Timelock/multisig scripts in the ledger's native script language.

use pallas_crypto::hash::{Hash, Hasher};
pub use pallas_primitives::alonzo::NativeScript;

use crate::plutus_data::to_vec;

const NATIVE_LANGUAGE_TAG: u8 = 0;

/// blake2b-224 over the `0x00` language tag and the script CBOR.
pub fn native_script_hash(script: &NativeScript) -> Hash<28> {
    let mut buf = vec![NATIVE_LANGUAGE_TAG];
    buf.extend_from_slice(&to_vec(script));
    Hasher::<224>::hash(&buf)
}
