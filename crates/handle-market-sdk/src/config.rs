use std::time::Duration;

use pallas_crypto::hash::Hash;

use crate::tx::PolicyId;

/// Policy id of ADA Handle tokens.
pub const HANDLE_POLICY_ID: &str = "f0ff48bbb7bbe9d59a40f1ce90e9e9d0ff5002ec48f232b49ca0fb9a";

/// CIP-68 user token label (222) prefix of handle asset names.
pub const LABEL_222_PREFIX: [u8; 4] = [0x00, 0x0d, 0xe1, 0x40];

/// Tunables of the marketplace engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketConfig {
    pub handle_policy_id: PolicyId,
    /// Delay between deploy confirmation polls.
    pub poll_interval: Duration,
    /// Give up on deploy confirmation after this many polls; `None` polls forever.
    pub max_confirmation_polls: Option<u32>,
    /// Cap on fee/balance fixed-point iterations.
    pub max_balance_iterations: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            handle_policy_id: handle_policy_id(),
            poll_interval: Duration::from_secs(10),
            max_confirmation_polls: None,
            max_balance_iterations: 16,
        }
    }
}

fn handle_policy_id() -> PolicyId {
    HANDLE_POLICY_ID
        .parse::<Hash<28>>()
        .expect("valid policy id")
}

/// Asset name of a handle: label 222 prefix followed by the UTF-8 name.
pub fn handle_asset_name(handle: &str) -> Vec<u8> {
    let mut name = LABEL_222_PREFIX.to_vec();
    name.extend_from_slice(handle.as_bytes());
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_constant() {
        let config = MarketConfig::default();
        assert_eq!(config.handle_policy_id.to_string(), HANDLE_POLICY_ID);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
    }

    #[test]
    fn handle_names_carry_label_222() {
        assert_eq!(hex::encode(handle_asset_name("mkt")), "000de1406d6b74");
    }
}
