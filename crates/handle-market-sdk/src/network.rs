use serde::{Deserialize, Serialize};

/// Cardano networks the marketplace is deployed on.
///
/// Passed explicitly into every address decode and transaction build; there
/// is no process-wide network flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Preprod,
    Preview,
}

/// Anchor for converting POSIX time into slot numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotConfig {
    pub zero_time_ms: u64,
    pub zero_slot: u64,
    pub slot_length_ms: u64,
}

impl SlotConfig {
    /// Slot containing `posix_ms`; times before the anchor map to the anchor slot.
    pub fn slot_at(&self, posix_ms: u64) -> u64 {
        self.zero_slot + posix_ms.saturating_sub(self.zero_time_ms) / self.slot_length_ms
    }

    /// POSIX time (ms) at the start of `slot`.
    pub fn posix_at(&self, slot: u64) -> u64 {
        self.zero_time_ms + slot.saturating_sub(self.zero_slot) * self.slot_length_ms
    }
}

impl Network {
    pub fn is_mainnet(self) -> bool {
        matches!(self, Network::Mainnet)
    }

    /// Network id carried in the Shelley address header.
    pub fn network_id(self) -> u8 {
        match self {
            Network::Mainnet => 1,
            Network::Preprod | Network::Preview => 0,
        }
    }

    pub fn address_network(self) -> pallas_addresses::Network {
        match self {
            Network::Mainnet => pallas_addresses::Network::Mainnet,
            Network::Preprod | Network::Preview => pallas_addresses::Network::Testnet,
        }
    }

    pub fn blockfrost_url(self) -> &'static str {
        match self {
            Network::Mainnet => "https://cardano-mainnet.blockfrost.io/api/v0",
            Network::Preprod => "https://cardano-preprod.blockfrost.io/api/v0",
            Network::Preview => "https://cardano-preview.blockfrost.io/api/v0",
        }
    }

    pub fn slot_config(self) -> SlotConfig {
        match self {
            Network::Mainnet => SlotConfig {
                zero_time_ms: 1_596_059_091_000,
                zero_slot: 4_492_800,
                slot_length_ms: 1000,
            },
            Network::Preprod => SlotConfig {
                zero_time_ms: 1_655_769_600_000,
                zero_slot: 86_400,
                slot_length_ms: 1000,
            },
            Network::Preview => SlotConfig {
                zero_time_ms: 1_666_656_000_000,
                zero_slot: 0,
                slot_length_ms: 1000,
            },
        }
    }

    /// Blockfrost project ids start with the network name.
    pub fn from_api_key(api_key: &str) -> std::result::Result<Self, String> {
        let prefix = api_key.get(..7).unwrap_or(api_key);
        prefix.parse()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Preprod => "preprod",
            Network::Preview => "preview",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "cardano" => Ok(Network::Mainnet),
            "preprod" | "cardano-preprod" => Ok(Network::Preprod),
            "preview" | "cardano-preview" => Ok(Network::Preview),
            _ => Err(format!("invalid network: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_from_blockfrost_key() {
        assert_eq!(
            Network::from_api_key("preprodAbCdEf0123").unwrap(),
            Network::Preprod
        );
        assert_eq!(
            Network::from_api_key("mainnetXYZ").unwrap(),
            Network::Mainnet
        );
        assert!(Network::from_api_key("testnet123").is_err());
        assert!(Network::from_api_key("pre").is_err());
    }

    #[test]
    fn slot_conversion_uses_network_anchor() {
        let cfg = Network::Preview.slot_config();
        assert_eq!(cfg.slot_at(1_666_656_000_000), 0);
        assert_eq!(cfg.slot_at(1_666_656_010_999), 10);

        let cfg = Network::Preprod.slot_config();
        assert_eq!(cfg.slot_at(1_655_769_600_000 + 5_000), 86_405);
        // Before the anchor clamps rather than underflowing.
        assert_eq!(cfg.slot_at(0), 86_400);
        assert_eq!(cfg.posix_at(86_405), 1_655_769_600_000 + 5_000);
        assert_eq!(cfg.slot_at(cfg.posix_at(90_000)), 90_000);
    }

    #[test]
    fn address_network_ids() {
        assert_eq!(Network::Mainnet.network_id(), 1);
        assert_eq!(Network::Preview.network_id(), 0);
        assert!(Network::Mainnet.is_mainnet());
        assert_eq!("PREPROD".parse::<Network>().unwrap(), Network::Preprod);
    }
}
