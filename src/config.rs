use std::path::PathBuf;
use std::time::Duration;

use handle_market_sdk::pallas_addresses::ShelleyAddress;
use handle_market_sdk::pallas_crypto::hash::Hash;
use handle_market_sdk::{
    HANDLE_POLICY_ID, MarketConfig, MarketplaceParameters, Network, PolicyId, parse_address,
};

pub const BLOCKFROST_API_KEY: &str = "BLOCKFROST_API_KEY";
pub const NETWORK: &str = "NETWORK";
pub const HANDLE_POLICY: &str = "HANDLE_POLICY_ID";
pub const DEPLOYMENT_DIR: &str = "DEPLOYMENT_DIR";
pub const MARKETPLACE_ADDRESS: &str = "MARKETPLACE_ADDRESS";
pub const MARKETPLACE_AUTHORIZERS: &str = "MARKETPLACE_AUTHORIZERS";
pub const DEPLOY_POLL_INTERVAL_SECS: &str = "DEPLOY_POLL_INTERVAL_SECS";
pub const DEPLOY_MAX_POLLS: &str = "DEPLOY_MAX_POLLS";

const DEFAULT_DEPLOYMENT_DIR: &str = "deployments";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_MAX_POLLS: u32 = 60;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Service configuration read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub blockfrost_api_key: String,
    pub network: Network,
    pub handle_policy_id: PolicyId,
    /// Directory holding `<network>-deployed.json`.
    pub deployment_dir: PathBuf,
    /// Fee recipient baked into newly built validators.
    pub marketplace_address: Option<ShelleyAddress>,
    pub marketplace_authorizers: Vec<Hash<28>>,
    /// Delay between deploy confirmation lookups.
    pub poll_interval: Duration,
    /// A deploy fails once its output is still missing after this many lookups.
    pub max_confirmation_polls: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let blockfrost_api_key =
            var(BLOCKFROST_API_KEY).ok_or(ConfigError::Missing(BLOCKFROST_API_KEY))?;

        let network = match var(NETWORK) {
            Some(name) => name.parse::<Network>(),
            None => Network::from_api_key(&blockfrost_api_key),
        }
        .map_err(|reason| ConfigError::Invalid {
            name: NETWORK,
            reason,
        })?;

        let handle_policy_id = var(HANDLE_POLICY)
            .as_deref()
            .unwrap_or(HANDLE_POLICY_ID)
            .parse::<Hash<28>>()
            .map_err(|_| ConfigError::Invalid {
                name: HANDLE_POLICY,
                reason: "expected 28-byte hex policy id".into(),
            })?;

        let marketplace_address = var(MARKETPLACE_ADDRESS)
            .map(|bech32| {
                parse_address(&bech32, network).map_err(|e| ConfigError::Invalid {
                    name: MARKETPLACE_ADDRESS,
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let marketplace_authorizers = var(MARKETPLACE_AUTHORIZERS)
            .map(|list| parse_authorizers(&list))
            .transpose()?
            .unwrap_or_default();

        let poll_interval = var(DEPLOY_POLL_INTERVAL_SECS)
            .map(|secs| parse_number::<u64>(DEPLOY_POLL_INTERVAL_SECS, &secs))
            .transpose()?
            .map_or(DEFAULT_POLL_INTERVAL, Duration::from_secs);

        let max_confirmation_polls = match var(DEPLOY_MAX_POLLS) {
            Some(polls) => match parse_number::<u32>(DEPLOY_MAX_POLLS, &polls)? {
                0 => {
                    return Err(ConfigError::Invalid {
                        name: DEPLOY_MAX_POLLS,
                        reason: "must be at least 1".into(),
                    });
                }
                n => n,
            },
            None => DEFAULT_MAX_POLLS,
        };

        Ok(Self {
            blockfrost_api_key,
            network,
            handle_policy_id,
            deployment_dir: var(DEPLOYMENT_DIR)
                .unwrap_or_else(|| DEFAULT_DEPLOYMENT_DIR.to_string())
                .into(),
            marketplace_address,
            marketplace_authorizers,
            poll_interval,
            max_confirmation_polls,
        })
    }

    pub fn market_config(&self) -> MarketConfig {
        MarketConfig {
            handle_policy_id: self.handle_policy_id,
            poll_interval: self.poll_interval,
            max_confirmation_polls: Some(self.max_confirmation_polls),
            ..MarketConfig::default()
        }
    }

    /// Parameters for a new validator; needs `MARKETPLACE_ADDRESS`.
    pub fn marketplace_parameters(&self) -> Result<MarketplaceParameters, ConfigError> {
        let address = self
            .marketplace_address
            .clone()
            .ok_or(ConfigError::Missing(MARKETPLACE_ADDRESS))?;
        Ok(MarketplaceParameters::new(
            address,
            self.marketplace_authorizers.clone(),
        ))
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse::<T>().map_err(|_| ConfigError::Invalid {
        name,
        reason: format!("{value:?} is not a valid number"),
    })
}

fn parse_authorizers(list: &str) -> Result<Vec<Hash<28>>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Hash<28>>().map_err(|_| ConfigError::Invalid {
                name: MARKETPLACE_AUTHORIZERS,
                reason: format!("{s:?} is not a 28-byte key hash"),
            })
        })
        .collect()
}
