//! `MarketplaceApp` shares one SDK between command handlers and runs every
//! (blocking) SDK call on `tokio::task::spawn_blocking`, so handlers stay
//! async. SDK operations take `&self`, so calls run concurrently: a deploy
//! waiting for confirmation does not hold up listings or buys.

use std::sync::Arc;

use handle_market_sdk::{
    BlockfrostBackend, ChainBackend, Error, MarketplaceSdk, Network, ScriptVm, UplcVm,
};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::store::FileDeploymentStore;

pub type AppSdk<C, V> = MarketplaceSdk<C, V, FileDeploymentStore>;

/// Blockfrost for chain data, the local UPLC machine for scripts.
pub type LiveApp = MarketplaceApp<BlockfrostBackend, UplcVm>;

pub struct MarketplaceApp<C, V> {
    sdk: Arc<AppSdk<C, V>>,
    config: AppConfig,
}

impl<C, V> Clone for MarketplaceApp<C, V> {
    fn clone(&self) -> Self {
        Self {
            sdk: self.sdk.clone(),
            config: self.config.clone(),
        }
    }
}

impl<V> MarketplaceApp<BlockfrostBackend, V>
where
    V: ScriptVm + Send + Sync + 'static,
{
    /// Wire the SDK to Blockfrost using the configured project id.
    pub fn connect(config: AppConfig, vm: V) -> Result<Self, AppError> {
        let chain = BlockfrostBackend::new(config.network, &config.blockfrost_api_key)?;
        log::info!("connected to Blockfrost for {}", config.network);
        Ok(Self::new(config, chain, vm))
    }
}

impl LiveApp {
    pub fn from_config(config: AppConfig) -> Result<Self, AppError> {
        Self::connect(config, UplcVm::new())
    }
}

impl<C, V> MarketplaceApp<C, V>
where
    C: ChainBackend + Send + Sync + 'static,
    V: ScriptVm + Send + Sync + 'static,
{
    pub fn new(config: AppConfig, chain: C, vm: V) -> Self {
        let store = FileDeploymentStore::new(&config.deployment_dir);
        let sdk = MarketplaceSdk::new(config.network, config.market_config(), chain, vm, store);
        Self {
            sdk: Arc::new(sdk),
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn network(&self) -> Network {
        self.config.network
    }

    /// Run a closure against the SDK on a blocking thread.
    pub async fn with_sdk<F, R>(&self, f: F) -> Result<R, AppError>
    where
        F: FnOnce(&AppSdk<C, V>) -> Result<R, Error> + Send + 'static,
        R: Send + 'static,
    {
        let sdk = self.sdk.clone();
        tokio::task::spawn_blocking(move || f(&sdk).map_err(AppError::Sdk))
            .await
            .map_err(|e| AppError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handle_market_sdk::MarketConfig;
    use std::time::Duration;

    #[test]
    fn live_app_wires_blockfrost_and_uplc() {
        let config = AppConfig {
            blockfrost_api_key: "preprodTest".into(),
            network: Network::Preprod,
            handle_policy_id: MarketConfig::default().handle_policy_id,
            deployment_dir: std::env::temp_dir(),
            marketplace_address: None,
            marketplace_authorizers: vec![],
            poll_interval: Duration::ZERO,
            max_confirmation_polls: 1,
        };
        let app = LiveApp::from_config(config).unwrap();
        assert_eq!(app.network(), Network::Preprod);
    }
}
