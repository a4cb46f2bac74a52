pub mod app;
pub mod commands;
pub mod config;
pub mod error;
pub mod store;

pub use app::{AppSdk, LiveApp, MarketplaceApp};
pub use config::{AppConfig, ConfigError};
pub use error::AppError;
pub use store::FileDeploymentStore;
