use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Sdk(#[from] handle_market_sdk::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid request: {0}")]
    Request(String),

    #[error("task failed: {0}")]
    Task(String),
}

impl AppError {
    pub fn request(msg: impl Into<String>) -> Self {
        AppError::Request(msg.into())
    }
}
