//! Errors raised while bringing the hub up.
//!
//! Everything that can go wrong after startup is scoped to a single
//! connection and never surfaces as a `HubError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("invalid setting: {0}")]
    InvalidSetting(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
