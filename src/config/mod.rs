//! The `config` module loads the hub's settings.
//!
//! Sources, lowest priority first: built-in defaults, an optional
//! configuration file (`config/default.toml` unless another path is given),
//! then `HUB_`-prefixed environment variables such as
//! `HUB_SERVER__PORT=9000` or `HUB_BROKER__QUEUE_CAPACITY=16`.

mod settings;

use config::{Config, Environment, File};

use crate::utils::HubError;
use settings::PartialSettings;

pub use settings::{BrokerSettings, LogSettings, ServerSettings, Settings};

const DEFAULT_CONFIG_FILE: &str = "config/default";

/// Loads the configuration from the default file and environment variables.
pub fn load_config() -> Result<Settings, HubError> {
    load_config_from(DEFAULT_CONFIG_FILE)
}

/// Loads the configuration from `path` (extension optional) and environment
/// variables, merged with default values.
pub fn load_config_from(path: &str) -> Result<Settings, HubError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix("HUB")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    let settings = Settings::merge(partial);
    validate(&settings)?;

    Ok(settings)
}

/// Rejects settings the hub cannot run with.
pub fn validate(settings: &Settings) -> Result<(), HubError> {
    if settings.broker.queue_capacity == 0 {
        return Err(HubError::InvalidSetting(
            "broker.queue_capacity must be at least 1".to_string(),
        ));
    }
    if !settings.server.path.starts_with('/') {
        return Err(HubError::InvalidSetting(format!(
            "server.path must start with '/', got {:?}",
            settings.server.path
        )));
    }
    Ok(())
}
