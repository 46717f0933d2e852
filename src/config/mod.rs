mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File};

use crate::config::settings::PartialSettings;

pub use settings::{BrokerSettings, LogSettings, ServerSettings, Settings};

/// Prefix for environment overrides, e.g. `TOPIC_MANAGER_SERVER__PORT=7000`.
pub const ENV_PREFIX: &str = "TOPIC_MANAGER";

/// Loads the configuration from `config/default` (if present) and the environment.
pub fn load_config() -> Result<Settings, ConfigError> {
    load(File::with_name("config/default").required(false))
}

/// Loads the configuration from an explicit file and the environment.
///
/// Unlike `load_config`, a missing file is an error.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    load(File::from(path.as_ref()).required(true))
}

fn load<T>(file: T) -> Result<Settings, ConfigError>
where
    T: config::Source + Send + Sync + 'static,
{
    let builder = Config::builder().add_source(file).add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    // Try to deserialize what is available, then merge with defaults
    let partial: PartialSettings = config.try_deserialize()?;
    Ok(partial.merge_with_defaults())
}
