use config::{Map, Value, ValueKind};
use serde::Deserialize;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::environment::Environment;

/// Directory containing configuration files relative to the working directory.
pub const CONFIGURATION_DIR: &str = "configuration";

/// Base configuration file loaded for all environments.
const BASE_CONFIG_FILE: &str = "base.yaml";

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "APP";

/// Separator between environment variable prefix and key segments.
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
///
/// Example: `APP_SETTINGS__SDK__BATCH__SIZE` sets the `sdk.batch.size` setting.
const ENV_SEPARATOR: &str = "__";

/// Separator joining the segments of a flattened setting key.
pub const SETTING_KEY_SEPARATOR: &str = ".";

/// Separator joining the elements of a list setting.
pub const LIST_SEPARATOR: &str = ",";

/// Errors raised while loading connector settings.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("failed to detect the environment: {0}")]
    Environment(#[source] io::Error),

    #[error("failed to load the configuration: {0}")]
    Config(#[from] config::ConfigError),
}

/// Settings of a connector, with its raw configuration flattened into dotted keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorSettings {
    /// Name of the connector.
    pub name: String,
    /// Raw configuration handed to the connector, every value as a string.
    pub settings: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawConnectorSettings {
    name: String,
    #[serde(default)]
    settings: Map<String, Value>,
}

/// Loads the connector settings of the current working directory.
///
/// Loads configuration in this order:
/// 1. Base configuration from `configuration/base.yaml`
/// 2. Environment-specific file from `configuration/{environment}.yaml`, if present
/// 3. Environment variable overrides prefixed with `APP`
///
/// The environment is read from `APP_ENVIRONMENT`. Nested keys use double underscores in
/// environment variables: `APP_SETTINGS__SDK__RATE__BURST=4` sets the `sdk.rate.burst` setting.
pub fn load_connector_settings() -> Result<ConnectorSettings, LoadConfigError> {
    let base_path = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
    let environment = Environment::load().map_err(LoadConfigError::Environment)?;

    load_connector_settings_from(&base_path.join(CONFIGURATION_DIR), environment)
}

/// Loads the connector settings from the configuration files in `directory`.
pub fn load_connector_settings_from(
    directory: &Path,
    environment: Environment,
) -> Result<ConnectorSettings, LoadConfigError> {
    load_with_env_source(directory, environment, environment_source())
}

fn environment_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR)
}

fn load_with_env_source(
    directory: &Path,
    environment: Environment,
    env_source: config::Environment,
) -> Result<ConnectorSettings, LoadConfigError> {
    let config = config::Config::builder()
        .add_source(config::File::from(directory.join(BASE_CONFIG_FILE)))
        .add_source(
            config::File::from(directory.join(environment.config_file_name())).required(false),
        )
        .add_source(env_source)
        .build()?;

    let raw: RawConnectorSettings = config.try_deserialize()?;

    let mut settings = HashMap::new();
    flatten_settings("", raw.settings, &mut settings)?;

    Ok(ConnectorSettings {
        name: raw.name,
        settings,
    })
}

/// Flattens a table of settings into `output`, joining nested keys with
/// [`SETTING_KEY_SEPARATOR`] and list elements with [`LIST_SEPARATOR`].
fn flatten_settings(
    prefix: &str,
    table: Map<String, Value>,
    output: &mut HashMap<String, String>,
) -> Result<(), LoadConfigError> {
    for (key, value) in table {
        let key = if prefix.is_empty() {
            key
        } else {
            format!("{prefix}{SETTING_KEY_SEPARATOR}{key}")
        };

        match value.kind {
            ValueKind::Table(table) => flatten_settings(&key, table, output)?,
            ValueKind::Array(values) => {
                let values = values
                    .into_iter()
                    .map(Value::into_string)
                    .collect::<Result<Vec<_>, _>>()?;
                output.insert(key, values.join(LIST_SEPARATOR));
            }
            ValueKind::Nil => {
                output.insert(key, String::new());
            }
            kind => {
                output.insert(key, Value::new(None, kind).into_string()?);
            }
        }
    }

    Ok(())
}
