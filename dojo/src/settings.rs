//! CLI settings.
//!
//! Sources, lowest precedence first: built-in defaults, `dojo.toml` in the
//! working directory (or the file given with `--config`), then `DOJO_*`
//! environment variables. Command-line flags are applied on top by the caller.

use config::{Config, ConfigError, Environment, File};
use dojo_core::DEFAULT_CACHE_TTL_SECS;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_ROOT: &str = "./dojo-data";
pub const DEFAULT_LOG_LEVEL: &str = "warn";
const DEFAULT_CONFIG_NAME: &str = "dojo";
const ENV_PREFIX: &str = "DOJO";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Store root directory.
    pub root: PathBuf,
    /// Exercise metadata cache window in seconds; 0 disables the cache.
    pub cache_ttl_secs: i64,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Settings {
    /// Load settings from defaults, the config file and the environment.
    ///
    /// An explicit `config_path` must exist; the implicit `dojo.toml` is
    /// optional.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match config_path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings: Settings = Config::builder()
            .set_default("root", DEFAULT_ROOT)?
            .set_default("cache_ttl_secs", DEFAULT_CACHE_TTL_SECS)?
            .set_default("log_level", DEFAULT_LOG_LEVEL)?
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::Message("root cannot be empty".into()));
        }

        if self.cache_ttl_secs < 0 {
            return Err(ConfigError::Message(
                "cache_ttl_secs cannot be negative".into(),
            ));
        }

        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Message(format!(
                "log_level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}
