//! Application configuration.
//!
//! Aggregates the message director, general and per-role settings into a
//! single Config struct that can be loaded from YAML files or environment
//! variables.

mod roles;

pub use roles::{DatabaseConfig, IdRange, RoleConfig, StateServerConfig};

use serde::Deserialize;

use crate::channel::{DEFAULT_AUTHORITY_SCOPE_PREFIX, INVALID_CHANNEL};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "astrolabe.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "ASTROLABE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "ASTROLABE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "ASTROLABE_LOG";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Role '{0}' needs a non-zero control channel")]
    InvalidControlChannel(&'static str),

    #[error("Invalid id range {min}..={max}")]
    InvalidIdRange { min: u32, max: u32 },

    #[error("Authority scope prefix must be non-zero")]
    ScopePrefixZero,

    #[error("Authority scope prefix {prefix} lies inside id range {min}..={max}")]
    ScopePrefixCollides { prefix: u32, min: u32, max: u32 },
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub messagedirector: MessageDirectorConfig,
    pub general: GeneralConfig,
    /// Roles hosted by this process, started in order.
    pub roles: Vec<RoleConfig>,
}

/// Network front of the message director.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessageDirectorConfig {
    /// Address to accept participant connections on. No listener when unset.
    pub bind: Option<String>,
}

/// Settings shared by every role.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Schema YAML files, merged in order.
    pub schema_files: Vec<String>,
    /// Reserved parent id for authority-scope channels.
    pub authority_scope_prefix: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            schema_files: Vec::new(),
            authority_scope_prefix: DEFAULT_AUTHORITY_SCOPE_PREFIX,
        }
    }
}

impl Config {
    /// Merge every configuration source; later sources win.
    ///
    /// Optional `astrolabe.yaml` in the working directory, then `path`, then
    /// the file named by `ASTROLABE_CONFIG`, then `ASTROLABE__SECTION__KEY`
    /// variables.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Reject settings that would misroute traffic at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = self.general.authority_scope_prefix;
        if prefix == 0 {
            return Err(ConfigError::ScopePrefixZero);
        }

        for role in &self.roles {
            if role.control() == INVALID_CHANNEL {
                return Err(ConfigError::InvalidControlChannel(role.kind()));
            }
            if let RoleConfig::Database(db) = role {
                let IdRange { min, max } = db.generate;
                if min == 0 || min > max {
                    return Err(ConfigError::InvalidIdRange { min, max });
                }
                if db.generate.contains(prefix) {
                    return Err(ConfigError::ScopePrefixCollides { prefix, min, max });
                }
            }
        }
        Ok(())
    }
}
