//! Configuration management for the operation driver runtime.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation
mod pool;
mod tablet;
mod tracker;
pub use pool::*;
pub use tablet::*;
pub use tracker::*;
use std::env;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Environment prefix: `TABLET__APPLY_POOL__QUEUE_CAPACITY=2048`
pub const ENV_PREFIX: &str = "TABLET";

/// Main configuration container for the driver runtime
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DriverNodeConfig {
    /// Identity of the tablet replica and failure policy
    #[serde(default)]
    pub tablet: TabletConfig,
    /// Pool running prepare batches
    #[serde(default = "PoolConfig::prepare_default")]
    pub prepare_pool: PoolConfig,
    /// Pool running apply tasks
    #[serde(default = "PoolConfig::apply_default")]
    pub apply_pool: PoolConfig,
    /// Leader-side batching
    #[serde(default)]
    pub preparer: PreparerConfig,
    /// In-flight operation admission
    #[serde(default)]
    pub tracker: TrackerConfig,
}

impl Default for DriverNodeConfig {
    fn default() -> Self {
        Self {
            tablet: TabletConfig::default(),
            prepare_pool: PoolConfig::prepare_default(),
            apply_pool: PoolConfig::apply_default(),
            preparer: PreparerConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

impl DriverNodeConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `TABLET__` prefix (highest priority)
    ///
    /// Callers MUST call `validate()` before using the configuration.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    pub fn validate(self) -> Result<Self> {
        self.tablet.validate()?;
        self.prepare_pool.validate("prepare_pool")?;
        self.apply_pool.validate("apply_pool")?;
        // Preparation and apply both follow log order, one worker each
        for (name, pool) in [("prepare_pool", &self.prepare_pool), ("apply_pool", &self.apply_pool)] {
            if pool.workers != 1 {
                return Err(Error::Config(ConfigError::Message(format!(
                    "{name}.workers must be 1, got {}",
                    pool.workers
                ))));
            }
        }
        self.preparer.validate()?;
        self.tracker.validate()?;
        Ok(self)
    }
}
