use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Worker pool sizing
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PoolConfig {
    /// Number of workers draining the queue.
    /// The driver pools must use 1, their tasks run in log order.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum queued tasks before submissions are rejected
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl PoolConfig {
    pub fn prepare_default() -> Self {
        Self::default()
    }

    pub fn apply_default() -> Self {
        Self {
            workers: 1,
            queue_capacity: 10_000,
        }
    }

    pub fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "{name}.workers must be greater than 0"
            ))));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "{name}.queue_capacity must be greater than 0"
            ))));
        }
        Ok(())
    }
}

/// Leader-side batching of prepared operations into consensus rounds
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PreparerConfig {
    /// Upper bound on drivers drained from the queue into one batch
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for PreparerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl PreparerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "preparer.max_batch_size must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_workers() -> usize {
    1
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_max_batch_size() -> usize {
    64
}
