use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Admission limits for in-flight operations
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TrackerConfig {
    /// Maximum leader-side operations in flight (0 = unlimited)
    #[serde(default = "default_max_pending_operations")]
    pub max_pending_operations: usize,

    /// Maximum bytes held by leader-side operations in flight (0 = unlimited)
    #[serde(default = "default_max_pending_memory_bytes")]
    pub max_pending_memory_bytes: u64,

    /// How long shutdown waits for in-flight operations (milliseconds)
    #[serde(default = "default_shutdown_wait_ms")]
    pub shutdown_wait_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_pending_operations: default_max_pending_operations(),
            max_pending_memory_bytes: default_max_pending_memory_bytes(),
            shutdown_wait_ms: default_shutdown_wait_ms(),
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.shutdown_wait_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "tracker.shutdown_wait_ms must be at least 1ms".into(),
            )));
        }
        Ok(())
    }
}

fn default_max_pending_operations() -> usize {
    0
}
// 1 GiB
fn default_max_pending_memory_bytes() -> u64 {
    1024 * 1024 * 1024
}
fn default_shutdown_wait_ms() -> u64 {
    30_000
}
