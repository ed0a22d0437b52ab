use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// What to do once a committed entry cannot be applied.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FatalPolicy {
    /// Log, report, then terminate the process
    #[default]
    Abort,
    /// Log and report only; the embedder owns the halt
    Report,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TabletConfig {
    /// Tablet this replica serves, used in log prefixes
    #[serde(default = "default_tablet_id")]
    pub tablet_id: String,

    /// Identity of this peer within the tablet's consensus group
    #[serde(default = "default_peer_id")]
    pub peer_id: String,

    /// Reaction to post-commit apply failures
    #[serde(default)]
    pub fatal_policy: FatalPolicy,
}

impl Default for TabletConfig {
    fn default() -> Self {
        Self {
            tablet_id: default_tablet_id(),
            peer_id: default_peer_id(),
            fatal_policy: FatalPolicy::default(),
        }
    }
}

impl TabletConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tablet_id.trim().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "tablet.tablet_id cannot be empty".into(),
            )));
        }
        if self.peer_id.trim().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "tablet.peer_id cannot be empty".into(),
            )));
        }
        Ok(())
    }
}

fn default_tablet_id() -> String {
    "tablet-0".to_string()
}
fn default_peer_id() -> String {
    "peer-1".to_string()
}
