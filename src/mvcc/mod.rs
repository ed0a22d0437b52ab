//! Multi-version concurrency control seam.

#[cfg(test)]
use mockall::automock;

use crate::HybridTime;

#[cfg_attr(test, automock)]
pub trait MvccManager: Send + Sync + 'static {
    /// Publishes the safe-time watermark propagated from the leader.
    fn set_propagated_safe_time(
        &self,
        safe_time: HybridTime,
    );
}
