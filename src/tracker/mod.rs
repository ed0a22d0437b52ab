//! Bookkeeping of in-flight operations.

mod default_tracker;
mod order_verifier;

pub use default_tracker::*;
pub use order_verifier::*;


#[cfg(test)]
use mockall::automock;

use crate::OperationDriver;
use crate::Result;

#[cfg_attr(test, automock)]
pub trait OperationTracker: Send + Sync + 'static {
    /// Registers a driver right after its operation was bound.
    ///
    /// May refuse leader-side drivers when admission limits are reached. Replica drivers
    /// are always admitted: the entry is already on its way through consensus.
    fn add(
        &self,
        driver: &OperationDriver,
    ) -> Result<()>;

    /// Deregisters a driver. Unknown drivers are ignored.
    fn release(
        &self,
        driver: &OperationDriver,
    );

    fn num_pending(&self) -> usize;
}

#[cfg_attr(test, automock)]
pub trait OperationOrderVerifier: Send + Sync + 'static {
    /// Checks that applies follow log order and prepare order.
    fn check_apply(
        &self,
        op_index: u64,
        prepare_physical_time: u64,
    ) -> Result<()>;
}
