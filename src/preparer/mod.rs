//! Batching layer between client submission and the prepare pool.

mod default_preparer;

pub use default_preparer::*;


use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::OperationDriver;
use crate::Result;

#[cfg_attr(test, automock)]
pub trait Preparer: Send + Sync + 'static {
    /// Queues the driver for preparation. Never blocks.
    fn submit(
        &self,
        driver: Arc<OperationDriver>,
    ) -> Result<()>;
}
