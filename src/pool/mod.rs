//! Thread pool seam.
//!
//! Prepare batches and apply tasks are synchronous closures handed to a pool. The driver
//! never blocks on them: `submit` only enqueues, and a full or stopped pool is reported
//! back immediately so the caller can route the failure.

mod worker_pool;

pub use worker_pool::*;


#[cfg(test)]
use mockall::automock;

use crate::Result;

pub type PoolTask = Box<dyn FnOnce() + Send + 'static>;

#[cfg_attr(test, automock)]
pub trait ThreadPool: Send + Sync + 'static {
    fn submit(
        &self,
        task: PoolTask,
    ) -> Result<()>;
}
