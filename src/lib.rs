//! Per-operation execution driver for a consensus-replicated tablet.
//!
//! An [`OperationDriver`] carries one write or administrative operation through
//! prepare, replication and apply, on both the node that originated it and the
//! replicas receiving it from the leader. [`DriverRuntime`] wires drivers to the
//! prepare and apply pools, the batching [`DefaultPreparer`], the in-flight
//! [`DefaultOperationTracker`] and the apply [`DefaultOrderVerifier`].

mod config;
mod consensus;
mod driver;
mod errors;
mod metrics;
mod mvcc;
mod operation;
mod pool;
mod preparer;
mod runtime;
mod tracker;
mod wal;
pub mod utils;

pub use config::*;
pub use consensus::*;
pub use driver::*;
pub use errors::*;
pub use metrics::*;
pub use mvcc::*;
pub use operation::*;
pub use pool::*;
pub use preparer::*;
pub use runtime::*;
pub use tracker::*;
pub use wal::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;

#[cfg(test)]
mod errors_test;
