//! Per-operation execution driver.
//!
//! An [`OperationDriver`] sequences one [`crate::Operation`] through its lifecycle:
//!
//! ```text
//! leader:  init -> execute_async -> prepare_and_start -> mark_replicating
//!               -> (consensus) replication_finished -> apply -> finalize
//! replica: init -> execute_async -> prepare_and_start_task
//!               \-> replication_finished (any order)  -> apply -> finalize
//! ```
//!
//! Apply runs exactly once, triggered by whichever of prepare completion and replication
//! completion happens second. Failures before anything can reach a quorum go back to the
//! client; failures after that are fatal (see [`FatalErrorReporter`]).

mod context;
mod operation_driver;
mod state_machine;
mod trace;

pub use context::*;
pub use operation_driver::*;
pub use state_machine::*;
pub use trace::*;

#[cfg(test)]
mod trace_test;
