//! Shared fixtures for unit tests.
//!
//! Collaborators here are small, in-memory and deterministic: consensus assigns OpIds
//! locally and commits when told to, pools run tasks inline or on demand, the log and
//! preparer just record what they were given. Use the [mockall] mocks generated on the
//! collaborator traits when a test needs to assert exact call patterns instead.
//!
//! [mockall]: https://docs.rs/mockall/latest/mockall/

mod collaborators;
mod common;
mod harness;
mod operation;

pub use collaborators::*;
pub use common::*;
pub use harness::*;
pub use operation::*;
