//! Operation model shared by the driver and its collaborators.
//!
//! An [`Operation`] is the payload-specific unit of work (a write, a schema change, ...).
//! The driver never looks inside it: it only sequences the capability set
//! {prepare, start, apply, finish} and reads the [`OperationState`] for OpId
//! reporting and size accounting.

mod op_id;
mod operation_state;

pub use op_id::*;
pub use operation_state::*;


use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    Write,
    ChangeMetadata,
    UpdateTransaction,
    Snapshot,
    Truncate,
    Split,
    HistoryCutoff,
    Empty,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Write => "Write",
            OperationType::ChangeMetadata => "ChangeMetadata",
            OperationType::UpdateTransaction => "UpdateTransaction",
            OperationType::Snapshot => "Snapshot",
            OperationType::Truncate => "Truncate",
            OperationType::Split => "Split",
            OperationType::HistoryCutoff => "HistoryCutoff",
            OperationType::Empty => "Empty",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the replication this node is on for a given operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverType {
    /// This node originated the operation and will propose it.
    Leader,
    /// The operation arrived from the leader and is already replicating.
    Replica,
}

/// Outcome handed to [`Operation::finish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Committed,
    Aborted,
}

pub trait Operation: Send + 'static {
    fn operation_type(&self) -> OperationType;

    fn state(&self) -> &OperationState;

    fn state_mut(&mut self) -> &mut OperationState;

    /// Checks preconditions and acquires in-memory resources (locks, schema versions...).
    fn prepare(&mut self) -> Result<()>;

    /// Called right after a successful prepare, before replication is requested.
    fn start(&mut self);

    /// Mutates in-memory structures. Effects stay invisible until the driver finalizes.
    fn apply(&mut self) -> Result<()>;

    /// Releases whatever prepare acquired.
    fn finish(
        &mut self,
        result: OperationResult,
    );

    fn new_replicate_msg(&self) -> ReplicateMsg {
        let mut msg = ReplicateMsg::new(self.operation_type(), self.state().request().clone());
        msg.hybrid_time = self.state().hybrid_time();
        msg
    }

    fn description(&self) -> String {
        format!("{} [{}]", self.operation_type(), self.state())
    }
}
