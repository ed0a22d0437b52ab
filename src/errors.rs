//! Operation Driver Error Hierarchy
//!
//! Errors are grouped by who is expected to react to them:
//! - `Operation` errors are recoverable and travel back to the client through the
//!   operation's completion channel.
//! - `System` and `Config` errors describe the surrounding infrastructure.
//! - `StateTransition` and `Ordering` errors are internal-consistency violations.
//! - `Fatal` means a committed entry can no longer be applied; the embedding node must halt.

use config::ConfigError;

use crate::OpId;
use crate::PrepareState;
use crate::ReplicationState;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (pools, preparer, log)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration load or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Client-visible, recoverable operation failures
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// Illegal driver state transitions
    #[error(transparent)]
    StateTransition(#[from] StateTransitionError),

    /// Apply ordering violations
    #[error(transparent)]
    Ordering(#[from] OrderingError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl Error {
    /// True when the embedding node must treat this error as a halt signal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// Pool queue is at capacity
    #[error("{pool} pool queue is full (capacity {capacity})")]
    QueueFull {
        pool: String,
        capacity: usize,
    },

    /// Pool no longer accepts tasks
    #[error("{pool} pool is shut down")]
    PoolShutdown { pool: String },

    /// Preparer no longer accepts drivers
    #[error("Preparer is stopped")]
    PreparerStopped,

    /// Durable commit append failed
    #[error("Log append failed: {0}")]
    LogAppend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// Request rejected by the operation's own validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Conflicting in-flight operation
    #[error("Conflicting operation in flight: {0}")]
    Conflict(String),

    /// Operation-specific prepare failure
    #[error("Prepare failed: {0}")]
    PrepareFailed(String),

    /// This peer can no longer lead the round
    #[error("Not the leader (known leader: {leader_hint:?})")]
    NotLeader { leader_hint: Option<String> },

    /// Consensus reported the entry will never commit
    #[error("Replication failed: {0}")]
    ReplicationFailed(String),

    /// Cancelled before replication started
    #[error("Operation aborted: {0}")]
    Aborted(String),

    /// Tracker admission limit on memory
    #[error("Pending operations memory limit exceeded (requested {requested}, in use {in_use}, limit {limit})")]
    MemoryLimitExceeded {
        requested: u64,
        in_use: u64,
        limit: u64,
    },

    /// Tracker admission limit on count
    #[error("Too many pending operations (limit {limit})")]
    TooManyPending { limit: usize },

    /// Rejected before execution started
    #[error("Operation rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StateTransitionError {
    #[error("Invalid replication state transition {from} -> {to}.")]
    InvalidReplicationTransition {
        from: ReplicationState,
        to: ReplicationState,
    },

    #[error("Invalid prepare state transition {from} -> {to}.")]
    InvalidPrepareTransition {
        from: PrepareState,
        to: PrepareState,
    },

    #[error("Driver already initialized.")]
    AlreadyInitialized,

    #[error("Driver has no bound operation.")]
    NotInitialized,

    #[error("Replica operation carries no consensus round.")]
    MissingConsensusRound,

    #[error("Replica consensus round has no assigned OpId.")]
    UnassignedReplicaOpId,

    #[error("Apply already triggered.")]
    ApplyAlreadyTriggered,

    #[error("OpId regression (current: {current}, received: {received})")]
    OpIdRegression {
        current: OpId,
        received: OpId,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum OrderingError {
    #[error("Out of order apply (previous index: {previous}, current index: {current})")]
    OutOfOrderApply {
        previous: u64,
        current: u64,
    },

    #[error("Prepare time regression (previous: {previous}us, current: {current}us)")]
    PrepareTimeRegression {
        previous: u64,
        current: u64,
    },
}

// ============== Conversion Implementations ============== //
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::System(SystemError::Io(e))
    }
}
