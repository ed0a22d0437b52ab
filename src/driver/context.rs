use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::error;

use crate::metrics::FATAL_FAILURES;
use crate::Consensus;
use crate::Error;
use crate::FatalPolicy;
use crate::Log;
use crate::OpId;
use crate::OperationOrderVerifier;
use crate::OperationTracker;
use crate::Preparer;
use crate::ThreadPool;

/// Where a fatal failure was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalSource {
    Apply,
    CommitAppend,
    OrderVerification,
    ReplicationCallback,
    HandleFailure,
}

impl FatalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FatalSource::Apply => "apply",
            FatalSource::CommitAppend => "commit_append",
            FatalSource::OrderVerification => "order_verification",
            FatalSource::ReplicationCallback => "replication_callback",
            FatalSource::HandleFailure => "handle_failure",
        }
    }
}

/// A committed entry that can no longer be applied.
#[derive(Debug, Clone)]
pub struct FatalError {
    pub tablet_id: String,
    pub peer_id: String,
    pub op_id: OpId,
    pub source: FatalSource,
    pub error: String,
}

/// Sink for unrecoverable failures.
///
/// Always logs and counts. Forwards to the embedder's channel when one is attached, then
/// terminates the process under [`FatalPolicy::Abort`].
#[derive(Debug, Clone)]
pub struct FatalErrorReporter {
    policy: FatalPolicy,
    sink: Option<mpsc::UnboundedSender<FatalError>>,
}

impl FatalErrorReporter {
    pub fn new(
        policy: FatalPolicy,
        sink: Option<mpsc::UnboundedSender<FatalError>>,
    ) -> Self {
        Self { policy, sink }
    }

    pub fn policy(&self) -> FatalPolicy {
        self.policy
    }

    /// Returns the error as [`Error::Fatal`] so callers can propagate it.
    pub fn report(
        &self,
        log_prefix: &str,
        fatal: FatalError,
    ) -> Error {
        error!(
            "{}FATAL {} failure on {}: {}",
            log_prefix,
            fatal.source.as_str(),
            fatal.op_id,
            fatal.error
        );
        FATAL_FAILURES.with_label_values(&[fatal.source.as_str()]).inc();

        let err = Error::Fatal(format!("{} at {}: {}", fatal.source.as_str(), fatal.op_id, fatal.error));
        if let Some(sink) = &self.sink {
            if sink.send(fatal).is_err() {
                error!("{}fatal error receiver dropped", log_prefix);
            }
        }

        if self.policy == FatalPolicy::Abort {
            error!("{}aborting process: committed entry cannot be applied", log_prefix);
            std::process::abort();
        }
        err
    }
}

pub(crate) struct DriverCollaborators {
    pub(crate) consensus: Arc<dyn Consensus>,
    pub(crate) log: Arc<dyn Log>,
    pub(crate) preparer: Arc<dyn Preparer>,
    pub(crate) apply_pool: Arc<dyn ThreadPool>,
}

pub(crate) struct DriverBookkeeping {
    pub(crate) tracker: Arc<dyn OperationTracker>,
    pub(crate) order_verifier: Arc<dyn OperationOrderVerifier>,
}

/// Long-lived collaborators shared by every driver of one tablet replica.
///
/// Must outlive all drivers that reference it; drivers hold it through an `Arc`.
pub struct DriverContext {
    pub(crate) tablet_id: String,
    pub(crate) peer_id: String,
    pub(crate) collaborators: DriverCollaborators,
    pub(crate) bookkeeping: DriverBookkeeping,
    pub(crate) fatal: FatalErrorReporter,
}

impl DriverContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tablet_id: impl Into<String>,
        peer_id: impl Into<String>,
        consensus: Arc<dyn Consensus>,
        log: Arc<dyn Log>,
        preparer: Arc<dyn Preparer>,
        apply_pool: Arc<dyn ThreadPool>,
        tracker: Arc<dyn OperationTracker>,
        order_verifier: Arc<dyn OperationOrderVerifier>,
        fatal: FatalErrorReporter,
    ) -> Self {
        Self {
            tablet_id: tablet_id.into(),
            peer_id: peer_id.into(),
            collaborators: DriverCollaborators {
                consensus,
                log,
                preparer,
                apply_pool,
            },
            bookkeeping: DriverBookkeeping {
                tracker,
                order_verifier,
            },
            fatal,
        }
    }

    pub fn tablet_id(&self) -> &str {
        &self.tablet_id
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn consensus(&self) -> &Arc<dyn Consensus> {
        &self.collaborators.consensus
    }

    pub fn log(&self) -> &Arc<dyn Log> {
        &self.collaborators.log
    }

    pub fn preparer(&self) -> &Arc<dyn Preparer> {
        &self.collaborators.preparer
    }

    pub fn apply_pool(&self) -> &Arc<dyn ThreadPool> {
        &self.collaborators.apply_pool
    }

    pub fn tracker(&self) -> &Arc<dyn OperationTracker> {
        &self.bookkeeping.tracker
    }

    pub fn order_verifier(&self) -> &Arc<dyn OperationOrderVerifier> {
        &self.bookkeeping.order_verifier
    }

    pub fn fatal_reporter(&self) -> &FatalErrorReporter {
        &self.fatal
    }
}
