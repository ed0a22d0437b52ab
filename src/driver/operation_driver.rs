use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::Weak;
use std::time::Instant;

use parking_lot::MappedMutexGuard;
use parking_lot::Mutex;
use parking_lot::MutexGuard;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::AfterPrepare;
use super::AfterReplication;
use super::DriverContext;
use super::DriverState;
use super::FatalError;
use super::FatalSource;
use super::PrepareState;
use super::ReplicationState;
use super::Trace;
use crate::metrics::OPERATIONS_COMPLETED;
use crate::metrics::OPERATIONS_FAILED;
use crate::metrics::OPERATION_LATENCY_MS;
use crate::utils::scoped_timer::ScopedTimer;
use crate::utils::time::get_monotonic_micros;
use crate::CommitRecord;
use crate::Consensus;
use crate::ConsensusAppendCallback;
use crate::ConsensusRound;
use crate::DriverType;
use crate::Error;
use crate::HybridTime;
use crate::MvccManager;
use crate::OpId;
use crate::Operation;
use crate::OperationError;
use crate::OperationResult;
use crate::OperationState;
use crate::OperationType;
use crate::Result;
use crate::StateTransitionError;

static NEXT_DRIVER_ID: AtomicU64 = AtomicU64::new(1);

/// Drives one operation through prepare, replication, apply and finalize.
///
/// Shared through an `Arc`: the submitter, the pool tasks and the consensus round's
/// replicated callback each hold a handle, so the driver lives as long as the longest of
/// them. The round's callback is cleared once the operation finishes, which breaks the
/// driver <-> round cycle.
///
/// Locks, never nested:
/// - `state`: replication/prepare automata and abort intent; short transitions only
/// - `op_id`: cached OpId for readers that must not wait behind `state`
/// - `operation`: the bound operation; held across prepare and apply
pub struct OperationDriver {
    id: u64,
    context: Arc<DriverContext>,
    state: Mutex<DriverState>,
    op_id: Mutex<OpId>,
    operation: Mutex<Option<Box<dyn Operation>>>,
    operation_type: OnceLock<OperationType>,
    consensus_round: OnceLock<Arc<ConsensusRound>>,
    space_used: AtomicUsize,
    propagated_safe_time: Mutex<Option<(HybridTime, Arc<dyn MvccManager>)>>,
    trace: Trace,
    start_time: Instant,
}

impl OperationDriver {
    pub fn new(context: Arc<DriverContext>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_DRIVER_ID.fetch_add(1, Ordering::Relaxed),
            context,
            state: Mutex::new(DriverState::default()),
            op_id: Mutex::new(OpId::invalid()),
            operation: Mutex::new(None),
            operation_type: OnceLock::new(),
            consensus_round: OnceLock::new(),
            space_used: AtomicUsize::new(0),
            propagated_safe_time: Mutex::new(None),
            trace: Trace::new(),
            start_time: Instant::now(),
        })
    }

    /// Binds the operation and registers the driver with the tracker.
    ///
    /// Replica operations must carry the round received from the leader, already bound to
    /// its OpId. Leader operations get a fresh round built from
    /// [`Operation::new_replicate_msg`].
    ///
    /// On error the operation's client (if any) has been answered.
    pub fn init(
        self: &Arc<Self>,
        mut operation: Box<dyn Operation>,
        driver_type: DriverType,
    ) -> Result<()> {
        let round = match self.bind_round(operation.as_mut(), driver_type) {
            Ok(round) => round,
            Err(e) => {
                operation
                    .state_mut()
                    .complete(Err(OperationError::Rejected(e.to_string()).into()));
                return Err(e);
            }
        };

        if let Err(e) = self.state.lock().initialize(driver_type) {
            operation
                .state_mut()
                .complete(Err(OperationError::Rejected(e.to_string()).into()));
            return Err(e);
        }

        if driver_type == DriverType::Replica {
            *self.op_id.lock() = round.id();
        }

        let driver = self.clone();
        round.set_replicated_callback(Box::new(move |status| driver.replication_finished(status)));
        let append: Weak<OperationDriver> = Arc::downgrade(self);
        round.set_append_callback(append);

        let _ = self.consensus_round.set(round);
        let _ = self.operation_type.set(operation.operation_type());
        self.space_used.store(operation.state().space_used(), Ordering::Release);
        *self.operation.lock() = Some(operation);
        self.trace.add(format!("Init {driver_type:?}"));

        if let Err(e) = self.context.tracker().add(self) {
            warn!("{}rejected by tracker: {}", self.log_prefix(), e);
            self.handle_failure(Some(OperationError::Rejected(e.to_string()).into()))?;
            return Err(e);
        }

        debug!("{}initialized", self.log_prefix());
        Ok(())
    }

    fn bind_round(
        &self,
        operation: &mut dyn Operation,
        driver_type: DriverType,
    ) -> Result<Arc<ConsensusRound>> {
        match driver_type {
            DriverType::Replica => {
                let round = operation
                    .state()
                    .consensus_round()
                    .cloned()
                    .ok_or(StateTransitionError::MissingConsensusRound)?;
                if !round.id().is_valid() {
                    return Err(StateTransitionError::UnassignedReplicaOpId.into());
                }
                Ok(round)
            }
            DriverType::Leader => {
                let round = Arc::new(ConsensusRound::new(operation.new_replicate_msg()));
                operation.state_mut().set_consensus_round(round.clone());
                Ok(round)
            }
        }
    }

    /// Hands the driver to the preparer. Completion is reported through the operation.
    pub fn execute_async(self: &Arc<Self>) {
        trace!("{}execute_async", self.log_prefix());
        self.trace.add("ExecuteAsync");

        if let Err(e) = self.context.preparer().submit(self.clone()) {
            let _ = self.handle_failure(Some(e));
        }
    }

    /// Prepares and starts the operation.
    ///
    /// Leader-side drivers stop short of replication: the caller batches them into
    /// consensus and advances them through [`Self::mark_replicating`].
    pub fn prepare_and_start(self: &Arc<Self>) -> Result<()> {
        let _timer = ScopedTimer::new("prepare_and_start");
        self.trace.add("PrepareAndStart");

        self.state.lock().check_abort()?;

        let hybrid_time = {
            let mut operation = self.operation.lock();
            let operation = operation.as_mut().ok_or(StateTransitionError::NotInitialized)?;
            operation.prepare()?;
            operation.start();
            operation.state().hybrid_time()
        };

        let leader_side = self.is_leader_side();
        if let (true, Some(hybrid_time), Some(round)) = (leader_side, hybrid_time, self.consensus_round.get()) {
            round.set_hybrid_time(hybrid_time);
        }

        let next = self.state.lock().mark_prepared(get_monotonic_micros())?;
        match next {
            AfterPrepare::AwaitSubmission | AfterPrepare::AwaitReplication => {
                trace!("{}prepared", self.log_prefix());
                Ok(())
            }
            AfterPrepare::Apply => {
                trace!("{}prepared after replication finished", self.log_prefix());
                self.apply_async()
            }
            AfterPrepare::Fail(status) => Err(status),
        }
    }

    /// Pool-task body for drivers that are not batched by the caller.
    pub fn prepare_and_start_task(self: &Arc<Self>) {
        if let Err(e) = self.prepare_and_start() {
            let _ = self.handle_failure(Some(e));
        }
    }

    /// Leader submission: NOT_REPLICATING -> REPLICATING, refused once aborted.
    ///
    /// Must be called right before the round is handed to consensus.
    pub fn mark_replicating(&self) -> Result<()> {
        self.state.lock().start_replicating()?;
        self.trace.add("Replicating");
        Ok(())
    }

    /// Consensus refused the round; it never left this node.
    pub fn set_replication_failed(
        &self,
        status: Error,
    ) -> Result<()> {
        debug!("{}replication submission failed: {}", self.log_prefix(), status);
        self.trace.add(format!("SetReplicationFailed: {status}"));
        self.state.lock().set_replication_failed(status)
    }

    /// Consensus decision for the round. May race with preparation on replicas.
    pub fn replication_finished(
        self: &Arc<Self>,
        status: Result<()>,
    ) {
        self.trace.add(match &status {
            Ok(()) => "ReplicationFinished: OK".to_string(),
            Err(e) => format!("ReplicationFinished: {e}"),
        });

        if status.is_ok() {
            if let Some(round) = self.consensus_round.get() {
                if let Err(e) = self.record_op_id(round.id()) {
                    self.report_fatal(FatalSource::ReplicationCallback, e);
                    return;
                }
            }
        }

        let next = self.state.lock().replication_finished(status);
        match next {
            Ok(AfterReplication::AwaitPrepare) => {
                trace!("{}replicated before prepare completed", self.log_prefix());
            }
            Ok(AfterReplication::Apply) => {
                let _ = self.apply_async();
            }
            Ok(AfterReplication::Fail(e)) => {
                let _ = self.handle_failure(Some(e));
            }
            Err(e) => {
                self.report_fatal(FatalSource::ReplicationCallback, e);
            }
        }
    }

    fn record_op_id(
        &self,
        op_id: OpId,
    ) -> Result<()> {
        let mut current = self.op_id.lock();
        if !op_id.is_valid() || (current.is_valid() && *current != op_id) {
            return Err(StateTransitionError::OpIdRegression {
                current: *current,
                received: op_id,
            }
            .into());
        }
        *current = op_id;
        Ok(())
    }

    /// Only the winner of the apply trigger gets here, exactly once.
    fn apply_async(self: &Arc<Self>) -> Result<()> {
        self.trace.add("ApplyAsync");
        let driver = self.clone();
        self.context
            .apply_pool()
            .submit(Box::new(move || driver.apply_task()))
            .map_err(|e| self.report_fatal(FatalSource::Apply, e))
    }

    fn apply_task(self: &Arc<Self>) {
        let _timer = ScopedTimer::new("apply_task");
        self.trace.add("ApplyTask");
        let op_id = self.op_id();

        let prepare_time = self.prepare_physical_time().unwrap_or_default();
        if let Err(e) = self.context.order_verifier().check_apply(op_id.index, prepare_time) {
            self.report_fatal(FatalSource::OrderVerification, e);
            return;
        }

        let applied = {
            let mut operation = self.operation.lock();
            match operation.as_mut() {
                Some(operation) => {
                    operation.state_mut().set_op_id(op_id);
                    operation.apply().map(|()| CommitRecord {
                        op_id,
                        op_type: operation.operation_type(),
                        hybrid_time: operation.state().hybrid_time(),
                    })
                }
                None => Err(StateTransitionError::NotInitialized.into()),
            }
        };
        let record = match applied {
            Ok(record) => record,
            Err(e) => {
                self.report_fatal(FatalSource::Apply, e);
                return;
            }
        };

        if let Err(e) = self.context.log().append_commit(record) {
            self.report_fatal(FatalSource::CommitAppend, e);
            return;
        }

        self.finalize();
    }

    /// Publishes effects, replies to the client and drops the operation.
    fn finalize(&self) {
        self.trace.add("Finalize");

        if let Some((safe_time, mvcc)) = self.propagated_safe_time.lock().take() {
            mvcc.set_propagated_safe_time(safe_time);
        }

        let operation = self.operation.lock().take();
        if let Some(mut operation) = operation {
            let op_id = self.op_id();
            operation.finish(OperationResult::Committed);
            operation.state_mut().complete(Ok(op_id));

            let op_type = operation.operation_type();
            OPERATIONS_COMPLETED.with_label_values(&[op_type.as_str()]).inc();
            OPERATION_LATENCY_MS
                .with_label_values(&[op_type.as_str()])
                .observe(self.start_time.elapsed().as_secs_f64() * 1000.0);
        }

        debug!("{}finalized", self.log_prefix());
        self.release();
    }

    fn release(&self) {
        if let Some(round) = self.consensus_round.get() {
            round.clear_callbacks();
        }
        self.context.tracker().release(self);
        self.space_used.store(0, Ordering::Release);
    }

    /// Best-effort cancellation.
    ///
    /// Observed at the next synchronization point (prepare start or completion, leader
    /// submission). Has no effect once replication has started.
    pub fn abort(
        &self,
        status: Error,
    ) {
        self.trace.add(format!("Abort: {status}"));
        let effective = self.state.lock().request_abort(status);
        if effective {
            info!("{}abort requested", self.log_prefix());
        } else {
            info!("{}abort requested after replication started, ignoring", self.log_prefix());
        }
    }

    /// Central failure sink.
    ///
    /// Before anything could reach a quorum the operation is failed back to its client.
    /// Otherwise the failure is reported as fatal and `Err(Error::Fatal)` is returned.
    /// With no explicit status the one recorded by an earlier failure is used.
    pub fn handle_failure(
        &self,
        status: Option<Error>,
    ) -> Result<()> {
        let (status, recoverable, replication) = {
            let mut state = self.state.lock();
            let status = match status {
                Some(status) => status,
                None => state.take_operation_status(),
            };
            (status, state.failure_is_recoverable(), state.replication())
        };

        if status.is_fatal() {
            return Err(status);
        }
        if !recoverable {
            return Err(self.report_fatal(
                FatalSource::HandleFailure,
                format!("cannot fail operation in replication state {replication}: {status}"),
            ));
        }

        warn!("{}failed: {}", self.log_prefix(), status);
        self.trace.add(format!("HandleFailure: {status}"));

        let operation = self.operation.lock().take();
        if let Some(mut operation) = operation {
            operation.finish(OperationResult::Aborted);
            OPERATIONS_FAILED
                .with_label_values(&[operation.operation_type().as_str()])
                .inc();
            operation.state_mut().complete(Err(status));
        }

        self.release();
        Ok(())
    }

    fn report_fatal(
        &self,
        source: FatalSource,
        error: impl fmt::Display,
    ) -> Error {
        self.trace.add(format!("Fatal {}: {}", source.as_str(), error));
        let fatal = FatalError {
            tablet_id: self.context.tablet_id().to_string(),
            peer_id: self.context.peer_id().to_string(),
            op_id: self.op_id(),
            source,
            error: error.to_string(),
        };
        self.context.fatal_reporter().report(&self.log_prefix(), fatal)
    }

    /// Snapshot of the OpId; the invalid sentinel until consensus assigned one.
    pub fn op_id(&self) -> OpId {
        *self.op_id.lock()
    }

    /// True while this node originated the operation and has not handed it to consensus.
    pub fn is_leader_side(&self) -> bool {
        self.state.lock().is_leader_side()
    }

    /// Monotonic time at which preparation completed, in micros.
    pub fn prepare_physical_time(&self) -> Option<u64> {
        self.state.lock().prepare_physical_time()
    }

    pub fn replication_state(&self) -> ReplicationState {
        self.state.lock().replication()
    }

    pub fn prepare_state(&self) -> PrepareState {
        self.state.lock().prepare()
    }

    pub fn driver_type(&self) -> Option<DriverType> {
        self.state.lock().driver_type()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn operation_type(&self) -> Option<OperationType> {
        self.operation_type.get().copied()
    }

    /// State of the bound operation. Blocks while prepare or apply is running.
    pub fn state(&self) -> Option<MappedMutexGuard<'_, OperationState>> {
        MutexGuard::try_map(self.operation.lock(), |operation| {
            operation.as_mut().map(|operation| operation.state_mut())
        })
        .ok()
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Zero when no operation is bound.
    pub fn space_used(&self) -> usize {
        self.space_used.load(Ordering::Acquire)
    }

    pub fn consensus(&self) -> &Arc<dyn Consensus> {
        self.context.consensus()
    }

    pub fn consensus_round(&self) -> Option<Arc<ConsensusRound>> {
        self.consensus_round.get().cloned()
    }

    pub fn context(&self) -> &Arc<DriverContext> {
        &self.context
    }

    /// Safe time to publish through `mvcc` once the operation is finalized.
    pub fn set_propagated_safe_time(
        &self,
        safe_time: HybridTime,
        mvcc: Arc<dyn MvccManager>,
    ) {
        *self.propagated_safe_time.lock() = Some((safe_time, mvcc));
    }

    /// `T <tablet> P <peer> S <state> Ts <op-type>: `
    pub fn log_prefix(&self) -> String {
        let state = self.state.lock().state_string();
        format!(
            "T {} P {} S {} Ts {}: ",
            self.context.tablet_id(),
            self.context.peer_id(),
            state,
            self.operation_type_str()
        )
    }

    fn operation_type_str(&self) -> &'static str {
        self.operation_type().map(|t| t.as_str()).unwrap_or("?")
    }

    /// Diagnostic dump for callers already holding the state lock.
    pub fn to_string_unlocked(
        &self,
        state: &DriverState,
    ) -> String {
        format!(
            "{{ id: {}, type: {}, state: {}, abort_requested: {} }}",
            self.id,
            self.operation_type_str(),
            state.state_string(),
            state.abort_requested()
        )
    }
}

impl ConsensusAppendCallback for OperationDriver {
    fn handle_consensus_append(&self) {
        let Some(round) = self.consensus_round.get() else {
            return;
        };
        self.trace.add(format!("Appended as {}", round.id()));
        if let Err(e) = self.record_op_id(round.id()) {
            self.report_fatal(FatalSource::ReplicationCallback, e);
        }
    }
}

impl fmt::Display for OperationDriver {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let summary = {
            let state = self.state.lock();
            self.to_string_unlocked(&state)
        };
        write!(f, "{} op_id: {}", summary, self.op_id())?;
        // Never wait behind prepare or apply for a diagnostic string
        if let Some(operation) = self.operation.try_lock() {
            if let Some(operation) = operation.as_ref() {
                write!(f, " {}", operation.description())?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for OperationDriver {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "OperationDriver {self}")
    }
}
