use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::CompletionReceiver;
use crate::ConsensusRound;
use crate::HybridTime;
use crate::OpId;
use crate::Operation;
use crate::OperationError;
use crate::OperationResult;
use crate::OperationState;
use crate::OperationType;
use crate::ReplicateMsg;
use crate::Result;

/// Observes and steers a [`TestOperation`] from the test body.
#[derive(Default)]
pub struct OperationProbe {
    prepares: AtomicUsize,
    starts: AtomicUsize,
    applies: AtomicUsize,
    committed: AtomicUsize,
    aborted: AtomicUsize,
    applied_op_ids: Mutex<Vec<OpId>>,
    fail_prepare: Mutex<Option<String>>,
    fail_apply: Mutex<Option<String>>,
    prepare_gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
    assign_hybrid_time: Mutex<Option<HybridTime>>,
}

impl OperationProbe {
    pub fn prepares(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn applies(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }

    pub fn committed(&self) -> usize {
        self.committed.load(Ordering::SeqCst)
    }

    pub fn aborted(&self) -> usize {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn applied_op_ids(&self) -> Vec<OpId> {
        self.applied_op_ids.lock().clone()
    }

    pub fn fail_prepare_with(
        &self,
        msg: &str,
    ) {
        *self.fail_prepare.lock() = Some(msg.to_string());
    }

    pub fn fail_apply_with(
        &self,
        msg: &str,
    ) {
        *self.fail_apply.lock() = Some(msg.to_string());
    }

    /// Prepare assigns this hybrid time, like a leader reading its clock.
    pub fn assign_hybrid_time(
        &self,
        hybrid_time: HybridTime,
    ) {
        *self.assign_hybrid_time.lock() = Some(hybrid_time);
    }

    /// Makes prepare block until the returned sender fires.
    ///
    /// The second receiver resolves once prepare has started waiting.
    pub fn block_prepare(&self) -> (mpsc::Sender<()>, mpsc::Receiver<()>) {
        let (release_tx, release_rx) = mpsc::channel();
        let (entered_tx, entered_rx) = mpsc::channel();
        *self.prepare_gate.lock() = Some((entered_tx, release_rx));
        (release_tx, entered_rx)
    }
}

/// Scripted operation used across driver, preparer and runtime tests.
pub struct TestOperation {
    op_type: OperationType,
    state: OperationState,
    probe: Arc<OperationProbe>,
}

impl TestOperation {
    pub fn new(
        op_type: OperationType,
        state: OperationState,
    ) -> (Box<Self>, Arc<OperationProbe>) {
        let probe = Arc::new(OperationProbe::default());
        let operation = Box::new(Self {
            op_type,
            state,
            probe: probe.clone(),
        });
        (operation, probe)
    }

    /// Leader-side write with a client reply path.
    pub fn leader(request: &'static str) -> (Box<Self>, CompletionReceiver, Arc<OperationProbe>) {
        let (state, rx) = OperationState::with_completion(Bytes::from_static(request.as_bytes()));
        let (operation, probe) = Self::new(OperationType::Write, state);
        (operation, rx, probe)
    }

    /// Replica-side write bound to `op_id`, as received from the leader.
    pub fn replica(op_id: OpId) -> (Box<Self>, Arc<ConsensusRound>, Arc<OperationProbe>) {
        let request = Bytes::from(format!("replica-{}", op_id.index));
        let round = Arc::new(ConsensusRound::for_replica(
            ReplicateMsg::new(OperationType::Write, request.clone()),
            op_id,
        ));
        let state = OperationState::for_replica(request, round.clone());
        let (operation, probe) = Self::new(OperationType::Write, state);
        (operation, round, probe)
    }
}

impl Operation for TestOperation {
    fn operation_type(&self) -> OperationType {
        self.op_type
    }

    fn state(&self) -> &OperationState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OperationState {
        &mut self.state
    }

    fn prepare(&mut self) -> Result<()> {
        self.probe.prepares.fetch_add(1, Ordering::SeqCst);

        let gate = self.probe.prepare_gate.lock().take();
        if let Some((entered_tx, release_rx)) = gate {
            let _ = entered_tx.send(());
            let _ = release_rx.recv();
        }

        if let Some(msg) = self.probe.fail_prepare.lock().clone() {
            return Err(OperationError::PrepareFailed(msg).into());
        }
        if let Some(hybrid_time) = *self.probe.assign_hybrid_time.lock() {
            self.state.set_hybrid_time(hybrid_time);
        }
        Ok(())
    }

    fn start(&mut self) {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn apply(&mut self) -> Result<()> {
        self.probe.applies.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = self.probe.fail_apply.lock().clone() {
            return Err(OperationError::InvalidRequest(msg).into());
        }
        self.probe.applied_op_ids.lock().push(self.state.op_id());
        Ok(())
    }

    fn finish(
        &mut self,
        result: OperationResult,
    ) {
        match result {
            OperationResult::Committed => self.probe.committed.fetch_add(1, Ordering::SeqCst),
            OperationResult::Aborted => self.probe.aborted.fetch_add(1, Ordering::SeqCst),
        };
    }
}
