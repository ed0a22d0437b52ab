use std::sync::Arc;

use tokio::sync::mpsc;

use super::LocalConsensus;
use super::ManualPool;
use super::OperationProbe;
use super::RecordingLog;
use super::RecordingPreparer;
use super::TestOperation;
use crate::CompletionReceiver;
use crate::DefaultOperationTracker;
use crate::DefaultOrderVerifier;
use crate::DriverContext;
use crate::DriverType;
use crate::FatalError;
use crate::FatalErrorReporter;
use crate::FatalPolicy;
use crate::OpId;
use crate::OperationDriver;
use crate::TrackerConfig;

/// Driver context wired to in-memory collaborators.
///
/// Fatal failures are reported (never abort) and can be read back through `fatal_rx`.
pub struct TestHarness {
    pub context: Arc<DriverContext>,
    pub consensus: Arc<LocalConsensus>,
    pub log: Arc<RecordingLog>,
    pub preparer: Arc<RecordingPreparer>,
    pub apply_pool: Arc<ManualPool>,
    pub tracker: Arc<DefaultOperationTracker>,
    pub verifier: Arc<DefaultOrderVerifier>,
    pub fatal_rx: mpsc::UnboundedReceiver<FatalError>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_tracker_config(TrackerConfig::default())
    }

    pub fn with_tracker_config(config: TrackerConfig) -> Self {
        let consensus = Arc::new(LocalConsensus::new(1));
        let log = Arc::new(RecordingLog::default());
        let preparer = Arc::new(RecordingPreparer::default());
        let apply_pool = Arc::new(ManualPool::default());
        let tracker = Arc::new(DefaultOperationTracker::new(&config));
        let verifier = Arc::new(DefaultOrderVerifier::new());
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();

        let context = Arc::new(DriverContext::new(
            "tablet-test",
            "peer-1",
            consensus.clone(),
            log.clone(),
            preparer.clone(),
            apply_pool.clone(),
            tracker.clone(),
            verifier.clone(),
            FatalErrorReporter::new(FatalPolicy::Report, Some(fatal_tx)),
        ));

        Self {
            context,
            consensus,
            log,
            preparer,
            apply_pool,
            tracker,
            verifier,
            fatal_rx,
        }
    }

    pub fn leader_driver(
        &self,
        request: &'static str,
    ) -> (Arc<OperationDriver>, CompletionReceiver, Arc<OperationProbe>) {
        let (operation, rx, probe) = TestOperation::leader(request);
        let driver = OperationDriver::new(self.context.clone());
        driver.init(operation, DriverType::Leader).expect("leader init should succeed");
        (driver, rx, probe)
    }

    pub fn replica_driver(
        &self,
        index: u64,
    ) -> (Arc<OperationDriver>, Arc<crate::ConsensusRound>, Arc<OperationProbe>) {
        let (operation, round, probe) = TestOperation::replica(OpId::new(1, index));
        let driver = OperationDriver::new(self.context.clone());
        driver.init(operation, DriverType::Replica).expect("replica init should succeed");
        (driver, round, probe)
    }

    pub fn fatal_errors(&mut self) -> Vec<FatalError> {
        let mut errors = Vec::new();
        while let Ok(fatal) = self.fatal_rx.try_recv() {
            errors.push(fatal);
        }
        errors
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
