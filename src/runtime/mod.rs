//! Wiring of pools, preparer, tracker and verifier for one tablet replica.
//!
//! Shutdown is ordered: once the external signal fires, the preparer stops taking drivers
//! and drains its queue, in-flight operations get `tracker.shutdown_wait_ms` to finish,
//! and only then are the pools told to drain and stop.


use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::Consensus;
use crate::DefaultOperationTracker;
use crate::DefaultOrderVerifier;
use crate::DefaultPreparer;
use crate::DriverContext;
use crate::DriverNodeConfig;
use crate::DriverType;
use crate::FatalError;
use crate::FatalErrorReporter;
use crate::HybridTime;
use crate::Log;
use crate::MvccManager;
use crate::Operation;
use crate::OperationDriver;
use crate::OperationTracker;
use crate::Result;
use crate::WorkerPool;

pub struct DriverRuntimeBuilder {
    config: DriverNodeConfig,
    consensus: Arc<dyn Consensus>,
    log: Arc<dyn Log>,
    shutdown_signal: watch::Receiver<()>,
    fatal_sink: Option<mpsc::UnboundedSender<FatalError>>,
    mvcc: Option<Arc<dyn MvccManager>>,
}

impl DriverRuntimeBuilder {
    pub fn new(
        config: DriverNodeConfig,
        consensus: Arc<dyn Consensus>,
        log: Arc<dyn Log>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            config,
            consensus,
            log,
            shutdown_signal,
            fatal_sink: None,
            mvcc: None,
        }
    }

    /// Receives every fatal failure before the configured policy is applied.
    pub fn with_fatal_sink(
        mut self,
        sink: mpsc::UnboundedSender<FatalError>,
    ) -> Self {
        self.fatal_sink = Some(sink);
        self
    }

    /// Target of [`DriverRuntime::propagate_safe_time`].
    pub fn with_mvcc(
        mut self,
        mvcc: Arc<dyn MvccManager>,
    ) -> Self {
        self.mvcc = Some(mvcc);
        self
    }

    /// Validates the config and starts pools and preparer. Must run inside a tokio runtime.
    pub fn build(self) -> Result<DriverRuntime> {
        let config = self.config.validate()?;

        let (pool_shutdown_tx, pool_shutdown_rx) = watch::channel(());
        let (prepare_pool, mut pool_handles) =
            WorkerPool::start("prepare", &config.prepare_pool, pool_shutdown_rx.clone());
        let (apply_pool, apply_handles) = WorkerPool::start("apply", &config.apply_pool, pool_shutdown_rx);
        pool_handles.extend(apply_handles);

        let tracker = Arc::new(DefaultOperationTracker::new(&config.tracker));
        let preparer = Arc::new(DefaultPreparer::new(
            self.consensus.clone(),
            prepare_pool,
            &config.preparer,
        ));

        let context = Arc::new(DriverContext::new(
            config.tablet.tablet_id.clone(),
            config.tablet.peer_id.clone(),
            self.consensus,
            self.log,
            preparer.clone(),
            apply_pool,
            tracker.clone(),
            Arc::new(DefaultOrderVerifier::new()),
            FatalErrorReporter::new(config.tablet.fatal_policy, self.fatal_sink),
        ));

        let preparer_handle = tokio::spawn(preparer.clone().run(self.shutdown_signal));
        let supervisor = tokio::spawn(supervise_shutdown(
            preparer_handle,
            tracker.clone(),
            Duration::from_millis(config.tracker.shutdown_wait_ms),
            pool_shutdown_tx,
            pool_handles,
        ));

        info!(
            "T {} P {} driver runtime started",
            config.tablet.tablet_id, config.tablet.peer_id
        );

        Ok(DriverRuntime {
            config,
            context,
            tracker,
            preparer,
            mvcc: self.mvcc,
            supervisor,
        })
    }
}

async fn supervise_shutdown(
    preparer_handle: JoinHandle<()>,
    tracker: Arc<DefaultOperationTracker>,
    shutdown_wait: Duration,
    pool_shutdown_tx: watch::Sender<()>,
    pool_handles: Vec<JoinHandle<()>>,
) -> bool {
    if let Err(e) = preparer_handle.await {
        error!("preparer task failed: {:?}", e);
    }

    let drained = tracker.wait_for_all_to_finish(shutdown_wait).await;
    if !drained {
        warn!("{} operations still in flight at shutdown", tracker.num_pending());
    }

    let _ = pool_shutdown_tx.send(());
    for handle in pool_handles {
        if let Err(e) = handle.await {
            error!("pool worker failed: {:?}", e);
        }
    }
    info!("driver runtime stopped");
    drained
}

/// Entry point for submitting operations on one tablet replica.
pub struct DriverRuntime {
    config: DriverNodeConfig,
    context: Arc<DriverContext>,
    tracker: Arc<DefaultOperationTracker>,
    preparer: Arc<DefaultPreparer>,
    mvcc: Option<Arc<dyn MvccManager>>,
    supervisor: JoinHandle<bool>,
}

impl DriverRuntime {
    pub fn new_driver(&self) -> Arc<OperationDriver> {
        OperationDriver::new(self.context.clone())
    }

    /// Starts a client-originated operation. The reply arrives through the operation's
    /// completion channel.
    pub fn submit_leader(
        &self,
        operation: Box<dyn Operation>,
    ) -> Result<Arc<OperationDriver>> {
        self.start(operation, DriverType::Leader)
    }

    /// Starts an operation received from the leader. Its state must carry the round.
    pub fn start_replica(
        &self,
        operation: Box<dyn Operation>,
    ) -> Result<Arc<OperationDriver>> {
        self.start(operation, DriverType::Replica)
    }

    fn start(
        &self,
        operation: Box<dyn Operation>,
        driver_type: DriverType,
    ) -> Result<Arc<OperationDriver>> {
        let driver = self.new_driver();
        driver.init(operation, driver_type)?;
        driver.execute_async();
        Ok(driver)
    }

    /// Publishes `safe_time` through the configured MVCC manager once `driver` finalizes.
    /// Returns false when the runtime was built without one.
    pub fn propagate_safe_time(
        &self,
        driver: &OperationDriver,
        safe_time: HybridTime,
    ) -> bool {
        match &self.mvcc {
            Some(mvcc) => {
                driver.set_propagated_safe_time(safe_time, mvcc.clone());
                true
            }
            None => false,
        }
    }

    pub fn config(&self) -> &DriverNodeConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<DriverContext> {
        &self.context
    }

    pub fn tracker(&self) -> &Arc<DefaultOperationTracker> {
        &self.tracker
    }

    pub fn is_stopped(&self) -> bool {
        self.preparer.is_stopped()
    }

    /// Waits for the ordered shutdown to complete.
    ///
    /// Returns false if operations were still in flight when the pools were stopped.
    pub async fn join(self) -> bool {
        match self.supervisor.await {
            Ok(drained) => drained,
            Err(e) => {
                error!("shutdown supervisor failed: {:?}", e);
                false
            }
        }
    }
}
