use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::Preparer;
use crate::Consensus;
use crate::ConsensusRound;
use crate::Error;
use crate::OperationDriver;
use crate::OperationError;
use crate::PreparerConfig;
use crate::Result;
use crate::SystemError;
use crate::ThreadPool;

/// Drains submitted drivers into batches, one prepare-pool task per batch.
///
/// Inside a batch, consecutive leader-side drivers are prepared and then proposed to
/// consensus together. A replica driver, or the end of the batch, flushes the group.
pub struct DefaultPreparer {
    consensus: Arc<dyn Consensus>,
    prepare_pool: Arc<dyn ThreadPool>,
    max_batch_size: usize,
    queue_tx: mpsc::UnboundedSender<Arc<OperationDriver>>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<Arc<OperationDriver>>>>,
    stopped: AtomicBool,
}

impl DefaultPreparer {
    pub fn new(
        consensus: Arc<dyn Consensus>,
        prepare_pool: Arc<dyn ThreadPool>,
        config: &PreparerConfig,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            consensus,
            prepare_pool,
            max_batch_size: config.max_batch_size,
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Dispatch loop. Returns once shutdown was signalled and the queue drained.
    pub async fn run(
        self: Arc<Self>,
        mut shutdown_signal: watch::Receiver<()>,
    ) {
        let Some(mut queue_rx) = self.queue_rx.lock().take() else {
            warn!("[Preparer] run called twice");
            return;
        };

        loop {
            tokio::select! {
                biased;
                // P0: shutdown received
                _ = shutdown_signal.changed() => {
                    info!("[Preparer] shutdown signal received.");
                    break;
                }

                first = queue_rx.recv() => {
                    let Some(first) = first else {
                        break;
                    };
                    let mut batch = vec![first];
                    while batch.len() < self.max_batch_size {
                        match queue_rx.try_recv() {
                            Ok(driver) => batch.push(driver),
                            Err(_) => break,
                        }
                    }
                    self.dispatch(batch);
                }
            }
        }

        self.stopped.store(true, Ordering::Release);
        // Late submissions now fail with PreparerStopped
        queue_rx.close();

        // Graceful drain: once closed, recv returns None only after every accepted driver
        // has been received
        let mut batch = Vec::new();
        while let Some(driver) = queue_rx.recv().await {
            batch.push(driver);
            if batch.len() == self.max_batch_size {
                self.dispatch(std::mem::take(&mut batch));
            }
        }
        if !batch.is_empty() {
            self.dispatch(batch);
        }
        info!("[Preparer] stopped");
    }

    pub(crate) fn dispatch(
        &self,
        batch: Vec<Arc<OperationDriver>>,
    ) {
        trace!("[Preparer] dispatching batch of {}", batch.len());
        let drivers = batch.clone();
        let consensus = self.consensus.clone();

        if let Err(e) = self
            .prepare_pool
            .submit(Box::new(move || process_batch(consensus.as_ref(), batch)))
        {
            warn!("[Preparer] prepare pool refused batch of {}: {}", drivers.len(), e);
            for driver in drivers {
                let _ = driver.handle_failure(Some(OperationError::Rejected(e.to_string()).into()));
            }
        }
    }
}

impl Preparer for DefaultPreparer {
    fn submit(
        &self,
        driver: Arc<OperationDriver>,
    ) -> Result<()> {
        if self.is_stopped() {
            return Err(SystemError::PreparerStopped.into());
        }
        self.queue_tx
            .send(driver)
            .map_err(|_| SystemError::PreparerStopped.into())
    }
}

/// Prepare-pool task body for one batch.
pub fn process_batch(
    consensus: &dyn Consensus,
    batch: Vec<Arc<OperationDriver>>,
) {
    let mut leader_group = Vec::with_capacity(batch.len());

    for driver in batch {
        if driver.is_leader_side() {
            match driver.prepare_and_start() {
                Ok(()) => leader_group.push(driver),
                Err(e) => {
                    let _ = driver.handle_failure(Some(e));
                }
            }
        } else {
            replicate_group(consensus, &mut leader_group);
            driver.prepare_and_start_task();
        }
    }

    replicate_group(consensus, &mut leader_group);
}

/// Proposes the prepared leader drivers as one consensus batch.
fn replicate_group(
    consensus: &dyn Consensus,
    group: &mut Vec<Arc<OperationDriver>>,
) {
    if group.is_empty() {
        return;
    }

    let mut submitting = Vec::with_capacity(group.len());
    for driver in group.drain(..) {
        match driver.mark_replicating() {
            Ok(()) => submitting.push(driver),
            Err(e) => {
                let _ = driver.handle_failure(Some(e));
            }
        }
    }
    if submitting.is_empty() {
        return;
    }

    let rounds: Vec<Arc<ConsensusRound>> = submitting.iter().filter_map(|d| d.consensus_round()).collect();
    debug!("[Preparer] replicating {} rounds", rounds.len());

    if let Err(e) = consensus.replicate_batch(&rounds) {
        warn!("[Preparer] consensus refused {} rounds: {}", rounds.len(), e);
        for driver in submitting {
            if let Err(transition) = driver.set_replication_failed(rejection_status(&e)) {
                let _ = driver.handle_failure(Some(transition));
                continue;
            }
            let _ = driver.handle_failure(None);
        }
    }
}

/// Per-driver copy of a batch-wide rejection.
fn rejection_status(e: &Error) -> Error {
    match e {
        Error::Operation(OperationError::NotLeader { leader_hint }) => OperationError::NotLeader {
            leader_hint: leader_hint.clone(),
        }
        .into(),
        other => OperationError::ReplicationFailed(other.to_string()).into(),
    }
}
