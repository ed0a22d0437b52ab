use std::time::Duration;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::OperationTracker;
use crate::metrics::PENDING_MEMORY_BYTES;
use crate::metrics::PENDING_OPERATIONS;
use crate::OperationDriver;
use crate::OperationError;
use crate::OperationType;
use crate::Result;
use crate::TrackerConfig;

/// Snapshot of one tracked operation.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    pub driver_id: u64,
    pub op_type: Option<OperationType>,
    pub space_used: u64,
    pub leader_side: bool,
    pub started_at: Instant,
}

#[derive(Debug, Default)]
struct Totals {
    operations: usize,
    memory_bytes: u64,
}

pub struct DefaultOperationTracker {
    pending: DashMap<u64, PendingOperation>,
    // Admission is check-then-insert; serialize it.
    totals: Mutex<Totals>,
    drained: Notify,
    max_pending_operations: usize,
    max_pending_memory_bytes: u64,
}

impl DefaultOperationTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            pending: DashMap::new(),
            totals: Mutex::new(Totals::default()),
            drained: Notify::new(),
            max_pending_operations: config.max_pending_operations,
            max_pending_memory_bytes: config.max_pending_memory_bytes,
        }
    }

    pub fn pending_operations(&self) -> Vec<PendingOperation> {
        let mut ops: Vec<PendingOperation> = self.pending.iter().map(|e| e.value().clone()).collect();
        ops.sort_by_key(|op| op.driver_id);
        ops
    }

    pub fn memory_in_use(&self) -> u64 {
        self.totals.lock().memory_bytes
    }

    /// Waits until every tracked operation was released.
    ///
    /// Returns false if operations were still pending when `timeout` elapsed.
    pub async fn wait_for_all_to_finish(
        &self,
        timeout: Duration,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let pending = self.num_pending();
            if pending == 0 {
                return true;
            }
            debug!("waiting for {} pending operations", pending);

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let pending = self.pending_operations();
                warn!(
                    "{} operations still pending after {:?}: {:?}",
                    pending.len(),
                    timeout,
                    pending.iter().map(|op| op.driver_id).collect::<Vec<_>>()
                );
                return self.num_pending() == 0;
            }
        }
    }

    fn admit(
        &self,
        totals: &Totals,
        requested: u64,
    ) -> Result<()> {
        if self.max_pending_operations > 0 && totals.operations >= self.max_pending_operations {
            return Err(OperationError::TooManyPending {
                limit: self.max_pending_operations,
            }
            .into());
        }
        if self.max_pending_memory_bytes > 0 && totals.memory_bytes + requested > self.max_pending_memory_bytes {
            return Err(OperationError::MemoryLimitExceeded {
                requested,
                in_use: totals.memory_bytes,
                limit: self.max_pending_memory_bytes,
            }
            .into());
        }
        Ok(())
    }
}

impl OperationTracker for DefaultOperationTracker {
    fn add(
        &self,
        driver: &OperationDriver,
    ) -> Result<()> {
        let leader_side = driver.is_leader_side();
        let space_used = driver.space_used() as u64;

        let mut totals = self.totals.lock();
        if leader_side {
            self.admit(&totals, space_used)?;
        }

        let entry = PendingOperation {
            driver_id: driver.id(),
            op_type: driver.operation_type(),
            space_used,
            leader_side,
            started_at: driver.start_time(),
        };
        if self.pending.insert(driver.id(), entry).is_none() {
            totals.operations += 1;
            totals.memory_bytes += space_used;
            PENDING_OPERATIONS.inc();
            PENDING_MEMORY_BYTES.add(space_used as i64);
        }
        Ok(())
    }

    fn release(
        &self,
        driver: &OperationDriver,
    ) {
        let mut totals = self.totals.lock();
        let Some((_, entry)) = self.pending.remove(&driver.id()) else {
            return;
        };
        totals.operations -= 1;
        totals.memory_bytes -= entry.space_used;
        PENDING_OPERATIONS.dec();
        PENDING_MEMORY_BYTES.sub(entry.space_used as i64);

        if totals.operations == 0 {
            drop(totals);
            info!("all pending operations released");
            self.drained.notify_waiters();
        }
    }

    fn num_pending(&self) -> usize {
        self.totals.lock().operations
    }
}
