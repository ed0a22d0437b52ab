use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::CommitRecord;
use crate::Consensus;
use crate::ConsensusRound;
use crate::HybridTime;
use crate::Log;
use crate::MvccManager;
use crate::OpId;
use crate::OperationDriver;
use crate::OperationError;
use crate::PoolTask;
use crate::Preparer;
use crate::Result;
use crate::SystemError;
use crate::ThreadPool;

/// Single-node consensus: assigns OpIds locally and commits on demand (or immediately
/// when `auto_commit` is set).
pub struct LocalConsensus {
    term: u64,
    next_index: Mutex<u64>,
    auto_commit: AtomicBool,
    reject: AtomicBool,
    in_flight: Mutex<Vec<Arc<ConsensusRound>>>,
    batches: AtomicUsize,
    proposed: AtomicUsize,
}

impl LocalConsensus {
    pub fn new(term: u64) -> Self {
        Self {
            term,
            next_index: Mutex::new(1),
            auto_commit: AtomicBool::new(false),
            reject: AtomicBool::new(false),
            in_flight: Mutex::new(Vec::new()),
            batches: AtomicUsize::new(0),
            proposed: AtomicUsize::new(0),
        }
    }

    pub fn auto_commit(
        self,
        enabled: bool,
    ) -> Self {
        self.auto_commit.store(enabled, Ordering::SeqCst);
        self
    }

    /// Makes the next submissions fail as if leadership was lost.
    pub fn reject_submissions(
        &self,
        reject: bool,
    ) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Number of `replicate_batch` calls, including rejected ones.
    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// Rounds accepted so far.
    pub fn proposed(&self) -> usize {
        self.proposed.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Commits every accepted round, in log order. Returns how many were committed.
    pub fn commit_all(&self) -> usize {
        let rounds = std::mem::take(&mut *self.in_flight.lock());
        for round in &rounds {
            round.notify_replication_finished(Ok(()));
        }
        rounds.len()
    }

    /// Fails every accepted round, as after a leader change.
    pub fn fail_all(
        &self,
        msg: &str,
    ) -> usize {
        let rounds = std::mem::take(&mut *self.in_flight.lock());
        for round in &rounds {
            round.notify_replication_finished(Err(OperationError::ReplicationFailed(msg.to_string()).into()));
        }
        rounds.len()
    }
}

impl Consensus for LocalConsensus {
    fn replicate_batch(
        &self,
        rounds: &[Arc<ConsensusRound>],
    ) -> Result<()> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            return Err(OperationError::NotLeader {
                leader_hint: Some("peer-2".to_string()),
            }
            .into());
        }

        for round in rounds {
            let op_id = {
                let mut next_index = self.next_index.lock();
                let op_id = OpId::new(self.term, *next_index);
                *next_index += 1;
                op_id
            };
            round.bind_to_op_id(op_id)?;
            round.notify_added_to_leader();
            self.in_flight.lock().push(round.clone());
            self.proposed.fetch_add(1, Ordering::SeqCst);
        }

        if self.auto_commit.load(Ordering::SeqCst) {
            self.commit_all();
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingLog {
    records: Mutex<Vec<CommitRecord>>,
    fail: AtomicBool,
}

impl RecordingLog {
    pub fn records(&self) -> Vec<CommitRecord> {
        self.records.lock().clone()
    }

    pub fn fail_appends(
        &self,
        fail: bool,
    ) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Log for RecordingLog {
    fn append_commit(
        &self,
        record: CommitRecord,
    ) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SystemError::LogAppend("disk full".to_string()).into());
        }
        self.records.lock().push(record);
        Ok(())
    }
}

/// Preparer that only queues drivers; the test decides when and how they run.
#[derive(Default)]
pub struct RecordingPreparer {
    submitted: Mutex<Vec<Arc<OperationDriver>>>,
    stopped: AtomicBool,
}

impl RecordingPreparer {
    pub fn take(&self) -> Vec<Arc<OperationDriver>> {
        std::mem::take(&mut *self.submitted.lock())
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

impl Preparer for RecordingPreparer {
    fn submit(
        &self,
        driver: Arc<OperationDriver>,
    ) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SystemError::PreparerStopped.into());
        }
        self.submitted.lock().push(driver);
        Ok(())
    }
}

/// Runs every task on the submitting thread.
#[derive(Default)]
pub struct InlinePool {
    submitted: AtomicUsize,
}

impl InlinePool {
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

impl ThreadPool for InlinePool {
    fn submit(
        &self,
        task: PoolTask,
    ) -> Result<()> {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        task();
        Ok(())
    }
}

/// Queues tasks until the test runs them.
#[derive(Default)]
pub struct ManualPool {
    tasks: Mutex<VecDeque<PoolTask>>,
    submitted: AtomicUsize,
    reject: AtomicBool,
}

impl ManualPool {
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    pub fn queued(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn reject_submissions(
        &self,
        reject: bool,
    ) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Runs queued tasks (and whatever they enqueue) until the queue is empty.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.tasks.lock().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl ThreadPool for ManualPool {
    fn submit(
        &self,
        task: PoolTask,
    ) -> Result<()> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(SystemError::QueueFull {
                pool: "manual".to_string(),
                capacity: 0,
            }
            .into());
        }
        self.submitted.fetch_add(1, Ordering::SeqCst);
        self.tasks.lock().push_back(task);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMvcc {
    safe_times: Mutex<Vec<HybridTime>>,
}

impl RecordingMvcc {
    pub fn safe_times(&self) -> Vec<HybridTime> {
        self.safe_times.lock().clone()
    }
}

impl MvccManager for RecordingMvcc {
    fn set_propagated_safe_time(
        &self,
        safe_time: HybridTime,
    ) {
        self.safe_times.lock().push(safe_time);
    }
}
