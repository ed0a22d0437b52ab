use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::trace;

use super::HybridTime;
use super::OpId;
use super::OperationType;
use crate::ConsensusRound;
use crate::Result;

/// Reply path to the submitting client. Fired at most once.
pub type CompletionSender = oneshot::Sender<Result<OpId>>;
pub type CompletionReceiver = oneshot::Receiver<Result<OpId>>;

/// Request payload plus the bookkeeping the driver threads through the pipeline.
pub struct OperationState {
    request: Bytes,
    op_id: OpId,
    hybrid_time: Option<HybridTime>,
    consensus_round: Option<Arc<ConsensusRound>>,
    completion: Option<CompletionSender>,
}

impl OperationState {
    pub fn new(request: impl Into<Bytes>) -> Self {
        Self {
            request: request.into(),
            op_id: OpId::invalid(),
            hybrid_time: None,
            consensus_round: None,
            completion: None,
        }
    }

    /// Builds a state with a client reply path attached.
    pub fn with_completion(request: impl Into<Bytes>) -> (Self, CompletionReceiver) {
        let (tx, rx) = oneshot::channel();
        let mut state = Self::new(request);
        state.completion = Some(tx);
        (state, rx)
    }

    /// Builds the state of an operation received from the leader.
    pub fn for_replica(
        request: impl Into<Bytes>,
        round: Arc<ConsensusRound>,
    ) -> Self {
        let mut state = Self::new(request);
        state.op_id = round.id();
        state.hybrid_time = round.replicate_msg().hybrid_time;
        state.consensus_round = Some(round);
        state
    }

    pub fn request(&self) -> &Bytes {
        &self.request
    }

    pub fn op_id(&self) -> OpId {
        self.op_id
    }

    pub fn set_op_id(
        &mut self,
        op_id: OpId,
    ) {
        self.op_id = op_id;
    }

    pub fn hybrid_time(&self) -> Option<HybridTime> {
        self.hybrid_time
    }

    pub fn set_hybrid_time(
        &mut self,
        hybrid_time: HybridTime,
    ) {
        self.hybrid_time = Some(hybrid_time);
    }

    pub fn consensus_round(&self) -> Option<&Arc<ConsensusRound>> {
        self.consensus_round.as_ref()
    }

    pub fn set_consensus_round(
        &mut self,
        round: Arc<ConsensusRound>,
    ) {
        self.consensus_round = Some(round);
    }

    /// Estimated in-memory footprint of the request and its bookkeeping.
    pub fn space_used(&self) -> usize {
        std::mem::size_of::<Self>() + self.request.len()
    }

    pub fn has_completion(&self) -> bool {
        self.completion.is_some()
    }

    /// Replies to the client if a reply path exists.
    ///
    /// Returns false when there was nobody to reply to, or the reply was already sent.
    pub fn complete(
        &mut self,
        result: Result<OpId>,
    ) -> bool {
        match self.completion.take() {
            Some(tx) => {
                if tx.send(result).is_err() {
                    trace!("completion receiver for {} already dropped", self.op_id);
                }
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for OperationState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("OperationState")
            .field("op_id", &self.op_id)
            .field("request_len", &self.request.len())
            .field("hybrid_time", &self.hybrid_time)
            .field("has_round", &self.consensus_round.is_some())
            .finish()
    }
}

impl fmt::Display for OperationState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "op_id: {} request: {} bytes", self.op_id, self.request.len())?;
        if let Some(ht) = self.hybrid_time {
            write!(f, " {ht}")?;
        }
        Ok(())
    }
}

/// Entry proposed to consensus for a leader-side operation.
#[derive(Debug, Clone)]
pub struct ReplicateMsg {
    pub op_type: OperationType,
    pub request: Bytes,
    pub hybrid_time: Option<HybridTime>,
}

impl ReplicateMsg {
    pub fn new(
        op_type: OperationType,
        request: Bytes,
    ) -> Self {
        Self {
            op_type,
            request,
            hybrid_time: None,
        }
    }
}

/// Record appended to the log once an operation has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub op_id: OpId,
    pub op_type: OperationType,
    pub hybrid_time: Option<HybridTime>,
}
