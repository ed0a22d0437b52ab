use std::fmt;
use std::sync::Weak;

use parking_lot::Mutex;
use tracing::debug;

use super::ConsensusAppendCallback;
use crate::HybridTime;
use crate::OpId;
use crate::ReplicateMsg;
use crate::Result;
use crate::StateTransitionError;

/// Invoked once consensus knows whether the entry committed.
pub type ReplicatedCallback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// One log entry's trip through consensus.
///
/// The round owns the strong reference to its replicated callback until the callback
/// fires (or is cleared), which is what keeps a driver alive while consensus works on it.
/// The append callback is weak: it must never extend the driver's lifetime.
pub struct ConsensusRound {
    replicate_msg: Mutex<ReplicateMsg>,
    id: Mutex<OpId>,
    replicated_callback: Mutex<Option<ReplicatedCallback>>,
    append_callback: Mutex<Option<Weak<dyn ConsensusAppendCallback>>>,
}

impl ConsensusRound {
    /// Round for a leader-side proposal. The OpId is assigned later by consensus.
    pub fn new(replicate_msg: ReplicateMsg) -> Self {
        Self {
            replicate_msg: Mutex::new(replicate_msg),
            id: Mutex::new(OpId::invalid()),
            replicated_callback: Mutex::new(None),
            append_callback: Mutex::new(None),
        }
    }

    /// Round for an entry received from the leader, already bound to its slot.
    pub fn for_replica(
        replicate_msg: ReplicateMsg,
        op_id: OpId,
    ) -> Self {
        let round = Self::new(replicate_msg);
        *round.id.lock() = op_id;
        round
    }

    pub fn id(&self) -> OpId {
        *self.id.lock()
    }

    pub fn replicate_msg(&self) -> ReplicateMsg {
        self.replicate_msg.lock().clone()
    }

    pub(crate) fn set_hybrid_time(
        &self,
        hybrid_time: HybridTime,
    ) {
        self.replicate_msg.lock().hybrid_time = Some(hybrid_time);
    }

    /// Binds the round to its log slot. A slot is assigned at most once.
    pub fn bind_to_op_id(
        &self,
        op_id: OpId,
    ) -> Result<()> {
        let mut id = self.id.lock();
        if id.is_valid() && *id != op_id {
            return Err(StateTransitionError::OpIdRegression {
                current: *id,
                received: op_id,
            }
            .into());
        }
        *id = op_id;
        Ok(())
    }

    pub fn set_replicated_callback(
        &self,
        callback: ReplicatedCallback,
    ) {
        *self.replicated_callback.lock() = Some(callback);
    }

    pub fn set_append_callback(
        &self,
        callback: Weak<dyn ConsensusAppendCallback>,
    ) {
        *self.append_callback.lock() = Some(callback);
    }

    /// Drops both callbacks so the round no longer references its driver.
    pub(crate) fn clear_callbacks(&self) {
        self.replicated_callback.lock().take();
        self.append_callback.lock().take();
    }

    /// Called by consensus once the entry is in the local log (not yet committed).
    pub fn notify_added_to_leader(&self) {
        let callback = self.append_callback.lock().as_ref().and_then(Weak::upgrade);
        match callback {
            Some(callback) => callback.handle_consensus_append(),
            None => debug!("round {} appended with no live append callback", self.id()),
        }
    }

    /// Called by consensus once the entry committed (Ok) or never will (Err).
    ///
    /// Returns false if the callback was already consumed.
    pub fn notify_replication_finished(
        &self,
        status: Result<()>,
    ) -> bool {
        // Take before invoking: the callback may re-enter the round.
        let callback = self.replicated_callback.lock().take();
        match callback {
            Some(callback) => {
                callback(status);
                true
            }
            None => {
                debug!("round {} finished with no pending callback", self.id());
                false
            }
        }
    }
}

impl fmt::Debug for ConsensusRound {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ConsensusRound")
            .field("id", &self.id())
            .field("op_type", &self.replicate_msg.lock().op_type)
            .field("has_replicated_callback", &self.replicated_callback.lock().is_some())
            .finish()
    }
}
