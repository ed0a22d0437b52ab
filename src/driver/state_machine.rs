//! The two automata a driver advances, and the rules for their joint evolution.
//!
//! Everything here is plain data mutated through `&mut self`; the driver calls these
//! methods only while holding its primary lock, which is what makes the apply trigger an
//! atomic check-and-set across both state variables.

use std::fmt;

use crate::DriverType;
use crate::Error;
use crate::OperationError;
use crate::Result;
use crate::StateTransitionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplicationState {
    /// Leader-side, not yet handed to consensus
    #[default]
    NotReplicating,
    Replicating,
    Replicated,
    ReplicationFailed,
}

impl ReplicationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReplicationState::Replicated | ReplicationState::ReplicationFailed)
    }

    pub fn can_transition_to(
        self,
        next: ReplicationState,
    ) -> bool {
        use ReplicationState::*;
        matches!(
            (self, next),
            (NotReplicating, Replicating) | (Replicating, Replicated) | (Replicating, ReplicationFailed)
        )
    }

    pub fn transition_to(
        &mut self,
        next: ReplicationState,
    ) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(StateTransitionError::InvalidReplicationTransition { from: *self, to: next }.into());
        }
        *self = next;
        Ok(())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReplicationState::NotReplicating => "NR",
            ReplicationState::Replicating => "R",
            ReplicationState::Replicated => "RD",
            ReplicationState::ReplicationFailed => "RF",
        }
    }
}

impl fmt::Display for ReplicationState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrepareState {
    #[default]
    NotPrepared,
    Prepared,
}

impl PrepareState {
    pub fn transition_to(
        &mut self,
        next: PrepareState,
    ) -> Result<()> {
        if !(*self == PrepareState::NotPrepared && next == PrepareState::Prepared) {
            return Err(StateTransitionError::InvalidPrepareTransition { from: *self, to: next }.into());
        }
        *self = next;
        Ok(())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PrepareState::NotPrepared => "NP",
            PrepareState::Prepared => "P",
        }
    }
}

impl fmt::Display for PrepareState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the driver must do once preparation completed.
#[derive(Debug)]
pub enum AfterPrepare {
    /// Leader-side: the preparer submits the round to consensus
    AwaitSubmission,
    /// Consensus has not decided yet
    AwaitReplication,
    /// Replication already finished: this call won the apply trigger
    Apply,
    /// Aborted or replication failed while preparing
    Fail(Error),
}

/// What the driver must do once consensus decided.
#[derive(Debug)]
pub enum AfterReplication {
    /// Preparation still running; it will observe the outcome
    AwaitPrepare,
    /// Already prepared: this call won the apply trigger
    Apply,
    Fail(Error),
}

/// State guarded by the driver's primary lock.
#[derive(Debug, Default)]
pub struct DriverState {
    replication: ReplicationState,
    prepare: PrepareState,
    driver_type: Option<DriverType>,
    abort_status: Option<Error>,
    operation_status: Option<Error>,
    apply_triggered: bool,
    // Monotonic micros, see `utils::time::get_monotonic_micros`
    prepare_physical_time: Option<u64>,
}

impl DriverState {
    pub fn replication(&self) -> ReplicationState {
        self.replication
    }

    pub fn prepare(&self) -> PrepareState {
        self.prepare
    }

    pub fn driver_type(&self) -> Option<DriverType> {
        self.driver_type
    }

    pub fn is_initialized(&self) -> bool {
        self.driver_type.is_some()
    }

    pub fn is_leader_side(&self) -> bool {
        self.replication == ReplicationState::NotReplicating
    }

    pub fn abort_requested(&self) -> bool {
        self.abort_status.is_some()
    }

    pub fn apply_triggered(&self) -> bool {
        self.apply_triggered
    }

    /// Physical time (us) at which preparation completed.
    pub fn prepare_physical_time(&self) -> Option<u64> {
        self.prepare_physical_time
    }

    /// Replica operations arrive with replication already under way.
    pub fn initialize(
        &mut self,
        driver_type: DriverType,
    ) -> Result<()> {
        if self.driver_type.is_some() {
            return Err(StateTransitionError::AlreadyInitialized.into());
        }
        if driver_type == DriverType::Replica {
            self.replication.transition_to(ReplicationState::Replicating)?;
        }
        self.driver_type = Some(driver_type);
        Ok(())
    }

    /// Records abort intent. Returns whether it can still take effect.
    ///
    /// The first status wins; later requests only refresh the answer.
    pub fn request_abort(
        &mut self,
        status: Error,
    ) -> bool {
        if self.abort_status.is_none() {
            self.abort_status = Some(status);
        }
        matches!(
            self.replication,
            ReplicationState::NotReplicating | ReplicationState::ReplicationFailed
        )
    }

    /// Fails with the abort status if an abort is pending and still honourable.
    pub fn check_abort(&mut self) -> Result<()> {
        match self.take_effective_abort() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    fn take_effective_abort(&mut self) -> Option<Error> {
        if self.replication == ReplicationState::NotReplicating {
            self.abort_status.take()
        } else {
            None
        }
    }

    pub fn mark_prepared(
        &mut self,
        physical_time: u64,
    ) -> Result<AfterPrepare> {
        self.prepare.transition_to(PrepareState::Prepared)?;
        self.prepare_physical_time = Some(physical_time);

        let next = match self.replication {
            ReplicationState::NotReplicating => match self.take_effective_abort() {
                Some(status) => AfterPrepare::Fail(status),
                None => AfterPrepare::AwaitSubmission,
            },
            ReplicationState::Replicating => AfterPrepare::AwaitReplication,
            ReplicationState::Replicated => {
                self.trigger_apply()?;
                AfterPrepare::Apply
            }
            ReplicationState::ReplicationFailed => AfterPrepare::Fail(self.take_operation_status()),
        };
        Ok(next)
    }

    /// Leader submission: NOT_REPLICATING -> REPLICATING unless an abort got there first.
    pub fn start_replicating(&mut self) -> Result<()> {
        self.check_abort()?;
        self.replication.transition_to(ReplicationState::Replicating)
    }

    /// Submission to consensus was refused; the entry never left this node.
    pub fn set_replication_failed(
        &mut self,
        status: Error,
    ) -> Result<()> {
        self.replication.transition_to(ReplicationState::ReplicationFailed)?;
        self.operation_status = Some(status);
        Ok(())
    }

    pub fn replication_finished(
        &mut self,
        status: Result<()>,
    ) -> Result<AfterReplication> {
        match status {
            Ok(()) => {
                self.replication.transition_to(ReplicationState::Replicated)?;
                if self.prepare == PrepareState::Prepared {
                    self.trigger_apply()?;
                    Ok(AfterReplication::Apply)
                } else {
                    Ok(AfterReplication::AwaitPrepare)
                }
            }
            Err(e) => {
                self.replication.transition_to(ReplicationState::ReplicationFailed)?;
                if self.prepare == PrepareState::Prepared {
                    Ok(AfterReplication::Fail(e))
                } else {
                    self.operation_status = Some(e);
                    Ok(AfterReplication::AwaitPrepare)
                }
            }
        }
    }

    /// Claims the single apply slot. Requires both preconditions.
    pub fn trigger_apply(&mut self) -> Result<()> {
        if self.apply_triggered {
            return Err(StateTransitionError::ApplyAlreadyTriggered.into());
        }
        if self.prepare != PrepareState::Prepared {
            return Err(StateTransitionError::InvalidPrepareTransition {
                from: self.prepare,
                to: PrepareState::Prepared,
            }
            .into());
        }
        if self.replication != ReplicationState::Replicated {
            return Err(StateTransitionError::InvalidReplicationTransition {
                from: self.replication,
                to: ReplicationState::Replicated,
            }
            .into());
        }
        self.apply_triggered = true;
        Ok(())
    }

    /// True while failing the operation back to the client is still safe.
    pub fn failure_is_recoverable(&self) -> bool {
        matches!(
            self.replication,
            ReplicationState::NotReplicating | ReplicationState::ReplicationFailed
        )
    }

    /// Status recorded by an earlier failure, or a generic one.
    pub fn take_operation_status(&mut self) -> Error {
        self.operation_status
            .take()
            .or_else(|| self.abort_status.take())
            .unwrap_or_else(|| OperationError::ReplicationFailed("replication did not complete".to_string()).into())
    }

    /// Compact `NR-NP` style tag used in log prefixes.
    pub fn state_string(&self) -> String {
        format!("{}-{}", self.replication, self.prepare)
    }
}
