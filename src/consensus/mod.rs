//! Consensus seam.
//!
//! The replication protocol itself (election, log matching, quorum) lives outside this
//! crate. The driver only needs two things from it:
//! - a way to propose one or more rounds ([`Consensus::replicate_batch`]);
//! - callbacks on the round when the entry hits the local log and when it commits
//!   (see [`ConsensusRound`]).

mod round;

pub use round::*;

#[cfg(test)]
mod round_test;

use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::Result;

#[cfg_attr(test, automock)]
pub trait Consensus: Send + Sync + 'static {
    /// Starts replication of every round in order.
    ///
    /// An error means none of the rounds left this node.
    fn replicate_batch(
        &self,
        rounds: &[Arc<ConsensusRound>],
    ) -> Result<()>;
}

/// Invoked when a proposed entry has been appended to the local log, before quorum commit.
pub trait ConsensusAppendCallback: Send + Sync {
    fn handle_consensus_append(&self);
}
