use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;

use bytes::Bytes;

use super::*;
use crate::OpId;
use crate::OperationType;
use crate::ReplicateMsg;

#[derive(Default)]
struct CountingAppend {
    calls: AtomicUsize,
}

impl ConsensusAppendCallback for CountingAppend {
    fn handle_consensus_append(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn leader_round() -> ConsensusRound {
    ConsensusRound::new(ReplicateMsg::new(OperationType::Write, Bytes::from_static(b"k=v")))
}

#[test]
fn test_leader_round_starts_unbound() {
    let round = leader_round();
    assert!(!round.id().is_valid());

    round.bind_to_op_id(OpId::new(1, 5)).expect("first bind should succeed");
    assert_eq!(round.id(), OpId::new(1, 5));
}

#[test]
fn test_bind_to_op_id_rejects_rebinding_to_another_slot() {
    let round = leader_round();
    round.bind_to_op_id(OpId::new(1, 5)).expect("first bind should succeed");

    // Same slot again is harmless
    assert!(round.bind_to_op_id(OpId::new(1, 5)).is_ok());
    assert!(round.bind_to_op_id(OpId::new(1, 6)).is_err());
    assert_eq!(round.id(), OpId::new(1, 5));
}

#[test]
fn test_replicated_callback_fires_once() {
    let round = leader_round();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    round.set_replicated_callback(Box::new(move |status| {
        assert!(status.is_ok());
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    assert!(round.notify_replication_finished(Ok(())));
    assert!(!round.notify_replication_finished(Ok(())));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_append_callback_is_weak() {
    let round = leader_round();
    let append = Arc::new(CountingAppend::default());
    let weak: Weak<CountingAppend> = Arc::downgrade(&append);
    round.set_append_callback(weak);

    round.notify_added_to_leader();
    assert_eq!(append.calls.load(Ordering::SeqCst), 1);

    drop(append);
    // Must not panic once the target is gone
    round.notify_added_to_leader();
}

#[test]
fn test_clear_callbacks_releases_captured_references() {
    let round = leader_round();
    let captured = Arc::new(());
    let held = captured.clone();
    round.set_replicated_callback(Box::new(move |_| drop(held)));
    assert_eq!(Arc::strong_count(&captured), 2);

    round.clear_callbacks();
    assert_eq!(Arc::strong_count(&captured), 1);
    assert!(!round.notify_replication_finished(Ok(())));
}

#[test]
fn test_set_hybrid_time_updates_replicate_msg() {
    let round = leader_round();
    assert!(round.replicate_msg().hybrid_time.is_none());

    round.set_hybrid_time(crate::HybridTime::new(17));
    assert_eq!(round.replicate_msg().hybrid_time, Some(crate::HybridTime::new(17)));
}
