use super::*;

#[test]
fn test_error_fatal() {
    let err = Error::Fatal("apply failed after commit".to_string());
    assert_eq!(err.to_string(), "Fatal error: apply failed after commit");
    assert!(err.is_fatal());
}

#[test]
fn test_operation_error_is_not_fatal() {
    let err: Error = OperationError::Aborted("client went away".to_string()).into();
    assert!(!err.is_fatal());
    assert_eq!(err.to_string(), "Operation aborted: client went away");
}

#[test]
fn test_state_transition_error_invalid_replication_transition() {
    let err = StateTransitionError::InvalidReplicationTransition {
        from: ReplicationState::NotReplicating,
        to: ReplicationState::Replicated,
    };
    assert_eq!(err.to_string(), "Invalid replication state transition NR -> RD.");
}

#[test]
fn test_state_transition_error_op_id_regression() {
    let err = StateTransitionError::OpIdRegression {
        current: OpId::new(2, 10),
        received: OpId::new(2, 9),
    };
    let msg = err.to_string();
    assert!(msg.contains("2.10"));
    assert!(msg.contains("2.9"));
}

#[test]
fn test_system_error_queue_full() {
    let err = SystemError::QueueFull {
        pool: "apply".to_string(),
        capacity: 8,
    };
    assert_eq!(err.to_string(), "apply pool queue is full (capacity 8)");
}

#[test]
fn test_memory_limit_exceeded() {
    let err = OperationError::MemoryLimitExceeded {
        requested: 100,
        in_use: 950,
        limit: 1000,
    };
    let msg = err.to_string();
    assert!(msg.contains("requested 100"));
    assert!(msg.contains("limit 1000"));
}

#[test]
fn test_ordering_error_conversion() {
    let err: Error = OrderingError::OutOfOrderApply {
        previous: 5,
        current: 4,
    }
    .into();
    assert!(matches!(err, Error::Ordering(OrderingError::OutOfOrderApply { .. })));
}

#[test]
fn test_io_error_conversion() {
    let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into();
    assert!(matches!(err, Error::System(SystemError::Io(_))));
}
