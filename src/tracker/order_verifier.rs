use parking_lot::Mutex;
use tracing::error;

use super::OperationOrderVerifier;
use crate::OrderingError;
use crate::Result;

/// Verifies that operations are applied in the order they were prepared.
///
/// Prepare times are monotonic-clock micros. Requires single-worker prepare and apply pools;
/// with more, the pools are free to reorder tasks and this check will report it.
#[derive(Debug, Default)]
pub struct DefaultOrderVerifier {
    // (index, prepare time in us) of the last applied operation
    last: Mutex<Option<(u64, u64)>>,
}

impl DefaultOrderVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_applied_index(&self) -> Option<u64> {
        self.last.lock().map(|(index, _)| index)
    }
}

impl OperationOrderVerifier for DefaultOrderVerifier {
    fn check_apply(
        &self,
        op_index: u64,
        prepare_physical_time: u64,
    ) -> Result<()> {
        let mut last = self.last.lock();
        if let Some((prev_index, prev_prepare_time)) = *last {
            if op_index <= prev_index {
                error!("out of order apply: {} after {}", op_index, prev_index);
                return Err(OrderingError::OutOfOrderApply {
                    previous: prev_index,
                    current: op_index,
                }
                .into());
            }
            if prepare_physical_time < prev_prepare_time {
                error!(
                    "apply of {} prepared at {}us after one prepared at {}us",
                    op_index, prepare_physical_time, prev_prepare_time
                );
                return Err(OrderingError::PrepareTimeRegression {
                    previous: prev_prepare_time,
                    current: prepare_physical_time,
                }
                .into());
            }
        }
        *last = Some((op_index, prepare_physical_time));
        Ok(())
    }
}
