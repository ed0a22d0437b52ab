use std::sync::OnceLock;
use std::time::Instant;

static MONOTONIC_ANCHOR: OnceLock<Instant> = OnceLock::new();

/// Microseconds elapsed on the monotonic clock since the first call in this process.
///
/// Never goes backwards, whatever happens to the wall clock.
pub(crate) fn get_monotonic_micros() -> u64 {
    MONOTONIC_ANCHOR.get_or_init(Instant::now).elapsed().as_micros() as u64
}
