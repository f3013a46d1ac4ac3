use once_cell::sync::Lazy;
use std::time::Instant;

static START: Lazy<Instant> = Lazy::new(Instant::now);

/// Milliseconds on a process-wide monotonic clock. Every deadline in the
/// server (TTL and idle alike) is expressed on this clock.
pub(crate) fn monotonic_ms() -> u64 {
    START.elapsed().as_millis() as u64
}
