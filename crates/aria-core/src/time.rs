//! Host time utilities
//!
//! Conversions between a monotonic host tick counter and wall-clock seconds,
//! used to stamp buffers as they move through a render pass. Ticks count
//! nanoseconds from a process-wide origin that is captured on first use.

use std::sync::OnceLock;
use std::time::Instant;

/// Monotonic host time, in ticks
pub type HostTicks = u64;

/// Time in seconds
pub type Seconds = f64;

const TICKS_PER_SECOND: f64 = 1_000_000_000.0;

/// Origin for the tick counter, captured once per process
static ORIGIN: OnceLock<Instant> = OnceLock::new();

fn origin() -> Instant {
    *ORIGIN.get_or_init(Instant::now)
}

/// Capture the tick origin now instead of on first use
///
/// Optional; call during setup if the first timestamp must not pay the
/// one-time initialization cost on the render thread.
pub fn init() {
    let _ = origin();
}

/// Current global timestamp, in host ticks
#[inline]
pub fn current_host_ticks() -> HostTicks {
    origin().elapsed().as_nanos() as HostTicks
}

/// Current global timestamp, in seconds
#[inline]
pub fn current_time_seconds() -> Seconds {
    seconds_from_host_ticks(current_host_ticks())
}

/// Convert time in seconds to host ticks
#[inline]
pub fn host_ticks_from_seconds(seconds: Seconds) -> HostTicks {
    (seconds * TICKS_PER_SECOND).round() as HostTicks
}

/// Convert time in host ticks to seconds
#[inline]
pub fn seconds_from_host_ticks(ticks: HostTicks) -> Seconds {
    ticks as Seconds / TICKS_PER_SECOND
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_conversion() {
        let ticks = host_ticks_from_seconds(1.5);
        assert_eq!(ticks, 1_500_000_000);
        assert!((seconds_from_host_ticks(ticks) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_ticks_monotonic() {
        let a = current_host_ticks();
        let b = current_host_ticks();
        assert!(b >= a);
    }

    #[test]
    fn test_current_seconds_advances() {
        let a = current_time_seconds();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = current_time_seconds();
        assert!(b > a);
    }
}
