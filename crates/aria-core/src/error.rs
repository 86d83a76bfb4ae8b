//! Error types for the audio core
//!
//! Setup-time (control thread) failures carry detail through
//! [`ConfigurationError`]. Render-thread operations never unwind: fallible
//! calls there return sentinel values (`None`, or [`CapacityExceeded`]) and
//! the affected cycle's audio is dropped rather than crashing the stream.

use thiserror::Error;

/// Errors detected while configuring the engine core
///
/// These are recoverable: adjust the offending parameter and retry setup.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// Pool size must leave room for at least one buffer list
    #[error("Invalid buffer pool size: {0}")]
    InvalidPoolSize(usize),

    /// Channel count is zero or above the compile-time cap
    #[error("Invalid channel count: {requested} (supported range 1-{max})")]
    InvalidChannelCount { requested: usize, max: usize },

    /// Mono buffer count cannot cover a single buffer list
    #[error("Too few single-channel buffers: {buffers} for {channels} channels per list")]
    InsufficientBuffers { buffers: usize, channels: usize },

    /// Frames-per-slice capacity must be non-zero
    #[error("Invalid frame capacity: {0}")]
    InvalidFrameCapacity(u32),
}

/// Result type for setup operations
pub type ConfigResult<T> = Result<T, ConfigurationError>;

/// A real-time request exceeded preallocated capacity
///
/// Returned as a sentinel from render-thread calls; never unwinds. The
/// request is not retried within the cycle.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Request exceeds preallocated capacity")]
pub struct CapacityExceeded;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ConfigurationError::InvalidChannelCount { requested: 12, max: 8 };
        assert_eq!(err.to_string(), "Invalid channel count: 12 (supported range 1-8)");

        let err = ConfigurationError::InvalidPoolSize(0);
        assert!(err.to_string().contains("pool size"));

        assert_eq!(CapacityExceeded.to_string(), "Request exceeds preallocated capacity");
    }
}
