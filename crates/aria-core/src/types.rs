//! Common types for the audio core
//!
//! This module contains the fundamental audio types used throughout the
//! engine: the sample type, stream formats, timestamps, channel sets and
//! the weak host-object handle used at the render boundary.

use std::sync::{Arc, Weak};

use crate::time::HostTicks;

/// Default sample rate (48kHz - standard professional audio rate)
/// This is the default; the actual rate is supplied by the I/O layer per cycle.
pub const DEFAULT_SAMPLE_RATE: f64 = 48000.0;

/// Default channel count (stereo)
pub const DEFAULT_CHANNEL_COUNT: u32 = 2;

/// Maximum channels a single buffer list can describe
///
/// Buffer lists are plain value types sized by this cap so they can live on
/// the stack of a render callback without heap allocation.
pub const MAX_CHANNELS_PER_BUFFER: usize = 8;

/// Audio sample type (32-bit float, non-interleaved, one buffer per channel)
pub type Sample = f32;

/// Stream format descriptor
///
/// The canonical format throughout the engine is non-interleaved 32-bit
/// float PCM; this descriptor only varies the rate and channel count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFormat {
    /// Sample rate in Hertz
    pub sample_rate: f64,
    /// Number of channels (one sample buffer per channel)
    pub channel_count: u32,
}

impl AudioFormat {
    /// Create a format with the given channel count and sample rate
    pub fn with_channels_and_rate(channel_count: u32, sample_rate: f64) -> Self {
        Self { sample_rate, channel_count }
    }

    /// Bytes per frame for a single channel buffer
    #[inline]
    pub fn bytes_per_frame(&self) -> u32 {
        std::mem::size_of::<Sample>() as u32
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channel_count: DEFAULT_CHANNEL_COUNT,
        }
    }
}

/// Timestamp for a span of audio
///
/// Carries both a host tick value and a running sample time; either may be
/// absent, mirroring what hardware I/O layers actually report.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioTimestamp {
    /// Time in samples since the stream started
    pub sample_time: f64,
    /// Time in host ticks
    pub host_ticks: HostTicks,
    /// Whether `sample_time` carries a meaningful value
    pub sample_time_valid: bool,
    /// Whether `host_ticks` carries a meaningful value
    pub host_ticks_valid: bool,
}

impl AudioTimestamp {
    /// An empty timestamp
    pub const NONE: AudioTimestamp = AudioTimestamp {
        sample_time: 0.0,
        host_ticks: 0,
        sample_time_valid: false,
        host_ticks_valid: false,
    };

    /// Create a timestamp from a host ticks value
    ///
    /// A zero tick value yields [`AudioTimestamp::NONE`].
    pub fn with_host_ticks(ticks: HostTicks) -> Self {
        if ticks == 0 {
            return Self::NONE;
        }
        Self {
            host_ticks: ticks,
            host_ticks_valid: true,
            ..Self::NONE
        }
    }

    /// Create a timestamp from a sample time value
    pub fn with_sample_time(samples: f64) -> Self {
        Self {
            sample_time: samples,
            sample_time_valid: true,
            ..Self::NONE
        }
    }

    /// Create a timestamp carrying both host ticks and sample time
    pub fn with_host_ticks_and_samples(ticks: HostTicks, samples: f64) -> Self {
        Self {
            sample_time: samples,
            host_ticks: ticks,
            sample_time_valid: true,
            host_ticks_valid: ticks != 0,
        }
    }
}

/// A contiguous range of channels within a buffer list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSet {
    /// Index of the first channel of the set
    pub first: usize,
    /// Index of the last channel of the set (inclusive)
    pub last: usize,
}

impl ChannelSet {
    /// Create a channel set covering `first..=last`
    pub fn new(first: usize, last: usize) -> Self {
        Self { first, last }
    }

    /// Number of channels in the set
    #[inline]
    pub fn len(&self) -> usize {
        self.last.saturating_sub(self.first) + 1
    }

    /// Whether the set is degenerate
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.last < self.first
    }
}

impl Default for ChannelSet {
    /// The default stereo channel set (channels 0 and 1)
    fn default() -> Self {
        Self { first: 0, last: 1 }
    }
}

/// Non-owning handle to a host object
///
/// Render-side code must never keep a host object alive; this handle makes
/// "the host object is gone" a normal, checked outcome rather than a crash.
/// Upgrade to a strong reference only on the control thread.
#[derive(Debug)]
pub struct WeakHandle<T> {
    target: Weak<T>,
}

impl<T> WeakHandle<T> {
    /// Create a handle from a strong reference
    pub fn new(target: &Arc<T>) -> Self {
        Self { target: Arc::downgrade(target) }
    }

    /// Whether the target is still alive
    pub fn is_live(&self) -> bool {
        self.target.strong_count() > 0
    }

    /// Upgrade to a strong reference, if the target is still alive
    pub fn upgrade(&self) -> Option<Arc<T>> {
        self.target.upgrade()
    }
}

impl<T> Clone for WeakHandle<T> {
    fn clone(&self) -> Self {
        Self { target: self.target.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_format() {
        let format = AudioFormat::default();
        assert_eq!(format.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(format.channel_count, 2);
        assert_eq!(format.bytes_per_frame(), 4);
    }

    #[test]
    fn test_timestamp_constructors() {
        let none = AudioTimestamp::with_host_ticks(0);
        assert_eq!(none, AudioTimestamp::NONE);
        assert!(!none.host_ticks_valid);

        let ts = AudioTimestamp::with_host_ticks(1234);
        assert!(ts.host_ticks_valid);
        assert!(!ts.sample_time_valid);
        assert_eq!(ts.host_ticks, 1234);

        let ts = AudioTimestamp::with_sample_time(256.0);
        assert!(ts.sample_time_valid);
        assert_eq!(ts.sample_time, 256.0);
    }

    #[test]
    fn test_channel_set() {
        let set = ChannelSet::default();
        assert_eq!(set.len(), 2);
        assert_eq!(set.first, 0);
        assert_eq!(set.last, 1);

        let mono = ChannelSet::new(3, 3);
        assert_eq!(mono.len(), 1);
    }

    #[test]
    fn test_weak_handle() {
        let target = Arc::new(42usize);
        let handle = WeakHandle::new(&target);
        assert!(handle.is_live());
        assert_eq!(handle.upgrade().map(|v| *v), Some(42));

        drop(target);
        assert!(!handle.is_live());
        assert!(handle.upgrade().is_none());
    }
}
