//! The buffer stack - an allocation-free workspace for one render cycle
//!
//! A render pass composes audio by pushing intermediate buffers, processing
//! them, and mixing them down - a stack discipline. [`BufferStack`] provides
//! exactly that over a preallocated [`pool`](super::pool): every stack
//! operation is real-time safe, completing in bounded time with no locks and
//! no allocation. Pool exhaustion is a hard per-cycle error surfaced as a
//! sentinel (`None`), never a panic; the affected path drops its audio for
//! the cycle.
//!
//! # Memory reuse
//!
//! Entries return their buffers to the pool in LIFO order, so popping an
//! entry and pushing one of equal channel count yields pointer-identical
//! sample memory. Modules exploit this: a pop-then-push between processing
//! stages costs nothing and preserves buffer contents (popped samples stay
//! in memory until overwritten).
//!
//! # Aliasing
//!
//! No two live entries reference the same pool buffer, with two deliberate
//! exceptions that share data by contract:
//! [`duplicate`](BufferStack::duplicate) (structure copy, shared samples)
//! and [`push_external`](BufferStack::push_external) (caller-owned memory).

use crate::buffer::list::BufferList;
use crate::buffer::pool::BufferPool;
use crate::dsp;
use crate::error::{CapacityExceeded, ConfigResult, ConfigurationError};
use crate::ratelimit::RateLimiter;
use crate::types::{AudioTimestamp, ChannelSet, Sample, MAX_CHANNELS_PER_BUFFER};

/// Default number of buffer-list slots in the pool
pub const DEFAULT_POOL_SIZE: usize = 16;

/// Default channels per pushed buffer (stereo)
pub const DEFAULT_CHANNELS_PER_BUFFER: usize = 2;

/// Default maximum frames per render slice
///
/// Covers the common hardware buffer configurations (64-4096 frames).
pub const DEFAULT_MAX_FRAMES_PER_SLICE: u32 = 4096;

const BYTES_PER_SAMPLE: u32 = std::mem::size_of::<Sample>() as u32;

/// One live stack entry
#[derive(Clone, Copy)]
struct StackEntry {
    list: BufferList,
    timestamp: AudioTimestamp,
    /// Pool buffer indices backing the list's channels
    pool_buffers: [u32; MAX_CHANNELS_PER_BUFFER],
    /// How many of `pool_buffers` this entry owns; 0 for external/duplicate
    pooled_channels: u32,
}

const EMPTY_ENTRY: StackEntry = StackEntry {
    list: BufferList::EMPTY,
    timestamp: AudioTimestamp::NONE,
    pool_buffers: [0; MAX_CHANNELS_PER_BUFFER],
    pooled_channels: 0,
};

/// Stack machine over preallocated audio buffers
///
/// Created once on the control thread (allocates); every other method is
/// render-thread safe. One instance serves one render thread - cycles never
/// overlap, which `&mut self` enforces at compile time.
pub struct BufferStack {
    pool: BufferPool,
    entries: Box<[StackEntry]>,
    top: usize,
    max_channels: usize,
    max_frames: u32,
    frame_count: u32,
    timestamp: AudioTimestamp,
    limiter: RateLimiter,
}

// The pool memory is owned exclusively by this stack; entries reference
// either pool memory or memory the caller contracted to keep valid.
unsafe impl Send for BufferStack {}

impl BufferStack {
    /// Create a stack with default options
    ///
    /// A `pool_size` of 0 selects [`DEFAULT_POOL_SIZE`].
    pub fn new(pool_size: usize) -> ConfigResult<Self> {
        let pool_size = if pool_size == 0 { DEFAULT_POOL_SIZE } else { pool_size };
        Self::with_options(pool_size, DEFAULT_CHANNELS_PER_BUFFER, 0, DEFAULT_MAX_FRAMES_PER_SLICE)
    }

    /// Create a stack, supplying every option
    ///
    /// `single_buffer_count` is the number of mono sample buffers backing
    /// the pool; 0 selects `pool_size * max_channels_per_buffer`. Each is
    /// sized for `max_frames` frames.
    pub fn with_options(
        pool_size: usize,
        max_channels_per_buffer: usize,
        single_buffer_count: usize,
        max_frames: u32,
    ) -> ConfigResult<Self> {
        if pool_size == 0 {
            return Err(ConfigurationError::InvalidPoolSize(pool_size));
        }
        if max_channels_per_buffer == 0 || max_channels_per_buffer > MAX_CHANNELS_PER_BUFFER {
            return Err(ConfigurationError::InvalidChannelCount {
                requested: max_channels_per_buffer,
                max: MAX_CHANNELS_PER_BUFFER,
            });
        }
        if max_frames == 0 {
            return Err(ConfigurationError::InvalidFrameCapacity(max_frames));
        }
        let single_buffer_count = if single_buffer_count == 0 {
            pool_size * max_channels_per_buffer
        } else {
            single_buffer_count
        };
        if single_buffer_count < max_channels_per_buffer {
            return Err(ConfigurationError::InsufficientBuffers {
                buffers: single_buffer_count,
                channels: max_channels_per_buffer,
            });
        }

        log::debug!(
            "buffer stack: {} slots, {} mono buffers x {} frames",
            pool_size,
            single_buffer_count,
            max_frames
        );
        Ok(Self {
            pool: BufferPool::new(single_buffer_count, max_frames),
            entries: vec![EMPTY_ENTRY; pool_size].into_boxed_slice(),
            top: 0,
            max_channels: max_channels_per_buffer,
            max_frames,
            frame_count: 0,
            timestamp: AudioTimestamp::NONE,
            limiter: RateLimiter::default(),
        })
    }

    // ------------------------------------------------------------------
    // Per-cycle configuration
    // ------------------------------------------------------------------

    /// Set the frame count for subsequently pushed buffers
    ///
    /// Fails (and leaves the previous count) if `frames` exceeds the
    /// preallocated frames-per-slice capacity.
    pub fn set_frame_count(&mut self, frames: u32) -> Result<(), CapacityExceeded> {
        if frames > self.max_frames {
            if self.limiter.allow() {
                log::error!(
                    "frame count {} exceeds buffer stack capacity {}",
                    frames,
                    self.max_frames
                );
            }
            return Err(CapacityExceeded);
        }
        self.frame_count = frames;
        Ok(())
    }

    /// The frame count for newly pushed buffers
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Set the timestamp for the current cycle
    ///
    /// Captured by each subsequently pushed entry; see
    /// [`timestamp_for_buffer`](BufferStack::timestamp_for_buffer) for
    /// per-entry overrides.
    pub fn set_timestamp(&mut self, timestamp: AudioTimestamp) {
        self.timestamp = timestamp;
    }

    /// The timestamp for the current cycle
    pub fn timestamp(&self) -> &AudioTimestamp {
        &self.timestamp
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Number of buffer-list slots in the pool
    pub fn pool_size(&self) -> usize {
        self.entries.len()
    }

    /// Maximum channels per pushed buffer
    pub fn max_channels_per_buffer(&self) -> usize {
        self.max_channels
    }

    /// Number of entries currently on the stack
    pub fn count(&self) -> usize {
        self.top
    }

    /// The entry at `index`, where 0 is the most recently pushed
    pub fn get(&self, index: usize) -> Option<&BufferList> {
        let position = self.top.checked_sub(1 + index)?;
        Some(&self.entries[position].list)
    }

    // ------------------------------------------------------------------
    // Stack operations (render thread)
    // ------------------------------------------------------------------

    /// Push `count` buffers with the default channel count
    ///
    /// Returns the first (deepest) of the new entries, or `None` if the
    /// pool cannot satisfy the request.
    pub fn push(&mut self, count: usize) -> Option<&BufferList> {
        self.push_with_channels(count, DEFAULT_CHANNELS_PER_BUFFER.min(self.max_channels))
    }

    /// Push `count` buffers of `channels` mono buffers each
    ///
    /// Pool exhaustion - slots or sample buffers - returns `None` and logs
    /// (rate limited); the stack is left unchanged.
    pub fn push_with_channels(&mut self, count: usize, channels: usize) -> Option<&BufferList> {
        if count == 0 {
            return None;
        }
        if channels == 0 || channels > self.max_channels {
            if self.limiter.allow() {
                log::error!(
                    "pushed channel count {} outside supported range 1-{}",
                    channels,
                    self.max_channels
                );
            }
            return None;
        }
        if self.top + count > self.entries.len() || self.pool.available() < count * channels {
            if self.limiter.allow() {
                log::error!(
                    "buffer stack exhausted: {} of {} slots, {} free buffers, requested {}x{}ch",
                    self.top,
                    self.entries.len(),
                    self.pool.available(),
                    count,
                    channels
                );
            }
            return None;
        }

        let byte_size = self.frame_count * BYTES_PER_SAMPLE;
        for _ in 0..count {
            let mut pool_buffers = [0u32; MAX_CHANNELS_PER_BUFFER];
            let mut list = BufferList::with_channel_count(channels);
            for (ch, slot) in pool_buffers.iter_mut().enumerate().take(channels) {
                let index = self.pool.acquire()?;
                *slot = index;
                let data = self.pool.buffer_ptr(index);
                unsafe {
                    list.set_channel(ch, data, byte_size);
                }
            }
            let entry = &mut self.entries[self.top];
            entry.list = list;
            entry.timestamp = self.timestamp;
            entry.pool_buffers = pool_buffers;
            entry.pooled_channels = channels as u32;
            self.top += 1;
        }
        Some(&self.entries[self.top - count].list)
    }

    /// Push a shallow copy of an externally allocated buffer list
    ///
    /// The list structure is copied; the sample memory is not. The caller
    /// must keep that memory valid and untouched (except through the stack)
    /// for the remainder of the cycle.
    pub fn push_external(&mut self, list: &BufferList) -> Option<&BufferList> {
        if self.top >= self.entries.len() {
            if self.limiter.allow() {
                log::error!("buffer stack exhausted: no slot for external buffer");
            }
            return None;
        }
        let entry = &mut self.entries[self.top];
        entry.list = *list;
        entry.timestamp = self.timestamp;
        entry.pooled_channels = 0;
        self.top += 1;
        Some(&self.entries[self.top - 1].list)
    }

    /// Push a structural copy of the top entry
    ///
    /// The new entry shares the original's sample memory - writes through
    /// one are visible through the other. Copy-on-write is not provided;
    /// callers needing isolation must push a fresh buffer and copy.
    pub fn duplicate(&mut self) -> Option<&BufferList> {
        if self.top == 0 || self.top >= self.entries.len() {
            if self.top > 0 && self.limiter.allow() {
                log::error!("buffer stack exhausted: no slot to duplicate into");
            }
            return None;
        }
        let source = self.entries[self.top - 1];
        let entry = &mut self.entries[self.top];
        entry.list = source.list;
        entry.timestamp = source.timestamp;
        entry.pooled_channels = 0;
        self.top += 1;
        Some(&self.entries[self.top - 1].list)
    }

    /// Exchange the top two entries, O(1)
    pub fn swap(&mut self) {
        if self.top >= 2 {
            self.entries.swap(self.top - 1, self.top - 2);
        }
    }

    /// Pop `count` entries, or all of them if `count` is 0
    ///
    /// Pooled buffers return to the pool for reuse; their contents remain
    /// in memory until overwritten by a later push.
    pub fn pop(&mut self, count: usize) {
        let count = if count == 0 { self.top } else { count.min(self.top) };
        for _ in 0..count {
            self.top -= 1;
            let entry = self.entries[self.top];
            // Reverse order keeps the free list LIFO-consistent with push
            for ch in (0..entry.pooled_channels as usize).rev() {
                self.pool.release(entry.pool_buffers[ch]);
            }
        }
    }

    /// Remove the entry at `index` (0 is the top)
    ///
    /// Same memory-reuse guarantee as [`pop`](BufferStack::pop): a removal
    /// followed by a push yields the removed entry's buffers.
    pub fn remove(&mut self, index: usize) {
        let Some(position) = self.top.checked_sub(1 + index) else { return };
        let entry = self.entries[position];
        for ch in (0..entry.pooled_channels as usize).rev() {
            self.pool.release(entry.pool_buffers[ch]);
        }
        for i in position..self.top - 1 {
            self.entries[i] = self.entries[i + 1];
        }
        self.top -= 1;
    }

    /// Mix the top `count` entries into one
    ///
    /// Pops `count` entries and pushes their per-sample sum. The result's
    /// channel count is the maximum among the inputs; mono inputs feeding a
    /// wider result are upmixed by duplication.
    pub fn mix(&mut self, count: usize) -> Option<&BufferList> {
        self.mix_with_gain(count, &[])
    }

    /// Mix the top `count` entries, scaling each by a gain
    ///
    /// `gains[i]` (a linear power ratio; missing entries default to 1.0)
    /// applies to the entry at stack index `i` before summing.
    pub fn mix_with_gain(&mut self, count: usize, gains: &[Sample]) -> Option<&BufferList> {
        if count == 0 || count > self.top {
            return None;
        }
        let frames = self.frame_count;
        for (i, &gain) in gains.iter().enumerate().take(count) {
            if gain != 1.0 {
                let list = self.entries[self.top - 1 - i].list;
                dsp::apply_gain(&list, gain, frames);
            }
        }
        for _ in 1..count {
            // Accumulate into whichever of the top two has more channels
            if self.entries[self.top - 2].list.channel_count()
                < self.entries[self.top - 1].list.channel_count()
            {
                self.swap();
            }
            let top = self.entries[self.top - 1].list;
            let below = self.entries[self.top - 2].list;
            dsp::mix(&top, &below, 1.0, 1.0, true, frames, &below);
            self.pop(1);
        }
        self.get(0)
    }

    /// Apply volume and balance to the top entry, with smoothing
    ///
    /// `current_volume` / `current_balance` are read on input and updated on
    /// output so successive calls ramp continuously; `None` disables
    /// smoothing for that parameter. A mono top entry with nonzero balance
    /// is first upmixed to stereo - balance is meaningless on one channel.
    pub fn apply_faders(
        &mut self,
        target_volume: Sample,
        current_volume: Option<&mut Sample>,
        target_balance: Sample,
        current_balance: Option<&mut Sample>,
    ) {
        if self.top == 0 {
            return;
        }
        let balance_active = target_balance != 0.0
            || current_balance.as_deref().copied().unwrap_or(0.0) != 0.0;
        if balance_active && self.entries[self.top - 1].list.channel_count() == 1 {
            self.upmix_top_to_stereo();
        }
        let frames = self.frame_count;
        let list = self.entries[self.top - 1].list;
        dsp::apply_volume_and_balance(
            &list,
            target_volume,
            current_volume,
            target_balance,
            current_balance,
            frames,
        );
    }

    /// Replace a mono top entry with a stereo one carrying the same audio
    fn upmix_top_to_stereo(&mut self) {
        if self.push_with_channels(1, 2).is_none() {
            // Exhausted: the fader pass proceeds mono, balance inert
            return;
        }
        self.entries[self.top - 1].timestamp = self.entries[self.top - 2].timestamp;
        let source = self.entries[self.top - 2].list;
        let mut target = self.entries[self.top - 1].list;
        if let Some(mono) = source.channel(0) {
            for ch in 0..2 {
                if let Some(out) = target.channel_mut(ch) {
                    let frames = out.len().min(mono.len());
                    out[..frames].copy_from_slice(&mono[..frames]);
                }
            }
        }
        self.swap();
        self.pop(1);
    }

    /// Zero all samples in the top entry
    pub fn silence(&mut self) {
        if self.top == 0 {
            return;
        }
        let mut list = self.entries[self.top - 1].list;
        list.fill_silence(0, 0);
    }

    /// Mix the top `count` entries (0 for all) onto an external buffer list
    ///
    /// Entries stay on the stack; their audio is summed onto whatever
    /// `output` already holds, with the usual mono/stereo reconciliation.
    pub fn mix_to_buffer_list(&self, count: usize, output: &BufferList) {
        let count = if count == 0 { self.top } else { count.min(self.top) };
        for i in 0..count {
            let list = self.entries[self.top - 1 - i].list;
            dsp::mix(&list, output, 1.0, 1.0, true, self.frame_count, output);
        }
    }

    /// Mix entries onto a channel subset of an external buffer list
    ///
    /// As [`mix_to_buffer_list`](BufferStack::mix_to_buffer_list), writing
    /// only to the channels in `channels`.
    pub fn mix_to_buffer_list_channels(
        &self,
        count: usize,
        channels: ChannelSet,
        output: &BufferList,
    ) {
        let subset = output.with_channel_subset(channels);
        self.mix_to_buffer_list(count, &subset);
    }

    /// Mutable per-entry timestamp, where 0 is the top
    ///
    /// Defaults to the stack's cycle-wide timestamp at push time; a producer
    /// can override it to mark one buffer's audio as captured at a different
    /// effective time.
    pub fn timestamp_for_buffer(&mut self, index: usize) -> Option<&mut AudioTimestamp> {
        let position = self.top.checked_sub(1 + index)?;
        Some(&mut self.entries[position].timestamp)
    }

    /// Pop every entry
    pub fn reset(&mut self) {
        self.pop(0);
    }
}
