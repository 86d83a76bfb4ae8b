//! Per-cycle render context
//!
//! The I/O layer invokes the render pass once per hardware buffer with a
//! [`RenderContext`]: the output buffer list to fill, the cycle's frame
//! count, sample rate and timestamp, and the [`BufferStack`] workspace it
//! owns and reuses across cycles. The context is stack-allocated per cycle
//! and never outlives it; every reference in it is borrowed for exactly
//! that span.
//!
//! The render pass's one mandatory call into the core before producing
//! output is [`UpdateGroup::commit_pending_updates`](crate::managed::UpdateGroup::commit_pending_updates).

use crate::buffer::{BufferList, BufferStack};
use crate::types::{AudioTimestamp, ChannelSet};

/// Everything a render pass needs for one cycle
pub struct RenderContext<'a> {
    /// The output buffer list; write here to produce audio
    pub output: &'a BufferList,
    /// Number of frames to render
    pub frames: u32,
    /// Current sample rate, in Hertz
    pub sample_rate: f64,
    /// Timestamp for this cycle
    pub timestamp: &'a AudioTimestamp,
    /// Whether rendering runs faster than realtime (offline)
    pub offline_rendering: bool,
    /// Workspace for generating and processing audio
    pub stack: &'a mut BufferStack,
}

impl RenderContext<'_> {
    /// Mix the top `count` stack entries (0 for all) onto the output
    pub fn mix_to_output(&mut self, count: usize) {
        let output = self.output;
        self.stack.mix_to_buffer_list(count, output);
    }

    /// Mix stack entries onto a channel subset of the output
    ///
    /// With a stereo subset, mono entries are doubled onto both channels;
    /// with a mono subset, wider entries are mixed down.
    pub fn mix_to_output_channels(&mut self, count: usize, channels: ChannelSet) {
        let output = self.output;
        self.stack.mix_to_buffer_list_channels(count, channels, output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::OwnedBufferList;
    use crate::types::{AudioFormat, Sample};

    fn fill_top(stack: &mut BufferStack, value: Sample) {
        let mut list = *stack.get(0).unwrap();
        for ch in 0..list.channel_count() {
            list.channel_mut(ch).unwrap().fill(value);
        }
    }

    #[test]
    fn test_context_mixes_stack_to_output() {
        let mut stack = BufferStack::new(4).unwrap();
        stack.set_frame_count(32).unwrap();
        stack.push_with_channels(1, 2).unwrap();
        fill_top(&mut stack, 0.25);
        stack.push_with_channels(1, 1).unwrap();
        fill_top(&mut stack, 0.5);

        let output = OwnedBufferList::allocate(&AudioFormat::default(), 32);
        let timestamp = AudioTimestamp::with_sample_time(0.0);
        let mut context = RenderContext {
            output: output.list(),
            frames: 32,
            sample_rate: 48000.0,
            timestamp: &timestamp,
            offline_rendering: false,
            stack: &mut stack,
        };

        context.mix_to_output(0);
        context.stack.reset();
        drop(context);

        // Stereo entry plus upmixed mono entry on both channels
        for ch in 0..2 {
            assert!(output.channel(ch).unwrap().iter().all(|&s| (s - 0.75).abs() < 1e-6));
        }
        assert_eq!(stack.count(), 0);
    }

    #[test]
    fn test_context_channel_subset_output() {
        let mut stack = BufferStack::new(4).unwrap();
        stack.set_frame_count(16).unwrap();
        stack.push_with_channels(1, 1).unwrap();
        fill_top(&mut stack, 0.5);

        let output = OwnedBufferList::allocate(
            &AudioFormat::with_channels_and_rate(4, 48000.0),
            16,
        );
        let timestamp = AudioTimestamp::NONE;
        let mut context = RenderContext {
            output: output.list(),
            frames: 16,
            sample_rate: 48000.0,
            timestamp: &timestamp,
            offline_rendering: true,
            stack: &mut stack,
        };

        context.mix_to_output_channels(1, ChannelSet::new(2, 3));
        drop(context);

        assert!(output.channel(0).unwrap().iter().all(|&s| s == 0.0));
        assert!(output.channel(1).unwrap().iter().all(|&s| s == 0.0));
        assert!(output.channel(2).unwrap().iter().all(|&s| s == 0.5));
        assert!(output.channel(3).unwrap().iter().all(|&s| s == 0.5));
    }
}
