//! Two-buffer-list mixing with channel reconciliation
//!
//! Mixing sums two lists into an output after scaling each by its gain.
//! Channel counts are reconciled rather than assumed equal: a mono input
//! feeding a wider output has its single channel duplicated into every
//! output channel (upmix), and inputs wider than a mono output have their
//! extra channels summed in (downmix). The output may alias either input;
//! accumulating in place is the common case on the buffer stack.

use crate::buffer::{BufferList, ChannelBuffer};
use crate::types::Sample;

/// Mix two buffer lists into `output`
///
/// Each output sample is `gain_a * a + gain_b * b` for the reconciled input
/// channels. `mono_to_stereo` enables the mono-duplication upmix; with it
/// off, a mono input only feeds output channel 0. A `frames` of 0 processes
/// the whole span the lists describe. `output` may be the same list as
/// either input.
pub fn mix(
    list_a: &BufferList,
    list_b: &BufferList,
    gain_a: Sample,
    gain_b: Sample,
    mono_to_stereo: bool,
    frames: u32,
    output: &BufferList,
) {
    let frames = if frames == 0 {
        list_a.frame_count().min(list_b.frame_count()).min(output.frame_count())
    } else {
        frames
    };
    let out_channels = output.channel_count();

    for ch in 0..out_channels {
        let Some(out) = output.channel_buffer(ch) else { continue };
        if out.is_empty() {
            continue;
        }
        let a = source_channel(list_a, ch, out_channels, mono_to_stereo);
        let b = source_channel(list_b, ch, out_channels, mono_to_stereo);
        mix_channel(out, a, gain_a, b, gain_b, frames);
    }

    if out_channels == 1 {
        // Downmix: fold the inputs' extra channels into the mono output
        if let Some(out) = output.channel_buffer(0) {
            for ch in 1..list_a.channel_count() {
                if let Some(src) = list_a.channel_buffer(ch) {
                    accumulate_channel(out, src, gain_a, frames);
                }
            }
            for ch in 1..list_b.channel_count() {
                if let Some(src) = list_b.channel_buffer(ch) {
                    accumulate_channel(out, src, gain_b, frames);
                }
            }
        }
    }
}

/// The input channel feeding output channel `ch`, if any
fn source_channel(
    list: &BufferList,
    ch: usize,
    out_channels: usize,
    mono_to_stereo: bool,
) -> Option<ChannelBuffer> {
    let buffer = if list.channel_count() == 1 && out_channels > 1 {
        if mono_to_stereo {
            list.channel_buffer(0)
        } else if ch == 0 {
            list.channel_buffer(0)
        } else {
            None
        }
    } else {
        list.channel_buffer(ch)
    };
    buffer.filter(|buffer| !buffer.is_empty())
}

/// `out = gain_a * a + gain_b * b`, handling every aliasing combination
fn mix_channel(
    out: ChannelBuffer,
    a: Option<ChannelBuffer>,
    gain_a: Sample,
    b: Option<ChannelBuffer>,
    gain_b: Sample,
    frames: u32,
) {
    let mut frames = frames.min(out.frame_count());
    if let Some(a) = &a {
        frames = frames.min(a.frame_count());
    }
    if let Some(b) = &b {
        frames = frames.min(b.frame_count());
    }

    // Only one live mutable view per region: pick the loop by aliasing
    unsafe {
        match (a, b) {
            (Some(a), Some(b)) => {
                let a_aliases = a.data == out.data;
                let b_aliases = b.data == out.data;
                let samples = out.as_mut_slice(frames);
                if a_aliases && b_aliases {
                    for s in samples {
                        *s *= gain_a + gain_b;
                    }
                } else if b_aliases {
                    let a = a.as_slice(frames);
                    for (s, &x) in samples.iter_mut().zip(a) {
                        *s = gain_a * x + gain_b * *s;
                    }
                } else if a_aliases {
                    let b = b.as_slice(frames);
                    for (s, &x) in samples.iter_mut().zip(b) {
                        *s = gain_a * *s + gain_b * x;
                    }
                } else {
                    let a = a.as_slice(frames);
                    let b = b.as_slice(frames);
                    for ((s, &x), &y) in samples.iter_mut().zip(a).zip(b) {
                        *s = gain_a * x + gain_b * y;
                    }
                }
            }
            (Some(a), None) => scale_into(out, a, gain_a, frames),
            (None, Some(b)) => scale_into(out, b, gain_b, frames),
            (None, None) => {
                for s in out.as_mut_slice(frames) {
                    *s = 0.0;
                }
            }
        }
    }
}

/// `out = gain * src`, alias-aware
unsafe fn scale_into(out: ChannelBuffer, src: ChannelBuffer, gain: Sample, frames: u32) {
    let samples = out.as_mut_slice(frames);
    if src.data == out.data {
        for s in samples {
            *s *= gain;
        }
    } else {
        let src = src.as_slice(frames);
        for (s, &x) in samples.iter_mut().zip(src) {
            *s = gain * x;
        }
    }
}

/// `out += gain * src` for a downmixed extra channel
fn accumulate_channel(out: ChannelBuffer, src: ChannelBuffer, gain: Sample, frames: u32) {
    if src.is_empty() || src.data == out.data {
        return;
    }
    let frames = frames.min(out.frame_count()).min(src.frame_count());
    unsafe {
        let samples = out.as_mut_slice(frames);
        let src = src.as_slice(frames);
        for (s, &x) in samples.iter_mut().zip(src) {
            *s += gain * x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::OwnedBufferList;
    use crate::types::AudioFormat;

    fn constant(channels: u32, frames: u32, value: Sample) -> OwnedBufferList {
        let mut list =
            OwnedBufferList::allocate(&AudioFormat::with_channels_and_rate(channels, 48000.0), frames);
        for ch in 0..channels as usize {
            list.channel_mut(ch).unwrap().fill(value);
        }
        list
    }

    #[test]
    fn test_mix_into_separate_output() {
        let a = constant(1, 8, 0.25);
        let b = constant(1, 8, 0.5);
        let out = constant(1, 8, 0.0);

        mix(a.list(), b.list(), 1.0, 1.0, false, 8, out.list());
        assert!(out.channel(0).unwrap().iter().all(|&s| (s - 0.75).abs() < 1e-6));
    }

    #[test]
    fn test_mix_with_gains() {
        let a = constant(1, 8, 1.0);
        let b = constant(1, 8, 1.0);
        let out = constant(1, 8, 0.0);

        mix(a.list(), b.list(), 0.5, 0.25, false, 8, out.list());
        assert!(out.channel(0).unwrap().iter().all(|&s| (s - 0.75).abs() < 1e-6));
    }

    #[test]
    fn test_mix_accumulates_in_place() {
        let a = constant(1, 8, 0.25);
        let out = constant(1, 8, 0.5);

        // The output aliases the second input: the stack's accumulate shape
        mix(a.list(), out.list(), 1.0, 1.0, false, 8, out.list());
        assert!(out.channel(0).unwrap().iter().all(|&s| (s - 0.75).abs() < 1e-6));
    }

    #[test]
    fn test_mono_upmix_duplicates_channel() {
        let mono = constant(1, 8, 0.5);
        let silent = constant(2, 8, 0.0);
        let out = constant(2, 8, 0.0);

        mix(mono.list(), silent.list(), 1.0, 1.0, true, 8, out.list());
        assert!(out.channel(0).unwrap().iter().all(|&s| s == 0.5));
        assert!(out.channel(1).unwrap().iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_mono_without_upmix_feeds_first_channel_only() {
        let mono = constant(1, 8, 0.5);
        let silent = constant(2, 8, 0.0);
        let out = constant(2, 8, 1.0);

        mix(mono.list(), silent.list(), 1.0, 1.0, false, 8, out.list());
        assert!(out.channel(0).unwrap().iter().all(|&s| s == 0.5));
        assert!(out.channel(1).unwrap().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_stereo_downmix_to_mono() {
        let stereo = constant(2, 8, 0.25);
        let silent = constant(1, 8, 0.0);
        let out = constant(1, 8, 0.0);

        mix(stereo.list(), silent.list(), 1.0, 1.0, true, 8, out.list());
        // Both stereo channels fold into the mono output
        assert!(out.channel(0).unwrap().iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_zero_frames_uses_described_length() {
        let a = constant(1, 8, 1.0);
        let b = constant(1, 8, 1.0);
        let out = constant(1, 8, 0.0);

        mix(a.list(), b.list(), 1.0, 1.0, false, 0, out.list());
        assert!(out.channel(0).unwrap().iter().all(|&s| s == 2.0));
    }
}
