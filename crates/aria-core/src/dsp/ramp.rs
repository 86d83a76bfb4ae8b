//! Gain ramps
//!
//! A ramp advances the gain by a fixed per-frame step across the buffer.
//! The linear variant is the workhorse; the equal-power variant shapes the
//! same sweep with a quarter-cycle cosine so that the summed power of two
//! complementary ramps stays constant - crossfades hold their loudness
//! instead of dipping at the midpoint.

use std::f32::consts::FRAC_PI_2;

use crate::buffer::BufferList;
use crate::types::Sample;

/// Apply a linear ramp to the list
///
/// Sample `i` is scaled by `start + i * step`, every channel identically.
/// On return `start` holds the gain one step past the last frame, ready for
/// the next buffer.
pub fn apply_ramp(list: &BufferList, start: &mut Sample, step: Sample, frames: u32) {
    for ch in 0..list.channel_count() {
        let Some(buffer) = list.channel_buffer(ch) else { continue };
        if buffer.is_empty() {
            continue;
        }
        let samples = unsafe { buffer.as_mut_slice(frames.min(buffer.frame_count())) };
        let mut gain = *start;
        for sample in samples {
            *sample *= gain;
            gain += step;
        }
    }
    *start += frames as Sample * step;
}

/// Apply an equal-power ramp to the list
///
/// The gain position sweeps linearly as in [`apply_ramp`], but each frame is
/// scaled by `sin(position * pi/2)`, keeping total power constant across a
/// crossfade of complementary ramps.
///
/// `scratch` holds the per-frame curve and must be at least `frames` long;
/// the caller supplies it so concurrent render paths never share a buffer.
pub fn apply_equal_power_ramp(
    list: &BufferList,
    start: &mut Sample,
    step: Sample,
    frames: u32,
    scratch: &mut [Sample],
) {
    debug_assert!(scratch.len() >= frames as usize);
    let frames = (frames as usize).min(scratch.len());

    let curve = &mut scratch[..frames];
    for (i, value) in curve.iter_mut().enumerate() {
        let position = (*start + i as Sample * step).clamp(0.0, 1.0);
        *value = (position * FRAC_PI_2).sin();
    }

    for ch in 0..list.channel_count() {
        let Some(buffer) = list.channel_buffer(ch) else { continue };
        if buffer.is_empty() {
            continue;
        }
        let samples = unsafe { buffer.as_mut_slice((frames as u32).min(buffer.frame_count())) };
        for (sample, gain) in samples.iter_mut().zip(curve.iter()) {
            *sample *= gain;
        }
    }
    *start += frames as Sample * step;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::OwnedBufferList;
    use crate::types::AudioFormat;

    fn ones(channels: u32, frames: u32) -> OwnedBufferList {
        let mut list =
            OwnedBufferList::allocate(&AudioFormat::with_channels_and_rate(channels, 48000.0), frames);
        for ch in 0..channels as usize {
            list.channel_mut(ch).unwrap().fill(1.0);
        }
        list
    }

    #[test]
    fn test_linear_ramp_values() {
        let n = 64;
        let list = ones(2, n);
        let mut start = 0.0;
        apply_ramp(&list, &mut start, 1.0 / n as Sample, n);

        for ch in 0..2 {
            let samples = list.channel(ch).unwrap();
            for (i, &sample) in samples.iter().enumerate() {
                let expected = i as Sample / n as Sample;
                assert!(
                    (sample - expected).abs() < 1e-6,
                    "channel {ch} frame {i}: {sample} != {expected}"
                );
            }
        }
        assert_eq!(start, 1.0);
    }

    #[test]
    fn test_linear_ramp_resumes() {
        let list = ones(1, 32);
        let mut start = 0.5;
        apply_ramp(&list, &mut start, 1.0 / 64.0, 32);
        assert_eq!(start, 1.0);
        assert_eq!(list.channel(0).unwrap()[0], 0.5);
    }

    #[test]
    fn test_equal_power_ramp_midpoint() {
        let n = 64;
        let list = ones(1, n);
        let mut start = 0.0;
        let mut scratch = vec![0.0; n as usize];
        apply_equal_power_ramp(&list, &mut start, 1.0 / n as Sample, n, &mut scratch);

        let samples = list.channel(0).unwrap();
        assert_eq!(samples[0], 0.0);
        // Halfway through the sweep the gain is sin(pi/4) = 0.7071
        assert!((samples[n as usize / 2] - 0.7071).abs() < 1e-3);
        assert!((start - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_equal_power_complementary_ramps_preserve_power() {
        let n = 64;
        let up = ones(1, n);
        let down = ones(1, n);
        let mut scratch = vec![0.0; n as usize];

        let mut up_start = 0.0;
        apply_equal_power_ramp(&up, &mut up_start, 1.0 / n as Sample, n, &mut scratch);
        let mut down_start = 1.0;
        apply_equal_power_ramp(&down, &mut down_start, -1.0 / n as Sample, n, &mut scratch);

        let up_samples = up.channel(0).unwrap();
        let down_samples = down.channel(0).unwrap();
        for i in 0..n as usize {
            let power = up_samples[i] * up_samples[i] + down_samples[i] * down_samples[i];
            assert!((power - 1.0).abs() < 1e-3, "frame {i}: power {power}");
        }
    }
}
