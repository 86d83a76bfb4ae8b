//! Gain application and smoothing
//!
//! All gains are linear power ratios, not decibels. The smoothed variants
//! ramp between the previous and target gain to avoid the click a hard gain
//! step produces; callers thread the `current` value through successive
//! calls to keep the ramp continuous across cycles.

use crate::buffer::BufferList;
use crate::types::Sample;

/// Frames a smoothed gain change takes to traverse the full 0-1 range
///
/// At 44.1-48kHz this is short enough to feel immediate and long enough to
/// keep the transition inaudible.
pub const DEFAULT_RAMP_FRAMES: u32 = 128;

/// Scale every sample in the list by `gain`
pub fn apply_gain(list: &BufferList, gain: Sample, frames: u32) {
    if gain == 1.0 {
        return;
    }
    for ch in 0..list.channel_count() {
        let Some(buffer) = list.channel_buffer(ch) else { continue };
        if buffer.is_empty() {
            continue;
        }
        let samples = unsafe { buffer.as_mut_slice(frames.min(buffer.frame_count())) };
        for sample in samples {
            *sample *= gain;
        }
    }
}

/// Scale the list by `target` gain, ramping from `current` to avoid a step
///
/// `current` is read on input and updated on output; pass it back on the
/// next call for a continuous ramp. Uses [`DEFAULT_RAMP_FRAMES`].
pub fn apply_gain_smoothed(list: &BufferList, target: Sample, current: &mut Sample, frames: u32) {
    apply_gain_ramped(list, target, current, frames, DEFAULT_RAMP_FRAMES);
}

/// Scale the list by `target` gain with an explicit ramp duration
///
/// `ramp_frames` is the length of a full 0.0-1.0 transition; smaller gain
/// changes take proportionally fewer frames. If the ramp does not complete
/// within `frames` it continues on the next call.
pub fn apply_gain_ramped(
    list: &BufferList,
    target: Sample,
    current: &mut Sample,
    frames: u32,
    ramp_frames: u32,
) {
    if *current == target {
        apply_gain(list, target, frames);
        return;
    }
    let step = if target > *current { 1.0 } else { -1.0 } / ramp_frames.max(1) as Sample;
    let ramp_len = (((target - *current) / step).ceil() as u32).min(frames) as usize;

    let mut advanced = *current;
    for ch in 0..list.channel_count() {
        let Some(buffer) = list.channel_buffer(ch) else { continue };
        if buffer.is_empty() {
            continue;
        }
        let samples = unsafe { buffer.as_mut_slice(frames.min(buffer.frame_count())) };
        let ramp = ramp_len.min(samples.len());
        let mut gain = *current;
        for sample in &mut samples[..ramp] {
            *sample *= gain;
            gain += step;
        }
        advanced = gain;
        if target != 1.0 {
            for sample in &mut samples[ramp..] {
                *sample *= target;
            }
        }
    }

    let reached = if step > 0.0 { advanced >= target } else { advanced <= target };
    *current = if reached { target } else { advanced };
}

/// Scale a single channel by `target` gain with smoothing
///
/// The mono counterpart of [`apply_gain_smoothed`], for callers working on
/// raw channel slices.
pub fn apply_gain_smoothed_mono(buffer: &mut [Sample], target: Sample, current: &mut Sample) {
    if *current == target {
        if target != 1.0 {
            for sample in buffer {
                *sample *= target;
            }
        }
        return;
    }
    let step = if target > *current { 1.0 } else { -1.0 } / DEFAULT_RAMP_FRAMES as Sample;
    let ramp = (((target - *current) / step).ceil() as usize).min(buffer.len());

    let mut gain = *current;
    for sample in &mut buffer[..ramp] {
        *sample *= gain;
        gain += step;
    }
    let reached = if step > 0.0 { gain >= target } else { gain <= target };
    let gain = if reached { target } else { gain };
    if target != 1.0 {
        for sample in &mut buffer[ramp..] {
            *sample *= target;
        }
    }
    *current = gain;
}

/// Apply volume and balance to the list, with smoothing
///
/// Balance is meaningful for stereo lists: -1.0 pans fully left, 1.0 fully
/// right, by attenuating the opposite channel. Lists with any other channel
/// count get volume only. Passing `None` for `current_volume` or
/// `current_balance` disables smoothing for that parameter; otherwise the
/// value is read on input and updated on output like the other smoothed
/// routines.
pub fn apply_volume_and_balance(
    list: &BufferList,
    target_volume: Sample,
    current_volume: Option<&mut Sample>,
    target_balance: Sample,
    current_balance: Option<&mut Sample>,
    frames: u32,
) {
    let target_balance = target_balance.clamp(-1.0, 1.0);
    if list.channel_count() != 2 {
        // Balance needs a left and a right; apply volume alone
        match current_volume {
            Some(current) => apply_gain_smoothed(list, target_volume, current, frames),
            None => apply_gain(list, target_volume, frames),
        }
        return;
    }

    let target_gains = [
        target_volume * if target_balance > 0.0 { 1.0 - target_balance } else { 1.0 },
        target_volume * if target_balance < 0.0 { 1.0 + target_balance } else { 1.0 },
    ];
    let volume_now = current_volume.as_deref().copied().unwrap_or(target_volume);
    let balance_now = current_balance
        .as_deref()
        .copied()
        .unwrap_or(target_balance)
        .clamp(-1.0, 1.0);
    let mut gains = [
        volume_now * if balance_now > 0.0 { 1.0 - balance_now } else { 1.0 },
        volume_now * if balance_now < 0.0 { 1.0 + balance_now } else { 1.0 },
    ];

    for ch in 0..2 {
        let Some(buffer) = list.channel_buffer(ch) else { continue };
        if buffer.is_empty() {
            continue;
        }
        let samples = unsafe { buffer.as_mut_slice(frames.min(buffer.frame_count())) };
        apply_gain_smoothed_mono(samples, target_gains[ch], &mut gains[ch]);
    }

    // Fold the per-channel gains back into volume/balance for the caller
    if let Some(current) = current_volume {
        *current = gains[0].max(gains[1]);
    }
    if let Some(current) = current_balance {
        *current = if gains[0] == gains[1] || gains[0].max(gains[1]) == 0.0 {
            0.0
        } else if gains[0] < gains[1] {
            1.0 - gains[0] / gains[1]
        } else {
            -(1.0 - gains[1] / gains[0])
        };
    }
}

/// Convert a power ratio to decibels
#[inline]
pub fn ratio_to_decibels(ratio: f64) -> f64 {
    20.0 * ratio.log10()
}

/// Convert decibels to a power ratio
#[inline]
pub fn decibels_to_ratio(decibels: f64) -> f64 {
    10.0_f64.powf(decibels / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::OwnedBufferList;
    use crate::types::AudioFormat;

    fn constant_list(channels: u32, frames: u32, value: Sample) -> OwnedBufferList {
        let mut list =
            OwnedBufferList::allocate(&AudioFormat::with_channels_and_rate(channels, 48000.0), frames);
        for ch in 0..channels as usize {
            list.channel_mut(ch).unwrap().fill(value);
        }
        list
    }

    #[test]
    fn test_apply_gain() {
        let list = constant_list(2, 16, 0.5);
        apply_gain(&list, 2.0, 16);
        assert!(list.channel(0).unwrap().iter().all(|&s| s == 1.0));
        assert!(list.channel(1).unwrap().iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_smoothed_gain_ramps_then_holds() {
        let list = constant_list(1, 256, 1.0);
        let mut current = 0.0;
        apply_gain_smoothed(&list, 1.0, &mut current, 256);
        assert_eq!(current, 1.0);

        let samples = list.channel(0).unwrap();
        assert_eq!(samples[0], 0.0);
        let expected = 64.0 / DEFAULT_RAMP_FRAMES as Sample;
        assert!((samples[64] - expected).abs() < 1e-6);
        assert_eq!(samples[128], 1.0);
        assert_eq!(samples[255], 1.0);
    }

    #[test]
    fn test_ramp_continues_across_calls() {
        let first = constant_list(1, 32, 1.0);
        let mut current = 0.0;
        apply_gain_smoothed(&first, 1.0, &mut current, 32);
        assert!((current - 0.25).abs() < 1e-6);

        let second = constant_list(1, 32, 1.0);
        apply_gain_smoothed(&second, 1.0, &mut current, 32);
        assert!((current - 0.5).abs() < 1e-6);
        assert!((second.channel(0).unwrap()[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_volume_and_balance_unsmoothed() {
        let list = constant_list(2, 16, 1.0);
        apply_volume_and_balance(&list, 0.5, None, 1.0, None, 16);
        // Full right: left silent, right at volume
        assert!(list.channel(0).unwrap().iter().all(|&s| s == 0.0));
        assert!(list.channel(1).unwrap().iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_volume_and_balance_updates_currents() {
        let list = constant_list(2, 4096, 1.0);
        let mut volume = 0.0;
        let mut balance = 0.0;
        apply_volume_and_balance(&list, 1.0, Some(&mut volume), 0.5, Some(&mut balance), 4096);
        assert_eq!(volume, 1.0);
        assert!((balance - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_balance_ignored_for_mono() {
        let list = constant_list(1, 16, 1.0);
        apply_volume_and_balance(&list, 0.5, None, 1.0, None, 16);
        assert!(list.channel(0).unwrap().iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_decibel_conversion() {
        assert_eq!(ratio_to_decibels(1.0), 0.0);
        assert!((ratio_to_decibels(0.5) + 6.0206).abs() < 0.01);
        assert!((decibels_to_ratio(-6.0206) - 0.5).abs() < 1e-4);
        assert!((decibels_to_ratio(ratio_to_decibels(0.7)) - 0.7).abs() < 1e-9);
    }
}
