//! Control-rate oscillator
//!
//! One sample per call of a parabola-shaped periodic waveform in the 0-1
//! range - a cheap sine approximation for LFO and modulation duty, with no
//! table and no transcendental per sample.

use crate::types::Sample;

/// Produce one oscillator sample and advance the phase
///
/// `rate` is the per-sample advance (frequency / sample rate). `position`
/// is the caller-held phase, wrapped into [-1, 1]; start it at 0 for a
/// peak-first waveform.
#[inline]
pub fn generate_oscillator(rate: Sample, position: &mut Sample) -> Sample {
    let mut x = *position;
    x *= x;
    x -= 1.0;
    x *= x;
    *position += rate;
    if *position > 1.0 {
        *position -= 2.0;
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_range_and_period() {
        let mut position = 0.0;
        let rate = 1.0 / 64.0;
        for _ in 0..512 {
            let sample = generate_oscillator(rate, &mut position);
            assert!((0.0..=1.0).contains(&sample), "sample {sample} out of range");
            assert!((-1.0..=1.0).contains(&position), "phase {position} escaped");
        }
    }

    #[test]
    fn test_peak_at_zero_phase() {
        let mut position = 0.0;
        assert_eq!(generate_oscillator(0.01, &mut position), 1.0);

        // Troughs at the phase extremes
        let mut position = 1.0;
        assert!(generate_oscillator(0.01, &mut position) < 1e-9);
    }

    #[test]
    fn test_phase_wraps() {
        let mut position = 0.95;
        generate_oscillator(0.1, &mut position);
        assert!((position - (-0.95)).abs() < 1e-6);
    }
}
