//! Pure numeric primitives over buffer lists
//!
//! Allocation-free routines consumed by the buffer stack and usable directly
//! by render code: gain application and smoothing ([`apply_gain`],
//! [`apply_gain_smoothed`]), linear and equal-power ramps ([`apply_ramp`],
//! [`apply_equal_power_ramp`]), two-list mixing with channel reconciliation
//! ([`mix`]) and a cheap oscillator ([`generate_oscillator`]). All are
//! O(frames x channels) with branch-minimal inner loops.

mod gain;
mod mix;
mod oscillator;
mod ramp;

pub use gain::{
    apply_gain, apply_gain_ramped, apply_gain_smoothed, apply_gain_smoothed_mono,
    apply_volume_and_balance, decibels_to_ratio, ratio_to_decibels, DEFAULT_RAMP_FRAMES,
};
pub use mix::mix;
pub use oscillator::generate_oscillator;
pub use ramp::{apply_equal_power_ramp, apply_ramp};
