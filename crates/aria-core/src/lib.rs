//! Aria Core - concurrency and buffer management core for real-time audio
//!
//! This crate provides the primitives a real-time audio engine needs to let
//! a control thread reconfigure the signal path while a render thread runs
//! without locking, blocking or allocating: two-phase managed values and
//! snapshot arrays ([`managed`]), a pooled buffer stack machine ([`buffer`]),
//! the numeric routines they rely on ([`dsp`]), and the per-cycle render
//! context ([`render`]). Hardware I/O, file I/O and graph composition live in
//! the host application; this library only requires conforming buffer lists
//! and timestamps at the render boundary.

pub mod buffer;
pub mod dsp;
pub mod error;
pub mod managed;
pub mod ratelimit;
pub mod render;
pub mod time;
pub mod types;

pub use types::*;
