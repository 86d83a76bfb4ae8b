//! Cross-thread state handoff
//!
//! The primitives that let the control thread reconfigure the engine while
//! the render thread keeps running: single managed values with two-phase
//! commit ([`ManagedValue`]) and ordered snapshot collections built on them
//! ([`RealtimeArray`]), grouped under an [`UpdateGroup`] that commits on the
//! render thread and reclaims on the control side.

mod array;
mod value;

pub use array::{ArrayToken, RealtimeArray, SourceIdentity};
pub use value::{ManagedValue, UpdateGroup, ValueRef};
