//! Contains the building blocks the engine mounts and drives.
//!
//! `countdown` and `rotator` hold the pure state, `watcher` adapts them to
//! the clock's tick stream, and `wizard` is the form state machine driven by
//! user actions rather than ticks.

pub mod countdown;
pub mod rotator;
pub mod watcher;
pub mod wizard;
