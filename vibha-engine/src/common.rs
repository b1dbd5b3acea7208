//! Contains common, primitive types shared across the engine.
//!
//! Every component the engine owns (a mounted countdown, a testimonial
//! rotator, an open wizard session) is addressed by its own key type, so a
//! countdown handle can never be used to unmount a rotator.

use slotmap::new_key_type;

new_key_type! {
    /// Identifies a mounted countdown.
    ///
    /// Returned by `AdmissionsEngine::mount_countdown`. Keys are never reused,
    /// so unmounting with a stale id is a harmless no-op.
    pub struct CountdownId;

    /// Identifies a mounted testimonial rotator.
    pub struct RotatorId;

    /// Identifies an open form wizard session.
    pub struct SessionId;
}
