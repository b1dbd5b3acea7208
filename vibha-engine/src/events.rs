//! Defines all public event types broadcast by the admissions engine.
//!
//! Listeners subscribe to these strongly-typed streams to render or log what
//! the engine is doing.

use crate::common::{CountdownId, RotatorId, SessionId};
use crate::components::countdown::TimeRemaining;
use crate::components::rotator::Direction;
use crate::submission::Receipt;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Events related to the lifecycle of the engine and its mounted components.
#[derive(Debug, Clone)]
pub enum SystemEvent {
    /// Fired once when the engine's dispatcher starts.
    EngineStarted { timestamp: Instant },
    /// Fired once when the engine's `run` loop is about to exit.
    EngineShutdown,
    CountdownMounted { id: CountdownId },
    CountdownUnmounted { id: CountdownId },
    RotatorMounted { id: RotatorId },
    RotatorUnmounted { id: RotatorId },
    SessionOpened { id: SessionId },
    SessionClosed { id: SessionId },
}

/// Events from mounted countdowns.
#[derive(Debug, Clone)]
pub enum CountdownEvent {
    /// Fired on every tick with the recomputed breakdown.
    Tick { id: CountdownId, remaining: TimeRemaining },
    /// Fired once, on the first tick at or past the target.
    Completed { id: CountdownId, at: DateTime<Utc> },
    /// Fired when a countdown is given a new target.
    Retargeted { id: CountdownId, target: DateTime<Utc> },
}

/// Events from form wizard sessions.
#[derive(Debug, Clone)]
pub enum WizardEvent {
    StepChanged { session: SessionId, step: usize },
    SubmissionStarted { session: SessionId },
    Submitted { session: SessionId, receipt: Receipt },
    SubmissionFailed { session: SessionId, reason: String },
    Reset { session: SessionId },
}

/// Events from testimonial rotators.
#[derive(Debug, Clone)]
pub enum RotatorEvent {
    /// The visible item changed, by autoplay or by hand.
    Advanced {
        id: RotatorId,
        index: usize,
        direction: Direction,
    },
    Paused { id: RotatorId },
    Resumed { id: RotatorId },
}
