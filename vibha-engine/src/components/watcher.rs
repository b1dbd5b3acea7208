//! Defines watchers that react to clock ticks on behalf of mounted components.

use crate::components::countdown::{compute_remaining, has_elapsed, TimeRemaining};
use crate::components::rotator::Rotator;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// Called with the fresh breakdown on every tick.
pub type TickHandler = Box<dyn FnMut(&TimeRemaining) + Send + Sync>;

/// Called when a countdown reaches its target.
pub type CompletionHandler = Box<dyn FnMut() + Send + Sync>;

/// What a countdown produced for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CountdownUpdate {
    pub remaining: TimeRemaining,
    /// `true` only on the tick at which the target was first reached.
    pub completed: bool,
}

/// Recomputes a countdown on every tick and signals completion once.
#[doc(hidden)]
pub(crate) struct CountdownWatcher {
    target: DateTime<Utc>,
    on_tick: TickHandler,
    on_complete: CompletionHandler,
    completion_fired: bool,
    last: Option<TimeRemaining>,
}

impl CountdownWatcher {
    pub(crate) fn new(
        target: DateTime<Utc>,
        on_tick: TickHandler,
        on_complete: CompletionHandler,
    ) -> Self {
        Self {
            target,
            on_tick,
            on_complete,
            completion_fired: false,
            last: None,
        }
    }

    pub(crate) fn target(&self) -> DateTime<Utc> {
        self.target
    }

    /// The breakdown computed on the latest tick, if any.
    pub(crate) fn last(&self) -> Option<TimeRemaining> {
        self.last
    }

    /// Recomputes the breakdown at `now`, runs the tick handler, and runs the
    /// completion handler the first time the target is reached.
    pub(crate) fn process_tick(&mut self, now: DateTime<Utc>) -> CountdownUpdate {
        let remaining = compute_remaining(self.target, now);
        self.last = Some(remaining);
        (self.on_tick)(&remaining);

        let completed = has_elapsed(self.target, now) && !self.completion_fired;
        if completed {
            self.completion_fired = true;
            (self.on_complete)();
        }
        CountdownUpdate {
            remaining,
            completed,
        }
    }

    /// Moves the deadline and re-arms the completion handler.
    pub(crate) fn retarget(&mut self, target: DateTime<Utc>) {
        self.target = target;
        self.completion_fired = false;
        self.last = None;
    }
}

/// Advances a rotator each time its interval elapses, unless paused.
#[doc(hidden)]
pub(crate) struct RotatorWatcher {
    pub rotator: Rotator,
    interval: Duration,
    last_moved: Instant,
}

impl RotatorWatcher {
    pub(crate) fn new(rotator: Rotator, interval: Duration, now: Instant) -> Self {
        Self {
            rotator,
            interval,
            last_moved: now,
        }
    }

    /// Restarts the interval, so a manual move gets a full display period.
    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_moved = now;
    }

    /// Returns the new index if the rotator advanced on this tick.
    pub(crate) fn process_tick(&mut self, now: Instant) -> Option<usize> {
        if self.rotator.is_paused() {
            // Resuming starts a fresh interval rather than jumping immediately.
            self.last_moved = now;
            return None;
        }
        if now.duration_since(self.last_moved) >= self.interval {
            self.last_moved = now;
            return Some(self.rotator.next());
        }
        None
    }
}
