//! The master clock that drives every tick-based component.

use crate::config::ClockResolution;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// A single pulse of the `SystemClock`.
#[derive(Debug, Clone)]
pub struct TickEvent {
    /// Number of ticks produced so far, starting at 1.
    pub tick_count: u64,
    /// Wall-clock time at which the tick was produced.
    /// Countdowns are recomputed against this value.
    pub timestamp: DateTime<Utc>,
}

impl TickEvent {
    pub fn new(tick_count: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            tick_count,
            timestamp,
        }
    }
}

impl ClockResolution {
    /// The fastest custom rate; the period never drops below one microsecond.
    pub const MAX_TICKS_PER_SECOND: u64 = 1_000_000;

    /// The time between two consecutive ticks. Custom rates are clamped to
    /// `1..=MAX_TICKS_PER_SECOND`.
    pub fn period(&self) -> Duration {
        let ticks_per_second = match self {
            ClockResolution::High => 60,
            ClockResolution::Medium => 30,
            ClockResolution::Low => 1,
            ClockResolution::Custom { ticks_per_second } => {
                (*ticks_per_second).clamp(1, Self::MAX_TICKS_PER_SECOND)
            }
        };
        // Clamped above, so the cast cannot truncate.
        Duration::from_secs(1) / ticks_per_second as u32
    }
}

/// The single source of time for the engine.
///
/// Ticks are broadcast as `Arc<TickEvent>` so every subscriber shares the
/// same allocation. A tick that cannot be delivered on time is skipped
/// rather than burst-delivered later.
pub struct SystemClock {
    resolution: ClockResolution,
    tick_sender: broadcast::Sender<Arc<TickEvent>>,
}

impl SystemClock {
    pub fn new(resolution: ClockResolution, tick_sender: broadcast::Sender<Arc<TickEvent>>) -> Self {
        Self {
            resolution,
            tick_sender,
        }
    }

    /// Ticks until a shutdown signal arrives on `shutdown_rx`.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let period = self.resolution.period();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("SystemClock ticking every {:?}.", period);

        let mut tick_count: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    tick_count += 1;
                    let tick = Arc::new(TickEvent::new(tick_count, Utc::now()));
                    // No receivers is fine, the dispatcher may not have subscribed yet.
                    self.tick_sender.send(tick).ok();
                }
            }
        }
        debug!("SystemClock stopped after {} ticks.", tick_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_resolution_ticks_once_per_second() {
        assert_eq!(ClockResolution::Low.period(), Duration::from_secs(1));
    }

    #[test]
    fn custom_resolution_never_divides_by_zero() {
        let zero = ClockResolution::Custom { ticks_per_second: 0 };
        assert_eq!(zero.period(), Duration::from_secs(1));

        let fast = ClockResolution::Custom { ticks_per_second: 100 };
        assert_eq!(fast.period(), Duration::from_millis(10));
    }

    #[test]
    fn custom_resolution_never_yields_a_zero_period() {
        let too_fast = ClockResolution::Custom { ticks_per_second: 2_000_000 };
        assert_eq!(too_fast.period(), Duration::from_micros(1));

        let absurd = ClockResolution::Custom { ticks_per_second: u64::MAX };
        assert_eq!(absurd.period(), Duration::from_micros(1));
        assert!(!absurd.period().is_zero());
    }

    #[tokio::test]
    async fn clock_survives_an_oversized_custom_rate() {
        let (tick_tx, mut tick_rx) = broadcast::channel(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let clock = SystemClock::new(ClockResolution::Custom { ticks_per_second: 2_000_000 }, tick_tx);
        let handle = tokio::spawn(clock.run(shutdown_rx));

        // Ticks may outrun the receiver; skipping ahead is fine here.
        let tick = loop {
            match tick_rx.recv().await {
                Ok(tick) => break tick,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("clock stopped"),
            }
        };
        assert!(tick.tick_count >= 1);

        shutdown_tx.send(()).unwrap();
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn clock_broadcasts_numbered_ticks_until_shutdown() {
        let (tick_tx, mut tick_rx) = broadcast::channel(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let clock = SystemClock::new(ClockResolution::Custom { ticks_per_second: 100 }, tick_tx);
        let handle = tokio::spawn(clock.run(shutdown_rx));

        let first = tick_rx.recv().await.unwrap();
        let second = tick_rx.recv().await.unwrap();
        assert_eq!(first.tick_count, 1);
        assert_eq!(second.tick_count, 2);
        assert!(second.timestamp >= first.timestamp);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
