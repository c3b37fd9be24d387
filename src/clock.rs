// =============================================================================
// Clock & Cadence — ticks the engine forward at a fixed interval
// =============================================================================
//
// No catch-up: if a step overruns the interval, the next tick is skipped
// rather than queued, and the caller logs a StepOverrun. Cancellation is
// observed at the next tick boundary only — an in-flight step always
// completes.

use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::warn;

pub struct Clock {
    interval: tokio::time::Interval,
}

impl Clock {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }

    /// Wait for the next tick, returning its wall-clock instant. If one or
    /// more ticks were skipped because the previous step overran the
    /// interval, logs a warning naming how many were dropped.
    pub async fn next_tick(&mut self) -> Instant {
        let before = Instant::now();
        let tick = self.interval.tick().await;
        let elapsed = tick.saturating_duration_since(before);
        let period = self.interval.period();
        if elapsed > period + period / 4 {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                period_ms = period.as_millis() as u64,
                "tick arrived late — a prior step likely overran the interval"
            );
        }
        tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ticks_fire_at_roughly_the_configured_period() {
        let mut clock = Clock::new(Duration::from_millis(20));
        let t0 = clock.next_tick().await;
        let t1 = clock.next_tick().await;
        assert!(t1 >= t0);
    }
}
