//! StepClock — the only source of global time
//!
//! A counter plus a period timer. Only the scheduler's driver loop calls
//! `advance()`, so steps are strictly +1 with no gaps or repeats.

use echobeats_core::{Error, Result, Step};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::debug;

pub struct StepClock {
    current: Step,
    period: Option<Duration>,
    interval: Option<Interval>,
    stopped: bool,
}

impl StepClock {
    pub fn new(start: Step) -> Self {
        Self {
            current: start,
            period: None,
            interval: None,
            stopped: false,
        }
    }

    /// Begin pacing steps at `period`. The first `tick()` completes immediately.
    pub fn start(&mut self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        self.period = Some(period);
        self.stopped = false;
        debug!(step = %self.current, ?period, "step clock started");
    }

    pub fn stop(&mut self) {
        self.stopped = true;
        self.interval = None;
        debug!(step = %self.current, "step clock stopped");
    }

    pub fn current(&self) -> Step {
        self.current
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some() && !self.stopped
    }

    /// Move to the next step and return it.
    pub fn advance(&mut self) -> Result<Step> {
        if self.stopped {
            return Err(Error::clock_fault(self.current.value(), "advance on stopped clock"));
        }
        let next = self
            .current
            .next()
            .ok_or_else(|| Error::clock_fault(self.current.value(), "step counter overflow"))?;
        self.current = next;
        Ok(next)
    }

    /// Wait for the next period boundary.
    pub async fn tick(&mut self) -> Result<()> {
        match self.interval.as_mut() {
            Some(interval) if !self.stopped => {
                interval.tick().await;
                Ok(())
            }
            _ => Err(Error::clock_fault(self.current.value(), "clock is not running")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_is_strictly_monotonic() {
        let mut clock = StepClock::new(Step(7));
        for n in 1..=25u64 {
            let step = clock.advance().unwrap();
            assert_eq!(step, Step(7 + n));
            assert_eq!(clock.current(), step);
        }
    }

    #[test]
    fn overflow_is_a_clock_fault() {
        let mut clock = StepClock::new(Step(u64::MAX));
        let err = clock.advance().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(clock.current(), Step(u64::MAX));
    }

    #[test]
    fn stopped_clock_refuses_to_advance() {
        let mut clock = StepClock::new(Step(0));
        clock.stop();
        assert!(clock.advance().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn tick_paces_at_period() {
        let mut clock = StepClock::new(Step(0));
        clock.start(Duration::from_millis(100));
        let begin = tokio::time::Instant::now();
        clock.tick().await.unwrap();
        clock.tick().await.unwrap();
        clock.tick().await.unwrap();
        assert_eq!(begin.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn tick_before_start_faults() {
        let mut clock = StepClock::new(Step(0));
        assert!(clock.tick().await.is_err());
    }
}
