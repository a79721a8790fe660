//! Scheduler metrics
//!
//! Updated by the driver after every published snapshot and read by anyone
//! through the scheduler handle.

use echobeats_core::{LaneId, Mode, ReconciledSnapshot, Step, CYCLE_LEN};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Weight of the newest sample in the step duration moving average.
const DURATION_ALPHA: f64 = 0.1;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub steps_processed: u64,
    pub degraded_event_count: u64,
    pub average_coherence: f64,
    pub cycles_completed: u64,
    pub conflict_count: u64,
    pub expressive_events: u64,
    pub reflective_events: u64,
    /// Steps each PhaseLane held the phase, in Affordance, Relevance,
    /// Salience order
    pub phase_transitions: [u64; 3],
    /// Exponential moving average of snapshot latency
    pub average_step_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_step: Option<Step>,
}

impl Metrics {
    pub fn record(&mut self, snapshot: &ReconciledSnapshot, elapsed: Duration) {
        let n = self.steps_processed as f64;
        self.average_coherence = (self.average_coherence * n + snapshot.coherence) / (n + 1.0);
        self.steps_processed += 1;

        self.degraded_event_count += snapshot.degraded_count() as u64;
        self.conflict_count += snapshot.conflicts.len() as u64;
        for event in &snapshot.events {
            match event.mode {
                Some(Mode::Expressive) => self.expressive_events += 1,
                Some(Mode::Reflective) => self.reflective_events += 1,
                None => {}
            }
        }
        for (count, lane) in self.phase_transitions.iter_mut().zip(LaneId::PHASE) {
            if !snapshot.event(lane).is_noop() {
                *count += 1;
            }
        }
        if snapshot.step.cycle_position() == CYCLE_LEN - 1 {
            self.cycles_completed += 1;
        }

        let ms = elapsed.as_secs_f64() * 1_000.0;
        self.average_step_ms = if self.steps_processed == 1 {
            ms
        } else {
            self.average_step_ms * (1.0 - DURATION_ALPHA) + ms * DURATION_ALPHA
        };
        self.last_step = Some(snapshot.step);
    }
}
