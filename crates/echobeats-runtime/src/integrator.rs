//! Per-step collection and reconciliation of lane events
//!
//! Collects one event per lane for the current step (bounded wait), fills
//! gaps with degraded stand-ins, applies the stabilizer policy and merges
//! everything into a ReconciledSnapshot. The merge is keyed by lane, so
//! arrival order never matters.

use echobeats_core::stabilizer::{actualize_alignment, unresolved_conflicts};
use echobeats_core::{
    coherence_score, Conflict, ConflictKind, Event, LaneId, ReconciledSnapshot, StabilizerPolicy,
    Step, LANE_COUNT,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const MISSING_TIMEOUT: &str = "no event before step deadline";
const MISSING_SHUTDOWN: &str = "scheduler stopped before lane reported";

/// Lane events gathered for one step
#[derive(Debug)]
pub struct Collection {
    pub step: Step,
    pub events: [Option<Event>; LANE_COUNT],
    pub conflicts: Vec<Conflict>,
    /// Collection was cut short by shutdown
    pub interrupted: bool,
}

impl Collection {
    pub fn new(step: Step) -> Self {
        Self {
            step,
            events: Default::default(),
            conflicts: Vec::new(),
            interrupted: false,
        }
    }

    pub fn received(&self) -> usize {
        self.events.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.received() == LANE_COUNT
    }

    /// File an event under its lane. Events for another step are rejected
    /// as conflicts; a second event from the same lane is ignored.
    pub fn accept(&mut self, event: Event) {
        if event.step != self.step {
            warn!(lane = %event.lane, expected = %self.step, got = %event.step, "event for wrong step");
            self.conflicts.push(Conflict::new(
                Some(event.lane),
                ConflictKind::StepMismatch,
                format!("event for step {} arrived during step {}", event.step, self.step),
            ));
            return;
        }
        let slot = &mut self.events[event.lane.index()];
        if slot.is_some() {
            debug!(lane = %event.lane, step = %self.step, "duplicate lane event ignored");
            return;
        }
        *slot = Some(event);
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GlobalIntegrator {
    step_timeout: Duration,
}

impl GlobalIntegrator {
    pub fn new(step_timeout: Duration) -> Self {
        Self { step_timeout }
    }

    pub fn step_timeout(&self) -> Duration {
        self.step_timeout
    }

    /// Wait for all five lanes, the step deadline, or cancellation.
    pub async fn collect(
        &self,
        step: Step,
        inbox: &mut mpsc::Receiver<Event>,
        cancel: &CancellationToken,
    ) -> Collection {
        let deadline = Instant::now() + self.step_timeout;
        let mut collection = Collection::new(step);
        while !collection.is_full() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    collection.interrupted = true;
                    break;
                }
                received = inbox.recv() => match received {
                    Some(event) => collection.accept(event),
                    // Every lane has reported or dropped its tick
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline) => {
                    debug!(%step, received = collection.received(), "step deadline reached");
                    break;
                }
            }
        }
        collection
    }

    /// Merge a collection into a snapshot. Missing lanes become degraded
    /// stand-ins with a MissingLaneEvent conflict.
    pub fn finish(&self, collection: Collection) -> ReconciledSnapshot {
        let reason = if collection.interrupted {
            MISSING_SHUTDOWN
        } else {
            MISSING_TIMEOUT
        };
        let Collection {
            step,
            events,
            conflicts,
            ..
        } = collection;
        merge(step, events, conflicts, reason)
    }

    /// Pure reconciliation of one step's per-lane events.
    pub fn reconcile(step: Step, events: [Option<Event>; LANE_COUNT]) -> ReconciledSnapshot {
        merge(step, events, Vec::new(), MISSING_TIMEOUT)
    }
}

fn merge(
    step: Step,
    mut events: [Option<Event>; LANE_COUNT],
    mut conflicts: Vec<Conflict>,
    missing_reason: &str,
) -> ReconciledSnapshot {
    let events: [Event; LANE_COUNT] = std::array::from_fn(|i| {
        let lane = LaneId::ALL[i];
        match events[i].take() {
            Some(event) => event,
            None => {
                warn!(%lane, %step, "{}", missing_reason);
                conflicts.push(Conflict::new(
                    Some(lane),
                    ConflictKind::MissingLaneEvent,
                    missing_reason,
                ));
                Event::missing(lane, step, missing_reason)
            }
        }
    });

    if let Some(n) = unresolved_conflicts(&events).filter(|n| *n > 0) {
        conflicts.push(Conflict::new(
            Some(LaneId::Opponent),
            ConflictKind::UnresolvedIntegration,
            format!("integrate left {} conflict(s) unresolved", n),
        ));
    }
    if actualize_alignment(&events) == Some(false) {
        conflicts.push(Conflict::new(
            Some(LaneId::Narrative),
            ConflictKind::Misalignment,
            "actualize diverged from preceding commit",
        ));
    }

    ReconciledSnapshot {
        step,
        coherence: coherence_score(&events),
        stabilizer: StabilizerPolicy::decide(step),
        events,
        conflicts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echobeats_core::{Mode, Operation, Signal};
    use serde_json::json;

    fn all_noop(step: Step) -> [Option<Event>; LANE_COUNT] {
        std::array::from_fn(|i| Some(Event::noop(LaneId::ALL[i], step)))
    }

    #[test]
    fn merge_is_order_independent() {
        let step = Step(2);
        let mut forward = Collection::new(step);
        let mut backward = Collection::new(step);
        let events: Vec<Event> = LaneId::ALL.iter().map(|l| Event::noop(*l, step)).collect();
        for e in events.iter().cloned() {
            forward.accept(e);
        }
        for e in events.iter().rev().cloned() {
            backward.accept(e);
        }
        let integrator = GlobalIntegrator::new(Duration::from_millis(10));
        let a = integrator.finish(forward);
        let b = integrator.finish(backward);
        assert_eq!(a, b);
    }

    #[test]
    fn wrong_step_event_is_a_conflict() {
        let mut collection = Collection::new(Step(5));
        collection.accept(Event::noop(LaneId::Salience, Step(4)));
        assert_eq!(collection.received(), 0);
        assert_eq!(collection.conflicts[0].kind, ConflictKind::StepMismatch);
    }

    #[test]
    fn unresolved_integration_lowers_coherence() {
        let step = Step(2);
        let mut events = all_noop(step);
        events[LaneId::Opponent.index()] = Some(Event::completed(
            LaneId::Opponent,
            step,
            Operation::Integrate,
            Mode::Reflective,
            json!({}),
            Some(Signal::Unresolved(2)),
        ));
        let snapshot = GlobalIntegrator::reconcile(step, events);
        assert!(snapshot.coherence < 1.0);
        assert!(snapshot
            .conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::UnresolvedIntegration));
    }

    #[tokio::test]
    async fn cancelled_collection_is_interrupted() {
        let (tx, mut rx) = mpsc::channel(LANE_COUNT);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let integrator = GlobalIntegrator::new(Duration::from_secs(1));
        let collection = integrator.collect(Step(0), &mut rx, &cancel).await;
        assert!(collection.interrupted);
        assert_eq!(collection.received(), 0);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn collection_stops_at_step_deadline() {
        let (tx, mut rx) = mpsc::channel(LANE_COUNT);
        tx.send(Event::noop(LaneId::Salience, Step(4))).await.unwrap();
        let integrator = GlobalIntegrator::new(Duration::from_millis(100));
        let collection = integrator
            .collect(Step(4), &mut rx, &CancellationToken::new())
            .await;
        assert!(!collection.interrupted);
        let snapshot = integrator.finish(collection);
        assert_eq!(snapshot.missing_lanes().len(), LANE_COUNT - 1);
        assert!(!snapshot.event(LaneId::Salience).degraded);
        drop(tx);
    }
}
