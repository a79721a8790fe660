//! StabilizerPolicy and coherence scoring
//!
//! The stabilizer names which global lane is a stable semantic anchor on a
//! step. It is advisory metadata: both global lanes still run every step.

use crate::types::{Event, Holder, LaneId, Operation, Signal, StabilizerDecision, Step};

/// Penalty per degraded event.
pub const DEGRADED_PENALTY: f64 = 0.15;
/// Penalty when Integrate reports unresolved conflicts.
pub const UNRESOLVED_PENALTY: f64 = 0.20;
/// Penalty when Actualize diverges from the preceding Commit.
pub const MISALIGNED_PENALTY: f64 = 0.10;

#[derive(Clone, Copy, Debug, Default)]
pub struct StabilizerPolicy;

impl StabilizerPolicy {
    pub fn decide(step: Step) -> StabilizerDecision {
        let holder = match step.beat() {
            0 => Holder::Both,
            2 => Holder::Narrative,
            // 1 and 3: Opponent repeats its previous operation
            _ => Holder::Opponent,
        };
        StabilizerDecision { step, holder }
    }
}

/// Unresolved conflict count reported by the Opponent's Integrate, if any.
pub fn unresolved_conflicts(events: &[Event]) -> Option<u32> {
    events
        .iter()
        .filter(|e| e.lane == LaneId::Opponent && e.is_operation(Operation::Integrate))
        .find_map(|e| match e.signal {
            Some(Signal::Unresolved(n)) => Some(n),
            _ => None,
        })
}

/// Alignment reported by the Narrative's Actualize, if any.
pub fn actualize_alignment(events: &[Event]) -> Option<bool> {
    events
        .iter()
        .filter(|e| e.lane == LaneId::Narrative && e.is_operation(Operation::Actualize))
        .find_map(|e| match e.signal {
            Some(Signal::Aligned(aligned)) => Some(aligned),
            _ => None,
        })
}

/// Deterministic coherence of one step's events, in `[0, 1]`.
pub fn coherence_score(events: &[Event]) -> f64 {
    let degraded = events.iter().filter(|e| e.degraded).count() as f64;
    let mut score = 1.0 - DEGRADED_PENALTY * degraded;
    if unresolved_conflicts(events).is_some_and(|n| n > 0) {
        score -= UNRESOLVED_PENALTY;
    }
    if actualize_alignment(events) == Some(false) {
        score -= MISALIGNED_PENALTY;
    }
    score.clamp(0.0, 1.0)
}
