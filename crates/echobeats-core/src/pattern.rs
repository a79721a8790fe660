//! LanePattern — fixed periodic schedule of every lane
//!
//! A pure lookup `(lane, step) → Option<Slot>`. PhaseLanes fire once per beat
//! at their offset; the two global lanes fire every step.

use crate::error::{Error, Result};
use crate::types::{LaneId, Mode, Operation, Step, BEAT_LEN};
use serde::{Deserialize, Serialize};

/// Default PhaseLane offsets: Affordance 0, Relevance 1, Salience 2.
pub const DEFAULT_OFFSETS: [u64; 3] = [0, 1, 2];

/// Operation sequence per PhaseLane, cycled on each activation.
const PHASE_SEQUENCES: [[Operation; 4]; 3] = [
    // Affordance
    [Operation::Sense, Operation::Retrieve, Operation::Act, Operation::Encode],
    // Relevance
    [Operation::Sense, Operation::Assess, Operation::Act, Operation::Encode],
    // Salience
    [Operation::FormIdea, Operation::Retrieve, Operation::Act, Operation::Assess],
];

const OPPONENT_SEQUENCE: [Operation; 4] = [
    Operation::Broadcast,
    Operation::Broadcast,
    Operation::Integrate,
    Operation::Integrate,
];

const NARRATIVE_SEQUENCE: [Operation; 4] = [
    Operation::Project,
    Operation::ReflectMeaning,
    Operation::Commit,
    Operation::Actualize,
];

/// What a lane does on a step where it is active
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub operation: Operation,
    pub mode: Mode,
    /// Index into the lane's 4-entry sequence
    pub position: u8,
}

impl Slot {
    fn at(sequence: &[Operation; 4], position: u64) -> Self {
        let position = (position % BEAT_LEN) as usize;
        let operation = sequence[position];
        Self {
            operation,
            mode: operation.mode(),
            position: position as u8,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LanePattern {
    offsets: [u64; 3],
}

impl Default for LanePattern {
    fn default() -> Self {
        Self {
            offsets: DEFAULT_OFFSETS,
        }
    }
}

impl LanePattern {
    /// Offsets must be distinct and below the beat length, otherwise two
    /// PhaseLanes would share a step.
    pub fn new(offsets: [u64; 3]) -> Result<Self> {
        for (i, offset) in offsets.iter().enumerate() {
            if *offset >= BEAT_LEN {
                return Err(Error::config(format!(
                    "lane offset {} for {} must be below {}",
                    offset,
                    LaneId::PHASE[i],
                    BEAT_LEN
                )));
            }
            if offsets[..i].contains(offset) {
                return Err(Error::config(format!(
                    "lane offset {} is shared by more than one phase lane",
                    offset
                )));
            }
        }
        Ok(Self { offsets })
    }

    pub fn offsets(&self) -> [u64; 3] {
        self.offsets
    }

    pub fn offset(&self, lane: LaneId) -> Option<u64> {
        lane.phase_index().map(|i| self.offsets[i])
    }

    /// The lane's slot for `step`, or `None` when the lane is idle.
    pub fn active(&self, lane: LaneId, step: Step) -> Option<Slot> {
        let step = step.value();
        match lane.phase_index() {
            Some(i) => {
                let since = step.checked_sub(self.offsets[i])?;
                if since % BEAT_LEN != 0 {
                    return None;
                }
                Some(Slot::at(&PHASE_SEQUENCES[i], since / BEAT_LEN))
            }
            None if lane == LaneId::Opponent => Some(Slot::at(&OPPONENT_SEQUENCE, step)),
            None => Some(Slot::at(&NARRATIVE_SEQUENCE, step)),
        }
    }

    pub fn is_active(&self, lane: LaneId, step: Step) -> bool {
        self.active(lane, step).is_some()
    }

    /// Every operation a lane can perform, in sequence order, without repeats.
    pub fn operations(lane: LaneId) -> Vec<Operation> {
        let sequence = match lane.phase_index() {
            Some(i) => &PHASE_SEQUENCES[i],
            None if lane == LaneId::Opponent => &OPPONENT_SEQUENCE,
            None => &NARRATIVE_SEQUENCE,
        };
        let mut ops = Vec::with_capacity(sequence.len());
        for op in sequence {
            if !ops.contains(op) {
                ops.push(*op);
            }
        }
        ops
    }

    /// The PhaseLane scheduled on `step`, if any.
    pub fn phase_lane_at(&self, step: Step) -> Option<LaneId> {
        LaneId::PHASE
            .iter()
            .copied()
            .find(|lane| self.is_active(*lane, step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_sequences_alternate_modes() {
        for sequence in &PHASE_SEQUENCES {
            for pair in sequence.windows(2) {
                assert_ne!(pair[0].mode(), pair[1].mode(), "{:?}", sequence);
            }
        }
    }

    #[test]
    fn phase_lane_position_advances_per_activation() {
        let pattern = LanePattern::default();
        let positions: Vec<u8> = (0..16)
            .filter_map(|s| pattern.active(LaneId::Relevance, Step(s)))
            .map(|slot| slot.position)
            .collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
    }

    #[test]
    fn step_before_offset_is_idle() {
        let pattern = LanePattern::new([3, 1, 2]).unwrap();
        assert!(pattern.active(LaneId::Affordance, Step(0)).is_none());
        assert!(pattern.active(LaneId::Affordance, Step(3)).is_some());
    }
}
