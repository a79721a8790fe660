//! Tests for echobeats-core: Step arithmetic, LanePattern, StabilizerPolicy, coherence

use echobeats_core::*;
use serde_json::json;

// ===========================================================================
// Step
// ===========================================================================

#[test]
fn step_beat_and_cycle() {
    assert_eq!(Step(0).beat(), 0);
    assert_eq!(Step(7).beat(), 3);
    assert_eq!(Step(11).cycle(), 0);
    assert_eq!(Step(12).cycle(), 1);
    assert_eq!(Step(26).cycle_position(), 2);
}

#[test]
fn step_next_stops_at_overflow() {
    assert_eq!(Step(4).next(), Some(Step(5)));
    assert_eq!(Step(u64::MAX).next(), None);
}

#[test]
fn step_serializes_as_plain_number() {
    assert_eq!(serde_json::to_value(Step(42)).unwrap(), json!(42));
}

// ===========================================================================
// LaneId
// ===========================================================================

#[test]
fn lane_index_roundtrip() {
    for lane in LaneId::ALL {
        assert_eq!(LaneId::from_index(lane.index()), Some(lane));
    }
    assert_eq!(LaneId::from_index(LANE_COUNT), None);
}

#[test]
fn lane_parse_accepts_names_and_phase_aliases() {
    assert_eq!("Relevance".parse::<LaneId>().unwrap(), LaneId::Relevance);
    assert_eq!("phase2".parse::<LaneId>().unwrap(), LaneId::Salience);
    assert_eq!("0".parse::<LaneId>().unwrap(), LaneId::Affordance);
    assert_eq!("narrative".parse::<LaneId>().unwrap(), LaneId::Narrative);
    assert!("cortex".parse::<LaneId>().is_err());
}

#[test]
fn only_global_lanes_lack_phase_index() {
    let global: Vec<LaneId> = LaneId::ALL.into_iter().filter(|l| l.is_global()).collect();
    assert_eq!(global, vec![LaneId::Opponent, LaneId::Narrative]);
}

// ===========================================================================
// LanePattern
// ===========================================================================

#[test]
fn phase_lanes_are_periodic_and_mutually_exclusive() {
    let pattern = LanePattern::default();
    for s in 0..96u64 {
        let active: Vec<LaneId> = LaneId::PHASE
            .into_iter()
            .filter(|l| pattern.is_active(*l, Step(s)))
            .collect();
        assert!(active.len() <= 1, "step {} has {:?}", s, active);

        for lane in LaneId::PHASE {
            let now = pattern.active(lane, Step(s));
            let later = pattern.active(lane, Step(s + 16));
            assert_eq!(now, later, "{} not periodic at step {}", lane, s);
        }
    }
}

#[test]
fn phase_lane_fires_once_per_beat_at_its_offset() {
    let pattern = LanePattern::default();
    let steps: Vec<u64> = (0..12)
        .filter(|s| pattern.is_active(LaneId::Salience, Step(*s)))
        .collect();
    assert_eq!(steps, vec![2, 6, 10]);
}

#[test]
fn phase_lane_sequences() {
    let pattern = LanePattern::default();
    let ops = |lane: LaneId| -> Vec<Operation> {
        (0..16)
            .filter_map(|s| pattern.active(lane, Step(s)))
            .map(|slot| slot.operation)
            .collect()
    };
    assert_eq!(
        ops(LaneId::Affordance),
        vec![Operation::Sense, Operation::Retrieve, Operation::Act, Operation::Encode]
    );
    assert_eq!(
        ops(LaneId::Relevance),
        vec![Operation::Sense, Operation::Assess, Operation::Act, Operation::Encode]
    );
    assert_eq!(
        ops(LaneId::Salience),
        vec![Operation::FormIdea, Operation::Retrieve, Operation::Act, Operation::Assess]
    );
}

#[test]
fn opponent_alternates_broadcast_and_integrate() {
    let pattern = LanePattern::default();
    for s in 0..48u64 {
        let slot = pattern.active(LaneId::Opponent, Step(s)).unwrap();
        let expected = if s % 4 < 2 {
            Operation::Broadcast
        } else {
            Operation::Integrate
        };
        assert_eq!(slot.operation, expected, "step {}", s);
        assert_eq!(slot.mode, expected.mode());
    }
}

#[test]
fn narrative_cycles_its_four_operations() {
    let pattern = LanePattern::default();
    let expected = [
        Operation::Project,
        Operation::ReflectMeaning,
        Operation::Commit,
        Operation::Actualize,
    ];
    for s in 0..48u64 {
        let slot = pattern.active(LaneId::Narrative, Step(s)).unwrap();
        assert_eq!(slot.operation, expected[(s % 4) as usize]);
        assert_eq!(slot.position as u64, s % 4);
    }
}

#[test]
fn modes_follow_the_operation_table() {
    assert_eq!(Operation::Sense.mode(), Mode::Expressive);
    assert_eq!(Operation::FormIdea.mode(), Mode::Expressive);
    assert_eq!(Operation::Act.mode(), Mode::Expressive);
    assert_eq!(Operation::Assess.mode(), Mode::Reflective);
    assert_eq!(Operation::Encode.mode(), Mode::Reflective);
    assert_eq!(Operation::Retrieve.mode(), Mode::Reflective);
    assert_eq!(Operation::Broadcast.mode(), Mode::Expressive);
    assert_eq!(Operation::Integrate.mode(), Mode::Reflective);
}

#[test]
fn custom_offsets_shift_activation() {
    let pattern = LanePattern::new([3, 0, 1]).unwrap();
    assert_eq!(pattern.phase_lane_at(Step(0)), Some(LaneId::Relevance));
    assert_eq!(pattern.phase_lane_at(Step(2)), None);
    assert_eq!(pattern.phase_lane_at(Step(7)), Some(LaneId::Affordance));
}

#[test]
fn invalid_offsets_are_rejected() {
    assert!(LanePattern::new([0, 4, 2]).is_err());
    assert!(LanePattern::new([1, 1, 2]).is_err());
}

#[test]
fn lane_operations_are_deduplicated() {
    assert_eq!(
        LanePattern::operations(LaneId::Opponent),
        vec![Operation::Broadcast, Operation::Integrate]
    );
    assert_eq!(LanePattern::operations(LaneId::Narrative).len(), 4);
}

// ===========================================================================
// StabilizerPolicy
// ===========================================================================

#[test]
fn stabilizer_holder_sequence() {
    let holders: Vec<Holder> = (0..8).map(|s| StabilizerPolicy::decide(Step(s)).holder).collect();
    assert_eq!(
        holders,
        vec![
            Holder::Both,
            Holder::Opponent,
            Holder::Narrative,
            Holder::Opponent,
            Holder::Both,
            Holder::Opponent,
            Holder::Narrative,
            Holder::Opponent,
        ]
    );
}

#[test]
fn stabilizer_is_deterministic() {
    for s in [0u64, 5, 1_000_003, u64::MAX] {
        assert_eq!(StabilizerPolicy::decide(Step(s)), StabilizerPolicy::decide(Step(s)));
        assert_eq!(StabilizerPolicy::decide(Step(s)).step, Step(s));
    }
}

// ===========================================================================
// Coherence
// ===========================================================================

fn noops(step: Step) -> Vec<Event> {
    LaneId::ALL.into_iter().map(|l| Event::noop(l, step)).collect()
}

#[test]
fn coherence_is_one_when_nothing_is_wrong() {
    assert_eq!(coherence_score(&noops(Step(0))), 1.0);
}

#[test]
fn coherence_penalizes_degraded_events() {
    let step = Step(1);
    let mut events = noops(step);
    events[1] = Event::degraded(LaneId::Relevance, step, Operation::Sense, Mode::Expressive, "boom");
    let score = coherence_score(&events);
    assert!((score - 0.85).abs() < 1e-9, "{}", score);
}

#[test]
fn coherence_penalizes_signals_and_clamps() {
    let step = Step(3);
    let mut events = noops(step);
    events[3] = Event::completed(
        LaneId::Opponent,
        step,
        Operation::Integrate,
        Mode::Reflective,
        json!({}),
        Some(Signal::Unresolved(1)),
    );
    events[4] = Event::completed(
        LaneId::Narrative,
        step,
        Operation::Actualize,
        Mode::Reflective,
        json!({}),
        Some(Signal::Aligned(false)),
    );
    assert!((coherence_score(&events) - 0.70).abs() < 1e-9);

    let all_missing: Vec<Event> = LaneId::ALL
        .into_iter()
        .map(|l| Event::missing(l, step, "gone"))
        .collect();
    assert!((coherence_score(&all_missing) - 0.25).abs() < 1e-9);
    let mut worst = all_missing.clone();
    worst.extend(all_missing);
    assert_eq!(coherence_score(&worst), 0.0);
}

// ===========================================================================
// Events and snapshots
// ===========================================================================

#[test]
fn lane_state_records_activity() {
    let step = Step(2);
    let mut state = LaneState::new(LaneId::Salience);
    let ok = Event::completed(LaneId::Salience, step, Operation::FormIdea, Mode::Expressive, json!(1), None);
    state.record(0, &ok);
    let bad = Event::degraded(LaneId::Salience, Step(6), Operation::Retrieve, Mode::Reflective, "timeout");
    state.record(1, &bad);
    assert_eq!(state.active_steps, 2);
    assert_eq!(state.degraded_steps, 1);
    assert_eq!(state.position_in_pattern, 1);
    assert_eq!(state.last_operation, Some(Operation::Retrieve));
    assert_eq!(state.last_event_ref, Some(bad.id));
}

#[test]
fn snapshot_helpers_and_serde() {
    let step = Step(0);
    let events: [Event; LANE_COUNT] = std::array::from_fn(|i| {
        let lane = LaneId::ALL[i];
        if lane == LaneId::Affordance {
            Event::completed(lane, step, Operation::Sense, Mode::Expressive, json!("x"), None)
        } else if lane == LaneId::Narrative {
            Event::missing(lane, step, "late")
        } else {
            Event::noop(lane, step)
        }
    });
    let snapshot = ReconciledSnapshot {
        step,
        stabilizer: StabilizerPolicy::decide(step),
        coherence: coherence_score(&events),
        events,
        conflicts: vec![Conflict::new(
            Some(LaneId::Narrative),
            ConflictKind::MissingLaneEvent,
            "late",
        )],
    };
    assert_eq!(snapshot.active_phase_lane(), Some(LaneId::Affordance));
    assert_eq!(snapshot.missing_lanes(), vec![LaneId::Narrative]);
    assert!(!snapshot.is_complete());
    assert_eq!(snapshot.degraded_count(), 1);

    let value = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(value["stabilizer"]["holder"], "both");
    assert_eq!(value["conflicts"][0]["kind"], "missing_lane_event");
    assert_eq!(value["events"][0]["operation"], "sense");
    let back: ReconciledSnapshot = serde_json::from_value(value).unwrap();
    assert_eq!(back.step, snapshot.step);
    assert_eq!(back.events[0].id, snapshot.events[0].id);
    assert!(back.events[1].is_noop());
    assert_eq!(back.events[4].reason.as_deref(), Some("late"));
}

#[test]
fn clock_faults_are_fatal_config_errors_are_not() {
    assert!(Error::clock_fault(3, "overflow").is_fatal());
    assert!(!Error::config("bad").is_fatal());
}
