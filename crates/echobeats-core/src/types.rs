//! Core types for Echobeats

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Steps per beat. Every lane pattern repeats with this period.
pub const BEAT_LEN: u64 = 4;

/// Steps per full cycle, after which all lane patterns realign.
pub const CYCLE_LEN: u64 = 12;

/// Number of lanes driven by one scheduler.
pub const LANE_COUNT: usize = 5;

/// Global step counter value
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Step(pub u64);

impl Step {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// Position within the 4-step beat (`step mod 4`).
    pub fn beat(self) -> u64 {
        self.0 % BEAT_LEN
    }

    /// Index of the 12-step cycle this step belongs to.
    pub fn cycle(self) -> u64 {
        self.0 / CYCLE_LEN
    }

    pub fn cycle_position(self) -> u64 {
        self.0 % CYCLE_LEN
    }

    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Step {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Lane identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneId {
    /// PhaseLane 0: past performance (conditioning)
    Affordance,
    /// PhaseLane 1: present commitment (orienting)
    Relevance,
    /// PhaseLane 2: future potential (anticipating)
    Salience,
    /// Global lane alternating Broadcast / Integrate
    Opponent,
    /// Global lane cycling Project → ReflectMeaning → Commit → Actualize
    Narrative,
}

impl LaneId {
    pub const ALL: [LaneId; LANE_COUNT] = [
        LaneId::Affordance,
        LaneId::Relevance,
        LaneId::Salience,
        LaneId::Opponent,
        LaneId::Narrative,
    ];

    pub const PHASE: [LaneId; 3] = [LaneId::Affordance, LaneId::Relevance, LaneId::Salience];

    pub fn index(self) -> usize {
        match self {
            LaneId::Affordance => 0,
            LaneId::Relevance => 1,
            LaneId::Salience => 2,
            LaneId::Opponent => 3,
            LaneId::Narrative => 4,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Index among the three PhaseLanes, `None` for the global lanes.
    pub fn phase_index(self) -> Option<usize> {
        match self {
            LaneId::Affordance => Some(0),
            LaneId::Relevance => Some(1),
            LaneId::Salience => Some(2),
            LaneId::Opponent | LaneId::Narrative => None,
        }
    }

    pub fn is_global(self) -> bool {
        self.phase_index().is_none()
    }

    pub fn name(self) -> &'static str {
        match self {
            LaneId::Affordance => "affordance",
            LaneId::Relevance => "relevance",
            LaneId::Salience => "salience",
            LaneId::Opponent => "opponent",
            LaneId::Narrative => "narrative",
        }
    }
}

impl std::fmt::Display for LaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for LaneId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "affordance" | "phase0" | "0" => Ok(LaneId::Affordance),
            "relevance" | "phase1" | "1" => Ok(LaneId::Relevance),
            "salience" | "phase2" | "2" => Ok(LaneId::Salience),
            "opponent" => Ok(LaneId::Opponent),
            "narrative" => Ok(LaneId::Narrative),
            other => Err(crate::Error::config(format!("unknown lane: {}", other))),
        }
    }
}

/// Whether an operation produces outward output or integrates prior output
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Expressive,
    Reflective,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Expressive => f.write_str("expressive"),
            Mode::Reflective => f.write_str("reflective"),
        }
    }
}

/// The named action a lane performs on an active step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    // PhaseLane operations
    Sense,
    Assess,
    FormIdea,
    Encode,
    Act,
    Retrieve,
    // OpponentLane operations
    Broadcast,
    Integrate,
    // NarrativeLane operations
    Project,
    ReflectMeaning,
    Commit,
    Actualize,
}

impl Operation {
    /// Fixed per-operation mode table.
    pub fn mode(self) -> Mode {
        match self {
            Operation::Sense
            | Operation::FormIdea
            | Operation::Act
            | Operation::Broadcast
            | Operation::Project
            | Operation::Commit => Mode::Expressive,
            Operation::Assess
            | Operation::Encode
            | Operation::Retrieve
            | Operation::Integrate
            | Operation::ReflectMeaning
            | Operation::Actualize => Mode::Reflective,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Operation::Sense => "sense",
            Operation::Assess => "assess",
            Operation::FormIdea => "form_idea",
            Operation::Encode => "encode",
            Operation::Act => "act",
            Operation::Retrieve => "retrieve",
            Operation::Broadcast => "broadcast",
            Operation::Integrate => "integrate",
            Operation::Project => "project",
            Operation::ReflectMeaning => "reflect_meaning",
            Operation::Commit => "commit",
            Operation::Actualize => "actualize",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque, handler-defined output. The scheduler never inspects it.
pub type Payload = serde_json::Value;

/// Typed report a handler may attach to its output. Unlike the payload,
/// signals are read by the integrator when scoring coherence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Signal {
    /// Integrate: number of conflicts the handler could not resolve
    Unresolved(u32),
    /// Actualize: whether the outcome matches the preceding Commit
    Aligned(bool),
}

/// One lane's output for one step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub lane: LaneId,
    pub step: Step,
    /// `None` marks a no-op (lane inactive, or missing)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<Signal>,
    #[serde(default)]
    pub degraded: bool,
    /// Why the event is degraded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub emitted_at: DateTime<Utc>,
}

impl Event {
    fn base(lane: LaneId, step: Step) -> Self {
        Self {
            id: Uuid::new_v4(),
            lane,
            step,
            operation: None,
            mode: None,
            payload: None,
            signal: None,
            degraded: false,
            reason: None,
            emitted_at: Utc::now(),
        }
    }

    /// Marker for a lane that was not scheduled this step.
    pub fn noop(lane: LaneId, step: Step) -> Self {
        Self::base(lane, step)
    }

    pub fn completed(
        lane: LaneId,
        step: Step,
        operation: Operation,
        mode: Mode,
        payload: Payload,
        signal: Option<Signal>,
    ) -> Self {
        Self {
            operation: Some(operation),
            mode: Some(mode),
            payload: Some(payload),
            signal,
            ..Self::base(lane, step)
        }
    }

    /// An active step whose handler timed out or failed.
    pub fn degraded(
        lane: LaneId,
        step: Step,
        operation: Operation,
        mode: Mode,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            operation: Some(operation),
            mode: Some(mode),
            degraded: true,
            reason: Some(reason.into()),
            ..Self::base(lane, step)
        }
    }

    /// Synthetic stand-in for a lane that never reported.
    pub fn missing(lane: LaneId, step: Step, reason: impl Into<String>) -> Self {
        Self {
            degraded: true,
            reason: Some(reason.into()),
            ..Self::base(lane, step)
        }
    }

    pub fn is_noop(&self) -> bool {
        self.operation.is_none()
    }

    pub fn is_operation(&self, operation: Operation) -> bool {
        self.operation == Some(operation)
    }
}

/// Per-lane bookkeeping, owned and mutated by exactly one lane
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaneState {
    pub lane: LaneId,
    pub position_in_pattern: u8,
    pub last_operation: Option<Operation>,
    pub last_mode: Option<Mode>,
    pub last_event_ref: Option<Uuid>,
    pub active_steps: u64,
    pub degraded_steps: u64,
}

impl LaneState {
    pub fn new(lane: LaneId) -> Self {
        Self {
            lane,
            position_in_pattern: 0,
            last_operation: None,
            last_mode: None,
            last_event_ref: None,
            active_steps: 0,
            degraded_steps: 0,
        }
    }

    /// Record an event this lane emitted on one of its active steps.
    pub fn record(&mut self, position: u8, event: &Event) {
        self.position_in_pattern = position;
        self.last_operation = event.operation;
        self.last_mode = event.mode;
        self.last_event_ref = Some(event.id);
        self.active_steps += 1;
        if event.degraded {
            self.degraded_steps += 1;
        }
    }
}

/// Which global lane is the semantic anchor for a step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Holder {
    Opponent,
    Narrative,
    Both,
}

impl std::fmt::Display for Holder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Holder::Opponent => f.write_str("opponent"),
            Holder::Narrative => f.write_str("narrative"),
            Holder::Both => f.write_str("both"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilizerDecision {
    pub step: Step,
    pub holder: Holder,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// The integrator's step-level wait expired before the lane reported
    MissingLaneEvent,
    /// A lane reported an event tagged with another step
    StepMismatch,
    /// OpponentLane's Integrate reported conflicts it could not resolve
    UnresolvedIntegration,
    /// NarrativeLane's Actualize diverged from the preceding Commit
    Misalignment,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lane: Option<LaneId>,
    pub kind: ConflictKind,
    pub detail: String,
}

impl Conflict {
    pub fn new(lane: Option<LaneId>, kind: ConflictKind, detail: impl Into<String>) -> Self {
        Self {
            lane,
            kind,
            detail: detail.into(),
        }
    }
}

/// The one authoritative merged output of a step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconciledSnapshot {
    pub step: Step,
    /// Indexed by `LaneId::index()`
    pub events: [Event; LANE_COUNT],
    pub stabilizer: StabilizerDecision,
    pub coherence: f64,
    pub conflicts: Vec<Conflict>,
}

impl ReconciledSnapshot {
    pub fn event(&self, lane: LaneId) -> &Event {
        &self.events[lane.index()]
    }

    pub fn degraded_count(&self) -> usize {
        self.events.iter().filter(|e| e.degraded).count()
    }

    /// Lanes for which a synthetic event was substituted.
    pub fn missing_lanes(&self) -> Vec<LaneId> {
        self.conflicts
            .iter()
            .filter(|c| c.kind == ConflictKind::MissingLaneEvent)
            .filter_map(|c| c.lane)
            .collect()
    }

    /// True when every lane reported in time.
    pub fn is_complete(&self) -> bool {
        self.missing_lanes().is_empty()
    }

    /// PhaseLane active this step, if any.
    pub fn active_phase_lane(&self) -> Option<LaneId> {
        LaneId::PHASE
            .iter()
            .copied()
            .find(|lane| !self.event(*lane).is_noop())
    }
}
