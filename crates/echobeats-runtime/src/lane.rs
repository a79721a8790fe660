//! Lane workers, one tokio task per lane
//!
//! A worker waits for its tick, consults the LanePattern and, when active,
//! dispatches the operation to the handler registry. Every tick yields exactly
//! one Event: a no-op when idle, a degraded event when the handler fails.
//!
//! PhaseLanes additionally publish to the step's phase feed, which the
//! OpponentLane gathers for Integrate. The NarrativeLane keeps a one-slot
//! buffer of its previous payload so each operation sees its predecessor.

use echobeats_core::{Event, LaneId, LanePattern, LaneState, Operation, Payload, ReconciledSnapshot, Step};
use echobeats_handlers::{HandlerError, HandlerRegistry, LocalContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Ticks a lane may have queued before the driver reports it as lagging.
pub(crate) const TICK_QUEUE: usize = 4;

/// Everything a lane needs to process one step
pub(crate) struct LaneTick {
    pub step: Step,
    pub previous: Option<Arc<ReconciledSnapshot>>,
    /// The integrator's inbox for this step
    pub inbox: mpsc::Sender<Event>,
    /// PhaseLanes: where to publish for the OpponentLane
    pub feed_tx: Option<mpsc::Sender<Event>>,
    /// OpponentLane: where PhaseLane events arrive
    pub feed_rx: Option<mpsc::Receiver<Event>>,
}

pub(crate) struct LaneWorker {
    lane: LaneId,
    pattern: LanePattern,
    registry: Arc<HandlerRegistry>,
    handler_timeout: Duration,
    /// OpponentLane: how long Integrate waits for the phase feed
    gather_timeout: Duration,
    state: LaneState,
    /// NarrativeLane only: (step, payload) of the last operation
    carry: Option<(Step, Option<Payload>)>,
    ticks: mpsc::Receiver<LaneTick>,
    cancel: CancellationToken,
}

impl LaneWorker {
    pub fn new(
        lane: LaneId,
        pattern: LanePattern,
        registry: Arc<HandlerRegistry>,
        handler_timeout: Duration,
        gather_timeout: Duration,
        ticks: mpsc::Receiver<LaneTick>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            lane,
            pattern,
            registry,
            handler_timeout,
            gather_timeout,
            state: LaneState::new(lane),
            carry: None,
            ticks,
            cancel,
        }
    }

    /// Process ticks until cancelled or the driver hangs up. Returns the
    /// final lane state.
    pub async fn run(mut self) -> LaneState {
        debug!(lane = %self.lane, "lane started");
        let cancel = self.cancel.clone();
        loop {
            let tick = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                tick = self.next_tick() => match tick {
                    Some(tick) => tick,
                    None => break,
                },
            };
            if !self.process(tick).await {
                break;
            }
        }
        info!(
            lane = %self.lane,
            active = self.state.active_steps,
            degraded = self.state.degraded_steps,
            "lane stopped"
        );
        self.state
    }

    /// Receive the next tick. Drains anything already queued so a lagging
    /// lane jumps to the newest step instead of replaying stale ones.
    async fn next_tick(&mut self) -> Option<LaneTick> {
        let mut tick = self.ticks.recv().await?;
        while let Ok(newer) = self.ticks.try_recv() {
            debug!(lane = %self.lane, skipped = %tick.step, "lane lagging, skipping stale tick");
            tick = newer;
        }
        Some(tick)
    }

    /// Returns false when the lane was cancelled mid-step.
    async fn process(&mut self, tick: LaneTick) -> bool {
        let LaneTick {
            step,
            previous,
            inbox,
            feed_tx,
            mut feed_rx,
        } = tick;

        let event = match self.pattern.active(self.lane, step) {
            None => Event::noop(self.lane, step),
            Some(slot) => {
                let mut ctx =
                    LocalContext::new(step, slot.position).with_previous_snapshot(previous);
                if slot.operation == Operation::Integrate {
                    if let Some(rx) = feed_rx.as_mut() {
                        ctx.phase_events = self.gather_phase_events(rx, step).await;
                    }
                }
                if self.lane == LaneId::Narrative {
                    ctx.previous_payload = self.carried_payload(step, slot.position);
                }

                let result = self
                    .registry
                    .dispatch(
                        self.lane,
                        slot.operation,
                        slot.mode,
                        &ctx,
                        self.handler_timeout,
                        self.cancel.clone(),
                    )
                    .await;

                let event = match result {
                    Ok(output) => Event::completed(
                        self.lane,
                        step,
                        slot.operation,
                        slot.mode,
                        output.payload,
                        output.signal,
                    ),
                    Err(HandlerError::Cancelled) => {
                        debug!(lane = %self.lane, %step, "handler cancelled, abandoning step");
                        return false;
                    }
                    Err(e) => {
                        warn!(lane = %self.lane, %step, operation = %slot.operation, "degraded: {}", e);
                        Event::degraded(self.lane, step, slot.operation, slot.mode, e.to_string())
                    }
                };

                self.state.record(slot.position, &event);
                if self.lane == LaneId::Narrative {
                    self.carry = Some((step, event.payload.clone()));
                }
                event
            }
        };

        if let Some(feed) = feed_tx {
            // Opponent not integrating this step: receiver already gone.
            let _ = feed.try_send(event.clone());
        }
        if inbox.try_send(event).is_err() {
            debug!(lane = %self.lane, %step, "integrator moved on, event for step dropped");
        }
        true
    }

    /// Predecessor payload for a narrative operation. Project opens a new
    /// pipeline; every later stage only sees the payload of the step
    /// immediately before it.
    fn carried_payload(&self, step: Step, position: u8) -> Option<Payload> {
        if position == 0 {
            return None;
        }
        match &self.carry {
            Some((carried_step, payload)) if carried_step.next() == Some(step) => payload.clone(),
            _ => None,
        }
    }

    /// Collect this step's PhaseLane events. Every PhaseLane emits once per
    /// tick, so this normally ends on the third event. The gather bound
    /// outlasts the handler timeout so a timed-out lane's degraded event
    /// still arrives before it expires.
    async fn gather_phase_events(&self, rx: &mut mpsc::Receiver<Event>, step: Step) -> Vec<Event> {
        let deadline = Instant::now() + self.gather_timeout;
        let mut events = Vec::with_capacity(LaneId::PHASE.len());
        while events.len() < LaneId::PHASE.len() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Some(event) if event.step == step => events.push(event),
                    Some(_) => continue,
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline) => {
                    debug!(%step, gathered = events.len(), "phase feed wait expired");
                    break;
                }
            }
        }
        // Merge is order-independent: sort by lane, not arrival
        events.sort_by_key(|e| e.lane.index());
        events
    }
}
