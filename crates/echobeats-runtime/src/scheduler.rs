//! Scheduler: owns the StepClock, supervises the five lanes and drives the
//! GlobalIntegrator once per step.
//!
//! Per step the driver hands every lane a tick carrying a fresh inbox, waits
//! for the integrator, publishes the snapshot, then advances the clock.
//! Snapshots are published strictly in step order by this single driver.

use crate::clock::StepClock;
use crate::config::SchedulerConfig;
use crate::integrator::GlobalIntegrator;
use crate::lane::{LaneTick, LaneWorker, TICK_QUEUE};
use crate::metrics::Metrics;
use crate::stream::SnapshotStream;
use echobeats_core::{
    Error, LaneId, LanePattern, LaneState, ReconciledSnapshot, Result, Step, LANE_COUNT,
};
use echobeats_handlers::HandlerRegistry;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a finished run leaves behind
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub metrics: Metrics,
    pub lanes: Vec<LaneState>,
}

pub struct Scheduler {
    config: SchedulerConfig,
    pattern: LanePattern,
    registry: Arc<HandlerRegistry>,
    snapshots: broadcast::Sender<Arc<ReconciledSnapshot>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, registry: HandlerRegistry) -> Result<Self> {
        Self::with_shared_registry(config, Arc::new(registry))
    }

    pub fn with_shared_registry(
        config: SchedulerConfig,
        registry: Arc<HandlerRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        let pattern = config.pattern()?;
        let (snapshots, _) = broadcast::channel(config.stream_capacity);
        Ok(Self {
            config,
            pattern,
            registry,
            snapshots,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Subscribe before `start()` to see every snapshot from the first step.
    pub fn subscribe(&self) -> SnapshotStream {
        SnapshotStream::new(self.snapshots.subscribe())
    }

    /// Spawn the lanes and the driver. Must be called inside a tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let start = Step(self.config.start_step);
        let handler_timeout = self.config.handler_timeout();
        let gather_timeout = self.config.phase_gather_timeout();

        let mut lanes = Vec::with_capacity(LANE_COUNT);
        let mut workers = Vec::with_capacity(LANE_COUNT);
        for lane in LaneId::ALL {
            let (tx, rx) = mpsc::channel(TICK_QUEUE);
            let worker = LaneWorker::new(
                lane,
                self.pattern,
                self.registry.clone(),
                handler_timeout,
                gather_timeout,
                rx,
                cancel.child_token(),
            );
            lanes.push((lane, tx));
            workers.push(tokio::spawn(worker.run()));
        }

        let (step_tx, step_rx) = watch::channel(start);
        let (metrics_tx, metrics_rx) = watch::channel(Metrics::default());
        let template = self.snapshots.subscribe();

        info!(
            start = %start,
            step_ms = self.config.step_duration_ms,
            handler_timeout_ms = self.config.handler_timeout_ms,
            offsets = ?self.config.lane_offsets,
            "Scheduler starting"
        );

        let driver = Driver {
            clock: StepClock::new(start),
            integrator: GlobalIntegrator::new(self.config.step_duration()),
            config: self.config,
            lanes,
            workers,
            last: None,
            snapshots: self.snapshots,
            step_tx,
            metrics_tx,
            cancel: cancel.clone(),
        };

        SchedulerHandle {
            cancel,
            join: tokio::spawn(driver.run()),
            step_rx,
            metrics_rx,
            template,
        }
    }
}

/// Control surface of a running scheduler
pub struct SchedulerHandle {
    cancel: CancellationToken,
    join: JoinHandle<Result<RunReport>>,
    step_rx: watch::Receiver<Step>,
    metrics_rx: watch::Receiver<Metrics>,
    /// Only resubscribed from, never read
    template: broadcast::Receiver<Arc<ReconciledSnapshot>>,
}

impl SchedulerHandle {
    pub fn current_step(&self) -> Step {
        *self.step_rx.borrow()
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics_rx.borrow().clone()
    }

    /// Late subscription: starts at the next published snapshot.
    pub fn subscribe(&self) -> SnapshotStream {
        SnapshotStream::new(self.template.resubscribe())
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cooperative shutdown. The in-flight step is either published with its
    /// gaps marked, or discarded when no lane had reported yet.
    pub async fn stop(self) -> Result<RunReport> {
        info!("Scheduler stop requested");
        self.cancel.cancel();
        self.join().await
    }

    /// Wait for the run to end on its own (`max_steps`) or by a fatal clock fault.
    pub async fn join(self) -> Result<RunReport> {
        self.join
            .await
            .map_err(|e| Error::Internal(format!("scheduler driver failed: {}", e)))?
    }
}

struct Driver {
    clock: StepClock,
    integrator: GlobalIntegrator,
    config: SchedulerConfig,
    lanes: Vec<(LaneId, mpsc::Sender<LaneTick>)>,
    workers: Vec<JoinHandle<LaneState>>,
    last: Option<Arc<ReconciledSnapshot>>,
    snapshots: broadcast::Sender<Arc<ReconciledSnapshot>>,
    step_tx: watch::Sender<Step>,
    metrics_tx: watch::Sender<Metrics>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(mut self) -> Result<RunReport> {
        self.clock.start(self.config.step_duration());
        let outcome = self.drive().await;
        if let Err(e) = &outcome {
            warn!("Scheduler halting: {}", e);
        }

        self.clock.stop();
        self.cancel.cancel();
        self.lanes.clear();

        let mut lanes = Vec::with_capacity(LANE_COUNT);
        for joined in futures::future::join_all(self.workers.drain(..)).await {
            match joined {
                Ok(state) => lanes.push(state),
                Err(e) => warn!("lane task failed: {}", e),
            }
        }

        let metrics = self.metrics_tx.borrow().clone();
        info!(
            steps = metrics.steps_processed,
            degraded = metrics.degraded_event_count,
            coherence = metrics.average_coherence,
            "Scheduler stopped"
        );
        outcome.map(|()| RunReport { metrics, lanes })
    }

    async fn drive(&mut self) -> Result<()> {
        let mut processed: u64 = 0;
        if self.config.max_steps == Some(0) {
            return Ok(());
        }
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                ticked = self.clock.tick() => ticked?,
            }

            let step = self.clock.current();
            self.step_tx.send_replace(step);
            let started = Instant::now();

            if let Some(snapshot) = self.run_step(step).await {
                self.metrics_tx
                    .send_modify(|m| m.record(&snapshot, started.elapsed()));
            }

            processed += 1;
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            if self.config.max_steps.is_some_and(|max| processed >= max) {
                info!(steps = processed, "step budget reached");
                return Ok(());
            }
            self.clock.advance()?;
        }
    }

    /// Tick every lane, collect, reconcile, publish. `None` when the step
    /// was discarded by shutdown before any lane reported.
    async fn run_step(&mut self, step: Step) -> Option<Arc<ReconciledSnapshot>> {
        let (inbox_tx, mut inbox_rx) = mpsc::channel(LANE_COUNT);
        let (feed_tx, feed_rx) = mpsc::channel(LaneId::PHASE.len());
        let mut feed_rx = Some(feed_rx);

        for (lane, ticks) in &self.lanes {
            let tick = LaneTick {
                step,
                previous: self.last.clone(),
                inbox: inbox_tx.clone(),
                feed_tx: lane.phase_index().map(|_| feed_tx.clone()),
                feed_rx: if *lane == LaneId::Opponent {
                    feed_rx.take()
                } else {
                    None
                },
            };
            if ticks.try_send(tick).is_err() {
                warn!(%lane, %step, "lane not accepting ticks");
            }
        }
        // Only the lanes hold senders now; the inbox closes once all are done.
        drop(inbox_tx);
        drop(feed_tx);

        let collection = self.integrator.collect(step, &mut inbox_rx, &self.cancel).await;
        if collection.interrupted && collection.received() == 0 {
            info!(%step, "discarding step interrupted before any lane reported");
            return None;
        }

        let snapshot = Arc::new(self.integrator.finish(collection));
        debug!(
            %step,
            holder = %snapshot.stabilizer.holder,
            coherence = snapshot.coherence,
            degraded = snapshot.degraded_count(),
            conflicts = snapshot.conflicts.len(),
            "step reconciled"
        );
        // No subscribers is fine.
        let _ = self.snapshots.send(snapshot.clone());
        self.last = Some(snapshot.clone());
        Some(snapshot)
    }
}
