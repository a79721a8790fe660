//! Handler registry and trait definitions
//!
//! Operations carry no behavior inside the scheduler. Each `(LaneId, Operation)`
//! pair is routed to an OperationHandler registered here; the registry is the
//! tagged dispatch table the scheduler consults on every active step.

use echobeats_core::{
    Event, LaneId, LanePattern, Mode, Operation, Payload, ReconciledSnapshot, Signal, Step,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything a handler may read about the step it runs in.
#[derive(Clone, Debug, Default)]
pub struct LocalContext {
    pub step: Step,
    /// Position of the operation within the lane's sequence
    pub position: u8,
    /// Last published snapshot (the unifying signal for Broadcast)
    pub previous_snapshot: Option<Arc<ReconciledSnapshot>>,
    /// This step's PhaseLane events, only filled for Integrate
    pub phase_events: Vec<Event>,
    /// Previous narrative operation's payload from the same cycle
    pub previous_payload: Option<Payload>,
}

impl LocalContext {
    pub fn new(step: Step, position: u8) -> Self {
        Self {
            step,
            position,
            ..Default::default()
        }
    }

    pub fn with_previous_snapshot(mut self, snapshot: Option<Arc<ReconciledSnapshot>>) -> Self {
        self.previous_snapshot = snapshot;
        self
    }

    pub fn with_phase_events(mut self, events: Vec<Event>) -> Self {
        self.phase_events = events;
        self
    }

    pub fn with_previous_payload(mut self, payload: Option<Payload>) -> Self {
        self.previous_payload = payload;
        self
    }
}

/// What a handler returns on success
#[derive(Clone, Debug, PartialEq)]
pub struct HandlerOutput {
    pub payload: Payload,
    pub signal: Option<Signal>,
}

impl HandlerOutput {
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            signal: None,
        }
    }

    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = Some(signal);
        self
    }
}

impl From<Payload> for HandlerOutput {
    fn from(payload: Payload) -> Self {
        Self::new(payload)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandlerError {
    #[error("handler timed out after {0:?}")]
    Timeout(Duration),

    #[error("handler failed: {0}")]
    Failed(String),

    #[error("handler cancelled")]
    Cancelled,

    #[error("no handler registered for {lane}/{operation}")]
    NotRegistered { lane: LaneId, operation: Operation },
}

impl HandlerError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

pub type HandlerResult = Result<HandlerOutput, HandlerError>;

/// Implement this to give an operation behavior.
///
/// Handlers must be cheap to share across lanes. A handler that manages
/// external resources (a text generator, a store) should override
/// `handle_cancellable` to abort its in-flight work on shutdown.
#[async_trait::async_trait]
pub trait OperationHandler: Send + Sync {
    /// Short handler name for logs.
    fn name(&self) -> &str;

    async fn handle(
        &self,
        lane: LaneId,
        operation: Operation,
        mode: Mode,
        ctx: &LocalContext,
    ) -> HandlerResult;

    /// Default: race `handle()` against cancellation.
    async fn handle_cancellable(
        &self,
        lane: LaneId,
        operation: Operation,
        mode: Mode,
        ctx: &LocalContext,
        cancel: CancellationToken,
    ) -> HandlerResult {
        tokio::select! {
            result = self.handle(lane, operation, mode, ctx) => result,
            _ = cancel.cancelled() => Err(HandlerError::Cancelled),
        }
    }
}

type HandlerFn = dyn Fn(LaneId, Operation, Mode, &LocalContext) -> HandlerResult + Send + Sync;

/// Adapter turning a synchronous closure into an OperationHandler.
pub struct FnHandler {
    name: String,
    f: Box<HandlerFn>,
}

impl FnHandler {
    pub fn new(
        name: impl Into<String>,
        f: impl Fn(LaneId, Operation, Mode, &LocalContext) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            f: Box::new(f),
        }
    }
}

#[async_trait::async_trait]
impl OperationHandler for FnHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        lane: LaneId,
        operation: Operation,
        mode: Mode,
        ctx: &LocalContext,
    ) -> HandlerResult {
        (self.f)(lane, operation, mode, ctx)
    }
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<(LaneId, Operation), Arc<dyn OperationHandler>>,
    fallback: Option<Arc<dyn OperationHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Replaces any existing handler for the same pair.
    pub fn register(
        &mut self,
        lane: LaneId,
        operation: Operation,
        handler: impl OperationHandler + 'static,
    ) {
        self.register_shared(lane, operation, Arc::new(handler));
    }

    pub fn register_shared(
        &mut self,
        lane: LaneId,
        operation: Operation,
        handler: Arc<dyn OperationHandler>,
    ) {
        self.handlers.insert((lane, operation), handler);
    }

    /// Register one handler for every operation the lane performs.
    pub fn register_lane(&mut self, lane: LaneId, handler: impl OperationHandler + 'static) {
        let handler: Arc<dyn OperationHandler> = Arc::new(handler);
        for operation in LanePattern::operations(lane) {
            self.register_shared(lane, operation, handler.clone());
        }
    }

    /// Handler used for any pair with no explicit registration.
    pub fn set_fallback(&mut self, handler: impl OperationHandler + 'static) {
        self.fallback = Some(Arc::new(handler));
    }

    pub fn remove(&mut self, lane: LaneId, operation: Operation) -> bool {
        self.handlers.remove(&(lane, operation)).is_some()
    }

    pub fn get(&self, lane: LaneId, operation: Operation) -> Option<Arc<dyn OperationHandler>> {
        self.handlers
            .get(&(lane, operation))
            .or(self.fallback.as_ref())
            .cloned()
    }

    /// Replace every handler a lane can reach (including the fallback) with
    /// `wrap(current)`. Pairs with no handler at all are left unregistered.
    pub fn wrap_lane(
        &mut self,
        lane: LaneId,
        wrap: impl Fn(Arc<dyn OperationHandler>) -> Arc<dyn OperationHandler>,
    ) {
        for operation in LanePattern::operations(lane) {
            if let Some(current) = self.get(lane, operation) {
                self.handlers.insert((lane, operation), wrap(current));
            }
        }
    }

    /// Run the handler for `(lane, operation)` bounded by `timeout` and `cancel`.
    pub async fn dispatch(
        &self,
        lane: LaneId,
        operation: Operation,
        mode: Mode,
        ctx: &LocalContext,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> HandlerResult {
        let handler = self
            .get(lane, operation)
            .ok_or(HandlerError::NotRegistered { lane, operation })?;
        match tokio::time::timeout(
            timeout,
            handler.handle_cancellable(lane, operation, mode, ctx, cancel),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(HandlerError::Timeout(timeout)),
        }
    }

    /// Registered pairs with their handler names, sorted by lane then operation name.
    pub fn list(&self) -> Vec<(LaneId, Operation, &str)> {
        let mut entries: Vec<_> = self
            .handlers
            .iter()
            .map(|((lane, op), h)| (*lane, *op, h.name()))
            .collect();
        entries.sort_by_key(|(lane, op, _)| (*lane, op.name()));
        entries
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}
