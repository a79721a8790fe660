//! Fault injection: make one lane fail from a given step on

use crate::registry::{
    HandlerError, HandlerRegistry, HandlerResult, LocalContext, OperationHandler,
};
use echobeats_core::{LaneId, Mode, Operation, Step};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultKind {
    /// Return an explicit error
    Error,
    /// Never return; the caller's timeout has to fire
    Hang,
}

/// Wraps a handler and fails every call for `lane` at or after `from`.
pub struct FaultInjector {
    inner: Arc<dyn OperationHandler>,
    lane: LaneId,
    from: Step,
    kind: FaultKind,
}

impl FaultInjector {
    pub fn new(inner: Arc<dyn OperationHandler>, lane: LaneId, from: Step, kind: FaultKind) -> Self {
        Self {
            inner,
            lane,
            from,
            kind,
        }
    }

    fn applies(&self, lane: LaneId, step: Step) -> bool {
        lane == self.lane && step >= self.from
    }
}

#[async_trait::async_trait]
impl OperationHandler for FaultInjector {
    fn name(&self) -> &str {
        "fault"
    }

    async fn handle(
        &self,
        lane: LaneId,
        operation: Operation,
        mode: Mode,
        ctx: &LocalContext,
    ) -> HandlerResult {
        if !self.applies(lane, ctx.step) {
            return self.inner.handle(lane, operation, mode, ctx).await;
        }
        match self.kind {
            FaultKind::Error => Err(HandlerError::failed(format!(
                "injected fault on {} at step {}",
                lane, ctx.step
            ))),
            FaultKind::Hang => std::future::pending().await,
        }
    }

    /// Unfaulted calls keep the wrapped handler's own cancellation.
    async fn handle_cancellable(
        &self,
        lane: LaneId,
        operation: Operation,
        mode: Mode,
        ctx: &LocalContext,
        cancel: CancellationToken,
    ) -> HandlerResult {
        if !self.applies(lane, ctx.step) {
            return self
                .inner
                .handle_cancellable(lane, operation, mode, ctx, cancel)
                .await;
        }
        tokio::select! {
            result = self.handle(lane, operation, mode, ctx) => result,
            _ = cancel.cancelled() => Err(HandlerError::Cancelled),
        }
    }
}

/// Wrap every handler of `lane` in a FaultInjector.
pub fn inject_fault(registry: &mut HandlerRegistry, lane: LaneId, from: Step, kind: FaultKind) {
    warn!(%lane, %from, ?kind, "injecting handler fault");
    registry.wrap_lane(lane, |inner| {
        Arc::new(FaultInjector::new(inner, lane, from, kind)) as Arc<dyn OperationHandler>
    });
}
