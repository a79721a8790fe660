//! Trace handler — deterministic payload describing the invocation

use crate::registry::{HandlerResult, LocalContext, OperationHandler};
use echobeats_core::{LaneId, Mode, Operation};
use serde_json::json;
use tracing::trace;

/// Echoes what was asked of it. Stands in wherever no real collaborator
/// (text generator, store) is wired.
#[derive(Clone, Debug, Default)]
pub struct TraceHandler;

impl TraceHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl OperationHandler for TraceHandler {
    fn name(&self) -> &str {
        "trace"
    }

    async fn handle(
        &self,
        lane: LaneId,
        operation: Operation,
        mode: Mode,
        ctx: &LocalContext,
    ) -> HandlerResult {
        trace!(%lane, %operation, step = %ctx.step, "trace handler");
        Ok(json!({
            "lane": lane,
            "operation": operation,
            "mode": mode,
            "step": ctx.step,
            "position": ctx.position,
            "prior_coherence": ctx.previous_snapshot.as_ref().map(|s| s.coherence),
            "follows": ctx.previous_payload.is_some(),
        })
        .into())
    }
}
