//! Integration handler — folds the step's PhaseLane events for Integrate

use crate::registry::{HandlerOutput, HandlerResult, LocalContext, OperationHandler};
use echobeats_core::{LaneId, Mode, Operation, Signal};
use serde_json::json;
use tracing::debug;

/// Folds PhaseLane outputs into one summary. A degraded PhaseLane event is
/// a conflict this handler cannot resolve: there is no payload to fold.
#[derive(Clone, Debug, Default)]
pub struct IntegrationHandler;

impl IntegrationHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl OperationHandler for IntegrationHandler {
    fn name(&self) -> &str {
        "integrate"
    }

    async fn handle(
        &self,
        _lane: LaneId,
        _operation: Operation,
        _mode: Mode,
        ctx: &LocalContext,
    ) -> HandlerResult {
        let mut folded = Vec::new();
        let mut unresolved = Vec::new();
        for event in ctx.phase_events.iter().filter(|e| e.step == ctx.step) {
            if event.degraded {
                unresolved.push(event.lane);
            } else if !event.is_noop() {
                folded.push(json!({
                    "lane": event.lane,
                    "operation": event.operation,
                    "payload": event.payload,
                }));
            }
        }
        debug!(
            step = %ctx.step,
            folded = folded.len(),
            unresolved = unresolved.len(),
            "integrated phase events"
        );
        let count = unresolved.len() as u32;
        Ok(HandlerOutput::new(json!({
            "folded": folded,
            "unresolved": unresolved,
        }))
        .with_signal(Signal::Unresolved(count)))
    }
}
