//! Actualize handler: checks the outcome against the preceding Commit

use crate::registry::{HandlerOutput, HandlerResult, LocalContext, OperationHandler};
use echobeats_core::{LaneId, Mode, Operation, Signal};
use serde_json::json;

/// Actualizes whatever the Commit step produced. Aligned iff there was a
/// non-null Commit payload to actualize.
#[derive(Clone, Debug, Default)]
pub struct ActualizeHandler;

impl ActualizeHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl OperationHandler for ActualizeHandler {
    fn name(&self) -> &str {
        "actualize"
    }

    async fn handle(
        &self,
        _lane: LaneId,
        _operation: Operation,
        _mode: Mode,
        ctx: &LocalContext,
    ) -> HandlerResult {
        let commitment = ctx.previous_payload.clone().filter(|p| !p.is_null());
        let aligned = commitment.is_some();
        Ok(HandlerOutput::new(json!({
            "step": ctx.step,
            "actualized": commitment,
            "aligned": aligned,
        }))
        .with_signal(Signal::Aligned(aligned)))
    }
}
