//! Echobeats Handlers — the operation dispatch table
//!
//! Each built-in handler is a self-contained file in src/handlers/.
//! External collaborators (text generators, stores) plug in by implementing
//! OperationHandler and registering against a `(LaneId, Operation)` pair.

pub mod handlers;
pub mod registry;

pub use handlers::actualize::ActualizeHandler;
pub use handlers::fault::{inject_fault, FaultInjector, FaultKind};
pub use handlers::integrate::IntegrationHandler;
pub use handlers::trace::TraceHandler;
pub use registry::{
    FnHandler, HandlerError, HandlerOutput, HandlerRegistry, HandlerResult, LocalContext,
    OperationHandler,
};

use echobeats_core::{LaneId, Operation};

/// Create the default registry with all built-in handlers.
///
/// Every pair falls back to TraceHandler; Integrate and Actualize get the
/// handlers that report the signals coherence scoring reads.
pub fn create_default_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.set_fallback(TraceHandler::new());

    registry.register(LaneId::Opponent, Operation::Integrate, IntegrationHandler::new());
    registry.register(LaneId::Narrative, Operation::Actualize, ActualizeHandler::new());

    registry
}
