//! Echobeats Runtime — the phase-synchronized lane scheduler
//!
//! Five lanes run as independent tokio tasks:
//! - three PhaseLanes (Affordance, Relevance, Salience), each active once per
//!   4-step beat at its own offset
//! - the OpponentLane, alternating Broadcast and Integrate
//! - the NarrativeLane, cycling Project, ReflectMeaning, Commit, Actualize
//!
//! A single driver advances the StepClock and, per step, lets the
//! GlobalIntegrator merge the lanes' events into one ReconciledSnapshot.

pub mod clock;
pub mod config;
pub mod integrator;
pub(crate) mod lane;
pub mod metrics;
pub mod scheduler;
pub mod stream;

pub use clock::StepClock;
pub use config::SchedulerConfig;
pub use integrator::{Collection, GlobalIntegrator};
pub use metrics::Metrics;
pub use scheduler::{RunReport, Scheduler, SchedulerHandle};
pub use stream::{Delivery, SnapshotStream};
