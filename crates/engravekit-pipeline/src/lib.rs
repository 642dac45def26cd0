//! # EngraveKit Pipeline
//!
//! The durable job queue, the orchestrator that drives one request at a
//! time through placement, compilation and the hardware channel, the
//! event intake boundary and the operator service facade.

pub mod intake;
pub mod orchestrator;
pub mod queue;
pub mod service;

pub use intake::{
    intake_channel, run_intake, start_intake, EventMonitor, EventSource, IntakeSender,
    IntakeStats, SpoolDirSource, SubscriptionEvent,
};

pub use orchestrator::Orchestrator;

pub use queue::{JobOutcome, JobQueue, INTERRUPTED};

pub use service::{
    EngraverService, ManualPlacement, PlacementEntry, PlacementView, QueueEntry, ServiceStatus,
};
