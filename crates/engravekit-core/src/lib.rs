//! # EngraveKit Core
//!
//! Core types shared by every EngraveKit crate: the error taxonomy, the
//! engrave request model, surface geometry, the hardware session states,
//! the application event bus and cancellable scheduled tasks.

pub mod backoff;
pub mod error;
pub mod event_bus;
pub mod geometry;
pub mod hardware;
pub mod job;
pub mod persist;
pub mod task;

pub use backoff::BackoffPolicy;

pub use error::{
    CompileError, Error, ErrorKind, HardwareError, PlacementError, Result,
};

pub use event_bus::{
    AppEvent, EventBus, EventCategory, EventFilter, HardwareEvent, IntakeEvent, JobEvent,
    PlacementEvent, SettingsEvent, DEFAULT_HISTORY,
};

pub use geometry::{Point, Rect, Size, EPSILON};

pub use hardware::{MachinePosition, SessionState};

pub use job::{
    normalize_name, EngraveRequest, JobId, JobPlacement, JobSource, JobStatus, MAX_NAME_CHARS,
};

pub use task::{ScheduledTask, ShutdownSignal};
