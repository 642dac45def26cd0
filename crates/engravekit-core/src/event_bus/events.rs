//! Event type definitions for the event bus.
//!
//! Events are cloneable and serializable so they can be logged or streamed
//! to a dashboard unchanged.

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;
use crate::hardware::SessionState;
use crate::job::JobSource;

/// Root event enum for all application events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppEvent {
    /// Job lifecycle
    Job(JobEvent),
    /// Device link and firmware
    Hardware(HardwareEvent),
    /// Surface occupancy
    Placement(PlacementEvent),
    /// Event source adapter
    Intake(IntakeEvent),
    /// Configuration changes
    Settings(SettingsEvent),
}

impl AppEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            AppEvent::Job(_) => EventCategory::Job,
            AppEvent::Hardware(_) => EventCategory::Hardware,
            AppEvent::Placement(_) => EventCategory::Placement,
            AppEvent::Intake(_) => EventCategory::Intake,
            AppEvent::Settings(_) => EventCategory::Settings,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            AppEvent::Job(e) => e.description(),
            AppEvent::Hardware(e) => e.description(),
            AppEvent::Placement(e) => e.description(),
            AppEvent::Intake(e) => e.description(),
            AppEvent::Settings(e) => e.description(),
        }
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    Job,
    Hardware,
    Placement,
    Intake,
    Settings,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::Job => write!(f, "Job"),
            EventCategory::Hardware => write!(f, "Hardware"),
            EventCategory::Placement => write!(f, "Placement"),
            EventCategory::Intake => write!(f, "Intake"),
            EventCategory::Settings => write!(f, "Settings"),
        }
    }
}

/// Job lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobEvent {
    /// Accepted into the queue.
    Enqueued {
        id: String,
        name: String,
        source: JobSource,
    },
    /// Rejected because the same name is pending.
    DuplicateRejected { name: String },
    /// Space reserved on the surface.
    Placed {
        id: String,
        rect: Rect,
        text_height_mm: f64,
    },
    /// Streaming to the device started.
    EngravingStarted { id: String, name: String },
    /// Program lines acknowledged so far.
    Progress { id: String, sent: usize, total: usize },
    /// Engraved and recorded.
    Completed { id: String, name: String },
    /// Attempt failed.
    Failed {
        id: String,
        error: String,
        will_retry: bool,
    },
    /// Returned to the queue after a transient failure.
    Requeued {
        id: String,
        attempt: u32,
        delay_ms: u64,
    },
}

impl JobEvent {
    fn description(&self) -> String {
        match self {
            JobEvent::Enqueued { id, name, source } => {
                format!("Job {} queued: '{}' ({})", id, name, source)
            }
            JobEvent::DuplicateRejected { name } => format!("Duplicate '{}' ignored", name),
            JobEvent::Placed {
                id,
                rect,
                text_height_mm,
            } => format!(
                "Job {} placed at ({:.1}, {:.1}) {:.1}x{:.1}mm, text {:.1}mm",
                id, rect.x, rect.y, rect.width, rect.height, text_height_mm
            ),
            JobEvent::EngravingStarted { id, name } => {
                format!("Job {} engraving '{}'", id, name)
            }
            JobEvent::Progress { id, sent, total } => {
                format!("Job {} progress {}/{}", id, sent, total)
            }
            JobEvent::Completed { id, name } => format!("Job {} done: '{}'", id, name),
            JobEvent::Failed {
                id,
                error,
                will_retry,
            } => format!(
                "Job {} failed{}: {}",
                id,
                if *will_retry { " (will retry)" } else { "" },
                error
            ),
            JobEvent::Requeued {
                id,
                attempt,
                delay_ms,
            } => format!("Job {} requeued, attempt {} in {}ms", id, attempt, delay_ms),
        }
    }
}

/// Hardware events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HardwareEvent {
    /// Session state transition.
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// Link opened.
    Connected { endpoint: String },
    /// Link closed or lost.
    Disconnected { endpoint: String, reason: String },
    /// A command went unanswered.
    CommandTimeout { command: String, consecutive: u32 },
    /// Firmware alarm.
    Alarm { code: u8, message: String },
    /// Emergency stop sent.
    EmergencyStop,
    /// Status report received.
    Status {
        state: String,
        x: f64,
        y: f64,
        z: f64,
    },
}

impl HardwareEvent {
    fn description(&self) -> String {
        match self {
            HardwareEvent::StateChanged { from, to } => {
                format!("Hardware {} -> {}", from, to)
            }
            HardwareEvent::Connected { endpoint } => format!("Connected to {}", endpoint),
            HardwareEvent::Disconnected { endpoint, reason } => {
                format!("Disconnected from {}: {}", endpoint, reason)
            }
            HardwareEvent::CommandTimeout {
                command,
                consecutive,
            } => format!("Timeout on '{}' ({} consecutive)", command, consecutive),
            HardwareEvent::Alarm { code, message } => format!("ALARM:{} {}", code, message),
            HardwareEvent::EmergencyStop => "Emergency stop".to_string(),
            HardwareEvent::Status { state, x, y, z } => {
                format!("Status {} at ({:.3}, {:.3}, {:.3})", state, x, y, z)
            }
        }
    }
}

/// Placement events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlacementEvent {
    /// A placement record was appended.
    Committed { id: String, text: String, rect: Rect },
    /// All placements cleared.
    Cleared { archive: Option<String> },
    /// Active surface resized.
    SurfaceResized { width: f64, height: f64 },
}

impl PlacementEvent {
    fn description(&self) -> String {
        match self {
            PlacementEvent::Committed { id, text, rect } => format!(
                "Placement {} '{}' at ({:.1}, {:.1})",
                id, text, rect.x, rect.y
            ),
            PlacementEvent::Cleared { archive } => match archive {
                Some(path) => format!("Placements cleared, archived to {}", path),
                None => "Placements cleared".to_string(),
            },
            PlacementEvent::SurfaceResized { width, height } => {
                format!("Surface resized to {:.1}x{:.1}mm", width, height)
            }
        }
    }
}

/// Event source adapter events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IntakeEvent {
    MonitorStarted { source: String },
    MonitorStopped { source: String },
    /// A name arrived from a source.
    Received { name: String, source: JobSource },
}

impl IntakeEvent {
    fn description(&self) -> String {
        match self {
            IntakeEvent::MonitorStarted { source } => format!("Event monitor {} started", source),
            IntakeEvent::MonitorStopped { source } => format!("Event monitor {} stopped", source),
            IntakeEvent::Received { name, source } => {
                format!("Received '{}' from {}", name, source)
            }
        }
    }
}

/// Settings events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SettingsEvent {
    ConfigUpdated,
    EngravingAreaUpdated { width: f64, height: f64 },
}

impl SettingsEvent {
    fn description(&self) -> String {
        match self {
            SettingsEvent::ConfigUpdated => "Configuration updated".to_string(),
            SettingsEvent::EngravingAreaUpdated { width, height } => {
                format!("Engraving area set to {:.1}x{:.1}mm", width, height)
            }
        }
    }
}
