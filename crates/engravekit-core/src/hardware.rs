//! Hardware session states shared between the channel and its observers.

use serde::{Deserialize, Serialize};

/// Connection state of the single device link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No link is open
    #[default]
    Disconnected,
    /// A link is being opened
    Connecting,
    /// Connected and ready for work
    Idle,
    /// A job or command holds the channel
    Busy,
    /// Firmware fault; needs an explicit unlock
    Alarm,
    /// Operator stop; needs unlock and home
    EmergencyStopped,
}

impl SessionState {
    /// Whether a link to the device is open
    pub fn is_connected(&self) -> bool {
        !matches!(self, SessionState::Disconnected | SessionState::Connecting)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting => "Connecting",
            SessionState::Idle => "Idle",
            SessionState::Busy => "Busy",
            SessionState::Alarm => "Alarm",
            SessionState::EmergencyStopped => "EmergencyStopped",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last reported machine position in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MachinePosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}
