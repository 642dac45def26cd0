//! Error handling for EngraveKit
//!
//! Provides the error types for every layer of the engraving pipeline:
//! - Hardware errors (device link, firmware faults, safety stops)
//! - Placement errors (surface allocation)
//! - Compile errors (text to motion conversion)
//!
//! The unified [`Error`] collapses them into the operator-facing taxonomy
//! exposed through [`ErrorKind`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hardware error type
///
/// Represents failures of the exclusive device link, including timeouts,
/// lost connections, firmware rejections and the safety states.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HardwareError {
    /// No link to the device is open
    #[error("Hardware not connected")]
    NotConnected,

    /// The device did not answer within the command timeout
    #[error("Hardware command timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// The consecutive failure limit was reached and the session gave up
    #[error("Hardware disconnected after {failures} consecutive failures")]
    Disconnected {
        /// Number of consecutive failed exchanges.
        failures: u32,
    },

    /// The link failed while opening or was lost mid-exchange
    #[error("Connection error: {reason}")]
    Connection {
        /// The reason the link failed.
        reason: String,
    },

    /// The firmware entered an alarm state
    #[error("Alarm: {code} - {message}")]
    Alarm {
        /// The alarm code (0 when only a status report flagged the alarm).
        code: u8,
        /// The alarm message.
        message: String,
    },

    /// The firmware rejected a command with an `error:N` response
    #[error("Command rejected: error:{code} - {message}")]
    Rejected {
        /// The firmware error code.
        code: u8,
        /// The decoded error message.
        message: String,
    },

    /// An emergency stop is latched
    #[error("Emergency stop active; unlock and home required")]
    EmergencyStopped,

    /// Another caller holds the channel
    #[error("Hardware busy with another operation")]
    Busy,

    /// The session state machine refused an event
    #[error("Invalid hardware transition: {event} while {state}")]
    InvalidTransition {
        /// The session state name.
        state: String,
        /// The rejected event name.
        event: String,
    },
}

impl HardwareError {
    /// Transient failures that a reconnect and retry may clear
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HardwareError::NotConnected
                | HardwareError::Timeout { .. }
                | HardwareError::Disconnected { .. }
                | HardwareError::Connection { .. }
        )
    }
}

/// Placement error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlacementError {
    /// No free rectangle fits, even at the minimum text height
    #[error("No space available for {width:.2}x{height:.2}mm")]
    NoSpaceAvailable {
        /// Requested width in mm.
        width: f64,
        /// Requested height in mm.
        height: f64,
    },

    /// Requested dimensions are not positive or exceed the surface
    #[error("Invalid dimensions {width}x{height}mm: {reason}")]
    InvalidDimensions {
        /// Requested width in mm.
        width: f64,
        /// Requested height in mm.
        height: f64,
        /// Why the dimensions were refused.
        reason: String,
    },

    /// A rectangle would overlap an existing placement
    #[error("Rectangle overlaps placement '{existing}'")]
    Overlap {
        /// Text of the conflicting placement.
        existing: String,
    },

    /// A rectangle lies outside the engraving surface
    #[error("Rectangle ({x}, {y}, {width}x{height}) lies outside the {surface_width}x{surface_height}mm surface")]
    OutOfBounds {
        /// Rectangle x.
        x: f64,
        /// Rectangle y.
        y: f64,
        /// Rectangle width.
        width: f64,
        /// Rectangle height.
        height: f64,
        /// Surface width.
        surface_width: f64,
        /// Surface height.
        surface_height: f64,
    },

    /// The placement file could not be read or written
    #[error("Placement storage error: {reason}")]
    Storage {
        /// The storage failure.
        reason: String,
    },
}

/// Compile error type
///
/// Raised by the text-to-motion compiler. Any of these fails the whole
/// request; partial names are never emitted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// The text contains a character the font cannot draw
    #[error("Unsupported glyph '{ch}' for font '{font}'")]
    UnsupportedGlyph {
        /// The offending character.
        ch: char,
        /// The selected font key.
        font: String,
    },

    /// The font key does not name a known profile
    #[error("Unknown font '{font}'")]
    UnknownFont {
        /// The unknown font key.
        font: String,
    },

    /// Nothing to draw
    #[error("Text has no drawable strokes")]
    EmptyText,

    /// Laser or size parameters are out of range
    #[error("Invalid compile parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Operator-facing error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad configuration, text or dimensions.
    ValidationError,
    /// A request with the same normalized name is still pending.
    DuplicateRequest,
    /// The surface has no room left.
    NoSpaceAvailable,
    /// The text could not be converted to motion.
    CompileError,
    /// The device did not answer in time.
    HardwareTimeout,
    /// The device link is down.
    HardwareDisconnected,
    /// The firmware reported a fault.
    HardwareAlarm,
    /// An emergency stop is latched.
    EmergencyStopped,
    /// The channel is held by another operation.
    HardwareBusy,
    /// Unknown job or record.
    NotFound,
    /// Storage or other internal failure.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::DuplicateRequest => "DuplicateRequest",
            ErrorKind::NoSpaceAvailable => "NoSpaceAvailable",
            ErrorKind::CompileError => "CompileError",
            ErrorKind::HardwareTimeout => "HardwareTimeout",
            ErrorKind::HardwareDisconnected => "HardwareDisconnected",
            ErrorKind::HardwareAlarm => "HardwareAlarm",
            ErrorKind::EmergencyStopped => "EmergencyStopped",
            ErrorKind::HardwareBusy => "HardwareBusy",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Internal => "Internal",
        };
        f.write_str(name)
    }
}

/// Main error type for EngraveKit
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Input failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Request rejected by queue deduplication
    #[error("Duplicate request: '{name}' is already pending")]
    Duplicate {
        /// The normalized name that is already pending.
        name: String,
    },

    /// Placement error
    #[error(transparent)]
    Placement(#[from] PlacementError),

    /// Compile error
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Hardware error
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// Unknown job or record
    #[error("Not found: {0}")]
    NotFound(String),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Map this error onto the operator-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::ValidationError,
            Error::Duplicate { .. } => ErrorKind::DuplicateRequest,
            Error::Placement(PlacementError::NoSpaceAvailable { .. }) => {
                ErrorKind::NoSpaceAvailable
            }
            Error::Placement(PlacementError::Storage { .. }) => ErrorKind::Internal,
            Error::Placement(_) => ErrorKind::ValidationError,
            Error::Compile(_) => ErrorKind::CompileError,
            Error::Hardware(hw) => match hw {
                HardwareError::Timeout { .. } => ErrorKind::HardwareTimeout,
                HardwareError::NotConnected
                | HardwareError::Disconnected { .. }
                | HardwareError::Connection { .. } => ErrorKind::HardwareDisconnected,
                HardwareError::Alarm { .. } | HardwareError::Rejected { .. } => {
                    ErrorKind::HardwareAlarm
                }
                HardwareError::EmergencyStopped => ErrorKind::EmergencyStopped,
                HardwareError::Busy => ErrorKind::HardwareBusy,
                HardwareError::InvalidTransition { .. } => ErrorKind::HardwareAlarm,
            },
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Io(_) | Error::Serialization(_) | Error::Other(_) => ErrorKind::Internal,
        }
    }

    /// Check if a job failing with this error may be requeued
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Hardware(hw) if hw.is_transient())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Hardware(HardwareError::Timeout { .. }))
    }

    /// Check if this is a hardware error
    pub fn is_hardware_error(&self) -> bool {
        matches!(self, Error::Hardware(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_error_display() {
        let err = HardwareError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Hardware command timed out after 5000ms");

        let err = HardwareError::Rejected {
            code: 20,
            message: "Unsupported command".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Command rejected: error:20 - Unsupported command"
        );
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            Error::validation("empty name").kind(),
            ErrorKind::ValidationError
        );
        assert_eq!(
            Error::Duplicate {
                name: "alice".into()
            }
            .kind(),
            ErrorKind::DuplicateRequest
        );
        let no_space: Error = PlacementError::NoSpaceAvailable {
            width: 10.0,
            height: 2.0,
        }
        .into();
        assert_eq!(no_space.kind(), ErrorKind::NoSpaceAvailable);

        let glyph: Error = CompileError::UnsupportedGlyph {
            ch: '@',
            font: "simplex".into(),
        }
        .into();
        assert_eq!(glyph.kind(), ErrorKind::CompileError);

        let stop: Error = HardwareError::EmergencyStopped.into();
        assert_eq!(stop.kind(), ErrorKind::EmergencyStopped);

        let lost: Error = HardwareError::Disconnected { failures: 3 }.into();
        assert_eq!(lost.kind(), ErrorKind::HardwareDisconnected);
    }

    #[test]
    fn test_retryable_only_for_transient_hardware() {
        let timeout: Error = HardwareError::Timeout { timeout_ms: 10 }.into();
        assert!(timeout.is_retryable());
        assert!(timeout.is_timeout());

        let lost: Error = HardwareError::Connection {
            reason: "reset by peer".into(),
        }
        .into();
        assert!(lost.is_retryable());

        let alarm: Error = HardwareError::Alarm {
            code: 1,
            message: "Hard limit".into(),
        }
        .into();
        assert!(!alarm.is_retryable());

        let stop: Error = HardwareError::EmergencyStopped.into();
        assert!(!stop.is_retryable());

        let compile: Error = CompileError::EmptyText.into();
        assert!(!compile.is_retryable());
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::HardwareTimeout.to_string(), "HardwareTimeout");
        assert_eq!(
            serde_json::to_string(&ErrorKind::NoSpaceAvailable).unwrap(),
            "\"no_space_available\""
        );
    }
}
