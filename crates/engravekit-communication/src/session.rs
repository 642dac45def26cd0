//! Hardware session state machine
//!
//! [`HardwareSession::apply`] is the only way the session state changes. It
//! is total: every `(state, event)` pair either yields the next state or an
//! error, never a silent skip. Recovery obligations are tracked as flags
//! that outlive the link, so reconnecting cannot clear an emergency stop.

use serde::Serialize;

use engravekit_core::{HardwareError, MachinePosition, SessionState};

use crate::grbl::alarm_message;

/// Inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Opening a link
    Connect,
    /// Link opened
    Connected,
    /// Opening failed
    ConnectFailed,
    /// Link closed or given up on
    LinkLost,
    /// Exclusive claim taken
    Claim,
    /// Exclusive claim dropped
    Release,
    /// Firmware reported an alarm
    Alarm(u8),
    /// `$X` acknowledged
    Unlocked,
    /// `$H` acknowledged
    Homed,
    /// Operator stop
    EmergencyStop,
}

impl SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            SessionEvent::Connect => "Connect",
            SessionEvent::Connected => "Connected",
            SessionEvent::ConnectFailed => "ConnectFailed",
            SessionEvent::LinkLost => "LinkLost",
            SessionEvent::Claim => "Claim",
            SessionEvent::Release => "Release",
            SessionEvent::Alarm(_) => "Alarm",
            SessionEvent::Unlocked => "Unlocked",
            SessionEvent::Homed => "Homed",
            SessionEvent::EmergencyStop => "EmergencyStop",
        }
    }
}

/// Session state plus the last status seen from the controller
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HardwareSession {
    pub state: SessionState,
    /// An unlock is owed before the machine may run
    pub needs_unlock: bool,
    /// A homing cycle is owed before the machine may run
    pub needs_home: bool,
    /// A claim is held
    pub claimed: bool,
    pub last_alarm: Option<u8>,
    pub position: MachinePosition,
    /// Raw text of the last status report
    pub status_text: Option<String>,
}

impl HardwareSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `event`, returning the new state.
    ///
    /// On error the session is unchanged.
    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionState, HardwareError> {
        use engravekit_core::SessionState as S;

        let next = match (self.state, event) {
            // a stop latches from anywhere; with no link it waits for the next one
            (S::Disconnected | S::Connecting, SessionEvent::EmergencyStop) => {
                self.needs_unlock = true;
                self.needs_home = true;
                self.state
            }
            (_, SessionEvent::EmergencyStop) => {
                self.needs_unlock = true;
                self.needs_home = true;
                S::EmergencyStopped
            }

            (S::Disconnected, SessionEvent::Connect) => S::Connecting,
            (S::Connecting, SessionEvent::Connected) => self.settled_state(),
            (S::Connecting, SessionEvent::ConnectFailed) => S::Disconnected,
            (_, SessionEvent::LinkLost) => S::Disconnected,

            (S::Idle, SessionEvent::Claim) => {
                self.claimed = true;
                S::Busy
            }
            (S::Busy, SessionEvent::Claim) => return Err(HardwareError::Busy),
            (S::Alarm, SessionEvent::Claim) => return Err(self.alarm_error()),
            (S::EmergencyStopped, SessionEvent::Claim) => {
                return Err(HardwareError::EmergencyStopped)
            }
            (S::Disconnected | S::Connecting, SessionEvent::Claim) => {
                return Err(HardwareError::NotConnected)
            }

            (S::Busy, SessionEvent::Release) => {
                self.claimed = false;
                S::Idle
            }
            (_, SessionEvent::Release) => {
                self.claimed = false;
                self.state
            }

            (S::Idle | S::Busy | S::Alarm, SessionEvent::Alarm(code)) => {
                self.needs_unlock = true;
                self.last_alarm = Some(code);
                S::Alarm
            }
            (S::EmergencyStopped, SessionEvent::Alarm(code)) => {
                self.last_alarm = Some(code);
                S::EmergencyStopped
            }

            (S::Alarm, SessionEvent::Unlocked) => {
                self.needs_unlock = false;
                self.last_alarm = None;
                S::Idle
            }
            (S::Idle, SessionEvent::Unlocked) => S::Idle,
            (S::EmergencyStopped, SessionEvent::Unlocked) => {
                self.needs_unlock = false;
                self.after_stop_recovery()
            }

            // homing alone never clears an alarm
            (S::Idle | S::Alarm, SessionEvent::Homed) => {
                self.needs_home = false;
                self.state
            }
            (S::EmergencyStopped, SessionEvent::Homed) => {
                self.needs_home = false;
                self.after_stop_recovery()
            }

            (state, event) => {
                return Err(HardwareError::InvalidTransition {
                    state: state.to_string(),
                    event: event.name().to_string(),
                })
            }
        };

        self.state = next;
        Ok(next)
    }

    /// Where a connected session rests given its outstanding obligations
    fn settled_state(&self) -> SessionState {
        if self.needs_home {
            SessionState::EmergencyStopped
        } else if self.needs_unlock {
            SessionState::Alarm
        } else if self.claimed {
            SessionState::Busy
        } else {
            SessionState::Idle
        }
    }

    /// A stop is left only once both unlock and home are done
    fn after_stop_recovery(&self) -> SessionState {
        if self.needs_unlock || self.needs_home {
            SessionState::EmergencyStopped
        } else {
            self.settled_state()
        }
    }

    fn alarm_error(&self) -> HardwareError {
        let code = self.last_alarm.unwrap_or(0);
        HardwareError::Alarm {
            code,
            message: if code == 0 {
                "Controller in alarm state, unlock required".to_string()
            } else {
                alarm_message(code).to_string()
            },
        }
    }

    /// Error describing why the session cannot take work
    pub fn unavailable_error(&self) -> Option<HardwareError> {
        match self.state {
            SessionState::Idle => None,
            SessionState::Busy => Some(HardwareError::Busy),
            SessionState::Alarm => Some(self.alarm_error()),
            SessionState::EmergencyStopped => Some(HardwareError::EmergencyStopped),
            SessionState::Disconnected | SessionState::Connecting => {
                Some(HardwareError::NotConnected)
            }
        }
    }
}
