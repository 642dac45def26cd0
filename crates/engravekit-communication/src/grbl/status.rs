//! GRBL status reports
//!
//! Parses the `<State|MPos:..|FS:..|..>` line a controller sends in reply to
//! the `?` realtime query. FluidNC and GRBL 1.1 report either `MPos` or
//! `WPos` depending on `$10`; the missing one is derived through `WCO` when
//! it is present.

use serde::{Deserialize, Serialize};

use engravekit_core::MachinePosition;

/// Firmware run state, the first field of a status report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineState {
    Idle,
    Run,
    Hold,
    Jog,
    Alarm,
    Door,
    Check,
    Home,
    Sleep,
    Unknown,
}

impl MachineState {
    /// Parse the state field; sub-states such as `Hold:0` are folded
    pub fn parse(field: &str) -> Self {
        let name = field.split(':').next().unwrap_or("").trim();
        match name {
            "Idle" => MachineState::Idle,
            "Run" => MachineState::Run,
            "Hold" => MachineState::Hold,
            "Jog" => MachineState::Jog,
            "Alarm" => MachineState::Alarm,
            "Door" => MachineState::Door,
            "Check" => MachineState::Check,
            "Home" => MachineState::Home,
            "Sleep" => MachineState::Sleep,
            _ => MachineState::Unknown,
        }
    }

    pub fn is_alarm(&self) -> bool {
        matches!(self, MachineState::Alarm)
    }

    /// Moving or about to move
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            MachineState::Run | MachineState::Jog | MachineState::Home
        )
    }
}

/// Three linear axes in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Axes {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Axes {
    /// Parse `x,y,z[,a..]`; extra rotary axes are ignored
    pub fn parse(value: &str) -> Option<Self> {
        let coords: Vec<f64> = value
            .split(',')
            .map(|s| s.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;
        if coords.len() < 3 {
            return None;
        }
        Some(Self {
            x: coords[0],
            y: coords[1],
            z: coords[2],
        })
    }

    fn minus(self, other: Axes) -> Axes {
        Axes {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }

    fn plus(self, other: Axes) -> Axes {
        Axes {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }
}

/// `Bf:` planner blocks and serial bytes available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferState {
    pub planner_blocks: u16,
    pub rx_bytes: u16,
}

/// `Ov:` feed, rapid and spindle overrides in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    pub feed: u16,
    pub rapid: u16,
    pub spindle: u16,
}

/// A parsed status report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub state: MachineState,
    /// State field as sent, including any sub-state
    pub state_text: String,
    pub mpos: Option<Axes>,
    pub wpos: Option<Axes>,
    pub wco: Option<Axes>,
    pub feed_rate: Option<f64>,
    pub spindle_speed: Option<u32>,
    pub buffer: Option<BufferState>,
    pub overrides: Option<Overrides>,
}

impl StatusReport {
    /// Parse a status line, with or without surrounding whitespace.
    ///
    /// Returns `None` unless the line is a `<...>` report.
    pub fn parse(line: &str) -> Option<Self> {
        let inner = line.trim().strip_prefix('<')?.strip_suffix('>')?;
        let mut fields = inner.split('|');
        let state_text = fields.next()?.trim().to_string();
        if state_text.is_empty() {
            return None;
        }

        let mut report = StatusReport {
            state: MachineState::parse(&state_text),
            state_text,
            mpos: None,
            wpos: None,
            wco: None,
            feed_rate: None,
            spindle_speed: None,
            buffer: None,
            overrides: None,
        };

        for field in fields {
            let Some((key, value)) = field.split_once(':') else {
                continue;
            };
            match key {
                "MPos" => report.mpos = Axes::parse(value),
                "WPos" => report.wpos = Axes::parse(value),
                "WCO" => report.wco = Axes::parse(value),
                "F" => report.feed_rate = value.trim().parse().ok(),
                "FS" => {
                    let mut parts = value.split(',');
                    report.feed_rate = parts.next().and_then(|f| f.trim().parse().ok());
                    report.spindle_speed = parts
                        .next()
                        .and_then(|s| s.trim().parse::<f64>().ok())
                        .map(|s| s.max(0.0).round() as u32);
                }
                "Bf" | "Buf" => {
                    let mut parts = value.split(|c: char| c == ',' || c == ':');
                    let planner = parts.next().and_then(|p| p.trim().parse().ok());
                    let rx = parts.next().and_then(|p| p.trim().parse().ok());
                    if let (Some(planner_blocks), Some(rx_bytes)) = (planner, rx) {
                        report.buffer = Some(BufferState {
                            planner_blocks,
                            rx_bytes,
                        });
                    }
                }
                "Ov" => {
                    let values: Vec<u16> = value
                        .split(',')
                        .filter_map(|v| v.trim().parse().ok())
                        .collect();
                    if let [feed, rapid, spindle, ..] = values[..] {
                        report.overrides = Some(Overrides {
                            feed,
                            rapid,
                            spindle,
                        });
                    }
                }
                _ => {}
            }
        }

        if let (None, Some(mpos), Some(wco)) = (report.wpos, report.mpos, report.wco) {
            report.wpos = Some(mpos.minus(wco));
        }
        if let (None, Some(wpos), Some(wco)) = (report.mpos, report.wpos, report.wco) {
            report.mpos = Some(wpos.plus(wco));
        }
        Some(report)
    }

    /// Machine position, falling back to the work position when the
    /// controller reports only `WPos` without an offset
    pub fn machine_position(&self) -> Option<MachinePosition> {
        self.mpos.or(self.wpos).map(|a| MachinePosition {
            x: a.x,
            y: a.y,
            z: a.z,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grbl_report() {
        let report =
            StatusReport::parse("<Idle|MPos:10.000,5.500,-1.000|Bf:15,128|FS:0,0|WCO:1.000,0.500,0.000>")
                .unwrap();
        assert_eq!(report.state, MachineState::Idle);
        assert_eq!(
            report.mpos,
            Some(Axes {
                x: 10.0,
                y: 5.5,
                z: -1.0
            })
        );
        assert_eq!(
            report.wpos,
            Some(Axes {
                x: 9.0,
                y: 5.0,
                z: -1.0
            })
        );
        assert_eq!(
            report.buffer,
            Some(BufferState {
                planner_blocks: 15,
                rx_bytes: 128
            })
        );
        assert_eq!(report.feed_rate, Some(0.0));
        assert_eq!(report.spindle_speed, Some(0));
    }

    #[test]
    fn test_parse_fluidnc_report() {
        let report = StatusReport::parse("<Run|WPos:1.000,2.000,0.000|FS:1000,500|Ov:100,100,100>")
            .unwrap();
        assert_eq!(report.state, MachineState::Run);
        assert!(report.state.is_running());
        assert_eq!(report.mpos, None);
        assert_eq!(
            report.machine_position(),
            Some(MachinePosition {
                x: 1.0,
                y: 2.0,
                z: 0.0
            })
        );
        assert_eq!(report.spindle_speed, Some(500));
        assert_eq!(
            report.overrides,
            Some(Overrides {
                feed: 100,
                rapid: 100,
                spindle: 100
            })
        );
    }

    #[test]
    fn test_sub_state_and_garbage() {
        let report = StatusReport::parse("<Hold:0|MPos:0,0,0>").unwrap();
        assert_eq!(report.state, MachineState::Hold);
        assert_eq!(report.state_text, "Hold:0");

        assert!(StatusReport::parse("<Alarm>").unwrap().state.is_alarm());
        assert_eq!(StatusReport::parse("ok"), None);
        assert_eq!(StatusReport::parse("<>"), None);
        assert_eq!(
            StatusReport::parse("<Idle|MPos:1,2>").unwrap().mpos,
            None
        );
    }
}
