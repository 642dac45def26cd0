//! Motion programs
//!
//! A [`MotionProgram`] is the ordered command list for one engraving. It
//! renders to GRBL-flavoured G-code, either as a commented file for the
//! program archive or as bare lines for streaming.

use serde::{Deserialize, Serialize};
use std::fmt;

use engravekit_core::{Point, Size};

/// One device instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MotionCommand {
    /// `; text`, never sent to the device
    Comment(String),
    /// `M5`
    LaserOff,
    /// `M4 S<power>` (dynamic power, beam off during rapids)
    LaserOn { power: u32 },
    /// `G21`
    Millimetres,
    /// `G90`
    Absolute,
    /// `G10 L2 P1 X0 Y0 Z0`
    ClearWorkOffset,
    /// `G54`
    SelectWorkOffset,
    /// `G0 X Y`
    Rapid { x: f64, y: f64 },
    /// `G0 Z`
    RapidZ { z: f64 },
    /// `G1 X Y F`
    Linear { x: f64, y: f64, feed: f64 },
    /// `M2`
    ProgramEnd,
}

/// Format a coordinate with four decimals, without a negative zero
fn coord(v: f64) -> String {
    let v = if v.abs() < 0.00005 { 0.0 } else { v };
    format!("{:.4}", v)
}

impl MotionCommand {
    pub fn is_comment(&self) -> bool {
        matches!(self, MotionCommand::Comment(_))
    }

    /// Short explanation appended in the archived file
    fn note(&self) -> Option<&'static str> {
        match self {
            MotionCommand::LaserOff => Some("Laser off"),
            MotionCommand::LaserOn { .. } => Some("Laser on, dynamic power"),
            MotionCommand::Millimetres => Some("Units mm"),
            MotionCommand::Absolute => Some("Absolute positioning"),
            MotionCommand::ClearWorkOffset => Some("Clear G54 offset"),
            MotionCommand::SelectWorkOffset => Some("Work coordinates = machine"),
            MotionCommand::ProgramEnd => Some("End of program"),
            _ => None,
        }
    }
}

impl fmt::Display for MotionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionCommand::Comment(text) => write!(f, "; {}", text),
            MotionCommand::LaserOff => f.write_str("M5"),
            MotionCommand::LaserOn { power } => write!(f, "M4 S{}", power),
            MotionCommand::Millimetres => f.write_str("G21"),
            MotionCommand::Absolute => f.write_str("G90"),
            MotionCommand::ClearWorkOffset => f.write_str("G10 L2 P1 X0 Y0 Z0"),
            MotionCommand::SelectWorkOffset => f.write_str("G54"),
            MotionCommand::Rapid { x, y } => write!(f, "G0 X{} Y{}", coord(*x), coord(*y)),
            MotionCommand::RapidZ { z } => write!(f, "G0 Z{}", coord(*z)),
            MotionCommand::Linear { x, y, feed } => {
                write!(f, "G1 X{} Y{} F{}", coord(*x), coord(*y), feed.round())
            }
            MotionCommand::ProgramEnd => f.write_str("M2"),
        }
    }
}

/// A compiled engraving
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionProgram {
    pub commands: Vec<MotionCommand>,
    /// Machine position of the ink box's lower-left corner
    pub origin: Point,
    /// Ink extent in millimetres
    pub size: Size,
}

impl MotionProgram {
    /// Device lines in order, comments excluded
    pub fn lines(&self) -> Vec<String> {
        self.commands
            .iter()
            .filter(|c| !c.is_comment())
            .map(|c| c.to_string())
            .collect()
    }

    /// Number of lines that will be streamed
    pub fn line_count(&self) -> usize {
        self.commands.iter().filter(|c| !c.is_comment()).count()
    }

    /// Annotated G-code for the program archive
    pub fn to_gcode(&self) -> String {
        let mut gcode = String::new();
        for command in &self.commands {
            match command.note() {
                Some(note) => gcode.push_str(&format!("{} ; {}\n", command, note)),
                None => gcode.push_str(&format!("{}\n", command)),
            }
        }
        gcode
    }

    /// Total length of laser-on moves in millimetres
    pub fn burn_length_mm(&self) -> f64 {
        let mut length = 0.0;
        let mut at = Point::default();
        for command in &self.commands {
            match *command {
                MotionCommand::Rapid { x, y } => at = Point::new(x, y),
                MotionCommand::Linear { x, y, .. } => {
                    length += (x - at.x).hypot(y - at.y);
                    at = Point::new(x, y);
                }
                _ => {}
            }
        }
        length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_formatting() {
        assert_eq!(MotionCommand::LaserOn { power: 500 }.to_string(), "M4 S500");
        assert_eq!(
            MotionCommand::Rapid { x: 1.5, y: -0.0 }.to_string(),
            "G0 X1.5000 Y0.0000"
        );
        assert_eq!(
            MotionCommand::Linear {
                x: 10.0,
                y: 2.25,
                feed: 1000.0
            }
            .to_string(),
            "G1 X10.0000 Y2.2500 F1000"
        );
        assert_eq!(
            MotionCommand::Rapid { x: -0.00001, y: 0.0 }.to_string(),
            "G0 X0.0000 Y0.0000"
        );
    }

    #[test]
    fn test_lines_skip_comments() {
        let program = MotionProgram {
            commands: vec![
                MotionCommand::Comment("Engrave: BOB".into()),
                MotionCommand::LaserOff,
                MotionCommand::Rapid { x: 0.0, y: 0.0 },
                MotionCommand::Linear {
                    x: 3.0,
                    y: 4.0,
                    feed: 600.0,
                },
                MotionCommand::LaserOff,
            ],
            origin: Point::default(),
            size: Size::new(3.0, 4.0),
        };
        assert_eq!(program.line_count(), 4);
        assert_eq!(program.lines()[0], "M5");
        assert!((program.burn_length_mm() - 5.0).abs() < 1e-9);

        let gcode = program.to_gcode();
        assert!(gcode.starts_with("; Engrave: BOB\nM5 ; Laser off\n"));
    }
}
