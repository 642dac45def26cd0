//! Text to motion compilation
//!
//! [`compile`] is a pure function of its request: compiling the same
//! request twice yields identical programs, so a retried job regenerates
//! exactly what the first attempt would have sent.

use engravekit_core::{CompileError, Point, Size};

use crate::font::FontProfile;
use crate::layout::layout_text;
use crate::program::{MotionCommand, MotionProgram};

/// Laser parameters for one program
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaserParams {
    /// 0-100
    pub power_percent: f64,
    pub speed_mm_per_min: f64,
    pub passes: u32,
    /// S value at full power
    pub spindle_max: u32,
    /// Engraving Z height; zero leaves Z alone
    pub z_height_mm: f64,
}

impl Default for LaserParams {
    fn default() -> Self {
        Self {
            power_percent: 50.0,
            speed_mm_per_min: 1000.0,
            passes: 1,
            spindle_max: 1000,
            z_height_mm: 0.0,
        }
    }
}

impl LaserParams {
    /// Firmware S word for the configured power
    pub fn spindle_value(&self) -> u32 {
        (self.power_percent / 100.0 * f64::from(self.spindle_max)).round() as u32
    }

    fn validate(&self) -> Result<(), CompileError> {
        let invalid = |reason: String| Err(CompileError::InvalidParameters { reason });
        if !self.power_percent.is_finite() || !(0.0..=100.0).contains(&self.power_percent) {
            return invalid(format!("power {}% outside 0-100", self.power_percent));
        }
        if !self.speed_mm_per_min.is_finite() || self.speed_mm_per_min <= 0.0 {
            return invalid(format!("speed {} must be positive", self.speed_mm_per_min));
        }
        if self.passes == 0 {
            return invalid("passes must be at least 1".to_string());
        }
        if self.spindle_max == 0 {
            return invalid("spindle_max must be positive".to_string());
        }
        if !self.z_height_mm.is_finite() {
            return invalid("z height is not a number".to_string());
        }
        Ok(())
    }
}

/// Everything that determines a program
#[derive(Debug, Clone, PartialEq)]
pub struct CompileRequest<'a> {
    pub text: &'a str,
    pub height_mm: f64,
    pub font: &'a str,
    pub laser: LaserParams,
    /// Machine position for the ink box's lower-left corner
    pub origin: Point,
    pub mirror_y: bool,
}

/// Ink extent of `text` at `height_mm`, as placement needs it
pub fn measure(
    text: &str,
    height_mm: f64,
    font: &str,
    mirror_y: bool,
) -> Result<Size, CompileError> {
    let profile = FontProfile::lookup(font)?;
    Ok(layout_text(text, height_mm, profile, mirror_y)?.size)
}

/// Compile text into a complete, safe motion program
pub fn compile(request: &CompileRequest<'_>) -> Result<MotionProgram, CompileError> {
    request.laser.validate()?;
    let profile = FontProfile::lookup(request.font)?;
    let layout = layout_text(request.text, request.height_mm, profile, request.mirror_y)?;

    let laser = &request.laser;
    let origin = request.origin;
    let use_z = laser.z_height_mm != 0.0;

    let mut commands = vec![
        MotionCommand::Comment(format!("Engrave: {}", request.text)),
        MotionCommand::Comment(format!(
            "Font: {} height {:.2}mm, {} pass(es)",
            profile.key, request.height_mm, laser.passes
        )),
        MotionCommand::LaserOff,
        MotionCommand::Millimetres,
        MotionCommand::Absolute,
        MotionCommand::ClearWorkOffset,
        MotionCommand::SelectWorkOffset,
    ];
    if use_z {
        commands.push(MotionCommand::RapidZ { z: 0.0 });
    }
    commands.push(MotionCommand::LaserOn {
        power: laser.spindle_value(),
    });
    if use_z {
        commands.push(MotionCommand::RapidZ {
            z: laser.z_height_mm,
        });
    }

    for pass in 1..=laser.passes {
        commands.push(MotionCommand::Comment(format!(
            "Pass {}/{}",
            pass, laser.passes
        )));
        for line in &layout.polylines {
            let Some((first, rest)) = line.split_first() else {
                continue;
            };
            commands.push(MotionCommand::Rapid {
                x: origin.x + first.x,
                y: origin.y + first.y,
            });
            commands.extend(rest.iter().map(|p| MotionCommand::Linear {
                x: origin.x + p.x,
                y: origin.y + p.y,
                feed: laser.speed_mm_per_min,
            }));
        }
    }

    commands.push(MotionCommand::LaserOff);
    if use_z {
        commands.push(MotionCommand::RapidZ { z: 0.0 });
    }
    commands.push(MotionCommand::Rapid { x: 0.0, y: 0.0 });
    commands.push(MotionCommand::ProgramEnd);

    let program = MotionProgram {
        commands,
        origin,
        size: layout.size,
    };
    tracing::debug!(
        text = request.text,
        lines = program.line_count(),
        burn_mm = program.burn_length_mm(),
        "compiled motion program"
    );
    Ok(program)
}
