//! # EngraveKit Text Path
//!
//! Converts a name into a laser motion program using a built-in
//! single-stroke font. Layout and compilation are deterministic; the same
//! request always produces the same command sequence.

pub mod compiler;
pub mod font;
pub mod hershey;
pub mod layout;
pub mod program;

pub use compiler::{compile, measure, CompileRequest, LaserParams};
pub use font::{FontProfile, FONTS, STROKE_SPACING_MM};
pub use layout::{layout_text, Polyline, TextLayout};
pub use program::{MotionCommand, MotionProgram};
