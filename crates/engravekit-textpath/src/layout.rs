//! Text layout: characters to millimetre polylines.

use engravekit_core::{CompileError, Point, Size, EPSILON};

use crate::font::{FontProfile, STROKE_SPACING_MM};
use crate::hershey::{self, ADVANCE, CELL_HEIGHT};

pub type Polyline = Vec<Point>;

/// Laid-out text with its ink box moved to the origin
#[derive(Debug, Clone, PartialEq)]
pub struct TextLayout {
    pub polylines: Vec<Polyline>,
    /// Ink extent
    pub size: Size,
}

/// Lay out `text` so that a glyph cell is `height_mm` tall.
///
/// The whole text is rejected if any character has no glyph.
pub fn layout_text(
    text: &str,
    height_mm: f64,
    font: &FontProfile,
    mirror_y: bool,
) -> Result<TextLayout, CompileError> {
    if !height_mm.is_finite() || height_mm <= 0.0 {
        return Err(CompileError::InvalidParameters {
            reason: format!("text height must be positive, got {}", height_mm),
        });
    }

    let scale = height_mm / CELL_HEIGHT;
    let y_sign = if mirror_y { -1.0 } else { 1.0 };
    let mut polylines = Vec::new();
    let mut cursor = 0.0;

    for ch in text.chars() {
        let strokes = hershey::glyph(ch).ok_or_else(|| CompileError::UnsupportedGlyph {
            ch,
            font: font.key.to_string(),
        })?;
        for stroke in strokes {
            polylines.push(
                stroke
                    .iter()
                    .map(|&(x, y)| Point::new((cursor + x) * scale, y_sign * y * scale))
                    .collect::<Polyline>(),
            );
        }
        cursor += ADVANCE;
    }

    if polylines.is_empty() {
        return Err(CompileError::EmptyText);
    }

    if font.stroke_copies() > 1 {
        polylines = thicken(&polylines, font.stroke_copies());
    }

    let (min, max) = bounds(&polylines);
    for line in &mut polylines {
        for p in line.iter_mut() {
            *p = Point::new(p.x - min.x, p.y - min.y);
        }
    }

    Ok(TextLayout {
        polylines,
        size: Size::new(max.x - min.x, max.y - min.y),
    })
}

/// Replace every segment with `copies` parallel two-point lines
fn thicken(polylines: &[Polyline], copies: usize) -> Vec<Polyline> {
    let centre = (copies as f64 - 1.0) / 2.0;
    let mut out = Vec::new();

    for line in polylines {
        for pair in line.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let (dx, dy) = (b.x - a.x, b.y - a.y);
            let len = dx.hypot(dy);
            if len <= EPSILON {
                out.push(vec![a, b]);
                continue;
            }
            // unit normal
            let (nx, ny) = (-dy / len, dx / len);
            for k in 0..copies {
                let offset = (k as f64 - centre) * STROKE_SPACING_MM;
                out.push(vec![
                    a.translate(nx * offset, ny * offset),
                    b.translate(nx * offset, ny * offset),
                ]);
            }
        }
    }
    out
}

fn bounds(polylines: &[Polyline]) -> (Point, Point) {
    let mut min = Point::new(f64::INFINITY, f64::INFINITY);
    let mut max = Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in polylines.iter().flatten() {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    (min, max)
}
