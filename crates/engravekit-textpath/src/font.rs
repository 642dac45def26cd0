//! Font profiles
//!
//! Every profile draws the same single-stroke glyphs; heavier weights
//! repeat each segment as parallel copies [`STROKE_SPACING_MM`] apart.

use serde::Serialize;

use engravekit_core::CompileError;

/// Distance between parallel copies of a thickened segment
pub const STROKE_SPACING_MM: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FontProfile {
    /// Key used in configuration
    pub key: &'static str,
    pub label: &'static str,
    /// Nominal line width; zero draws a single stroke
    pub line_width_mm: f64,
}

pub const FONTS: &[FontProfile] = &[
    FontProfile {
        key: "simplex",
        label: "Simplex (single line)",
        line_width_mm: 0.0,
    },
    FontProfile {
        key: "medium",
        label: "Medium",
        line_width_mm: 0.45,
    },
    FontProfile {
        key: "bold",
        label: "Bold",
        line_width_mm: 0.9,
    },
    FontProfile {
        key: "heavy",
        label: "Heavy",
        line_width_mm: 1.5,
    },
];

impl FontProfile {
    /// Find a profile by key, ignoring case and surrounding whitespace
    pub fn lookup(key: &str) -> Result<&'static FontProfile, CompileError> {
        let wanted = key.trim();
        FONTS
            .iter()
            .find(|f| f.key.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CompileError::UnknownFont {
                font: key.to_string(),
            })
    }

    /// Number of parallel copies per segment
    pub fn stroke_copies(&self) -> usize {
        if self.line_width_mm <= 0.0 {
            1
        } else {
            ((self.line_width_mm / STROKE_SPACING_MM).round() as usize).max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(FontProfile::lookup("simplex").unwrap().line_width_mm, 0.0);
        assert_eq!(FontProfile::lookup(" Bold ").unwrap().key, "bold");
        assert!(matches!(
            FontProfile::lookup("comic"),
            Err(CompileError::UnknownFont { .. })
        ));
    }

    #[test]
    fn test_stroke_copies() {
        let copies: Vec<usize> = FONTS.iter().map(|f| f.stroke_copies()).collect();
        assert_eq!(copies, vec![1, 3, 6, 10]);
    }
}
