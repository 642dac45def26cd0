//! Engraving area
//!
//! The active surface is a rectangle inside the machine's travel, placed at
//! `offset_x`/`offset_y`. Placements are computed in surface coordinates and
//! shifted by the offsets when a program is compiled.

use serde::{Deserialize, Serialize};

use engravekit_core::{Point, Rect};

use crate::config::SettingsDocument;
use crate::error::{ConfigError, ConfigResult};

/// Active engraving surface and machine travel, in millimetres
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngravingArea {
    pub active_width_mm: f64,
    pub active_height_mm: f64,
    /// Lower-left corner of the surface in machine coordinates
    pub offset_x_mm: f64,
    pub offset_y_mm: f64,
    /// Machine travel limits
    pub machine_width_mm: f64,
    pub machine_height_mm: f64,
}

impl Default for EngravingArea {
    fn default() -> Self {
        Self {
            active_width_mm: 200.0,
            active_height_mm: 298.0,
            offset_x_mm: 0.0,
            offset_y_mm: 0.0,
            machine_width_mm: 200.0,
            machine_height_mm: 298.0,
        }
    }
}

impl EngravingArea {
    pub fn new(active_width_mm: f64, active_height_mm: f64) -> Self {
        Self {
            active_width_mm,
            active_height_mm,
            machine_width_mm: active_width_mm,
            machine_height_mm: active_height_mm,
            ..Default::default()
        }
    }

    /// The surface in its own coordinates
    pub fn surface(&self) -> Rect {
        Rect::new(0.0, 0.0, self.active_width_mm, self.active_height_mm)
    }

    /// Convert a surface point to machine coordinates
    pub fn to_machine(&self, p: Point) -> Point {
        p.translate(self.offset_x_mm, self.offset_y_mm)
    }
}

impl SettingsDocument for EngravingArea {
    fn validate(&self) -> ConfigResult<()> {
        for (key, value) in [
            ("active_width_mm", self.active_width_mm),
            ("active_height_mm", self.active_height_mm),
            ("machine_width_mm", self.machine_width_mm),
            ("machine_height_mm", self.machine_height_mm),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::out_of_range(key, value));
            }
        }
        for (key, value) in [
            ("offset_x_mm", self.offset_x_mm),
            ("offset_y_mm", self.offset_y_mm),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::out_of_range(key, value));
            }
        }
        if self.offset_x_mm + self.active_width_mm > self.machine_width_mm + engravekit_core::EPSILON {
            return Err(ConfigError::InvalidSetting {
                key: "active_width_mm".to_string(),
                reason: format!(
                    "offset {} + width {} exceeds machine width {}",
                    self.offset_x_mm, self.active_width_mm, self.machine_width_mm
                ),
            });
        }
        if self.offset_y_mm + self.active_height_mm > self.machine_height_mm + engravekit_core::EPSILON {
            return Err(ConfigError::InvalidSetting {
                key: "active_height_mm".to_string(),
                reason: format!(
                    "offset {} + height {} exceeds machine height {}",
                    self.offset_y_mm, self.active_height_mm, self.machine_height_mm
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_area() {
        let area = EngravingArea::default();
        assert!(area.validate().is_ok());
        assert_eq!(area.surface(), Rect::new(0.0, 0.0, 200.0, 298.0));
    }

    #[test]
    fn test_offsets_must_stay_inside_travel() {
        let mut area = EngravingArea::new(100.0, 100.0);
        area.machine_width_mm = 300.0;
        area.machine_height_mm = 300.0;
        area.offset_x_mm = 150.0;
        area.offset_y_mm = 50.0;
        assert!(area.validate().is_ok());
        assert_eq!(area.to_machine(Point::new(1.0, 2.0)), Point::new(151.0, 52.0));

        area.offset_x_mm = 250.0;
        assert!(matches!(
            area.validate(),
            Err(ConfigError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_rejects_non_positive_size() {
        let area = EngravingArea::new(0.0, 100.0);
        assert!(area.validate().is_err());
        let area = EngravingArea::new(f64::NAN, 100.0);
        assert!(area.validate().is_err());
    }
}
