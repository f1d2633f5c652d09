//! # Units Module
//!
//! Raw-to-physical conversion of decoded tracking values.
//!
//! This module handles:
//! - Rotation and position scaling (configurable scale factors)
//! - Lens zoom/focus lookup through calibration tables
//! - Vendor "no data" sentinels for lens values

pub mod calibration;

use serde::{Deserialize, Serialize};

use crate::freed::protocol::{FrameFields, FOCUS_NO_DATA, ZOOM_NO_DATA};
use calibration::CalibrationTable;

/// Inches per meter, for imperial focus display
const INCHES_PER_METER: f64 = 39.3701;

/// Linear scale factors for rotation and position
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScaleFactors {
    /// Degrees per raw rotation unit
    #[serde(default = "default_rotation_scale")]
    pub rotation: f64,

    /// Millimeters per raw position unit
    #[serde(default = "default_position_scale")]
    pub position: f64,
}

fn default_rotation_scale() -> f64 { 1.0 / 32_768.0 }
fn default_position_scale() -> f64 { 1.0 / 64.0 }

impl Default for ScaleFactors {
    fn default() -> Self {
        Self {
            rotation: default_rotation_scale(),
            position: default_position_scale(),
        }
    }
}

/// Tracking values in physical units
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhysicalFrame {
    /// Rotation in degrees
    pub pan_deg: f64,
    pub tilt_deg: f64,
    pub roll_deg: f64,

    /// Position in millimeters
    pub x_mm: f64,
    pub y_mm: f64,
    pub z_mm: f64,

    /// Focal length in millimeters, `None` when the tracker sends no lens data
    pub zoom_mm: Option<f64>,

    /// Focus distance in meters, `None` when the tracker sends no lens data
    pub focus_m: Option<f64>,
}

impl PhysicalFrame {
    /// Position in meters as `(x, y, z)`
    pub fn position_m(&self) -> (f64, f64, f64) {
        (self.x_mm / 1000.0, self.y_mm / 1000.0, self.z_mm / 1000.0)
    }

    /// Focus distance as whole feet plus remaining inches
    pub fn focus_feet_inches(&self) -> Option<(u32, f64)> {
        self.focus_m.map(|meters| {
            let total_inches = meters * INCHES_PER_METER;
            ((total_inches / 12.0).floor() as u32, total_inches % 12.0)
        })
    }
}

/// Converts raw frames using configured scales and lens tables
#[derive(Debug, Clone, PartialEq)]
pub struct UnitConverter {
    scale: ScaleFactors,
    zoom: CalibrationTable,
    focus: CalibrationTable,
}

impl Default for UnitConverter {
    fn default() -> Self {
        Self::new(
            ScaleFactors::default(),
            CalibrationTable::premista_zoom(),
            CalibrationTable::premista_focus(),
        )
    }
}

impl UnitConverter {
    /// Create a converter from already validated configuration
    pub fn new(scale: ScaleFactors, zoom: CalibrationTable, focus: CalibrationTable) -> Self {
        Self { scale, zoom, focus }
    }

    /// Scale factors in use
    pub fn scale(&self) -> &ScaleFactors {
        &self.scale
    }

    /// Convert raw tracking values to physical units
    ///
    /// # Examples
    ///
    /// ```
    /// use freed_reader::freed::protocol::FrameFields;
    /// use freed_reader::units::UnitConverter;
    ///
    /// let converter = UnitConverter::default();
    /// let fields = FrameFields { pan: 32_768 * 90, zoom: 50_000, ..Default::default() };
    ///
    /// let physical = converter.convert(&fields);
    /// assert_eq!(physical.pan_deg, 90.0);
    /// assert_eq!(physical.zoom_mm, Some(50.0));
    /// ```
    pub fn convert(&self, fields: &FrameFields) -> PhysicalFrame {
        let rotation = |raw: i32| f64::from(raw) * self.scale.rotation;
        let position = |raw: i32| f64::from(raw) * self.scale.position;

        PhysicalFrame {
            pan_deg: rotation(fields.pan),
            tilt_deg: rotation(fields.tilt),
            roll_deg: rotation(fields.roll),
            x_mm: position(fields.position.x),
            y_mm: position(fields.position.y),
            z_mm: position(fields.position.z),
            zoom_mm: (fields.zoom != ZOOM_NO_DATA)
                .then(|| self.zoom.interpolate(f64::from(fields.zoom))),
            focus_m: (fields.focus != FOCUS_NO_DATA)
                .then(|| self.focus.interpolate(f64::from(fields.focus))),
        }
    }
}
