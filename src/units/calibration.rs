//! # Calibration Module
//!
//! Converts raw lens encoder counts to physical values.
//!
//! ## Calibration Tables
//!
//! A table is an ordered list of `(raw, physical)` sample points measured on a
//! specific camera and lens. Raw values must be strictly increasing. Tables are
//! loaded from configuration and never change while a session runs.
//!
//! ## Interpolation
//!
//! Values between two points are interpolated linearly. Values outside the
//! table clamp to the nearest end point, so every input has an output:
//!
//! ```text
//! physical
//!    ^            ______ clamp
//!    |          /
//!    |     ____/
//!    |    /
//!    |___/ clamp
//!    +-----------------> raw
//! ```
//!
//! ## Usage
//!
//! ```
//! use freed_reader::units::calibration::CalibrationTable;
//!
//! let zoom = CalibrationTable::new(vec![(28_000.0, 28.0), (100_000.0, 100.0)]).unwrap();
//!
//! assert_eq!(zoom.interpolate(64_000.0), 64.0);
//! assert_eq!(zoom.interpolate(0.0), 28.0);       // below range
//! assert_eq!(zoom.interpolate(250_000.0), 100.0); // above range
//! ```

use serde::Deserialize;

use crate::error::{FreedError, Result};

/// One measured sample of a calibration table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationPoint {
    /// Raw encoder count
    pub raw: f64,
    /// Physical value at that count
    pub physical: f64,
}

/// Ordered raw-to-physical lookup table
///
/// Deserializes from an array of `[raw, physical]` pairs and is validated on load.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Vec<(f64, f64)>")]
pub struct CalibrationTable {
    points: Vec<CalibrationPoint>,
}

impl CalibrationTable {
    /// Creates a calibration table from `(raw, physical)` pairs.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The table is empty
    /// - Any value is NaN or infinite
    /// - Raw values are not strictly increasing
    pub fn new(pairs: Vec<(f64, f64)>) -> Result<Self> {
        if pairs.is_empty() {
            return Err(FreedError::calibration("table must contain at least one point"));
        }

        for (i, &(raw, physical)) in pairs.iter().enumerate() {
            if !raw.is_finite() || !physical.is_finite() {
                return Err(FreedError::calibration(format!(
                    "point {} ({}, {}) is not finite",
                    i, raw, physical
                )));
            }
        }

        if let Some(i) = pairs.windows(2).position(|pair| pair[1].0 <= pair[0].0) {
            return Err(FreedError::calibration(format!(
                "raw values must be strictly increasing (point {} = {} follows {})",
                i + 1,
                pairs[i + 1].0,
                pairs[i].0
            )));
        }

        Ok(Self {
            points: pairs
                .into_iter()
                .map(|(raw, physical)| CalibrationPoint { raw, physical })
                .collect(),
        })
    }

    /// Zoom table for a Fujinon Premista 28-100mm (raw = focal length × 1000)
    #[must_use]
    pub fn premista_zoom() -> Self {
        Self::from_trusted(&[
            (28_000.0, 28.0),
            (35_000.0, 35.0),
            (50_000.0, 50.0),
            (70_000.0, 70.0),
            (100_000.0, 100.0),
        ])
    }

    /// Focus table for a Fujinon Premista 28-100mm (raw = distance in meters × 1000)
    #[must_use]
    pub fn premista_focus() -> Self {
        Self::from_trusted(&[
            (800.0, 0.8),       // minimum object distance
            (892.0, 0.892),
            (1_299.0, 1.299),
            (4_170.0, 4.170),
            (629_000.0, 629.0), // far focus
        ])
    }

    /// Build from compile-time constants that are known to be ordered
    fn from_trusted(pairs: &[(f64, f64)]) -> Self {
        Self {
            points: pairs
                .iter()
                .map(|&(raw, physical)| CalibrationPoint { raw, physical })
                .collect(),
        }
    }

    /// Sample points in ascending raw order
    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    /// Interpolates the physical value for a raw encoder count.
    ///
    /// Clamps to the first/last physical value outside the table range.
    /// A single-point table always returns its only value.
    ///
    /// # Arguments
    ///
    /// * `raw` - Raw encoder value
    ///
    /// # Returns
    ///
    /// Physical value in the table's unit
    #[must_use]
    pub fn interpolate(&self, raw: f64) -> f64 {
        // Non-empty by construction
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];

        if raw <= first.raw {
            return first.physical;
        }
        if raw >= last.raw {
            return last.physical;
        }

        self.points
            .windows(2)
            .find(|pair| pair[0].raw <= raw && raw <= pair[1].raw)
            .map(|pair| {
                let (lo, hi) = (pair[0], pair[1]);
                let t = (raw - lo.raw) / (hi.raw - lo.raw);
                lo.physical + t * (hi.physical - lo.physical)
            })
            // Only NaN input falls through both clamps and every segment
            .unwrap_or(first.physical)
    }
}

impl TryFrom<Vec<(f64, f64)>> for CalibrationTable {
    type Error = FreedError;

    fn try_from(pairs: Vec<(f64, f64)>) -> Result<Self> {
        Self::new(pairs)
    }
}
