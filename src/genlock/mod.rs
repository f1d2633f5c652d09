//! # Genlock Module
//!
//! Interpretation of the vendor-defined spare word of a D1 packet.
//!
//! This module handles:
//! - Genlock lock inference from the phase counter history
//! - Timecode rendering when the spare word is a frame count
//! - Increment-run tracking to hint whether the spare word really is a timecode

pub mod analyzer;
pub mod timecode;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use analyzer::{GenlockAnalyzer, GenlockMode, GenlockStatus};
use timecode::{whole_fps, SpareTracker, SpareTrend, Timecode, TimecodeMode};

/// How the spare word is interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SpareInterpretation {
    /// Genlock interpretation
    #[serde(default)]
    pub genlock: GenlockMode,

    /// Timecode interpretation
    #[serde(default)]
    pub timecode: TimecodeMode,
}

/// Everything derived from one packet's spare word
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpareReport {
    /// Genlock status, `None` when genlock interpretation is disabled
    pub genlock: Option<GenlockStatus>,

    /// Timecode, `None` unless a frame rate is configured
    pub timecode: Option<Timecode>,

    /// Change since the previous packet
    pub trend: SpareTrend,
}

/// Stateful analyzer fed one spare word per decoded packet
#[derive(Debug, Clone)]
pub struct SpareAnalyzer {
    interpretation: SpareInterpretation,
    fps: Option<f64>,
    genlock: GenlockAnalyzer,
    tracker: SpareTracker,
}

impl SpareAnalyzer {
    /// Create an analyzer
    ///
    /// # Errors
    ///
    /// Returns `FreedError::InvalidFps` if `fps` is given but unusable.
    pub fn new(interpretation: SpareInterpretation, fps: Option<f64>) -> Result<Self> {
        if let Some(fps) = fps {
            whole_fps(fps)?;
        }

        Ok(Self {
            interpretation,
            fps,
            genlock: GenlockAnalyzer::new(interpretation.genlock),
            tracker: SpareTracker::new(),
        })
    }

    /// Interpretation in use
    pub fn interpretation(&self) -> SpareInterpretation {
        self.interpretation
    }

    /// Record a spare word and report what it means
    pub fn analyze(&mut self, spare: u16) -> SpareReport {
        let timecode = match (self.interpretation.timecode, self.fps) {
            (TimecodeMode::FrameCount, Some(fps)) => {
                Timecode::from_frame_count(u32::from(spare), fps).ok()
            }
            _ => None,
        };

        SpareReport {
            genlock: self.genlock.observe(spare),
            timecode,
            trend: self.tracker.observe(spare),
        }
    }

    /// Forget genlock history after a reconnect gap
    ///
    /// The increment tracker is kept; a timecode that resumes counting after a
    /// dropout still reads as one.
    pub fn reset_genlock(&mut self) {
        self.genlock.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FreedError;

    #[test]
    fn test_new_rejects_bad_fps() {
        let result = SpareAnalyzer::new(SpareInterpretation::default(), Some(0.0));
        assert!(matches!(result, Err(FreedError::InvalidFps(_))));
    }

    #[test]
    fn test_analyze_without_fps_has_no_timecode() {
        let mut analyzer = SpareAnalyzer::new(SpareInterpretation::default(), None).unwrap();
        let report = analyzer.analyze(47);
        assert_eq!(report.timecode, None);
        assert!(report.genlock.is_some());
    }

    #[test]
    fn test_analyze_with_fps() {
        let mut analyzer = SpareAnalyzer::new(SpareInterpretation::default(), Some(24.0)).unwrap();
        let report = analyzer.analyze(47);
        assert_eq!(report.timecode.unwrap().to_string(), "00:00:01:23");
    }

    #[test]
    fn test_timecode_disabled() {
        let interpretation = SpareInterpretation {
            genlock: GenlockMode::Disabled,
            timecode: TimecodeMode::Disabled,
        };
        let mut analyzer = SpareAnalyzer::new(interpretation, Some(25.0)).unwrap();
        let report = analyzer.analyze(100);
        assert_eq!(report.timecode, None);
        assert_eq!(report.genlock, None);
    }

    #[test]
    fn test_reset_genlock_keeps_trend() {
        let mut analyzer = SpareAnalyzer::new(SpareInterpretation::default(), None).unwrap();
        analyzer.analyze(0x1000);
        analyzer.analyze(0x1001);
        assert!(analyzer.analyze(0x2002).genlock.unwrap().locked);

        analyzer.reset_genlock();
        let report = analyzer.analyze(0x2003);
        assert!(!report.genlock.unwrap().locked);
        assert_eq!(report.genlock.unwrap().samples, 1);
        assert_eq!(report.trend.delta, Some(1));
    }

    #[test]
    fn test_interpretation_deserialize_defaults() {
        let interpretation: SpareInterpretation = toml::from_str("").unwrap();
        assert_eq!(interpretation, SpareInterpretation::default());

        let interpretation: SpareInterpretation =
            toml::from_str(r#"genlock = "disabled""#).unwrap();
        assert_eq!(interpretation.genlock, GenlockMode::Disabled);
        assert_eq!(interpretation.timecode, TimecodeMode::FrameCount);
    }
}
