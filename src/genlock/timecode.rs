//! # Timecode
//!
//! Reads the spare word as a running frame count and renders it as
//! `HH:MM:SS:FF`. Whether a tracker actually sends a frame count here is
//! vendor-specific; [`SpareTracker`] collects the evidence (a long run of +1
//! steps) that it does.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FreedError, Result};

/// Consecutive +1 steps after which the spare word is treated as a real timecode
pub const LIKELY_TIMECODE_RUN: u32 = 10;

/// How the spare word maps to a timecode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimecodeMode {
    /// Spare word is a total elapsed frame count
    #[default]
    FrameCount,

    /// Spare word carries no timecode
    Disabled,
}

/// Whole frames per second for a frame rate
///
/// # Errors
///
/// Returns `FreedError::InvalidFps` if `fps` is not finite, not positive, or
/// below one whole frame per second.
pub fn whole_fps(fps: f64) -> Result<u32> {
    if !fps.is_finite() || fps <= 0.0 || fps.floor() < 1.0 {
        return Err(FreedError::InvalidFps(fps));
    }
    Ok(fps.floor().min(u32::MAX as f64) as u32)
}

/// A timecode derived from a frame count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timecode {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub frames: u32,
}

impl Timecode {
    /// Split a total frame count at `fps` frames per second
    ///
    /// Fractional rates use their whole part, so 29.97 counts 29 frames per second.
    ///
    /// # Examples
    ///
    /// ```
    /// use freed_reader::genlock::timecode::Timecode;
    ///
    /// let tc = Timecode::from_frame_count(47, 24.0).unwrap();
    /// assert_eq!(tc.to_string(), "00:00:01:23");
    /// ```
    pub fn from_frame_count(total_frames: u32, fps: f64) -> Result<Self> {
        let fps = whole_fps(fps)?;
        let total_seconds = total_frames / fps;

        Ok(Self {
            hours: total_seconds / 3600,
            minutes: (total_seconds / 60) % 60,
            seconds: total_seconds % 60,
            frames: total_frames % fps,
        })
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds, self.frames
        )
    }
}

/// How the spare word changed since the previous packet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpareTrend {
    /// Difference from the previous spare value, `None` for the first packet
    pub delta: Option<i32>,

    /// Consecutive packets where the spare word went up by exactly one
    pub increment_run: u32,

    /// Consecutive packets where the spare word did not change
    pub unchanged_run: u32,
}

impl SpareTrend {
    /// Whether the spare word behaves like a running frame counter
    pub fn likely_timecode(&self) -> bool {
        self.increment_run > LIKELY_TIMECODE_RUN
    }
}

/// Follows successive spare values to spot an incrementing counter
#[derive(Debug, Clone, Default)]
pub struct SpareTracker {
    last: Option<u16>,
    trend: SpareTrend,
}

impl SpareTracker {
    /// Create a tracker with no history
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the next spare value
    ///
    /// Any delta other than +1 or 0 resets both runs, including a step from
    /// 65535 back to 0.
    pub fn observe(&mut self, spare: u16) -> SpareTrend {
        if let Some(last) = self.last {
            let delta = i32::from(spare) - i32::from(last);
            if delta == 1 {
                self.trend.increment_run += 1;
            } else if delta == 0 {
                self.trend.unchanged_run += 1;
            } else {
                self.trend.increment_run = 0;
                self.trend.unchanged_run = 0;
            }
            self.trend.delta = Some(delta);
        }

        self.last = Some(spare);
        self.trend
    }

    /// Latest trend without recording anything
    pub fn trend(&self) -> SpareTrend {
        self.trend
    }
}
