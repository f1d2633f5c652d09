//! # Genlock Analyzer
//!
//! Infers genlock state from the spare word.
//!
//! The spare word is vendor-defined. The layout assumed here is the one seen on
//! common trackers, not a published standard:
//!
//! ```text
//! byte 26: [ phase counter (4 bits) | lock flags (4 bits) ]
//! byte 27: [ reference format code  (8 bits)             ]
//! ```
//!
//! A tracker locked to an external sync cycles the phase counter. A counter
//! stuck at one value for the whole history window reads as unlocked, even if
//! that value is nonzero.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Number of consecutive phase samples considered for lock detection
pub const PHASE_HISTORY_LEN: usize = 8;

/// How lock status is derived from the spare word
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenlockMode {
    /// Locked when the phase counter cycles across recent packets
    #[default]
    PhaseCycle,

    /// Locked when bit 0 of the lower nibble of byte 26 is set
    LockFlag,

    /// Spare word carries no genlock information
    Disabled,
}

/// Phase counter nibble (upper nibble of byte 26)
pub fn phase_counter(spare: u16) -> u8 {
    ((spare >> 12) & 0x0F) as u8
}

/// Lock flag nibble (lower nibble of byte 26)
pub fn lock_flags(spare: u16) -> u8 {
    ((spare >> 8) & 0x0F) as u8
}

/// Reference format code (byte 27)
pub fn reference_format(spare: u16) -> u8 {
    (spare & 0xFF) as u8
}

/// Fixed-capacity window of recent phase counter values
#[derive(Debug, Clone, Default)]
pub struct PhaseHistory {
    values: VecDeque<u8>,
}

impl PhaseHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self {
            values: VecDeque::with_capacity(PHASE_HISTORY_LEN),
        }
    }

    /// Record a phase value, evicting the oldest once full
    pub fn push(&mut self, phase: u8) {
        if self.values.len() == PHASE_HISTORY_LEN {
            self.values.pop_front();
        }
        self.values.push_back(phase & 0x0F);
    }

    /// Forget all samples
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Number of samples held
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no samples are held
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of distinct phase values in the window
    pub fn distinct(&self) -> usize {
        let mask = self.values.iter().fold(0u16, |mask, &v| mask | (1 << v));
        mask.count_ones() as usize
    }

    /// Whether the counter is cycling (more than one distinct value)
    pub fn is_cycling(&self) -> bool {
        self.distinct() > 1
    }
}

/// Genlock state derived from one packet plus recent history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GenlockStatus {
    /// Phase counter of this packet
    pub phase: u8,

    /// Lock flag nibble of this packet
    pub lock_flags: u8,

    /// Reference format code (vendor-defined)
    pub reference: u8,

    /// Inferred lock state
    pub locked: bool,

    /// Distinct phase values in the history window
    pub distinct_phases: usize,

    /// Samples in the history window
    pub samples: usize,
}

/// Tracks phase history and reports genlock status per packet
#[derive(Debug, Clone)]
pub struct GenlockAnalyzer {
    mode: GenlockMode,
    history: PhaseHistory,
}

impl GenlockAnalyzer {
    /// Create an analyzer for the given interpretation
    pub fn new(mode: GenlockMode) -> Self {
        Self {
            mode,
            history: PhaseHistory::new(),
        }
    }

    /// Interpretation in use
    pub fn mode(&self) -> GenlockMode {
        self.mode
    }

    /// Phase history window
    pub fn history(&self) -> &PhaseHistory {
        &self.history
    }

    /// Record a packet's spare word and report its genlock status
    ///
    /// Returns `None` when genlock interpretation is disabled.
    pub fn observe(&mut self, spare: u16) -> Option<GenlockStatus> {
        if self.mode == GenlockMode::Disabled {
            return None;
        }

        let phase = phase_counter(spare);
        let flags = lock_flags(spare);
        self.history.push(phase);

        let locked = match self.mode {
            GenlockMode::PhaseCycle => self.history.is_cycling(),
            GenlockMode::LockFlag => flags & 0x01 != 0,
            GenlockMode::Disabled => false,
        };

        Some(GenlockStatus {
            phase,
            lock_flags: flags,
            reference: reference_format(spare),
            locked,
            distinct_phases: self.history.distinct(),
            samples: self.history.len(),
        })
    }

    /// Drop the phase history (after a reconnect gap)
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spare_with_phase(phase: u8) -> u16 {
        u16::from(phase) << 12
    }

    #[test]
    fn test_spare_layout_accessors() {
        let spare = 0xA3_5Cu16;
        assert_eq!(phase_counter(spare), 0xA);
        assert_eq!(lock_flags(spare), 0x3);
        assert_eq!(reference_format(spare), 0x5C);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = PhaseHistory::new();
        for phase in 0..20 {
            history.push(phase);
        }
        assert_eq!(history.len(), PHASE_HISTORY_LEN);
        // Only the last 8 values (12..=19, masked to 4 bits) remain
        assert_eq!(history.distinct(), 8);
    }

    #[test]
    fn test_identical_phases_are_unlocked() {
        let mut analyzer = GenlockAnalyzer::new(GenlockMode::PhaseCycle);
        let mut status = None;
        for _ in 0..PHASE_HISTORY_LEN {
            status = analyzer.observe(spare_with_phase(5));
        }

        let status = status.unwrap();
        assert!(!status.locked, "a stuck nonzero counter must read as unlocked");
        assert_eq!(status.distinct_phases, 1);
        assert_eq!(status.samples, PHASE_HISTORY_LEN);
    }

    #[test]
    fn test_two_distinct_phases_are_locked() {
        let mut analyzer = GenlockAnalyzer::new(GenlockMode::PhaseCycle);
        for _ in 0..PHASE_HISTORY_LEN - 1 {
            analyzer.observe(spare_with_phase(0));
        }
        let status = analyzer.observe(spare_with_phase(1)).unwrap();
        assert!(status.locked);
        assert_eq!(status.phase, 1);
    }

    #[test]
    fn test_old_variation_ages_out() {
        let mut analyzer = GenlockAnalyzer::new(GenlockMode::PhaseCycle);
        analyzer.observe(spare_with_phase(3));
        let mut last = None;
        for _ in 0..PHASE_HISTORY_LEN {
            last = analyzer.observe(spare_with_phase(9));
        }
        assert!(!last.unwrap().locked, "the single different sample has left the window");
    }

    #[test]
    fn test_reset_clears_history() {
        let mut analyzer = GenlockAnalyzer::new(GenlockMode::PhaseCycle);
        analyzer.observe(spare_with_phase(1));
        analyzer.observe(spare_with_phase(2));
        assert!(analyzer.history().is_cycling());

        analyzer.reset();
        assert!(analyzer.history().is_empty());

        let status = analyzer.observe(spare_with_phase(3)).unwrap();
        assert!(!status.locked);
        assert_eq!(status.samples, 1);
    }

    #[test]
    fn test_lock_flag_mode() {
        let mut analyzer = GenlockAnalyzer::new(GenlockMode::LockFlag);
        assert!(analyzer.observe(0x0100).unwrap().locked);
        assert!(!analyzer.observe(0x0200).unwrap().locked);
        assert!(!analyzer.observe(0xF000).unwrap().locked);
    }

    #[test]
    fn test_disabled_mode() {
        let mut analyzer = GenlockAnalyzer::new(GenlockMode::Disabled);
        assert_eq!(analyzer.observe(0x1234), None);
        assert!(analyzer.history().is_empty());
    }

    #[test]
    fn test_mode_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: GenlockMode,
        }

        let w: Wrapper = toml::from_str(r#"mode = "lock-flag""#).unwrap();
        assert_eq!(w.mode, GenlockMode::LockFlag);
        let w: Wrapper = toml::from_str(r#"mode = "phase-cycle""#).unwrap();
        assert_eq!(w.mode, GenlockMode::PhaseCycle);
    }
}
