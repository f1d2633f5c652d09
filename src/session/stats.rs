//! Packet arrival rate statistics

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of inter-packet gaps kept for the rolling mean
pub const INTERVAL_HISTORY_LEN: usize = 30;

/// Gap after which the stream is treated as reconnected
pub const RECONNECT_GAP: Duration = Duration::from_millis(2000);

/// Result of recording a packet arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// First packet seen
    First,

    /// Gap added to the rolling window
    Measured,

    /// Gap exceeded [`RECONNECT_GAP`]; history was cleared
    Reconnected,
}

/// Rolling mean of inter-packet intervals
#[derive(Debug, Clone, Default)]
pub struct IntervalStats {
    last_arrival: Option<Instant>,
    gaps_ms: VecDeque<f64>,
}

impl IntervalStats {
    /// Create empty statistics
    pub fn new() -> Self {
        Self {
            last_arrival: None,
            gaps_ms: VecDeque::with_capacity(INTERVAL_HISTORY_LEN),
        }
    }

    /// Record a packet arriving at `now`
    pub fn record(&mut self, now: Instant) -> Arrival {
        let previous = self.last_arrival.replace(now);
        let Some(previous) = previous else {
            return Arrival::First;
        };

        let gap = now.saturating_duration_since(previous);
        if gap > RECONNECT_GAP {
            self.gaps_ms.clear();
            return Arrival::Reconnected;
        }

        if self.gaps_ms.len() == INTERVAL_HISTORY_LEN {
            self.gaps_ms.pop_front();
        }
        self.gaps_ms.push_back(gap.as_secs_f64() * 1000.0);
        Arrival::Measured
    }

    /// Mean gap in milliseconds, `None` until a gap has been measured
    pub fn interval_ms(&self) -> Option<f64> {
        if self.gaps_ms.is_empty() {
            return None;
        }
        Some(self.gaps_ms.iter().sum::<f64>() / self.gaps_ms.len() as f64)
    }

    /// Packet rate derived from the mean gap
    pub fn fps(&self) -> Option<f64> {
        self.interval_ms()
            .filter(|&ms| ms > 0.0)
            .map(|ms| 1000.0 / ms)
    }

    /// Time of the most recent packet
    pub fn last_arrival(&self) -> Option<Instant> {
        self.last_arrival
    }

    /// Number of gaps in the window
    pub fn samples(&self) -> usize {
        self.gaps_ms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_first_packet_has_no_interval() {
        let mut stats = IntervalStats::new();
        assert_eq!(stats.record(Instant::now()), Arrival::First);
        assert_eq!(stats.interval_ms(), None);
        assert_eq!(stats.fps(), None);
    }

    #[test]
    fn test_mean_interval_and_fps() {
        let mut stats = IntervalStats::new();
        let start = Instant::now();
        stats.record(start);
        stats.record(start + ms(20));
        stats.record(start + ms(60));

        // Gaps of 20 and 40 ms
        assert!((stats.interval_ms().unwrap() - 30.0).abs() < 1e-9);
        assert!((stats.fps().unwrap() - 1000.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut stats = IntervalStats::new();
        let start = Instant::now();
        stats.record(start);

        // 10 slow gaps, then 30 fast gaps push them all out
        let mut t = start;
        for _ in 0..10 {
            t += ms(100);
            stats.record(t);
        }
        for _ in 0..INTERVAL_HISTORY_LEN {
            t += ms(40);
            stats.record(t);
        }

        assert_eq!(stats.samples(), INTERVAL_HISTORY_LEN);
        assert!((stats.interval_ms().unwrap() - 40.0).abs() < 1e-6);
        assert!((stats.fps().unwrap() - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_reconnect_gap_clears_history() {
        let mut stats = IntervalStats::new();
        let start = Instant::now();
        stats.record(start);
        stats.record(start + ms(40));
        assert!(stats.interval_ms().is_some());

        let after_gap = start + ms(40) + ms(2001);
        assert_eq!(stats.record(after_gap), Arrival::Reconnected);
        assert_eq!(stats.interval_ms(), None, "interval restarts after a reconnect");
        assert_eq!(stats.fps(), None);
        assert_eq!(stats.last_arrival(), Some(after_gap));

        assert_eq!(stats.record(after_gap + ms(50)), Arrival::Measured);
        assert!((stats.interval_ms().unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_gap_of_exactly_two_seconds_is_measured() {
        let mut stats = IntervalStats::new();
        let start = Instant::now();
        stats.record(start);
        assert_eq!(stats.record(start + RECONNECT_GAP), Arrival::Measured);
    }

    #[test]
    fn test_zero_gap_has_no_fps() {
        let mut stats = IntervalStats::new();
        let now = Instant::now();
        stats.record(now);
        stats.record(now);
        assert_eq!(stats.interval_ms(), Some(0.0));
        assert_eq!(stats.fps(), None);
    }
}
