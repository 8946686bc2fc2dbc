//! Edge and pulse analysis over the digitized channels of a [`LogicAnalyzer`].
//!
//! Edge timestamps are those of the last sample *before* a transition. Range
//! bounds are the first sample at the new level and the first sample after
//! leaving it.

use crate::logic_analyzer::{AnalyzerError, LogicAnalyzer};

/// A `(start, end)` pair of timestamps around one run of constant level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

impl From<(f64, f64)> for Interval {
    fn from((start, end): (f64, f64)) -> Self {
        Self::new(start, end)
    }
}

/// Pack most-significant-bit-first bits into a byte.
///
/// Only the last eight bits survive a longer list.
pub fn bits_to_byte(bits: &[bool]) -> u8 {
    bits.iter().fold(0u8, |byte, &bit| (byte << 1) | u8::from(bit))
}

impl LogicAnalyzer {
    fn transitions(
        &self,
        key: &str,
        matches: impl Fn(bool, bool) -> bool,
    ) -> Result<Vec<f64>, AnalyzerError> {
        let digitized = self.digitized(key)?;
        Ok(digitized
            .windows(2)
            .zip(self.timebase().as_slice())
            .filter(|(pair, _)| matches(pair[0], pair[1]))
            .map(|(_, &time)| time)
            .collect())
    }

    pub fn rising_edges(&self, key: &str) -> Result<Vec<f64>, AnalyzerError> {
        self.transitions(key, |before, after| !before && after)
    }

    pub fn falling_edges(&self, key: &str) -> Result<Vec<f64>, AnalyzerError> {
        self.transitions(key, |before, after| before && !after)
    }

    /// Every transition of `key`, in timebase order.
    pub fn edges(&self, key: &str) -> Result<Vec<f64>, AnalyzerError> {
        self.transitions(key, |before, after| before != after)
    }

    pub fn first_edge_after(&self, key: &str, time: f64) -> Result<Option<f64>, AnalyzerError> {
        Ok(self.edges(key)?.into_iter().find(|&edge| edge > time))
    }

    /// Runs at `level` that both start and end inside the buffer.
    ///
    /// A run only opens on an observed transition into `level` and is dropped
    /// if the buffer ends before it closes.
    fn level_ranges(&self, key: &str, level: bool) -> Result<Vec<Interval>, AnalyzerError> {
        let digitized = self.digitized(key)?;
        let timebase = self.timebase().as_slice();

        let mut ranges = Vec::new();
        let mut open = None;
        for i in 1..digitized.len().saturating_sub(1) {
            let (previous, current) = (digitized[i - 1], digitized[i]);
            if current == level && previous != level {
                open = Some(i);
            } else if current != level && previous == level {
                if let Some(start) = open.take() {
                    ranges.push(Interval::new(timebase[start], timebase[i]));
                }
            }
        }
        Ok(ranges)
    }

    pub fn high_ranges(&self, key: &str) -> Result<Vec<Interval>, AnalyzerError> {
        self.level_ranges(key, true)
    }

    /// Runs where `key` reads low.
    ///
    /// A channel that is already low on the first sample has no observed
    /// falling edge, so that run is not reported: a chip-select transaction
    /// in progress when the capture starts is lost.
    pub fn low_ranges(&self, key: &str) -> Result<Vec<Interval>, AnalyzerError> {
        self.level_ranges(key, false)
    }

    pub fn pulse_widths(&self, key: &str, level: bool) -> Result<Vec<f64>, AnalyzerError> {
        Ok(self
            .level_ranges(key, level)?
            .iter()
            .map(Interval::duration)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer(levels: &[u8]) -> LogicAnalyzer {
        let timebase: Vec<f64> = (0..levels.len()).map(|i| i as f64 * 10.0).collect();
        let mut analyzer = LogicAnalyzer::new(timebase);
        analyzer
            .set("X", levels.iter().map(|&l| f64::from(l)).collect())
            .unwrap();
        analyzer
    }

    #[test]
    fn test_rising_and_falling_edges() {
        let analyzer = analyzer(&[0, 0, 1, 1, 0, 1, 0, 0]);
        assert_eq!(analyzer.rising_edges("X").unwrap(), vec![10.0, 40.0]);
        assert_eq!(analyzer.falling_edges("X").unwrap(), vec![30.0, 50.0]);
        assert_eq!(analyzer.edges("X").unwrap(), vec![10.0, 30.0, 40.0, 50.0]);
    }

    #[test]
    fn test_edges_is_sorted_union_without_duplicates() {
        let analyzer = analyzer(&[1, 0, 1, 1, 0, 0, 1, 0, 1, 1, 1, 0]);
        let mut union = analyzer.rising_edges("X").unwrap();
        union.extend(analyzer.falling_edges("X").unwrap());
        union.sort_by(f64::total_cmp);

        let edges = analyzer.edges("X").unwrap();
        assert_eq!(edges, union);
        assert!(edges.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_edges_need_two_samples() {
        assert!(analyzer(&[1]).edges("X").unwrap().is_empty());
        assert!(analyzer(&[]).edges("X").unwrap().is_empty());
        assert!(analyzer(&[0, 0]).low_ranges("X").unwrap().is_empty());
    }

    #[test]
    fn test_first_edge_after() {
        let analyzer = analyzer(&[0, 0, 1, 1, 0, 1, 0, 0]);
        assert_eq!(analyzer.first_edge_after("X", 0.0).unwrap(), Some(10.0));
        assert_eq!(analyzer.first_edge_after("X", 10.0).unwrap(), Some(30.0));
        assert_eq!(analyzer.first_edge_after("X", 50.0).unwrap(), None);
    }

    #[test]
    fn test_high_and_low_ranges() {
        let analyzer = analyzer(&[0, 0, 1, 1, 0, 1, 0, 0, 1, 1]);
        assert_eq!(
            analyzer.high_ranges("X").unwrap(),
            vec![Interval::new(20.0, 40.0), Interval::new(50.0, 60.0)]
        );
        // The leading run never saw a transition in; the trailing run never
        // saw one out.
        assert_eq!(
            analyzer.low_ranges("X").unwrap(),
            vec![Interval::new(40.0, 50.0), Interval::new(60.0, 80.0)]
        );
    }

    #[test]
    fn test_ranges_drop_open_run_at_end() {
        let analyzer = analyzer(&[1, 1, 0, 0, 0, 0]);
        assert!(analyzer.low_ranges("X").unwrap().is_empty());
        assert!(analyzer.high_ranges("X").unwrap().is_empty());
    }

    #[test]
    fn test_ranges_do_not_overlap() {
        let analyzer = analyzer(&[1, 0, 0, 1, 0, 1, 1, 0, 0, 0, 1, 1]);
        for ranges in [
            analyzer.high_ranges("X").unwrap(),
            analyzer.low_ranges("X").unwrap(),
        ] {
            assert!(ranges.iter().all(|r| r.start < r.end));
            assert!(ranges.windows(2).all(|pair| pair[0].end <= pair[1].start));
        }
    }

    #[test]
    fn test_low_ranges_skip_run_open_at_capture_start() {
        let analyzer = analyzer(&[0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1]);
        assert!(analyzer.low_ranges("X").unwrap().is_empty());
    }

    #[test]
    fn test_pulse_widths() {
        let analyzer = analyzer(&[1, 0, 0, 1, 0, 1, 1, 1, 0, 1]);
        // The low run opening at index 8 would close on the last sample,
        // which the scan never looks at, so it is dropped.
        assert_eq!(analyzer.pulse_widths("X", false).unwrap(), vec![20.0, 10.0]);
        assert_eq!(analyzer.pulse_widths("X", true).unwrap(), vec![10.0, 30.0]);
    }

    #[test]
    fn test_unknown_key() {
        let analyzer = analyzer(&[0, 1]);
        assert!(matches!(
            analyzer.rising_edges("Y"),
            Err(AnalyzerError::KeyNotFound { .. })
        ));
        assert!(analyzer.high_ranges("Y").is_err());
    }

    #[test]
    fn test_bits_to_byte() {
        let bits = |s: &str| s.chars().map(|c| c == '1').collect::<Vec<_>>();
        assert_eq!(bits_to_byte(&bits("10100101")), 0xA5);
        assert_eq!(bits_to_byte(&bits("00111100")), 0x3C);
        assert_eq!(bits_to_byte(&bits("101")), 0b101);
        assert_eq!(bits_to_byte(&[]), 0);
        // High bits fall off the top of a longer list.
        assert_eq!(bits_to_byte(&bits("1111100000001")), 0b0000_0001);
    }
}
