use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed interval `[start, end]` of ledger indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRange {
    pub start: u32,
    pub end: u32,
}

impl LedgerRange {
    #[must_use]
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn contains(&self, index: u32) -> bool {
        index >= self.start && index <= self.end
    }
}

impl fmt::Display for LedgerRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// The set of ledgers one node currently reports as queryable.
///
/// Replaced wholesale on every `ledgerClosed` notification: nodes report their full
/// retained window, never a delta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCoverage {
    ranges: Vec<LedgerRange>,
}

impl LedgerCoverage {
    #[must_use]
    pub fn new(ranges: Vec<LedgerRange>) -> Self {
        Self { ranges }
    }

    /// Parses a `validated_ledgers` descriptor such as `"32570-62000,62005"`.
    ///
    /// Single numbers become one-ledger ranges. Segments that are empty or not numeric
    /// are skipped, and reversed bounds are normalised.
    #[must_use]
    pub fn parse(descriptor: &str) -> Self {
        let ranges = descriptor
            .split(',')
            .filter_map(|segment| {
                let segment = segment.trim();
                if segment.is_empty() || segment == "empty" {
                    return None;
                }

                let (start, end) = match segment.split_once('-') {
                    Some((start, end)) => {
                        (start.trim().parse::<u32>().ok()?, end.trim().parse::<u32>().ok()?)
                    }
                    None => {
                        let index = segment.parse::<u32>().ok()?;
                        (index, index)
                    }
                };

                Some(LedgerRange::new(start.min(end), start.max(end)))
            })
            .collect();

        Self { ranges }
    }

    #[must_use]
    pub fn contains(&self, index: u32) -> bool {
        self.ranges.iter().any(|range| range.contains(index))
    }

    #[must_use]
    pub fn ranges(&self) -> &[LedgerRange] {
        &self.ranges
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl fmt::Display for LedgerCoverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ranges.is_empty() {
            return f.write_str("empty");
        }

        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{range}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ranges_and_singletons() {
        let coverage = LedgerCoverage::parse("32570-62000,62005");
        assert_eq!(
            coverage.ranges(),
            &[LedgerRange::new(32570, 62000), LedgerRange::new(62005, 62005)]
        );
    }

    #[test]
    fn test_inclusive_bounds() {
        let coverage =
            LedgerCoverage::new(vec![LedgerRange::new(1, 100), LedgerRange::new(150, 200)]);

        assert!(coverage.contains(1));
        assert!(coverage.contains(100));
        assert!(coverage.contains(150));
        assert!(coverage.contains(200));
        assert!(!coverage.contains(120));
        assert!(!coverage.contains(201));
        assert!(!coverage.contains(0));
    }

    #[test]
    fn test_parse_skips_malformed_segments() {
        let coverage = LedgerCoverage::parse("abc, 10-20 ,,x-5,30");
        assert_eq!(coverage.ranges(), &[LedgerRange::new(10, 20), LedgerRange::new(30, 30)]);
    }

    #[test]
    fn test_parse_empty_descriptor() {
        assert!(LedgerCoverage::parse("empty").is_empty());
        assert!(LedgerCoverage::parse("").is_empty());
        assert!(!LedgerCoverage::parse("").contains(1));
    }

    #[test]
    fn test_reversed_bounds_are_normalised() {
        let coverage = LedgerCoverage::parse("200-150");
        assert_eq!(coverage.ranges(), &[LedgerRange::new(150, 200)]);
    }

    #[test]
    fn test_display_round_trips_descriptor() {
        let descriptor = "1-100,150-200,250";
        assert_eq!(LedgerCoverage::parse(descriptor).to_string(), descriptor);
        assert_eq!(LedgerCoverage::default().to_string(), "empty");
    }
}
