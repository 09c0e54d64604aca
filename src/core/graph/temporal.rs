//! Temporal edge filtering
//!
//! Edges may carry `valid_from` / `valid_to` bounds (milliseconds since
//! epoch). A query timestamp `t` admits an edge iff `valid_from ≤ t ≤
//! valid_to`, with absent bounds treated as unbounded on that side.

use chrono::Utc;

/// Point-in-time filter applied during traversals and range queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalFilter {
    /// Query time point; `None` admits every edge.
    pub timestamp_ms: Option<i64>,
}

impl TemporalFilter {
    /// A filter for the given timestamp.
    #[must_use]
    pub const fn at(timestamp_ms: i64) -> Self {
        Self { timestamp_ms: Some(timestamp_ms) }
    }

    /// A filter for the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self { timestamp_ms: Some(Utc::now().timestamp_millis()) }
    }

    /// A filter admitting all edges.
    #[must_use]
    pub const fn all() -> Self {
        Self { timestamp_ms: None }
    }

    /// Whether an edge with the given bounds is admitted.
    #[must_use]
    pub fn is_valid(&self, valid_from: Option<i64>, valid_to: Option<i64>) -> bool {
        let Some(t) = self.timestamp_ms else {
            return true;
        };
        if let Some(from) = valid_from {
            if t < from {
                return false;
            }
        }
        if let Some(to) = valid_to {
            if t > to {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unfiltered_admits_everything() {
        let filter = TemporalFilter::all();
        assert!(filter.is_valid(Some(1000), Some(2000)));
        assert!(filter.is_valid(None, None));
    }

    #[test]
    fn test_bounds() {
        let filter = TemporalFilter::at(1500);
        assert!(filter.is_valid(Some(1000), Some(2000)));
        assert!(filter.is_valid(Some(1500), Some(1500)));
        assert!(!filter.is_valid(Some(1600), Some(2000)));
        assert!(!filter.is_valid(Some(1000), Some(1400)));
    }

    #[test]
    fn test_absent_bounds_are_unbounded() {
        let filter = TemporalFilter::at(1500);
        assert!(filter.is_valid(None, Some(2000)));
        assert!(filter.is_valid(Some(1000), None));
        assert!(filter.is_valid(None, None));
        assert!(!filter.is_valid(None, Some(1400)));
        assert!(!filter.is_valid(Some(1600), None));
    }
}
