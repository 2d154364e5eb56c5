use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Half-open interval `[start, end)` of instants. Immutable once built.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateRange {
    /// Returns `Err` if `start >= end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, String> {
        if start >= end {
            return Err(format!(
                "DateRange requires start < end, got start={start}, end={end}"
            ));
        }
        Ok(Self { start, end })
    }

    pub fn last_days(days: i64) -> Self {
        let end = Utc::now();
        let start = end - Duration::days(days);
        Self { start, end }
    }

    /// 5-day window balancing recency against free-tier API limits
    /// (NewsAPI in particular caps lookback for unauthenticated use).
    pub fn near_realtime() -> Self {
        Self::last_days(5)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    /// `contains`, widened by `slack` on both ends to absorb
    /// source-specific clock skew.
    pub fn contains_with_slack(&self, instant: DateTime<Utc>, slack: Duration) -> bool {
        instant >= self.start - slack && instant < self.end + slack
    }

    /// GDELT's query format: `YYYYMMDDHHMMSS`.
    pub fn to_gdelt_format(&self) -> (String, String) {
        (
            self.start.format("%Y%m%d%H%M%S").to_string(),
            self.end.format("%Y%m%d%H%M%S").to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_range() {
        let now = Utc::now();
        assert!(DateRange::new(now, now).is_err());
        assert!(DateRange::new(now, now - Duration::seconds(1)).is_err());
    }

    #[test]
    fn contains_is_half_open() {
        let start = Utc::now();
        let end = start + Duration::days(1);
        let range = DateRange::new(start, end).unwrap();
        assert!(range.contains(start));
        assert!(!range.contains(end));
    }
}
