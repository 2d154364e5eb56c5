use chrono::{DateTime, Utc};

/// Per-source daily and per-minute budgets with a sliding window.
/// Decremented on admission, reset at midnight UTC.
#[derive(Debug, Clone)]
pub struct SourceQuota {
    pub daily_limit: u32,
    pub per_minute_limit: u32,
    pub used_today: u32,
    pub used_this_minute: u32,
    pub minute_window_started_at: DateTime<Utc>,
    pub day_started_at: DateTime<Utc>,
}

impl SourceQuota {
    pub fn new(daily_limit: u32, per_minute_limit: u32) -> Self {
        let now = Utc::now();
        Self {
            daily_limit,
            per_minute_limit,
            used_today: 0,
            used_this_minute: 0,
            minute_window_started_at: now,
            day_started_at: now,
        }
    }

    fn roll_windows(&mut self, now: DateTime<Utc>) {
        if now.date_naive() != self.day_started_at.date_naive() {
            self.used_today = 0;
            self.day_started_at = now;
        }
        if (now - self.minute_window_started_at).num_seconds() >= 60 {
            self.used_this_minute = 0;
            self.minute_window_started_at = now;
        }
    }

    pub fn can_make_request(&mut self, num_symbols: u32, now: DateTime<Utc>) -> bool {
        self.roll_windows(now);
        self.used_today + num_symbols <= self.daily_limit
            && self.used_this_minute + num_symbols <= self.per_minute_limit
    }

    pub fn record_usage(&mut self, num_symbols: u32, now: DateTime<Utc>) {
        self.roll_windows(now);
        self.used_today += num_symbols;
        self.used_this_minute += num_symbols;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn denies_when_daily_limit_exhausted() {
        let mut quota = SourceQuota::new(10, 100);
        let now = Utc::now();
        quota.record_usage(10, now);
        assert!(!quota.can_make_request(1, now));
    }

    #[test]
    fn resets_minute_window_after_60s() {
        let mut quota = SourceQuota::new(1000, 5);
        let now = Utc::now();
        quota.record_usage(5, now);
        assert!(!quota.can_make_request(1, now));
        assert!(quota.can_make_request(1, now + Duration::seconds(61)));
    }
}
