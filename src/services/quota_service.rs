use crate::models::{Source, SourceQuota};
use chrono::Utc;
use dashmap::DashMap;

/// Daily/per-minute request budget per source, separate from
/// `RateLimiter` (which throttles burst pacing, not a day's allowance).
/// Gates whether the Scheduler even includes a source in a run.
pub struct QuotaService {
    quotas: DashMap<Source, SourceQuota>,
}

impl QuotaService {
    pub fn new() -> Self {
        let quotas = DashMap::new();
        for source in Source::ALL {
            quotas.insert(source, default_quota(source));
        }
        Self { quotas }
    }

    pub fn can_make_request(&self, source: Source, num_symbols: u32) -> bool {
        match self.quotas.get_mut(&source) {
            Some(mut quota) => quota.can_make_request(num_symbols, Utc::now()),
            None => true,
        }
    }

    pub fn record_usage(&self, source: Source, num_symbols: u32) {
        if let Some(mut quota) = self.quotas.get_mut(&source) {
            quota.record_usage(num_symbols, Utc::now());
        }
    }

    /// Forces every source's daily/per-minute counters back to zero,
    /// independent of `SourceQuota`'s own lazy window rollover. Backs
    /// the scheduler's nightly `quota_reset` job.
    pub fn reset_all(&self) {
        for source in Source::ALL {
            self.quotas.insert(source, default_quota(source));
        }
    }
}

impl Default for QuotaService {
    fn default() -> Self {
        Self::new()
    }
}

/// NewsAPI's free tier is the binding daily constraint in practice;
/// quota-free sources still carry a generous ceiling so the service
/// stays uniform.
fn default_quota(source: Source) -> SourceQuota {
    match source {
        Source::NewsApi => SourceQuota::new(100, 10),
        Source::MarketAux => SourceQuota::new(100, 10),
        Source::Finnhub => SourceQuota::new(3000, 60),
        Source::HackerNews | Source::Gdelt | Source::YahooFinance => SourceQuota::new(100_000, 1000),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_once_daily_limit_hit() {
        let service = QuotaService::new();
        assert!(service.can_make_request(Source::NewsApi, 1));
        service.record_usage(Source::NewsApi, 100);
        assert!(!service.can_make_request(Source::NewsApi, 1));
    }

    #[test]
    fn quota_free_sources_have_high_ceiling() {
        let service = QuotaService::new();
        assert!(service.can_make_request(Source::HackerNews, 1));
    }

    #[test]
    fn reset_all_restores_a_source_exhausted_mid_day() {
        let service = QuotaService::new();
        service.record_usage(Source::NewsApi, 100);
        assert!(!service.can_make_request(Source::NewsApi, 1));
        service.reset_all();
        assert!(service.can_make_request(Source::NewsApi, 1));
    }
}
