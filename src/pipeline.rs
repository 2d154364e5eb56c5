use crate::collectors::{Collector, CollectionResult};
use crate::db::{article_repo, sentiment_repo, ticker_repo};
use crate::errors::AppError;
use crate::models::{CollectionConfig, CollectorStats, DateRange, JobStatus, PipelineResult, RawItem, Source, Ticker, UpsertOutcome, InsertSentimentOutcome};
use crate::services::dedup::Deduplicator;
use crate::services::preprocessor::{self, PreprocessConfig};
use crate::services::rate_limiter::RateLimiter;
use crate::services::sentiment_engine::{SentimentEngine, TextInput};
use serde::Serialize;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

const DEFAULT_COLLECTOR_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_BATCH_SIZE: usize = 16;
const FAIR_ORDERING_TARGET: f64 = 20.0;

/// One run's parameters. Distinct from a per-collector
/// `CollectionConfig`, which the pipeline derives per source from this.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub symbols: Vec<String>,
    pub range: DateRange,
    pub enabled_sources: HashSet<Source>,
    pub max_items_per_symbol: u32,
    pub include_comments: bool,
    pub parallel_collectors: bool,
    pub preprocess: PreprocessConfig,
    pub collector_timeout: Duration,
    pub batch_size: usize,
}

impl PipelineConfig {
    pub fn new(symbols: Vec<String>, range: DateRange) -> Self {
        Self {
            symbols,
            range,
            enabled_sources: Source::ALL.into_iter().collect(),
            max_items_per_symbol: 25,
            include_comments: true,
            parallel_collectors: true,
            preprocess: PreprocessConfig::default(),
            collector_timeout: DEFAULT_COLLECTOR_TIMEOUT,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_sources(mut self, sources: impl IntoIterator<Item = Source>) -> Self {
        self.enabled_sources = sources.into_iter().collect();
        self
    }
}

/// Snapshot returned by `Pipeline::status`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatusView {
    pub status: JobStatus,
    pub current_result: Option<PipelineResult>,
    pub available_collectors: Vec<Source>,
    pub rate_limiter_sources: Vec<Source>,
}

/// `Pipeline::health_check`'s shape.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub pipeline: &'static str,
    pub collectors: HashMap<String, bool>,
    pub sentiment_engine: &'static str,
}

/// Orchestrates one end-to-end run across the six collectors, the
/// sentiment engine, and the repository layer. Holds an ordered,
/// closed set of `(Source, collector)` pairs rather than a registry
/// reached via reflection.
pub struct Pipeline {
    pool: PgPool,
    collectors: Vec<Arc<dyn Collector>>,
    sentiment_engine: Arc<SentimentEngine>,
    rate_limiter: Arc<RateLimiter>,
    running: AtomicBool,
    cancelled: AtomicBool,
    rotation_offset: AtomicU32,
    current_result: AsyncMutex<Option<PipelineResult>>,
}

impl Pipeline {
    pub fn new(
        pool: PgPool,
        collectors: Vec<Arc<dyn Collector>>,
        sentiment_engine: Arc<SentimentEngine>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            pool,
            collectors,
            sentiment_engine,
            rate_limiter,
            running: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            rotation_offset: AtomicU32::new(0),
            current_result: AsyncMutex::new(None),
        }
    }

    /// Requests cancellation of the in-flight run, if any. A no-op if
    /// no run is active.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub async fn status(&self) -> PipelineStatusView {
        let current_result = self.current_result.lock().await.clone();
        let status = current_result.as_ref().map(|r| r.status).unwrap_or(JobStatus::Pending);
        PipelineStatusView {
            status,
            current_result,
            available_collectors: self.collectors.iter().map(|c| c.source()).collect(),
            rate_limiter_sources: self.rate_limiter.active_sources(),
        }
    }

    pub async fn health_check(&self) -> HealthCheck {
        let collectors = self
            .collectors
            .iter()
            .map(|c| (c.source().as_str().to_string(), true))
            .collect();
        HealthCheck {
            pipeline: "ok",
            collectors,
            sentiment_engine: "ok",
        }
    }

    fn check_cancel(&self, result: &mut PipelineResult) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            result.cancel();
            true
        } else {
            false
        }
    }

    /// Runs the full collect → store → preprocess → classify → persist
    /// lifecycle once. Rejects re-entry with `status=running` rather
    /// than queuing.
    pub async fn run(&self, config: PipelineConfig) -> PipelineResult {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let mut result = PipelineResult::new();
            result.status = JobStatus::Running;
            return result;
        }
        self.cancelled.store(false, Ordering::SeqCst);

        let mut result = PipelineResult::new();
        result.status = JobStatus::Running;
        *self.current_result.lock().await = Some(result.clone());

        let outcome = self.run_inner(config, &mut result).await;
        if let Err(err) = outcome {
            result.fail(err.to_string());
        } else if result.status == JobStatus::Running {
            result.complete();
        }

        info!(
            run_id = %result.id,
            status = ?result.status,
            total_items_collected = result.total_items_collected,
            total_items_stored = result.total_items_stored,
            total_items_analyzed = result.total_items_analyzed,
            total_duplicates = result.total_duplicates,
            total_missing_symbol = result.total_missing_symbol,
            success_rate = result.success_rate(),
            "pipeline run finished"
        );

        *self.current_result.lock().await = Some(result.clone());
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_inner(&self, config: PipelineConfig, result: &mut PipelineResult) -> Result<(), AppError> {
        // 1. Resolve watchlist.
        let symbols = if config.symbols.is_empty() {
            let watchlist = ticker_repo::active_watchlist(&self.pool).await?;
            if watchlist.is_empty() {
                result.fail("No active stocks in watchlist");
                return Ok(());
            }
            watchlist.symbols()
        } else {
            config.symbols.clone()
        };

        let mut tickers: HashMap<String, Ticker> = HashMap::new();
        for symbol in &symbols {
            let ticker = ticker_repo::resolve_or_create(&self.pool, symbol).await?;
            tickers.insert(symbol.clone(), ticker);
        }

        // 2. Fair ordering.
        let ordered_symbols = self.fair_order(&symbols, &tickers).await?;

        // 3. Collect.
        let collection_results = self.collect_all(&ordered_symbols, &config, result).await;
        if self.check_cancel(result) {
            return Ok(());
        }

        // 4. Store raw.
        let mut dedup = Deduplicator::new();
        let mut stored_items: Vec<RawItem> = Vec::new();
        for collection in &collection_results {
            for item in &collection.items {
                let mut item = item.clone();
                result.total_items_collected += 1;
                let Some(ticker) = tickers.get(&item.symbol) else {
                    result.total_missing_symbol += 1;
                    continue;
                };
                let hash = item.compute_and_attach_hash();
                if !dedup.check(hash) {
                    result.total_duplicates += 1;
                    continue;
                }
                match article_repo::upsert_raw_item(&self.pool, ticker.id, &item).await {
                    Ok(UpsertOutcome::Stored) => {
                        result.total_items_stored += 1;
                        stored_items.push(item);
                    }
                    Ok(UpsertOutcome::DuplicateUrl) => {
                        result.total_duplicates += 1;
                    }
                    Ok(UpsertOutcome::Invalid) => {
                        result.total_missing_symbol += 1;
                    }
                    Err(err) => {
                        warn!(error = %err, symbol = %item.symbol, "failed to persist raw item, skipping");
                    }
                }
            }
        }
        if self.check_cancel(result) {
            return Ok(());
        }

        // 5. Preprocess.
        let mut processed: Vec<(RawItem, String)> = Vec::with_capacity(stored_items.len());
        let preprocess_start = Instant::now();
        for item in stored_items {
            let outcome = preprocessor::preprocess(&item.text, &config.preprocess);
            if outcome.success && !outcome.cleaned_text.trim().is_empty() {
                processed.push((item, outcome.cleaned_text));
            }
        }
        info!(
            items = processed.len(),
            duration_ms = preprocess_start.elapsed().as_millis(),
            "preprocessing batch complete"
        );
        if self.check_cancel(result) {
            return Ok(());
        }

        // 6. Deduplicate for analysis: the hash set from step 4 already
        // excludes repeats; nothing further to drop here beyond items
        // preprocessing rejected above.

        // 7. Classify.
        let mut scored: Vec<(RawItem, crate::models::SentimentScore)> = Vec::with_capacity(processed.len());
        for batch in processed.chunks(config.batch_size.max(1)) {
            let inputs: Vec<TextInput> = batch
                .iter()
                .map(|(item, text)| TextInput { source: item.source, text: text.clone() })
                .collect();
            let scores = self.sentiment_engine.analyze(&inputs).await;
            for ((item, _text), score) in batch.iter().zip(scores.into_iter()) {
                scored.push((item.clone(), score));
            }
        }
        if self.check_cancel(result) {
            return Ok(());
        }

        // 8. Persist sentiment.
        for (item, score) in scored {
            let Some(ticker) = tickers.get(&item.symbol) else {
                continue;
            };
            let Some(hash) = item.content_hash else {
                continue;
            };
            match sentiment_repo::insert_sentiment(&self.pool, ticker.id, &item, hash, &score).await {
                Ok(InsertSentimentOutcome::Stored) => result.total_items_analyzed += 1,
                Ok(InsertSentimentOutcome::Duplicate) => {}
                Err(err) => warn!(error = %err, symbol = %item.symbol, "failed to persist sentiment, skipping"),
            }
        }

        // 9. Finalize.
        self.rotation_offset.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fair_order(&self, symbols: &[String], tickers: &HashMap<String, Ticker>) -> Result<Vec<String>, AppError> {
        let mut scored: Vec<(String, f64)> = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let ticker = &tickers[symbol];
            let hours_since = ticker_repo::hours_since_last_sentiment(&self.pool, ticker.id).await?;
            let recent_count = ticker_repo::sentiment_count_last_24h(&self.pool, ticker.id).await?;
            scored.push((symbol.clone(), fair_ordering_priority(hours_since, recent_count)));
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let mut ordered: Vec<String> = scored.into_iter().map(|(s, _)| s).collect();

        if !ordered.is_empty() {
            let offset = self.rotation_offset.load(Ordering::SeqCst) as usize % ordered.len();
            ordered.rotate_left(offset);
        }
        Ok(ordered)
    }

    async fn collect_all(
        &self,
        symbols: &[String],
        config: &PipelineConfig,
        result: &mut PipelineResult,
    ) -> Vec<CollectionResult> {
        let enabled: Vec<&Arc<dyn Collector>> = self
            .collectors
            .iter()
            .filter(|c| config.enabled_sources.contains(&c.source()))
            .collect();
        result.collectors_attempted = enabled.len() as u32;

        let collection_config = match CollectionConfig::new(symbols.to_vec(), config.range.clone(), config.max_items_per_symbol) {
            Ok(c) => c.with_comments(config.include_comments),
            Err(err) => {
                warn!(error = %err, "invalid collection config, running with no sources");
                return Vec::new();
            }
        };

        let timeout = config.collector_timeout;
        let mut results = Vec::with_capacity(enabled.len());

        if config.parallel_collectors {
            let tasks: Vec<_> = enabled
                .iter()
                .map(|collector| {
                    let collector = Arc::clone(collector);
                    let cfg = collection_config.clone();
                    tokio::spawn(async move { run_one_collector(collector, &cfg, timeout).await })
                })
                .collect();
            for task in tasks {
                match task.await {
                    Ok(collection_result) => results.push(collection_result),
                    Err(join_err) => warn!(error = %join_err, "collector task panicked"),
                }
            }
        } else {
            for collector in &enabled {
                results.push(run_one_collector(Arc::clone(collector), &collection_config, timeout).await);
            }
        }

        for collection_result in &results {
            if collection_result.success {
                result.collectors_succeeded += 1;
            }
            result.collector_stats.insert(
                collection_result.source.as_str().to_string(),
                CollectorStats {
                    success: collection_result.success,
                    items_collected: collection_result.items_collected,
                    execution_time_ms: collection_result.execution_time.as_millis() as u64,
                    error: collection_result.error.clone(),
                },
            );
        }

        results
    }
}

async fn run_one_collector(
    collector: Arc<dyn Collector>,
    config: &CollectionConfig,
    timeout: Duration,
) -> CollectionResult {
    let source = collector.source();
    match tokio::time::timeout(timeout, collector.collect(config)).await {
        Ok(collection_result) => collection_result,
        Err(_) => CollectionResult::timed_out(source, timeout),
    }
}

/// Fair-ordering score: favors symbols that haven't been scored in a
/// while, and tops up symbols under the daily target of 20 scored
/// items.
fn fair_ordering_priority(hours_since_last_sentiment: f64, last_24h_sentiment_count: i64) -> f64 {
    0.6 * hours_since_last_sentiment.min(f64::MAX / 2.0)
        + 0.4 * (FAIR_ORDERING_TARGET - last_24h_sentiment_count as f64).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_grows_with_staleness() {
        let fresh = fair_ordering_priority(1.0, 20);
        let stale = fair_ordering_priority(48.0, 20);
        assert!(stale > fresh);
    }

    #[test]
    fn priority_grows_when_under_daily_target() {
        let caught_up = fair_ordering_priority(6.0, 20);
        let behind = fair_ordering_priority(6.0, 0);
        assert!(behind > caught_up);
        assert_eq!(caught_up, 0.6 * 6.0);
        assert_eq!(behind, 0.6 * 6.0 + 0.4 * 20.0);
    }

    #[test]
    fn priority_never_rewards_overshooting_the_daily_target() {
        let over_target = fair_ordering_priority(6.0, 35);
        assert_eq!(over_target, 0.6 * 6.0);
    }
}
