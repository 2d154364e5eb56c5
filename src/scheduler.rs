use crate::config::PipelineDefaults;
use crate::errors::AppError;
use crate::models::{
    DateRange, EventRing, JobParams, RunType, ScheduledJob, SchedulerEvent, SchedulerEventKind, Source,
};
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::scheduler_state::{PersistedJobState, RunHistory, RunHistoryEntry, SchedulerState, SchedulerStateStore};
use crate::services::quota_service::QuotaService;
use chrono::{DateTime, NaiveDate, Utc};
use cron::Schedule as CronSchedule;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

const CATCH_UP_WINDOW: chrono::Duration = chrono::Duration::minutes(45);
const QUOTA_RESET_JOB: &str = "quota_reset";

/// One registered job's mutable state plus a `max_instances=1` guard —
/// a new fire is dropped while a previous invocation of the same job
/// is still running.
struct JobEntry {
    definition: Mutex<ScheduledJob>,
    running: AtomicBool,
}

/// Owns the job registry and cron evaluator. `start()` hands firing
/// over to `tokio_cron_scheduler`; this type resolves run-type/source
/// selection, the quota gate, and persistence around each fire.
pub struct Scheduler {
    pool: sqlx::PgPool,
    pipeline: Arc<Pipeline>,
    quota_service: Arc<QuotaService>,
    jobs: DashMap<String, Arc<JobEntry>>,
    events: Mutex<EventRing>,
    history: Mutex<RunHistory>,
    state_store: SchedulerStateStore,
    defaults: PipelineDefaults,
    inner: AsyncMutex<Option<JobScheduler>>,
}

impl Scheduler {
    pub fn new(
        pool: sqlx::PgPool,
        pipeline: Arc<Pipeline>,
        quota_service: Arc<QuotaService>,
        state_dir: impl AsRef<std::path::Path>,
        defaults: PipelineDefaults,
    ) -> Self {
        let state_store = SchedulerStateStore::new(state_dir);
        let persisted = state_store.load_state();
        let history = state_store.load_history();

        let jobs = DashMap::new();
        for mut job in default_jobs() {
            apply_persisted(&mut job, &persisted);
            jobs.insert(
                job.id.clone(),
                Arc::new(JobEntry {
                    definition: Mutex::new(job),
                    running: AtomicBool::new(false),
                }),
            );
        }

        Self {
            pool,
            pipeline,
            quota_service,
            jobs,
            events: Mutex::new(EventRing::default()),
            history: Mutex::new(history),
            state_store,
            defaults,
            inner: AsyncMutex::new(None),
        }
    }

    /// Registers every job with the cron driver, runs the startup
    /// catch-up pass, then starts evaluating triggers.
    pub async fn start(self: &Arc<Self>) -> Result<(), AppError> {
        let mut scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::External(format!("failed to create scheduler: {e}")))?;

        for entry in self.jobs.iter() {
            let job_id = entry.key().clone();
            let six_field = to_six_field(&entry.value().definition.lock().cron_expr);
            let this = Arc::clone(self);

            let job = Job::new_async(six_field.as_str(), move |_uuid, _l| {
                let this = Arc::clone(&this);
                let job_id = job_id.clone();
                Box::pin(async move {
                    this.fire(&job_id).await;
                })
            })
            .map_err(|e| AppError::External(format!("failed to build cron job: {e}")))?;

            scheduler
                .add(job)
                .await
                .map_err(|e| AppError::External(format!("failed to register cron job: {e}")))?;
        }

        scheduler
            .start()
            .await
            .map_err(|e| AppError::External(format!("failed to start scheduler: {e}")))?;
        *self.inner.lock().await = Some(scheduler);

        self.run_startup_catch_up().await;
        info!("scheduler started with {} jobs", self.jobs.len());
        Ok(())
    }

    /// Halts future triggers; an in-flight fire is left to finish.
    pub async fn stop(&self) -> Result<(), AppError> {
        if let Some(mut scheduler) = self.inner.lock().await.take() {
            scheduler
                .shutdown()
                .await
                .map_err(|e| AppError::External(format!("failed to stop scheduler: {e}")))?;
        }
        Ok(())
    }

    async fn run_startup_catch_up(self: &Arc<Self>) {
        let now = Utc::now();
        let job_ids: Vec<String> = self.jobs.iter().map(|e| e.key().clone()).collect();
        for job_id in job_ids {
            let Some(entry) = self.jobs.get(&job_id) else { continue };
            let (cron_expr, enabled, last_run) = {
                let def = entry.definition.lock();
                (def.cron_expr.clone(), def.enabled, def.last_run)
            };
            if !enabled {
                continue;
            }
            let Some(schedule) = parse_schedule(&cron_expr) else { continue };
            let Some(prev) = previous_fire(&schedule, now) else { continue };

            if now - prev > CATCH_UP_WINDOW {
                continue;
            }
            let min_interval = entry.definition.lock().minimum_interval_minutes();
            if let Some(last_run) = last_run {
                if now - last_run < chrono::Duration::minutes(min_interval) {
                    continue;
                }
            }

            info!(job = %job_id, prev_scheduled = %prev, "running missed catch-up fire");
            let this = Arc::clone(self);
            let job_id = job_id.clone();
            tokio::spawn(async move { this.fire(&job_id).await });
        }
    }

    async fn fire(&self, job_id: &str) {
        let Some(entry) = self.jobs.get(job_id).map(|e| Arc::clone(&e)) else {
            return;
        };

        if entry
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(job = %job_id, "previous invocation still running, dropping this fire");
            return;
        }

        let (enabled, last_run, min_interval, params, name) = {
            let def = entry.definition.lock();
            (def.enabled, def.last_run, def.minimum_interval_minutes(), def.params.clone(), def.name.clone())
        };

        if !enabled {
            entry.running.store(false, Ordering::SeqCst);
            return;
        }
        if let Some(last_run) = last_run {
            if Utc::now() - last_run < chrono::Duration::minutes(min_interval) {
                entry.running.store(false, Ordering::SeqCst);
                return;
            }
        }

        self.push_event(job_id, SchedulerEventKind::Started, None);
        let start = Utc::now();

        if job_id == QUOTA_RESET_JOB {
            self.quota_service.reset_all();
            info!("quota counters reset for all sources");
            self.finish_fire(&entry, job_id, &name, start, 0, 0, false).await;
            return;
        }

        let outcome = self.run_pipeline_job(&params).await;
        let (is_error, items_collected, items_analyzed) = match &outcome {
            Ok(result) => (
                result.status == crate::models::JobStatus::Failed,
                result.total_items_collected,
                result.total_items_analyzed,
            ),
            Err(_) => (true, 0, 0),
        };
        if let Err(err) = &outcome {
            error!(job = %job_id, error = %err, "scheduled pipeline run failed");
        }

        self.finish_fire(&entry, job_id, &name, start, items_collected, items_analyzed, is_error).await;
    }

    async fn run_pipeline_job(&self, params: &JobParams) -> Result<crate::models::PipelineResult, AppError> {
        let symbols = params.symbols.clone();
        let num_symbols = if symbols.is_empty() {
            crate::db::ticker_repo::active_watchlist(&self.pool).await?.tickers.len() as u32
        } else {
            symbols.len() as u32
        };

        let mut enabled_sources = sources_for_run_type(params.run_type);
        self.apply_quota_gate(&mut enabled_sources, num_symbols);

        let range = DateRange::last_days(params.lookback_days);
        let config = PipelineConfig {
            symbols,
            range,
            enabled_sources: enabled_sources.clone(),
            max_items_per_symbol: self.defaults.max_items_per_symbol,
            include_comments: true,
            parallel_collectors: self.defaults.parallel_collectors,
            preprocess: Default::default(),
            collector_timeout: self.defaults.collector_timeout,
            batch_size: self.defaults.batch_size,
        };

        let result = self.pipeline.run(config).await;

        for source in enabled_sources {
            if !source.is_quota_free() {
                self.quota_service.record_usage(source, num_symbols);
            }
        }

        Ok(result)
    }

    fn apply_quota_gate(&self, sources: &mut HashSet<Source>, num_symbols: u32) {
        sources.retain(|source| {
            if source.is_quota_free() {
                return true;
            }
            let allowed = self.quota_service.can_make_request(*source, num_symbols);
            if !allowed {
                info!("Disabled {source} for this run due to quota");
            }
            allowed
        });
    }

    async fn finish_fire(
        &self,
        entry: &Arc<JobEntry>,
        job_id: &str,
        job_name: &str,
        start: DateTime<Utc>,
        items_collected: u32,
        items_analyzed: u32,
        is_error: bool,
    ) {
        let now = Utc::now();
        let duration_seconds = (now - start).num_milliseconds() as f64 / 1000.0;

        {
            let mut def = entry.definition.lock();
            def.record_completion(now, duration_seconds, is_error);
        }

        self.persist_job_state();
        self.history.lock().record(
            job_name,
            RunHistoryEntry {
                timestamp: now,
                status: if is_error { "failed".to_string() } else { "completed".to_string() },
                duration_seconds,
                items_collected,
                items_analyzed,
                error: None,
            },
        );
        if let Err(err) = self.state_store.save_history(&self.history.lock()) {
            warn!(error = %err, "failed to persist scheduler history");
        }

        self.push_event(
            job_id,
            if is_error { SchedulerEventKind::Failed } else { SchedulerEventKind::Completed },
            None,
        );
        entry.running.store(false, Ordering::SeqCst);
    }

    fn persist_job_state(&self) {
        let mut state = SchedulerState::default();
        for entry in self.jobs.iter() {
            let def = entry.value().definition.lock();
            state.jobs.insert(
                def.id.clone(),
                PersistedJobState {
                    last_run: def.last_run,
                    run_count: def.run_count,
                    today_run_count: def.today_run_count,
                    last_run_date: def.last_run_date,
                    error_count: def.error_count,
                    last_duration_seconds: def.last_duration_seconds,
                },
            );
        }
        if let Err(err) = self.state_store.save_state(&state) {
            warn!(error = %err, "failed to persist scheduler state");
        }
    }

    fn push_event(&self, job_id: &str, kind: SchedulerEventKind, detail: Option<String>) {
        self.events.lock().push(SchedulerEvent {
            job_id: job_id.to_string(),
            kind,
            at: Utc::now(),
            detail,
        });
    }

    pub fn list_jobs(&self) -> Vec<ScheduledJobView> {
        self.jobs
            .iter()
            .map(|entry| {
                let def = entry.value().definition.lock().clone();
                let next_run = parse_schedule(&def.cron_expr).and_then(|s| s.upcoming(Utc).next());
                ScheduledJobView { job: def, next_run }
            })
            .collect()
    }

    pub fn enable_job(&self, id: &str) -> Result<(), AppError> {
        self.with_job(id, |def| def.enabled = true)
    }

    pub fn disable_job(&self, id: &str) -> Result<(), AppError> {
        self.with_job(id, |def| def.enabled = false)
    }

    pub fn cancel_job(&self, id: &str) -> Result<(), AppError> {
        let entry = self.jobs.get(id).ok_or(AppError::NotFound)?;
        if entry.running.load(Ordering::SeqCst) {
            self.pipeline.cancel();
        }
        Ok(())
    }

    /// Reloads each job's persisted counters from disk, picking up
    /// out-of-band edits to the state file.
    pub fn refresh_scheduled_jobs(&self) {
        let persisted = self.state_store.load_state();
        for entry in self.jobs.iter() {
            let mut def = entry.value().definition.lock();
            apply_persisted(&mut def, &persisted);
        }
    }

    pub fn get_run_history(&self, days: i64) -> HashMap<NaiveDate, HashMap<String, Vec<RunHistoryEntry>>> {
        let cutoff = Utc::now().date_naive() - chrono::Duration::days(days);
        self.history
            .lock()
            .days
            .iter()
            .filter(|(date, _)| **date >= cutoff)
            .map(|(date, jobs)| (*date, jobs.clone()))
            .collect()
    }

    pub fn get_recent_job_events(&self, since: Option<DateTime<Utc>>) -> Vec<SchedulerEvent> {
        self.events.lock().since(since)
    }

    fn with_job(&self, id: &str, f: impl FnOnce(&mut ScheduledJob)) -> Result<(), AppError> {
        let entry = self.jobs.get(id).ok_or(AppError::NotFound)?;
        f(&mut entry.definition.lock());
        Ok(())
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ScheduledJobView {
    #[serde(flatten)]
    pub job: ScheduledJob,
    pub next_run: Option<DateTime<Utc>>,
}

fn sources_for_run_type(run_type: RunType) -> HashSet<Source> {
    match run_type {
        RunType::Frequent => [Source::HackerNews, Source::Gdelt, Source::Finnhub, Source::YahooFinance]
            .into_iter()
            .collect(),
        RunType::Strategic | RunType::Deep => Source::ALL.into_iter().collect(),
    }
}

fn default_jobs() -> Vec<ScheduledJob> {
    vec![
        ScheduledJob::new(
            "pre_market",
            "Pre-market strategic sweep",
            "0 9 * * 0-4",
            JobParams { symbols: Vec::new(), lookback_days: RunType::Strategic.lookback_days(), run_type: RunType::Strategic },
        ),
        ScheduledJob::new(
            "active_trading",
            "Active-trading frequent sweep",
            "0,45 14-20 * * 0-4",
            JobParams { symbols: Vec::new(), lookback_days: RunType::Frequent.lookback_days(), run_type: RunType::Frequent },
        ),
        ScheduledJob::new(
            "after_hours",
            "After-hours strategic sweep",
            "0 23 * * 0-4",
            JobParams { symbols: Vec::new(), lookback_days: RunType::Strategic.lookback_days(), run_type: RunType::Strategic },
        ),
        ScheduledJob::new(
            "overnight_summary",
            "Overnight summary sweep",
            "0 1 * * 1-5",
            JobParams { symbols: Vec::new(), lookback_days: RunType::Strategic.lookback_days(), run_type: RunType::Strategic },
        ),
        ScheduledJob::new(
            "weekend_deep",
            "Weekend deep sweep",
            "0 10 * * 6",
            JobParams { symbols: Vec::new(), lookback_days: RunType::Deep.lookback_days(), run_type: RunType::Deep },
        ),
        ScheduledJob::new(
            QUOTA_RESET_JOB,
            "Nightly quota reset",
            "0 0 * * *",
            JobParams { symbols: Vec::new(), lookback_days: 0, run_type: RunType::Strategic },
        ),
    ]
}

fn apply_persisted(job: &mut ScheduledJob, state: &SchedulerState) {
    if let Some(saved) = state.jobs.get(&job.id) {
        job.last_run = saved.last_run;
        job.run_count = saved.run_count;
        job.today_run_count = saved.today_run_count;
        job.last_run_date = saved.last_run_date;
        job.error_count = saved.error_count;
        job.last_duration_seconds = saved.last_duration_seconds;
    }
}

/// `tokio_cron_scheduler`/`cron` both expect a leading seconds field;
/// job expressions here are the conventional 5-field form.
fn to_six_field(expr: &str) -> String {
    format!("0 {expr}")
}

fn parse_schedule(expr: &str) -> Option<CronSchedule> {
    CronSchedule::from_str(&to_six_field(expr)).ok()
}

/// Most recent fire time at or before `now`, searched within a 48h
/// lookback window — generous relative to every default job's period.
fn previous_fire(schedule: &CronSchedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule
        .after(&(now - chrono::Duration::hours(48)))
        .take_while(|t| *t <= now)
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn frequent_runs_only_hit_quota_free_sources() {
        let sources = sources_for_run_type(RunType::Frequent);
        assert!(sources.contains(&Source::HackerNews));
        assert!(sources.contains(&Source::Gdelt));
        assert!(sources.contains(&Source::Finnhub));
        assert!(sources.contains(&Source::YahooFinance));
        assert!(!sources.contains(&Source::NewsApi));
        assert!(!sources.contains(&Source::MarketAux));
    }

    #[test]
    fn strategic_and_deep_runs_hit_every_source() {
        assert_eq!(sources_for_run_type(RunType::Strategic), Source::ALL.into_iter().collect());
        assert_eq!(sources_for_run_type(RunType::Deep), Source::ALL.into_iter().collect());
    }

    #[test]
    fn default_jobs_cover_the_six_named_schedules() {
        let ids: HashSet<&str> = default_jobs().iter().map(|j| j.id.as_str()).collect();
        for expected in ["pre_market", "active_trading", "after_hours", "overnight_summary", "weekend_deep", QUOTA_RESET_JOB] {
            assert!(ids.contains(expected), "missing job {expected}");
        }
    }

    #[test]
    fn six_field_prefix_lets_the_cron_crate_parse_five_field_expressions() {
        assert!(parse_schedule("0 9 * * 0-4").is_some());
        assert!(parse_schedule("0,45 14-20 * * 0-4").is_some());
    }

    #[test]
    fn previous_fire_finds_the_most_recent_match_within_the_window() {
        let schedule = parse_schedule("0 9 * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 7, 29, 9, 20, 0).unwrap();
        let prev = previous_fire(&schedule, now).expect("a fire within the last 48h");
        assert_eq!(prev, Utc.with_ymd_and_hms(2026, 7, 29, 9, 0, 0).unwrap());
    }

    #[test]
    fn previous_fire_is_none_outside_the_lookback_window() {
        let schedule = parse_schedule("0 9 1 1 *").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 7, 29, 9, 20, 0).unwrap();
        assert!(previous_fire(&schedule, now).is_none());
    }
}
