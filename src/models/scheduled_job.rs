use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Selects which sources participate in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    /// High-cadence during market hours; quota-free sources only.
    Frequent,
    /// Pre-market / after-hours; all configured sources.
    Strategic,
    /// Weekly, longer lookback; all sources.
    Deep,
}

impl RunType {
    pub fn lookback_days(&self) -> i64 {
        match self {
            RunType::Frequent | RunType::Strategic => 1,
            RunType::Deep => 7,
        }
    }
}

/// Parameter bundle a `ScheduledJob` carries for its `Pipeline.run` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobParams {
    pub symbols: Vec<String>,
    pub lookback_days: i64,
    pub run_type: RunType,
}

/// A durable cron entry. Persisted to disk on every completion so
/// catch-up survives restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: String,
    pub name: String,
    pub cron_expr: String,
    pub params: JobParams,
    pub enabled: bool,

    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub today_run_count: u32,
    pub last_run_date: Option<NaiveDate>,
    pub error_count: u64,
    pub last_duration_seconds: Option<f64>,
}

impl ScheduledJob {
    pub fn new(id: impl Into<String>, name: impl Into<String>, cron_expr: impl Into<String>, params: JobParams) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            cron_expr: cron_expr.into(),
            params,
            enabled: true,
            last_run: None,
            run_count: 0,
            today_run_count: 0,
            last_run_date: None,
            error_count: 0,
            last_duration_seconds: None,
        }
    }

    /// Sub-hourly jobs (period < 1h) get a 25-minute minimum interval;
    /// everything else gets 30 minutes.
    pub fn minimum_interval_minutes(&self) -> i64 {
        if self.cron_expr.starts_with("0,") || self.cron_expr.contains("*/1") {
            25
        } else {
            30
        }
    }

    pub fn record_completion(&mut self, now: DateTime<Utc>, duration_seconds: f64, is_error: bool) {
        let today = now.date_naive();
        if self.last_run_date != Some(today) {
            self.today_run_count = 0;
        }
        self.last_run = Some(now);
        self.run_count += 1;
        self.today_run_count += 1;
        self.last_run_date = Some(today);
        self.last_duration_seconds = Some(duration_seconds);
        if is_error {
            self.error_count += 1;
        }
    }
}
