use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// Per-collector statistics attached to one run's result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectorStats {
    pub success: bool,
    pub items_collected: u32,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

/// In-memory run record. Created at run start, terminal after run end,
/// held only in scheduler/pipeline memory — never persisted directly
/// (only its derived counters are, via `ScheduledJob`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub id: uuid::Uuid,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub collector_stats: HashMap<String, CollectorStats>,

    pub total_items_collected: u32,
    pub total_items_stored: u32,
    pub total_items_analyzed: u32,
    pub total_duplicates: u32,
    pub total_missing_symbol: u32,

    pub collectors_attempted: u32,
    pub collectors_succeeded: u32,

    pub error_message: Option<String>,
}

impl PipelineResult {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            status: JobStatus::Pending,
            started_at: Utc::now(),
            ended_at: None,
            collector_stats: HashMap::new(),
            total_items_collected: 0,
            total_items_stored: 0,
            total_items_analyzed: 0,
            total_duplicates: 0,
            total_missing_symbol: 0,
            collectors_attempted: 0,
            collectors_succeeded: 0,
            error_message: None,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.collectors_attempted == 0 {
            return 0.0;
        }
        self.collectors_succeeded as f64 / self.collectors_attempted as f64
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error_message = Some(message.into());
        self.ended_at = Some(Utc::now());
    }

    pub fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
        self.ended_at = Some(Utc::now());
    }

    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.ended_at = Some(Utc::now());
    }
}

impl Default for PipelineResult {
    fn default() -> Self {
        Self::new()
    }
}
