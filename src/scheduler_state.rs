use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Per-job counters persisted across restarts, matching the fields
/// `ScheduledJob::record_completion` mutates in memory. The map is open
/// — unknown keys from a newer version of this file are ignored on
/// load rather than rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedJobState {
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub today_run_count: u32,
    pub last_run_date: Option<NaiveDate>,
    pub error_count: u64,
    pub last_duration_seconds: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerState {
    #[serde(flatten)]
    pub jobs: HashMap<String, PersistedJobState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub duration_seconds: f64,
    pub items_collected: u32,
    pub items_analyzed: u32,
    pub error: Option<String>,
}

/// date -> job_name -> run entries, pruned to the last 7 days.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunHistory {
    pub days: HashMap<NaiveDate, HashMap<String, Vec<RunHistoryEntry>>>,
}

impl RunHistory {
    pub fn record(&mut self, job_name: &str, entry: RunHistoryEntry) {
        let date = entry.timestamp.date_naive();
        self.days
            .entry(date)
            .or_default()
            .entry(job_name.to_string())
            .or_default()
            .push(entry);
        self.prune(Utc::now());
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now.date_naive() - chrono::Duration::days(7);
        self.days.retain(|date, _| *date >= cutoff);
    }
}

/// File-backed store for `SchedulerState` and `RunHistory`. Writes go
/// through a temp-file-then-rename so a crash mid-write never leaves a
/// half-written file; concurrent writers simply last-write-wins, which
/// is tolerable since every field here is a monotonic counter.
pub struct SchedulerStateStore {
    state_path: PathBuf,
    history_path: PathBuf,
}

impl SchedulerStateStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            state_path: dir.join("scheduler_state.json"),
            history_path: dir.join("scheduler_history.json"),
        }
    }

    pub fn load_state(&self) -> SchedulerState {
        load_json(&self.state_path).unwrap_or_default()
    }

    pub fn load_history(&self) -> RunHistory {
        load_json(&self.history_path).unwrap_or_default()
    }

    pub fn save_state(&self, state: &SchedulerState) -> std::io::Result<()> {
        write_atomic(&self.state_path, state)
    }

    pub fn save_history(&self, history: &RunHistory) -> std::io::Result<()> {
        write_atomic(&self.history_path, history)
    }
}

fn load_json<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Option<T> {
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    let serialized = serde_json::to_string_pretty(value)?;
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(serialized.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_state() {
        let dir = tempdir().unwrap();
        let store = SchedulerStateStore::new(dir.path());
        let mut state = SchedulerState::default();
        state.jobs.insert(
            "pre_market".to_string(),
            PersistedJobState {
                last_run: Some(Utc::now()),
                run_count: 3,
                today_run_count: 1,
                last_run_date: Some(Utc::now().date_naive()),
                error_count: 0,
                last_duration_seconds: Some(4.2),
            },
        );
        store.save_state(&state).unwrap();

        let loaded = store.load_state();
        assert_eq!(loaded.jobs.get("pre_market").unwrap().run_count, 3);
    }

    #[test]
    fn history_prunes_entries_older_than_a_week() {
        let mut history = RunHistory::default();
        let stale_date = Utc::now().date_naive() - chrono::Duration::days(10);
        history.days.entry(stale_date).or_default().insert(
            "pre_market".to_string(),
            vec![RunHistoryEntry {
                timestamp: Utc::now(),
                status: "completed".to_string(),
                duration_seconds: 1.0,
                items_collected: 1,
                items_analyzed: 1,
                error: None,
            }],
        );
        history.record(
            "pre_market",
            RunHistoryEntry {
                timestamp: Utc::now(),
                status: "completed".to_string(),
                duration_seconds: 1.0,
                items_collected: 1,
                items_analyzed: 1,
                error: None,
            },
        );
        assert!(!history.days.contains_key(&stale_date));
    }
}
