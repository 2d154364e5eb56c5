use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerEventKind {
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerEvent {
    pub job_id: String,
    pub kind: SchedulerEventKind,
    pub at: DateTime<Utc>,
    pub detail: Option<String>,
}

/// Bounded ring (<= 50 events) so the presentation layer can poll
/// recent scheduler activity without an unbounded memory footprint.
pub const EVENT_RING_CAPACITY: usize = 50;

#[derive(Debug, Default)]
pub struct EventRing {
    events: VecDeque<SchedulerEvent>,
}

impl EventRing {
    pub fn push(&mut self, event: SchedulerEvent) {
        if self.events.len() >= EVENT_RING_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn since(&self, since: Option<DateTime<Utc>>) -> Vec<SchedulerEvent> {
        match since {
            Some(t) => self.events.iter().filter(|e| e.at > t).cloned().collect(),
            None => self.events.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_at_capacity() {
        let mut ring = EventRing::default();
        for i in 0..(EVENT_RING_CAPACITY + 10) {
            ring.push(SchedulerEvent {
                job_id: format!("job-{i}"),
                kind: SchedulerEventKind::Started,
                at: Utc::now(),
                detail: None,
            });
        }
        assert_eq!(ring.since(None).len(), EVENT_RING_CAPACITY);
    }
}
