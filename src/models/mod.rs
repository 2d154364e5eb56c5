mod collection_config;
mod content_hash;
mod date_range;
mod events;
mod job;
mod persisted;
mod processed_text;
mod quota;
mod raw_item;
mod scheduled_job;
mod sentiment;
mod source;
mod ticker;

pub use collection_config::CollectionConfig;
pub use content_hash::ContentHash;
pub use date_range::DateRange;
pub use events::{EventRing, SchedulerEvent, SchedulerEventKind, EVENT_RING_CAPACITY};
pub use job::{CollectorStats, JobStatus, PipelineResult};
pub use persisted::{
    content_hash_key, source_tag, InsertSentimentOutcome, PersistedArticle, PersistedCommunityPost,
    PersistedSentiment, UpsertOutcome,
};
pub use processed_text::ProcessedText;
pub use quota::SourceQuota;
pub use raw_item::{ContentKind, RawItem};
pub use scheduled_job::{JobParams, RunType, ScheduledJob};
pub use sentiment::{SentimentLabel, SentimentScore, VerificationMetadata};
pub use source::Source;
pub use ticker::{Ticker, WatchlistView};
