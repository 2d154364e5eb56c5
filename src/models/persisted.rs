use super::content_hash::ContentHash;
use super::source::Source;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Durable form of an article-family `RawItem`. Unique by `url`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PersistedArticle {
    pub id: uuid::Uuid,
    pub ticker_id: uuid::Uuid,
    pub title: String,
    pub content: String,
    pub url: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub author: Option<String>,
    pub sentiment_score: Option<f64>,
    pub confidence: Option<f64>,
    pub mentions_json: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Durable form of a community-family `RawItem`. Unique by `external_id`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PersistedCommunityPost {
    pub id: uuid::Uuid,
    pub ticker_id: uuid::Uuid,
    pub external_id: String,
    pub title: String,
    pub content: String,
    pub content_type: String,
    pub author: Option<String>,
    pub points: Option<i32>,
    pub num_comments: Option<i32>,
    pub url: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub sentiment_score: Option<f64>,
    pub confidence: Option<f64>,
    pub mentions_json: serde_json::Value,
}

/// Durable sentiment row. `(ticker_id, source, content_hash)` is
/// uniquely indexed to prevent cross-run duplicates.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PersistedSentiment {
    pub id: uuid::Uuid,
    pub ticker_id: uuid::Uuid,
    pub source: String,
    pub score: f64,
    pub confidence: f64,
    pub label: String,
    pub model: String,
    pub raw_text: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub metadata_json: serde_json::Value,
}

/// Outcome of attempting to store a `RawItem`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Stored,
    DuplicateUrl,
    Invalid,
}

/// Outcome of attempting to store a `SentimentScore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertSentimentOutcome {
    Stored,
    Duplicate,
}

pub fn source_tag(source: Source) -> &'static str {
    source.as_str()
}

pub fn content_hash_key(hash: &ContentHash) -> String {
    hash.as_hex()
}
