use super::content_hash::ContentHash;
use super::source::Source;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Article,
    Story,
    Comment,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Article => "article",
            ContentKind::Story => "story",
            ContentKind::Comment => "comment",
        }
    }
}

/// A normalized piece of collected text, produced by a `Collector` and
/// mutated only by the `Pipeline`, which attaches `content_hash` once the
/// item survives in-run dedup. Invariant: `text` is non-empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawItem {
    pub source: Source,
    pub kind: ContentKind,
    pub text: String,
    pub occurred_at: DateTime<Utc>,
    pub symbol: String,
    pub url: Option<String>,
    pub external_id: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub content_hash: Option<ContentHash>,
}

impl RawItem {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Source,
        kind: ContentKind,
        text: impl Into<String>,
        occurred_at: DateTime<Utc>,
        symbol: impl Into<String>,
    ) -> Result<Self, String> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err("RawItem.text must be non-empty".to_string());
        }
        Ok(Self {
            source,
            kind,
            text,
            occurred_at,
            symbol: symbol.into().to_uppercase(),
            url: None,
            external_id: None,
            metadata: HashMap::new(),
            content_hash: None,
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Title/description/body split used for content-hash computation.
    /// Articles and community posts alike carry `title` in metadata when
    /// the source provides one; otherwise the first line of `text` stands in.
    pub fn hash_inputs(&self) -> (String, String, String) {
        let title = self
            .metadata
            .get("title")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| self.text.lines().next().unwrap_or_default().to_string());
        let description = self
            .metadata
            .get("description")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_default();
        (title, description, self.text.clone())
    }

    /// Stock tickers this item is attributed to. Collectors that fetch
    /// one article per batched request (`marketaux`) record every
    /// symbol the article actually mentions under `metadata["mentions"]`;
    /// everything else is attributed to its own single `symbol`.
    pub fn stock_mentions(&self) -> serde_json::Value {
        self.metadata
            .get("mentions")
            .cloned()
            .unwrap_or_else(|| serde_json::json!([self.symbol]))
    }

    pub fn compute_and_attach_hash(&mut self) -> ContentHash {
        let (title, description, body) = self.hash_inputs();
        let hash = ContentHash::compute(&title, &description, &body);
        self.content_hash = Some(hash);
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_text() {
        let result = RawItem::new(Source::HackerNews, ContentKind::Story, "   ", Utc::now(), "AAPL");
        assert!(result.is_err());
    }
}
