use super::{CollectionResult, Collector};
use crate::models::{CollectionConfig, ContentKind, RawItem, Source};
use crate::services::rate_limiter::RateLimiter;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const SEARCH_ENDPOINT: &str = "https://hn.algolia.com/api/v1/search_by_date";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Known symbol -> company-name map used to widen the HN search beyond
/// the bare ticker, since Algolia indexes HN's natural-language titles.
fn company_name(symbol: &str) -> Option<&'static str> {
    match symbol {
        "AAPL" => Some("Apple"),
        "MSFT" => Some("Microsoft"),
        "GOOGL" | "GOOG" => Some("Google"),
        "AMZN" => Some("Amazon"),
        "META" => Some("Meta"),
        "TSLA" => Some("Tesla"),
        "NVDA" => Some("Nvidia"),
        "NFLX" => Some("Netflix"),
        _ => None,
    }
}

fn exclusion_patterns() -> &'static [&'static str] {
    &[
        "nba", "nfl", "mlb", "world cup", "olympics",
        "movie review", "celebrity", "album release",
        "sponsored", "advertisement",
    ]
}

fn financial_terms() -> &'static [&'static str] {
    &[
        "stock", "shares", "earnings", "revenue", "ipo", "nasdaq",
        "nyse", "sec filing", "market cap", "investor", "dividend",
    ]
}

/// Quality/relevance filter shared by the story and comment paths:
/// exclusion patterns are applied first, but a financial term present in
/// the same text overrides the exclusion.
fn passes_relevance_filter(text: &str) -> bool {
    let lower = text.to_lowercase();
    let hit_exclusion = exclusion_patterns().iter().any(|p| lower.contains(p));
    if !hit_exclusion {
        return true;
    }
    financial_terms().iter().any(|t| lower.contains(t))
}

#[derive(Debug, Deserialize)]
struct AlgoliaResponse {
    hits: Vec<AlgoliaHit>,
}

#[derive(Debug, Deserialize)]
struct AlgoliaHit {
    #[serde(rename = "objectID")]
    object_id: String,
    title: Option<String>,
    url: Option<String>,
    points: Option<i32>,
    created_at_i: i64,
    #[serde(default)]
    story_text: Option<String>,
    #[serde(default)]
    comment_text: Option<String>,
}

pub struct HackerNewsCollector {
    client: Client,
    rate_limiter: Arc<RateLimiter>,
    html_tag: Regex,
}

impl HackerNewsCollector {
    pub fn new(rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build().unwrap_or_default(),
            rate_limiter,
            html_tag: Regex::new("<[^>]+>").unwrap(),
        }
    }

    fn strip_html(&self, text: &str) -> String {
        self.html_tag.replace_all(text, "").to_string()
    }

    async fn search(&self, query: &str, start_ts: i64, end_ts: i64) -> Result<Vec<AlgoliaHit>, String> {
        self.rate_limiter.acquire(Source::HackerNews).await;

        let response = self
            .client
            .get(SEARCH_ENDPOINT)
            .query(&[
                ("query", query.to_string()),
                ("tags", "(story,comment)".to_string()),
                ("numericFilters", format!("created_at_i>={start_ts},created_at_i<={end_ts}")),
            ])
            .send()
            .await
            .map_err(|e| format!("HackerNews request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("HackerNews returned status {}", response.status()));
        }

        response
            .json::<AlgoliaResponse>()
            .await
            .map(|r| r.hits)
            .map_err(|e| format!("failed to parse HackerNews response: {e}"))
    }

    async fn collect_for_symbol(&self, symbol: &str, config: &CollectionConfig) -> Vec<RawItem> {
        let min_score = config.min_score.unwrap_or(2);
        let start_ts = config.range.start().timestamp();
        let end_ts = config.range.end().timestamp();

        let mut queries = vec![symbol.to_string()];
        if let Some(name) = company_name(symbol) {
            queries.push(name.to_string());
        }

        let mut items = Vec::new();
        for query in queries {
            let hits = match self.search(&query, start_ts, end_ts).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!("HackerNews search failed for {symbol} ({query}): {e}");
                    continue;
                }
            };

            for hit in hits {
                if items.len() >= config.max_items_per_symbol as usize {
                    break;
                }

                let points = hit.points.unwrap_or(0);
                if points < min_score {
                    continue;
                }

                let raw_text = hit
                    .story_text
                    .or(hit.comment_text)
                    .or_else(|| hit.title.clone())
                    .unwrap_or_default();
                let cleaned = self.strip_html(&raw_text);

                if !passes_relevance_filter(&cleaned) {
                    continue;
                }

                let kind = if config.include_comments && hit.comment_text.is_some() {
                    ContentKind::Comment
                } else {
                    ContentKind::Story
                };

                let occurred_at = Utc.timestamp_opt(hit.created_at_i, 0).single().unwrap_or_else(Utc::now);
                if !config.range.contains_with_slack(occurred_at, chrono::Duration::hours(6)) {
                    continue;
                }

                let Ok(mut item) = RawItem::new(Source::HackerNews, kind, cleaned, occurred_at, symbol) else {
                    continue;
                };
                item = item.with_external_id(hit.object_id.clone());
                if let Some(title) = &hit.title {
                    item = item.with_metadata("title", serde_json::json!(title));
                }
                item = item.with_metadata("points", serde_json::json!(points));
                if let Some(url) = hit.url {
                    item = item.with_url(url);
                }
                items.push(item);
            }
        }

        items
    }
}

#[async_trait]
impl Collector for HackerNewsCollector {
    fn source(&self) -> Source {
        Source::HackerNews
    }

    async fn collect(&self, config: &CollectionConfig) -> CollectionResult {
        let start = Instant::now();
        let mut all_items = Vec::new();

        for symbol in &config.symbols {
            let items = self.collect_for_symbol(symbol, config).await;
            if items.is_empty() {
                warn!("HackerNews found no qualifying items for {symbol}");
            }
            all_items.extend(items);
        }

        info!(
            "HackerNews collected {} items across {} symbols",
            all_items.len(),
            config.symbols.len()
        );

        CollectionResult::ok(Source::HackerNews, all_items, start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusion_overridden_by_financial_term() {
        assert!(!passes_relevance_filter("Olympics coverage expands"));
        assert!(passes_relevance_filter("Olympics sponsor stock surges after earnings"));
    }

    #[test]
    fn plain_financial_text_passes() {
        assert!(passes_relevance_filter("Company beats earnings expectations"));
    }
}
