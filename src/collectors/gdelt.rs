use super::{CollectionResult, Collector};
use crate::models::{CollectionConfig, ContentKind, RawItem, Source};
use crate::services::rate_limiter::RateLimiter;
use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const DOC_ENDPOINT: &str = "https://api.gdeltproject.org/api/v2/doc/doc";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Domains treated as higher-trust financial sources. Purely a metadata
/// flag: it never filters an item out.
const TRUSTED_DOMAINS: &[&str] = &[
    "reuters.com",
    "bloomberg.com",
    "wsj.com",
    "ft.com",
    "cnbc.com",
    "marketwatch.com",
];

fn company_name(symbol: &str) -> &str {
    match symbol {
        "AAPL" => "Apple",
        "MSFT" => "Microsoft",
        "GOOGL" | "GOOG" => "Google",
        "AMZN" => "Amazon",
        "META" => "Meta",
        "TSLA" => "Tesla",
        "NVDA" => "Nvidia",
        "NFLX" => "Netflix",
        other => other,
    }
}

fn is_trusted(url: &str) -> bool {
    TRUSTED_DOMAINS.iter().any(|d| url.contains(d))
}

#[derive(Debug, Deserialize)]
struct GdeltResponse {
    #[serde(default)]
    articles: Vec<GdeltArticle>,
}

#[derive(Debug, Deserialize)]
struct GdeltArticle {
    title: Option<String>,
    url: Option<String>,
    seendate: Option<String>,
    domain: Option<String>,
}

pub struct GdeltCollector {
    client: Client,
    rate_limiter: Arc<RateLimiter>,
}

impl GdeltCollector {
    pub fn new(rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build().unwrap_or_default(),
            rate_limiter,
        }
    }

    async fn query_symbol(&self, symbol: &str, config: &CollectionConfig) -> Vec<RawItem> {
        self.rate_limiter.acquire(Source::Gdelt).await;

        let (start, end) = config.range.to_gdelt_format();
        let name = company_name(symbol);
        let query = format!("\"{name}\" (stock OR shares OR earnings OR market)");

        let response = match self
            .client
            .get(DOC_ENDPOINT)
            .query(&[
                ("query", query.as_str()),
                ("mode", "ArtList"),
                ("format", "json"),
                ("startdatetime", start.as_str()),
                ("enddatetime", end.as_str()),
                ("maxrecords", &config.max_items_per_symbol.to_string()),
            ])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("GDELT request failed for {symbol}: {e}");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            warn!("GDELT returned status {} for {symbol}", response.status());
            return Vec::new();
        }

        let parsed: GdeltResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!("failed to parse GDELT response for {symbol}: {e}");
                return Vec::new();
            }
        };

        parsed
            .articles
            .into_iter()
            .filter_map(|article| {
                let title = article.title?;
                let occurred_at = article
                    .seendate
                    .as_deref()
                    .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%SZ").ok())
                    .map(|naive| Utc.from_utc_datetime(&naive))
                    .unwrap_or_else(Utc::now);

                let mut item = RawItem::new(Source::Gdelt, ContentKind::Article, title.clone(), occurred_at, symbol).ok()?;
                item = item.with_metadata("title", serde_json::json!(title));
                if let Some(url) = &article.url {
                    item = item.with_url(url.clone());
                    item = item.with_metadata("trusted", serde_json::json!(is_trusted(url)));
                }
                if let Some(domain) = article.domain {
                    item = item.with_metadata("domain", serde_json::json!(domain));
                }
                Some(item)
            })
            .collect()
    }
}

#[async_trait]
impl Collector for GdeltCollector {
    fn source(&self) -> Source {
        Source::Gdelt
    }

    async fn collect(&self, config: &CollectionConfig) -> CollectionResult {
        let start = Instant::now();
        let mut all_items = Vec::new();

        for symbol in &config.symbols {
            let items = self.query_symbol(symbol, config).await;
            all_items.extend(items);
        }

        info!("GDELT collected {} items across {} symbols", all_items.len(), config.symbols.len());
        CollectionResult::ok(Source::Gdelt, all_items, start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_trusted_domains() {
        assert!(is_trusted("https://www.reuters.com/markets/story"));
        assert!(!is_trusted("https://randomblog.example/story"));
    }
}
