use super::{CollectionResult, Collector};
use crate::models::{CollectionConfig, ContentKind, RawItem, Source};
use crate::services::rate_limiter::RateLimiter;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const NEWS_ENDPOINT: &str = "https://finnhub.io/api/v1/company-news";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct FinnhubArticle {
    headline: Option<String>,
    summary: Option<String>,
    url: Option<String>,
    datetime: Option<i64>,
    id: Option<i64>,
}

/// Key-gated collector. A missing API key skips the
/// collector entirely at construction rather than failing requests at
/// call time, so `new` returns `None` instead of an error type.
pub struct FinnhubCollector {
    client: Client,
    rate_limiter: Arc<RateLimiter>,
    api_key: String,
}

impl FinnhubCollector {
    pub fn new(api_key: Option<String>, rate_limiter: Arc<RateLimiter>) -> Option<Self> {
        let api_key = api_key?;
        Some(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build().unwrap_or_default(),
            rate_limiter,
            api_key,
        })
    }

    async fn fetch_symbol(&self, symbol: &str, config: &CollectionConfig) -> Vec<RawItem> {
        self.rate_limiter.acquire(Source::Finnhub).await;

        let from = config.range.start().format("%Y-%m-%d").to_string();
        let to = config.range.end().format("%Y-%m-%d").to_string();

        let response = match self
            .client
            .get(NEWS_ENDPOINT)
            .query(&[("symbol", symbol), ("from", from.as_str()), ("to", to.as_str()), ("token", self.api_key.as_str())])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Finnhub request failed for {symbol}: {e}");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            warn!("Finnhub returned status {} for {symbol}", response.status());
            return Vec::new();
        }

        let articles: Vec<FinnhubArticle> = match response.json().await {
            Ok(a) => a,
            Err(e) => {
                warn!("failed to parse Finnhub response for {symbol}: {e}");
                return Vec::new();
            }
        };

        articles
            .into_iter()
            .filter_map(|article| {
                let headline = article.headline?;
                let text = article.summary.filter(|s| !s.is_empty()).unwrap_or_else(|| headline.clone());
                let occurred_at = article
                    .datetime
                    .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
                    .unwrap_or_else(Utc::now);

                let mut item = RawItem::new(Source::Finnhub, ContentKind::Article, text, occurred_at, symbol).ok()?;
                item = item.with_metadata("title", serde_json::json!(headline));
                if let Some(url) = article.url {
                    item = item.with_url(url);
                }
                if let Some(id) = article.id {
                    item = item.with_external_id(id.to_string());
                }
                Some(item)
            })
            .take(config.max_items_per_symbol as usize)
            .collect()
    }
}

#[async_trait]
impl Collector for FinnhubCollector {
    fn source(&self) -> Source {
        Source::Finnhub
    }

    async fn collect(&self, config: &CollectionConfig) -> CollectionResult {
        let start = Instant::now();
        let mut all_items = Vec::new();

        for symbol in &config.symbols {
            all_items.extend(self.fetch_symbol(symbol, config).await);
        }

        info!("Finnhub collected {} items across {} symbols", all_items.len(), config.symbols.len());
        CollectionResult::ok(Source::Finnhub, all_items, start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_without_key() {
        let limiter = Arc::new(RateLimiter::new());
        assert!(FinnhubCollector::new(None, limiter).is_none());
    }
}
