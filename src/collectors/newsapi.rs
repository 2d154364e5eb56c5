use super::{CollectionResult, Collector};
use crate::models::{CollectionConfig, ContentKind, RawItem, Source};
use crate::services::rate_limiter::RateLimiter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const EVERYTHING_ENDPOINT: &str = "https://newsapi.org/v2/everything";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsApiArticle {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<DateTime<Utc>>,
}

/// Key-gated; quota-limited (NewsAPI's free tier caps daily calls, which
/// is why the Scheduler's FREQUENT run-type disables this source).
pub struct NewsApiCollector {
    client: Client,
    rate_limiter: Arc<RateLimiter>,
    api_key: String,
}

impl NewsApiCollector {
    pub fn new(api_key: Option<String>, rate_limiter: Arc<RateLimiter>) -> Option<Self> {
        let api_key = api_key?;
        Some(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build().unwrap_or_default(),
            rate_limiter,
            api_key,
        })
    }

    async fn fetch_symbol(&self, symbol: &str, config: &CollectionConfig) -> Vec<RawItem> {
        self.rate_limiter.acquire(Source::NewsApi).await;

        let from = config.range.start().format("%Y-%m-%d").to_string();
        let to = config.range.end().format("%Y-%m-%d").to_string();

        let page_size = config.max_items_per_symbol.to_string();
        let response = match self
            .client
            .get(EVERYTHING_ENDPOINT)
            .query(&[
                ("q", symbol),
                ("from", from.as_str()),
                ("to", to.as_str()),
                ("sortBy", "publishedAt"),
                ("pageSize", page_size.as_str()),
                ("apiKey", self.api_key.as_str()),
            ])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("NewsAPI request failed for {symbol}: {e}");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            warn!("NewsAPI returned status {} for {symbol}", response.status());
            return Vec::new();
        }

        let parsed: NewsApiResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!("failed to parse NewsAPI response for {symbol}: {e}");
                return Vec::new();
            }
        };

        parsed
            .articles
            .into_iter()
            .filter_map(|article| {
                let title = article.title?;
                let text = article.description.filter(|d| !d.is_empty()).unwrap_or_else(|| title.clone());
                let occurred_at = article.published_at.unwrap_or_else(Utc::now);

                let mut item = RawItem::new(Source::NewsApi, ContentKind::Article, text, occurred_at, symbol).ok()?;
                item = item.with_metadata("title", serde_json::json!(title));
                if let Some(url) = article.url {
                    item = item.with_url(url);
                }
                Some(item)
            })
            .take(config.max_items_per_symbol as usize)
            .collect()
    }
}

#[async_trait]
impl Collector for NewsApiCollector {
    fn source(&self) -> Source {
        Source::NewsApi
    }

    async fn collect(&self, config: &CollectionConfig) -> CollectionResult {
        let start = Instant::now();
        let mut all_items = Vec::new();

        for symbol in &config.symbols {
            all_items.extend(self.fetch_symbol(symbol, config).await);
        }

        info!("NewsAPI collected {} items across {} symbols", all_items.len(), config.symbols.len());
        CollectionResult::ok(Source::NewsApi, all_items, start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_without_key() {
        let limiter = Arc::new(RateLimiter::new());
        assert!(NewsApiCollector::new(None, limiter).is_none());
    }
}
