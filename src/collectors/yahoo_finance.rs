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

const NEWS_ENDPOINT: &str = "https://query1.finance.yahoo.com/v1/finance/search";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Yahoo's search endpoint has shipped both a flat item shape and one
/// nesting the article under `content`; this type tolerates either by
/// making every field optional and reconciling in `into_fields`.
#[derive(Debug, Deserialize)]
struct YahooSearchResponse {
    #[serde(default)]
    news: Vec<YahooNewsItem>,
}

#[derive(Debug, Deserialize)]
struct YahooNewsItem {
    uuid: Option<String>,
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "providerPublishTime")]
    provider_publish_time: Option<i64>,
    #[serde(default)]
    content: Option<YahooNestedContent>,
}

#[derive(Debug, Deserialize)]
struct YahooNestedContent {
    title: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    #[serde(rename = "canonicalUrl")]
    canonical_url: Option<YahooUrl>,
}

#[derive(Debug, Deserialize)]
struct YahooUrl {
    url: Option<String>,
}

struct NewsFields {
    title: String,
    url: Option<String>,
    occurred_at: chrono::DateTime<Utc>,
}

impl YahooNewsItem {
    fn into_fields(self) -> Option<NewsFields> {
        if let Some(nested) = self.content {
            let title = nested.title.or(self.title)?;
            let url = nested.canonical_url.and_then(|c| c.url).or(self.link);
            let occurred_at = nested
                .pub_date
                .as_deref()
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|| self.provider_publish_time.and_then(|ts| Utc.timestamp_opt(ts, 0).single()))
                .unwrap_or_else(Utc::now);
            Some(NewsFields { title, url, occurred_at })
        } else {
            let title = self.title?;
            let occurred_at = self
                .provider_publish_time
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
                .unwrap_or_else(Utc::now);
            Some(NewsFields { title, url: self.link, occurred_at })
        }
    }
}

pub struct YahooFinanceCollector {
    client: Client,
    rate_limiter: Arc<RateLimiter>,
}

impl YahooFinanceCollector {
    pub fn new(rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build().unwrap_or_default(),
            rate_limiter,
        }
    }

    async fn fetch_symbol(&self, symbol: &str, config: &CollectionConfig) -> Vec<RawItem> {
        self.rate_limiter.acquire(Source::YahooFinance).await;

        let response = match self
            .client
            .get(NEWS_ENDPOINT)
            .query(&[("q", symbol), ("newsCount", &config.max_items_per_symbol.to_string())])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Yahoo Finance request failed for {symbol}: {e}");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            warn!("Yahoo Finance returned status {} for {symbol}", response.status());
            return Vec::new();
        }

        let parsed: YahooSearchResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!("failed to parse Yahoo Finance response for {symbol}: {e}");
                return Vec::new();
            }
        };

        parsed
            .news
            .into_iter()
            .filter_map(|item| {
                let external_id = item.uuid.clone();
                let fields = item.into_fields()?;
                if !config.range.contains_with_slack(fields.occurred_at, chrono::Duration::hours(6)) {
                    return None;
                }
                let mut raw = RawItem::new(
                    Source::YahooFinance,
                    ContentKind::Article,
                    fields.title.clone(),
                    fields.occurred_at,
                    symbol,
                )
                .ok()?;
                raw = raw.with_metadata("title", serde_json::json!(fields.title));
                if let Some(url) = fields.url {
                    raw = raw.with_url(url);
                }
                if let Some(id) = external_id {
                    raw = raw.with_external_id(id);
                }
                Some(raw)
            })
            .take(config.max_items_per_symbol as usize)
            .collect()
    }
}

#[async_trait]
impl Collector for YahooFinanceCollector {
    fn source(&self) -> Source {
        Source::YahooFinance
    }

    async fn collect(&self, config: &CollectionConfig) -> CollectionResult {
        let start = Instant::now();
        let mut all_items = Vec::new();

        for symbol in &config.symbols {
            all_items.extend(self.fetch_symbol(symbol, config).await);
        }

        info!("Yahoo Finance collected {} items across {} symbols", all_items.len(), config.symbols.len());
        CollectionResult::ok(Source::YahooFinance, all_items, start.elapsed())
    }
}
