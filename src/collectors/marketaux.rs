use super::{CollectionResult, Collector};
use crate::models::{CollectionConfig, ContentKind, RawItem, Source};
use crate::services::rate_limiter::RateLimiter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const NEWS_ENDPOINT: &str = "https://api.marketaux.com/v1/news/all";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_SYMBOLS_PER_REQUEST: usize = 10;

#[derive(Debug, Deserialize)]
struct MarketAuxResponse {
    #[serde(default)]
    data: Vec<MarketAuxArticle>,
}

#[derive(Debug, Deserialize)]
struct MarketAuxArticle {
    uuid: Option<String>,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    entities: Vec<MarketAuxEntity>,
}

#[derive(Debug, Deserialize)]
struct MarketAuxEntity {
    symbol: Option<String>,
}

impl MarketAuxArticle {
    /// Symbols from `config`'s batch that this article actually mentions,
    /// so one article fetched under a batched request can be fairly
    /// attributed to every symbol it covers rather than only the first.
    fn matched_symbols(&self, requested: &[String]) -> Vec<String> {
        let mentioned: Vec<String> = self
            .entities
            .iter()
            .filter_map(|e| e.symbol.clone())
            .map(|s| s.to_uppercase())
            .collect();
        requested.iter().filter(|s| mentioned.contains(s)).cloned().collect()
    }
}

/// Key-gated, batches up to `MAX_SYMBOLS_PER_REQUEST` symbols into one
/// call and distributes each returned article across every symbol it
/// mentions.
pub struct MarketAuxCollector {
    client: Client,
    rate_limiter: Arc<RateLimiter>,
    api_key: String,
}

impl MarketAuxCollector {
    pub fn new(api_key: Option<String>, rate_limiter: Arc<RateLimiter>) -> Option<Self> {
        let api_key = api_key?;
        Some(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build().unwrap_or_default(),
            rate_limiter,
            api_key,
        })
    }

    async fn fetch_batch(&self, batch: &[String], config: &CollectionConfig) -> Vec<RawItem> {
        self.rate_limiter.acquire(Source::MarketAux).await;

        let symbols_param = batch.join(",");
        let from = config.range.start().format("%Y-%m-%dT%H:%M:%S").to_string();

        let response = match self
            .client
            .get(NEWS_ENDPOINT)
            .query(&[
                ("symbols", symbols_param.as_str()),
                ("published_after", from.as_str()),
                ("api_token", self.api_key.as_str()),
                ("limit", "50"),
            ])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("MarketAux request failed for batch {batch:?}: {e}");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            warn!("MarketAux returned status {} for batch {batch:?}", response.status());
            return Vec::new();
        }

        let parsed: MarketAuxResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!("failed to parse MarketAux response for batch {batch:?}: {e}");
                return Vec::new();
            }
        };

        let mut per_symbol_count: HashMap<String, u32> = HashMap::new();
        let mut items = Vec::new();

        for article in parsed.data {
            let Some(title) = article.title.clone() else { continue };
            let matched = article.matched_symbols(batch);
            if matched.is_empty() {
                continue;
            }

            let text = article.description.clone().filter(|d| !d.is_empty()).unwrap_or_else(|| title.clone());
            let occurred_at = article.published_at.unwrap_or_else(Utc::now);
            let mentions = serde_json::json!(matched);

            for symbol in matched {
                let count = per_symbol_count.entry(symbol.clone()).or_insert(0);
                if *count >= config.max_items_per_symbol {
                    continue;
                }
                *count += 1;

                let Ok(mut item) = RawItem::new(Source::MarketAux, ContentKind::Article, text.clone(), occurred_at, &symbol) else {
                    continue;
                };
                item = item.with_metadata("title", serde_json::json!(title));
                item = item.with_metadata("mentions", mentions.clone());
                if let Some(url) = &article.url {
                    item = item.with_url(url.clone());
                }
                if let Some(uuid) = &article.uuid {
                    item = item.with_external_id(uuid.clone());
                }
                items.push(item);
            }
        }

        items
    }
}

#[async_trait]
impl Collector for MarketAuxCollector {
    fn source(&self) -> Source {
        Source::MarketAux
    }

    async fn collect(&self, config: &CollectionConfig) -> CollectionResult {
        let start = Instant::now();
        let mut all_items = Vec::new();

        for batch in config.symbols.chunks(MAX_SYMBOLS_PER_REQUEST) {
            all_items.extend(self.fetch_batch(batch, config).await);
        }

        info!("MarketAux collected {} items across {} symbols", all_items.len(), config.symbols.len());
        CollectionResult::ok(Source::MarketAux, all_items, start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_without_key() {
        let limiter = Arc::new(RateLimiter::new());
        assert!(MarketAuxCollector::new(None, limiter).is_none());
    }

    #[test]
    fn matches_only_requested_symbols() {
        let article = MarketAuxArticle {
            uuid: None,
            title: Some("t".to_string()),
            description: None,
            url: None,
            published_at: None,
            entities: vec![
                MarketAuxEntity { symbol: Some("AAPL".to_string()) },
                MarketAuxEntity { symbol: Some("MSFT".to_string()) },
            ],
        };
        let requested = vec!["AAPL".to_string(), "TSLA".to_string()];
        assert_eq!(article.matched_symbols(&requested), vec!["AAPL".to_string()]);
    }
}
