mod finnhub;
mod gdelt;
mod hackernews;
mod marketaux;
mod newsapi;
mod yahoo_finance;

pub use finnhub::FinnhubCollector;
pub use gdelt::GdeltCollector;
pub use hackernews::HackerNewsCollector;
pub use marketaux::MarketAuxCollector;
pub use newsapi::NewsApiCollector;
pub use yahoo_finance::YahooFinanceCollector;

use crate::models::{CollectionConfig, RawItem, Source};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of one `Collector::collect` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionResult {
    pub source: Source,
    pub success: bool,
    pub items: Vec<RawItem>,
    pub error: Option<String>,
    pub items_collected: u32,
    #[serde(with = "duration_millis")]
    pub execution_time: Duration,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

impl CollectionResult {
    pub fn ok(source: Source, items: Vec<RawItem>, execution_time: Duration) -> Self {
        let items_collected = items.len() as u32;
        Self {
            source,
            success: true,
            items,
            error: None,
            items_collected,
            execution_time,
        }
    }

    pub fn failed(source: Source, error: impl Into<String>, execution_time: Duration) -> Self {
        Self {
            source,
            success: false,
            items: Vec::new(),
            error: Some(error.into()),
            items_collected: 0,
            execution_time,
        }
    }

    pub fn timed_out(source: Source, timeout: Duration) -> Self {
        Self::failed(source, format!("collector timed out after {timeout:?}"), timeout)
    }
}

/// Polymorphic interface every source adheres to. A closed, explicit
/// set of implementations is held by the `Pipeline`, not a registry
/// reached via reflection — callers hold `Arc<dyn Collector>` only at
/// the point of iteration.
#[async_trait]
pub trait Collector: Send + Sync {
    fn source(&self) -> Source;

    async fn collect(&self, config: &CollectionConfig) -> CollectionResult;
}
