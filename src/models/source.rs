use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the external collectors this pipeline polls. Closed set —
/// modeled as a sum type rather than an open string tag, so adding a
/// new source is a compile-time exhaustiveness check, not a registry edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    HackerNews,
    Gdelt,
    YahooFinance,
    Finnhub,
    NewsApi,
    MarketAux,
}

impl Source {
    pub const ALL: [Source; 6] = [
        Source::HackerNews,
        Source::Gdelt,
        Source::YahooFinance,
        Source::Finnhub,
        Source::NewsApi,
        Source::MarketAux,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::HackerNews => "hackernews",
            Source::Gdelt => "gdelt",
            Source::YahooFinance => "yahoofinance",
            Source::Finnhub => "finnhub",
            Source::NewsApi => "newsapi",
            Source::MarketAux => "marketaux",
        }
    }

    /// Sources gated behind a daily-quota API key.2.
    pub fn requires_credentials(&self) -> bool {
        matches!(self, Source::Finnhub | Source::NewsApi | Source::MarketAux)
    }

    /// Sources with no daily quota, enabled for FREQUENT scheduler runs.
    pub fn is_quota_free(&self) -> bool {
        matches!(
            self,
            Source::HackerNews | Source::Gdelt | Source::Finnhub | Source::YahooFinance
        )
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
