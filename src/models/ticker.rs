use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A tracked equity. Created by admin action; soft-deactivated, never
/// hard-deleted while referenced by articles/posts/sentiments.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticker {
    pub id: uuid::Uuid,
    pub symbol: String,
    pub name: String,
    pub active: bool,
    pub priority: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Ticker {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>, priority: i32) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4(),
            symbol: symbol.into().to_uppercase(),
            name: name.into(),
            active: true,
            priority,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The set of currently active tickers. This is a view, not an owned
/// entity: it has no independent lifetime beyond `Ticker::active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistView {
    pub tickers: Vec<Ticker>,
}

impl WatchlistView {
    pub fn from_active(tickers: Vec<Ticker>) -> Self {
        Self {
            tickers: tickers.into_iter().filter(|t| t.active).collect(),
        }
    }

    pub fn symbols(&self) -> Vec<String> {
        self.tickers.iter().map(|t| t.symbol.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}
