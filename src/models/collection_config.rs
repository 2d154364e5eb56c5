use super::date_range::DateRange;
use serde::{Deserialize, Serialize};

/// One invocation's contract to a collector. Immutable per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub symbols: Vec<String>,
    pub range: DateRange,
    pub max_items_per_symbol: u32,
    pub include_comments: bool,
    pub min_score: Option<i32>,
}

impl CollectionConfig {
    pub fn new(symbols: Vec<String>, range: DateRange, max_items_per_symbol: u32) -> Result<Self, String> {
        if symbols.is_empty() {
            return Err("CollectionConfig requires at least one symbol".to_string());
        }
        if max_items_per_symbol == 0 {
            return Err("max_items_per_symbol must be > 0".to_string());
        }
        Ok(Self {
            symbols,
            range,
            max_items_per_symbol,
            include_comments: false,
            min_score: None,
        })
    }

    pub fn with_comments(mut self, include: bool) -> Self {
        self.include_comments = include;
        self
    }

    pub fn with_min_score(mut self, min_score: i32) -> Self {
        self.min_score = Some(min_score);
        self
    }
}
