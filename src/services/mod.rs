pub mod classifier;
pub mod dedup;
pub mod keys;
pub mod llm_client;
pub mod preprocessor;
pub mod quota_service;
pub mod rate_limiter;
pub mod sentiment_engine;
