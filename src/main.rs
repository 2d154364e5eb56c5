mod app;
mod collectors;
mod config;
mod db;
mod errors;
mod logging;
mod models;
mod pipeline;
mod routes;
mod scheduler;
mod scheduler_state;
mod services;
mod state;

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

use crate::collectors::{
    Collector, FinnhubCollector, GdeltCollector, HackerNewsCollector, MarketAuxCollector, NewsApiCollector,
    YahooFinanceCollector,
};
use crate::config::{AppConfig, PipelineDefaults};
use crate::logging::{init_logging, LoggingConfig};
use crate::pipeline::Pipeline;
use crate::scheduler::Scheduler;
use crate::services::keys::{EnvKeyLoader, SecureKeyLoader, FINNHUB_API_KEY, LLM_API_KEY, MARKETAUX_API_KEY, NEWS_API_KEY};
use crate::services::llm_client::{LlmClient, OpenAiClient};
use crate::services::quota_service::QuotaService;
use crate::services::rate_limiter::RateLimiter;
use crate::services::sentiment_engine::{SentimentEngine, SentimentEngineConfig};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    init_logging(LoggingConfig::from_env())?;

    let app_config = AppConfig::from_env()?;
    let pipeline_defaults = PipelineDefaults::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&app_config.database_url)
        .await?;

    let keys = EnvKeyLoader::new().load();
    let rate_limiter = Arc::new(RateLimiter::new());

    let collectors: Vec<Arc<dyn Collector>> = build_collectors(&keys, Arc::clone(&rate_limiter));
    let llm_client = keys.get(LLM_API_KEY).cloned().map(|key| {
        Arc::new(OpenAiClient::new(key, app_config.openai_model.clone())) as Arc<dyn LlmClient>
    });
    let sentiment_engine = Arc::new(SentimentEngine::new(SentimentEngineConfig::default(), llm_client));

    let pipeline = Arc::new(Pipeline::new(pool.clone(), collectors, sentiment_engine, Arc::clone(&rate_limiter)));
    let quota_service = Arc::new(QuotaService::new());
    let scheduler = Arc::new(Scheduler::new(
        pool.clone(),
        Arc::clone(&pipeline),
        quota_service,
        std::env::var("SCHEDULER_STATE_DIR").unwrap_or_else(|_| ".".to_string()),
        pipeline_defaults,
    ));

    if app_config.scheduler_enabled {
        scheduler.start().await.map_err(|e| e.to_string())?;
    }

    let state = AppState { pool, pipeline, scheduler };
    let app = app::create_app(state);

    let listener = tokio::net::TcpListener::bind(&app_config.bind_addr).await?;
    tracing::info!("sentiment pipeline listening on {}", app_config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_collectors(keys: &std::collections::HashMap<String, String>, rate_limiter: Arc<RateLimiter>) -> Vec<Arc<dyn Collector>> {
    let mut collectors: Vec<Arc<dyn Collector>> = vec![
        Arc::new(HackerNewsCollector::new(Arc::clone(&rate_limiter))),
        Arc::new(GdeltCollector::new(Arc::clone(&rate_limiter))),
        Arc::new(YahooFinanceCollector::new(Arc::clone(&rate_limiter))),
    ];

    if let Some(finnhub) = FinnhubCollector::new(keys.get(FINNHUB_API_KEY).cloned(), Arc::clone(&rate_limiter)) {
        collectors.push(Arc::new(finnhub));
    }
    if let Some(newsapi) = NewsApiCollector::new(keys.get(NEWS_API_KEY).cloned(), Arc::clone(&rate_limiter)) {
        collectors.push(Arc::new(newsapi));
    }
    if let Some(marketaux) = MarketAuxCollector::new(keys.get(MARKETAUX_API_KEY).cloned(), Arc::clone(&rate_limiter)) {
        collectors.push(Arc::new(marketaux));
    }

    collectors
}
