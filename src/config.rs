use std::time::Duration;

/// Process-wide configuration, assembled once at startup from the
/// environment. Each `from_env` falls back to a sane default rather
/// than failing when an optional variable is unset.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: std::net::SocketAddr,
    pub scheduler_enabled: bool,
    pub openai_model: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);
        let bind_addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

        let scheduler_enabled = std::env::var("SCHEDULER_ENABLED")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(true);

        let openai_model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        Ok(Self {
            database_url,
            bind_addr,
            scheduler_enabled,
            openai_model,
        })
    }
}

/// Default operational knobs for `PipelineConfig`, read once at startup
/// and reused by every scheduled run that doesn't override them.
#[derive(Debug, Clone)]
pub struct PipelineDefaults {
    pub max_items_per_symbol: u32,
    pub collector_timeout: Duration,
    pub batch_size: usize,
    pub parallel_collectors: bool,
}

impl PipelineDefaults {
    pub fn from_env() -> Self {
        Self {
            max_items_per_symbol: std::env::var("MAX_ITEMS_PER_SYMBOL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(25),
            collector_timeout: Duration::from_secs(
                std::env::var("COLLECTOR_TIMEOUT_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(300),
            ),
            batch_size: std::env::var("SENTIMENT_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(16),
            parallel_collectors: std::env::var("PARALLEL_COLLECTORS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
        }
    }
}
