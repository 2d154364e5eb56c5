use crate::errors::AppError;
use crate::models::{Ticker, WatchlistView};
use sqlx::PgPool;

/// Finds a ticker by symbol, creating an active one with default
/// priority if it doesn't exist yet. Symbols are matched case-folded
/// to uppercase, matching `Ticker::new`'s normalization.
pub async fn resolve_or_create(pool: &PgPool, symbol: &str) -> Result<Ticker, AppError> {
    let symbol = symbol.to_uppercase();

    if let Some(ticker) = sqlx::query_as::<_, Ticker>("SELECT * FROM tickers WHERE symbol = $1")
        .bind(&symbol)
        .fetch_optional(pool)
        .await?
    {
        return Ok(ticker);
    }

    sqlx::query_as::<_, Ticker>(
        r#"
        INSERT INTO tickers (id, symbol, name, active, priority, created_at, updated_at)
        VALUES ($1, $2, $3, true, 0, now(), now())
        ON CONFLICT (symbol) DO UPDATE SET symbol = EXCLUDED.symbol
        RETURNING *
        "#,
    )
    .bind(uuid::Uuid::new_v4())
    .bind(&symbol)
    .bind(&symbol)
    .fetch_one(pool)
    .await
    .map_err(AppError::from)
}

pub async fn active_watchlist(pool: &PgPool) -> Result<WatchlistView, AppError> {
    let tickers = sqlx::query_as::<_, Ticker>("SELECT * FROM tickers WHERE active = true ORDER BY priority DESC, symbol ASC")
        .fetch_all(pool)
        .await?;
    Ok(WatchlistView::from_active(tickers))
}

/// Hours since this ticker's most recent sentiment row, used by the
/// Pipeline's fair-ordering priority formula.
pub async fn hours_since_last_sentiment(pool: &PgPool, ticker_id: uuid::Uuid) -> Result<f64, AppError> {
    let last: Option<chrono::DateTime<chrono::Utc>> =
        sqlx::query_scalar("SELECT MAX(created_at) FROM sentiments WHERE ticker_id = $1")
            .bind(ticker_id)
            .fetch_one(pool)
            .await?;

    Ok(match last {
        Some(ts) => (chrono::Utc::now() - ts).num_minutes() as f64 / 60.0,
        None => f64::MAX,
    })
}

pub async fn sentiment_count_last_24h(pool: &PgPool, ticker_id: uuid::Uuid) -> Result<i64, AppError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sentiments WHERE ticker_id = $1 AND created_at > now() - interval '24 hours'",
    )
    .bind(ticker_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}
