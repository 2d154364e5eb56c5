use crate::errors::AppError;
use crate::models::{ContentKind, RawItem, UpsertOutcome};
use sqlx::PgPool;
use uuid::Uuid;

/// Persists a `RawItem`, routing to `articles` (unique on `url`) for
/// article-kind items or `community_posts` (unique on `external_id`)
/// otherwise. A conflicting unique key is treated as a no-op duplicate,
/// not an error — at-least-once delivery with idempotent dedup.
pub async fn upsert_raw_item(pool: &PgPool, ticker_id: Uuid, item: &RawItem) -> Result<UpsertOutcome, AppError> {
    let (title, _description, _body) = item.hash_inputs();
    if title.trim().is_empty() || item.text.trim().is_empty() {
        return Ok(UpsertOutcome::Invalid);
    }

    match item.kind {
        ContentKind::Article => upsert_article(pool, ticker_id, item, &title).await,
        ContentKind::Story | ContentKind::Comment => upsert_community_post(pool, ticker_id, item, &title).await,
    }
}

async fn upsert_article(pool: &PgPool, ticker_id: Uuid, item: &RawItem, title: &str) -> Result<UpsertOutcome, AppError> {
    let Some(url) = &item.url else {
        return Ok(UpsertOutcome::Invalid);
    };

    let inserted: Option<Uuid> = sqlx::query_scalar(
        r#"
        INSERT INTO articles (id, ticker_id, title, content, url, source, published_at, author, mentions_json, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
        ON CONFLICT (url) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(ticker_id)
    .bind(title)
    .bind(&item.text)
    .bind(url)
    .bind(item.source.as_str())
    .bind(item.occurred_at)
    .bind(item.metadata.get("author").and_then(|v| v.as_str()))
    .bind(item.stock_mentions())
    .fetch_optional(pool)
    .await?;

    Ok(match inserted {
        Some(_) => UpsertOutcome::Stored,
        None => UpsertOutcome::DuplicateUrl,
    })
}

async fn upsert_community_post(pool: &PgPool, ticker_id: Uuid, item: &RawItem, title: &str) -> Result<UpsertOutcome, AppError> {
    let Some(external_id) = &item.external_id else {
        return Ok(UpsertOutcome::Invalid);
    };

    let inserted: Option<Uuid> = sqlx::query_scalar(
        r#"
        INSERT INTO community_posts
            (id, ticker_id, external_id, title, content, content_type, author, points, num_comments, url, created_utc, mentions_json)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (external_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(ticker_id)
    .bind(external_id)
    .bind(title)
    .bind(&item.text)
    .bind(item.kind.as_str())
    .bind(item.metadata.get("author").and_then(|v| v.as_str()))
    .bind(item.metadata.get("points").and_then(|v| v.as_i64()).map(|n| n as i32))
    .bind(item.metadata.get("num_comments").and_then(|v| v.as_i64()).map(|n| n as i32))
    .bind(&item.url)
    .bind(item.occurred_at)
    .bind(item.stock_mentions())
    .fetch_optional(pool)
    .await?;

    Ok(match inserted {
        Some(_) => UpsertOutcome::Stored,
        None => UpsertOutcome::DuplicateUrl,
    })
}
