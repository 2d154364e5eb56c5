use crate::errors::AppError;
use crate::models::{ContentHash, ContentKind, InsertSentimentOutcome, RawItem, SentimentScore};
use sqlx::PgPool;
use uuid::Uuid;

/// Inserts a sentiment row keyed on `(ticker_id, source, content_hash)`
/// and back-fills the owning article/community-post row's
/// `sentiment_score`/`confidence`/`mentions_json` columns in the same
/// statement. A conflicting unique key means this exact content was
/// already scored for this ticker — a cross-run duplicate, not an error.
pub async fn insert_sentiment(
    pool: &PgPool,
    ticker_id: Uuid,
    item: &RawItem,
    hash: ContentHash,
    score: &SentimentScore,
) -> Result<InsertSentimentOutcome, AppError> {
    let metadata = serde_json::json!({
        "method": score.method,
        "verification": score.verification,
    });

    let inserted: Option<Uuid> = sqlx::query_scalar(
        r#"
        INSERT INTO sentiments (id, ticker_id, source, score, confidence, label, model, raw_text, content_hash, created_at, metadata_json)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), $10)
        ON CONFLICT (ticker_id, source, content_hash) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(ticker_id)
    .bind(item.source.as_str())
    .bind(score.score)
    .bind(score.confidence)
    .bind(score.label.as_str())
    .bind(&score.model)
    .bind(&item.text)
    .bind(hash.as_hex())
    .bind(metadata)
    .fetch_optional(pool)
    .await?;

    let Some(_) = inserted else {
        return Ok(InsertSentimentOutcome::Duplicate);
    };

    back_fill_owning_row(pool, item, score).await?;

    Ok(InsertSentimentOutcome::Stored)
}

async fn back_fill_owning_row(pool: &PgPool, item: &RawItem, score: &SentimentScore) -> Result<(), AppError> {
    match item.kind {
        ContentKind::Article => {
            if let Some(url) = &item.url {
                sqlx::query("UPDATE articles SET sentiment_score = $1, confidence = $2, mentions_json = $3 WHERE url = $4")
                    .bind(score.score)
                    .bind(score.confidence)
                    .bind(item.stock_mentions())
                    .bind(url)
                    .execute(pool)
                    .await?;
            }
        }
        ContentKind::Story | ContentKind::Comment => {
            if let Some(external_id) = &item.external_id {
                sqlx::query("UPDATE community_posts SET sentiment_score = $1, confidence = $2, mentions_json = $3 WHERE external_id = $4")
                    .bind(score.score)
                    .bind(score.confidence)
                    .bind(item.stock_mentions())
                    .bind(external_id)
                    .execute(pool)
                    .await?;
            }
        }
    }
    Ok(())
}
