use crate::domain::recommendation::RecommendationScore;
use crate::scoring::ScoreBreakdown;
use anyhow::Context;
use chrono::Utc;
use serde::Serialize;

const SCORE_COLUMNS: &str = "id, stock_id, total_score, rating_score, rating_change_score, \
     target_change_score, action_score, coverage_score, confidence, reason, latest_action_id, \
     calculated_at, created_at, updated_at";

/// Replaces the stock's score row wholesale. `calculated_at` and `updated_at` share one instant.
pub async fn upsert_score(
    pool: &sqlx::PgPool,
    stock_id: i64,
    score: &ScoreBreakdown,
) -> anyhow::Result<RecommendationScore> {
    let now = Utc::now();

    sqlx::query_as::<_, RecommendationScore>(&format!(
        "INSERT INTO recommendation_scores ( \
           stock_id, total_score, rating_score, rating_change_score, target_change_score, \
           action_score, coverage_score, confidence, reason, latest_action_id, calculated_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11) \
         ON CONFLICT (stock_id) DO UPDATE SET \
           total_score = EXCLUDED.total_score, \
           rating_score = EXCLUDED.rating_score, \
           rating_change_score = EXCLUDED.rating_change_score, \
           target_change_score = EXCLUDED.target_change_score, \
           action_score = EXCLUDED.action_score, \
           coverage_score = EXCLUDED.coverage_score, \
           confidence = EXCLUDED.confidence, \
           reason = EXCLUDED.reason, \
           latest_action_id = EXCLUDED.latest_action_id, \
           calculated_at = EXCLUDED.calculated_at, \
           updated_at = EXCLUDED.updated_at \
         RETURNING {SCORE_COLUMNS}"
    ))
    .bind(stock_id)
    .bind(score.total_score)
    .bind(score.rating_score)
    .bind(score.rating_change_score)
    .bind(score.target_change_score)
    .bind(score.action_score)
    .bind(score.coverage_score)
    .bind(score.confidence.as_str())
    .bind(&score.reason)
    .bind(score.latest_action_id)
    .bind(now)
    .fetch_one(pool)
    .await
    .with_context(|| format!("upsert recommendation_scores failed (stock_id={stock_id})"))
}

pub async fn get_score(
    pool: &sqlx::PgPool,
    stock_id: i64,
) -> anyhow::Result<Option<RecommendationScore>> {
    sqlx::query_as::<_, RecommendationScore>(&format!(
        "SELECT {SCORE_COLUMNS} FROM recommendation_scores WHERE stock_id = $1"
    ))
    .bind(stock_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("select recommendation_scores failed (stock_id={stock_id})"))
}

/// Page of scores, best first, with the total row count.
pub async fn top_scores(
    pool: &sqlx::PgPool,
    limit: i64,
    offset: i64,
) -> anyhow::Result<(Vec<RecommendationScore>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recommendation_scores")
        .fetch_one(pool)
        .await
        .context("count recommendation_scores failed")?;

    let rows = sqlx::query_as::<_, RecommendationScore>(&format!(
        "SELECT {SCORE_COLUMNS} FROM recommendation_scores \
         ORDER BY total_score DESC, stock_id ASC \
         LIMIT $1 OFFSET $2"
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .with_context(|| format!("select top recommendation_scores failed (limit={limit}, offset={offset})"))?;

    Ok((rows, total))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecommendationStats {
    pub total_recommendations: i64,
    pub high_confidence: i64,
    pub medium_confidence: i64,
    pub low_confidence: i64,
    pub average_score: f64,
}

pub async fn recommendation_stats(pool: &sqlx::PgPool) -> anyhow::Result<RecommendationStats> {
    let (total, high, medium, low, avg) =
        sqlx::query_as::<_, (i64, i64, i64, i64, Option<f64>)>(
            "SELECT COUNT(*), \
                    COUNT(*) FILTER (WHERE confidence = 'High'), \
                    COUNT(*) FILTER (WHERE confidence = 'Medium'), \
                    COUNT(*) FILTER (WHERE confidence = 'Low'), \
                    AVG(total_score) \
             FROM recommendation_scores",
        )
        .fetch_one(pool)
        .await
        .context("select recommendation stats failed")?;

    Ok(RecommendationStats {
        total_recommendations: total,
        high_confidence: high,
        medium_confidence: medium,
        low_confidence: low,
        average_score: avg.unwrap_or(0.0),
    })
}
