//! Aggregate analytics over recently ingested actions and the persisted scores.

use crate::storage::recommendations::{recommendation_stats, RecommendationStats};
use crate::taxonomy::ActionKind;
use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;

pub const WINDOW_DAYS: i32 = 30;
pub const TREND_DAYS: i32 = 7;
const TOP_N: i64 = 5;

const UPGRADE_PREDICATE: &str = "(LOWER(action) LIKE '%raised%' OR LOWER(action) LIKE '%upgrade%' \
     OR LOWER(action) LIKE '%initiated%' OR LOWER(rating_to) LIKE '%buy%' \
     OR LOWER(rating_to) LIKE '%outperform%')";

const DOWNGRADE_PREDICATE: &str = "(LOWER(action) LIKE '%lowered%' OR LOWER(action) LIKE '%downgrade%' \
     OR LOWER(rating_to) LIKE '%sell%' OR LOWER(rating_to) LIKE '%underperform%')";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrokerageShare {
    pub brokerage: String,
    pub analysis_count: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionKindShare {
    pub action_type: String,
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketOverview {
    pub total_stocks: i64,
    pub total_recommendations: i64,
    pub recent_analysis: i64,
    pub upgrades: i64,
    pub downgrades: i64,
    pub high_confidence_recs: i64,
    /// Scored stocks as a percentage of all stocks.
    pub selection_rate: f64,
    pub average_recommendation_score: f64,
    pub top_brokerages: Vec<BrokerageShare>,
    pub top_action_types: Vec<ActionKindShare>,
    pub recent_activity_trend: Vec<TrendPoint>,
}

/// `CASE` expression bucketing `action` into taxonomy labels, in classification order.
fn action_label_case() -> String {
    let mut sql = String::from("CASE");
    for kind in ActionKind::ALL {
        sql.push_str(&format!(
            " WHEN LOWER(action) LIKE '%{}%' THEN '{}'",
            kind.pattern(),
            kind.label()
        ));
    }
    sql.push_str(" ELSE 'Other' END");
    sql
}

/// Percentages of each count against the sum of the listed counts.
pub fn shares(counts: &[i64]) -> Vec<f64> {
    let total: i64 = counts.iter().sum();
    counts
        .iter()
        .map(|&c| {
            if total > 0 {
                c as f64 / total as f64 * 100.0
            } else {
                0.0
            }
        })
        .collect()
}

pub fn selection_rate(total_recommendations: i64, total_stocks: i64) -> f64 {
    if total_stocks > 0 {
        total_recommendations as f64 / total_stocks as f64 * 100.0
    } else {
        0.0
    }
}

pub async fn overview(pool: &sqlx::PgPool) -> anyhow::Result<MarketOverview> {
    let total_stocks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stocks")
        .fetch_one(pool)
        .await
        .context("count stocks failed")?;

    let window = format!("created_at >= NOW() - make_interval(days => {WINDOW_DAYS})");

    let (recent_analysis, upgrades, downgrades) = sqlx::query_as::<_, (i64, i64, i64)>(&format!(
        "SELECT COUNT(*), \
                COUNT(*) FILTER (WHERE {UPGRADE_PREDICATE}), \
                COUNT(*) FILTER (WHERE {DOWNGRADE_PREDICATE}) \
         FROM analyst_actions WHERE {window}"
    ))
    .fetch_one(pool)
    .await
    .context("count recent analyst_actions failed")?;

    let brokerage_rows = sqlx::query_as::<_, (String, i64)>(&format!(
        "SELECT brokerage, COUNT(*) AS n FROM analyst_actions \
         WHERE {window} AND brokerage <> '' \
         GROUP BY brokerage ORDER BY n DESC, brokerage ASC LIMIT {TOP_N}"
    ))
    .fetch_all(pool)
    .await
    .context("select top brokerages failed")?;

    let action_rows = sqlx::query_as::<_, (String, i64)>(&format!(
        "SELECT {} AS action_type, COUNT(*) AS n FROM analyst_actions \
         WHERE {window} AND action <> '' \
         GROUP BY action_type ORDER BY n DESC, action_type ASC LIMIT {TOP_N}",
        action_label_case()
    ))
    .fetch_all(pool)
    .await
    .context("select top action types failed")?;

    let recent_activity_trend = sqlx::query_as::<_, (NaiveDate, i64)>(&format!(
        "SELECT created_at::date AS day, COUNT(*) FROM analyst_actions \
         WHERE created_at >= NOW() - make_interval(days => {TREND_DAYS}) \
         GROUP BY day ORDER BY day DESC LIMIT {TREND_DAYS}"
    ))
    .fetch_all(pool)
    .await
    .context("select activity trend failed")?
    .into_iter()
    .map(|(date, count)| TrendPoint { date, count })
    .collect();

    // Missing score stats degrade to zeros instead of failing the whole overview.
    let stats = match recommendation_stats(pool).await {
        Ok(stats) => stats,
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "recommendation stats unavailable");
            RecommendationStats::default()
        }
    };

    let brokerage_pct = shares(&brokerage_rows.iter().map(|(_, n)| *n).collect::<Vec<_>>());
    let action_pct = shares(&action_rows.iter().map(|(_, n)| *n).collect::<Vec<_>>());

    Ok(MarketOverview {
        total_stocks,
        total_recommendations: stats.total_recommendations,
        recent_analysis,
        upgrades,
        downgrades,
        high_confidence_recs: stats.high_confidence,
        selection_rate: selection_rate(stats.total_recommendations, total_stocks),
        average_recommendation_score: stats.average_score,
        top_brokerages: brokerage_rows
            .into_iter()
            .zip(brokerage_pct)
            .map(|((brokerage, analysis_count), percentage)| BrokerageShare {
                brokerage,
                analysis_count,
                percentage,
            })
            .collect(),
        top_action_types: action_rows
            .into_iter()
            .zip(action_pct)
            .map(|((action_type, count), percentage)| ActionKindShare {
                action_type,
                count,
                percentage,
            })
            .collect(),
        recent_activity_trend,
    })
}
