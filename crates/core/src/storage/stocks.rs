use crate::domain::stock::{ActionFields, AnalystAction, Stock, WriteOutcome};
use anyhow::Context;

const ACTION_COLUMNS: &str = "id, stock_id, action, brokerage, rating_from, rating_to, \
     target_from, target_to, analysis_date, created_at";

/// Inserts the stock or refreshes its name; the id of an existing row never changes.
pub async fn upsert_stock(pool: &sqlx::PgPool, symbol: &str, name: &str) -> anyhow::Result<Stock> {
    sqlx::query_as::<_, Stock>(
        "INSERT INTO stocks (symbol, name) VALUES ($1, $2) \
         ON CONFLICT (symbol) DO UPDATE SET name = EXCLUDED.name, updated_at = NOW() \
         RETURNING id, symbol, name, created_at, updated_at",
    )
    .bind(symbol)
    .bind(name)
    .fetch_one(pool)
    .await
    .with_context(|| format!("upsert stocks failed (symbol={symbol})"))
}

pub async fn find_stock_by_symbol(
    pool: &sqlx::PgPool,
    symbol: &str,
) -> anyhow::Result<Option<Stock>> {
    sqlx::query_as::<_, Stock>(
        "SELECT id, symbol, name, created_at, updated_at FROM stocks WHERE symbol = $1",
    )
    .bind(symbol)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("select stocks failed (symbol={symbol})"))
}

async fn find_action_by_key(
    pool: &sqlx::PgPool,
    stock_id: i64,
    fields: &ActionFields,
) -> anyhow::Result<Option<AnalystAction>> {
    sqlx::query_as::<_, AnalystAction>(&format!(
        "SELECT {ACTION_COLUMNS} FROM analyst_actions \
         WHERE stock_id = $1 AND analysis_date = $2 AND brokerage = $3"
    ))
    .bind(stock_id)
    .bind(fields.analysis_date)
    .bind(&fields.brokerage)
    .fetch_optional(pool)
    .await
    .with_context(|| {
        format!(
            "select analyst_actions failed (stock_id={stock_id}, analysis_date={}, brokerage={})",
            fields.analysis_date, fields.brokerage
        )
    })
}

/// Change-aware upsert keyed by `(stock_id, analysis_date, brokerage)`.
///
/// An existing row is only rewritten when one of its fields differs, so a repeated ingest leaves
/// the row, and its `created_at`, untouched.
pub async fn upsert_action(
    pool: &sqlx::PgPool,
    stock_id: i64,
    fields: &ActionFields,
) -> anyhow::Result<(AnalystAction, WriteOutcome)> {
    if let Some(existing) = find_action_by_key(pool, stock_id, fields).await? {
        if !fields.differs_from(&existing) {
            return Ok((existing, WriteOutcome::Unchanged));
        }

        let updated = sqlx::query_as::<_, AnalystAction>(&format!(
            "UPDATE analyst_actions \
             SET action = $2, rating_from = $3, rating_to = $4, target_from = $5, target_to = $6 \
             WHERE id = $1 \
               AND (action IS DISTINCT FROM $2 OR rating_from IS DISTINCT FROM $3 \
                    OR rating_to IS DISTINCT FROM $4 OR target_from IS DISTINCT FROM $5 \
                    OR target_to IS DISTINCT FROM $6) \
             RETURNING {ACTION_COLUMNS}"
        ))
        .bind(existing.id)
        .bind(&fields.action)
        .bind(&fields.rating_from)
        .bind(&fields.rating_to)
        .bind(&fields.target_from)
        .bind(&fields.target_to)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("update analyst_actions failed (id={})", existing.id))?;

        // A concurrent writer may already have stored the same values.
        return Ok(match updated {
            Some(row) => (row, WriteOutcome::Updated),
            None => (existing, WriteOutcome::Unchanged),
        });
    }

    let inserted = sqlx::query_as::<_, AnalystAction>(&format!(
        "INSERT INTO analyst_actions \
           (stock_id, action, brokerage, rating_from, rating_to, target_from, target_to, analysis_date) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT ON CONSTRAINT analyst_actions_natural_key DO NOTHING \
         RETURNING {ACTION_COLUMNS}"
    ))
    .bind(stock_id)
    .bind(&fields.action)
    .bind(&fields.brokerage)
    .bind(&fields.rating_from)
    .bind(&fields.rating_to)
    .bind(&fields.target_from)
    .bind(&fields.target_to)
    .bind(fields.analysis_date)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("insert analyst_actions failed (stock_id={stock_id})"))?;

    match inserted {
        Some(row) => Ok((row, WriteOutcome::Inserted)),
        None => {
            let row = find_action_by_key(pool, stock_id, fields)
                .await?
                .with_context(|| {
                    format!("analyst action vanished after insert conflict (stock_id={stock_id})")
                })?;
            Ok((row, WriteOutcome::Unchanged))
        }
    }
}

/// Keeps the `keep` most recent actions of a stock. Equal dates keep the later insertion.
pub async fn prune_actions(pool: &sqlx::PgPool, stock_id: i64, keep: i64) -> anyhow::Result<u64> {
    let res = sqlx::query(
        "DELETE FROM analyst_actions \
         WHERE stock_id = $1 \
           AND id NOT IN ( \
             SELECT id FROM analyst_actions \
             WHERE stock_id = $1 \
             ORDER BY analysis_date DESC, id DESC \
             LIMIT $2)",
    )
    .bind(stock_id)
    .bind(keep)
    .execute(pool)
    .await
    .with_context(|| format!("prune analyst_actions failed (stock_id={stock_id}, keep={keep})"))?;

    Ok(res.rows_affected())
}

pub async fn recent_actions(
    pool: &sqlx::PgPool,
    stock_id: i64,
    limit: i64,
) -> anyhow::Result<Vec<AnalystAction>> {
    sqlx::query_as::<_, AnalystAction>(&format!(
        "SELECT {ACTION_COLUMNS} FROM analyst_actions \
         WHERE stock_id = $1 \
         ORDER BY analysis_date DESC, id DESC \
         LIMIT $2"
    ))
    .bind(stock_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .with_context(|| format!("select recent analyst_actions failed (stock_id={stock_id})"))
}

/// Up to `per_stock` most recent actions for each of `stock_ids`, newest first per stock.
pub async fn recent_actions_for_stocks(
    pool: &sqlx::PgPool,
    stock_ids: &[i64],
    per_stock: i64,
) -> anyhow::Result<Vec<AnalystAction>> {
    if stock_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, AnalystAction>(
        "SELECT a.id, a.stock_id, a.action, a.brokerage, a.rating_from, a.rating_to, \
                a.target_from, a.target_to, a.analysis_date, a.created_at \
         FROM UNNEST($1::BIGINT[]) AS p(stock_id) \
         CROSS JOIN LATERAL ( \
             SELECT * FROM analyst_actions \
             WHERE stock_id = p.stock_id \
             ORDER BY analysis_date DESC, id DESC \
             LIMIT $2) a \
         ORDER BY a.stock_id, a.analysis_date DESC, a.id DESC",
    )
    .bind(stock_ids)
    .bind(per_stock)
    .fetch_all(pool)
    .await
    .with_context(|| {
        format!(
            "select latest analyst_actions failed (stocks={}, per_stock={per_stock})",
            stock_ids.len()
        )
    })
}

pub async fn stocks_by_ids(pool: &sqlx::PgPool, stock_ids: &[i64]) -> anyhow::Result<Vec<Stock>> {
    if stock_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, Stock>(
        "SELECT id, symbol, name, created_at, updated_at FROM stocks WHERE id = ANY($1)",
    )
    .bind(stock_ids)
    .fetch_all(pool)
    .await
    .with_context(|| format!("select stocks by id failed (stocks={})", stock_ids.len()))
}
