pub mod process_control;
pub mod recommendations;
pub mod stocks;

#[cfg(test)]
pub(crate) mod memory;

use crate::domain::process::{GuardError, ProcessControl};
use crate::domain::recommendation::RecommendationScore;
use crate::domain::stock::{ActionFields, AnalystAction, Stock, WriteOutcome};
use crate::scoring::ScoreBreakdown;
use anyhow::Context;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Write side of the canonical store used by ingestion.
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    async fn upsert_stock(&self, symbol: &str, name: &str) -> anyhow::Result<Stock>;

    async fn upsert_action(
        &self,
        stock_id: i64,
        fields: &ActionFields,
    ) -> anyhow::Result<(AnalystAction, WriteOutcome)>;

    /// Deletes all but the `keep` most recent actions of a stock. Returns the deleted count.
    async fn prune_actions(&self, stock_id: i64, keep: i64) -> anyhow::Result<u64>;

    /// Most recent actions first.
    async fn recent_actions(&self, stock_id: i64, limit: i64) -> anyhow::Result<Vec<AnalystAction>>;

    async fn upsert_score(
        &self,
        stock_id: i64,
        score: &ScoreBreakdown,
    ) -> anyhow::Result<RecommendationScore>;
}

/// Persisted single-flight + cooldown gate for named processes.
#[async_trait::async_trait]
pub trait ProcessGuard: Send + Sync {
    async fn status(&self, process: &str) -> anyhow::Result<Option<ProcessControl>>;

    /// Fails with [`GuardError::AlreadyRunning`] when the running flag could not be flipped.
    async fn start(&self, process: &str) -> anyhow::Result<()>;

    async fn finish(&self, process: &str) -> anyhow::Result<()>;

    async fn force_stop(&self, process: &str) -> anyhow::Result<()>;

    /// Advisory pre-check; `start` is the authoritative transition.
    async fn can_start(&self, process: &str) -> anyhow::Result<bool> {
        let control = self
            .status(process)
            .await?
            .ok_or_else(|| GuardError::MissingProcess(process.to_string()))?;
        Ok(control.can_start_at(chrono::Utc::now()))
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl CatalogStore for PgStore {
    async fn upsert_stock(&self, symbol: &str, name: &str) -> anyhow::Result<Stock> {
        stocks::upsert_stock(&self.pool, symbol, name).await
    }

    async fn upsert_action(
        &self,
        stock_id: i64,
        fields: &ActionFields,
    ) -> anyhow::Result<(AnalystAction, WriteOutcome)> {
        stocks::upsert_action(&self.pool, stock_id, fields).await
    }

    async fn prune_actions(&self, stock_id: i64, keep: i64) -> anyhow::Result<u64> {
        stocks::prune_actions(&self.pool, stock_id, keep).await
    }

    async fn recent_actions(&self, stock_id: i64, limit: i64) -> anyhow::Result<Vec<AnalystAction>> {
        stocks::recent_actions(&self.pool, stock_id, limit).await
    }

    async fn upsert_score(
        &self,
        stock_id: i64,
        score: &ScoreBreakdown,
    ) -> anyhow::Result<RecommendationScore> {
        recommendations::upsert_score(&self.pool, stock_id, score).await
    }
}

#[async_trait::async_trait]
impl ProcessGuard for PgStore {
    async fn status(&self, process: &str) -> anyhow::Result<Option<ProcessControl>> {
        process_control::get(&self.pool, process).await
    }

    async fn start(&self, process: &str) -> anyhow::Result<()> {
        process_control::start(&self.pool, process).await
    }

    async fn finish(&self, process: &str) -> anyhow::Result<()> {
        process_control::finish(&self.pool, process).await
    }

    async fn force_stop(&self, process: &str) -> anyhow::Result<()> {
        process_control::force_stop(&self.pool, process).await
    }
}
