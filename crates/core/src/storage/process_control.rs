use crate::domain::process::{GuardError, ProcessControl};
use anyhow::Context;
use chrono::Utc;

pub async fn get(pool: &sqlx::PgPool, process: &str) -> anyhow::Result<Option<ProcessControl>> {
    sqlx::query_as::<_, ProcessControl>(
        "SELECT id, process_name, is_running, last_execution, interval_minutes, created_at, updated_at \
         FROM process_control WHERE process_name = $1",
    )
    .bind(process)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("select process_control failed (process={process})"))
}

/// Compare-and-set `is_running: false -> true`. This is the only mutual-exclusion point: two
/// callers racing here see exactly one matched row between them.
pub async fn start(pool: &sqlx::PgPool, process: &str) -> anyhow::Result<()> {
    let res = sqlx::query(
        "UPDATE process_control SET is_running = TRUE, updated_at = NOW() \
         WHERE process_name = $1 AND is_running = FALSE",
    )
    .bind(process)
    .execute(pool)
    .await
    .with_context(|| format!("start process_control failed (process={process})"))?;

    if res.rows_affected() == 0 {
        return Err(GuardError::AlreadyRunning(process.to_string()).into());
    }
    Ok(())
}

/// Releases the process and stamps the execution time that gates the next start.
pub async fn finish(pool: &sqlx::PgPool, process: &str) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE process_control SET is_running = FALSE, last_execution = $2, updated_at = NOW() \
         WHERE process_name = $1",
    )
    .bind(process)
    .bind(Utc::now())
    .execute(pool)
    .await
    .with_context(|| format!("finish process_control failed (process={process})"))?;
    Ok(())
}

/// Clears a stale running flag (e.g. after the worker was killed) without touching the cooldown.
pub async fn force_stop(pool: &sqlx::PgPool, process: &str) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE process_control SET is_running = FALSE, updated_at = NOW() \
         WHERE process_name = $1",
    )
    .bind(process)
    .execute(pool)
    .await
    .with_context(|| format!("force stop process_control failed (process={process})"))?;
    Ok(())
}
