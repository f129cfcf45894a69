//! Single-flight feed synchronization: guard, drain, upsert, prune, score, release.

use crate::domain::process::{GuardError, STOCK_SYNC};
use crate::domain::stock::{ActionFields, WriteOutcome};
use crate::ingest::provider::FeedClient;
use crate::ingest::types::{item_field, FeedRecord};
use crate::scoring::score_actions;
use crate::storage::{CatalogStore, ProcessGuard};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

/// Number of most recent actions retained per stock.
pub const RETAINED_ACTIONS: i64 = 10;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub process: String,
    pub retained_actions: i64,
    pub page_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            process: STOCK_SYNC.to_string(),
            retained_actions: RETAINED_ACTIONS,
            page_delay: Duration::ZERO,
        }
    }
}

impl SyncOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("FEED_PAGE_DELAY_MS") {
            if let Ok(ms) = s.parse::<u64>() {
                out.page_delay = Duration::from_millis(ms);
            }
        }

        out
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("process {process} is already running or its interval has not elapsed")]
    Conflict { process: String },
    #[error("process guard misconfigured: {0}")]
    Misconfigured(String),
    #[error("feed fetch failed (cursor={cursor:?}): {error:#}")]
    Feed {
        cursor: Option<String>,
        error: anyhow::Error,
    },
    #[error("store error: {0:#}")]
    Store(anyhow::Error),
    #[error("sync task aborted: {0}")]
    Aborted(String),
}

impl SyncError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Conflict { .. })
    }

    fn from_guard(err: anyhow::Error, process: &str) -> Self {
        match err.downcast_ref::<GuardError>() {
            Some(GuardError::AlreadyRunning(_)) => SyncError::Conflict {
                process: process.to_string(),
            },
            Some(GuardError::MissingProcess(_)) => SyncError::Misconfigured(err.to_string()),
            None => SyncError::Store(err),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub pages: usize,
    pub processed: usize,
    pub failed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub pruned: u64,
}

/// Admission check callers run synchronously before launching a detached sync.
pub async fn can_start_sync<G>(guard: &G, process: &str) -> Result<bool, SyncError>
where
    G: ProcessGuard + ?Sized,
{
    guard
        .can_start(process)
        .await
        .map_err(|err| SyncError::from_guard(err, process))
}

async fn acquire<G>(guard: &G, process: &str) -> Result<(), SyncError>
where
    G: ProcessGuard + ?Sized,
{
    if !can_start_sync(guard, process).await? {
        return Err(SyncError::Conflict {
            process: process.to_string(),
        });
    }
    guard
        .start(process)
        .await
        .map_err(|err| SyncError::from_guard(err, process))
}

/// Runs one full sync under the process guard.
///
/// The drain runs on its own task so that the guard is released exactly once whether it
/// succeeds, fails on the feed, or panics. Dropping the returned future aborts the drain and
/// releases the guard from a background task.
pub async fn run_sync<S>(
    feed: Arc<dyn FeedClient>,
    store: S,
    opts: SyncOptions,
) -> Result<SyncReport, SyncError>
where
    S: CatalogStore + ProcessGuard + Clone + 'static,
{
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("sync", %run_id, process = %opts.process);

    async move {
        acquire(&store, &opts.process).await?;
        tracing::info!(provider = feed.provider_name(), "sync started");

        let run = ActiveRun {
            store: store.clone(),
            process: opts.process.clone(),
            drain: Some(tokio::spawn(
                drain_feed(feed, store, opts).in_current_span(),
            )),
            released: false,
        };

        match run.complete().await {
            Ok(report) => {
                tracing::info!(
                    pages = report.pages,
                    processed = report.processed,
                    failed = report.failed,
                    inserted = report.inserted,
                    updated = report.updated,
                    pruned = report.pruned,
                    "sync finished"
                );
                Ok(report)
            }
            Err(err) => {
                tracing::error!(error = %err, "sync failed");
                Err(err)
            }
        }
    }
    .instrument(span)
    .await
}

/// A started run. Owns the drain task and releases the guard on every exit path.
struct ActiveRun<S>
where
    S: ProcessGuard + Clone + 'static,
{
    store: S,
    process: String,
    drain: Option<JoinHandle<Result<SyncReport, SyncError>>>,
    released: bool,
}

impl<S> ActiveRun<S>
where
    S: ProcessGuard + Clone + 'static,
{
    async fn complete(mut self) -> Result<SyncReport, SyncError> {
        let outcome = match self.drain.as_mut() {
            Some(drain) => match drain.await {
                Ok(result) => result,
                Err(join_err) => Err(SyncError::Aborted(join_err.to_string())),
            },
            None => Err(SyncError::Aborted("drain task missing".to_string())),
        };
        self.drain = None;

        release(&self.store, &self.process).await;
        self.released = true;
        outcome
    }
}

impl<S> Drop for ActiveRun<S>
where
    S: ProcessGuard + Clone + 'static,
{
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let drain = self.drain.take();
        if let Some(drain) = &drain {
            drain.abort();
        }

        let store = self.store.clone();
        let process = self.process.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(
                    async move {
                        if let Some(drain) = drain {
                            let _ = drain.await;
                        }
                        tracing::warn!("sync cancelled; releasing process guard");
                        release(&store, &process).await;
                    }
                    .in_current_span(),
                );
            }
            Err(_) => {
                tracing::error!(
                    process = %self.process,
                    "sync cancelled outside a runtime; process guard left running"
                );
            }
        }
    }
}

async fn release<G>(guard: &G, process: &str)
where
    G: ProcessGuard + ?Sized,
{
    if let Err(err) = guard.finish(process).await {
        tracing::error!(error = %format!("{err:#}"), "failed to release process guard");
    }
}

async fn drain_feed<S>(
    feed: Arc<dyn FeedClient>,
    store: S,
    opts: SyncOptions,
) -> Result<SyncReport, SyncError>
where
    S: CatalogStore,
{
    let mut report = SyncReport::default();
    let mut cursor: Option<String> = None;

    loop {
        if report.pages > 0 && !opts.page_delay.is_zero() {
            tokio::time::sleep(opts.page_delay).await;
        }

        let page = feed
            .fetch_page(cursor.as_deref())
            .await
            .map_err(|error| SyncError::Feed {
                cursor: cursor.clone(),
                error,
            })?;
        report.pages += 1;

        for item in &page.items {
            let ingested = match FeedRecord::from_item(item) {
                Ok(record) => ingest_record(&store, &record, opts.retained_actions).await,
                Err(err) => Err(err),
            };
            match ingested {
                Ok(outcome) => {
                    report.processed += 1;
                    report.pruned += outcome.pruned;
                    match outcome.write {
                        WriteOutcome::Inserted => report.inserted += 1,
                        WriteOutcome::Updated => report.updated += 1,
                        WriteOutcome::Unchanged => report.unchanged += 1,
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(
                        ticker = item_field(item, "ticker"),
                        brokerage = item_field(item, "brokerage"),
                        error = %format!("{err:#}"),
                        "failed to ingest feed record; skipping"
                    );
                }
            }
        }

        tracing::info!(
            page = report.pages,
            cursor = cursor.as_deref().unwrap_or(""),
            items = page.items.len(),
            processed = report.processed,
            failed = report.failed,
            "feed page ingested"
        );

        match page.next_cursor() {
            None => break,
            Some(next) if cursor.as_deref() == Some(next) => {
                return Err(SyncError::Feed {
                    cursor,
                    error: anyhow::anyhow!("feed cursor did not advance"),
                });
            }
            Some(next) => cursor = Some(next.to_string()),
        }
    }

    Ok(report)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub write: WriteOutcome,
    pub pruned: u64,
}

/// Stock upsert, action upsert, retention prune and score recompute for one feed record.
pub async fn ingest_record<S>(
    store: &S,
    record: &FeedRecord,
    retained_actions: i64,
) -> anyhow::Result<IngestOutcome>
where
    S: CatalogStore + ?Sized,
{
    let symbol = record.ticker.trim();
    anyhow::ensure!(!symbol.is_empty(), "feed record has an empty ticker");

    let stock = store.upsert_stock(symbol, record.company.trim()).await?;

    let fields = ActionFields {
        action: record.action.trim().to_string(),
        brokerage: record.brokerage.trim().to_string(),
        rating_from: record.rating_from.trim().to_string(),
        rating_to: record.rating_to.trim().to_string(),
        target_from: record.target_from.trim().to_string(),
        target_to: record.target_to.trim().to_string(),
        analysis_date: record.time,
    };
    let (_, write) = store.upsert_action(stock.id, &fields).await?;

    let pruned = store.prune_actions(stock.id, retained_actions).await?;

    let actions = store.recent_actions(stock.id, retained_actions).await?;
    let score = score_actions(&actions);
    store.upsert_score(stock.id, &score).await?;

    tracing::debug!(
        symbol,
        stock_id = stock.id,
        ?write,
        pruned,
        total_score = score.total_score,
        "feed record ingested"
    );

    Ok(IngestOutcome { write, pruned })
}
