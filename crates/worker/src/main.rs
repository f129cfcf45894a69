use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockrec_core::ingest::provider::{FeedClient, HttpFeedClient};
use stockrec_core::storage::{PgStore, ProcessGuard};
use stockrec_core::sync::{self, SyncOptions};

mod fixture;

#[derive(Debug, Parser)]
#[command(name = "stockrec_worker")]
struct Args {
    /// Process guard row to operate on.
    #[arg(long, default_value = stockrec_core::domain::process::STOCK_SYNC)]
    process: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one full feed sync under the process guard.
    Sync {
        /// Replay pages from a JSON file instead of calling the upstream feed.
        #[arg(long)]
        from_file: Option<PathBuf>,
    },
    /// Print the guard row as JSON.
    Status,
    /// Clear a stale running flag without resetting the interval.
    ForceStop,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = stockrec_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    stockrec_core::storage::migrate(&pool).await?;
    let store = PgStore::new(pool);

    match args.command {
        Command::Sync { from_file } => {
            let feed: Arc<dyn FeedClient> = match from_file {
                Some(path) => Arc::new(fixture::FileFeed::load(&path)?),
                None => Arc::new(HttpFeedClient::from_settings(&settings)?),
            };

            let opts = SyncOptions {
                process: args.process,
                ..SyncOptions::from_env()
            };

            match sync::run_sync(feed, store, opts).await {
                Ok(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                Err(err) if err.is_conflict() => {
                    tracing::warn!(error = %err, "sync not started");
                }
                Err(err) => {
                    let err = anyhow::Error::new(err);
                    sentry_anyhow::capture_anyhow(&err);
                    return Err(err);
                }
            }
        }
        Command::Status => {
            let control = store
                .status(&args.process)
                .await?
                .with_context(|| format!("process_control row missing (process={})", args.process))?;
            println!("{}", serde_json::to_string_pretty(&control)?);
        }
        Command::ForceStop => {
            store.force_stop(&args.process).await?;
            tracing::info!(process = %args.process, "process guard released");
        }
    }

    Ok(())
}

fn init_sentry(settings: &stockrec_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
