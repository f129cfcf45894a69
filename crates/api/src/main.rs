use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::task::JoinSet;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockrec_core::ingest::provider::{FeedClient, HttpFeedClient};
use stockrec_core::query::{self, PageRequest, StockFilters};
use stockrec_core::storage::{PgStore, ProcessGuard};
use stockrec_core::sync::{self, SyncError, SyncOptions};

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://localhost:3000";

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

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(db_url)
            .await
        {
            Ok(pool) => match stockrec_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let feed: Option<Arc<dyn FeedClient>> = match HttpFeedClient::from_settings(&settings) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "feed client unavailable; sync endpoints disabled");
            None
        }
    };

    let syncs = SyncTasks::default();
    let state = AppState {
        pool,
        feed,
        sync_options: SyncOptions::from_env(),
        syncs: syncs.clone(),
    };

    let app = router(state).layer(cors_layer(
        std::env::var("CORS_ALLOWED_ORIGINS").ok().as_deref(),
    ));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // A sync dropped with the runtime would leave its guard row running.
    wait_for_syncs(&syncs).await;

    Ok(())
}

fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/stocks", get(list_stocks))
        .route("/stocks/sync", post(trigger_sync))
        .route("/stocks/sync/status", get(sync_status))
        .route("/stocks/filter-options", get(filter_options))
        .route("/stocks/recommendations", get(list_recommendations))
        .route("/stocks/search/:symbol", get(search_stock))
        .route(
            "/analytics/market-intelligence-overview",
            get(market_overview),
        )
        .route("/stocks/:symbol", get(get_stock))
        .route("/stocks/:symbol/refresh", post(refresh_stock))
        .route("/health", get(health));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api/v1", api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: Option<&str>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(parse_origins(origins.unwrap_or(DEFAULT_CORS_ORIGINS)))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}

fn parse_origins(raw: &str) -> Vec<HeaderValue> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match HeaderValue::from_str(s) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = s, "ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}

async fn healthz() -> &'static str {
    "ok"
}

/// Detached syncs started by requests.
type SyncTasks = Arc<tokio::sync::Mutex<JoinSet<()>>>;

#[derive(Clone)]
struct AppState {
    pool: Option<PgPool>,
    feed: Option<Arc<dyn FeedClient>>,
    sync_options: SyncOptions,
    syncs: SyncTasks,
}

impl AppState {
    fn pool(&self) -> Result<&PgPool, ApiError> {
        self.pool.as_ref().ok_or_else(ApiError::unavailable)
    }

    fn sync_deps(&self) -> Result<(PgStore, Arc<dyn FeedClient>), ApiError> {
        let pool = self.pool()?;
        let feed = self.feed.clone().ok_or_else(ApiError::unavailable)?;
        Ok((PgStore::new(pool.clone()), feed))
    }
}

/// Response body shared by every `/api/v1` route.
#[derive(Debug, Serialize)]
struct Envelope<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data: Some(data),
        error: None,
    })
}

type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unavailable() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "service unavailable")
    }

    fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{what} not found"))
    }

    fn internal(context: &str, err: anyhow::Error) -> Self {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "{context}");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{context}: {err}"),
        )
    }

    fn from_sync(err: SyncError) -> Self {
        match err {
            SyncError::Conflict { .. } => Self::new(
                StatusCode::CONFLICT,
                "stock sync is already running or its interval has not elapsed",
            ),
            other => Self::internal("failed to check sync admission", other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Envelope::<()> {
            success: false,
            data: None,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    page: Option<String>,
    page_size: Option<String>,
    action_type: Option<String>,
    brokerage: Option<String>,
    sort_by: Option<String>,
}

impl ListParams {
    fn page_request(&self) -> PageRequest {
        PageRequest::parse(self.page.as_deref(), self.page_size.as_deref())
    }

    fn filters(&self) -> StockFilters {
        StockFilters::from_params(
            self.action_type.as_deref(),
            self.brokerage.as_deref(),
            self.sort_by.as_deref(),
        )
    }
}

async fn list_stocks(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<query::Paged<stockrec_core::domain::stock::StockView>> {
    let pool = state.pool()?;
    let page = query::list_stocks(pool, params.page_request(), &params.filters())
        .await
        .map_err(|e| ApiError::internal("failed to fetch stocks", e))?;
    Ok(ok(page))
}

async fn get_stock(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> ApiResult<stockrec_core::domain::stock::StockView> {
    let pool = state.pool()?;
    let stock = query::get_stock(pool, symbol.trim())
        .await
        .map_err(|e| ApiError::internal("failed to fetch stock", e))?
        .ok_or_else(|| ApiError::not_found("stock"))?;
    Ok(ok(stock))
}

/// Lookup of an already-ingested stock; the feed cannot be searched by symbol.
async fn search_stock(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> ApiResult<stockrec_core::domain::stock::StockView> {
    let pool = state.pool()?;
    let stock = query::get_stock(pool, symbol.trim())
        .await
        .map_err(|e| ApiError::internal("failed to search stock", e))?
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "stock not found and the feed cannot be searched by symbol",
            )
        })?;
    Ok(ok(stock))
}

async fn list_recommendations(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<query::Paged<stockrec_core::domain::recommendation::RecommendationView>> {
    let pool = state.pool()?;
    let page = query::list_recommendations(pool, params.page_request())
        .await
        .map_err(|e| ApiError::internal("failed to get recommendations", e))?;
    Ok(ok(page))
}

async fn filter_options(State(state): State<AppState>) -> ApiResult<query::FilterOptions> {
    let pool = state.pool()?;
    let options = query::filter_options(pool)
        .await
        .map_err(|e| ApiError::internal("failed to get filter options", e))?;
    Ok(ok(options))
}

async fn market_overview(State(state): State<AppState>) -> ApiResult<query::MarketOverview> {
    let pool = state.pool()?;
    let overview = query::overview(pool)
        .await
        .map_err(|e| ApiError::internal("failed to get market intelligence overview", e))?;
    Ok(ok(overview))
}

async fn trigger_sync(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Envelope<serde_json::Value>>), ApiError> {
    let (store, feed) = state.sync_deps()?;
    admit_and_spawn(&state.syncs, store, feed, state.sync_options.clone()).await?;

    Ok((
        StatusCode::ACCEPTED,
        ok(json!({"message": "stock sync started in the background"})),
    ))
}

/// The feed has no per-symbol endpoint, so a refresh is a full sync gated on the stock existing.
async fn refresh_stock(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<(StatusCode, Json<Envelope<serde_json::Value>>), ApiError> {
    let symbol = symbol.trim().to_string();
    let (store, feed) = state.sync_deps()?;

    stockrec_core::storage::stocks::find_stock_by_symbol(store.pool(), &symbol)
        .await
        .map_err(|e| ApiError::internal("failed to refresh stock data", e))?
        .ok_or_else(|| ApiError::not_found("stock"))?;

    admit_and_spawn(&state.syncs, store, feed, state.sync_options.clone()).await?;

    Ok((
        StatusCode::ACCEPTED,
        ok(json!({"message": "stock refresh started in the background", "symbol": symbol})),
    ))
}

async fn sync_status(
    State(state): State<AppState>,
) -> ApiResult<stockrec_core::domain::process::ProcessControl> {
    let pool = state.pool()?;
    let process = state.sync_options.process.as_str();
    let control = PgStore::new(pool.clone())
        .status(process)
        .await
        .map_err(|e| ApiError::internal("failed to read sync status", e))?
        .ok_or_else(|| ApiError::not_found("sync process"))?;
    Ok(ok(control))
}

/// Synchronous admission check, then a sync detached from the request.
async fn admit_and_spawn(
    syncs: &SyncTasks,
    store: PgStore,
    feed: Arc<dyn FeedClient>,
    opts: SyncOptions,
) -> Result<(), ApiError> {
    match sync::can_start_sync(&store, &opts.process).await {
        Ok(true) => {}
        Ok(false) => {
            return Err(ApiError::from_sync(SyncError::Conflict {
                process: opts.process,
            }))
        }
        Err(e) => return Err(ApiError::from_sync(e)),
    }

    let mut syncs = syncs.lock().await;
    while syncs.try_join_next().is_some() {}
    syncs.spawn(async move {
        match sync::run_sync(feed, store, opts).await {
            Ok(_) => {}
            Err(err) if err.is_conflict() => {
                tracing::info!(error = %err, "background sync lost the start race");
            }
            Err(err) => {
                sentry_anyhow::capture_anyhow(&anyhow::Error::new(err));
            }
        }
    });

    Ok(())
}

async fn wait_for_syncs(syncs: &SyncTasks) {
    let mut syncs = syncs.lock().await;
    if !syncs.is_empty() {
        tracing::info!(in_flight = syncs.len(), "waiting for background sync before exit");
    }
    while let Some(res) = syncs.join_next().await {
        if let Err(err) = res {
            tracing::error!(error = %err, "background sync task failed");
        }
    }
}

async fn health() -> Json<Envelope<serde_json::Value>> {
    ok(json!({"status": "healthy", "version": env!("CARGO_PKG_VERSION")}))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_omits_absent_fields() {
        let v = serde_json::to_value(ok(json!({"a": 1})).0).unwrap();
        assert_eq!(v, json!({"success": true, "data": {"a": 1}}));

        let err = Envelope::<()> {
            success: false,
            data: None,
            error: Some("stock not found".to_string()),
        };
        assert_eq!(
            serde_json::to_value(err).unwrap(),
            json!({"success": false, "error": "stock not found"})
        );
    }

    #[test]
    fn conflict_maps_to_409() {
        let err = ApiError::from_sync(SyncError::Conflict {
            process: "stock_sync".to_string(),
        });
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[test]
    fn origins_skip_blank_and_invalid_entries() {
        let origins = parse_origins("http://a.test, ,http://b.test,bad\nvalue");
        assert_eq!(
            origins,
            vec![
                HeaderValue::from_static("http://a.test"),
                HeaderValue::from_static("http://b.test")
            ]
        );
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_syncs() {
        let syncs = SyncTasks::default();
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let flag = done.clone();
        syncs.lock().await.spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        wait_for_syncs(&syncs).await;
        assert!(done.load(std::sync::atomic::Ordering::SeqCst));
        assert!(syncs.lock().await.is_empty());
    }

    #[test]
    fn list_params_normalize() {
        let params = ListParams {
            page: Some("0".to_string()),
            page_size: Some("500".to_string()),
            sort_by: Some("analysis-oldest".to_string()),
            ..Default::default()
        };
        assert_eq!(params.page_request(), PageRequest::default());
        assert_eq!(params.filters().sort, query::SortMode::AnalysisOldest);
    }
}
