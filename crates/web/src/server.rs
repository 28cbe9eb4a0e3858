use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use filechain_ledger::Ledger;
use filechain_types::ledger_time_now;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::ledger_api;
use crate::pages;
use crate::workflows::{AssetService, UploadOutcome, UploadStatus};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Default)]
pub struct UploadCounters {
    created: AtomicU64,
    updated: AtomicU64,
    failed: AtomicU64,
}

impl UploadCounters {
    pub fn record(&self, result: &crate::errors::Result<UploadOutcome>) {
        let counter = match result {
            Ok(outcome) if outcome.status == UploadStatus::Created => &self.created,
            Ok(_) => &self.updated,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> [(&'static str, u64); 3] {
        [
            ("created", self.created.load(Ordering::Relaxed)),
            ("updated", self.updated.load(Ordering::Relaxed)),
            ("failed", self.failed.load(Ordering::Relaxed)),
        ]
    }
}

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AssetService>,
    /// Embedded ledger, when this node runs one.
    pub ledger: Option<Arc<Ledger>>,
    /// Serve `/api/ledger/*` for remote gateways.
    pub expose_ledger_api: bool,
    pub node_id: String,
    pub start_time: Instant,
    pub max_upload_bytes: usize,
    pub req_count: Arc<AtomicUsize>,
    pub uploads: Arc<UploadCounters>,
}

impl AppState {
    pub fn new(service: Arc<AssetService>, node_id: impl Into<String>) -> Self {
        Self {
            service,
            ledger: None,
            expose_ledger_api: false,
            node_id: node_id.into(),
            start_time: Instant::now(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            req_count: Arc::new(AtomicUsize::new(0)),
            uploads: Arc::new(UploadCounters::default()),
        }
    }

    pub(crate) fn record_request(&self) -> u64 {
        self.req_count.fetch_add(1, Ordering::Relaxed) as u64 + 1
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn ledger_height(&self) -> Option<u64> {
        let ledger = self.ledger.as_ref()?;
        match ledger.height() {
            Ok(height) => Some(height),
            Err(err) => {
                warn!("failed to read ledger height: {err}");
                None
            }
        }
    }
}

pub type SharedState = Arc<AppState>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    node_id: String,
    uptime_secs: u64,
    req_total: u64,
    time_us: u64,
    bootstrapped: bool,
    content_backend: &'static str,
    ledger_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ledger_height: Option<u64>,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    node_id: String,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn service_unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let payload = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, payload).into_response()
    }
}

/// Serve `state` on `addr` until `shutdown` resolves.
pub async fn start_server<F>(state: AppState, addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let shared = Arc::new(state);
    let app = build_router(shared);
    let listener = bind_listener(addr).await?;
    info!(
        addr = %listener.local_addr().context("listener has no local address")?,
        "HTTP server listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server terminated unexpectedly")
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {addr}"))
    }
}

pub fn build_router(state: SharedState) -> Router {
    let mut router = Router::new()
        .route("/", get(pages::handle_index))
        .route("/upload", post(pages::handle_upload))
        .route("/upload-multiple", post(pages::handle_upload_multiple))
        .route("/register", get(pages::handle_register))
        .route("/postregister", post(pages::handle_post_register))
        .route("/getusers", get(pages::handle_get_users))
        .route("/showassets", get(pages::handle_show_assets))
        .route("/getasset/:id/:action", get(pages::handle_get_asset))
        .route("/postasset", post(pages::handle_post_asset))
        .route("/deleteasset", post(pages::handle_delete_asset))
        .route("/gethistory/:id", get(pages::handle_get_history))
        .route("/search", get(pages::handle_search))
        .route("/postsearch", post(pages::handle_post_search))
        .route("/block", get(pages::handle_blocks))
        .route("/block/:number", get(pages::handle_block))
        .route("/content/:id", get(pages::handle_content))
        .route("/health", get(handle_health))
        .route("/version", get(handle_version))
        .route("/metrics", get(handle_metrics))
        .fallback(pages::handle_not_found);

    if state.expose_ledger_api {
        if state.ledger.is_some() {
            info!("Serving ledger API on /api/ledger");
            router = router.merge(ledger_api::routes());
        } else {
            warn!("ledger API requested but this node has no embedded ledger");
        }
    }

    router
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let req_total = state.record_request();
    Json(HealthResponse {
        status: "ok",
        node_id: state.node_id.clone(),
        uptime_secs: state.uptime_seconds(),
        req_total,
        time_us: ledger_time_now(),
        bootstrapped: state.service.is_bootstrapped(),
        content_backend: state.service.content_backend(),
        ledger_endpoint: state.service.gateway().endpoint(),
        ledger_height: state.ledger_height(),
    })
}

async fn handle_version(State(state): State<SharedState>) -> Json<VersionResponse> {
    state.record_request();
    Json(VersionResponse {
        node_id: state.node_id.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn handle_metrics(State(state): State<SharedState>) -> Response {
    let req_total = state.record_request();
    let uptime = state.uptime_seconds();
    let connections = state.service.gateway().active_connections();

    let mut metrics =
        "# HELP filechain_http_requests_total Total number of HTTP requests handled\n".to_string();
    metrics.push_str("# TYPE filechain_http_requests_total counter\n");
    metrics.push_str(&format!("filechain_http_requests_total {req_total}\n"));
    metrics.push_str("# HELP filechain_uptime_seconds Uptime of the node in seconds\n");
    metrics.push_str("# TYPE filechain_uptime_seconds gauge\n");
    metrics.push_str(&format!("filechain_uptime_seconds {uptime}\n"));
    metrics.push_str("# HELP filechain_uploads_total Uploaded files by outcome\n");
    metrics.push_str("# TYPE filechain_uploads_total counter\n");
    for (outcome, count) in state.uploads.snapshot() {
        metrics.push_str(&format!(
            "filechain_uploads_total{{outcome=\"{outcome}\"}} {count}\n"
        ));
    }
    metrics.push_str("# HELP filechain_gateway_connections Open ledger gateway connections\n");
    metrics.push_str("# TYPE filechain_gateway_connections gauge\n");
    metrics.push_str(&format!("filechain_gateway_connections {connections}\n"));

    if let Some(height) = state.ledger_height() {
        metrics.push_str("# HELP filechain_ledger_height Number of committed blocks\n");
        metrics.push_str("# TYPE filechain_ledger_height gauge\n");
        metrics.push_str(&format!("filechain_ledger_height {height}\n"));
    }

    let mut response = Response::new(Body::from(metrics));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}
