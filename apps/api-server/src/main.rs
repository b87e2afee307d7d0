//! api-server: HTTP API for the URL Shortener workspace.
//!
//! Endpoints:
//! - `POST /api/shorten`: validate and shorten a URL (idempotent per URL).
//! - `GET /:code`: redirect, or show a warning page for reported links.
//! - `POST /api/report`: file an abuse report against a code.
//! - `GET /api/link-count`: total number of links.
//! - `GET /api/health`: liveness.
//!
//! Storage: SQLite (default, `sqlite` feature) or in-memory.
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! cargo run -p api-server
//!
//! # public base URL used for short links and the self-reference check
//! SHORTLINK_DOMAIN=https://sho.rt cargo run -p api-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.
//!

mod config;
mod notify;
mod pages;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use domain::adapters::memory_store::InMemoryStore;
use domain::code::RandomCodeGenerator;
use domain::redirect::RedirectDecision;
use domain::service::ShortenerService;
use domain::{Clock, CoreError, ReportRecord, ShortCode, UrlRecord, UrlStore};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Store selected at startup; sqlite support is feature-gated.
enum AnyStore {
    Memory(InMemoryStore),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite_adapter::SqliteStore),
    #[cfg(test)]
    Stub(Box<dyn UrlStore>),
}

impl UrlStore for AnyStore {
    fn find_by_url(&self, url: &str) -> Result<Option<UrlRecord>, CoreError> {
        match self {
            AnyStore::Memory(s) => s.find_by_url(url),
            #[cfg(feature = "sqlite")]
            AnyStore::Sqlite(s) => s.find_by_url(url),
            #[cfg(test)]
            AnyStore::Stub(s) => s.find_by_url(url),
        }
    }

    fn find_by_code(&self, code: &ShortCode) -> Result<Option<UrlRecord>, CoreError> {
        match self {
            AnyStore::Memory(s) => s.find_by_code(code),
            #[cfg(feature = "sqlite")]
            AnyStore::Sqlite(s) => s.find_by_code(code),
            #[cfg(test)]
            AnyStore::Stub(s) => s.find_by_code(code),
        }
    }

    fn code_exists(&self, code: &ShortCode) -> Result<bool, CoreError> {
        match self {
            AnyStore::Memory(s) => s.code_exists(code),
            #[cfg(feature = "sqlite")]
            AnyStore::Sqlite(s) => s.code_exists(code),
            #[cfg(test)]
            AnyStore::Stub(s) => s.code_exists(code),
        }
    }

    fn insert(&self, record: &UrlRecord) -> Result<(), CoreError> {
        match self {
            AnyStore::Memory(s) => s.insert(record),
            #[cfg(feature = "sqlite")]
            AnyStore::Sqlite(s) => s.insert(record),
            #[cfg(test)]
            AnyStore::Stub(s) => s.insert(record),
        }
    }

    fn add_report(&self, report: &ReportRecord) -> Result<(), CoreError> {
        match self {
            AnyStore::Memory(s) => s.add_report(report),
            #[cfg(feature = "sqlite")]
            AnyStore::Sqlite(s) => s.add_report(report),
            #[cfg(test)]
            AnyStore::Stub(s) => s.add_report(report),
        }
    }

    fn has_reports(&self, code: &ShortCode) -> Result<bool, CoreError> {
        match self {
            AnyStore::Memory(s) => s.has_reports(code),
            #[cfg(feature = "sqlite")]
            AnyStore::Sqlite(s) => s.has_reports(code),
            #[cfg(test)]
            AnyStore::Stub(s) => s.has_reports(code),
        }
    }

    fn count(&self) -> Result<u64, CoreError> {
        match self {
            AnyStore::Memory(s) => s.count(),
            #[cfg(feature = "sqlite")]
            AnyStore::Sqlite(s) => s.count(),
            #[cfg(test)]
            AnyStore::Stub(s) => s.count(),
        }
    }
}

#[derive(Clone)]
struct StdClock;
impl Clock for StdClock {
    fn now(&self) -> std::time::SystemTime {
        std::time::SystemTime::now()
    }
}

type Service = ShortenerService<AnyStore, RandomCodeGenerator, StdClock, notify::ChannelNotifier>;

#[derive(Clone)]
struct AppState {
    svc: Arc<Service>,
    shortlink_domain: Option<String>,
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    cfg.warn_if_insecure();

    let store = match build_store(&cfg) {
        Ok(s) => s,
        Err(e) => {
            error!(err = %e, "store init failed");
            std::process::exit(1);
        }
    };

    let (notifier, notices) = notify::channel(cfg.notify_queue_capacity);
    notify::spawn_worker(notices);

    let svc = ShortenerService::new(store, RandomCodeGenerator::new(), StdClock, notifier)
        .with_validator(cfg.validator_config())
        .with_trust_policy(cfg.trust_policy());
    let state = AppState {
        svc: Arc::new(svc),
        shortlink_domain: cfg.shortlink_domain.clone(),
    };

    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    let mut app = routes(state)
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid));

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin.clone()]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    };
    app = app.layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, err = %e, "bind failed");
            std::process::exit(1);
        }
    };
    info!(%addr, "api-server listening");
    if let Err(e) = axum::serve(listener, app).await {
        error!(err = %e, "server error");
        std::process::exit(1);
    }
}

fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/shorten", post(shorten))
        .route("/api/report", post(report))
        .route("/api/link-count", get(link_count))
        .route("/api/health", get(health))
        .route("/:code", get(redirect))
        .with_state(state)
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

// Construct the store selected by config. The schema is created here, once,
// before the server accepts requests.
fn build_store(cfg: &config::Config) -> Result<AnyStore, CoreError> {
    match cfg.storage_provider {
        #[cfg(feature = "sqlite")]
        config::StorageProvider::Sqlite => {
            info!(path = %cfg.db_path.display(), "opening sqlite store");
            sqlite_adapter::SqliteStore::open_creating_dirs(&cfg.db_path).map(AnyStore::Sqlite)
        }
        #[cfg(not(feature = "sqlite"))]
        config::StorageProvider::Sqlite => {
            warn!("sqlite feature disabled; falling back to in-memory store");
            Ok(AnyStore::Memory(InMemoryStore::new()))
        }
        config::StorageProvider::Memory => Ok(AnyStore::Memory(InMemoryStore::new())),
    }
}

// Store calls are synchronous; keep them off the async workers.
async fn blocking<T, F>(state: &AppState, f: F) -> Result<T, CoreError>
where
    F: FnOnce(&Service) -> Result<T, CoreError> + Send + 'static,
    T: Send + 'static,
{
    let svc = state.svc.clone();
    tokio::task::spawn_blocking(move || f(&svc))
        .await
        .map_err(|e| CoreError::Repository(format!("store task failed: {e}")))?
}

fn error_response(e: &CoreError) -> Response {
    let status = match e {
        CoreError::InvalidUrl(_) | CoreError::InvalidCode(_) | CoreError::InvalidReport(_) => {
            StatusCode::BAD_REQUEST
        }
        CoreError::NotFound => StatusCode::NOT_FOUND,
        CoreError::AlreadyExists => StatusCode::CONFLICT,
        CoreError::UniquenessExhausted { .. } | CoreError::Repository(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let body = match e {
        CoreError::InvalidUrl(r) => http_common::json_error_with_message(r.as_str(), r.message()),
        CoreError::InvalidCode(msg) | CoreError::InvalidReport(msg) => {
            http_common::json_error_with_message(e.reason(), msg)
        }
        // Server-side detail stays in the logs.
        _ => http_common::json_err(e.reason()),
    };
    if status.is_server_error() {
        error!(err = %e, "request failed");
    }
    (status, Json(body)).into_response()
}

// Malformed bodies get the same JSON error shape as every other 400.
fn bad_body(rejection: JsonRejection) -> Response {
    warn!(status = %rejection.status(), err = %rejection.body_text(), "request body rejected");
    (
        StatusCode::BAD_REQUEST,
        Json(http_common::json_err("bad_request")),
    )
        .into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShortenReq {
    #[serde(default)]
    original_url: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShortenOut {
    original_url: String,
    code: String,
    short_url: String,
    existing: bool,
    created_at: String,
}

async fn shorten(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ShortenReq>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    let url = body.original_url.unwrap_or_default();
    match blocking(&state, move |svc| svc.shorten(&url)).await {
        Ok(res) => {
            let code = res.record.code.as_str().to_string();
            let out = ShortenOut {
                short_url: build_short_url(&headers, &code, &state.shortlink_domain),
                original_url: res.record.original_url,
                code,
                existing: res.already_existed,
                created_at: http_common::system_time_to_rfc3339(res.record.created_at),
            };
            (StatusCode::OK, Json(out)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct RedirectQuery {
    #[serde(default)]
    confirmed: Option<String>,
}

async fn redirect(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(q): Query<RedirectQuery>,
) -> Response {
    let confirmed = q.confirmed.as_deref().is_some_and(http_common::is_truthy);
    let lookup = code.clone();
    match blocking(&state, move |svc| svc.resolve(&lookup, confirmed)).await {
        Ok(RedirectDecision::Redirect { record, state }) => {
            info!(code = %record.code, state = ?state, confirmed, "resolve ok");
            found(&record.original_url)
        }
        Ok(RedirectDecision::Warn { record, kind }) => {
            warn!(code = %record.code, kind = ?kind, "resolve needs confirmation");
            (
                StatusCode::OK,
                [
                    (header::REFERRER_POLICY, "no-referrer"),
                    (header::CACHE_CONTROL, "no-store"),
                ],
                Html(pages::warning_page(
                    record.code.as_str(),
                    &record.original_url,
                    kind,
                )),
            )
                .into_response()
        }
        Ok(RedirectDecision::NotFound) => {
            warn!(code = %code, "resolve 404");
            (StatusCode::NOT_FOUND, Html(pages::not_found_page())).into_response()
        }
        Err(e) => {
            error!(code = %code, err = %e, "resolve error");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

/// 302 to `url` with the referrer stripped.
fn found(url: &str) -> Response {
    // Stored URLs passed validation, so the serialized form always parses.
    let location = HeaderValue::from_str(url).ok().or_else(|| {
        url::Url::parse(url)
            .ok()
            .and_then(|u| HeaderValue::from_str(u.as_str()).ok())
    });
    let Some(location) = location else {
        error!(url = %url, "stored url is not a valid Location header");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
    };
    let mut resp = StatusCode::FOUND.into_response();
    let headers = resp.headers_mut();
    headers.insert(header::LOCATION, location);
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    resp
}

#[derive(Deserialize)]
struct ReportReq {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Serialize)]
struct MessageOut {
    message: &'static str,
}

async fn report(
    State(state): State<AppState>,
    body: Result<Json<ReportReq>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    let code = body.code.unwrap_or_default();
    let reason = body.reason.unwrap_or_default();
    match blocking(&state, move |svc| svc.report(&code, &reason)).await {
        Ok(_) => (
            StatusCode::OK,
            Json(MessageOut {
                message: "Report submitted. Thank you for helping keep links safe.",
            }),
        )
            .into_response(),
        Err(e) => {
            if e.is_client_error() || matches!(e, CoreError::NotFound) {
                warn!(err = %e, "report rejected");
            }
            error_response(&e)
        }
    }
}

#[derive(Serialize)]
struct CountOut {
    count: u64,
}

async fn link_count(State(state): State<AppState>) -> Response {
    match blocking(&state, |svc| svc.link_count()).await {
        Ok(count) => (StatusCode::OK, Json(CountOut { count })).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// Build short URL using shortlink_domain from config, or Host header as fallback.
fn build_short_url(headers: &HeaderMap, code: &str, shortlink_domain: &Option<String>) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    http_common::build_short_url(shortlink_domain.as_deref(), host, code)
}
