//! HTTP front door.
//!
//! Thin plumbing around the lookup core: decode the request, call the
//! orchestrator, map the typed outcome onto a status code. Also forwards chat
//! questions and serves the static front-end.

pub mod chat;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::{ConfigError, GatewayConfig, LookupConfig};
use crate::lookup::{Lookup, LookupError};
use crate::modules::audit::{AuditSink, CsvAuditLog};
use crate::modules::events::{LookupStats, StatsSnapshot};
use crate::modules::retry::RetryingLookup;

pub use chat::{ChatError, ChatForwarder, ChatRequest, ChatResponse};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("chat client setup failed: {0}")]
    Chat(#[from] ChatError),
    #[error("server i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub lookup: Arc<RetryingLookup>,
    pub chat: Arc<ChatForwarder>,
    pub audit: Arc<dyn AuditSink>,
    pub stats: Arc<LookupStats>,
    pub static_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub cedula: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub cached_entries: usize,
    pub stats: StatsSnapshot,
}

/// JSON error body `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
    retry_after_secs: Option<u64>,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
            retry_after_secs: None,
        }
    }
}

impl From<LookupError> for ApiError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::InvalidIdentifier(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "A non-empty identifier is required")
            }
            LookupError::Blocked { .. } => ApiError::new(
                StatusCode::FORBIDDEN,
                "Error 403: blocked by bot mitigation",
            ),
            LookupError::Upstream(_) => ApiError::new(
                StatusCode::BAD_GATEWAY,
                "Error validating the identifier with the registry",
            ),
            LookupError::CircuitOpen { retry_after } => Self {
                retry_after_secs: Some(retry_after.as_secs().max(1)),
                ..ApiError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Registry lookups are temporarily suspended",
                )
            },
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Timeout => {
                ApiError::new(StatusCode::GATEWAY_TIMEOUT, "Timeout while asking the agent")
            }
            other => ApiError::new(
                StatusCode::BAD_GATEWAY,
                format!("Error talking to the agent: {other}"),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(json!({ "detail": self.detail }))).into_response();
        if let Some(secs) = self.retry_after_secs
            && let Ok(value) = HeaderValue::from_str(&secs.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/static/*path", get(static_file))
        .route("/healthz", get(healthz))
        .route("/api/validate-cedula", post(validate_cedula))
        .route("/api/chat", post(chat_endpoint))
        .layer(middleware::map_response(allow_any_origin))
        .with_state(state)
}

/// Wires config, audit sink, orchestrator and chat client into [`AppState`].
pub async fn build_state(
    lookup_config: LookupConfig,
    gateway_config: &GatewayConfig,
) -> Result<AppState, GatewayError> {
    let audit: Arc<dyn AuditSink> = Arc::new(CsvAuditLog::new(
        &lookup_config.audit_path,
        &lookup_config.transcript_path,
    ));
    let stats = Arc::new(LookupStats::new());
    let retry = lookup_config.retry.clone();

    let lookup = Lookup::builder()
        .with_config(lookup_config)
        .with_audit_sink(audit.clone())
        .with_event_handler(stats.clone())
        .build()?;
    let known = lookup.load_audit().await;
    log::info!("audit dedup set seeded with {known} identifiers");

    let chat = ChatForwarder::new(
        gateway_config.chat_webhook_url.clone(),
        gateway_config.chat_timeout,
    )?;

    Ok(AppState {
        lookup: Arc::new(RetryingLookup::new(Arc::new(lookup), retry)),
        chat: Arc::new(chat),
        audit,
        stats,
        static_dir: gateway_config.static_dir.clone(),
    })
}

/// Serves until Ctrl-C, then flushes the audit sink.
pub async fn serve(
    lookup_config: LookupConfig,
    gateway_config: GatewayConfig,
) -> Result<(), GatewayError> {
    let state = build_state(lookup_config, &gateway_config).await?;
    let audit = state.audit.clone();

    let listener = tokio::net::TcpListener::bind(gateway_config.bind).await?;
    log::info!("cedula gateway listening on http://{}", gateway_config.bind);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                log::warn!("failed to listen for shutdown signal: {err}");
            }
        })
        .await?;

    log::info!("shutting down; flushing audit logs");
    audit.flush().await;
    Ok(())
}

async fn validate_cedula(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let result = state.lookup.lookup(&request.cedula).await?;
    Ok(Json(result.payload))
}

async fn chat_endpoint(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let answer = state
        .chat
        .ask(&request.question, &request.session_id)
        .await
        .inspect_err(|err| log::warn!("chat forwarding for {} failed: {err}", request.session_id))?;

    state
        .audit
        .record_chat_transcript(&request.session_id, &request.question, &answer)
        .await;

    Ok(Json(ChatResponse {
        answer,
        session_id: request.session_id,
    }))
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: crate::VERSION,
        cached_entries: state.lookup.inner().cache().len(),
        stats: state.stats.snapshot(),
    })
}

async fn index(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    tokio::fs::read_to_string(state.static_dir.join("index.html"))
        .await
        .map(Html)
        .map_err(|_| ApiError::new(StatusCode::NOT_FOUND, "Not found"))
}

async fn static_file(
    State(state): State<AppState>,
    UrlPath(path): UrlPath<String>,
) -> Result<Response, ApiError> {
    let not_found = || ApiError::new(StatusCode::NOT_FOUND, "Not found");
    let relative = safe_relative(&path).ok_or_else(not_found)?;
    let bytes = tokio::fs::read(state.static_dir.join(&relative))
        .await
        .map_err(|_| not_found())?;
    Ok(([(header::CONTENT_TYPE, content_type(&relative))], bytes).into_response())
}

/// Rejects absolute paths and parent traversal.
fn safe_relative(raw: &str) -> Option<PathBuf> {
    let path = Path::new(raw.trim_start_matches('/'));
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!clean.as_os_str().is_empty()).then_some(clean)
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "application/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

async fn allow_any_origin(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}
