//! HTTP facade over the executor

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use execbox::{
    ExecuteError, ExecutionRequest, ExecutionResponse, Executor, Language, ToolchainStatus,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Placeholder title sent by editors for untitled files
const UNTITLED_HINT: &str = "New File";

const MISSING_FIELDS: &str = "Code and language are required";

#[derive(Clone)]
struct AppState {
    executor: Arc<Executor>,
}

/// Body of `POST /api/run-code`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunCodeBody {
    #[serde(default)]
    language: Option<String>,

    #[serde(default)]
    code: Option<String>,

    #[serde(default)]
    input: Option<String>,

    #[serde(default, alias = "problemTitle")]
    entrypoint_hint: Option<String>,
}

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ExecuteError> for ApiError {
    fn from(e: ExecuteError) -> Self {
        match e {
            ExecuteError::InvalidRequest(e) => ApiError::BadRequest(e.to_string()),
            ExecuteError::Infrastructure(e) => {
                error!(error = %e, "execution failed");
                ApiError::Internal(e.to_string())
            }
        }
    }
}

/// Build the router
pub fn create_app(executor: Arc<Executor>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/run-code", post(run_code))
        .route("/api/toolchains", get(toolchains))
        .with_state(AppState { executor })
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "OK"
}

async fn toolchains(State(state): State<AppState>) -> Json<Vec<ToolchainStatus>> {
    Json(state.executor.toolchains())
}

async fn run_code(
    State(state): State<AppState>,
    body: Result<Json<RunCodeBody>, JsonRejection>,
) -> Result<Json<ExecutionResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let request = into_request(body)?;
    debug!(language = %request.language, "run-code request");

    let result = state.executor.execute(request).await?;
    Ok(Json(ExecutionResponse::from(result)))
}

fn into_request(body: RunCodeBody) -> Result<ExecutionRequest, ApiError> {
    let (Some(language), Some(code)) = (body.language, body.code) else {
        return Err(ApiError::BadRequest(MISSING_FIELDS.to_owned()));
    };
    if language.trim().is_empty() || code.trim().is_empty() {
        return Err(ApiError::BadRequest(MISSING_FIELDS.to_owned()));
    }
    let language: Language = language
        .parse()
        .map_err(|e: execbox::UnsupportedLanguage| ApiError::BadRequest(e.to_string()))?;

    let mut request = ExecutionRequest::new(language, code);
    if let Some(input) = body.input {
        request = request.with_stdin(input);
    }
    if let Some(hint) = normalize_hint(body.entrypoint_hint) {
        request = request.with_entrypoint_hint(hint);
    }
    Ok(request)
}

/// Drop blank hints and the untitled-file placeholder
fn normalize_hint(hint: Option<String>) -> Option<String> {
    let hint = hint?;
    let trimmed = hint.trim();
    if trimmed.is_empty() || trimmed == UNTITLED_HINT {
        return None;
    }
    Some(trimmed.to_owned())
}

/// Bind `addr`, moving to the next port while the current one is taken
pub async fn bind_with_retries(mut addr: SocketAddr, retries: u16) -> anyhow::Result<TcpListener> {
    let mut attempts = 0;
    loop {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e)
                if e.kind() == io::ErrorKind::AddrInUse
                    && attempts < retries
                    && addr.port() != 0
                    && addr.port() < u16::MAX =>
            {
                warn!(port = addr.port(), "port in use, trying the next one");
                addr.set_port(addr.port() + 1);
                attempts += 1;
            }
            Err(e) => return Err(e).with_context(|| format!("failed to bind {addr}")),
        }
    }
}

/// Serve the API until Ctrl-C
pub async fn serve(executor: Arc<Executor>, addr: SocketAddr, port_retries: u16) -> anyhow::Result<()> {
    let listener = bind_with_retries(addr, port_retries).await?;
    info!(addr = %listener.local_addr()?, "execbox listening");

    if executor.config().cache.enabled {
        spawn_cache_sweeper(executor.clone());
    }

    axum::serve(listener, create_app(executor))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}

fn spawn_cache_sweeper(executor: Arc<Executor>) {
    let period = (executor.config().cache.ttl() / 2).max(Duration::from_secs(60));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            let executor = executor.clone();
            match tokio::task::spawn_blocking(move || executor.evict_expired_artifacts()).await {
                Ok(removed) => debug!(removed, "artifact cache sweep"),
                Err(e) => warn!(error = %e, "artifact cache sweep failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
