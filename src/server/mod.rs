//! HTTP front door for `ai serve`.
//!
//! Routes:
//!   GET  /health     no auth, `{status, version}`
//!   GET  /models     alias table + default
//!   GET  /providers  known and available provider ids
//!   POST /call       `{alias, prompt, json_mode?, yolo?}` -> `{result}` | `{error}`
//!
//! Everything except `/health` requires `Authorization: Bearer <token>` when a
//! token is configured.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;

use crate::dispatch::DispatchEngine;
use crate::error::AiError;
use crate::provider::{CallOptions, PROVIDER_IDS};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8765;
const GENERATED_TOKEN_LEN: usize = 43;

/* ---- State ---- */

#[derive(Clone)]
pub struct AppState {
    engine: Arc<DispatchEngine>,
    /// `None` disables authentication.
    token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(engine: DispatchEngine, token: Option<String>) -> Self {
        Self {
            engine: Arc::new(engine),
            token: token.map(Arc::from),
        }
    }
}

/// Random URL-safe token for a server started without one.
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/* ---- Errors ---- */

/// `{"error": message}` with a status code.
#[derive(Debug)]
pub struct ApiError {
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

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<AiError> for ApiError {
    fn from(e: AiError) -> Self {
        let status = match &e {
            AiError::UnknownAlias { .. } => StatusCode::NOT_FOUND,
            AiError::ProviderUnavailable { .. }
            | AiError::ProviderExecution { .. }
            | AiError::Timeout { .. } => StatusCode::BAD_GATEWAY,
            AiError::Argument { .. } | AiError::Config(_) => StatusCode::BAD_REQUEST,
            AiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/* ---- Middleware ---- */

fn token_matches(given: &str, expected: &str) -> bool {
    let (a, b) = (given.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        let _ = b.ct_eq(b);
        return false;
    }
    a.ct_eq(b).into()
}

async fn require_token(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.token.as_deref() else {
        return Ok(next.run(request).await);
    };
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .is_some_and(|given| token_matches(given, expected));
    if !authorized {
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "Unauthorized: invalid or missing Bearer token",
        ));
    }
    Ok(next.run(request).await)
}

async fn log_request(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    tracing::info!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

/* ---- Handlers ---- */

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn models(State(state): State<AppState>) -> Json<serde_json::Value> {
    let table = state.engine.table();
    let models: serde_json::Map<String, serde_json::Value> = table
        .iter()
        .map(|(name, alias)| {
            (
                name.clone(),
                json!({ "provider": alias.provider, "model": alias.model }),
            )
        })
        .collect();
    Json(json!({
        "models": models,
        "default": table.default_alias(),
    }))
}

async fn providers(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "providers": PROVIDER_IDS,
        "available": state.engine.registry().available(),
    }))
}

#[derive(Debug, Deserialize)]
struct CallRequest {
    alias: Option<String>,
    prompt: Option<String>,
    #[serde(default)]
    json_mode: bool,
    #[serde(default)]
    yolo: bool,
}

async fn call(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let req: CallRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {e}")))?;
    let (Some(alias), Some(prompt)) = (req.alias, req.prompt) else {
        return Err(ApiError::bad_request(
            "Missing 'alias' or 'prompt' in request body",
        ));
    };
    let opts = CallOptions {
        json: req.json_mode,
        yolo: req.yolo,
    };
    let result = state.engine.call(&alias, &prompt, opts).await?;
    Ok(Json(json!({ "result": result })))
}

async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Not found")
}

/* ---- Router / run ---- */

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/models", get(models))
        .route("/providers", get(providers))
        .route("/call", post(call))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .fallback(not_found)
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Bind `addr` and serve until the process is interrupted.
pub async fn run(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
}
