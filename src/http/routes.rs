//! Route handlers and router assembly.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, ORIGIN};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::client_ip::ClientResolver;
use super::middleware::admission_middleware;
use crate::admission::AdmissionGate;
use crate::completion::CompletionBackend;
use crate::config::ServerConfig;
use crate::metrics;

const HEALTH_PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AdmissionGate>,
    pub completions: Arc<dyn CompletionBackend>,
    pub resolver: ClientResolver,
}

/// Completion request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    #[serde(default)]
    pub prompt: String,
}

/// Completion response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Build the service router: health, metrics and the gated completions route.
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([ORIGIN, CONTENT_TYPE, ACCEPT, AUTHORIZATION])
        .expose_headers([CONTENT_LENGTH])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    let gated = Router::new()
        .route("/completions", post(completions_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admission_middleware,
        ));

    Router::new()
        .route("/", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(gated)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let ping = tokio::time::timeout(HEALTH_PING_TIMEOUT, state.gate.store().ping()).await;

    let failure = match ping {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some(format!("ping timed out after {:?}", HEALTH_PING_TIMEOUT)),
    };

    match failure {
        None => Json(json!({
            "status": "healthy",
            "redis": "connected",
        }))
        .into_response(),
        Some(error) => {
            warn!(error = %error, "Health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "unhealthy",
                    "redis": "disconnected",
                    "error": error,
                })),
            )
                .into_response()
        }
    }
}

async fn metrics_handler() -> impl IntoResponse {
    metrics::render()
}

async fn completions_handler(
    State(state): State<AppState>,
    payload: Result<Json<CompletionRequest>, JsonRejection>,
) -> Response {
    let prompt = match payload {
        Ok(Json(req)) if !req.prompt.is_empty() => req.prompt,
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Invalid request body. 'prompt' field is required",
            )
        }
    };

    info!(prompt_len = prompt.len(), "Starting completion");

    match state.completions.complete(&prompt).await {
        Ok(Some(content)) => Json(CompletionResponse { content }).into_response(),
        Ok(None) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "No completion generated"),
        Err(e) => {
            error!(error = %e, "Completion provider failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate completion",
            )
        }
    }
}
