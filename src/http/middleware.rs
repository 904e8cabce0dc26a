//! Request-path admission middleware.

use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use super::routes::AppState;
use crate::admission::{Decision, Rejection};

/// Identity used when a request carries no resolvable origin.
pub const UNKNOWN_CLIENT: &str = "unknown";

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}

/// Run the admission gate ahead of the wrapped handler.
///
/// Preflight requests pass straight through. The evaluation runs on its own
/// task so a client disconnect cannot abandon a half-sent store batch.
pub async fn admission_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if req.method() == Method::OPTIONS {
        return next.run(req).await;
    }

    let client = state.resolver.resolve(&req).unwrap_or_else(|| {
        warn!("Could not resolve client address, counting as {}", UNKNOWN_CLIENT);
        UNKNOWN_CLIENT.to_string()
    });

    let gate = state.gate.clone();
    let decision = match tokio::spawn(async move { gate.evaluate(&client).await }).await {
        Ok(decision) => decision,
        Err(e) => {
            error!(error = %e, "Admission task failed");
            Decision::Reject(Rejection::StoreFailure)
        }
    };

    match decision {
        Decision::Admit => next.run(req).await,
        Decision::Reject(rejection) => rejection.into_response(),
    }
}
