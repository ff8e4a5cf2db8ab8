//! HTTP API
//!
//! JSON routes over [`AccessService`]. Failures render as
//! `{"error": <generic message>}`; internal detail only goes to the log.

pub mod ledger;
pub mod records;

use axum::{
    extract::rejection::JsonRejection,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::error::LedgerError;
use crate::service::AccessService;

pub type AppState = Arc<AccessService>;

/// A [`LedgerError`] on its way out of a handler
#[derive(Debug)]
pub struct ApiError(pub LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(LedgerError::validation(rejection.body_text()))
    }
}

pub fn status_code(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
        LedgerError::Authorization => StatusCode::UNAUTHORIZED,
        LedgerError::NotFound(_) | LedgerError::Decryption(_) => StatusCode::NOT_FOUND,
        LedgerError::PersistenceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::ChainIntegrity { .. } | LedgerError::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_code(&self.0);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.public_message() }))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status_endpoint))
        .route("/records", post(records::submit).get(records::list))
        .route("/records/visibility", post(records::visibility))
        .route("/records/:id/emergency", post(records::emergency))
        .route("/ledger", post(ledger::read))
        .route("/ledger/verify", post(ledger::verify))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(service)
}

async fn health_check(State(service): State<AppState>) -> Json<serde_json::Value> {
    let status = if service.health().await {
        "healthy"
    } else {
        "degraded"
    };
    Json(json!({
        "status": status,
        "service": "access-ledger",
        "timestamp": chrono::Utc::now()
    }))
}

async fn status_endpoint(State(service): State<AppState>) -> ApiResult<serde_json::Value> {
    let status = service.status().await?;
    Ok(Json(json!({
        "service": "access-ledger",
        "timestamp": chrono::Utc::now(),
        "degraded": status.degraded,
        "ledger": {
            "head_source": status.head_source,
            "head_hash": status.head_hash,
            "fallback_entries": status.fallback_entries
        }
    })))
}
