use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};
use serde::Deserialize;

use crate::api::{ApiResult, AppState};
use crate::service::{LedgerAudit, LedgerPage};

#[derive(Debug, Deserialize)]
pub struct LedgerRead {
    pub secret: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LedgerVerify {
    pub secret: String,
}

pub async fn read(
    State(service): State<AppState>,
    body: Result<Json<LedgerRead>, JsonRejection>,
) -> ApiResult<LedgerPage> {
    let Json(request) = body?;
    let limit = request
        .limit
        .unwrap_or(service.config().auditor.ledger_read_limit);
    Ok(Json(service.read_ledger(&request.secret, limit).await?))
}

pub async fn verify(
    State(service): State<AppState>,
    body: Result<Json<LedgerVerify>, JsonRejection>,
) -> ApiResult<LedgerAudit> {
    let Json(request) = body?;
    Ok(Json(service.verify_ledger(&request.secret).await?))
}
