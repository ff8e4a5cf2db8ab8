use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::{ApiResult, AppState};
use crate::service::{EmergencyAccess, RecordView};
use crate::validation::RecordPayload;

#[derive(Debug, Deserialize)]
pub struct SubmitRecord {
    pub id: String,
    pub payload: RecordPayload,
}

#[derive(Debug, Deserialize)]
pub struct SetVisibility {
    pub id: String,
    pub visible: bool,
    #[serde(default)]
    pub payload: Option<RecordPayload>,
}

#[derive(Debug, Deserialize)]
pub struct EmergencyRequest {
    pub actor_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn submit(
    State(service): State<AppState>,
    body: Result<Json<SubmitRecord>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(request) = body?;
    let source = service.submit_record(&request.id, &request.payload).await?;
    Ok(Json(json!({ "id": request.id, "stored_in": source })))
}

pub async fn visibility(
    State(service): State<AppState>,
    body: Result<Json<SetVisibility>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(request) = body?;
    let notifications = service
        .set_visibility(&request.id, request.visible, request.payload.as_ref())
        .await?;
    Ok(Json(json!({
        "id": request.id,
        "visible": request.visible,
        "notifications": notifications
    })))
}

pub async fn list(State(service): State<AppState>) -> ApiResult<Vec<RecordView>> {
    Ok(Json(service.list_records().await?))
}

pub async fn emergency(
    State(service): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<EmergencyRequest>, JsonRejection>,
) -> ApiResult<EmergencyAccess> {
    let Json(request) = body?;
    let access = service
        .emergency_fetch(&id, &request.actor_id, request.reason.as_deref())
        .await?;
    Ok(Json(access))
}
