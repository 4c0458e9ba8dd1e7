use axum::extract::{Path, State};
use serde_json::Value;

use crate::app::AppState;
use crate::database::record::Record;
use crate::error::ApiError;
use crate::handlers::utils::{parse_id, resolve_kind};
use crate::middleware::{ApiResponse, ApiResult};

/// GET /api/:entity/all - active records only
pub async fn list(State(state): State<AppState>, Path(entity): Path<String>) -> ApiResult<Value> {
    let kind = resolve_kind(&entity)?;
    let records = state.repository(kind).list_active().await?;
    Ok(ApiResponse::success(Record::to_json_array(kind, &records)))
}

/// GET /api/:entity/show/:id - soft-deleted records are only visible through all-adm
pub async fn show(State(state): State<AppState>, Path((entity, id)): Path<(String, String)>) -> ApiResult<Value> {
    let kind = resolve_kind(&entity)?;
    let id = parse_id(&id)?;

    match state.repository(kind).find(id).await?.filter(|r| r.estado) {
        Some(record) => Ok(ApiResponse::success(record.to_json(kind))),
        None => Err(ApiError::not_found(format!("{} {} not found", kind.label, id))),
    }
}
