use axum::extract::{Path, State};
use serde_json::Value;

use crate::app::AppState;
use crate::database::audit::AuditEntry;
use crate::database::record::Record;
use crate::handlers::utils::resolve_kind;
use crate::middleware::{ApiResponse, ApiResult};

/// GET /api/:entity/all-adm - every record, soft-deleted ones included
pub async fn list_all(State(state): State<AppState>, Path(entity): Path<String>) -> ApiResult<Value> {
    let kind = resolve_kind(&entity)?;
    let records = state.repository(kind).list_all().await?;
    Ok(ApiResponse::success(Record::to_json_array(kind, &records)))
}

/// GET /api/:entity/all-audit - the audit trail in insertion order
pub async fn audit_trail(State(state): State<AppState>, Path(entity): Path<String>) -> ApiResult<Value> {
    let kind = resolve_kind(&entity)?;
    let entries = state.repository(kind).list_audit_trail().await?;
    Ok(ApiResponse::success(AuditEntry::to_json_array(kind, &entries)))
}
