use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::database::record::RecordInput;
use crate::handlers::utils::{json_body, parse_id, require_affected, resolve_kind};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};

/// POST /api/:entity/create - 201 with the new id
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(entity): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let kind = resolve_kind(&entity)?;
    let input = RecordInput::for_create(kind, json_body(body)?)?;

    let id = state.repository(kind).create(input, &user.usuario).await?;
    Ok(ApiResponse::created(json!({ "id": id })))
}

/// PUT /api/:entity/update/:id
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((entity, id)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let kind = resolve_kind(&entity)?;
    let id = parse_id(&id)?;
    let input = RecordInput::for_update(kind, json_body(body)?)?;

    let affected = state.repository(kind).update(id, input, &user.usuario).await?;
    let affected = require_affected(kind, id, affected)?;
    Ok(ApiResponse::success(json!({ "rows_affected": affected })))
}

/// DELETE /api/:entity/delete/:id - soft delete
pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((entity, id)): Path<(String, String)>,
) -> ApiResult<Value> {
    let kind = resolve_kind(&entity)?;
    let id = parse_id(&id)?;

    let affected = state.repository(kind).soft_delete(id, &user.usuario).await?;
    let affected = require_affected(kind, id, affected)?;
    Ok(ApiResponse::success(json!({ "rows_affected": affected })))
}

/// PUT /api/:entity/restore/:id
pub async fn restore(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((entity, id)): Path<(String, String)>,
) -> ApiResult<Value> {
    let kind = resolve_kind(&entity)?;
    let id = parse_id(&id)?;

    let affected = state.repository(kind).restore(id, &user.usuario).await?;
    let affected = require_affected(kind, id, affected)?;
    Ok(ApiResponse::success(json!({ "rows_affected": affected })))
}
