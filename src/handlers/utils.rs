use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde_json::Value;

use crate::database::entity::{self, EntityKind};
use crate::error::ApiError;

/// Resolve the `:entity` path segment to a known kind
pub fn resolve_kind(name: &str) -> Result<&'static EntityKind, ApiError> {
    entity::lookup(name).ok_or_else(|| ApiError::not_found(format!("Unknown entity '{}'", name)))
}

pub fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ApiError::bad_request(format!("Invalid id '{}': expected an integer", raw)))
}

/// Unwrap a JSON body, turning extractor rejections into API errors
pub fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::invalid_json(rejection.body_text()))
}

/// 404 for a mutation that matched no row
pub fn require_affected(kind: &EntityKind, id: i64, affected: u64) -> Result<u64, ApiError> {
    if affected == 0 {
        return Err(ApiError::not_found(format!("{} {} not found", kind.label, id)));
    }
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_entities_are_not_found() {
        assert!(resolve_kind("seccion").is_ok());
        assert_eq!(resolve_kind("alumno").unwrap_err().error_code(), "NOT_FOUND");
    }

    #[test]
    fn ids_must_be_integers() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert_eq!(parse_id("abc").unwrap_err().error_code(), "BAD_REQUEST");
    }

    #[test]
    fn zero_rows_affected_is_not_found() {
        let kind = resolve_kind("grado").unwrap();
        assert!(require_affected(kind, 9, 0).is_err());
        assert_eq!(require_affected(kind, 9, 1).unwrap(), 1);
    }
}
