use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::auth::AuthUser;
use crate::app::AppState;
use crate::error::ApiError;

/// Lets the request through only when the authenticated role is an admin role.
/// Must run after [`super::jwt_auth_middleware`].
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !state.config.security.is_admin(&user.rol) {
        tracing::warn!(
            "User '{}' with role '{}' denied {} {}",
            user.usuario,
            user.rol,
            request.method(),
            request.uri().path()
        );
        return Err(ApiError::forbidden(format!("Role '{}' may not modify records", user.rol)));
    }

    Ok(next.run(request).await)
}
