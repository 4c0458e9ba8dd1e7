use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Json},
    routing::{delete, get, post, put},
    Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::database::entity::{EntityKind, ENTITY_KINDS};
use crate::database::repository::EntityRepository;
use crate::database::store::StoreGateway;
use crate::handlers;
use crate::middleware::{jwt_auth_middleware, require_admin};

/// Shared application state: the injected store gateway and the configuration
/// it was built with
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StoreGateway>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn StoreGateway>, config: AppConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    pub fn repository(&self, kind: &'static EntityKind) -> EntityRepository {
        EntityRepository::new(kind, self.store.clone()).with_policy(self.config.audit.inactive_policy)
    }
}

pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(public_routes())
        .merge(authenticated_routes(state.clone()))
        .merge(admin_routes(state.clone()))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.api.max_request_size_bytes));

    if state.config.security.enable_cors {
        router = router.layer(cors_layer(&state.config.security.cors_origins));
    }
    if state.config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router.with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

fn public_routes() -> Router<AppState> {
    use handlers::public;

    Router::new()
        .route("/api/:entity/all", get(public::list))
        .route("/api/:entity/show/:id", get(public::show))
}

fn authenticated_routes(state: AppState) -> Router<AppState> {
    use handlers::protected;

    Router::new()
        .route("/api/:entity/all-adm", get(protected::list_all))
        .route("/api/:entity/all-audit", get(protected::audit_trail))
        .route_layer(from_fn_with_state(state, jwt_auth_middleware))
}

fn admin_routes(state: AppState) -> Router<AppState> {
    use handlers::protected;

    Router::new()
        .route("/api/:entity/create", post(protected::create))
        .route("/api/:entity/update/:id", put(protected::update))
        .route("/api/:entity/delete/:id", delete(protected::delete))
        .route("/api/:entity/eliminar/estado/:id", put(protected::delete))
        .route("/api/:entity/restore/:id", put(protected::restore))
        // Layers run outermost-last: authenticate first, then check the role
        .route_layer(from_fn_with_state(state.clone(), require_admin))
        .route_layer(from_fn_with_state(state, jwt_auth_middleware))
}

async fn root() -> Json<Value> {
    let entities: Vec<&str> = ENTITY_KINDS.iter().map(|k| k.name).collect();

    Json(json!({
        "success": true,
        "data": {
            "name": "Aula API (Rust)",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Academic records with audited soft-delete mutations",
            "entities": entities,
            "endpoints": {
                "public": "GET /api/:entity/all, GET /api/:entity/show/:id",
                "authenticated": "GET /api/:entity/all-adm, GET /api/:entity/all-audit",
                "admin": "POST /api/:entity/create, PUT /api/:entity/update/:id, DELETE /api/:entity/delete/:id, PUT /api/:entity/eliminar/estado/:id, PUT /api/:entity/restore/:id",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": { "status": "ok", "timestamp": now, "database": "ok" }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "code": "SERVICE_UNAVAILABLE",
                    "data": { "status": "degraded", "timestamp": now }
                })),
            )
        }
    }
}
