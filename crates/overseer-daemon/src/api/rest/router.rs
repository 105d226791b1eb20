//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Worker registry
        .route("/workers", get(handlers::list_workers))
        .route("/workers/:uuid", get(handlers::get_worker))
        // Deployment metadata
        .route("/deployments", get(handlers::list_deployments))
        .route("/deployments", post(handlers::create_deployment))
        .route(
            "/deployments/:build_number",
            delete(handlers::delete_deployment),
        )
        // Broker ingress and egress
        .route("/messages", post(handlers::submit_message))
        .route("/responses/stream", get(handlers::stream_responses));

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
