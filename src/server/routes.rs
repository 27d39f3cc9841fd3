/// API Routes definition

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::auth;
use super::handlers;
use super::websocket;
use super::AppState;

pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    // Protected routes (require authentication)
    let protected_routes = Router::new()
        .route("/api/profile/:id", post(handlers::profile))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_middleware));

    // Public routes (read-only, no auth required)
    let public_routes = Router::new()
        .route("/api/health", get(handlers::health_check))
        .route("/api/metrics", get(handlers::get_metrics))
        .route("/api/metrics/:id", get(handlers::get_container_metrics))
        .route("/ws", get(websocket::ws_handler));

    let mut app = Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if enable_cors {
        app = app.layer(CorsLayer::permissive());
    }

    app
}
