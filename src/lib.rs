use axum::{middleware as axum_middleware, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod middleware;
pub mod notifications;
pub mod observability;
pub mod services;
pub mod state;

use api::create_api_router;
use observability::metrics_middleware;
use state::AppState;

pub fn create_app_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .merge(create_api_router(app_state.clone()))
        .with_state(app_state)
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
