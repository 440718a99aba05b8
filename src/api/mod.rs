use axum::{routing::get, Router};
use std::sync::Arc;

use crate::observability::metrics_handler;
use crate::state::AppState;

pub mod notifications;
pub mod system;

pub fn create_api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(system::health_check))
        .route("/metrics", get(metrics_handler))
        .merge(notifications::create_notifications_router(state))
}
