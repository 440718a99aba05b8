use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    pub notifications: &'static str,
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let database = match &state.database {
        Some(db) => match db.health_check().await {
            Ok(()) => "healthy",
            Err(e) => {
                warn!("Database health check failed: {}", e);
                "unhealthy"
            }
        },
        None => "not_configured",
    };

    let notifications = if state.notifications.is_closed() {
        "closing"
    } else {
        "open"
    };

    let healthy = database != "unhealthy" && notifications == "open";
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "degraded" },
            version: env!("CARGO_PKG_VERSION"),
            database,
            notifications,
        }),
    )
}
