//! Notifications API
//!
//! Member endpoints (JWT with the `features` scope):
//! - register a device for push
//! - report delivery/read status
//! - list and delete received notifications
//!
//! Admin endpoint (API key):
//! - push a message to a topic or a filtered audience

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Extension, Path, Query, State,
    },
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use shared::{ApiResponse, AppError};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::{
    middleware::{require_admin, require_member, CurrentMember},
    notifications::{ClientNotificationStatus, MemberNotificationListItem, Message, RegisterFcmTokenRequest},
    observability::record_notification_api_request,
    state::AppState,
};

type ResponseJson<T> = Result<Json<ApiResponse<T>>, AppError>;

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    pub page: Option<i64>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PushAccepted {
    pub notification_id: i64,
}

pub fn create_notifications_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let member_routes = Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/:notif_id", delete(delete_notification))
        .route("/notifications/member_fcm_tokens", post(register_fcm_token))
        .route("/notifications/status", post(update_notification_status))
        .route_layer(from_fn_with_state(state.clone(), require_member));

    let admin_routes = Router::new()
        .route("/admin/notifications/push", post(push_notification))
        .route_layer(from_fn_with_state(state, require_admin));

    member_routes.merge(admin_routes)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|e| AppError::bad_request(e.body_text()))
}

fn track<T>(endpoint: &str, result: Result<T, AppError>) -> Result<T, AppError> {
    record_notification_api_request(endpoint, result.is_ok());
    result
}

/// POST /notifications/member_fcm_tokens
pub async fn register_fcm_token(
    State(state): State<Arc<AppState>>,
    Extension(CurrentMember(member)): Extension<CurrentMember>,
    payload: Result<Json<RegisterFcmTokenRequest>, JsonRejection>,
) -> ResponseJson<()> {
    let result: ResponseJson<()> = async {
        let request = body(payload)?;
        request
            .validate()
            .map_err(|e| AppError::validation(e.to_string()))?;

        state
            .notifications
            .save_fcm_token(request.into_token(member))
            .await?;

        Ok(Json(ApiResponse::ok("success", None)))
    }
    .await;

    track("register_fcm_token", result)
}

/// POST /notifications/status
pub async fn update_notification_status(
    State(state): State<Arc<AppState>>,
    Extension(CurrentMember(member)): Extension<CurrentMember>,
    payload: Result<Json<ClientNotificationStatus>, JsonRejection>,
) -> ResponseJson<()> {
    let result: ResponseJson<()> = async {
        let status = body(payload)?;
        state
            .notifications
            .set_member_notification_status(member, status)
            .await?;

        Ok(Json(ApiResponse::ok("success", None)))
    }
    .await;

    track("update_notification_status", result)
}

/// GET /notifications?page=&page_size=
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Extension(CurrentMember(member)): Extension<CurrentMember>,
    query: Result<Query<ListNotificationsQuery>, QueryRejection>,
) -> ResponseJson<Vec<MemberNotificationListItem>> {
    let result: ResponseJson<Vec<MemberNotificationListItem>> = async {
        let Query(params) = query.map_err(|e| AppError::bad_request(e.body_text()))?;

        let list = state
            .notifications
            .get_member_notification_list(
                member,
                params.page.unwrap_or(1),
                params.page_size.unwrap_or(0),
            )
            .await?;

        Ok(Json(ApiResponse::ok("", Some(list))))
    }
    .await;

    track("list_notifications", result)
}

/// DELETE /notifications/:notif_id
pub async fn delete_notification(
    State(state): State<Arc<AppState>>,
    Extension(CurrentMember(member)): Extension<CurrentMember>,
    notif_id: Result<Path<i64>, PathRejection>,
) -> ResponseJson<()> {
    let result: ResponseJson<()> = async {
        let Path(notif_id) = notif_id.map_err(|e| AppError::bad_request(e.body_text()))?;

        state
            .notifications
            .delete_member_notification(member, notif_id)
            .await?;

        Ok(Json(ApiResponse::ok("success", None)))
    }
    .await;

    track("delete_notification", result)
}

/// POST /admin/notifications/push
pub async fn push_notification(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Message>, JsonRejection>,
) -> ResponseJson<PushAccepted> {
    let result: ResponseJson<PushAccepted> = async {
        let message = body(payload)?;
        let stored = state.notifications.push(message).await?;

        info!(msg_id = stored.id, "push notification queued");
        Ok(Json(ApiResponse::ok(
            "success",
            Some(PushAccepted {
                notification_id: stored.id,
            }),
        )))
    }
    .await;

    track("push_notification", result)
}
