pub mod models;
pub mod service;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::{with_conn, ApiJson, ApiQuery, ApiResult, AppState, Page, PageParams};
use crate::security::AuthenticatedUser;

pub use models::{
    DeliveryChannels, NewNotification, Notification, NotificationPreference, NotificationResponse,
    NotificationTarget,
};
pub use service::create_notification;

use models::{NotificationListQuery, UpdatePreferencesRequest};

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<NotificationListQuery>,
) -> ApiResult<Json<Page<NotificationResponse>>> {
    let page = PageParams::new(query.limit, query.offset);
    let result = with_conn(&state.conn, move |conn| {
        service::list_notifications(conn, user.user_id, query.unread_only, page)
    })
    .await?;
    Ok(Json(result.map(NotificationResponse::from)))
}

pub async fn unread_count(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Value>> {
    let count = with_conn(&state.conn, move |conn| {
        service::unread_count(conn, user.user_id)
    })
    .await?;
    Ok(Json(json!({ "unread_count": count })))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(notification_id): Path<Uuid>,
) -> ApiResult<Json<NotificationResponse>> {
    let notification = with_conn(&state.conn, move |conn| {
        service::mark_as_read(conn, user.user_id, notification_id)
    })
    .await?;
    Ok(Json(notification.into()))
}

pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Value>> {
    let updated = with_conn(&state.conn, move |conn| {
        service::mark_all_read(conn, user.user_id)
    })
    .await?;
    Ok(Json(json!({ "marked_read": updated })))
}

pub async fn get_preferences(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<Json<NotificationPreference>> {
    let prefs = with_conn(&state.conn, move |conn| {
        service::get_or_create_preferences(conn, user.user_id)
    })
    .await?;
    Ok(Json(prefs))
}

pub async fn update_preferences(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    ApiJson(req): ApiJson<UpdatePreferencesRequest>,
) -> ApiResult<Json<NotificationPreference>> {
    let prefs = with_conn(&state.conn, move |conn| {
        service::update_preferences(conn, user.user_id, &req)
    })
    .await?;
    Ok(Json(prefs))
}

pub fn configure_notifications_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route(
            "/api/notifications/preferences",
            get(get_preferences).put(update_preferences),
        )
        .route("/api/notifications/{id}/read", post(mark_read))
}
