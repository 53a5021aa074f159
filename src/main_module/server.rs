//! HTTP server initialization and routing

use axum::{routing::get, Router};
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::categories::configure_categories_routes;
use crate::core::shared::state::AppState;
use crate::ideas::configure_ideas_routes;
use crate::notifications::configure_notifications_routes;
use crate::security::create_cors_layer;
use crate::users::{configure_auth_routes, configure_users_routes};

use super::{health_check, shutdown_signal};

const BLACKLIST_SWEEP: Duration = Duration::from_secs(15 * 60);

pub fn build_router(app_state: Arc<AppState>) -> Router {
    let cors = create_cors_layer(&app_state.config.server);

    Router::new()
        .route("/health", get(health_check))
        .merge(configure_auth_routes())
        .merge(configure_users_routes())
        .merge(configure_categories_routes())
        .merge(configure_ideas_routes())
        .merge(configure_notifications_routes())
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn spawn_blacklist_sweeper(app_state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(BLACKLIST_SWEEP);
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = app_state.jwt_manager.cleanup_blacklist().await;
            if removed > 0 {
                debug!("Pruned {removed} revoked refresh tokens");
            }
        }
    });
}

pub async fn run_server(app_state: Arc<AppState>) -> std::io::Result<()> {
    let addr = app_state.config.bind_address();
    let app = build_router(Arc::clone(&app_state));
    spawn_blacklist_sweeper(app_state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {addr}: {e} - is another instance running?");
            return Err(e);
        }
    };
    info!("HTTP server listening on {addr}");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(std::io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AppConfig;
    use crate::core::shared::test_utils::{access_token, TestAppStateBuilder};
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn app() -> (Router, Arc<AppState>) {
        let state = Arc::new(TestAppStateBuilder::new().build());
        (build_router(Arc::clone(&state)), state)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let (app, _) = app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/users/me")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_garbage_token_is_rejected() {
        let (app, _) = app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/notifications")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_mismatch_rejected_before_storage() {
        let (app, _) = app();
        let payload = serde_json::json!({
            "username": "harbourview",
            "email": "harbourview@example.com",
            "password": "Granite-Lantern-42",
            "password_confirm": "Granite-Lantern-43"
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/auth/register")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(payload.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "validation_error");
        assert!(body["fields"]["password_confirm"].is_array());
    }

    #[tokio::test]
    async fn test_user_listing_is_staff_only() {
        let (app, state) = app();
        let token = access_token(&state, Uuid::new_v4(), false);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/users")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_category_writes_are_staff_only() {
        let (app, state) = app();
        let token = access_token(&state, Uuid::new_v4(), false);
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/categories")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"name": "Housing"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_configured_origin_passes_preflight() {
        let mut config = AppConfig::default();
        config.server.cors_allowed_origins = vec!["https://ideas.city.gov".to_string()];
        let state = Arc::new(TestAppStateBuilder::new().with_config(config).build());

        let response = build_router(state)
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/ideas")
                    .header(header::ORIGIN, "https://ideas.city.gov")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        let allowed = response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok());
        assert_eq!(allowed, Some("https://ideas.city.gov"));
    }
}
