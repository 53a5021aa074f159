#[cfg(test)]
mod auth_http_tests {
    use axum::body::{Body, Bytes};
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use civicideas::core::config::AppConfig;
    use civicideas::core::shared::schema::users as users_table;
    use civicideas::core::shared::utils::{establish_pg_connection, run_migrations};
    use civicideas::core::shared::AppState;
    use civicideas::main_module::build_router;
    use civicideas::security::{
        Argon2Config, JwtConfig, JwtManager, PasswordConfig, PasswordHasher2, TokenPair,
        STAFF_ROLE,
    };
    use civicideas::users::models::RegisterRequest;
    use civicideas::users::service as users;
    use civicideas::users::User;
    use diesel::prelude::*;
    use diesel::r2d2::{ConnectionManager, Pool, TestCustomizer};
    use diesel::PgConnection;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    const SECRET: &str = "integration-secret-at-least-32-characters";

    /// One pooled connection inside a never-committed transaction, shared by
    /// the test body and every handler it calls.
    fn test_state() -> Option<Arc<AppState>> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            println!("Skipping test - DATABASE_URL not set");
            return None;
        };
        let mut conn = match establish_pg_connection(&url) {
            Ok(conn) => conn,
            Err(e) => {
                println!("Skipping test - database not available: {e}");
                return None;
            }
        };
        if let Err(e) = run_migrations(&mut conn) {
            println!("Skipping test - migrations failed: {e}");
            return None;
        }

        let pool = match Pool::builder()
            .max_size(1)
            .connection_customizer(Box::new(TestCustomizer))
            .build(ConnectionManager::<PgConnection>::new(url))
        {
            Ok(pool) => pool,
            Err(e) => {
                println!("Skipping test - pool not available: {e}");
                return None;
            }
        };

        let jwt = JwtManager::new(JwtConfig::default(), SECRET).expect("jwt");
        let hasher = PasswordHasher2::new(Argon2Config::low_memory(), PasswordConfig::default())
            .expect("hasher");
        Some(Arc::new(AppState::new(pool, AppConfig::default(), jwt, hasher)))
    }

    fn register(state: &AppState, name: &str) -> User {
        let username = format!("{name}{}", &Uuid::new_v4().simple().to_string()[..8]);
        let request = RegisterRequest {
            email: format!("{username}@example.com"),
            username,
            first_name: String::new(),
            last_name: String::new(),
            password: "Granite-Lantern-42".to_string(),
            password_confirm: "Granite-Lantern-42".to_string(),
        };
        let mut conn = state.conn.get().expect("connection");
        users::register(&mut conn, &state.password_hasher, &request).expect("register")
    }

    fn set_flags(state: &AppState, user_id: Uuid, is_active: bool, is_staff: bool) -> User {
        let mut conn = state.conn.get().expect("connection");
        diesel::update(users_table::table.find(user_id))
            .set((
                users_table::is_active.eq(is_active),
                users_table::is_staff.eq(is_staff),
            ))
            .returning(User::as_returning())
            .get_result(&mut conn)
            .expect("update flags")
    }

    fn tokens_for(state: &AppState, user: &User) -> TokenPair {
        state
            .jwt_manager
            .generate_token_pair(user.id, users::token_subject(user))
            .expect("token pair")
    }

    async fn post(app: &Router, uri: &str, payload: serde_json::Value) -> (StatusCode, Bytes) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(payload.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        (status, bytes)
    }

    #[tokio::test]
    async fn test_password_reset_response_is_uniform() {
        let Some(state) = test_state() else { return };
        let known = register(&state, "kim");
        let app = build_router(Arc::clone(&state));

        let (known_status, known_body) = post(
            &app,
            "/api/auth/password/reset",
            serde_json::json!({ "email": known.email }),
        )
        .await;
        let (unknown_status, unknown_body) = post(
            &app,
            "/api/auth/password/reset",
            serde_json::json!({ "email": "nobody-registered@example.com" }),
        )
        .await;

        assert_eq!(known_status, StatusCode::OK);
        assert_eq!(known_status, unknown_status);
        assert_eq!(known_body, unknown_body);
    }

    #[tokio::test]
    async fn test_refresh_refused_for_deactivated_account() {
        let Some(state) = test_state() else { return };
        let user = register(&state, "lee");
        let pair = tokens_for(&state, &user);
        set_flags(&state, user.id, false, false);
        let app = build_router(Arc::clone(&state));

        let (status, _) = post(
            &app,
            "/api/auth/refresh",
            serde_json::json!({ "refresh": pair.refresh_token }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_reflects_current_roles_and_is_single_use() {
        let Some(state) = test_state() else { return };
        let user = register(&state, "max");
        let staff = set_flags(&state, user.id, true, true);
        let pair = tokens_for(&state, &staff);
        set_flags(&state, user.id, true, false);
        let app = build_router(Arc::clone(&state));

        let (status, body) = post(
            &app,
            "/api/auth/refresh",
            serde_json::json!({ "refresh": pair.refresh_token }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let refreshed: TokenPair = serde_json::from_slice(&body).expect("token pair");
        let claims = state
            .jwt_manager
            .validate_access_token(&refreshed.access_token)
            .expect("valid access token");
        assert!(!claims.has_role(STAFF_ROLE));

        state.jwt_manager.cleanup_blacklist().await;
        let (replay, _) = post(
            &app,
            "/api/auth/refresh",
            serde_json::json!({ "refresh": pair.refresh_token }),
        )
        .await;
        assert_eq!(replay, StatusCode::UNAUTHORIZED);
    }
}
