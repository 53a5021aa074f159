use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use std::time::Duration;
use uuid::Uuid;

use crate::core::config::AppConfig;
use crate::core::shared::state::AppState;
use crate::security::{
    Argon2Config, JwtConfig, JwtManager, PasswordConfig, PasswordHasher2, TokenSubject, STAFF_ROLE,
};

pub const TEST_JWT_SECRET: &str = "test-secret-key-for-unit-tests-minimum-32-chars";

#[derive(Debug)]
pub struct TestAppStateBuilder {
    config: Option<AppConfig>,
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self { config: None }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// The pool is built lazily, so handlers that never touch the database
    /// work without a running server.
    pub fn build(self) -> AppState {
        let config = self.config.unwrap_or_default();
        let manager = ConnectionManager::<PgConnection>::new(config.database.url.clone());
        let pool = Pool::builder()
            .max_size(1)
            .connection_timeout(Duration::from_millis(250))
            .test_on_check_out(false)
            .build_unchecked(manager);

        let jwt = JwtManager::new(JwtConfig::from(&config.auth), TEST_JWT_SECRET)
            .expect("test JWT manager");
        let hasher = PasswordHasher2::new(Argon2Config::low_memory(), PasswordConfig::default())
            .expect("test password hasher");

        AppState::new(pool, config, jwt, hasher)
    }
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn access_token(state: &AppState, user_id: Uuid, staff: bool) -> String {
    let roles = if staff {
        vec![STAFF_ROLE.to_string()]
    } else {
        Vec::new()
    };
    state
        .jwt_manager
        .generate_token_pair(
            user_id,
            TokenSubject {
                email: Some("tester@example.com".to_string()),
                username: Some("tester".to_string()),
                roles,
            },
        )
        .expect("token pair")
        .access_token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_uses_given_config() {
        let mut config = AppConfig::default();
        config.server.port = 9123;
        let state = TestAppStateBuilder::new().with_config(config).build();
        assert_eq!(state.config.server.port, 9123);
    }

    #[test]
    fn test_access_token_carries_staff_role() {
        let state = TestAppStateBuilder::new().build();
        let token = access_token(&state, Uuid::new_v4(), true);
        let claims = state
            .jwt_manager
            .validate_access_token(&token)
            .expect("valid token");
        assert!(claims.has_role(STAFF_ROLE));
    }
}
