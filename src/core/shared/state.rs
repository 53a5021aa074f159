use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::core::shared::utils::DbPool;
use crate::security::{JwtManager, PasswordHasher2};

#[derive(Clone)]
pub struct AppState {
    pub conn: DbPool,
    pub config: Arc<AppConfig>,
    pub jwt_manager: Arc<JwtManager>,
    pub password_hasher: Arc<PasswordHasher2>,
}

impl AppState {
    pub fn new(
        conn: DbPool,
        config: AppConfig,
        jwt_manager: JwtManager,
        password_hasher: PasswordHasher2,
    ) -> Self {
        Self {
            conn,
            config: Arc::new(config),
            jwt_manager: Arc::new(jwt_manager),
            password_hasher: Arc::new(password_hasher),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("pool_state", &self.conn.state())
            .field("server", &self.config.server)
            .finish_non_exhaustive()
    }
}
