//! Bearer-token identity extraction for handlers.

use axum::{extract::FromRequestParts, http::header, http::request::Parts};
use std::sync::Arc;
use uuid::Uuid;

use super::jwt::{extract_bearer_token, Claims};
use crate::core::shared::{ApiError, AppState};

pub const STAFF_ROLE: &str = "staff";

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
    pub is_staff: bool,
    pub claims: Claims,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: Claims) -> Result<Self, ApiError> {
        let user_id = claims
            .user_id()
            .map_err(|_| ApiError::Unauthenticated("Invalid token subject".to_string()))?;
        Ok(Self {
            user_id,
            username: claims.username.clone().unwrap_or_default(),
            is_staff: claims.has_role(STAFF_ROLE),
            claims,
        })
    }

    pub fn require_staff(&self) -> Result<(), ApiError> {
        if self.is_staff {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "You do not have permission to perform this action.".to_string(),
            ))
        }
    }
}

fn bearer_from_parts(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
}

impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_from_parts(parts).ok_or_else(|| {
            ApiError::Unauthenticated("Authentication credentials were not provided.".to_string())
        })?;

        let claims = state
            .jwt_manager
            .validate_access_token(token)
            .map_err(|_| ApiError::Unauthenticated("Given token not valid".to_string()))?;

        Self::from_claims(claims)
    }
}

/// Identity when a valid bearer token is present; anonymous otherwise.
#[derive(Debug, Clone)]
pub struct OptionalAuth(pub Option<AuthenticatedUser>);

impl OptionalAuth {
    pub fn user_id(&self) -> Option<Uuid> {
        self.0.as_ref().map(|user| user.user_id)
    }

    pub fn is_staff(&self) -> bool {
        self.0.as_ref().is_some_and(|user| user.is_staff)
    }
}

impl FromRequestParts<Arc<AppState>> for OptionalAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match AuthenticatedUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(OptionalAuth(Some(user))),
            Err(_) => Ok(OptionalAuth(None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::jwt::{JwtConfig, JwtManager, TokenSubject};

    fn create_test_manager() -> JwtManager {
        JwtManager::new(
            JwtConfig::default(),
            "this-is-a-very-long-secret-key-for-testing-purposes-only",
        )
        .expect("Failed to create manager")
    }

    #[test]
    fn test_staff_role_from_claims() {
        let manager = create_test_manager();
        let user_id = Uuid::new_v4();
        let pair = manager
            .generate_token_pair(
                user_id,
                TokenSubject {
                    username: Some("moderator".into()),
                    roles: vec![STAFF_ROLE.into()],
                    ..TokenSubject::default()
                },
            )
            .expect("Failed to generate");

        let claims = manager
            .validate_access_token(&pair.access_token)
            .expect("valid token");
        let user = AuthenticatedUser::from_claims(claims).expect("user");

        assert_eq!(user.user_id, user_id);
        assert_eq!(user.username, "moderator");
        assert!(user.require_staff().is_ok());
    }

    #[test]
    fn test_non_staff_is_forbidden() {
        let manager = create_test_manager();
        let pair = manager
            .generate_token_pair(Uuid::new_v4(), TokenSubject::default())
            .expect("Failed to generate");
        let claims = manager
            .validate_access_token(&pair.access_token)
            .expect("valid token");
        let user = AuthenticatedUser::from_claims(claims).expect("user");

        assert!(matches!(user.require_staff(), Err(ApiError::Forbidden(_))));
    }
}
