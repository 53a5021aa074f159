use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::config::AuthSettings;

const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub action_token_expiry_minutes: i64,
    pub leeway_seconds: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            issuer: "civicideas".into(),
            audience: "civicideas-api".into(),
            access_token_expiry_minutes: 60,
            refresh_token_expiry_days: 7,
            action_token_expiry_minutes: 60 * 24,
            leeway_seconds: 60,
        }
    }
}

impl From<&AuthSettings> for JwtConfig {
    fn from(settings: &AuthSettings) -> Self {
        Self {
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            access_token_expiry_minutes: settings.access_token_minutes,
            refresh_token_expiry_days: settings.refresh_token_days,
            action_token_expiry_minutes: settings.action_token_minutes,
            ..Self::default()
        }
    }
}

/// Purpose a token was minted for. Action tokens (reset, verification) are
/// never accepted as bearer credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    Access,
    Refresh,
    PasswordReset,
    EmailVerification,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::PasswordReset => "password_reset",
            Self::EmailVerification => "email_verification",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
    pub jti: String,
    #[serde(rename = "type")]
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    /// Binds an action token to the credential state it was issued against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl Claims {
    pub fn new(
        user_id: Uuid,
        issuer: &str,
        audience: &str,
        token_type: TokenType,
        expiry: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            iss: issuer.to_string(),
            aud: audience.to_string(),
            exp: expiry.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type: token_type.as_str().to_string(),
            email: None,
            username: None,
            roles: None,
            fingerprint: None,
        }
    }

    pub fn with_email(mut self, email: String) -> Self {
        self.email = Some(email);
        self
    }

    pub fn with_username(mut self, username: String) -> Self {
        self.username = Some(username);
        self
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = Some(roles);
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: String) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|e| anyhow!("Invalid user ID in claims: {e}"))
    }

    pub fn is_type(&self, token_type: TokenType) -> bool {
        self.token_type == token_type.as_str()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles
            .as_ref()
            .is_some_and(|roles| roles.iter().any(|r| r == role))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
}

/// Identity fields copied into access tokens.
#[derive(Debug, Clone, Default)]
pub struct TokenSubject {
    pub email: Option<String>,
    pub username: Option<String>,
    pub roles: Vec<String>,
}

pub struct JwtManager {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    /// Revoked token ids mapped to the expiry of the token they belong to.
    blacklist: Arc<RwLock<HashMap<String, i64>>>,
}

impl JwtManager {
    pub fn new(config: JwtConfig, secret: &str) -> Result<Self> {
        if secret.len() < 32 {
            return Err(anyhow!("JWT secret must be at least 32 characters"));
        }
        Ok(Self {
            config,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            blacklist: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    fn encode_claims(&self, claims: &Claims) -> Result<String> {
        let header = Header::new(ALGORITHM);
        encode(&header, claims, &self.encoding_key)
            .map_err(|e| anyhow!("Failed to encode {} token: {e}", claims.token_type))
    }

    pub fn generate_token_pair(&self, user_id: Uuid, subject: TokenSubject) -> Result<TokenPair> {
        let now = Utc::now();
        let access_expiry = now + Duration::minutes(self.config.access_token_expiry_minutes);
        let refresh_expiry = now + Duration::days(self.config.refresh_token_expiry_days);

        let mut access_claims = Claims::new(
            user_id,
            &self.config.issuer,
            &self.config.audience,
            TokenType::Access,
            access_expiry,
        )
        .with_roles(subject.roles.clone());
        let mut refresh_claims = Claims::new(
            user_id,
            &self.config.issuer,
            &self.config.audience,
            TokenType::Refresh,
            refresh_expiry,
        )
        .with_roles(subject.roles);

        if let Some(email) = subject.email {
            access_claims = access_claims.with_email(email.clone());
            refresh_claims = refresh_claims.with_email(email);
        }
        if let Some(username) = subject.username {
            access_claims = access_claims.with_username(username.clone());
            refresh_claims = refresh_claims.with_username(username);
        }

        Ok(TokenPair {
            access_token: self.encode_claims(&access_claims)?,
            refresh_token: self.encode_claims(&refresh_claims)?,
            token_type: "Bearer".into(),
            expires_in: self.config.access_token_expiry_minutes * 60,
            refresh_expires_in: self.config.refresh_token_expiry_days * 24 * 60 * 60,
        })
    }

    /// Mints a single-purpose token (password reset, email verification).
    pub fn generate_action_token(
        &self,
        user_id: Uuid,
        token_type: TokenType,
        fingerprint: Option<String>,
    ) -> Result<String> {
        if matches!(token_type, TokenType::Access | TokenType::Refresh) {
            return Err(anyhow!("{} is not an action token type", token_type.as_str()));
        }
        let expiry = Utc::now() + Duration::minutes(self.config.action_token_expiry_minutes);
        let mut claims = Claims::new(
            user_id,
            &self.config.issuer,
            &self.config.audience,
            token_type,
            expiry,
        );
        if let Some(fingerprint) = fingerprint {
            claims = claims.with_fingerprint(fingerprint);
        }
        self.encode_claims(&claims)
    }

    pub fn validate_token(&self, token: &str) -> Result<TokenData<Claims>> {
        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);
        validation.leeway = self.config.leeway_seconds;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow!("Token validation failed: {e}"))
    }

    pub fn validate_typed(&self, token: &str, token_type: TokenType) -> Result<Claims> {
        let token_data = self.validate_token(token)?;
        if !token_data.claims.is_type(token_type) {
            return Err(anyhow!("Token is not a {} token", token_type.as_str()));
        }
        Ok(token_data.claims)
    }

    pub fn validate_access_token(&self, token: &str) -> Result<Claims> {
        self.validate_typed(token, TokenType::Access)
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims> {
        self.validate_typed(token, TokenType::Refresh)
    }

    /// Marks a validated refresh token as spent. Fails when it was already
    /// spent, so each refresh token yields at most one new pair.
    pub async fn consume_refresh_token(&self, claims: &Claims) -> Result<()> {
        if !claims.is_type(TokenType::Refresh) {
            return Err(anyhow!("Token is not a refresh token"));
        }
        let mut blacklist = self.blacklist.write().await;
        if blacklist.contains_key(&claims.jti) {
            return Err(anyhow!("Refresh token has been revoked"));
        }
        blacklist.insert(claims.jti.clone(), claims.exp);
        debug!("Revoked refresh token {}", claims.jti);
        Ok(())
    }

    pub async fn is_revoked(&self, jti: &str) -> bool {
        let blacklist = self.blacklist.read().await;
        blacklist.contains_key(jti)
    }

    /// Drops revocations for tokens past their expiry plus leeway.
    pub async fn cleanup_blacklist(&self) -> usize {
        let cutoff = Utc::now().timestamp() - i64::try_from(self.config.leeway_seconds).unwrap_or(0);
        let mut blacklist = self.blacklist.write().await;
        let before = blacklist.len();
        blacklist.retain(|_, expires_at| *expires_at >= cutoff);
        let removed = before - blacklist.len();
        if removed > 0 {
            info!("Cleaned up {removed} expired entries from token blacklist");
        }
        removed
    }
}

pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_manager() -> JwtManager {
        JwtManager::new(
            JwtConfig::default(),
            "this-is-a-very-long-secret-key-for-testing-purposes-only",
        )
            .expect("Failed to create manager")
    }

    fn subject() -> TokenSubject {
        TokenSubject {
            email: Some("ada@example.com".into()),
            username: Some("ada".into()),
            roles: vec!["staff".into()],
        }
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(JwtManager::new(JwtConfig::default(), "short").is_err());
    }

    #[test]
    fn test_access_token_round_trip() {
        let manager = create_test_manager();
        let user_id = Uuid::new_v4();

        let pair = manager
            .generate_token_pair(user_id, subject())
            .expect("Failed to generate");
        assert_eq!(pair.token_type, "Bearer");

        let claims = manager
            .validate_access_token(&pair.access_token)
            .expect("Validation failed");
        assert_eq!(claims.user_id().expect("Invalid user ID"), user_id);
        assert_eq!(claims.username.as_deref(), Some("ada"));
        assert!(claims.has_role("staff"));
    }

    #[test]
    fn test_token_types_are_not_interchangeable() {
        let manager = create_test_manager();
        let user_id = Uuid::new_v4();
        let pair = manager
            .generate_token_pair(user_id, TokenSubject::default())
            .expect("Failed to generate");

        assert!(manager.validate_access_token(&pair.refresh_token).is_err());
        assert!(manager.validate_refresh_token(&pair.access_token).is_err());

        let reset = manager
            .generate_action_token(user_id, TokenType::PasswordReset, Some("salt".into()))
            .expect("Failed to generate reset token");
        assert!(manager.validate_access_token(&reset).is_err());
        let claims = manager
            .validate_typed(&reset, TokenType::PasswordReset)
            .expect("reset token should validate");
        assert_eq!(claims.fingerprint.as_deref(), Some("salt"));
    }

    #[test]
    fn test_action_token_rejects_session_types() {
        let manager = create_test_manager();
        assert!(manager
            .generate_action_token(Uuid::new_v4(), TokenType::Access, None)
            .is_err());
    }

    #[test]
    fn test_invalid_token() {
        let manager = create_test_manager();
        assert!(manager.validate_token("invalid.token.here").is_err());
    }

    #[tokio::test]
    async fn test_refresh_token_is_single_use() {
        let manager = create_test_manager();
        let pair = manager
            .generate_token_pair(Uuid::new_v4(), subject())
            .expect("Failed to generate");
        let claims = manager
            .validate_refresh_token(&pair.refresh_token)
            .expect("valid refresh token");

        manager
            .consume_refresh_token(&claims)
            .await
            .expect("first use succeeds");
        assert!(manager.is_revoked(&claims.jti).await);
        assert!(manager.consume_refresh_token(&claims).await.is_err());
    }

    #[tokio::test]
    async fn test_sweep_keeps_live_revocations() {
        let manager = create_test_manager();
        let pair = manager
            .generate_token_pair(Uuid::new_v4(), subject())
            .expect("Failed to generate");
        let claims = manager
            .validate_refresh_token(&pair.refresh_token)
            .expect("valid refresh token");
        manager
            .consume_refresh_token(&claims)
            .await
            .expect("first use succeeds");

        assert_eq!(manager.cleanup_blacklist().await, 0);
        assert!(manager.consume_refresh_token(&claims).await.is_err());
    }

    #[tokio::test]
    async fn test_sweep_drops_expired_revocations() {
        let manager = create_test_manager();
        let config = JwtConfig::default();
        let expired = Claims::new(
            Uuid::new_v4(),
            &config.issuer,
            &config.audience,
            TokenType::Refresh,
            Utc::now() - Duration::hours(1),
        );
        let live = Claims::new(
            Uuid::new_v4(),
            &config.issuer,
            &config.audience,
            TokenType::Refresh,
            Utc::now() + Duration::hours(1),
        );
        manager.consume_refresh_token(&expired).await.expect("expired");
        manager.consume_refresh_token(&live).await.expect("live");

        assert_eq!(manager.cleanup_blacklist().await, 1);
        assert!(!manager.is_revoked(&expired.jti).await);
        assert!(manager.is_revoked(&live.jti).await);
    }

    #[tokio::test]
    async fn test_access_token_cannot_be_consumed_as_refresh() {
        let manager = create_test_manager();
        let pair = manager
            .generate_token_pair(Uuid::new_v4(), subject())
            .expect("Failed to generate");
        let access = manager
            .validate_access_token(&pair.access_token)
            .expect("valid access token");
        assert!(manager.consume_refresh_token(&access).await.is_err());
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(extract_bearer_token("bearer abc"), Some("abc"));
        assert_eq!(extract_bearer_token("Basic abc"), None);
        assert_eq!(extract_bearer_token("Bearer "), None);
    }
}
