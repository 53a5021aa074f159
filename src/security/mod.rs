pub mod auth;
pub mod cors;
pub mod jwt;
pub mod password;
pub mod validation;

pub use auth::{AuthenticatedUser, OptionalAuth, STAFF_ROLE};
pub use cors::{create_cors_layer, CorsConfig};
pub use jwt::{
    extract_bearer_token, Claims, JwtConfig, JwtManager, TokenPair, TokenSubject,
    TokenType,
};
pub use password::{
    hash_fingerprint, Argon2Config, PasswordConfig, PasswordHasher2, PasswordIssue, UserAttributes,
};
pub use validation::{normalize_email, Validator};
