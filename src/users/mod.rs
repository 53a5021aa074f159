//! Accounts: registration, token issue, password flows, and profiles.

pub mod models;
pub mod service;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use log::{debug, info};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::shared::{with_conn, ApiError, ApiJson, ApiQuery, ApiResult, AppState, Page};
use crate::security::{AuthenticatedUser, TokenPair, Validator};

pub use models::{User, UserProfile, UserResponse, UserSummary};

use models::{
    ChangePasswordRequest, EmailVerifyConfirmRequest, LoginRequest, PasswordResetConfirmRequest,
    PasswordResetRequest, ProfileResponse, PublicUserResponse, RefreshRequest, RegisterRequest,
    UpdateProfileRequest, UpdateUserRequest, UserListQuery, VerifyTokenRequest,
};

const TOKEN_REJECTED: &str = "Token is invalid or expired";

pub const PASSWORD_RESET_SENT: &str =
    "If an account exists with this email, a password reset link has been sent.";

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

fn issue_tokens(state: &AppState, user: &User) -> ApiResult<TokenPair> {
    state
        .jwt_manager
        .generate_token_pair(user.id, service::token_subject(user))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    service::validate_registration(&state.password_hasher, &req)?;

    let hasher = state.password_hasher.clone();
    let (user, response) = with_conn(&state.conn, move |conn| {
        let user = service::register(conn, &hasher, &req)?;
        let response = service::user_response(conn, user.clone())?;
        Ok((user, response))
    })
    .await?;

    let tokens = issue_tokens(&state, &user)?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: response,
            tokens,
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let hasher = state.password_hasher.clone();
    let (user, response) = with_conn(&state.conn, move |conn| {
        let user = service::authenticate(conn, &hasher, &req.email, &req.password)?;
        let response = service::user_response(conn, user.clone())?;
        Ok((user, response))
    })
    .await?;

    let tokens = issue_tokens(&state, &user)?;
    info!("User {} logged in", user.id);
    Ok(Json(AuthResponse {
        user: response,
        tokens,
    }))
}

/// Rotates a refresh token. The account is reloaded so deactivation and role
/// changes take effect on the next refresh.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let rejected = || ApiError::Unauthenticated(TOKEN_REJECTED.to_string());
    let claims = state
        .jwt_manager
        .validate_refresh_token(&req.refresh)
        .map_err(|_| rejected())?;
    if state.jwt_manager.is_revoked(&claims.jti).await {
        return Err(rejected());
    }
    let user_id = claims.user_id().map_err(|_| rejected())?;

    let user = with_conn(&state.conn, move |conn| service::refresh_account(conn, user_id)).await?;
    state
        .jwt_manager
        .consume_refresh_token(&claims)
        .await
        .map_err(|_| rejected())?;

    let pair = issue_tokens(&state, &user)?;
    debug!("Refreshed tokens for user {user_id}");
    Ok(Json(pair))
}

pub async fn verify(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<VerifyTokenRequest>,
) -> ApiResult<Json<Value>> {
    let data = state
        .jwt_manager
        .validate_token(&req.token)
        .map_err(|_| ApiError::Unauthenticated(TOKEN_REJECTED.to_string()))?;
    Ok(Json(json!({
        "valid": true,
        "token_type": data.claims.token_type,
        "expires_at": data.claims.exp,
    })))
}

pub async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<PasswordResetRequest>,
) -> ApiResult<Json<Value>> {
    Validator::new().email("email", &req.email).validate()?;

    let jwt = state.jwt_manager.clone();
    let ticket = with_conn(&state.conn, move |conn| {
        service::request_password_reset(conn, &jwt, &req.email)
    })
    .await?;

    if let Some(ticket) = ticket {
        info!("Password reset issued for user {}", ticket.user_id);
        debug!(
            "Reset link for {}: {}/reset-password?uid={}&token={}",
            ticket.email, state.config.server.base_url, ticket.user_id, ticket.token
        );
    }

    Ok(Json(json!({ "message": PASSWORD_RESET_SENT })))
}

pub async fn confirm_password_reset(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<PasswordResetConfirmRequest>,
) -> ApiResult<Json<Value>> {
    let hasher = state.password_hasher.clone();
    let jwt = state.jwt_manager.clone();
    with_conn(&state.conn, move |conn| {
        service::confirm_password_reset(conn, &hasher, &jwt, &req)
    })
    .await?;
    Ok(Json(json!({ "message": "Password has been reset successfully." })))
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> ApiResult<Json<Value>> {
    let hasher = state.password_hasher.clone();
    with_conn(&state.conn, move |conn| {
        service::change_password(conn, &hasher, user.user_id, &req)
    })
    .await?;
    Ok(Json(json!({ "message": "Password changed successfully." })))
}

pub async fn request_email_verification(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Value>> {
    let jwt = state.jwt_manager.clone();
    let user_id = user.user_id;
    let token = with_conn(&state.conn, move |conn| {
        service::request_email_verification(conn, &jwt, user_id)
    })
    .await?;

    match token {
        Some(token) => {
            info!("Email verification issued for user {user_id}");
            debug!(
                "Verification link for {user_id}: {}/verify-email?token={token}",
                state.config.server.base_url
            );
            Ok(Json(json!({ "message": "Verification email sent." })))
        }
        None => Ok(Json(json!({ "message": "Email is already verified." }))),
    }
}

pub async fn confirm_email_verification(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<EmailVerifyConfirmRequest>,
) -> ApiResult<Json<Value>> {
    let jwt = state.jwt_manager.clone();
    let user = with_conn(&state.conn, move |conn| {
        service::confirm_email_verification(conn, &jwt, &req.token)
    })
    .await?;
    info!("Email verified for user {}", user.id);
    Ok(Json(json!({ "message": "Email verified successfully." })))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<Json<UserResponse>> {
    let response = with_conn(&state.conn, move |conn| {
        let account = service::get_user(conn, user.user_id)?;
        service::user_response(conn, account)
    })
    .await?;
    Ok(Json(response))
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    let response = with_conn(&state.conn, move |conn| {
        let account = service::update_user(conn, user.user_id, req)?;
        service::user_response(conn, account)
    })
    .await?;
    Ok(Json(response))
}

pub async fn get_extended_profile(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<Json<ProfileResponse>> {
    let response = with_conn(&state.conn, move |conn| {
        let profile = service::get_or_create_profile(conn, user.user_id)?;
        let account = service::get_user(conn, user.user_id)?;
        Ok(ProfileResponse {
            profile,
            user: service::user_response(conn, account)?,
        })
    })
    .await?;
    Ok(Json(response))
}

pub async fn update_extended_profile(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    let response = with_conn(&state.conn, move |conn| {
        let profile = service::update_profile(conn, user.user_id, req)?;
        let account = service::get_user(conn, user.user_id)?;
        Ok(ProfileResponse {
            profile,
            user: service::user_response(conn, account)?,
        })
    })
    .await?;
    Ok(Json(response))
}

pub async fn public_profile(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> ApiResult<Json<PublicUserResponse>> {
    let response = with_conn(&state.conn, move |conn| {
        service::public_user(conn, &username)
    })
    .await?;
    Ok(Json(response))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> ApiResult<Json<Page<UserResponse>>> {
    user.require_staff()?;
    let page = with_conn(&state.conn, move |conn| service::list_users(conn, &query)).await?;
    Ok(Json(page))
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/verify", post(verify))
        .route("/api/auth/password/reset", post(request_password_reset))
        .route(
            "/api/auth/password/reset/confirm",
            post(confirm_password_reset),
        )
        .route("/api/auth/password/change", post(change_password))
        .route("/api/auth/email/verify", post(request_email_verification))
        .route(
            "/api/auth/email/verify/confirm",
            post(confirm_email_verification),
        )
}

pub fn configure_users_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users", get(list_users))
        .route("/api/users/me", get(me))
        .route("/api/users/profile", get(me).put(update_profile))
        .route(
            "/api/users/profile/extended",
            get(get_extended_profile).put(update_extended_profile),
        )
        .route("/api/users/{username}", get(public_profile))
}
