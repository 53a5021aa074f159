use chrono::Utc;
use diesel::dsl::count_star;
use diesel::pg::Pg;
use diesel::prelude::*;
use log::info;
use std::collections::HashMap;
use uuid::Uuid;

use super::models::{
    ChangePasswordRequest, PasswordResetConfirmRequest, ProfileChangeset, PublicUserResponse,
    RegisterRequest, UpdateProfileRequest, UpdateUserRequest, User, UserChangeset, UserListQuery,
    UserProfile, UserResponse,
};
use crate::core::shared::schema::{ideas, notification_preferences, user_profiles, users, votes};
use crate::core::shared::{parse_ordering, ApiError, ApiResult, Page, PageParams};
use crate::notifications::NotificationPreference;
use crate::security::{
    hash_fingerprint, normalize_email, JwtManager, PasswordHasher2, TokenSubject, TokenType,
    UserAttributes, Validator, STAFF_ROLE,
};

const INVALID_CREDENTIALS: &str = "No active account found with the given credentials";
const INVALID_TOKEN: &str = "Invalid or expired token";

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::Internal(err.to_string())
}

pub fn token_subject(user: &User) -> TokenSubject {
    TokenSubject {
        email: Some(user.email.clone()),
        username: Some(user.username.clone()),
        roles: if user.is_staff {
            vec![STAFF_ROLE.to_string()]
        } else {
            Vec::new()
        },
    }
}

/// Payload checks that need no database access. Password confirmation is
/// checked first so a mismatch never reaches the store.
pub fn validate_registration(hasher: &PasswordHasher2, req: &RegisterRequest) -> ApiResult<()> {
    if req.password != req.password_confirm {
        return Err(ApiError::validation("password_confirm", "Passwords don't match"));
    }

    let mut validator = Validator::new()
        .username("username", &req.username)
        .email("email", &req.email)
        .max_length("first_name", &req.first_name, 150)
        .max_length("last_name", &req.last_name, 150);

    hasher.check_into(
        validator.errors_mut(),
        "password",
        &req.password,
        UserAttributes {
            username: Some(&req.username),
            email: Some(&req.email),
            first_name: Some(&req.first_name),
            last_name: Some(&req.last_name),
        },
    );
    validator.validate()
}

pub fn find_by_email(conn: &mut PgConnection, email: &str) -> ApiResult<Option<User>> {
    let email = normalize_email(email);
    Ok(users::table
        .filter(users::email.eq(email))
        .select(User::as_select())
        .first(conn)
        .optional()?)
}

pub fn get_user(conn: &mut PgConnection, user_id: Uuid) -> ApiResult<User> {
    users::table
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

/// Creates the account with its profile and notification preferences.
pub fn register(
    conn: &mut PgConnection,
    hasher: &PasswordHasher2,
    req: &RegisterRequest,
) -> ApiResult<User> {
    validate_registration(hasher, req)?;

    let email = normalize_email(&req.email);
    let username = req.username.trim().to_string();

    let mut taken = Validator::new();
    if find_by_email(conn, &email)?.is_some() {
        taken
            .errors_mut()
            .add("email", "A user with that email already exists.");
    }
    let username_exists: bool = diesel::select(diesel::dsl::exists(
        users::table.filter(users::username.eq(&username)),
    ))
    .get_result(conn)?;
    if username_exists {
        taken
            .errors_mut()
            .add("username", "A user with that username already exists.");
    }
    taken.validate()?;

    let password_hash = hasher.hash(&req.password).map_err(internal)?;
    let mut user = User::new(email, username, password_hash);
    user.first_name = req.first_name.trim().to_string();
    user.last_name = req.last_name.trim().to_string();

    let user = conn.transaction::<_, ApiError, _>(|conn| {
        let user: User = diesel::insert_into(users::table)
            .values(&user)
            .returning(User::as_returning())
            .get_result(conn)?;
        diesel::insert_into(user_profiles::table)
            .values(&UserProfile::empty_for(user.id))
            .execute(conn)?;
        diesel::insert_into(notification_preferences::table)
            .values(&NotificationPreference::defaults_for(user.id))
            .execute(conn)?;
        Ok(user)
    })?;

    info!("Registered user {} ({})", user.username, user.id);
    Ok(user)
}

pub fn authenticate(
    conn: &mut PgConnection,
    hasher: &PasswordHasher2,
    email: &str,
    password: &str,
) -> ApiResult<User> {
    let unauthenticated = || ApiError::Unauthenticated(INVALID_CREDENTIALS.to_string());

    let user = find_by_email(conn, email)?.ok_or_else(unauthenticated)?;
    if !user.is_active || !hasher.verify(password, &user.password_hash).map_err(internal)? {
        return Err(unauthenticated());
    }

    let now = Utc::now();
    let user = diesel::update(users::table.find(user.id))
        .set((users::last_login.eq(Some(now)), users::updated_at.eq(now)))
        .returning(User::as_returning())
        .get_result(conn)?;

    if hasher.needs_rehash(&user.password_hash).unwrap_or(false) {
        let hash = hasher.hash(password).map_err(internal)?;
        return set_password_hash(conn, user.id, &hash);
    }
    Ok(user)
}

/// Account a refresh token may be exchanged for. Deleted and deactivated
/// accounts are refused.
pub fn refresh_account(conn: &mut PgConnection, user_id: Uuid) -> ApiResult<User> {
    users::table
        .find(user_id)
        .filter(users::is_active.eq(true))
        .select(User::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::Unauthenticated(INVALID_TOKEN.to_string()))
}

fn set_password_hash(conn: &mut PgConnection, user_id: Uuid, hash: &str) -> ApiResult<User> {
    Ok(diesel::update(users::table.find(user_id))
        .set((
            users::password_hash.eq(hash),
            users::updated_at.eq(Utc::now()),
        ))
        .returning(User::as_returning())
        .get_result(conn)?)
}

fn attributes_of(user: &User) -> UserAttributes<'_> {
    UserAttributes {
        username: Some(&user.username),
        email: Some(&user.email),
        first_name: Some(&user.first_name),
        last_name: Some(&user.last_name),
    }
}

pub fn change_password(
    conn: &mut PgConnection,
    hasher: &PasswordHasher2,
    user_id: Uuid,
    req: &ChangePasswordRequest,
) -> ApiResult<()> {
    if req.new_password != req.new_password_confirm {
        return Err(ApiError::validation(
            "new_password_confirm",
            "New passwords don't match",
        ));
    }

    let user = get_user(conn, user_id)?;
    if !hasher
        .verify(&req.old_password, &user.password_hash)
        .map_err(internal)?
    {
        return Err(ApiError::validation("old_password", "Old password is incorrect"));
    }

    let mut validator = Validator::new();
    hasher.check_into(
        validator.errors_mut(),
        "new_password",
        &req.new_password,
        attributes_of(&user),
    );
    validator.validate()?;

    let hash = hasher.hash(&req.new_password).map_err(internal)?;
    set_password_hash(conn, user.id, &hash)?;
    info!("Password changed for user {}", user.id);
    Ok(())
}

/// Issued reset credentials, handed to the mail channel.
#[derive(Debug, Clone)]
pub struct ResetTicket {
    pub user_id: Uuid,
    pub email: String,
    pub token: String,
}

/// Returns `None` for unknown or inactive addresses; callers must respond
/// the same way in both cases.
pub fn request_password_reset(
    conn: &mut PgConnection,
    jwt: &JwtManager,
    email: &str,
) -> ApiResult<Option<ResetTicket>> {
    let Some(user) = find_by_email(conn, email)?.filter(|u| u.is_active) else {
        return Ok(None);
    };

    let token = jwt
        .generate_action_token(
            user.id,
            TokenType::PasswordReset,
            hash_fingerprint(&user.password_hash),
        )
        .map_err(internal)?;

    Ok(Some(ResetTicket {
        user_id: user.id,
        email: user.email,
        token,
    }))
}

pub fn confirm_password_reset(
    conn: &mut PgConnection,
    hasher: &PasswordHasher2,
    jwt: &JwtManager,
    req: &PasswordResetConfirmRequest,
) -> ApiResult<()> {
    if req.new_password != req.new_password_confirm {
        return Err(ApiError::validation(
            "new_password_confirm",
            "Passwords don't match",
        ));
    }

    let invalid = || ApiError::validation("token", INVALID_TOKEN);
    let uid = Uuid::parse_str(req.uid.trim()).map_err(|_| invalid())?;
    let claims = jwt
        .validate_typed(&req.token, TokenType::PasswordReset)
        .map_err(|_| invalid())?;
    if claims.user_id().ok() != Some(uid) {
        return Err(invalid());
    }

    let user = get_user(conn, uid).map_err(|_| invalid())?;
    if !user.is_active || claims.fingerprint != hash_fingerprint(&user.password_hash) {
        return Err(invalid());
    }

    let mut validator = Validator::new();
    hasher.check_into(
        validator.errors_mut(),
        "new_password",
        &req.new_password,
        attributes_of(&user),
    );
    validator.validate()?;

    let hash = hasher.hash(&req.new_password).map_err(internal)?;
    set_password_hash(conn, user.id, &hash)?;
    info!("Password reset completed for user {}", user.id);
    Ok(())
}

/// Returns `None` when the account is already verified.
pub fn request_email_verification(
    conn: &mut PgConnection,
    jwt: &JwtManager,
    user_id: Uuid,
) -> ApiResult<Option<String>> {
    let user = get_user(conn, user_id)?;
    if user.is_verified {
        return Ok(None);
    }
    let token = jwt
        .generate_action_token(user.id, TokenType::EmailVerification, Some(user.email))
        .map_err(internal)?;
    Ok(Some(token))
}

pub fn confirm_email_verification(
    conn: &mut PgConnection,
    jwt: &JwtManager,
    token: &str,
) -> ApiResult<User> {
    let invalid = || ApiError::validation("token", INVALID_TOKEN);
    let claims = jwt
        .validate_typed(token, TokenType::EmailVerification)
        .map_err(|_| invalid())?;
    let user_id = claims.user_id().map_err(|_| invalid())?;
    let user = get_user(conn, user_id).map_err(|_| invalid())?;
    if claims.fingerprint.as_deref() != Some(user.email.as_str()) {
        return Err(invalid());
    }
    if user.is_verified {
        return Ok(user);
    }

    Ok(diesel::update(users::table.find(user.id))
        .set((users::is_verified.eq(true), users::updated_at.eq(Utc::now())))
        .returning(User::as_returning())
        .get_result(conn)?)
}

fn ideas_count_for(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<i64> {
    ideas::table
        .filter(ideas::author_id.eq(user_id))
        .count()
        .get_result(conn)
}

pub fn user_response(conn: &mut PgConnection, user: User) -> ApiResult<UserResponse> {
    let ideas_count = ideas_count_for(conn, user.id)?;
    let votes_count: i64 = votes::table
        .filter(votes::user_id.eq(user.id))
        .count()
        .get_result(conn)?;
    Ok(UserResponse::new(user, ideas_count, votes_count))
}

pub fn update_user(
    conn: &mut PgConnection,
    user_id: Uuid,
    req: UpdateUserRequest,
) -> ApiResult<User> {
    let mut validator = Validator::new();
    if let Some(first_name) = &req.first_name {
        validator = validator.max_length("first_name", first_name, 150);
    }
    if let Some(last_name) = &req.last_name {
        validator = validator.max_length("last_name", last_name, 150);
    }
    if let Some(bio) = &req.bio {
        validator = validator.max_length("bio", bio, 500);
    }
    if let Some(location) = &req.location {
        validator = validator.max_length("location", location, 100);
    }
    if let Some(website) = &req.website {
        validator = validator.url("website", website).max_length("website", website, 200);
    }
    if let Some(avatar) = &req.avatar {
        validator = validator.max_length("avatar", avatar, 255);
    }
    validator.validate()?;

    let changes = UserChangeset {
        first_name: req.first_name,
        last_name: req.last_name,
        bio: req.bio,
        avatar: req.avatar.map(|a| Some(a).filter(|a| !a.is_empty())),
        location: req.location,
        website: req.website,
        date_of_birth: req.date_of_birth.map(Some),
        email_notifications: req.email_notifications,
        push_notifications: req.push_notifications,
        updated_at: Some(Utc::now()),
    };

    diesel::update(users::table.find(user_id))
        .set(&changes)
        .returning(User::as_returning())
        .get_result(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

pub fn get_or_create_profile(conn: &mut PgConnection, user_id: Uuid) -> ApiResult<UserProfile> {
    diesel::insert_into(user_profiles::table)
        .values(&UserProfile::empty_for(user_id))
        .on_conflict(user_profiles::user_id)
        .do_nothing()
        .execute(conn)?;

    Ok(user_profiles::table
        .filter(user_profiles::user_id.eq(user_id))
        .select(UserProfile::as_select())
        .first(conn)?)
}

pub fn update_profile(
    conn: &mut PgConnection,
    user_id: Uuid,
    req: UpdateProfileRequest,
) -> ApiResult<UserProfile> {
    let mut validator = Validator::new();
    if let Some(organization) = &req.organization {
        validator = validator.max_length("organization", organization, 200);
    }
    if let Some(job_title) = &req.job_title {
        validator = validator.max_length("job_title", job_title, 100);
    }
    if let Some(twitter) = &req.twitter_handle {
        validator = validator.max_length("twitter_handle", twitter, 50);
    }
    if let Some(linkedin) = &req.linkedin_profile {
        validator = validator
            .url("linkedin_profile", linkedin)
            .max_length("linkedin_profile", linkedin, 200);
    }
    validator.validate()?;

    let profile = get_or_create_profile(conn, user_id)?;
    let changes = ProfileChangeset {
        organization: req.organization,
        job_title: req.job_title,
        expertise_areas: req.expertise_areas.map(|areas| serde_json::json!(areas)),
        twitter_handle: req.twitter_handle,
        linkedin_profile: req.linkedin_profile,
        profile_public: req.profile_public,
        show_email: req.show_email,
        updated_at: Some(Utc::now()),
    };

    Ok(diesel::update(user_profiles::table.find(profile.id))
        .set(&changes)
        .returning(UserProfile::as_returning())
        .get_result(conn)?)
}

pub fn public_user(conn: &mut PgConnection, username: &str) -> ApiResult<PublicUserResponse> {
    let user: User = users::table
        .filter(users::username.eq(username))
        .filter(users::is_active.eq(true))
        .select(User::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let profile = user_profiles::table
        .filter(user_profiles::user_id.eq(user.id))
        .select(UserProfile::as_select())
        .first(conn)
        .optional()?;
    let ideas_count = ideas_count_for(conn, user.id)?;

    Ok(PublicUserResponse::new(user, profile, ideas_count))
}

fn filtered_users(query: &UserListQuery) -> users::BoxedQuery<'static, Pg> {
    let mut q = users::table.into_boxed();

    if let Some(is_active) = query.is_active {
        q = q.filter(users::is_active.eq(is_active));
    }
    if let Some(is_verified) = query.is_verified {
        q = q.filter(users::is_verified.eq(is_verified));
    }
    if let Some(after) = query.joined_after {
        q = q.filter(users::date_joined.ge(after));
    }
    if let Some(before) = query.joined_before {
        q = q.filter(users::date_joined.le(before));
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{search}%");
        q = q.filter(
            users::username
                .ilike(pattern.clone())
                .or(users::email.ilike(pattern.clone()))
                .or(users::first_name.ilike(pattern.clone()))
                .or(users::last_name.ilike(pattern)),
        );
    }
    q
}

pub fn list_users(conn: &mut PgConnection, query: &UserListQuery) -> ApiResult<Page<UserResponse>> {
    let page = PageParams::new(query.limit, query.offset);
    let count: i64 = filtered_users(query).count().get_result(conn)?;

    let mut q = filtered_users(query);
    let ordering = query.ordering.as_deref().unwrap_or("-date_joined");
    q = match parse_ordering(ordering) {
        ("username", false) => q.order(users::username.asc()),
        ("username", true) => q.order(users::username.desc()),
        ("email", false) => q.order(users::email.asc()),
        ("email", true) => q.order(users::email.desc()),
        ("date_joined", false) => q.order(users::date_joined.asc()),
        ("date_joined", true) => q.order(users::date_joined.desc()),
        _ => {
            return Err(ApiError::validation(
                "ordering",
                format!("Unsupported ordering '{ordering}'"),
            ))
        }
    };

    let rows: Vec<User> = q
        .then_order_by(users::id.asc())
        .limit(page.limit())
        .offset(page.offset())
        .select(User::as_select())
        .load(conn)?;

    let ids: Vec<Uuid> = rows.iter().map(|u| u.id).collect();
    let idea_counts: HashMap<Uuid, i64> = ideas::table
        .filter(ideas::author_id.eq_any(&ids))
        .group_by(ideas::author_id)
        .select((ideas::author_id, count_star()))
        .load::<(Uuid, i64)>(conn)?
        .into_iter()
        .collect();
    let vote_counts: HashMap<Uuid, i64> = votes::table
        .filter(votes::user_id.eq_any(&ids))
        .group_by(votes::user_id)
        .select((votes::user_id, count_star()))
        .load::<(Uuid, i64)>(conn)?
        .into_iter()
        .collect();

    let results = rows
        .into_iter()
        .map(|user| {
            let ideas = idea_counts.get(&user.id).copied().unwrap_or(0);
            let votes = vote_counts.get(&user.id).copied().unwrap_or(0);
            UserResponse::new(user, ideas, votes)
        })
        .collect();

    Ok(Page::new(count, page, results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{Argon2Config, PasswordConfig};

    fn hasher() -> PasswordHasher2 {
        PasswordHasher2::new(Argon2Config::low_memory(), PasswordConfig::default())
            .expect("Failed to create hasher")
    }

    fn request(password: &str, confirm: &str) -> RegisterRequest {
        RegisterRequest {
            username: "riverside".into(),
            email: "riverside@example.com".into(),
            first_name: String::new(),
            last_name: String::new(),
            password: password.into(),
            password_confirm: confirm.into(),
        }
    }

    #[test]
    fn test_mismatched_confirmation_is_reported_alone() {
        let err = validate_registration(&hasher(), &request("Tidal-Orchard-93", "different"))
            .expect_err("mismatch must fail");
        match err {
            ApiError::Validation(fields) => {
                assert!(fields.contains("password_confirm"));
                assert!(!fields.contains("password"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_weak_password_rejected() {
        let err = validate_registration(&hasher(), &request("riverside1", "riverside1"))
            .expect_err("similar password must fail");
        assert!(matches!(err, ApiError::Validation(ref f) if f.contains("password")));
    }

    #[test]
    fn test_valid_registration_payload() {
        assert!(validate_registration(&hasher(), &request("Tidal-Orchard-93", "Tidal-Orchard-93")).is_ok());
    }

    #[test]
    fn test_staff_users_get_staff_role() {
        let mut user = User::new("a@example.com".into(), "a".into(), String::new());
        assert!(token_subject(&user).roles.is_empty());
        user.is_staff = true;
        assert_eq!(token_subject(&user).roles, vec![STAFF_ROLE.to_string()]);
    }
}
