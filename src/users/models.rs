use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::shared::schema::{user_profiles, users};

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub bio: String,
    pub avatar: Option<String>,
    pub location: String,
    pub website: String,
    pub is_verified: bool,
    pub is_active: bool,
    pub is_staff: bool,
    pub date_of_birth: Option<NaiveDate>,
    pub email_notifications: bool,
    pub push_notifications: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, username: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            username,
            first_name: String::new(),
            last_name: String::new(),
            password_hash,
            bio: String::new(),
            avatar: None,
            location: String::new(),
            website: String::new(),
            is_verified: false,
            is_active: true,
            is_staff: false,
            date_of_birth: None,
            email_notifications: true,
            push_notifications: true,
            last_login: None,
            date_joined: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = user_profiles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub organization: String,
    pub job_title: String,
    pub expertise_areas: serde_json::Value,
    pub twitter_handle: String,
    pub linkedin_profile: String,
    pub profile_public: bool,
    pub show_email: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn empty_for(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            organization: String::new(),
            job_title: String::new(),
            expertise_areas: serde_json::json!([]),
            twitter_handle: String::new(),
            linkedin_profile: String::new(),
            profile_public: true,
            show_email: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Full account view returned to the account owner.
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub bio: String,
    pub avatar: Option<String>,
    pub location: String,
    pub website: String,
    pub is_verified: bool,
    pub is_active: bool,
    pub is_staff: bool,
    pub date_of_birth: Option<NaiveDate>,
    pub email_notifications: bool,
    pub push_notifications: bool,
    pub ideas_count: i64,
    pub votes_count: i64,
    pub last_login: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserResponse {
    pub fn new(user: User, ideas_count: i64, votes_count: i64) -> Self {
        Self {
            full_name: user.full_name(),
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            bio: user.bio,
            avatar: user.avatar,
            location: user.location,
            website: user.website,
            is_verified: user.is_verified,
            is_active: user.is_active,
            is_staff: user.is_staff,
            date_of_birth: user.date_of_birth,
            email_notifications: user.email_notifications,
            push_notifications: user.push_notifications,
            ideas_count,
            votes_count,
            last_login: user.last_login,
            date_joined: user.date_joined,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Compact author/collaborator reference embedded in other payloads.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub avatar: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            full_name: user.full_name(),
            avatar: user.avatar.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicProfile {
    pub organization: String,
    pub job_title: String,
    pub expertise_areas: serde_json::Value,
    pub twitter_handle: String,
    pub linkedin_profile: String,
}

/// What other users see. Email and extended profile follow the owner's
/// visibility flags.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUserResponse {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub bio: String,
    pub avatar: Option<String>,
    pub location: String,
    pub website: String,
    pub is_verified: bool,
    pub ideas_count: i64,
    pub date_joined: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<PublicProfile>,
}

impl PublicUserResponse {
    pub fn new(user: User, profile: Option<UserProfile>, ideas_count: i64) -> Self {
        let show_email = profile.as_ref().is_some_and(|p| p.show_email);
        let profile = profile.filter(|p| p.profile_public).map(|p| PublicProfile {
            organization: p.organization,
            job_title: p.job_title,
            expertise_areas: p.expertise_areas,
            twitter_handle: p.twitter_handle,
            linkedin_profile: p.linkedin_profile,
        });
        Self {
            full_name: user.full_name(),
            id: user.id,
            username: user.username,
            bio: user.bio,
            avatar: user.avatar,
            location: user.location,
            website: user.website,
            is_verified: user.is_verified,
            ideas_count,
            date_joined: user.date_joined,
            email: show_email.then_some(user.email),
            profile,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub user: UserResponse,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyTokenRequest {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordResetConfirmRequest {
    pub uid: String,
    pub token: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailVerifyConfirmRequest {
    pub token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub email_notifications: Option<bool>,
    pub push_notifications: Option<bool>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = users)]
pub struct UserChangeset {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<Option<String>>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub date_of_birth: Option<Option<NaiveDate>>,
    pub email_notifications: Option<bool>,
    pub push_notifications: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub organization: Option<String>,
    pub job_title: Option<String>,
    pub expertise_areas: Option<Vec<String>>,
    pub twitter_handle: Option<String>,
    pub linkedin_profile: Option<String>,
    pub profile_public: Option<bool>,
    pub show_email: Option<bool>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = user_profiles)]
pub struct ProfileChangeset {
    pub organization: Option<String>,
    pub job_title: Option<String>,
    pub expertise_areas: Option<serde_json::Value>,
    pub twitter_handle: Option<String>,
    pub linkedin_profile: Option<String>,
    pub profile_public: Option<bool>,
    pub show_email: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserListQuery {
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
    pub joined_after: Option<DateTime<Utc>>,
    pub joined_before: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User::new(
            "ana@example.com".into(),
            "ana".into(),
            "$argon2id$v=19$m=8192,t=2,p=1$c2FsdA$aGFzaA".into(),
        )
    }

    #[test]
    fn test_full_name_falls_back_to_username() {
        let mut user = sample_user();
        assert_eq!(user.full_name(), "ana");
        user.first_name = "Ana".into();
        user.last_name = "Souza".into();
        assert_eq!(user.full_name(), "Ana Souza");
    }

    #[test]
    fn test_public_view_hides_email_and_private_profile() {
        let user = sample_user();
        let mut profile = UserProfile::empty_for(user.id);
        profile.organization = "City Council".into();

        let public = PublicUserResponse::new(user.clone(), Some(profile.clone()), 3);
        assert!(public.email.is_none());
        assert_eq!(
            public.profile.as_ref().map(|p| p.organization.as_str()),
            Some("City Council")
        );

        profile.show_email = true;
        profile.profile_public = false;
        let public = PublicUserResponse::new(user, Some(profile), 3);
        assert_eq!(public.email.as_deref(), Some("ana@example.com"));
        assert!(public.profile.is_none());
    }

    #[test]
    fn test_user_response_never_serializes_hash() {
        let response = UserResponse::new(sample_user(), 0, 0);
        let value = serde_json::to_value(&response).expect("serialize");
        assert!(value.get("password_hash").is_none());
        assert_eq!(value["full_name"], "ana");
    }
}
