//! Initial data: default taxonomy, a first staff account, and backfilled
//! per-user rows. Every step is idempotent.

use anyhow::{Context, Result};
use diesel::dsl::exists;
use diesel::prelude::*;
use log::{info, warn};
use uuid::Uuid;

use crate::categories::ensure_default_taxonomy;
use crate::core::config::SeedConfig;
use crate::core::shared::schema::{notification_preferences, user_profiles, users};
use crate::notifications::NotificationPreference;
use crate::security::{normalize_email, PasswordHasher2, UserAttributes};
use crate::users::{User, UserProfile};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub categories: usize,
    pub tags: usize,
    pub admin_created: bool,
    pub profiles: usize,
    pub preferences: usize,
}

pub fn seed_database(
    conn: &mut PgConnection,
    hasher: &PasswordHasher2,
    config: &SeedConfig,
) -> Result<SeedReport> {
    conn.transaction::<_, anyhow::Error, _>(|conn| {
        let (categories, tags) =
            ensure_default_taxonomy(conn).context("Failed to seed categories and tags")?;
        let admin_created = ensure_staff_account(conn, hasher, config)?;
        let (profiles, preferences) = backfill_user_rows(conn)?;

        let report = SeedReport {
            categories,
            tags,
            admin_created,
            profiles,
            preferences,
        };
        info!(
            "Seed complete: {} categories, {} tags, admin created: {}, {} profiles, {} preference rows",
            report.categories, report.tags, report.admin_created, report.profiles, report.preferences
        );
        Ok(report)
    })
}

fn ensure_staff_account(
    conn: &mut PgConnection,
    hasher: &PasswordHasher2,
    config: &SeedConfig,
) -> Result<bool> {
    let has_staff: bool =
        diesel::select(exists(users::table.filter(users::is_staff.eq(true)))).get_result(conn)?;
    if has_staff {
        return Ok(false);
    }

    let Some(password) = config.admin_password.as_deref().filter(|p| !p.is_empty()) else {
        warn!("No staff account exists and no admin password is configured; skipping");
        return Ok(false);
    };

    let issues = hasher.validate(
        password,
        UserAttributes {
            username: Some(&config.admin_username),
            email: Some(&config.admin_email),
            ..Default::default()
        },
    );
    for issue in &issues {
        warn!("Admin password: {}", issue.message());
    }

    let hash = hasher.hash(password).context("Failed to hash admin password")?;
    let mut admin = User::new(
        normalize_email(&config.admin_email),
        config.admin_username.trim().to_string(),
        hash,
    );
    admin.is_staff = true;
    admin.is_verified = true;
    admin.first_name = "Admin".to_string();
    admin.last_name = "User".to_string();

    let inserted = diesel::insert_into(users::table)
        .values(&admin)
        .on_conflict_do_nothing()
        .execute(conn)
        .context("Failed to create staff account")?;
    if inserted == 0 {
        warn!(
            "Account {} already exists without staff rights; not modified",
            config.admin_email
        );
        return Ok(false);
    }

    info!("Created staff account {}", admin.username);
    Ok(true)
}

fn backfill_user_rows(conn: &mut PgConnection) -> Result<(usize, usize)> {
    let without_profile: Vec<Uuid> = users::table
        .left_join(user_profiles::table)
        .filter(user_profiles::id.is_null())
        .select(users::id)
        .load(conn)?;
    let profiles: Vec<UserProfile> = without_profile
        .into_iter()
        .map(UserProfile::empty_for)
        .collect();
    let created_profiles = if profiles.is_empty() {
        0
    } else {
        diesel::insert_into(user_profiles::table)
            .values(&profiles)
            .on_conflict_do_nothing()
            .execute(conn)?
    };

    let without_prefs: Vec<Uuid> = users::table
        .left_join(notification_preferences::table)
        .filter(notification_preferences::id.is_null())
        .select(users::id)
        .load(conn)?;
    let prefs: Vec<NotificationPreference> = without_prefs
        .into_iter()
        .map(NotificationPreference::defaults_for)
        .collect();
    let created_prefs = if prefs.is_empty() {
        0
    } else {
        diesel::insert_into(notification_preferences::table)
            .values(&prefs)
            .on_conflict_do_nothing()
            .execute(conn)?
    };

    Ok((created_profiles, created_prefs))
}
