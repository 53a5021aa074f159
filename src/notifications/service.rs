use chrono::Utc;
use diesel::prelude::*;
use log::debug;
use uuid::Uuid;

use super::models::{
    NewNotification, Notification, NotificationPreference, NotificationTarget,
    UpdatePreferencesRequest,
};
use crate::core::shared::schema::{
    categories, comments, ideas, notification_preferences, notifications, users, votes,
};
use crate::core::shared::{ApiError, ApiResult, Page, PageParams};

/// Checks that the entity a target names is present in its table.
pub fn target_exists(conn: &mut PgConnection, target: NotificationTarget) -> QueryResult<bool> {
    use diesel::dsl::exists;
    use diesel::select;

    match target {
        NotificationTarget::Idea(id) => {
            select(exists(ideas::table.filter(ideas::id.eq(id)))).get_result(conn)
        }
        NotificationTarget::Comment(id) => {
            select(exists(comments::table.filter(comments::id.eq(id)))).get_result(conn)
        }
        NotificationTarget::Vote(id) => {
            select(exists(votes::table.filter(votes::id.eq(id)))).get_result(conn)
        }
        NotificationTarget::User(id) => {
            select(exists(users::table.filter(users::id.eq(id)))).get_result(conn)
        }
        NotificationTarget::Category(id) => {
            select(exists(categories::table.filter(categories::id.eq(id)))).get_result(conn)
        }
    }
}

pub fn create_notification(
    conn: &mut PgConnection,
    new: NewNotification,
) -> ApiResult<Notification> {
    if let Some(target) = new.target {
        if !target_exists(conn, target)? {
            return Err(ApiError::validation(
                "target",
                format!("{} {} does not exist", target.kind(), target.id()),
            ));
        }
    }

    let notification = Notification {
        id: Uuid::new_v4(),
        recipient_id: new.recipient_id,
        notification_type: new.notification_type,
        title: new.title,
        message: new.message,
        target_kind: new.target.map(|t| t.kind()),
        target_id: new.target.map(|t| t.id()),
        sender_id: new.sender_id,
        is_read: false,
        is_email_sent: false,
        is_push_sent: false,
        data: new.data,
        created_at: Utc::now(),
        read_at: None,
    };

    let saved: Notification = diesel::insert_into(notifications::table)
        .values(&notification)
        .returning(Notification::as_returning())
        .get_result(conn)?;

    let prefs = get_or_create_preferences(conn, saved.recipient_id)?;
    let channels = prefs.channels_for(saved.notification_type);
    debug!(
        "Notification {} ({}) for {}: email={} push={}",
        saved.id, saved.notification_type, saved.recipient_id, channels.email, channels.push
    );

    Ok(saved)
}

pub fn list_notifications(
    conn: &mut PgConnection,
    recipient_id: Uuid,
    unread_only: bool,
    page: PageParams,
) -> ApiResult<Page<Notification>> {
    let mut count_query = notifications::table
        .filter(notifications::recipient_id.eq(recipient_id))
        .into_boxed();
    let mut query = notifications::table
        .filter(notifications::recipient_id.eq(recipient_id))
        .into_boxed();

    if unread_only {
        count_query = count_query.filter(notifications::is_read.eq(false));
        query = query.filter(notifications::is_read.eq(false));
    }

    let count: i64 = count_query.count().get_result(conn)?;
    let results = query
        .order(notifications::created_at.desc())
        .limit(page.limit())
        .offset(page.offset())
        .select(Notification::as_select())
        .load(conn)?;

    Ok(Page::new(count, page, results))
}

pub fn unread_count(conn: &mut PgConnection, recipient_id: Uuid) -> ApiResult<i64> {
    Ok(notifications::table
        .filter(notifications::recipient_id.eq(recipient_id))
        .filter(notifications::is_read.eq(false))
        .count()
        .get_result(conn)?)
}

/// Marks one of the recipient's notifications read. Repeated calls leave
/// `read_at` at its first value.
pub fn mark_as_read(
    conn: &mut PgConnection,
    recipient_id: Uuid,
    notification_id: Uuid,
) -> ApiResult<Notification> {
    let mut notification: Notification = notifications::table
        .filter(notifications::id.eq(notification_id))
        .filter(notifications::recipient_id.eq(recipient_id))
        .select(Notification::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Notification not found".to_string()))?;

    let now = Utc::now();
    if notification.mark_read(now) {
        diesel::update(
            notifications::table
                .filter(notifications::id.eq(notification_id))
                .filter(notifications::is_read.eq(false)),
        )
        .set((
            notifications::is_read.eq(true),
            notifications::read_at.eq(Some(now)),
        ))
        .execute(conn)?;
    }

    Ok(notification)
}

pub fn mark_all_read(conn: &mut PgConnection, recipient_id: Uuid) -> ApiResult<usize> {
    Ok(diesel::update(
        notifications::table
            .filter(notifications::recipient_id.eq(recipient_id))
            .filter(notifications::is_read.eq(false)),
    )
    .set((
        notifications::is_read.eq(true),
        notifications::read_at.eq(Some(Utc::now())),
    ))
    .execute(conn)?)
}

pub fn get_or_create_preferences(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> ApiResult<NotificationPreference> {
    diesel::insert_into(notification_preferences::table)
        .values(&NotificationPreference::defaults_for(user_id))
        .on_conflict(notification_preferences::user_id)
        .do_nothing()
        .execute(conn)?;

    Ok(notification_preferences::table
        .filter(notification_preferences::user_id.eq(user_id))
        .select(NotificationPreference::as_select())
        .first(conn)?)
}

pub fn update_preferences(
    conn: &mut PgConnection,
    user_id: Uuid,
    changes: &UpdatePreferencesRequest,
) -> ApiResult<NotificationPreference> {
    let current = get_or_create_preferences(conn, user_id)?;
    if changes.is_empty() {
        return Ok(current);
    }

    Ok(diesel::update(notification_preferences::table.find(current.id))
        .set((changes, notification_preferences::updated_at.eq(Utc::now())))
        .returning(NotificationPreference::as_returning())
        .get_result(conn)?)
}
