use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::shared::schema::{notification_preferences, notifications};
use crate::core::shared::{DigestFrequency, NotificationType, TargetKind};

/// Entity a notification points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum NotificationTarget {
    Idea(Uuid),
    Comment(Uuid),
    Vote(Uuid),
    User(Uuid),
    Category(Uuid),
}

impl NotificationTarget {
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Idea(_) => TargetKind::Idea,
            Self::Comment(_) => TargetKind::Comment,
            Self::Vote(_) => TargetKind::Vote,
            Self::User(_) => TargetKind::User,
            Self::Category(_) => TargetKind::Category,
        }
    }

    pub fn id(&self) -> Uuid {
        match *self {
            Self::Idea(id)
            | Self::Comment(id)
            | Self::Vote(id)
            | Self::User(id)
            | Self::Category(id) => id,
        }
    }

    pub fn from_parts(kind: Option<TargetKind>, id: Option<Uuid>) -> Option<Self> {
        let (kind, id) = (kind?, id?);
        Some(match kind {
            TargetKind::Idea => Self::Idea(id),
            TargetKind::Comment => Self::Comment(id),
            TargetKind::Vote => Self::Vote(id),
            TargetKind::User => Self::User(id),
            TargetKind::Category => Self::Category(id),
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub target_kind: Option<TargetKind>,
    pub target_id: Option<Uuid>,
    pub sender_id: Option<Uuid>,
    pub is_read: bool,
    pub is_email_sent: bool,
    pub is_push_sent: bool,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn target(&self) -> Option<NotificationTarget> {
        NotificationTarget::from_parts(self.target_kind, self.target_id)
    }

    /// Flips the read flag once. Returns false when already read.
    pub fn mark_read(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_read {
            return false;
        }
        self.is_read = true;
        self.read_at = Some(now);
        true
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub target: Option<NotificationTarget>,
    pub sender_id: Option<Uuid>,
    pub is_read: bool,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        Self {
            target: n.target(),
            id: n.id,
            notification_type: n.notification_type,
            title: n.title,
            message: n.message,
            sender_id: n.sender_id,
            is_read: n.is_read,
            data: n.data,
            created_at: n.created_at,
            read_at: n.read_at,
        }
    }
}

/// Input for [`super::service::create_notification`].
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub sender_id: Option<Uuid>,
    pub target: Option<NotificationTarget>,
    pub data: serde_json::Value,
}

impl NewNotification {
    pub fn new(
        recipient_id: Uuid,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id,
            notification_type,
            title: title.into(),
            message: message.into(),
            sender_id: None,
            target: None,
            data: serde_json::json!({}),
        }
    }

    pub fn from_sender(mut self, sender_id: Uuid) -> Self {
        self.sender_id = Some(sender_id);
        self
    }

    pub fn about(mut self, target: NotificationTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = notification_preferences)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NotificationPreference {
    pub id: Uuid,
    pub user_id: Uuid,
    pub email_notifications: bool,
    pub email_idea_updates: bool,
    pub email_comments: bool,
    pub email_votes: bool,
    pub email_collaboration: bool,
    pub email_system: bool,
    pub push_notifications: bool,
    pub push_idea_updates: bool,
    pub push_comments: bool,
    pub push_votes: bool,
    pub push_collaboration: bool,
    pub push_system: bool,
    pub digest_frequency: DigestFrequency,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreference {
    pub fn defaults_for(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            email_notifications: true,
            email_idea_updates: true,
            email_comments: true,
            email_votes: true,
            email_collaboration: true,
            email_system: true,
            push_notifications: true,
            push_idea_updates: true,
            push_comments: true,
            push_votes: true,
            push_collaboration: true,
            push_system: true,
            digest_frequency: DigestFrequency::Immediate,
            created_at: now,
            updated_at: now,
        }
    }

    /// Channels a notification of `kind` would be delivered on.
    pub fn channels_for(&self, kind: NotificationType) -> DeliveryChannels {
        if self.digest_frequency == DigestFrequency::Never {
            return DeliveryChannels::default();
        }
        let (email, push) = match kind {
            NotificationType::IdeaCreated
            | NotificationType::IdeaUpdated
            | NotificationType::IdeaApproved
            | NotificationType::IdeaRejected
            | NotificationType::IdeaImplemented => (self.email_idea_updates, self.push_idea_updates),
            NotificationType::CommentAdded | NotificationType::Mention => {
                (self.email_comments, self.push_comments)
            }
            NotificationType::VoteReceived => (self.email_votes, self.push_votes),
            NotificationType::CollaborationInvite => {
                (self.email_collaboration, self.push_collaboration)
            }
            NotificationType::System => (self.email_system, self.push_system),
        };
        DeliveryChannels {
            email: self.email_notifications && email,
            push: self.push_notifications && push,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryChannels {
    pub email: bool,
    pub push: bool,
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = notification_preferences)]
pub struct UpdatePreferencesRequest {
    pub email_notifications: Option<bool>,
    pub email_idea_updates: Option<bool>,
    pub email_comments: Option<bool>,
    pub email_votes: Option<bool>,
    pub email_collaboration: Option<bool>,
    pub email_system: Option<bool>,
    pub push_notifications: Option<bool>,
    pub push_idea_updates: Option<bool>,
    pub push_comments: Option<bool>,
    pub push_votes: Option<bool>,
    pub push_collaboration: Option<bool>,
    pub push_system: Option<bool>,
    pub digest_frequency: Option<DigestFrequency>,
}

impl UpdatePreferencesRequest {
    pub fn is_empty(&self) -> bool {
        self.email_notifications.is_none()
            && self.email_idea_updates.is_none()
            && self.email_comments.is_none()
            && self.email_votes.is_none()
            && self.email_collaboration.is_none()
            && self.email_system.is_none()
            && self.push_notifications.is_none()
            && self.push_idea_updates.is_none()
            && self.push_comments.is_none()
            && self.push_votes.is_none()
            && self.push_collaboration.is_none()
            && self.push_system.is_none()
            && self.digest_frequency.is_none()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationListQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_round_trips_through_columns() {
        let id = Uuid::new_v4();
        let target = NotificationTarget::Comment(id);
        assert_eq!(
            NotificationTarget::from_parts(Some(target.kind()), Some(target.id())),
            Some(target)
        );
        assert_eq!(NotificationTarget::from_parts(Some(TargetKind::Idea), None), None);
    }

    #[test]
    fn test_target_json_shape() {
        let id = Uuid::nil();
        let value = serde_json::to_value(NotificationTarget::Idea(id)).expect("serialize");
        assert_eq!(value["kind"], "idea");
        assert_eq!(value["id"], id.to_string());
    }

    #[test]
    fn test_mark_read_is_idempotent() {
        let mut n = Notification {
            id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            notification_type: NotificationType::System,
            title: "Welcome".into(),
            message: "Hello".into(),
            target_kind: None,
            target_id: None,
            sender_id: None,
            is_read: false,
            is_email_sent: false,
            is_push_sent: false,
            data: serde_json::json!({}),
            created_at: Utc::now(),
            read_at: None,
        };

        let first = Utc::now();
        assert!(n.mark_read(first));
        assert!(!n.mark_read(first + chrono::Duration::seconds(30)));
        assert_eq!(n.read_at, Some(first));
    }

    #[test]
    fn test_delivery_channels() {
        let mut prefs = NotificationPreference::defaults_for(Uuid::new_v4());
        assert_eq!(
            prefs.channels_for(NotificationType::VoteReceived),
            DeliveryChannels { email: true, push: true }
        );

        prefs.email_votes = false;
        prefs.push_notifications = false;
        assert_eq!(
            prefs.channels_for(NotificationType::VoteReceived),
            DeliveryChannels { email: false, push: false }
        );
        assert!(prefs.channels_for(NotificationType::System).email);

        prefs.digest_frequency = DigestFrequency::Never;
        assert_eq!(
            prefs.channels_for(NotificationType::System),
            DeliveryChannels::default()
        );
    }
}
