//! Database enum types
//!
//! Every closed set of choices in the civic schema is stored as a SMALLINT
//! column and mapped to a Rust enum here. The wire representation (JSON and
//! query strings) is the snake_case variant name.

use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::SmallInt;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};
use std::io::Write;

macro_rules! smallint_enum {
    ($name:ident { $($variant:ident = $value:literal => $label:literal),+ $(,)? }) => {
        impl ToSql<SmallInt, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                let v = *self as i16;
                out.write_all(&v.to_be_bytes())?;
                Ok(serialize::IsNull::No)
            }
        }

        impl FromSql<SmallInt, Pg> for $name {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let value = i16::from_sql(bytes)?;
                match value {
                    $($value => Ok(Self::$variant),)+
                    _ => Err(format!("Unknown {}: {}", stringify!($name), value).into()),
                }
            }
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ============================================================================
// IDEA WORKFLOW
// ============================================================================

/// Workflow status of an idea. Any value may be written at any time; the only
/// status-driven side effect is the `published_at` stamp.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum IdeaStatus {
    #[default]
    Draft = 0,
    Submitted = 1,
    UnderReview = 2,
    Approved = 3,
    Rejected = 4,
    Implemented = 5,
    Archived = 6,
}

smallint_enum!(IdeaStatus {
    Draft = 0 => "draft",
    Submitted = 1 => "submitted",
    UnderReview = 2 => "under_review",
    Approved = 3 => "approved",
    Rejected = 4 => "rejected",
    Implemented = 5 => "implemented",
    Archived = 6 => "archived",
});

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum IdeaPriority {
    Low = 0,
    #[default]
    Medium = 1,
    High = 2,
    Critical = 3,
}

smallint_enum!(IdeaPriority {
    Low = 0 => "low",
    Medium = 1 => "medium",
    High = 2 => "high",
    Critical = 3 => "critical",
});

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum AttachmentType {
    #[default]
    Document = 0,
    Image = 1,
    Video = 2,
    Audio = 3,
    Other = 4,
}

smallint_enum!(AttachmentType {
    Document = 0 => "document",
    Image = 1 => "image",
    Video = 2 => "video",
    Audio = 3 => "audio",
    Other = 4 => "other",
});

// ============================================================================
// ENGAGEMENT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum VoteType {
    Up = 0,
    Down = 1,
}

smallint_enum!(VoteType {
    Up = 0 => "up",
    Down = 1 => "down",
});

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum CollaboratorRole {
    #[default]
    Contributor = 0,
    Reviewer = 1,
    Implementer = 2,
}

smallint_enum!(CollaboratorRole {
    Contributor = 0 => "contributor",
    Reviewer = 1 => "reviewer",
    Implementer = 2 => "implementer",
});

// ============================================================================
// NOTIFICATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum NotificationType {
    IdeaCreated = 0,
    IdeaUpdated = 1,
    IdeaApproved = 2,
    IdeaRejected = 3,
    IdeaImplemented = 4,
    CommentAdded = 5,
    VoteReceived = 6,
    CollaborationInvite = 7,
    Mention = 8,
    System = 9,
}

smallint_enum!(NotificationType {
    IdeaCreated = 0 => "idea_created",
    IdeaUpdated = 1 => "idea_updated",
    IdeaApproved = 2 => "idea_approved",
    IdeaRejected = 3 => "idea_rejected",
    IdeaImplemented = 4 => "idea_implemented",
    CommentAdded = 5 => "comment_added",
    VoteReceived = 6 => "vote_received",
    CollaborationInvite = 7 => "collaboration_invite",
    Mention = 8 => "mention",
    System = 9 => "system",
});

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum DigestFrequency {
    #[default]
    Immediate = 0,
    Daily = 1,
    Weekly = 2,
    Never = 3,
}

smallint_enum!(DigestFrequency {
    Immediate = 0 => "immediate",
    Daily = 1 => "daily",
    Weekly = 2 => "weekly",
    Never = 3 => "never",
});

/// Kind of entity a notification may point at. Stored next to the target id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum TargetKind {
    Idea = 0,
    Comment = 1,
    Vote = 2,
    User = 3,
    Category = 4,
}

smallint_enum!(TargetKind {
    Idea = 0 => "idea",
    Comment = 1 => "comment",
    Vote = 2 => "vote",
    User = 3 => "user",
    Category = 4 => "category",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_match_display() {
        let status: IdeaStatus = serde_json::from_str("\"under_review\"").expect("parse status");
        assert_eq!(status, IdeaStatus::UnderReview);
        assert_eq!(status.to_string(), "under_review");

        let kind: NotificationType =
            serde_json::from_str("\"collaboration_invite\"").expect("parse type");
        assert_eq!(kind.as_str(), "collaboration_invite");
    }

    #[test]
    fn test_defaults() {
        assert_eq!(IdeaStatus::default(), IdeaStatus::Draft);
        assert_eq!(IdeaPriority::default(), IdeaPriority::Medium);
        assert_eq!(CollaboratorRole::default(), CollaboratorRole::Contributor);
        assert_eq!(DigestFrequency::default(), DigestFrequency::Immediate);
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert!(serde_json::from_str::<IdeaStatus>("\"published\"").is_err());
    }
}
