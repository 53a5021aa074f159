use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::categories::TaxonomyRef;
use crate::core::shared::schema::{
    comments, idea_attachments, idea_categories, idea_collaborators, idea_tags, idea_views, ideas,
    votes,
};
use crate::core::shared::{
    deserialize_some, AttachmentType, CollaboratorRole, IdeaPriority, IdeaStatus, VoteType,
};
use crate::security::AuthenticatedUser;
use crate::users::UserSummary;

/// Identity an operation runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub is_staff: bool,
}

impl Actor {
    pub fn new(user_id: Uuid, is_staff: bool) -> Self {
        Self { user_id, is_staff }
    }
}

impl From<&AuthenticatedUser> for Actor {
    fn from(user: &AuthenticatedUser) -> Self {
        Self::new(user.user_id, user.is_staff)
    }
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Insertable, Identifiable)]
#[diesel(table_name = ideas)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Idea {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub summary: String,
    pub author_id: Uuid,
    pub status: IdeaStatus,
    pub priority: IdeaPriority,
    pub location: String,
    pub scope: String,
    pub estimated_cost: Option<BigDecimal>,
    pub estimated_timeline: String,
    pub implementation_plan: String,
    pub image: Option<String>,
    pub views_count: i32,
    pub votes_count: i32,
    pub comments_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = ideas)]
pub struct IdeaChangeset {
    pub title: Option<String>,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub status: Option<IdeaStatus>,
    pub priority: Option<IdeaPriority>,
    pub location: Option<String>,
    pub scope: Option<String>,
    pub estimated_cost: Option<Option<BigDecimal>>,
    pub estimated_timeline: Option<String>,
    pub implementation_plan: Option<String>,
    pub image: Option<Option<String>>,
    pub published_at: Option<Option<DateTime<Utc>>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Insertable)]
#[diesel(table_name = idea_categories)]
pub struct IdeaCategory {
    pub idea_id: Uuid,
    pub category_id: Uuid,
}

#[derive(Debug, Clone, Copy, Insertable)]
#[diesel(table_name = idea_tags)]
pub struct IdeaTag {
    pub idea_id: Uuid,
    pub tag_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = idea_attachments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct IdeaAttachment {
    pub id: Uuid,
    pub idea_id: Uuid,
    pub file: String,
    pub title: String,
    pub description: String,
    pub attachment_type: AttachmentType,
    pub uploaded_by: Uuid,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = idea_collaborators)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct IdeaCollaborator {
    pub id: Uuid,
    pub idea_id: Uuid,
    pub user_id: Uuid,
    pub role: CollaboratorRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = votes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Vote {
    pub id: Uuid,
    pub idea_id: Uuid,
    pub user_id: Uuid,
    pub vote_type: VoteType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = comments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Comment {
    pub id: Uuid,
    pub idea_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = idea_views)]
pub struct IdeaView {
    pub id: Uuid,
    pub idea_id: Uuid,
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub viewed_at: DateTime<Utc>,
}

/// Request metadata stored with each recorded view.
#[derive(Debug, Clone, Default)]
pub struct ViewContext {
    pub ip_address: Option<String>,
    pub user_agent: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VoteTally {
    pub up: i64,
    pub down: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdeaResponse {
    #[serde(flatten)]
    pub idea: Idea,
    pub author: Option<UserSummary>,
    pub categories: Vec<TaxonomyRef>,
    pub tags: Vec<TaxonomyRef>,
    pub user_vote: Option<VoteType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollaboratorResponse {
    pub user: UserSummary,
    pub role: CollaboratorRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdeaDetailResponse {
    #[serde(flatten)]
    pub summary: IdeaResponse,
    pub attachments: Vec<IdeaAttachment>,
    pub collaborators: Vec<CollaboratorResponse>,
    pub vote_tally: VoteTally,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentResponse {
    pub id: Uuid,
    pub idea_id: Uuid,
    pub author: Option<UserSummary>,
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommentResponse {
    pub fn new(comment: Comment, author: Option<UserSummary>) -> Self {
        Self {
            id: comment.id,
            idea_id: comment.idea_id,
            author,
            parent_id: comment.parent_id,
            content: comment.content,
            is_public: comment.is_public,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteResponse {
    pub vote: Vote,
    pub tally: VoteTally,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateIdeaRequest {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub summary: String,
    pub status: Option<IdeaStatus>,
    pub priority: Option<IdeaPriority>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub scope: String,
    pub estimated_cost: Option<BigDecimal>,
    #[serde(default)]
    pub estimated_timeline: String,
    #[serde(default)]
    pub implementation_plan: String,
    pub image: Option<String>,
    #[serde(default)]
    pub category_ids: Vec<Uuid>,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateIdeaRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub status: Option<IdeaStatus>,
    pub priority: Option<IdeaPriority>,
    pub location: Option<String>,
    pub scope: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub estimated_cost: Option<Option<BigDecimal>>,
    pub estimated_timeline: Option<String>,
    pub implementation_plan: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub image: Option<Option<String>>,
    pub category_ids: Option<Vec<Uuid>>,
    pub tag_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdeaListQuery {
    pub status: Option<IdeaStatus>,
    pub priority: Option<IdeaPriority>,
    pub author: Option<Uuid>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CastVoteRequest {
    pub vote_type: VoteType,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollaboratorRequest {
    pub role: Option<CollaboratorRole>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
    pub parent_id: Option<Uuid>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCommentRequest {
    pub content: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAttachmentRequest {
    pub file: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attachment_type: AttachmentType,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_update_distinguishes_cleared_cost() {
        let cleared: UpdateIdeaRequest =
            serde_json::from_str(r#"{"estimated_cost": null}"#).expect("parse");
        assert_eq!(cleared.estimated_cost, Some(None));

        let untouched: UpdateIdeaRequest = serde_json::from_str("{}").expect("parse");
        assert!(untouched.estimated_cost.is_none());

        let set: UpdateIdeaRequest =
            serde_json::from_str(r#"{"estimated_cost": "1500.50"}"#).expect("parse");
        assert_eq!(
            set.estimated_cost,
            Some(Some(BigDecimal::from_str("1500.50").expect("decimal")))
        );
    }

    #[test]
    fn test_create_defaults() {
        let req: CreateIdeaRequest = serde_json::from_str(
            r#"{"title": "Protected bike lanes", "description": "Separate cyclists from traffic"}"#,
        )
        .expect("parse");
        assert!(req.status.is_none());
        assert!(req.category_ids.is_empty());
        assert_eq!(req.summary, "");
    }
}
