//! Votes, collaborators, and comments.
//!
//! Every insert or delete here recomputes the matching counter on the idea
//! inside the same transaction.

use chrono::Utc;
use diesel::dsl::count_star;
use diesel::pg::Pg;
use diesel::prelude::*;
use log::debug;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

use super::models::{
    Actor, CollaboratorResponse, Comment, CommentResponse, CreateCommentRequest, Idea,
    IdeaCollaborator, UpdateCommentRequest, Vote, VoteResponse, VoteTally,
};
use super::service::{clamp_count, visible_idea};
use crate::core::shared::schema::{comments, idea_collaborators, ideas, users, votes};
use crate::core::shared::{
    ApiError, ApiResult, CollaboratorRole, NotificationType, Page, PageParams, VoteType,
};
use crate::notifications::{create_notification, NewNotification, NotificationTarget};
use crate::security::Validator;
use crate::users::{User, UserSummary};

const COMMENT_MAX: usize = 5000;

fn refresh_votes_count(conn: &mut PgConnection, idea_id: Uuid) -> QueryResult<i32> {
    let total: i64 = votes::table
        .filter(votes::idea_id.eq(idea_id))
        .count()
        .get_result(conn)?;
    diesel::update(ideas::table.find(idea_id))
        .set(ideas::votes_count.eq(clamp_count(total)))
        .returning(ideas::votes_count)
        .get_result(conn)
}

fn refresh_comments_count(conn: &mut PgConnection, idea_id: Uuid) -> QueryResult<i32> {
    let total: i64 = comments::table
        .filter(comments::idea_id.eq(idea_id))
        .count()
        .get_result(conn)?;
    diesel::update(ideas::table.find(idea_id))
        .set(ideas::comments_count.eq(clamp_count(total)))
        .returning(ideas::comments_count)
        .get_result(conn)
}

// ============================================================================
// VOTES
// ============================================================================

pub fn tally_from_counts(counts: impl IntoIterator<Item = (VoteType, i64)>) -> VoteTally {
    let mut tally = VoteTally::default();
    for (vote_type, count) in counts {
        match vote_type {
            VoteType::Up => tally.up += count,
            VoteType::Down => tally.down += count,
        }
    }
    tally.total = tally.up + tally.down;
    tally
}

pub fn vote_tally(conn: &mut PgConnection, idea_id: Uuid) -> ApiResult<VoteTally> {
    let counts = votes::table
        .filter(votes::idea_id.eq(idea_id))
        .group_by(votes::vote_type)
        .select((votes::vote_type, count_star()))
        .load::<(VoteType, i64)>(conn)?;
    Ok(tally_from_counts(counts))
}

/// Records or replaces the caller's vote on an idea.
pub fn cast_vote(
    conn: &mut PgConnection,
    idea_id: Uuid,
    actor: Actor,
    vote_type: VoteType,
) -> ApiResult<VoteResponse> {
    conn.transaction::<_, ApiError, _>(|conn| {
        let (idea, _) = visible_idea(conn, idea_id, Some(actor))?;

        let previous: Option<VoteType> = votes::table
            .filter(votes::idea_id.eq(idea_id))
            .filter(votes::user_id.eq(actor.user_id))
            .select(votes::vote_type)
            .first(conn)
            .optional()?;

        let now = Utc::now();
        let vote: Vote = diesel::insert_into(votes::table)
            .values(&Vote {
                id: Uuid::new_v4(),
                idea_id,
                user_id: actor.user_id,
                vote_type,
                created_at: now,
                updated_at: now,
            })
            .on_conflict((votes::idea_id, votes::user_id))
            .do_update()
            .set((votes::vote_type.eq(vote_type), votes::updated_at.eq(now)))
            .returning(Vote::as_returning())
            .get_result(conn)?;

        refresh_votes_count(conn, idea_id)?;

        if previous != Some(vote_type) && actor.user_id != idea.author_id {
            create_notification(
                conn,
                NewNotification::new(
                    idea.author_id,
                    NotificationType::VoteReceived,
                    "New vote on your idea",
                    format!("Your idea \"{}\" received a vote.", idea.title),
                )
                .from_sender(actor.user_id)
                .about(NotificationTarget::Idea(idea_id))
                .with_data(json!({ "vote_type": vote_type })),
            )?;
        }

        debug!("User {} voted {vote_type} on idea {idea_id}", actor.user_id);
        let tally = vote_tally(conn, idea_id)?;
        Ok(VoteResponse { vote, tally })
    })
}

pub fn remove_vote(conn: &mut PgConnection, idea_id: Uuid, actor: Actor) -> ApiResult<VoteTally> {
    conn.transaction::<_, ApiError, _>(|conn| {
        visible_idea(conn, idea_id, Some(actor))?;
        let deleted = diesel::delete(
            votes::table
                .filter(votes::idea_id.eq(idea_id))
                .filter(votes::user_id.eq(actor.user_id)),
        )
        .execute(conn)?;
        if deleted == 0 {
            return Err(ApiError::NotFound(
                "You have not voted on this idea".to_string(),
            ));
        }
        refresh_votes_count(conn, idea_id)?;
        vote_tally(conn, idea_id)
    })
}

// ============================================================================
// COLLABORATORS
// ============================================================================

pub fn list_collaborators(
    conn: &mut PgConnection,
    idea_id: Uuid,
) -> ApiResult<Vec<CollaboratorResponse>> {
    let rows = idea_collaborators::table
        .inner_join(users::table)
        .filter(idea_collaborators::idea_id.eq(idea_id))
        .order(idea_collaborators::joined_at.asc())
        .select((IdeaCollaborator::as_select(), User::as_select()))
        .load::<(IdeaCollaborator, User)>(conn)?;

    Ok(rows
        .into_iter()
        .map(|(collaborator, user)| CollaboratorResponse {
            user: UserSummary::from(&user),
            role: collaborator.role,
            joined_at: collaborator.joined_at,
        })
        .collect())
}

/// Adds a collaborator, or changes the role of an existing one.
pub fn add_collaborator(
    conn: &mut PgConnection,
    idea_id: Uuid,
    actor: Actor,
    user_id: Uuid,
    role: CollaboratorRole,
) -> ApiResult<CollaboratorResponse> {
    conn.transaction::<_, ApiError, _>(|conn| {
        let (idea, access) = visible_idea(conn, idea_id, Some(actor))?;
        if !access.can_manage_collaborators() {
            return Err(ApiError::Forbidden(
                "Only the author can manage collaborators".to_string(),
            ));
        }
        if user_id == idea.author_id {
            return Err(ApiError::validation(
                "user_id",
                "The author cannot be added as a collaborator.",
            ));
        }
        let user: User = users::table
            .find(user_id)
            .select(User::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

        let previous: Option<CollaboratorRole> = idea_collaborators::table
            .filter(idea_collaborators::idea_id.eq(idea_id))
            .filter(idea_collaborators::user_id.eq(user_id))
            .select(idea_collaborators::role)
            .first(conn)
            .optional()?;

        let collaborator: IdeaCollaborator = diesel::insert_into(idea_collaborators::table)
            .values(&IdeaCollaborator {
                id: Uuid::new_v4(),
                idea_id,
                user_id,
                role,
                joined_at: Utc::now(),
            })
            .on_conflict((idea_collaborators::idea_id, idea_collaborators::user_id))
            .do_update()
            .set(idea_collaborators::role.eq(role))
            .returning(IdeaCollaborator::as_returning())
            .get_result(conn)?;

        if previous != Some(role) {
            create_notification(
                conn,
                invite_notification(&idea, user_id, role).from_sender(actor.user_id),
            )?;
        }

        Ok(CollaboratorResponse {
            user: UserSummary::from(&user),
            role: collaborator.role,
            joined_at: collaborator.joined_at,
        })
    })
}

fn invite_notification(idea: &Idea, user_id: Uuid, role: CollaboratorRole) -> NewNotification {
    NewNotification::new(
        user_id,
        NotificationType::CollaborationInvite,
        "Collaboration invite",
        format!("You were added to \"{}\" as {role}.", idea.title),
    )
    .about(NotificationTarget::Idea(idea.id))
    .with_data(json!({ "role": role }))
}

pub fn remove_collaborator(
    conn: &mut PgConnection,
    idea_id: Uuid,
    actor: Actor,
    user_id: Uuid,
) -> ApiResult<()> {
    let (_, access) = visible_idea(conn, idea_id, Some(actor))?;
    if !access.can_manage_collaborators() {
        return Err(ApiError::Forbidden(
            "Only the author can manage collaborators".to_string(),
        ));
    }
    let deleted = diesel::delete(
        idea_collaborators::table
            .filter(idea_collaborators::idea_id.eq(idea_id))
            .filter(idea_collaborators::user_id.eq(user_id)),
    )
    .execute(conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound("Collaborator not found".to_string()));
    }
    Ok(())
}

// ============================================================================
// COMMENTS
// ============================================================================

fn with_authors(
    conn: &mut PgConnection,
    rows: Vec<Comment>,
) -> ApiResult<Vec<CommentResponse>> {
    let author_ids: Vec<Uuid> = rows.iter().map(|c| c.author_id).collect();
    let authors: HashMap<Uuid, UserSummary> = users::table
        .filter(users::id.eq_any(&author_ids))
        .select(User::as_select())
        .load::<User>(conn)?
        .iter()
        .map(|u| (u.id, UserSummary::from(u)))
        .collect();

    Ok(rows
        .into_iter()
        .map(|comment| {
            let author = authors.get(&comment.author_id).cloned();
            CommentResponse::new(comment, author)
        })
        .collect())
}

/// `viewer` of `None` sees everything; `Some(None)` is an anonymous caller.
fn scoped_comments(
    idea_id: Uuid,
    viewer: Option<Option<Uuid>>,
) -> comments::BoxedQuery<'static, Pg> {
    let q = comments::table
        .filter(comments::idea_id.eq(idea_id))
        .into_boxed();
    match viewer {
        None => q,
        Some(Some(user_id)) => q.filter(
            comments::is_public
                .eq(true)
                .or(comments::author_id.eq(user_id)),
        ),
        Some(None) => q.filter(comments::is_public.eq(true)),
    }
}

/// Private comments are shown to their writer, the idea author, and staff.
pub fn list_comments(
    conn: &mut PgConnection,
    idea_id: Uuid,
    actor: Option<Actor>,
    page: PageParams,
) -> ApiResult<Page<CommentResponse>> {
    let (_, access) = visible_idea(conn, idea_id, actor)?;
    let sees_all = access.is_author || access.is_staff;

    let viewer = if sees_all { None } else { Some(actor.map(|a| a.user_id)) };
    let count: i64 = scoped_comments(idea_id, viewer).count().get_result(conn)?;
    let rows: Vec<Comment> = scoped_comments(idea_id, viewer)
        .order((comments::created_at.asc(), comments::id.asc()))
        .limit(page.limit())
        .offset(page.offset())
        .select(Comment::as_select())
        .load(conn)?;

    Ok(Page::new(count, page, with_authors(conn, rows)?))
}

fn load_comment(conn: &mut PgConnection, idea_id: Uuid, comment_id: Uuid) -> ApiResult<Comment> {
    comments::table
        .filter(comments::id.eq(comment_id))
        .filter(comments::idea_id.eq(idea_id))
        .select(Comment::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))
}

pub fn create_comment(
    conn: &mut PgConnection,
    idea_id: Uuid,
    actor: Actor,
    req: CreateCommentRequest,
) -> ApiResult<CommentResponse> {
    Validator::new()
        .required("content", &req.content)
        .max_length("content", &req.content, COMMENT_MAX)
        .validate()?;

    let comment = conn.transaction::<_, ApiError, _>(|conn| {
        let (idea, _) = visible_idea(conn, idea_id, Some(actor))?;

        let parent: Option<Comment> = match req.parent_id {
            Some(parent_id) => {
                let parent: Comment = comments::table
                    .find(parent_id)
                    .select(Comment::as_select())
                    .first(conn)
                    .optional()?
                    .ok_or_else(|| {
                        ApiError::validation("parent_id", "Parent comment does not exist.")
                    })?;
                if parent.idea_id != idea_id {
                    return Err(ApiError::validation(
                        "parent_id",
                        "Parent comment must belong to the same idea.",
                    ));
                }
                Some(parent)
            }
            None => None,
        };

        let now = Utc::now();
        let comment: Comment = diesel::insert_into(comments::table)
            .values(&Comment {
                id: Uuid::new_v4(),
                idea_id,
                author_id: actor.user_id,
                parent_id: parent.as_ref().map(|p| p.id),
                content: req.content.trim().to_string(),
                is_public: req.is_public.unwrap_or(true),
                created_at: now,
                updated_at: now,
            })
            .returning(Comment::as_returning())
            .get_result(conn)?;

        refresh_comments_count(conn, idea_id)?;

        let mut recipients = Vec::with_capacity(2);
        if idea.author_id != actor.user_id {
            recipients.push(idea.author_id);
        }
        if let Some(parent) = &parent {
            if parent.author_id != actor.user_id && parent.author_id != idea.author_id {
                recipients.push(parent.author_id);
            }
        }
        for recipient in recipients {
            let message = if recipient == idea.author_id {
                format!("Someone commented on your idea \"{}\".", idea.title)
            } else {
                format!("Someone replied to your comment on \"{}\".", idea.title)
            };
            create_notification(
                conn,
                NewNotification::new(recipient, NotificationType::CommentAdded, "New comment", message)
                    .from_sender(actor.user_id)
                    .about(NotificationTarget::Comment(comment.id))
                    .with_data(json!({ "idea_id": idea_id })),
            )?;
        }

        Ok(comment)
    })?;

    Ok(with_authors(conn, vec![comment])?
        .pop()
        .ok_or_else(|| ApiError::Internal("Comment response missing".to_string()))?)
}

pub fn update_comment(
    conn: &mut PgConnection,
    idea_id: Uuid,
    comment_id: Uuid,
    actor: Actor,
    req: UpdateCommentRequest,
) -> ApiResult<CommentResponse> {
    if let Some(content) = &req.content {
        Validator::new()
            .required("content", content)
            .max_length("content", content, COMMENT_MAX)
            .validate()?;
    }

    visible_idea(conn, idea_id, Some(actor))?;
    let comment = load_comment(conn, idea_id, comment_id)?;
    if comment.author_id != actor.user_id {
        return Err(ApiError::Forbidden(
            "Only the author can edit this comment".to_string(),
        ));
    }

    let updated: Comment = diesel::update(comments::table.find(comment_id))
        .set((
            comments::content.eq(req.content.map(|c| c.trim().to_string()).unwrap_or(comment.content)),
            comments::is_public.eq(req.is_public.unwrap_or(comment.is_public)),
            comments::updated_at.eq(Utc::now()),
        ))
        .returning(Comment::as_returning())
        .get_result(conn)?;

    Ok(with_authors(conn, vec![updated])?
        .pop()
        .ok_or_else(|| ApiError::Internal("Comment response missing".to_string()))?)
}

/// Removes a comment and its replies.
pub fn delete_comment(
    conn: &mut PgConnection,
    idea_id: Uuid,
    comment_id: Uuid,
    actor: Actor,
) -> ApiResult<()> {
    conn.transaction::<_, ApiError, _>(|conn| {
        visible_idea(conn, idea_id, Some(actor))?;
        let comment = load_comment(conn, idea_id, comment_id)?;
        if comment.author_id != actor.user_id && !actor.is_staff {
            return Err(ApiError::Forbidden(
                "Only the author or staff can delete this comment".to_string(),
            ));
        }
        diesel::delete(comments::table.find(comment_id)).execute(conn)?;
        refresh_comments_count(conn, idea_id)?;
        Ok(())
    })
}
