use chrono::Utc;
use diesel::dsl::exists;
use diesel::pg::Pg;
use diesel::prelude::*;
use log::{debug, info};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::engagement;
use super::lifecycle::{self, IdeaAccess};
use super::models::{
    Actor, CollaboratorResponse, CreateAttachmentRequest, CreateIdeaRequest, Idea,
    IdeaAttachment, IdeaCategory, IdeaChangeset, IdeaDetailResponse,
    IdeaListQuery, IdeaResponse, IdeaTag, IdeaView, UpdateIdeaRequest, ViewContext,
};
use crate::categories::TaxonomyRef;
use crate::core::shared::schema::{
    categories, idea_attachments, idea_categories, idea_collaborators, idea_tags, idea_views,
    ideas, tags, users, votes,
};
use crate::core::shared::{
    parse_ordering, ApiError, ApiResult, IdeaStatus, NotificationType, Page, PageParams, VoteType,
};
use crate::notifications::{create_notification, NewNotification, NotificationTarget};
use crate::security::Validator;
use crate::users::{User, UserSummary};

pub(crate) fn clamp_count(count: i64) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

pub fn load_idea(conn: &mut PgConnection, idea_id: Uuid) -> ApiResult<Idea> {
    ideas::table
        .find(idea_id)
        .select(Idea::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Idea not found".to_string()))
}

pub fn is_collaborator(conn: &mut PgConnection, idea_id: Uuid, user_id: Uuid) -> QueryResult<bool> {
    diesel::select(exists(
        idea_collaborators::table
            .filter(idea_collaborators::idea_id.eq(idea_id))
            .filter(idea_collaborators::user_id.eq(user_id)),
    ))
    .get_result(conn)
}

pub fn access_for(
    conn: &mut PgConnection,
    idea: &Idea,
    actor: Option<Actor>,
) -> ApiResult<IdeaAccess> {
    let collaborator = match actor {
        Some(actor) if actor.user_id != idea.author_id => {
            is_collaborator(conn, idea.id, actor.user_id)?
        }
        _ => false,
    };
    Ok(IdeaAccess::resolve(idea, actor, collaborator))
}

/// Loads an idea the caller may see. Hidden drafts read as missing.
pub fn visible_idea(
    conn: &mut PgConnection,
    idea_id: Uuid,
    actor: Option<Actor>,
) -> ApiResult<(Idea, IdeaAccess)> {
    let idea = load_idea(conn, idea_id)?;
    let access = access_for(conn, &idea, actor)?;
    if !access.can_view(idea.status) {
        return Err(ApiError::NotFound("Idea not found".to_string()));
    }
    Ok((idea, access))
}

fn ensure_ids_exist(
    conn: &mut PgConnection,
    category_ids: Option<&[Uuid]>,
    tag_ids: Option<&[Uuid]>,
) -> ApiResult<()> {
    let mut validator = Validator::new();

    if let Some(ids) = category_ids {
        let wanted: HashSet<Uuid> = ids.iter().copied().collect();
        let found: HashSet<Uuid> = categories::table
            .filter(categories::id.eq_any(&wanted.iter().copied().collect::<Vec<_>>()))
            .select(categories::id)
            .load::<Uuid>(conn)?
            .into_iter()
            .collect();
        for missing in wanted.difference(&found) {
            validator
                .errors_mut()
                .add("category_ids", format!("Invalid pk \"{missing}\" - object does not exist."));
        }
    }

    if let Some(ids) = tag_ids {
        let wanted: HashSet<Uuid> = ids.iter().copied().collect();
        let found: HashSet<Uuid> = tags::table
            .filter(tags::id.eq_any(&wanted.iter().copied().collect::<Vec<_>>()))
            .select(tags::id)
            .load::<Uuid>(conn)?
            .into_iter()
            .collect();
        for missing in wanted.difference(&found) {
            validator
                .errors_mut()
                .add("tag_ids", format!("Invalid pk \"{missing}\" - object does not exist."));
        }
    }

    validator.validate()
}

/// Replaces the category and/or tag sets. `None` leaves a set untouched.
pub fn replace_taxonomy(
    conn: &mut PgConnection,
    idea_id: Uuid,
    category_ids: Option<&[Uuid]>,
    tag_ids: Option<&[Uuid]>,
) -> ApiResult<()> {
    ensure_ids_exist(conn, category_ids, tag_ids)?;

    if let Some(ids) = category_ids {
        diesel::delete(idea_categories::table.filter(idea_categories::idea_id.eq(idea_id)))
            .execute(conn)?;
        let rows: Vec<IdeaCategory> = ids
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .map(|&category_id| IdeaCategory {
                idea_id,
                category_id,
            })
            .collect();
        if !rows.is_empty() {
            diesel::insert_into(idea_categories::table)
                .values(&rows)
                .execute(conn)?;
        }
    }

    if let Some(ids) = tag_ids {
        diesel::delete(idea_tags::table.filter(idea_tags::idea_id.eq(idea_id))).execute(conn)?;
        let rows: Vec<IdeaTag> = ids
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .map(|&tag_id| IdeaTag { idea_id, tag_id })
            .collect();
        if !rows.is_empty() {
            diesel::insert_into(idea_tags::table)
                .values(&rows)
                .execute(conn)?;
        }
    }

    Ok(())
}

fn group_refs(rows: Vec<(Uuid, TaxonomyRef)>) -> HashMap<Uuid, Vec<TaxonomyRef>> {
    let mut grouped: HashMap<Uuid, Vec<TaxonomyRef>> = HashMap::new();
    for (idea_id, taxonomy) in rows {
        grouped.entry(idea_id).or_default().push(taxonomy);
    }
    grouped
}

/// Decorates ideas with author, taxonomy, and the viewer's own vote.
pub fn build_responses(
    conn: &mut PgConnection,
    rows: Vec<Idea>,
    viewer: Option<Uuid>,
) -> ApiResult<Vec<IdeaResponse>> {
    let idea_ids: Vec<Uuid> = rows.iter().map(|i| i.id).collect();
    let author_ids: Vec<Uuid> = rows.iter().map(|i| i.author_id).collect();

    let authors: HashMap<Uuid, UserSummary> = users::table
        .filter(users::id.eq_any(&author_ids))
        .select(User::as_select())
        .load::<User>(conn)?
        .iter()
        .map(|u| (u.id, UserSummary::from(u)))
        .collect();

    let mut category_refs = group_refs(
        idea_categories::table
            .inner_join(categories::table)
            .filter(idea_categories::idea_id.eq_any(&idea_ids))
            .order(categories::sort_order.asc())
            .select((
                idea_categories::idea_id,
                (categories::id, categories::name, categories::slug, categories::color),
            ))
            .load::<(Uuid, TaxonomyRef)>(conn)?,
    );
    let mut tag_refs = group_refs(
        idea_tags::table
            .inner_join(tags::table)
            .filter(idea_tags::idea_id.eq_any(&idea_ids))
            .order(tags::name.asc())
            .select((
                idea_tags::idea_id,
                (tags::id, tags::name, tags::slug, tags::color),
            ))
            .load::<(Uuid, TaxonomyRef)>(conn)?,
    );

    let own_votes: HashMap<Uuid, VoteType> = match viewer {
        Some(user_id) => votes::table
            .filter(votes::user_id.eq(user_id))
            .filter(votes::idea_id.eq_any(&idea_ids))
            .select((votes::idea_id, votes::vote_type))
            .load::<(Uuid, VoteType)>(conn)?
            .into_iter()
            .collect(),
        None => HashMap::new(),
    };

    Ok(rows
        .into_iter()
        .map(|idea| IdeaResponse {
            author: authors.get(&idea.author_id).cloned(),
            categories: category_refs.remove(&idea.id).unwrap_or_default(),
            tags: tag_refs.remove(&idea.id).unwrap_or_default(),
            user_vote: own_votes.get(&idea.id).copied(),
            idea,
        })
        .collect())
}

pub fn list_attachments(conn: &mut PgConnection, idea_id: Uuid) -> ApiResult<Vec<IdeaAttachment>> {
    Ok(idea_attachments::table
        .filter(idea_attachments::idea_id.eq(idea_id))
        .order(idea_attachments::uploaded_at.desc())
        .select(IdeaAttachment::as_select())
        .load(conn)?)
}

pub fn detail(
    conn: &mut PgConnection,
    idea: Idea,
    viewer: Option<Uuid>,
) -> ApiResult<IdeaDetailResponse> {
    let idea_id = idea.id;
    let summary = build_responses(conn, vec![idea], viewer)?
        .pop()
        .ok_or_else(|| ApiError::Internal("Idea response missing".to_string()))?;
    let attachments = list_attachments(conn, idea_id)?;
    let collaborators: Vec<CollaboratorResponse> = engagement::list_collaborators(conn, idea_id)?;
    let vote_tally = engagement::vote_tally(conn, idea_id)?;

    Ok(IdeaDetailResponse {
        summary,
        attachments,
        collaborators,
        vote_tally,
    })
}

pub fn create_idea(
    conn: &mut PgConnection,
    actor: Actor,
    req: CreateIdeaRequest,
) -> ApiResult<IdeaDetailResponse> {
    lifecycle::validate_create(&req)?;

    let now = Utc::now();
    let status = req.status.unwrap_or_default();
    let idea = Idea {
        id: Uuid::new_v4(),
        title: req.title.trim().to_string(),
        description: req.description,
        summary: req.summary,
        author_id: actor.user_id,
        status,
        priority: req.priority.unwrap_or_default(),
        location: req.location,
        scope: req.scope,
        estimated_cost: req.estimated_cost,
        estimated_timeline: req.estimated_timeline,
        implementation_plan: req.implementation_plan,
        image: req.image.filter(|i| !i.is_empty()),
        views_count: 0,
        votes_count: 0,
        comments_count: 0,
        created_at: now,
        updated_at: now,
        published_at: lifecycle::next_published_at(None, status, None, now),
    };

    let idea = conn.transaction::<_, ApiError, _>(|conn| {
        let idea: Idea = diesel::insert_into(ideas::table)
            .values(&idea)
            .returning(Idea::as_returning())
            .get_result(conn)?;
        replace_taxonomy(
            conn,
            idea.id,
            Some(&req.category_ids),
            Some(&req.tag_ids),
        )?;
        Ok(idea)
    })?;

    info!("Idea {} created by {}", idea.id, actor.user_id);
    detail(conn, idea, Some(actor.user_id))
}

/// Returns the idea and records the view.
pub fn get_idea(
    conn: &mut PgConnection,
    idea_id: Uuid,
    actor: Option<Actor>,
    view: ViewContext,
) -> ApiResult<IdeaDetailResponse> {
    visible_idea(conn, idea_id, actor)?;

    let idea = conn.transaction::<_, ApiError, _>(|conn| {
        diesel::insert_into(idea_views::table)
            .values(&IdeaView {
                id: Uuid::new_v4(),
                idea_id,
                user_id: actor.map(|a| a.user_id),
                ip_address: view.ip_address,
                user_agent: view.user_agent,
                viewed_at: Utc::now(),
            })
            .execute(conn)?;
        let views: i64 = idea_views::table
            .filter(idea_views::idea_id.eq(idea_id))
            .count()
            .get_result(conn)?;
        Ok(diesel::update(ideas::table.find(idea_id))
            .set(ideas::views_count.eq(clamp_count(views)))
            .returning(Idea::as_returning())
            .get_result(conn)?)
    })?;

    detail(conn, idea, actor.map(|a| a.user_id))
}

fn filtered_ideas(query: &IdeaListQuery, actor: Option<Actor>) -> ideas::BoxedQuery<'static, Pg> {
    let mut q = ideas::table.into_boxed();

    match actor {
        Some(actor) if actor.is_staff => {}
        Some(actor) => {
            q = q.filter(
                ideas::status
                    .ne(IdeaStatus::Draft)
                    .or(ideas::author_id.eq(actor.user_id))
                    .or(ideas::id.eq_any(
                        idea_collaborators::table
                            .filter(idea_collaborators::user_id.eq(actor.user_id))
                            .select(idea_collaborators::idea_id),
                    )),
            );
        }
        None => q = q.filter(ideas::status.ne(IdeaStatus::Draft)),
    }

    if let Some(status) = query.status {
        q = q.filter(ideas::status.eq(status));
    }
    if let Some(priority) = query.priority {
        q = q.filter(ideas::priority.eq(priority));
    }
    if let Some(author) = query.author {
        q = q.filter(ideas::author_id.eq(author));
    }
    if let Some(slug) = query.category.clone().filter(|s| !s.is_empty()) {
        q = q.filter(
            ideas::id.eq_any(
                idea_categories::table
                    .inner_join(categories::table)
                    .filter(categories::slug.eq(slug))
                    .select(idea_categories::idea_id),
            ),
        );
    }
    if let Some(slug) = query.tag.clone().filter(|s| !s.is_empty()) {
        q = q.filter(
            ideas::id.eq_any(
                idea_tags::table
                    .inner_join(tags::table)
                    .filter(tags::slug.eq(slug))
                    .select(idea_tags::idea_id),
            ),
        );
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{search}%");
        q = q.filter(
            ideas::title
                .ilike(pattern.clone())
                .or(ideas::description.ilike(pattern.clone()))
                .or(ideas::summary.ilike(pattern)),
        );
    }
    q
}

pub fn list_ideas(
    conn: &mut PgConnection,
    actor: Option<Actor>,
    query: &IdeaListQuery,
) -> ApiResult<Page<IdeaResponse>> {
    let page = PageParams::new(query.limit, query.offset);
    let count: i64 = filtered_ideas(query, actor).count().get_result(conn)?;

    let ordering = query.ordering.as_deref().unwrap_or("-created_at");
    let q = filtered_ideas(query, actor);
    let q = match parse_ordering(ordering) {
        ("created_at", false) => q.order(ideas::created_at.asc()),
        ("created_at", true) => q.order(ideas::created_at.desc()),
        ("votes_count", false) => q.order(ideas::votes_count.asc()),
        ("votes_count", true) => q.order(ideas::votes_count.desc()),
        ("views_count", false) => q.order(ideas::views_count.asc()),
        ("views_count", true) => q.order(ideas::views_count.desc()),
        ("comments_count", false) => q.order(ideas::comments_count.asc()),
        ("comments_count", true) => q.order(ideas::comments_count.desc()),
        _ => {
            return Err(ApiError::validation(
                "ordering",
                format!("Unsupported ordering '{ordering}'"),
            ))
        }
    };

    let rows: Vec<Idea> = q
        .then_order_by(ideas::id.asc())
        .limit(page.limit())
        .offset(page.offset())
        .select(Idea::as_select())
        .load(conn)?;

    let results = build_responses(conn, rows, actor.map(|a| a.user_id))?;
    Ok(Page::new(count, page, results))
}

fn idea_notification(idea: &Idea, kind: NotificationType) -> NewNotification {
    let (title, verb) = match kind {
        NotificationType::IdeaApproved => ("Your idea was approved", "approved"),
        NotificationType::IdeaRejected => ("Your idea was rejected", "rejected"),
        NotificationType::IdeaImplemented => ("Your idea was implemented", "marked as implemented"),
        _ => ("Your idea was updated", "updated"),
    };
    NewNotification::new(
        idea.author_id,
        kind,
        title,
        format!("\"{}\" was {verb}.", idea.title),
    )
    .about(NotificationTarget::Idea(idea.id))
    .with_data(json!({ "status": idea.status }))
}

pub fn update_idea(
    conn: &mut PgConnection,
    idea_id: Uuid,
    actor: Actor,
    req: UpdateIdeaRequest,
) -> ApiResult<IdeaDetailResponse> {
    lifecycle::validate_update(&req)?;

    let idea = conn.transaction::<_, ApiError, _>(|conn| {
        let (current, access) = visible_idea(conn, idea_id, Some(actor))?;
        if !access.can_edit() {
            return Err(ApiError::Forbidden(
                "Only the author or collaborators can edit this idea".to_string(),
            ));
        }

        let now = Utc::now();
        let previous_status = current.status;
        let next_status = req.status.unwrap_or(previous_status);
        let published_at = lifecycle::next_published_at(
            Some(previous_status),
            next_status,
            current.published_at,
            now,
        );

        let changes = IdeaChangeset {
            title: req.title.map(|t| t.trim().to_string()),
            description: req.description,
            summary: req.summary,
            status: req.status,
            priority: req.priority,
            location: req.location,
            scope: req.scope,
            estimated_cost: req.estimated_cost,
            estimated_timeline: req.estimated_timeline,
            implementation_plan: req.implementation_plan,
            image: req.image,
            published_at: (published_at != current.published_at).then_some(published_at),
            updated_at: Some(now),
        };

        let updated: Idea = diesel::update(ideas::table.find(idea_id))
            .set(&changes)
            .returning(Idea::as_returning())
            .get_result(conn)?;

        replace_taxonomy(
            conn,
            idea_id,
            req.category_ids.as_deref(),
            req.tag_ids.as_deref(),
        )?;

        let edited_by_author = actor.user_id == updated.author_id;
        if let Some(kind) = lifecycle::author_notice(previous_status, next_status, edited_by_author) {
            create_notification(conn, idea_notification(&updated, kind).from_sender(actor.user_id))?;
        }

        Ok(updated)
    })?;

    debug!("Idea {} updated by {}", idea.id, actor.user_id);
    detail(conn, idea, Some(actor.user_id))
}

pub fn delete_idea(conn: &mut PgConnection, idea_id: Uuid, actor: Actor) -> ApiResult<()> {
    let (_, access) = visible_idea(conn, idea_id, Some(actor))?;
    if !access.can_delete() {
        return Err(ApiError::Forbidden(
            "Only the author or staff can delete this idea".to_string(),
        ));
    }
    diesel::delete(ideas::table.find(idea_id)).execute(conn)?;
    info!("Idea {idea_id} deleted by {}", actor.user_id);
    Ok(())
}

pub fn add_attachment(
    conn: &mut PgConnection,
    idea_id: Uuid,
    actor: Actor,
    req: CreateAttachmentRequest,
) -> ApiResult<IdeaAttachment> {
    Validator::new()
        .required("file", &req.file)
        .max_length("file", &req.file, lifecycle::FILE_MAX)
        .required("title", &req.title)
        .max_length("title", &req.title, lifecycle::TITLE_MAX)
        .validate()?;

    let (_, access) = visible_idea(conn, idea_id, Some(actor))?;
    if !access.can_edit() {
        return Err(ApiError::Forbidden(
            "Only the author or collaborators can attach files".to_string(),
        ));
    }

    let attachment = IdeaAttachment {
        id: Uuid::new_v4(),
        idea_id,
        file: req.file,
        title: req.title.trim().to_string(),
        description: req.description,
        attachment_type: req.attachment_type,
        uploaded_by: actor.user_id,
        uploaded_at: Utc::now(),
    };
    Ok(diesel::insert_into(idea_attachments::table)
        .values(&attachment)
        .returning(IdeaAttachment::as_returning())
        .get_result(conn)?)
}

pub fn remove_attachment(
    conn: &mut PgConnection,
    idea_id: Uuid,
    attachment_id: Uuid,
    actor: Actor,
) -> ApiResult<()> {
    let (_, access) = visible_idea(conn, idea_id, Some(actor))?;
    let attachment: IdeaAttachment = idea_attachments::table
        .filter(idea_attachments::id.eq(attachment_id))
        .filter(idea_attachments::idea_id.eq(idea_id))
        .select(IdeaAttachment::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Attachment not found".to_string()))?;

    if attachment.uploaded_by != actor.user_id && !access.can_delete() {
        return Err(ApiError::Forbidden(
            "Only the uploader, the author, or staff can remove this attachment".to_string(),
        ));
    }
    diesel::delete(idea_attachments::table.find(attachment_id)).execute(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_count() {
        assert_eq!(clamp_count(12), 12);
        assert_eq!(clamp_count(i64::MAX), i32::MAX);
    }

    #[test]
    fn test_group_refs_keeps_order_per_idea() {
        let idea = Uuid::new_v4();
        let other = Uuid::new_v4();
        let taxonomy = |slug: &str| TaxonomyRef {
            id: Uuid::new_v4(),
            name: slug.to_string(),
            slug: slug.to_string(),
            color: "#3B82F6".to_string(),
        };
        let grouped = group_refs(vec![
            (idea, taxonomy("transportation")),
            (other, taxonomy("education")),
            (idea, taxonomy("environment")),
        ]);
        let slugs: Vec<&str> = grouped[&idea].iter().map(|t| t.slug.as_str()).collect();
        assert_eq!(slugs, ["transportation", "environment"]);
        assert_eq!(grouped[&other].len(), 1);
    }

    #[test]
    fn test_status_change_message() {
        let now = Utc::now();
        let idea = Idea {
            id: Uuid::new_v4(),
            title: "Community garden".into(),
            description: "Turn the empty lot into a garden".into(),
            summary: String::new(),
            author_id: Uuid::new_v4(),
            status: IdeaStatus::Approved,
            priority: Default::default(),
            location: String::new(),
            scope: String::new(),
            estimated_cost: None,
            estimated_timeline: String::new(),
            implementation_plan: String::new(),
            image: None,
            views_count: 0,
            votes_count: 0,
            comments_count: 0,
            created_at: now,
            updated_at: now,
            published_at: None,
        };
        let n = idea_notification(&idea, NotificationType::IdeaApproved);
        assert_eq!(n.recipient_id, idea.author_id);
        assert_eq!(n.message, "\"Community garden\" was approved.");
        assert_eq!(n.target, Some(NotificationTarget::Idea(idea.id)));
        assert_eq!(n.data["status"], "approved");
    }
}
