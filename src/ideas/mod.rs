//! Ideas and the engagement around them: votes, comments, collaborators,
//! attachments, and view tracking.

pub mod engagement;
pub mod lifecycle;
pub mod models;
pub mod service;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{delete, get, put},
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::{with_conn, ApiJson, ApiQuery, ApiResult, AppState, Page, PageParams};
use crate::security::{AuthenticatedUser, OptionalAuth};

pub use models::{Actor, Idea, IdeaDetailResponse, IdeaResponse, VoteTally};

use models::{
    CastVoteRequest, CollaboratorRequest, CollaboratorResponse, CommentListQuery, CommentResponse,
    CreateAttachmentRequest, CreateCommentRequest, CreateIdeaRequest, IdeaAttachment,
    IdeaListQuery, UpdateCommentRequest, UpdateIdeaRequest, ViewContext, VoteResponse,
};

const IP_MAX: usize = 45;

/// Client address and agent as reported by the proxy headers.
pub fn view_context(headers: &HeaderMap) -> ViewContext {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim);
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim);
    let ip_address = forwarded
        .or(real_ip)
        .filter(|ip| !ip.is_empty() && ip.len() <= IP_MAX)
        .map(str::to_string);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    ViewContext {
        ip_address,
        user_agent,
    }
}

fn actor_of(auth: &OptionalAuth) -> Option<Actor> {
    auth.0.as_ref().map(Actor::from)
}

pub async fn list_ideas(
    State(state): State<Arc<AppState>>,
    auth: OptionalAuth,
    ApiQuery(query): ApiQuery<IdeaListQuery>,
) -> ApiResult<Json<Page<IdeaResponse>>> {
    let actor = actor_of(&auth);
    let page = with_conn(&state.conn, move |conn| {
        service::list_ideas(conn, actor, &query)
    })
    .await?;
    Ok(Json(page))
}

pub async fn create_idea(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    ApiJson(req): ApiJson<CreateIdeaRequest>,
) -> ApiResult<(StatusCode, Json<IdeaDetailResponse>)> {
    let actor = Actor::from(&user);
    let idea = with_conn(&state.conn, move |conn| service::create_idea(conn, actor, req)).await?;
    Ok((StatusCode::CREATED, Json(idea)))
}

pub async fn get_idea(
    State(state): State<Arc<AppState>>,
    auth: OptionalAuth,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<IdeaDetailResponse>> {
    let actor = actor_of(&auth);
    let view = view_context(&headers);
    let idea = with_conn(&state.conn, move |conn| {
        service::get_idea(conn, id, actor, view)
    })
    .await?;
    Ok(Json(idea))
}

pub async fn update_idea(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<UpdateIdeaRequest>,
) -> ApiResult<Json<IdeaDetailResponse>> {
    let actor = Actor::from(&user);
    let idea = with_conn(&state.conn, move |conn| {
        service::update_idea(conn, id, actor, req)
    })
    .await?;
    Ok(Json(idea))
}

pub async fn delete_idea(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let actor = Actor::from(&user);
    with_conn(&state.conn, move |conn| service::delete_idea(conn, id, actor)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn cast_vote(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<CastVoteRequest>,
) -> ApiResult<Json<VoteResponse>> {
    let actor = Actor::from(&user);
    let vote = with_conn(&state.conn, move |conn| {
        engagement::cast_vote(conn, id, actor, req.vote_type)
    })
    .await?;
    Ok(Json(vote))
}

pub async fn remove_vote(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<VoteTally>> {
    let actor = Actor::from(&user);
    let tally = with_conn(&state.conn, move |conn| {
        engagement::remove_vote(conn, id, actor)
    })
    .await?;
    Ok(Json(tally))
}

pub async fn vote_tally(
    State(state): State<Arc<AppState>>,
    auth: OptionalAuth,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<VoteTally>> {
    let actor = actor_of(&auth);
    let tally = with_conn(&state.conn, move |conn| {
        service::visible_idea(conn, id, actor)?;
        engagement::vote_tally(conn, id)
    })
    .await?;
    Ok(Json(tally))
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    auth: OptionalAuth,
    Path(id): Path<Uuid>,
    ApiQuery(query): ApiQuery<CommentListQuery>,
) -> ApiResult<Json<Page<CommentResponse>>> {
    let actor = actor_of(&auth);
    let page = PageParams::new(query.limit, query.offset);
    let comments = with_conn(&state.conn, move |conn| {
        engagement::list_comments(conn, id, actor, page)
    })
    .await?;
    Ok(Json(comments))
}

pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<CreateCommentRequest>,
) -> ApiResult<(StatusCode, Json<CommentResponse>)> {
    let actor = Actor::from(&user);
    let comment = with_conn(&state.conn, move |conn| {
        engagement::create_comment(conn, id, actor, req)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn update_comment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path((id, comment_id)): Path<(Uuid, Uuid)>,
    ApiJson(req): ApiJson<UpdateCommentRequest>,
) -> ApiResult<Json<CommentResponse>> {
    let actor = Actor::from(&user);
    let comment = with_conn(&state.conn, move |conn| {
        engagement::update_comment(conn, id, comment_id, actor, req)
    })
    .await?;
    Ok(Json(comment))
}

pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path((id, comment_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let actor = Actor::from(&user);
    with_conn(&state.conn, move |conn| {
        engagement::delete_comment(conn, id, comment_id, actor)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_collaborators(
    State(state): State<Arc<AppState>>,
    auth: OptionalAuth,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<CollaboratorResponse>>> {
    let actor = actor_of(&auth);
    let collaborators = with_conn(&state.conn, move |conn| {
        service::visible_idea(conn, id, actor)?;
        engagement::list_collaborators(conn, id)
    })
    .await?;
    Ok(Json(collaborators))
}

pub async fn put_collaborator(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
    ApiJson(req): ApiJson<CollaboratorRequest>,
) -> ApiResult<Json<CollaboratorResponse>> {
    let actor = Actor::from(&user);
    let role = req.role.unwrap_or_default();
    let collaborator = with_conn(&state.conn, move |conn| {
        engagement::add_collaborator(conn, id, actor, user_id, role)
    })
    .await?;
    Ok(Json(collaborator))
}

pub async fn remove_collaborator(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let actor = Actor::from(&user);
    with_conn(&state.conn, move |conn| {
        engagement::remove_collaborator(conn, id, actor, user_id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_attachments(
    State(state): State<Arc<AppState>>,
    auth: OptionalAuth,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<IdeaAttachment>>> {
    let actor = actor_of(&auth);
    let attachments = with_conn(&state.conn, move |conn| {
        service::visible_idea(conn, id, actor)?;
        service::list_attachments(conn, id)
    })
    .await?;
    Ok(Json(attachments))
}

pub async fn add_attachment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<CreateAttachmentRequest>,
) -> ApiResult<(StatusCode, Json<IdeaAttachment>)> {
    let actor = Actor::from(&user);
    let attachment = with_conn(&state.conn, move |conn| {
        service::add_attachment(conn, id, actor, req)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(attachment)))
}

pub async fn remove_attachment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path((id, attachment_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let actor = Actor::from(&user);
    with_conn(&state.conn, move |conn| {
        service::remove_attachment(conn, id, attachment_id, actor)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_ideas_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/ideas", get(list_ideas).post(create_idea))
        .route(
            "/api/ideas/{id}",
            get(get_idea).put(update_idea).delete(delete_idea),
        )
        .route("/api/ideas/{id}/vote", put(cast_vote).delete(remove_vote))
        .route("/api/ideas/{id}/votes", get(vote_tally))
        .route(
            "/api/ideas/{id}/comments",
            get(list_comments).post(create_comment),
        )
        .route(
            "/api/ideas/{id}/comments/{comment_id}",
            put(update_comment).delete(delete_comment),
        )
        .route("/api/ideas/{id}/collaborators", get(list_collaborators))
        .route(
            "/api/ideas/{id}/collaborators/{user_id}",
            put(put_collaborator).delete(remove_collaborator),
        )
        .route(
            "/api/ideas/{id}/attachments",
            get(list_attachments).post(add_attachment),
        )
        .route(
            "/api/ideas/{id}/attachments/{attachment_id}",
            delete(remove_attachment),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_view_context_prefers_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.2"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("civic-test/1.0"));

        let view = view_context(&headers);
        assert_eq!(view.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(view.user_agent, "civic-test/1.0");
    }

    #[test]
    fn test_view_context_without_headers() {
        let view = view_context(&HeaderMap::new());
        assert!(view.ip_address.is_none());
        assert!(view.user_agent.is_empty());
    }
}
