pub mod models;
pub mod service;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use diesel::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::schema::{categories, tags};
use crate::core::shared::{with_conn, ApiJson, ApiQuery, ApiResult, AppState};
use crate::security::{AuthenticatedUser, OptionalAuth};

pub use models::{Category, CategoryResponse, Tag, TagResponse, TaxonomyRef};
pub use service::CategoryIndex;

use models::{CreateCategoryRequest, CreateTagRequest, TaxonomyListQuery, UpdateCategoryRequest};

pub struct SeedCategory {
    pub name: &'static str,
    pub slug: &'static str,
    pub description: &'static str,
    pub color: &'static str,
    pub icon: &'static str,
}

pub const DEFAULT_CATEGORIES: &[SeedCategory] = &[
    SeedCategory {
        name: "Transportation",
        slug: "transportation",
        description: "Ideas related to public transportation, roads, and mobility",
        color: "#3B82F6",
        icon: "car",
    },
    SeedCategory {
        name: "Environment",
        slug: "environment",
        description: "Environmental initiatives and sustainability projects",
        color: "#10B981",
        icon: "leaf",
    },
    SeedCategory {
        name: "Education",
        slug: "education",
        description: "Educational programs and learning initiatives",
        color: "#F59E0B",
        icon: "graduation-cap",
    },
    SeedCategory {
        name: "Public Safety",
        slug: "public-safety",
        description: "Safety and security related proposals",
        color: "#EF4444",
        icon: "shield",
    },
    SeedCategory {
        name: "Parks & Recreation",
        slug: "parks-recreation",
        description: "Parks, sports facilities, and recreational activities",
        color: "#8B5CF6",
        icon: "tree",
    },
    SeedCategory {
        name: "Infrastructure",
        slug: "infrastructure",
        description: "Public infrastructure and utilities",
        color: "#6B7280",
        icon: "wrench",
    },
    SeedCategory {
        name: "Community Services",
        slug: "community-services",
        description: "Social services and community programs",
        color: "#EC4899",
        icon: "heart",
    },
    SeedCategory {
        name: "Technology",
        slug: "technology",
        description: "Digital services and technology initiatives",
        color: "#6366F1",
        icon: "smartphone",
    },
];

/// (name/slug, color)
pub const DEFAULT_TAGS: &[(&str, &str)] = &[
    ("urgent", "#EF4444"),
    ("low-cost", "#10B981"),
    ("high-impact", "#F59E0B"),
    ("youth-focused", "#8B5CF6"),
    ("senior-friendly", "#6B7280"),
    ("accessible", "#3B82F6"),
    ("sustainable", "#10B981"),
    ("innovative", "#EC4899"),
];

/// Inserts the default categories and tags that are missing by slug.
/// Returns how many of each were created.
pub fn ensure_default_taxonomy(conn: &mut PgConnection) -> QueryResult<(usize, usize)> {
    let now = Utc::now();
    let mut created_categories = 0;
    for (position, seed) in DEFAULT_CATEGORIES.iter().enumerate() {
        let row = Category {
            id: Uuid::new_v4(),
            name: seed.name.to_string(),
            slug: seed.slug.to_string(),
            description: seed.description.to_string(),
            color: seed.color.to_string(),
            icon: seed.icon.to_string(),
            parent_id: None,
            is_active: true,
            sort_order: i32::try_from(position).unwrap_or(i32::MAX),
            created_at: now,
            updated_at: now,
        };
        created_categories += diesel::insert_into(categories::table)
            .values(&row)
            .on_conflict_do_nothing()
            .execute(conn)?;
    }

    let mut created_tags = 0;
    for (name, color) in DEFAULT_TAGS {
        let row = Tag {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: name.to_string(),
            description: String::new(),
            color: color.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        created_tags += diesel::insert_into(tags::table)
            .values(&row)
            .on_conflict_do_nothing()
            .execute(conn)?;
    }

    Ok((created_categories, created_tags))
}

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    auth: OptionalAuth,
    ApiQuery(query): ApiQuery<TaxonomyListQuery>,
) -> ApiResult<Json<Vec<CategoryResponse>>> {
    let include_inactive = query.include_inactive && auth.is_staff();
    let rows = with_conn(&state.conn, move |conn| {
        service::list_categories(conn, include_inactive)
    })
    .await?;
    Ok(Json(rows))
}

pub async fn get_category(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> ApiResult<Json<CategoryResponse>> {
    let category = with_conn(&state.conn, move |conn| service::get_category(conn, &slug)).await?;
    Ok(Json(category))
}

pub async fn create_category(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    ApiJson(req): ApiJson<CreateCategoryRequest>,
) -> ApiResult<(StatusCode, Json<CategoryResponse>)> {
    user.require_staff()?;
    let category = with_conn(&state.conn, move |conn| service::create_category(conn, req)).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(slug): Path<String>,
    ApiJson(req): ApiJson<UpdateCategoryRequest>,
) -> ApiResult<Json<CategoryResponse>> {
    user.require_staff()?;
    let category = with_conn(&state.conn, move |conn| {
        service::update_category(conn, &slug, req)
    })
    .await?;
    Ok(Json(category))
}

pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(slug): Path<String>,
) -> ApiResult<StatusCode> {
    user.require_staff()?;
    with_conn(&state.conn, move |conn| service::delete_category(conn, &slug)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_tags(
    State(state): State<Arc<AppState>>,
    auth: OptionalAuth,
    ApiQuery(query): ApiQuery<TaxonomyListQuery>,
) -> ApiResult<Json<Vec<TagResponse>>> {
    let include_inactive = query.include_inactive && auth.is_staff();
    let rows = with_conn(&state.conn, move |conn| {
        service::list_tags(conn, include_inactive)
    })
    .await?;
    Ok(Json(rows))
}

pub async fn get_tag(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> ApiResult<Json<TagResponse>> {
    let tag = with_conn(&state.conn, move |conn| service::get_tag(conn, &slug)).await?;
    Ok(Json(tag))
}

pub async fn create_tag(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    ApiJson(req): ApiJson<CreateTagRequest>,
) -> ApiResult<(StatusCode, Json<TagResponse>)> {
    user.require_staff()?;
    let tag = with_conn(&state.conn, move |conn| service::create_tag(conn, req)).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

pub fn configure_categories_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/categories", get(list_categories).post(create_category))
        .route(
            "/api/categories/{slug}",
            get(get_category).put(update_category).delete(delete_category),
        )
        .route("/api/tags", get(list_tags).post(create_tag))
        .route("/api/tags/{slug}", get(get_tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::slugify;
    use crate::security::validation::is_valid_hex_color;

    #[test]
    fn test_seed_slugs_match_names() {
        for seed in DEFAULT_CATEGORIES {
            assert_eq!(slugify(seed.name), seed.slug);
            assert!(is_valid_hex_color(seed.color));
        }
        assert_eq!(DEFAULT_CATEGORIES.len(), 8);
        assert_eq!(DEFAULT_TAGS.len(), 8);
    }
}
