use chrono::Utc;
use diesel::dsl::count_star;
use diesel::prelude::*;
use log::info;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::models::{
    Category, CategoryChangeset, CategoryResponse, CreateCategoryRequest, CreateTagRequest, Tag,
    TagResponse, UpdateCategoryRequest, DEFAULT_CATEGORY_COLOR, DEFAULT_TAG_COLOR,
};
use crate::core::shared::schema::{categories, idea_categories, idea_tags, tags};
use crate::core::shared::{slugify, ApiError, ApiResult};
use crate::security::Validator;

/// In-memory view of the category tree used for path rendering and cycle
/// checks. Categories are few, so the whole table is loaded.
#[derive(Debug, Default)]
pub struct CategoryIndex {
    nodes: HashMap<Uuid, (String, Option<Uuid>)>,
}

impl CategoryIndex {
    pub fn from_categories<'a>(rows: impl IntoIterator<Item = &'a Category>) -> Self {
        Self {
            nodes: rows
                .into_iter()
                .map(|c| (c.id, (c.name.clone(), c.parent_id)))
                .collect(),
        }
    }

    pub fn load(conn: &mut PgConnection) -> QueryResult<Self> {
        let rows: Vec<(Uuid, String, Option<Uuid>)> = categories::table
            .select((categories::id, categories::name, categories::parent_id))
            .load(conn)?;
        Ok(Self {
            nodes: rows
                .into_iter()
                .map(|(id, name, parent)| (id, (name, parent)))
                .collect(),
        })
    }

    pub fn parent_of(&self, id: Uuid) -> Option<Uuid> {
        self.nodes.get(&id).and_then(|(_, parent)| *parent)
    }

    /// True when making `proposed_parent` the parent of `category_id` would
    /// close a loop in the tree.
    pub fn creates_cycle(&self, category_id: Uuid, proposed_parent: Option<Uuid>) -> bool {
        let mut seen = HashSet::new();
        let mut current = proposed_parent;
        while let Some(id) = current {
            if id == category_id || !seen.insert(id) {
                return true;
            }
            current = self.parent_of(id);
        }
        false
    }

    /// Ancestor names joined root first, e.g. `Infrastructure > Roads`.
    pub fn full_path(&self, id: Uuid) -> String {
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(id);
        while let Some(node) = current {
            if !seen.insert(node) {
                break;
            }
            match self.nodes.get(&node) {
                Some((name, parent)) => {
                    names.push(name.as_str());
                    current = *parent;
                }
                None => break,
            }
        }
        names.reverse();
        names.join(" > ")
    }
}

fn category_idea_counts(
    conn: &mut PgConnection,
    ids: &[Uuid],
) -> QueryResult<HashMap<Uuid, i64>> {
    Ok(idea_categories::table
        .filter(idea_categories::category_id.eq_any(ids))
        .group_by(idea_categories::category_id)
        .select((idea_categories::category_id, count_star()))
        .load::<(Uuid, i64)>(conn)?
        .into_iter()
        .collect())
}

fn tag_idea_counts(conn: &mut PgConnection, ids: &[Uuid]) -> QueryResult<HashMap<Uuid, i64>> {
    Ok(idea_tags::table
        .filter(idea_tags::tag_id.eq_any(ids))
        .group_by(idea_tags::tag_id)
        .select((idea_tags::tag_id, count_star()))
        .load::<(Uuid, i64)>(conn)?
        .into_iter()
        .collect())
}

fn category_responses(
    conn: &mut PgConnection,
    rows: Vec<Category>,
) -> ApiResult<Vec<CategoryResponse>> {
    let index = CategoryIndex::load(conn)?;
    let ids: Vec<Uuid> = rows.iter().map(|c| c.id).collect();
    let counts = category_idea_counts(conn, &ids)?;
    Ok(rows
        .into_iter()
        .map(|category| CategoryResponse {
            full_path: index.full_path(category.id),
            ideas_count: counts.get(&category.id).copied().unwrap_or(0),
            category,
        })
        .collect())
}

fn find_category(conn: &mut PgConnection, slug: &str) -> ApiResult<Category> {
    categories::table
        .filter(categories::slug.eq(slug))
        .select(Category::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("Category '{slug}' not found")))
}

fn resolve_slug(field: &str, explicit: Option<&str>, name: &str) -> ApiResult<String> {
    let slug = match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => slug.to_string(),
        None => slugify(name),
    };
    Validator::new().slug(field, &slug).validate()?;
    Ok(slug)
}

pub fn list_categories(
    conn: &mut PgConnection,
    include_inactive: bool,
) -> ApiResult<Vec<CategoryResponse>> {
    let mut query = categories::table.into_boxed();
    if !include_inactive {
        query = query.filter(categories::is_active.eq(true));
    }
    let rows = query
        .order((categories::sort_order.asc(), categories::name.asc()))
        .select(Category::as_select())
        .load(conn)?;
    category_responses(conn, rows)
}

pub fn get_category(conn: &mut PgConnection, slug: &str) -> ApiResult<CategoryResponse> {
    let category = find_category(conn, slug)?;
    let mut responses = category_responses(conn, vec![category])?;
    responses
        .pop()
        .ok_or_else(|| ApiError::NotFound(format!("Category '{slug}' not found")))
}

pub fn create_category(
    conn: &mut PgConnection,
    req: CreateCategoryRequest,
) -> ApiResult<CategoryResponse> {
    let color = req
        .color
        .unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string());
    let order = req.order.unwrap_or(0);
    Validator::new()
        .required("name", &req.name)
        .max_length("name", &req.name, 100)
        .hex_color("color", &color)
        .max_length("icon", &req.icon, 50)
        .custom("order", order >= 0, "Ensure this value is greater than or equal to 0.")
        .validate()?;
    let slug = resolve_slug("slug", req.slug.as_deref(), &req.name)?;

    if let Some(parent_id) = req.parent_id {
        let exists: bool = diesel::select(diesel::dsl::exists(categories::table.find(parent_id)))
            .get_result(conn)?;
        if !exists {
            return Err(ApiError::validation("parent_id", "Parent category does not exist."));
        }
    }

    let now = Utc::now();
    let category = Category {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        slug,
        description: req.description,
        color,
        icon: req.icon,
        parent_id: req.parent_id,
        is_active: req.is_active.unwrap_or(true),
        sort_order: order,
        created_at: now,
        updated_at: now,
    };

    let saved: Category = diesel::insert_into(categories::table)
        .values(&category)
        .returning(Category::as_returning())
        .get_result(conn)?;
    info!("Created category {}", saved.slug);
    get_category(conn, &saved.slug)
}

pub fn update_category(
    conn: &mut PgConnection,
    slug: &str,
    req: UpdateCategoryRequest,
) -> ApiResult<CategoryResponse> {
    let category = find_category(conn, slug)?;

    let mut validator = Validator::new();
    if let Some(name) = &req.name {
        validator = validator.required("name", name).max_length("name", name, 100);
    }
    if let Some(color) = &req.color {
        validator = validator.hex_color("color", color);
    }
    if let Some(icon) = &req.icon {
        validator = validator.max_length("icon", icon, 50);
    }
    if let Some(order) = req.order {
        validator = validator.custom(
            "order",
            order >= 0,
            "Ensure this value is greater than or equal to 0.",
        );
    }
    validator.validate()?;

    let new_slug = match req.slug.as_deref() {
        Some(s) => {
            let name = req.name.as_deref().unwrap_or(&category.name);
            Some(resolve_slug("slug", Some(s), name)?)
        }
        None => None,
    };

    if let Some(Some(parent_id)) = req.parent_id {
        if parent_id == category.id {
            return Err(ApiError::validation(
                "parent_id",
                "A category cannot be its own parent.",
            ));
        }
        let index = CategoryIndex::load(conn)?;
        if !index.nodes.contains_key(&parent_id) {
            return Err(ApiError::validation("parent_id", "Parent category does not exist."));
        }
        if index.creates_cycle(category.id, Some(parent_id)) {
            return Err(ApiError::validation(
                "parent_id",
                "This parent would create a cycle in the category tree.",
            ));
        }
    }

    let changes = CategoryChangeset {
        name: req.name.map(|n| n.trim().to_string()),
        slug: new_slug,
        description: req.description,
        color: req.color,
        icon: req.icon,
        parent_id: req.parent_id,
        is_active: req.is_active,
        sort_order: req.order,
        updated_at: Some(Utc::now()),
    };

    let saved: Category = diesel::update(categories::table.find(category.id))
        .set(&changes)
        .returning(Category::as_returning())
        .get_result(conn)?;
    get_category(conn, &saved.slug)
}

pub fn delete_category(conn: &mut PgConnection, slug: &str) -> ApiResult<()> {
    let deleted = diesel::delete(categories::table.filter(categories::slug.eq(slug))).execute(conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound(format!("Category '{slug}' not found")));
    }
    info!("Deleted category {slug}");
    Ok(())
}

pub fn list_tags(conn: &mut PgConnection, include_inactive: bool) -> ApiResult<Vec<TagResponse>> {
    let mut query = tags::table.into_boxed();
    if !include_inactive {
        query = query.filter(tags::is_active.eq(true));
    }
    let rows: Vec<Tag> = query
        .order(tags::name.asc())
        .select(Tag::as_select())
        .load(conn)?;
    let ids: Vec<Uuid> = rows.iter().map(|t| t.id).collect();
    let counts = tag_idea_counts(conn, &ids)?;
    Ok(rows
        .into_iter()
        .map(|tag| TagResponse {
            ideas_count: counts.get(&tag.id).copied().unwrap_or(0),
            tag,
        })
        .collect())
}

pub fn get_tag(conn: &mut PgConnection, slug: &str) -> ApiResult<TagResponse> {
    let tag: Tag = tags::table
        .filter(tags::slug.eq(slug))
        .select(Tag::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("Tag '{slug}' not found")))?;
    let ideas_count = tag_idea_counts(conn, &[tag.id])?
        .get(&tag.id)
        .copied()
        .unwrap_or(0);
    Ok(TagResponse { tag, ideas_count })
}

pub fn create_tag(conn: &mut PgConnection, req: CreateTagRequest) -> ApiResult<TagResponse> {
    let color = req.color.unwrap_or_else(|| DEFAULT_TAG_COLOR.to_string());
    Validator::new()
        .required("name", &req.name)
        .max_length("name", &req.name, 50)
        .hex_color("color", &color)
        .validate()?;
    let slug = resolve_slug("slug", req.slug.as_deref(), &req.name)?;

    let now = Utc::now();
    let tag = Tag {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        slug,
        description: req.description,
        color,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    let saved: Tag = diesel::insert_into(tags::table)
        .values(&tag)
        .returning(Tag::as_returning())
        .get_result(conn)?;
    info!("Created tag {}", saved.slug);
    Ok(TagResponse {
        tag: saved,
        ideas_count: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(name: &str, parent: Option<Uuid>) -> Category {
        let now = Utc::now();
        Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slugify(name),
            description: String::new(),
            color: DEFAULT_CATEGORY_COLOR.to_string(),
            icon: String::new(),
            parent_id: parent,
            is_active: true,
            sort_order: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_full_path_walks_to_root() {
        let root = category("Infrastructure", None);
        let child = category("Roads", Some(root.id));
        let leaf = category("Potholes", Some(child.id));
        let index = CategoryIndex::from_categories([&root, &child, &leaf]);

        assert_eq!(index.full_path(leaf.id), "Infrastructure > Roads > Potholes");
        assert_eq!(index.full_path(root.id), "Infrastructure");
    }

    #[test]
    fn test_cycle_detection() {
        let root = category("Environment", None);
        let child = category("Water", Some(root.id));
        let grandchild = category("Rivers", Some(child.id));
        let other = category("Education", None);
        let index = CategoryIndex::from_categories([&root, &child, &grandchild, &other]);

        assert!(index.creates_cycle(root.id, Some(grandchild.id)));
        assert!(index.creates_cycle(child.id, Some(child.id)));
        assert!(!index.creates_cycle(root.id, Some(other.id)));
        assert!(!index.creates_cycle(grandchild.id, None));
    }

    #[test]
    fn test_resolve_slug_from_name() {
        assert_eq!(
            resolve_slug("slug", None, "Parks & Recreation").expect("slug"),
            "parks-recreation"
        );
        assert_eq!(
            resolve_slug("slug", Some("  "), "Public Safety").expect("slug"),
            "public-safety"
        );
        assert!(resolve_slug("slug", Some("Bad Slug"), "x").is_err());
        assert!(resolve_slug("slug", None, "!!!").is_err());
    }
}
