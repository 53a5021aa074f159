//! Status rules and access checks for ideas.
//!
//! Everything here is pure so the rules can be exercised without a database.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

use super::models::{Actor, CreateIdeaRequest, Idea, UpdateIdeaRequest};
use crate::core::shared::{ApiResult, IdeaStatus, NotificationType};
use crate::security::Validator;

pub const TITLE_MAX: usize = 200;
pub const SUMMARY_MAX: usize = 500;
pub const LOCATION_MAX: usize = 200;
pub const SCOPE_MAX: usize = 100;
pub const TIMELINE_MAX: usize = 100;
pub const FILE_MAX: usize = 255;

/// Largest magnitude a NUMERIC(15, 2) column accepts.
fn cost_ceiling() -> BigDecimal {
    BigDecimal::from(10_000_000_000_000_i64)
}

/// `published_at` after a save moving from `previous` to `next`.
///
/// A create passes `previous = None`. The stamp is taken once, on entry into
/// `submitted`, and is never cleared.
pub fn next_published_at(
    previous: Option<IdeaStatus>,
    next: IdeaStatus,
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if current.is_some() {
        return current;
    }
    let entering_submitted =
        next == IdeaStatus::Submitted && previous != Some(IdeaStatus::Submitted);
    entering_submitted.then_some(now)
}

/// Notification the author receives when an update moves the status.
pub fn status_notification(previous: IdeaStatus, next: IdeaStatus) -> Option<NotificationType> {
    if previous == next {
        return None;
    }
    match next {
        IdeaStatus::Approved => Some(NotificationType::IdeaApproved),
        IdeaStatus::Rejected => Some(NotificationType::IdeaRejected),
        IdeaStatus::Implemented => Some(NotificationType::IdeaImplemented),
        _ => None,
    }
}

/// What the author hears about an update. Authors are never notified of
/// their own edits.
pub fn author_notice(
    previous: IdeaStatus,
    next: IdeaStatus,
    edited_by_author: bool,
) -> Option<NotificationType> {
    if edited_by_author {
        return None;
    }
    status_notification(previous, next).or(Some(NotificationType::IdeaUpdated))
}

/// Relationship between a caller and one idea.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdeaAccess {
    pub is_author: bool,
    pub is_collaborator: bool,
    pub is_staff: bool,
}

impl IdeaAccess {
    pub fn resolve(idea: &Idea, actor: Option<Actor>, is_collaborator: bool) -> Self {
        match actor {
            Some(actor) => Self {
                is_author: idea.author_id == actor.user_id,
                is_collaborator,
                is_staff: actor.is_staff,
            },
            None => Self::default(),
        }
    }

    /// Drafts stay private to the people working on them.
    pub fn can_view(&self, status: IdeaStatus) -> bool {
        status != IdeaStatus::Draft || self.can_edit()
    }

    pub fn can_edit(&self) -> bool {
        self.is_author || self.is_collaborator || self.is_staff
    }

    pub fn can_delete(&self) -> bool {
        self.is_author || self.is_staff
    }

    pub fn can_manage_collaborators(&self) -> bool {
        self.is_author
    }
}

fn check_cost(validator: Validator, cost: Option<&BigDecimal>) -> Validator {
    match cost {
        Some(cost) => validator
            .custom(
                "estimated_cost",
                cost >= &BigDecimal::from(0),
                "Ensure this value is greater than or equal to 0.",
            )
            .custom(
                "estimated_cost",
                cost < &cost_ceiling(),
                "Ensure that there are no more than 15 digits in total.",
            ),
        None => validator,
    }
}

pub fn validate_create(req: &CreateIdeaRequest) -> ApiResult<()> {
    let validator = Validator::new()
        .required("title", &req.title)
        .max_length("title", &req.title, TITLE_MAX)
        .required("description", &req.description)
        .max_length("summary", &req.summary, SUMMARY_MAX)
        .max_length("location", &req.location, LOCATION_MAX)
        .max_length("scope", &req.scope, SCOPE_MAX)
        .max_length("estimated_timeline", &req.estimated_timeline, TIMELINE_MAX)
        .max_length("image", req.image.as_deref().unwrap_or_default(), FILE_MAX);
    check_cost(validator, req.estimated_cost.as_ref()).validate()
}

pub fn validate_update(req: &UpdateIdeaRequest) -> ApiResult<()> {
    let mut validator = Validator::new();
    if let Some(title) = &req.title {
        validator = validator
            .required("title", title)
            .max_length("title", title, TITLE_MAX);
    }
    if let Some(description) = &req.description {
        validator = validator.required("description", description);
    }
    if let Some(summary) = &req.summary {
        validator = validator.max_length("summary", summary, SUMMARY_MAX);
    }
    if let Some(location) = &req.location {
        validator = validator.max_length("location", location, LOCATION_MAX);
    }
    if let Some(scope) = &req.scope {
        validator = validator.max_length("scope", scope, SCOPE_MAX);
    }
    if let Some(timeline) = &req.estimated_timeline {
        validator = validator.max_length("estimated_timeline", timeline, TIMELINE_MAX);
    }
    if let Some(Some(image)) = &req.image {
        validator = validator.max_length("image", image, FILE_MAX);
    }
    let cost = req.estimated_cost.as_ref().and_then(Option::as_ref);
    check_cost(validator, cost).validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::ApiError;
    use chrono::Duration;
    use std::str::FromStr;
    use uuid::Uuid;

    fn create_request(title: &str) -> CreateIdeaRequest {
        CreateIdeaRequest {
            title: title.to_string(),
            description: "Plant shade trees along the riverside walk".to_string(),
            summary: String::new(),
            status: None,
            priority: None,
            location: String::new(),
            scope: String::new(),
            estimated_cost: None,
            estimated_timeline: String::new(),
            implementation_plan: String::new(),
            image: None,
            category_ids: Vec::new(),
            tag_ids: Vec::new(),
        }
    }

    #[test]
    fn test_published_at_stamped_on_entry_into_submitted() {
        let now = Utc::now();
        assert_eq!(
            next_published_at(Some(IdeaStatus::Draft), IdeaStatus::Submitted, None, now),
            Some(now)
        );
        assert_eq!(
            next_published_at(None, IdeaStatus::Submitted, None, now),
            Some(now)
        );
    }

    #[test]
    fn test_published_at_stays_null_outside_submitted() {
        let now = Utc::now();
        assert_eq!(next_published_at(None, IdeaStatus::Draft, None, now), None);
        assert_eq!(
            next_published_at(Some(IdeaStatus::Draft), IdeaStatus::Approved, None, now),
            None
        );
        assert_eq!(
            next_published_at(Some(IdeaStatus::Submitted), IdeaStatus::Submitted, None, now),
            None
        );
    }

    #[test]
    fn test_published_at_is_never_reset() {
        let first = Utc::now() - Duration::days(3);
        let now = Utc::now();
        assert_eq!(
            next_published_at(Some(IdeaStatus::Submitted), IdeaStatus::Draft, Some(first), now),
            Some(first)
        );
        assert_eq!(
            next_published_at(Some(IdeaStatus::Draft), IdeaStatus::Submitted, Some(first), now),
            Some(first)
        );
    }

    #[test]
    fn test_status_notifications() {
        assert_eq!(
            status_notification(IdeaStatus::UnderReview, IdeaStatus::Approved),
            Some(NotificationType::IdeaApproved)
        );
        assert_eq!(
            status_notification(IdeaStatus::UnderReview, IdeaStatus::Rejected),
            Some(NotificationType::IdeaRejected)
        );
        assert_eq!(
            status_notification(IdeaStatus::Approved, IdeaStatus::Implemented),
            Some(NotificationType::IdeaImplemented)
        );
        assert_eq!(
            status_notification(IdeaStatus::Approved, IdeaStatus::Approved),
            None
        );
        assert_eq!(
            status_notification(IdeaStatus::Draft, IdeaStatus::Submitted),
            None
        );
    }

    #[test]
    fn test_authors_are_not_told_about_their_own_edits() {
        assert_eq!(
            author_notice(IdeaStatus::UnderReview, IdeaStatus::Approved, true),
            None
        );
        assert_eq!(author_notice(IdeaStatus::Draft, IdeaStatus::Submitted, true), None);
        assert_eq!(
            author_notice(IdeaStatus::UnderReview, IdeaStatus::Approved, false),
            Some(NotificationType::IdeaApproved)
        );
        assert_eq!(
            author_notice(IdeaStatus::Submitted, IdeaStatus::Submitted, false),
            Some(NotificationType::IdeaUpdated)
        );
    }

    #[test]
    fn test_draft_visibility() {
        let anonymous = IdeaAccess::default();
        assert!(!anonymous.can_view(IdeaStatus::Draft));
        assert!(anonymous.can_view(IdeaStatus::Submitted));

        let collaborator = IdeaAccess {
            is_collaborator: true,
            ..Default::default()
        };
        assert!(collaborator.can_view(IdeaStatus::Draft));
        assert!(collaborator.can_edit());
        assert!(!collaborator.can_delete());
        assert!(!collaborator.can_manage_collaborators());
    }

    #[test]
    fn test_staff_can_moderate_but_not_manage_collaborators() {
        let staff = IdeaAccess {
            is_staff: true,
            ..Default::default()
        };
        assert!(staff.can_edit());
        assert!(staff.can_delete());
        assert!(!staff.can_manage_collaborators());
    }

    #[test]
    fn test_resolve_access_for_author() {
        let author = Uuid::new_v4();
        let now = Utc::now();
        let idea = Idea {
            id: Uuid::new_v4(),
            title: "Night buses".into(),
            description: "Run buses after midnight".into(),
            summary: String::new(),
            author_id: author,
            status: IdeaStatus::Draft,
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

        let access = IdeaAccess::resolve(&idea, Some(Actor::new(author, false)), false);
        assert!(access.is_author);
        assert!(access.can_manage_collaborators());

        let stranger = IdeaAccess::resolve(&idea, Some(Actor::new(Uuid::new_v4(), false)), false);
        assert!(!stranger.can_view(idea.status));
    }

    #[test]
    fn test_create_validation() {
        assert!(validate_create(&create_request("Shade trees")).is_ok());

        let err = validate_create(&create_request("")).expect_err("blank title");
        assert!(matches!(err, ApiError::Validation(ref f) if f.contains("title")));

        let long = "x".repeat(TITLE_MAX + 1);
        assert!(validate_create(&create_request(&long)).is_err());
    }

    #[test]
    fn test_cost_bounds() {
        let mut req = create_request("Library extension");
        req.estimated_cost = Some(BigDecimal::from_str("-1").expect("decimal"));
        let err = validate_create(&req).expect_err("negative cost");
        assert!(matches!(err, ApiError::Validation(ref f) if f.contains("estimated_cost")));

        req.estimated_cost = Some(BigDecimal::from_str("9999999999999.99").expect("decimal"));
        assert!(validate_create(&req).is_ok());

        req.estimated_cost = Some(BigDecimal::from_str("10000000000000").expect("decimal"));
        assert!(validate_create(&req).is_err());
    }

    #[test]
    fn test_update_validation_only_checks_present_fields() {
        assert!(validate_update(&UpdateIdeaRequest::default()).is_ok());

        let req = UpdateIdeaRequest {
            title: Some("   ".into()),
            ..Default::default()
        };
        assert!(validate_update(&req).is_err());

        let cleared = UpdateIdeaRequest {
            estimated_cost: Some(None),
            ..Default::default()
        };
        assert!(validate_update(&cleared).is_ok());
    }
}
