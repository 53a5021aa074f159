use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use log::error;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

/// Field name to the list of messages raised against it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation failed: {0:?}")]
    Validation(FieldErrors),
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Unauthenticated(_) => "not_authenticated",
            Self::Forbidden(_) => "permission_denied",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Database(_) | Self::Internal(_) => "internal_error",
        }
    }
}

impl From<DieselError> for ApiError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound("Resource not found".to_string()),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                let what = info.constraint_name().unwrap_or("unique constraint");
                Self::Conflict(format!("Duplicate value violates {what}"))
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                let field = info.column_name().unwrap_or(NON_FIELD_ERRORS);
                Self::validation(field, "Referenced object does not exist")
            }
            other => Self::Database(other.to_string()),
        }
    }
}

const NON_FIELD_ERRORS: &str = "non_field_errors";
const JSON_DATA_PREFIX: &str = "Failed to deserialize the JSON body into the target type: ";

/// Maps a serde message such as `status: unknown variant ...` onto the field
/// it names.
fn body_field_errors(detail: &str) -> FieldErrors {
    let (path, message) = match detail.split_once(": ") {
        Some((path, rest)) if !path.is_empty() && path != "." && !path.contains(' ') => {
            (Some(path), rest)
        }
        _ => (None, detail),
    };
    if let Some(missing) = message
        .strip_prefix("missing field `")
        .and_then(|rest| rest.split('`').next())
    {
        return FieldErrors::single(missing, "This field is required.");
    }
    FieldErrors::single(path.unwrap_or(NON_FIELD_ERRORS), message)
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let text = rejection.body_text();
        match text.strip_prefix(JSON_DATA_PREFIX) {
            Some(detail) if matches!(rejection, JsonRejection::JsonDataError(_)) => {
                Self::Validation(body_field_errors(detail))
            }
            _ => Self::validation(NON_FIELD_ERRORS, text),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation(NON_FIELD_ERRORS, rejection.body_text())
    }
}

impl From<diesel::r2d2::PoolError> for ApiError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        Self::Database(format!("Connection pool error: {err}"))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::Validation(fields) => json!({
                "error": self.error_code(),
                "fields": fields,
            }),
            Self::Database(detail) | Self::Internal(detail) => {
                error!("Request failed: {detail}");
                json!({
                    "error": self.error_code(),
                    "message": "An internal error occurred",
                })
            }
            Self::Unauthenticated(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg) => json!({
                "error": self.error_code(),
                "message": msg,
            }),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_accumulate() {
        let mut errors = FieldErrors::new();
        errors.add("password", "too short");
        errors.add("password", "too common");
        errors.add("email", "invalid");

        assert_eq!(errors.get("password").map(<[String]>::len), Some(2));
        assert!(errors.contains("email"));
        assert!(matches!(errors.into_result(), Err(ApiError::Validation(_))));
        assert!(FieldErrors::new().into_result().is_ok());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::validation("title", "required").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthenticated("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(DieselError::NotFound).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_body_errors_name_the_field() {
        let unknown = body_field_errors("status: unknown variant `pending`, expected `draft`");
        assert!(unknown.contains("status"));

        let missing = body_field_errors("missing field `title` at line 1 column 2");
        assert_eq!(missing.get("title"), Some(&["This field is required.".to_string()][..]));

        let nested = body_field_errors("category_ids[0]: UUID parsing failed");
        assert!(nested.contains("category_ids[0]"));

        let bare = body_field_errors("expected value at line 1 column 1");
        assert!(bare.contains(NON_FIELD_ERRORS));
    }
}
