use regex::Regex;
use std::sync::LazyLock;

use crate::core::shared::{ApiError, FieldErrors};

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$"
    ).expect("Invalid email regex")
});

static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://[a-zA-Z0-9][-a-zA-Z0-9]*(\.[a-zA-Z0-9][-a-zA-Z0-9]*)*(:\d{1,5})?(/[-a-zA-Z0-9()@:%_\+.~#?&/=]*)?$"
    ).expect("Invalid URL regex")
});

static SLUG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:[-_][a-z0-9]+)*$").expect("Invalid slug regex")
});

static USERNAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\w.@+-]+$").expect("Invalid username regex")
});

static HEX_COLOR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#[0-9a-fA-F]{6}$").expect("Invalid color regex")
});

pub const USERNAME_MAX_LENGTH: usize = 150;

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && EMAIL_REGEX.is_match(email)
}

pub fn is_valid_url(url: &str) -> bool {
    URL_REGEX.is_match(url)
}

pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_REGEX.is_match(slug)
}

pub fn is_valid_username(username: &str) -> bool {
    username.chars().count() <= USERNAME_MAX_LENGTH && USERNAME_REGEX.is_match(username)
}

pub fn is_valid_hex_color(color: &str) -> bool {
    HEX_COLOR_REGEX.is_match(color)
}

pub fn normalize_email(email: &str) -> String {
    match email.trim().rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.trim().to_string(),
    }
}

/// Accumulates per-field messages; `validate` turns them into a 400.
#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, field: &str, value: &str) -> Self {
        if value.trim().is_empty() {
            self.errors.add(field, "This field is required.");
        }
        self
    }

    pub fn max_length(mut self, field: &str, value: &str, max: usize) -> Self {
        if value.chars().count() > max {
            self.errors.add(
                field,
                format!("Ensure this field has no more than {max} characters."),
            );
        }
        self
    }

    pub fn email(mut self, field: &str, value: &str) -> Self {
        if value.trim().is_empty() {
            self.errors.add(field, "This field is required.");
        } else if !is_valid_email(value.trim()) {
            self.errors.add(field, "Enter a valid email address.");
        }
        self
    }

    /// Empty strings pass; only non-empty values are checked.
    pub fn url(mut self, field: &str, value: &str) -> Self {
        if !value.is_empty() && !is_valid_url(value) {
            self.errors.add(field, "Enter a valid URL.");
        }
        self
    }

    pub fn slug(mut self, field: &str, value: &str) -> Self {
        if !is_valid_slug(value) {
            self.errors.add(
                field,
                "Enter a valid slug consisting of lowercase letters, numbers, underscores or hyphens.",
            );
        }
        self
    }

    pub fn username(mut self, field: &str, value: &str) -> Self {
        if value.trim().is_empty() {
            self.errors.add(field, "This field is required.");
        } else if !is_valid_username(value) {
            self.errors.add(
                field,
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }
        self
    }

    pub fn hex_color(mut self, field: &str, value: &str) -> Self {
        if !is_valid_hex_color(value) {
            self.errors.add(field, "Enter a color in #RRGGBB form.");
        }
        self
    }

    pub fn custom(mut self, field: &str, ok: bool, message: &str) -> Self {
        if !ok {
            self.errors.add(field, message);
        }
        self
    }

    pub fn errors_mut(&mut self) -> &mut FieldErrors {
        &mut self.errors
    }

    pub fn into_errors(self) -> FieldErrors {
        self.errors
    }

    pub fn validate(self) -> Result<(), ApiError> {
        self.errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("first.last+tag@city.gov.br"));
        assert!(!is_valid_email("user@localhost"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn test_validate_url() {
        assert!(is_valid_url("https://example.com"));
        assert!(is_valid_url("http://localhost:8000/path?q=1"));
        assert!(!is_valid_url("ftp://example.com"));
        assert!(!is_valid_url("example.com"));
    }

    #[test]
    fn test_validate_username() {
        assert!(is_valid_username("ana.maria+civic"));
        assert!(is_valid_username("user_01"));
        assert!(!is_valid_username("has space"));
        assert!(!is_valid_username(&"a".repeat(151)));
    }

    #[test]
    fn test_validate_slug_and_color() {
        assert!(is_valid_slug("public-transport"));
        assert!(!is_valid_slug("Public Transport"));
        assert!(is_valid_hex_color("#3B82F6"));
        assert!(!is_valid_hex_color("3B82F6"));
        assert!(!is_valid_hex_color("#3B82F"));
    }

    #[test]
    fn test_normalize_email_lowercases_domain_only() {
        assert_eq!(normalize_email(" Ana@Example.COM "), "Ana@example.com");
    }

    #[test]
    fn test_validator_collects_by_field() {
        let errors = Validator::new()
            .required("title", "  ")
            .email("email", "bad")
            .url("website", "")
            .max_length("summary", &"x".repeat(501), 500)
            .into_errors();

        assert!(errors.contains("title"));
        assert!(errors.contains("email"));
        assert!(errors.contains("summary"));
        assert!(!errors.contains("website"));
    }

    #[test]
    fn test_validator_passes_clean_input() {
        let result = Validator::new()
            .required("title", "Bike lanes on Main St")
            .username("username", "cyclist")
            .hex_color("color", "#6B7280")
            .validate();
        assert!(result.is_ok());
    }
}
