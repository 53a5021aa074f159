use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::shared::FieldErrors;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub max_length: usize,
    pub reject_numeric: bool,
    pub reject_common: bool,
    pub reject_similar_to_user: bool,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
            reject_numeric: true,
            reject_common: true,
            reject_similar_to_user: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argon2Config {
    pub memory_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
    pub output_length: usize,
}

impl Default for Argon2Config {
    fn default() -> Self {
        Self {
            memory_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
            output_length: 32,
        }
    }
}

impl Argon2Config {
    pub fn low_memory() -> Self {
        Self {
            memory_cost_kib: 8192,
            time_cost: 2,
            parallelism: 1,
            output_length: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PasswordIssue {
    TooShort { min: usize },
    TooLong { max: usize },
    EntirelyNumeric,
    CommonPassword,
    ContainsUsername,
    ContainsEmail,
    ContainsName,
}

impl PasswordIssue {
    pub fn message(&self) -> String {
        match self {
            Self::TooShort { min } => {
                format!("This password is too short. It must contain at least {min} characters.")
            }
            Self::TooLong { max } => format!("This password must be at most {max} characters."),
            Self::EntirelyNumeric => "This password is entirely numeric.".into(),
            Self::CommonPassword => "This password is too common.".into(),
            Self::ContainsUsername => "The password is too similar to the username.".into(),
            Self::ContainsEmail => "The password is too similar to the email address.".into(),
            Self::ContainsName => "The password is too similar to your name.".into(),
        }
    }
}

/// Account attributes a password must not resemble.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserAttributes<'a> {
    pub username: Option<&'a str>,
    pub email: Option<&'a str>,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
}

pub struct PasswordHasher2 {
    argon2: Argon2<'static>,
    config: PasswordConfig,
}

impl PasswordHasher2 {
    pub fn new(argon2_config: Argon2Config, password_config: PasswordConfig) -> Result<Self> {
        let params = Params::new(
            argon2_config.memory_cost_kib,
            argon2_config.time_cost,
            argon2_config.parallelism,
            Some(argon2_config.output_length),
        )
        .map_err(|e| anyhow!("Invalid Argon2 parameters: {e}"))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        Ok(Self {
            argon2,
            config: password_config,
        })
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Failed to hash password: {e}"))?;

        Ok(hash.to_string())
    }

    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed_hash =
            PasswordHash::new(hash).map_err(|e| anyhow!("Invalid password hash format: {e}"))?;

        match self.argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(anyhow!("Password verification failed: {e}")),
        }
    }

    pub fn needs_rehash(&self, hash: &str) -> Result<bool> {
        let parsed_hash =
            PasswordHash::new(hash).map_err(|e| anyhow!("Invalid password hash format: {e}"))?;

        if parsed_hash.algorithm != argon2::ARGON2ID_IDENT {
            return Ok(true);
        }

        if let Some(m_param) = parsed_hash.params.get_str("m") {
            if let Ok(memory) = m_param.parse::<u32>() {
                if memory < self.argon2.params().m_cost() {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    pub fn validate(&self, password: &str, user: UserAttributes<'_>) -> Vec<PasswordIssue> {
        let mut issues = Vec::new();

        let length = password.chars().count();
        if length < self.config.min_length {
            issues.push(PasswordIssue::TooShort {
                min: self.config.min_length,
            });
        }
        if length > self.config.max_length {
            issues.push(PasswordIssue::TooLong {
                max: self.config.max_length,
            });
        }

        if self.config.reject_numeric
            && !password.is_empty()
            && password.chars().all(|c| c.is_ascii_digit())
        {
            issues.push(PasswordIssue::EntirelyNumeric);
        }

        if self.config.reject_common && is_common_password(password) {
            issues.push(PasswordIssue::CommonPassword);
        }

        if self.config.reject_similar_to_user {
            if user.username.is_some_and(|u| resembles(password, u)) {
                issues.push(PasswordIssue::ContainsUsername);
            }
            let local_part = user.email.and_then(|m| m.split('@').next());
            if local_part.is_some_and(|l| resembles(password, l)) {
                issues.push(PasswordIssue::ContainsEmail);
            }
            if user.first_name.is_some_and(|n| resembles(password, n))
                || user.last_name.is_some_and(|n| resembles(password, n))
            {
                issues.push(PasswordIssue::ContainsName);
            }
        }

        if !issues.is_empty() {
            debug!("Password rejected with {} issue(s)", issues.len());
        }
        issues
    }

    /// Runs the policy and reports every failure under `field`.
    pub fn check_into(
        &self,
        errors: &mut FieldErrors,
        field: &str,
        password: &str,
        user: UserAttributes<'_>,
    ) {
        for issue in self.validate(password, user) {
            errors.add(field, issue.message());
        }
    }
}

/// Salt segment of a PHC hash string. Changes every time a password is set,
/// so tokens bound to it stop validating after a password change.
pub fn hash_fingerprint(hash: &str) -> Option<String> {
    PasswordHash::new(hash)
        .ok()
        .and_then(|parsed| parsed.salt.map(|salt| salt.as_str().to_string()))
}

fn resembles(password: &str, attribute: &str) -> bool {
    let attribute = attribute.trim().to_lowercase();
    if attribute.len() < 3 {
        return false;
    }
    let password = password.to_lowercase();
    password.contains(&attribute) || (password.len() >= 3 && attribute.contains(&password))
}

fn is_common_password(password: &str) -> bool {
    const COMMON_PASSWORDS: &[&str] = &[
        "password",
        "123456",
        "12345678",
        "123456789",
        "qwerty",
        "qwertyuiop",
        "abc123",
        "monkey",
        "1234567",
        "letmein",
        "trustno1",
        "dragon",
        "baseball",
        "iloveyou",
        "master",
        "sunshine",
        "shadow",
        "superman",
        "football",
        "password1",
        "password123",
        "welcome",
        "welcome1",
        "admin",
        "admin123",
        "changeme",
        "secret",
        "passw0rd",
        "p@ssw0rd",
        "qwerty123",
        "11111111",
        "1234567890",
        "00000000",
        "whatever",
        "starwars",
        "princess",
    ];

    let lower = password.trim().to_lowercase();
    COMMON_PASSWORDS.contains(&lower.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_hasher() -> PasswordHasher2 {
        PasswordHasher2::new(Argon2Config::low_memory(), PasswordConfig::default())
            .expect("Failed to create hasher")
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = create_test_hasher();
        let hash = hasher.hash("correct horse battery").expect("Failed to hash");

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse battery", &hash).expect("verify"));
        assert!(!hasher.verify("wrong horse battery", &hash).expect("verify"));
    }

    #[test]
    fn test_fingerprint_changes_with_each_hash() {
        let hasher = create_test_hasher();
        let first = hasher.hash("same-password-1").expect("Failed to hash");
        let second = hasher.hash("same-password-1").expect("Failed to hash");

        let a = hash_fingerprint(&first).expect("salt");
        let b = hash_fingerprint(&second).expect("salt");
        assert_ne!(a, b);
        assert!(hash_fingerprint("not-a-hash").is_none());
    }

    #[test]
    fn test_policy_rejections() {
        let hasher = create_test_hasher();
        let none = UserAttributes::default();

        assert!(hasher
            .validate("short", none)
            .contains(&PasswordIssue::TooShort { min: 8 }));
        assert!(hasher
            .validate("12345678901", none)
            .contains(&PasswordIssue::EntirelyNumeric));
        assert!(hasher
            .validate("Password", none)
            .contains(&PasswordIssue::CommonPassword));
        assert!(hasher.validate("Gr33n-Lantern-River", none).is_empty());
    }

    #[test]
    fn test_similarity_to_user() {
        let hasher = create_test_hasher();
        let user = UserAttributes {
            username: Some("mariana"),
            email: Some("mlopez@example.com"),
            first_name: Some("Mariana"),
            last_name: Some("Lopez"),
        };

        let issues = hasher.validate("mariana-2024!", user);
        assert!(issues.contains(&PasswordIssue::ContainsUsername));
        assert!(issues.contains(&PasswordIssue::ContainsName));

        let issues = hasher.validate("xx-mlopez-xx", user);
        assert!(issues.contains(&PasswordIssue::ContainsEmail));

        assert!(hasher.validate("Tidal-Orchard-93", user).is_empty());
    }

    #[test]
    fn test_check_into_collects_messages() {
        let hasher = create_test_hasher();
        let mut errors = FieldErrors::new();
        hasher.check_into(&mut errors, "password", "1234", UserAttributes::default());

        let messages = errors.get("password").expect("password errors");
        assert!(messages.iter().any(|m| m.contains("too short")));
        assert!(messages.iter().any(|m| m.contains("entirely numeric")));
    }

    #[test]
    fn test_needs_rehash_for_weaker_params() {
        let weak = create_test_hasher();
        let strong = PasswordHasher2::new(Argon2Config::default(), PasswordConfig::default())
            .expect("Failed to create hasher");
        let hash = weak.hash("Tidal-Orchard-93").expect("Failed to hash");
        assert!(strong.needs_rehash(&hash).expect("parse"));
        assert!(!weak.needs_rehash(&hash).expect("parse"));
    }
}
