//! Input rules shared by services. Pure functions over borrowed input.

use super::error::DomainError;

pub const RATE_MIN: i64 = 0;
pub const RATE_MAX: i64 = 10;
pub const USERNAME_MAX_LEN: usize = 32;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const TITLE_MAX_LEN: usize = 200;
pub const CONTENT_MAX_LEN: usize = 500_000;

/// Ratings are integers in `0..=10`.
pub fn validate_rate(rate: i64) -> Result<i16, DomainError> {
    if !(RATE_MIN..=RATE_MAX).contains(&rate) {
        return Err(DomainError::OutOfRange {
            field: "rate",
            min: RATE_MIN,
            max: RATE_MAX,
            value: rate,
        });
    }
    // Range checked above.
    Ok(rate as i16)
}

/// Trim and require a non-empty title of bounded length.
pub fn normalize_title(field: &'static str, raw: &str) -> Result<String, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(field, "must not be empty"));
    }
    if trimmed.chars().count() > TITLE_MAX_LEN {
        return Err(DomainError::validation(field, "is too long"));
    }
    Ok(trimmed.to_string())
}

pub fn validate_content(field: &'static str, raw: &str) -> Result<(), DomainError> {
    if raw.trim().is_empty() {
        return Err(DomainError::validation(field, "must not be empty"));
    }
    if raw.len() > CONTENT_MAX_LEN {
        return Err(DomainError::validation(field, "is too long"));
    }
    Ok(())
}

pub fn normalize_username(raw: &str) -> Result<String, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("username", "must not be empty"));
    }
    if trimmed.chars().count() > USERNAME_MAX_LEN {
        return Err(DomainError::validation("username", "is too long"));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(DomainError::validation(
            "username",
            "may only contain letters, digits, `_`, `-` and `.`",
        ));
    }
    Ok(trimmed.to_string())
}

pub fn validate_password(raw: &str) -> Result<(), DomainError> {
    if raw.chars().count() < PASSWORD_MIN_LEN {
        return Err(DomainError::validation("password", "is too short"));
    }
    Ok(())
}

/// Collapse blank optional text to `None`.
pub fn normalize_optional(raw: Option<String>) -> Option<String> {
    raw.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
