//! Input validation for API requests.
//!
//! Each check returns `Err(message)` for the offending field. Collect them
//! with `ValidationErrorBuilder::check` from the `error` module to answer
//! with every problem at once.

use chrono::{DateTime, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Loose email shape: local part, @, dotted domain
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)+$"
    ).unwrap();

    /// Course codes such as MAT101 or PSI-204
    static ref COURSE_CODE_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9][A-Za-z0-9_-]{1,19}$"
    ).unwrap();
}

pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_TEXT_LENGTH: usize = 2000;
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Validate a required, trimmed, length-limited text field.
pub fn validate_required(label: &str, value: &str, max: usize) -> Result<(), String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("{} is required", label));
    }
    if trimmed.chars().count() > max {
        return Err(format!("{} is too long (max {} characters)", label, max));
    }
    Ok(())
}

/// Validate an optional free-text field.
pub fn validate_optional_text(label: &str, value: Option<&str>) -> Result<(), String> {
    match value {
        Some(v) if v.chars().count() > MAX_TEXT_LENGTH => Err(format!(
            "{} is too long (max {} characters)",
            label, MAX_TEXT_LENGTH
        )),
        _ => Ok(()),
    }
}

pub fn validate_name(name: &str) -> Result<(), String> {
    validate_required("Name", name, MAX_NAME_LENGTH)
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address".to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        ));
    }
    if !password.chars().any(|c| c.is_alphabetic()) || !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain letters and digits".to_string());
    }
    Ok(())
}

pub fn validate_course_code(code: &str) -> Result<(), String> {
    if code.is_empty() {
        return Err("Course code is required".to_string());
    }
    if !COURSE_CODE_REGEX.is_match(code) {
        return Err(
            "Course code must be 2-20 letters, digits, dashes or underscores".to_string(),
        );
    }
    Ok(())
}

/// Accepts a calendar date (`2026-03-14`) or an RFC 3339 timestamp.
pub fn validate_date(label: &str, value: &str) -> Result<(), String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("{} is required", label));
    }
    if NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
        || DateTime::parse_from_rfc3339(value).is_ok()
    {
        return Ok(());
    }
    Err(format!("{} must be a date (YYYY-MM-DD) or RFC 3339 timestamp", label))
}

pub fn validate_optional_date(label: &str, value: Option<&str>) -> Result<(), String> {
    match value {
        Some(v) if !v.trim().is_empty() => validate_date(label, v),
        _ => Ok(()),
    }
}

pub fn validate_extension_days(days: Option<i64>) -> Result<(), String> {
    match days {
        Some(d) if d < 1 => Err("Extension days must be a positive number".to_string()),
        Some(d) if d > 365 => Err("Extension days cannot exceed 365".to_string()),
        _ => Ok(()),
    }
}
