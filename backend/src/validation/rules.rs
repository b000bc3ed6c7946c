//! Common validation rules shared across request payloads.

use chrono::NaiveDate;
use validator::ValidationError;

const PASSWORD_MIN_LENGTH: usize = 8;
const PASSWORD_MAX_LENGTH: usize = 64;

/// Validates password strength.
///
/// Requirements:
/// - 8-64 characters in length
/// - At least one uppercase letter, one lowercase letter and one digit
/// - At least one character that is not an ASCII letter or digit
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let length = password.chars().count();
    if !(PASSWORD_MIN_LENGTH..=PASSWORD_MAX_LENGTH).contains(&length) {
        return Err(ValidationError::new("password_invalid_length"));
    }

    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_ascii_alphanumeric());
    if !(has_upper && has_lower && has_digit && has_special) {
        return Err(ValidationError::new("password_too_weak"));
    }

    Ok(())
}

/// Birthdates are calendar dates in `YYYY-MM-DD` form.
pub fn validate_birthdate(value: &str) -> Result<(), ValidationError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| ValidationError::new("birthdate_invalid_format"))
}

pub fn validate_gender(value: &str) -> Result<(), ValidationError> {
    match value {
        "F" | "M" | "O" => Ok(()),
        _ => Err(ValidationError::new("gender_invalid")),
    }
}
