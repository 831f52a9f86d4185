//! Field validators shared by the account endpoints.

use regex::Regex;
use validator::ValidationErrors;

use crate::error::ApiError;

lazy_static::lazy_static! {
    static ref UPPERCASE: Regex = Regex::new(r"[A-Z]").unwrap();
    static ref DIGIT: Regex = Regex::new(r"\d").unwrap();
    static ref SPECIAL: Regex = Regex::new(r"[@$!%*?&]").unwrap();
    /// Letters, digits and @/./+/-/_ only.
    static ref USERNAME: Regex = Regex::new(r"^[\w.@+-]+$").unwrap();
}

/// Maximum username length.
pub const USERNAME_MAX_LENGTH: usize = 20;

/// Reject passwords that are too short or miss an uppercase letter, a digit
/// or one of `@$!%*?&`.
pub fn validate_password_strength(password: &str, min_length: usize) -> Result<(), ApiError> {
    if password.chars().count() < min_length {
        return Err(ApiError::validation(format!(
            "The password must be at least {min_length} characters long."
        )));
    }
    if !UPPERCASE.is_match(password) {
        return Err(ApiError::validation(
            "The password must contain at least one uppercase letter (A-Z)",
        ));
    }
    if !DIGIT.is_match(password) {
        return Err(ApiError::validation(
            "The password must contain at least one number.",
        ));
    }
    if !SPECIAL.is_match(password) {
        return Err(ApiError::validation(
            "The password must contain at least one special character such as @#$%&*",
        ));
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.trim().is_empty() {
        return Err(ApiError::validation("Username is required"));
    }
    if username.chars().count() > USERNAME_MAX_LENGTH {
        return Err(ApiError::validation(format!(
            "Username must be {USERNAME_MAX_LENGTH} characters or fewer"
        )));
    }
    if !USERNAME.is_match(username) {
        return Err(ApiError::validation(
            "Username may contain only letters, digits and @/./+/-/_ characters",
        ));
    }
    Ok(())
}

/// Collapse `validator` derive output into a single client error, reporting
/// the first failing field.
pub fn first_error(errors: ValidationErrors) -> ApiError {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    let message = fields
        .into_iter()
        .find_map(|(field, errs)| {
            errs.first().map(|e| match &e.message {
                Some(message) => message.to_string(),
                None => format!("Invalid value for {field}"),
            })
        })
        .unwrap_or_else(|| "Invalid request".to_string());

    ApiError::Validation(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strong_password_accepted() {
        assert!(validate_password_strength("12345!Ab", 8).is_ok());
        assert!(validate_password_strength("Correct$Horse9", 8).is_ok());
    }

    #[test]
    fn test_short_password_rejected() {
        let err = validate_password_strength("1!Ab", 8).unwrap_err();
        assert!(err.to_string().contains("at least 8 characters"));
    }

    #[test]
    fn test_password_without_uppercase_rejected() {
        let err = validate_password_strength("12345!ab", 8).unwrap_err();
        assert!(err.to_string().contains("uppercase"));
    }

    #[test]
    fn test_password_without_digit_rejected() {
        let err = validate_password_strength("abcdef!A", 8).unwrap_err();
        assert!(err.to_string().contains("number"));
    }

    #[test]
    fn test_password_without_special_rejected() {
        let err = validate_password_strength("12345aAb", 8).unwrap_err();
        assert!(err.to_string().contains("special character"));
    }

    #[test]
    fn test_username_rules() {
        assert!(validate_username("Test.User_1").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"a".repeat(21)).is_err());
        assert!(validate_username(&"a".repeat(20)).is_ok());
    }
}
