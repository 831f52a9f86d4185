//! Six-digit one-time codes for email change and password reset.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::db::models::{EmailVerification, PasswordResetCode};
use crate::error::ApiError;

/// Where a code sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeStatus {
    Pending,
    Verified,
    Expired,
}

/// Common view over the two code tables.
pub trait OneTimeCode {
    fn code(&self) -> &str;
    fn expires_at(&self) -> DateTime<Utc>;
    fn is_verified(&self) -> bool;

    fn status(&self, now: DateTime<Utc>) -> CodeStatus {
        if self.is_verified() {
            CodeStatus::Verified
        } else if now > self.expires_at() {
            CodeStatus::Expired
        } else {
            CodeStatus::Pending
        }
    }

    /// Accept `candidate` only while the code is pending and matches.
    fn check(&self, candidate: &str, now: DateTime<Utc>) -> Result<(), ApiError> {
        match self.status(now) {
            CodeStatus::Verified => Err(ApiError::validation(
                "This code has already been used, please request a new one",
            )),
            CodeStatus::Expired => Err(ApiError::validation(
                "The code has expired, please request it again",
            )),
            CodeStatus::Pending if self.code() != candidate.trim() => {
                Err(ApiError::validation("The entered code is incorrect."))
            }
            CodeStatus::Pending => Ok(()),
        }
    }
}

impl OneTimeCode for EmailVerification {
    fn code(&self) -> &str {
        &self.code
    }

    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    fn is_verified(&self) -> bool {
        self.is_verified
    }
}

impl OneTimeCode for PasswordResetCode {
    fn code(&self) -> &str {
        &self.code
    }

    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    fn is_verified(&self) -> bool {
        self.is_verified
    }
}

/// A fresh code and the instant it stops being valid.
pub fn issue(now: DateTime<Utc>, ttl_minutes: i64) -> (String, DateTime<Utc>) {
    let code = rand::rng().random_range(100_000..=999_999u32).to_string();
    (code, now + Duration::minutes(ttl_minutes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset(code: &str, expires_at: DateTime<Utc>, is_verified: bool) -> PasswordResetCode {
        PasswordResetCode {
            id: 1,
            user_id: 1,
            code: code.to_string(),
            created_at: expires_at - Duration::minutes(5),
            expires_at,
            is_verified,
        }
    }

    #[test]
    fn test_issue_produces_six_digits_and_expiry() {
        let now = Utc::now();
        for _ in 0..50 {
            let (code, expires_at) = issue(now, 5);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert!(!code.starts_with('0'));
            assert_eq!(expires_at, now + Duration::minutes(5));
        }
    }

    #[test]
    fn test_pending_code_accepts_match() {
        let now = Utc::now();
        let code = reset("123456", now + Duration::minutes(5), false);
        assert_eq!(code.status(now), CodeStatus::Pending);
        assert!(code.check("123456", now).is_ok());
    }

    #[test]
    fn test_wrong_code_rejected() {
        let now = Utc::now();
        let code = reset("123456", now + Duration::minutes(5), false);
        let err = code.check("654321", now).unwrap_err();
        assert_eq!(err.to_string(), "The entered code is incorrect.");
    }

    #[test]
    fn test_code_expires_after_ttl() {
        let issued = Utc::now();
        let code = reset("123456", issued + Duration::minutes(5), false);

        let at_deadline = issued + Duration::minutes(5);
        assert_eq!(code.status(at_deadline), CodeStatus::Pending);

        let later = issued + Duration::minutes(5) + Duration::seconds(1);
        assert_eq!(code.status(later), CodeStatus::Expired);
        assert!(code.check("123456", later).is_err());
    }

    #[test]
    fn test_verified_code_cannot_be_reused() {
        let now = Utc::now();
        let code = reset("123456", now + Duration::minutes(5), true);
        assert_eq!(code.status(now), CodeStatus::Verified);
        assert!(code.check("123456", now).is_err());
    }
}
