//! Database Models - rows read from and written to the relational store.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Avatar path assigned to every new profile.
pub const DEFAULT_AVATAR: &str = "avatars/default.png";

/// Bio assigned to every new profile.
pub const DEFAULT_BIO: &str = "This is a bio about me";

/// User model
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub date_joined: DateTime<Utc>,
}

/// New user for insertion
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
}

/// Profile joined with the owning user's public fields.
#[derive(Debug, Clone, FromRow)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

/// Partial profile update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

/// Refresh token model
#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

/// Blog post with its author's username and aggregated social counters.
#[derive(Debug, Clone, FromRow)]
pub struct BlogPost {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_likes: i64,
    pub rating_sum: i64,
    pub rating_count: i64,
}

impl BlogPost {
    pub fn average_rating(&self) -> Option<f64> {
        average_rating(self.rating_sum, self.rating_count)
    }
}

/// Mean of all scores rounded to two decimals, or `None` without ratings.
pub fn average_rating(sum: i64, count: i64) -> Option<f64> {
    if count <= 0 {
        return None;
    }
    let mean = sum as f64 / count as f64;
    Some((mean * 100.0).round_ties_even() / 100.0)
}

/// Rating model
#[derive(Debug, Clone, FromRow)]
pub struct Rating {
    pub id: i64,
    pub user_id: i64,
    pub post_id: i64,
    pub score: i32,
}

/// Result of toggling a like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeState {
    Liked,
    Unliked,
}

/// Comment with its author's username.
#[derive(Debug, Clone, FromRow)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub author: String,
    pub content: String,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// New comment for insertion
#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i64,
    pub author_id: i64,
    pub content: String,
    pub parent_id: Option<i64>,
}

/// Pending or confirmed email change.
#[derive(Debug, Clone, FromRow)]
pub struct EmailVerification {
    pub id: i64,
    pub user_id: i64,
    pub new_email: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_verified: bool,
}

/// Pending or confirmed password reset.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetCode {
    pub id: i64,
    pub user_id: i64,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_rating_none_without_ratings() {
        assert_eq!(average_rating(0, 0), None);
    }

    #[test]
    fn test_average_rating_mean_of_scores() {
        assert_eq!(average_rating(5 + 3, 2), Some(4.0));
    }

    #[test]
    fn test_average_rating_rounds_to_two_decimals() {
        // {5, 4, 4} -> 4.333...
        assert_eq!(average_rating(13, 3), Some(4.33));
        // {5, 5, 4} -> 4.666...
        assert_eq!(average_rating(14, 3), Some(4.67));
        // {5, 5, 5, 5, 5, 4, 2, 2} -> 4.125, ties go to even
        assert_eq!(average_rating(33, 8), Some(4.12));
    }
}
