//! Persistence boundary. Handlers talk to a [`Store`]; the PostgreSQL
//! implementation backs production and the in-memory one backs development
//! runs without `DATABASE_URL` and the test suite.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::models::{
    BlogPost, Comment, EmailVerification, LikeState, NewComment, NewUser, PasswordResetCode,
    Profile, ProfileChanges, Rating, RefreshToken, User,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique column already holds this value.
    #[error("{field} already exists")]
    Duplicate { field: &'static str },

    /// The row a mutation targets is gone.
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One page of posts plus the total number of posts.
#[derive(Debug, Clone)]
pub struct PostPage {
    pub items: Vec<BlogPost>,
    pub total: i64,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Round-trip to the backing store; returns how long it took.
    async fn ping(&self) -> StoreResult<std::time::Duration>;

    // Users and profiles

    /// Create a user and its profile together.
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn find_user(&self, id: i64) -> StoreResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn set_password(&self, user_id: i64, password_hash: &str) -> StoreResult<()>;
    async fn find_profile(&self, user_id: i64) -> StoreResult<Option<Profile>>;
    async fn update_profile(&self, user_id: i64, changes: ProfileChanges) -> StoreResult<Profile>;

    // Refresh tokens

    async fn insert_refresh_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<RefreshToken>;
    async fn find_refresh_token(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>>;
    /// Returns `false` when no unrevoked token with this hash exists.
    async fn revoke_refresh_token(&self, token_hash: &str) -> StoreResult<bool>;

    // Posts

    async fn list_posts(&self, limit: i64, offset: i64) -> StoreResult<PostPage>;
    async fn find_post(&self, id: i64) -> StoreResult<Option<BlogPost>>;
    async fn create_post(&self, author_id: i64, title: &str, content: &str) -> StoreResult<BlogPost>;
    async fn update_post(&self, id: i64, title: &str, content: &str) -> StoreResult<BlogPost>;
    /// Returns `false` when the post did not exist.
    async fn delete_post(&self, id: i64) -> StoreResult<bool>;
    async fn toggle_like(&self, post_id: i64, user_id: i64) -> StoreResult<LikeState>;
    /// Insert or replace the caller's score for a post.
    async fn upsert_rating(&self, post_id: i64, user_id: i64, score: i32) -> StoreResult<Rating>;

    // Comments

    /// Every comment on a post, oldest first.
    async fn list_comments(&self, post_id: i64) -> StoreResult<Vec<Comment>>;
    async fn find_comment(&self, id: i64) -> StoreResult<Option<Comment>>;
    async fn create_comment(&self, comment: NewComment) -> StoreResult<Comment>;
    async fn update_comment(&self, id: i64, content: &str) -> StoreResult<Comment>;
    /// Delete a comment and its reply subtree. Returns `false` when absent.
    async fn delete_comment(&self, id: i64) -> StoreResult<bool>;

    // One-time codes

    /// Issue or re-issue the pending code for `(user_id, new_email)`.
    async fn upsert_email_verification(
        &self,
        user_id: i64,
        new_email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<EmailVerification>;
    async fn find_pending_email_verification(
        &self,
        user_id: i64,
        new_email: &str,
    ) -> StoreResult<Option<EmailVerification>>;
    /// Mark the code verified and move the user to the new address atomically.
    async fn confirm_email_change(&self, verification_id: i64) -> StoreResult<User>;

    /// Issue or re-issue the pending password reset code for a user.
    async fn upsert_password_reset(
        &self,
        user_id: i64,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<PasswordResetCode>;
    async fn find_pending_password_reset(
        &self,
        user_id: i64,
    ) -> StoreResult<Option<PasswordResetCode>>;
    /// Mark the code verified and store the new password hash atomically.
    async fn confirm_password_reset(&self, reset_id: i64, password_hash: &str) -> StoreResult<()>;
}
