use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{PostPage, Store, StoreError, StoreResult};
use crate::db::{
    self,
    models::{
        BlogPost, Comment, EmailVerification, LikeState, NewComment, NewUser, PasswordResetCode,
        Profile, ProfileChanges, Rating, RefreshToken, User, DEFAULT_AVATAR, DEFAULT_BIO,
    },
};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, first_name, last_name, date_joined";

const POST_SELECT: &str = r#"
    SELECT p.id, p.title, p.content, p.author_id, u.username AS author,
           p.created_at, p.updated_at,
           (SELECT COUNT(*) FROM blog_post_likes l WHERE l.post_id = p.id) AS total_likes,
           (SELECT COALESCE(SUM(r.score), 0)::BIGINT FROM ratings r WHERE r.post_id = p.id) AS rating_sum,
           (SELECT COUNT(*) FROM ratings r WHERE r.post_id = p.id) AS rating_count
    FROM blog_posts p
    JOIN users u ON u.id = p.author_id
"#;

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.post_id, c.author_id, u.username AS author, c.content,
           c.parent_id, c.created_at
    FROM comments c
    JOIN users u ON u.id = c.author_id
"#;

const PROFILE_SELECT: &str = r#"
    SELECT p.id, p.user_id, u.first_name, u.last_name, u.email, p.bio, p.avatar
    FROM profiles p
    JOIN users u ON u.id = p.user_id
"#;

/// Translate unique-constraint violations into [`StoreError::Duplicate`].
fn map_unique(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let constraint = db_err.constraint().unwrap_or_default();
            let field = if constraint.contains("username") {
                "username"
            } else if constraint.contains("email") {
                "email"
            } else {
                "record"
            };
            return StoreError::Duplicate { field };
        }
    }
    StoreError::Database(err)
}

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<std::time::Duration> {
        Ok(db::health_check(&self.pool).await?)
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, first_name, last_name)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique)?;

        sqlx::query("INSERT INTO profiles (user_id, bio, avatar) VALUES ($1, $2, $3)")
            .bind(created.id)
            .bind(DEFAULT_BIO)
            .bind(DEFAULT_AVATAR)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn set_password(&self, user_id: i64, password_hash: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: "user" });
        }
        Ok(())
    }

    async fn find_profile(&self, user_id: i64) -> StoreResult<Option<Profile>> {
        Ok(
            sqlx::query_as::<_, Profile>(&format!("{PROFILE_SELECT} WHERE p.user_id = $1"))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn update_profile(&self, user_id: i64, changes: ProfileChanges) -> StoreResult<Profile> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE users
            SET first_name = COALESCE($1, first_name),
                last_name = COALESCE($2, last_name)
            WHERE id = $3
            "#,
        )
        .bind(&changes.first_name)
        .bind(&changes.last_name)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET bio = COALESCE($1, bio),
                avatar = COALESCE($2, avatar)
            WHERE user_id = $3
            "#,
        )
        .bind(&changes.bio)
        .bind(&changes.avatar)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: "profile" });
        }

        let profile = sqlx::query_as::<_, Profile>(&format!("{PROFILE_SELECT} WHERE p.user_id = $1"))
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(profile)
    }

    async fn insert_refresh_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<RefreshToken> {
        Ok(sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token_hash, expires_at, revoked, created_at
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn find_refresh_token(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>> {
        Ok(sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT id, user_id, token_hash, expires_at, revoked, created_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn revoke_refresh_token(&self, token_hash: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = true WHERE token_hash = $1 AND revoked = false",
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_posts(&self, limit: i64, offset: i64) -> StoreResult<PostPage> {
        let items = sqlx::query_as::<_, BlogPost>(&format!(
            "{POST_SELECT} ORDER BY p.created_at DESC, p.id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM blog_posts")
            .fetch_one(&self.pool)
            .await?;

        Ok(PostPage {
            items,
            total: total.0,
        })
    }

    async fn find_post(&self, id: i64) -> StoreResult<Option<BlogPost>> {
        Ok(
            sqlx::query_as::<_, BlogPost>(&format!("{POST_SELECT} WHERE p.id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn create_post(&self, author_id: i64, title: &str, content: &str) -> StoreResult<BlogPost> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO blog_posts (title, content, author_id, created_at, updated_at)
            VALUES ($1, $2, $3, now(), now())
            RETURNING id
            "#,
        )
        .bind(title)
        .bind(content)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await?;

        self.find_post(id)
            .await?
            .ok_or(StoreError::NotFound { entity: "post" })
    }

    async fn update_post(&self, id: i64, title: &str, content: &str) -> StoreResult<BlogPost> {
        let result = sqlx::query(
            "UPDATE blog_posts SET title = $1, content = $2, updated_at = now() WHERE id = $3",
        )
        .bind(title)
        .bind(content)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: "post" });
        }

        self.find_post(id)
            .await?
            .ok_or(StoreError::NotFound { entity: "post" })
    }

    async fn delete_post(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM blog_posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn toggle_like(&self, post_id: i64, user_id: i64) -> StoreResult<LikeState> {
        let removed = sqlx::query("DELETE FROM blog_post_likes WHERE post_id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if removed.rows_affected() > 0 {
            return Ok(LikeState::Unliked);
        }

        sqlx::query(
            r#"
            INSERT INTO blog_post_likes (post_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(post_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(LikeState::Liked)
    }

    async fn upsert_rating(&self, post_id: i64, user_id: i64, score: i32) -> StoreResult<Rating> {
        Ok(sqlx::query_as::<_, Rating>(
            r#"
            INSERT INTO ratings (user_id, post_id, score)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, post_id) DO UPDATE SET score = EXCLUDED.score
            RETURNING id, user_id, post_id, score
            "#,
        )
        .bind(user_id)
        .bind(post_id)
        .bind(score)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_comments(&self, post_id: i64) -> StoreResult<Vec<Comment>> {
        Ok(sqlx::query_as::<_, Comment>(&format!(
            "{COMMENT_SELECT} WHERE c.post_id = $1 ORDER BY c.created_at ASC, c.id ASC"
        ))
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn find_comment(&self, id: i64) -> StoreResult<Option<Comment>> {
        Ok(
            sqlx::query_as::<_, Comment>(&format!("{COMMENT_SELECT} WHERE c.id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn create_comment(&self, comment: NewComment) -> StoreResult<Comment> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO comments (post_id, author_id, content, parent_id, created_at)
            VALUES ($1, $2, $3, $4, now())
            RETURNING id
            "#,
        )
        .bind(comment.post_id)
        .bind(comment.author_id)
        .bind(&comment.content)
        .bind(comment.parent_id)
        .fetch_one(&self.pool)
        .await?;

        self.find_comment(id)
            .await?
            .ok_or(StoreError::NotFound { entity: "comment" })
    }

    async fn update_comment(&self, id: i64, content: &str) -> StoreResult<Comment> {
        let result = sqlx::query("UPDATE comments SET content = $1 WHERE id = $2")
            .bind(content)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: "comment" });
        }

        self.find_comment(id)
            .await?
            .ok_or(StoreError::NotFound { entity: "comment" })
    }

    async fn delete_comment(&self, id: i64) -> StoreResult<bool> {
        // Replies go with their parent through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_email_verification(
        &self,
        user_id: i64,
        new_email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<EmailVerification> {
        Ok(sqlx::query_as::<_, EmailVerification>(
            r#"
            INSERT INTO email_verifications (user_id, new_email, code, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, new_email) WHERE is_verified = false
            DO UPDATE SET code = EXCLUDED.code, expires_at = EXCLUDED.expires_at
            RETURNING id, user_id, new_email, code, created_at, expires_at, is_verified
            "#,
        )
        .bind(user_id)
        .bind(new_email)
        .bind(code)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn find_pending_email_verification(
        &self,
        user_id: i64,
        new_email: &str,
    ) -> StoreResult<Option<EmailVerification>> {
        Ok(sqlx::query_as::<_, EmailVerification>(
            r#"
            SELECT id, user_id, new_email, code, created_at, expires_at, is_verified
            FROM email_verifications
            WHERE user_id = $1 AND new_email = $2 AND is_verified = false
            "#,
        )
        .bind(user_id)
        .bind(new_email)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn confirm_email_change(&self, verification_id: i64) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;

        let claimed: Option<(i64, String)> = sqlx::query_as(
            r#"
            UPDATE email_verifications
            SET is_verified = true
            WHERE id = $1 AND is_verified = false
            RETURNING user_id, new_email
            "#,
        )
        .bind(verification_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (user_id, new_email) =
            claimed.ok_or(StoreError::NotFound { entity: "email verification" })?;

        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET email = $1 WHERE id = $2 RETURNING {USER_COLUMNS}"
        ))
        .bind(&new_email)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique)?;

        tx.commit().await?;
        Ok(user)
    }

    async fn upsert_password_reset(
        &self,
        user_id: i64,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<PasswordResetCode> {
        Ok(sqlx::query_as::<_, PasswordResetCode>(
            r#"
            INSERT INTO password_reset_codes (user_id, code, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) WHERE is_verified = false
            DO UPDATE SET code = EXCLUDED.code, expires_at = EXCLUDED.expires_at
            RETURNING id, user_id, code, created_at, expires_at, is_verified
            "#,
        )
        .bind(user_id)
        .bind(code)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn find_pending_password_reset(
        &self,
        user_id: i64,
    ) -> StoreResult<Option<PasswordResetCode>> {
        Ok(sqlx::query_as::<_, PasswordResetCode>(
            r#"
            SELECT id, user_id, code, created_at, expires_at, is_verified
            FROM password_reset_codes
            WHERE user_id = $1 AND is_verified = false
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn confirm_password_reset(&self, reset_id: i64, password_hash: &str) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let claimed: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE password_reset_codes
            SET is_verified = true
            WHERE id = $1 AND is_verified = false
            RETURNING user_id
            "#,
        )
        .bind(reset_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (user_id,) = claimed.ok_or(StoreError::NotFound { entity: "password reset" })?;

        sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
