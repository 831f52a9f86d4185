use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{PostPage, Store, StoreError, StoreResult};
use crate::db::models::{
    BlogPost, Comment, EmailVerification, LikeState, NewComment, NewUser, PasswordResetCode,
    Profile, ProfileChanges, Rating, RefreshToken, User, DEFAULT_AVATAR, DEFAULT_BIO,
};

#[derive(Debug, Clone)]
struct ProfileRow {
    id: i64,
    user_id: i64,
    bio: Option<String>,
    avatar: Option<String>,
}

#[derive(Debug, Clone)]
struct PostRow {
    id: i64,
    title: String,
    content: String,
    author_id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CommentRow {
    id: i64,
    post_id: i64,
    author_id: i64,
    content: String,
    parent_id: Option<i64>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    sequences: HashMap<&'static str, i64>,
    users: BTreeMap<i64, User>,
    profiles: BTreeMap<i64, ProfileRow>,
    refresh_tokens: Vec<RefreshToken>,
    posts: BTreeMap<i64, PostRow>,
    likes: HashSet<(i64, i64)>,
    ratings: Vec<Rating>,
    comments: BTreeMap<i64, CommentRow>,
    email_verifications: Vec<EmailVerification>,
    password_resets: Vec<PasswordResetCode>,
}

impl Tables {
    fn next_id(&mut self, table: &'static str) -> i64 {
        let id = self.sequences.entry(table).or_insert(0);
        *id += 1;
        *id
    }

    fn username(&self, user_id: i64) -> String {
        self.users
            .get(&user_id)
            .map(|u| u.username.clone())
            .unwrap_or_default()
    }

    fn post_view(&self, row: &PostRow) -> BlogPost {
        let scores = self.ratings.iter().filter(|r| r.post_id == row.id);
        let (rating_sum, rating_count) =
            scores.fold((0i64, 0i64), |(sum, count), r| (sum + r.score as i64, count + 1));

        BlogPost {
            id: row.id,
            title: row.title.clone(),
            content: row.content.clone(),
            author_id: row.author_id,
            author: self.username(row.author_id),
            created_at: row.created_at,
            updated_at: row.updated_at,
            total_likes: self.likes.iter().filter(|(post, _)| *post == row.id).count() as i64,
            rating_sum,
            rating_count,
        }
    }

    fn comment_view(&self, row: &CommentRow) -> Comment {
        Comment {
            id: row.id,
            post_id: row.post_id,
            author_id: row.author_id,
            author: self.username(row.author_id),
            content: row.content.clone(),
            parent_id: row.parent_id,
            created_at: row.created_at,
        }
    }

    fn profile_view(&self, row: &ProfileRow) -> Option<Profile> {
        let user = self.users.get(&row.user_id)?;
        Some(Profile {
            id: row.id,
            user_id: row.user_id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            bio: row.bio.clone(),
            avatar: row.avatar.clone(),
        })
    }

    fn email_in_use(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(email) && Some(u.id) != except)
    }

    /// Ids of `root` and every comment below it.
    fn comment_subtree(&self, root: i64) -> Vec<i64> {
        let mut collected = vec![root];
        let mut cursor = 0;
        while cursor < collected.len() {
            let parent = collected[cursor];
            collected.extend(
                self.comments
                    .values()
                    .filter(|c| c.parent_id == Some(parent))
                    .map(|c| c.id),
            );
            cursor += 1;
        }
        collected
    }
}

/// In-process store. Every operation holds the lock for its whole duration,
/// so multi-row changes are atomic just like a database transaction.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<std::time::Duration> {
        let start = std::time::Instant::now();
        let _tables = self.tables.read().await;
        Ok(start.elapsed())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;

        if tables.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Duplicate { field: "username" });
        }
        if tables.email_in_use(&user.email, None) {
            return Err(StoreError::Duplicate { field: "email" });
        }

        let id = tables.next_id("users");
        let created = User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            date_joined: Utc::now(),
        };
        tables.users.insert(id, created.clone());

        let profile_id = tables.next_id("profiles");
        tables.profiles.insert(
            id,
            ProfileRow {
                id: profile_id,
                user_id: id,
                bio: Some(DEFAULT_BIO.to_string()),
                avatar: Some(DEFAULT_AVATAR.to_string()),
            },
        );

        Ok(created)
    }

    async fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn set_password(&self, user_id: i64, password_hash: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound { entity: "user" })?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn find_profile(&self, user_id: i64) -> StoreResult<Option<Profile>> {
        let tables = self.tables.read().await;
        Ok(tables
            .profiles
            .get(&user_id)
            .and_then(|row| tables.profile_view(row)))
    }

    async fn update_profile(&self, user_id: i64, changes: ProfileChanges) -> StoreResult<Profile> {
        let mut tables = self.tables.write().await;

        if !tables.profiles.contains_key(&user_id) {
            return Err(StoreError::NotFound { entity: "profile" });
        }

        if let Some(user) = tables.users.get_mut(&user_id) {
            if let Some(first_name) = changes.first_name {
                user.first_name = first_name;
            }
            if let Some(last_name) = changes.last_name {
                user.last_name = last_name;
            }
        }

        let row = tables
            .profiles
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound { entity: "profile" })?;
        if let Some(bio) = changes.bio {
            row.bio = Some(bio);
        }
        if let Some(avatar) = changes.avatar {
            row.avatar = Some(avatar);
        }
        let row = row.clone();

        tables
            .profile_view(&row)
            .ok_or(StoreError::NotFound { entity: "user" })
    }

    async fn insert_refresh_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<RefreshToken> {
        let mut tables = self.tables.write().await;
        if tables
            .refresh_tokens
            .iter()
            .any(|t| t.token_hash == token_hash)
        {
            return Err(StoreError::Duplicate { field: "token_hash" });
        }

        let token = RefreshToken {
            id: tables.next_id("refresh_tokens"),
            user_id,
            token_hash: token_hash.to_string(),
            expires_at,
            revoked: false,
            created_at: Utc::now(),
        };
        tables.refresh_tokens.push(token.clone());
        Ok(token)
    }

    async fn find_refresh_token(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>> {
        let tables = self.tables.read().await;
        Ok(tables
            .refresh_tokens
            .iter()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn revoke_refresh_token(&self, token_hash: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables
            .refresh_tokens
            .iter_mut()
            .find(|t| t.token_hash == token_hash && !t.revoked)
        {
            Some(token) => {
                token.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_posts(&self, limit: i64, offset: i64) -> StoreResult<PostPage> {
        let tables = self.tables.read().await;
        let mut rows: Vec<&PostRow> = tables.posts.values().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let items = rows
            .into_iter()
            .skip(usize::try_from(offset.max(0)).unwrap_or(usize::MAX))
            .take(limit.max(0) as usize)
            .map(|row| tables.post_view(row))
            .collect();

        Ok(PostPage {
            items,
            total: tables.posts.len() as i64,
        })
    }

    async fn find_post(&self, id: i64) -> StoreResult<Option<BlogPost>> {
        let tables = self.tables.read().await;
        Ok(tables.posts.get(&id).map(|row| tables.post_view(row)))
    }

    async fn create_post(&self, author_id: i64, title: &str, content: &str) -> StoreResult<BlogPost> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let row = PostRow {
            id: tables.next_id("blog_posts"),
            title: title.to_string(),
            content: content.to_string(),
            author_id,
            created_at: now,
            updated_at: now,
        };
        let view = tables.post_view(&row);
        tables.posts.insert(row.id, row);
        Ok(view)
    }

    async fn update_post(&self, id: i64, title: &str, content: &str) -> StoreResult<BlogPost> {
        let mut tables = self.tables.write().await;
        let row = tables
            .posts
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "post" })?;
        row.title = title.to_string();
        row.content = content.to_string();
        row.updated_at = Utc::now();
        let row = row.clone();
        Ok(tables.post_view(&row))
    }

    async fn delete_post(&self, id: i64) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.posts.remove(&id).is_none() {
            return Ok(false);
        }
        tables.likes.retain(|(post, _)| *post != id);
        tables.ratings.retain(|r| r.post_id != id);
        tables.comments.retain(|_, c| c.post_id != id);
        Ok(true)
    }

    async fn toggle_like(&self, post_id: i64, user_id: i64) -> StoreResult<LikeState> {
        let mut tables = self.tables.write().await;
        if !tables.posts.contains_key(&post_id) {
            return Err(StoreError::NotFound { entity: "post" });
        }
        if tables.likes.remove(&(post_id, user_id)) {
            Ok(LikeState::Unliked)
        } else {
            tables.likes.insert((post_id, user_id));
            Ok(LikeState::Liked)
        }
    }

    async fn upsert_rating(&self, post_id: i64, user_id: i64, score: i32) -> StoreResult<Rating> {
        let mut tables = self.tables.write().await;
        if !tables.posts.contains_key(&post_id) {
            return Err(StoreError::NotFound { entity: "post" });
        }

        if let Some(existing) = tables
            .ratings
            .iter_mut()
            .find(|r| r.post_id == post_id && r.user_id == user_id)
        {
            existing.score = score;
            return Ok(existing.clone());
        }

        let rating = Rating {
            id: tables.next_id("ratings"),
            user_id,
            post_id,
            score,
        };
        tables.ratings.push(rating.clone());
        Ok(rating)
    }

    async fn list_comments(&self, post_id: i64) -> StoreResult<Vec<Comment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .comments
            .values()
            .filter(|c| c.post_id == post_id)
            .map(|c| tables.comment_view(c))
            .collect())
    }

    async fn find_comment(&self, id: i64) -> StoreResult<Option<Comment>> {
        let tables = self.tables.read().await;
        Ok(tables.comments.get(&id).map(|c| tables.comment_view(c)))
    }

    async fn create_comment(&self, comment: NewComment) -> StoreResult<Comment> {
        let mut tables = self.tables.write().await;
        if !tables.posts.contains_key(&comment.post_id) {
            return Err(StoreError::NotFound { entity: "post" });
        }

        let row = CommentRow {
            id: tables.next_id("comments"),
            post_id: comment.post_id,
            author_id: comment.author_id,
            content: comment.content,
            parent_id: comment.parent_id,
            created_at: Utc::now(),
        };
        let view = tables.comment_view(&row);
        tables.comments.insert(row.id, row);
        Ok(view)
    }

    async fn update_comment(&self, id: i64, content: &str) -> StoreResult<Comment> {
        let mut tables = self.tables.write().await;
        let row = tables
            .comments
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "comment" })?;
        row.content = content.to_string();
        let row = row.clone();
        Ok(tables.comment_view(&row))
    }

    async fn delete_comment(&self, id: i64) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if !tables.comments.contains_key(&id) {
            return Ok(false);
        }
        let doomed = tables.comment_subtree(id);
        for comment_id in doomed {
            tables.comments.remove(&comment_id);
        }
        Ok(true)
    }

    async fn upsert_email_verification(
        &self,
        user_id: i64,
        new_email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<EmailVerification> {
        let mut tables = self.tables.write().await;

        if let Some(pending) = tables
            .email_verifications
            .iter_mut()
            .find(|v| v.user_id == user_id && v.new_email == new_email && !v.is_verified)
        {
            pending.code = code.to_string();
            pending.expires_at = expires_at;
            return Ok(pending.clone());
        }

        let verification = EmailVerification {
            id: tables.next_id("email_verifications"),
            user_id,
            new_email: new_email.to_string(),
            code: code.to_string(),
            created_at: Utc::now(),
            expires_at,
            is_verified: false,
        };
        tables.email_verifications.push(verification.clone());
        Ok(verification)
    }

    async fn find_pending_email_verification(
        &self,
        user_id: i64,
        new_email: &str,
    ) -> StoreResult<Option<EmailVerification>> {
        let tables = self.tables.read().await;
        Ok(tables
            .email_verifications
            .iter()
            .find(|v| v.user_id == user_id && v.new_email == new_email && !v.is_verified)
            .cloned())
    }

    async fn confirm_email_change(&self, verification_id: i64) -> StoreResult<User> {
        let mut tables = self.tables.write().await;

        let (user_id, new_email) = tables
            .email_verifications
            .iter()
            .find(|v| v.id == verification_id && !v.is_verified)
            .map(|v| (v.user_id, v.new_email.clone()))
            .ok_or(StoreError::NotFound { entity: "email verification" })?;

        if tables.email_in_use(&new_email, Some(user_id)) {
            return Err(StoreError::Duplicate { field: "email" });
        }

        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound { entity: "user" })?;
        user.email = new_email;
        let user = user.clone();

        if let Some(v) = tables
            .email_verifications
            .iter_mut()
            .find(|v| v.id == verification_id)
        {
            v.is_verified = true;
        }

        Ok(user)
    }

    async fn upsert_password_reset(
        &self,
        user_id: i64,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<PasswordResetCode> {
        let mut tables = self.tables.write().await;

        if let Some(pending) = tables
            .password_resets
            .iter_mut()
            .find(|r| r.user_id == user_id && !r.is_verified)
        {
            pending.code = code.to_string();
            pending.expires_at = expires_at;
            return Ok(pending.clone());
        }

        let reset = PasswordResetCode {
            id: tables.next_id("password_reset_codes"),
            user_id,
            code: code.to_string(),
            created_at: Utc::now(),
            expires_at,
            is_verified: false,
        };
        tables.password_resets.push(reset.clone());
        Ok(reset)
    }

    async fn find_pending_password_reset(
        &self,
        user_id: i64,
    ) -> StoreResult<Option<PasswordResetCode>> {
        let tables = self.tables.read().await;
        Ok(tables
            .password_resets
            .iter()
            .find(|r| r.user_id == user_id && !r.is_verified)
            .cloned())
    }

    async fn confirm_password_reset(&self, reset_id: i64, password_hash: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;

        let reset = tables
            .password_resets
            .iter_mut()
            .find(|r| r.id == reset_id && !r.is_verified)
            .ok_or(StoreError::NotFound { entity: "password reset" })?;
        reset.is_verified = true;
        let user_id = reset.user_id;

        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound { entity: "user" })?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            first_name: String::new(),
            last_name: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_user_creates_default_profile() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("alice", "alice@example.com")).await.unwrap();

        let profile = store.find_profile(user.id).await.unwrap().unwrap();
        assert_eq!(profile.user_id, user.id);
        assert_eq!(profile.bio.as_deref(), Some(DEFAULT_BIO));
        assert_eq!(profile.avatar.as_deref(), Some(DEFAULT_AVATAR));
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicates() {
        let store = MemoryStore::new();
        store.create_user(new_user("alice", "alice@example.com")).await.unwrap();

        let err = store
            .create_user(new_user("alice", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "username" }));

        let err = store
            .create_user(new_user("bob", "alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "email" }));
    }

    #[tokio::test]
    async fn test_toggle_like_twice_unlikes() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("alice", "alice@example.com")).await.unwrap();
        let post = store.create_post(user.id, "Title", "Body").await.unwrap();

        assert_eq!(store.toggle_like(post.id, user.id).await.unwrap(), LikeState::Liked);
        assert_eq!(store.find_post(post.id).await.unwrap().unwrap().total_likes, 1);
        assert_eq!(store.toggle_like(post.id, user.id).await.unwrap(), LikeState::Unliked);
        assert_eq!(store.find_post(post.id).await.unwrap().unwrap().total_likes, 0);
    }

    #[tokio::test]
    async fn test_upsert_rating_keeps_one_row_per_user() {
        let store = MemoryStore::new();
        let alice = store.create_user(new_user("alice", "alice@example.com")).await.unwrap();
        let bob = store.create_user(new_user("bob", "bob@example.com")).await.unwrap();
        let post = store.create_post(alice.id, "Title", "Body").await.unwrap();

        store.upsert_rating(post.id, alice.id, 2).await.unwrap();
        store.upsert_rating(post.id, alice.id, 5).await.unwrap();
        store.upsert_rating(post.id, bob.id, 3).await.unwrap();

        let post = store.find_post(post.id).await.unwrap().unwrap();
        assert_eq!(post.rating_count, 2);
        assert_eq!(post.average_rating(), Some(4.0));
    }

    #[tokio::test]
    async fn test_delete_comment_removes_reply_subtree() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("alice", "alice@example.com")).await.unwrap();
        let post = store.create_post(user.id, "Title", "Body").await.unwrap();

        let root = store
            .create_comment(NewComment {
                post_id: post.id,
                author_id: user.id,
                content: "root".to_string(),
                parent_id: None,
            })
            .await
            .unwrap();
        let reply = store
            .create_comment(NewComment {
                post_id: post.id,
                author_id: user.id,
                content: "reply".to_string(),
                parent_id: Some(root.id),
            })
            .await
            .unwrap();
        store
            .create_comment(NewComment {
                post_id: post.id,
                author_id: user.id,
                content: "nested".to_string(),
                parent_id: Some(reply.id),
            })
            .await
            .unwrap();

        assert!(store.delete_comment(root.id).await.unwrap());
        assert!(store.list_comments(post.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reissuing_email_code_replaces_pending_row() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("alice", "alice@example.com")).await.unwrap();
        let expires = Utc::now() + Duration::minutes(5);

        let first = store
            .upsert_email_verification(user.id, "new@example.com", "111111", expires)
            .await
            .unwrap();
        let second = store
            .upsert_email_verification(user.id, "new@example.com", "222222", expires)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let pending = store
            .find_pending_email_verification(user.id, "new@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.code, "222222");
    }

    #[tokio::test]
    async fn test_confirm_email_change_consumes_code() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("alice", "alice@example.com")).await.unwrap();
        let verification = store
            .upsert_email_verification(
                user.id,
                "new@example.com",
                "123456",
                Utc::now() + Duration::minutes(5),
            )
            .await
            .unwrap();

        let updated = store.confirm_email_change(verification.id).await.unwrap();
        assert_eq!(updated.email, "new@example.com");

        let again = store.confirm_email_change(verification.id).await;
        assert!(matches!(again, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_revoke_refresh_token_only_once() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("alice", "alice@example.com")).await.unwrap();
        store
            .insert_refresh_token(user.id, "abc", Utc::now() + Duration::days(1))
            .await
            .unwrap();

        assert!(store.revoke_refresh_token("abc").await.unwrap());
        assert!(!store.revoke_refresh_token("abc").await.unwrap());
        assert!(!store.revoke_refresh_token("missing").await.unwrap());
    }
}
