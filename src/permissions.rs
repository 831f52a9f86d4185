//! Object-level permissions: anyone may read, only the owner may change.

use crate::auth::AuthUser;
use crate::db::models::{BlogPost, Comment, Profile};
use crate::error::ApiError;

/// Something that belongs to exactly one user.
pub trait Owned {
    fn owner_id(&self) -> i64;
}

impl Owned for BlogPost {
    fn owner_id(&self) -> i64 {
        self.author_id
    }
}

impl Owned for Comment {
    fn owner_id(&self) -> i64 {
        self.author_id
    }
}

impl Owned for Profile {
    fn owner_id(&self) -> i64 {
        self.user_id
    }
}

/// Fail with 403 unless `user` owns `object`.
pub fn ensure_owner<T: Owned + ?Sized>(user: &AuthUser, object: &T) -> Result<(), ApiError> {
    if object.owner_id() == user.id {
        Ok(())
    } else {
        tracing::warn!(
            user_id = user.id,
            owner_id = object.owner_id(),
            "rejected mutation by non-owner"
        );
        Err(ApiError::forbidden())
    }
}
