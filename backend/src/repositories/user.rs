use async_trait::async_trait;
use uuid::Uuid;

use super::StoreError;
use crate::models::{
    CodePurpose, NewOneTimeCode, NewUser, OneTimeCode, Profile, User, UserListFilter,
};
use crate::types::PrincipalId;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`StoreError::EmailTaken`] when the email is registered.
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn find_user_by_id(&self, id: PrincipalId) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Persists name, email, verification flag and password hash.
    async fn update_user(&self, user: &User) -> Result<User, StoreError>;

    /// One page of users plus the number of users matching the filter.
    async fn list_users(&self, filter: &UserListFilter) -> Result<(Vec<User>, i64), StoreError>;

    async fn find_profile(&self, user_id: PrincipalId) -> Result<Option<Profile>, StoreError>;

    async fn upsert_profile(&self, profile: &Profile) -> Result<Profile, StoreError>;

    async fn latest_code(
        &self,
        user_id: PrincipalId,
        purpose: CodePurpose,
    ) -> Result<Option<OneTimeCode>, StoreError>;

    async fn insert_code(&self, code: NewOneTimeCode) -> Result<OneTimeCode, StoreError>;

    /// Increments the wrong-guess counter and returns its new value, or
    /// `None` when the code no longer exists.
    async fn record_failed_attempt(&self, id: Uuid) -> Result<Option<i32>, StoreError>;

    async fn delete_codes(
        &self,
        user_id: PrincipalId,
        purpose: CodePurpose,
    ) -> Result<u64, StoreError>;
}
