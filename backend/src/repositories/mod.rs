//! Persistence collaborators behind the session and identity logic.

pub mod memory;
pub mod postgres;
pub mod session;
pub mod user;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use session::SessionStore;
pub use user::UserStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email address already registered")]
    EmailTaken,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.into())
    }
}

impl From<crate::utils::TimedOut> for StoreError {
    fn from(err: crate::utils::TimedOut) -> Self {
        StoreError::Backend(err.into())
    }
}

/// Runs a store call under the configured deadline.
pub async fn bounded<F, T>(
    operation: &'static str,
    limit: std::time::Duration,
    fut: F,
) -> Result<T, StoreError>
where
    F: std::future::Future<Output = Result<T, StoreError>>,
{
    crate::utils::within(operation, limit, fut).await?
}
