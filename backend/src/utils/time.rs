use std::{future::Future, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{operation} timed out after {limit:?}")]
pub struct TimedOut {
    pub operation: &'static str,
    pub limit: Duration,
}

/// Bounds a store or cache call. Dropping the inner future cancels its I/O.
pub async fn within<F, T>(operation: &'static str, limit: Duration, fut: F) -> Result<T, TimedOut>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| TimedOut { operation, limit })
}
