use std::future::Future;
use std::time::Duration;

use canopy_common::error::{CanopyError, Result};

/// Bounds one namespace-store interaction. On expiry the caller gets the
/// retryable `Deadline` error; whatever sub-step completed before the
/// timeout stands.
pub(crate) async fn bounded<T>(
    limit: Duration,
    op: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(CanopyError::Deadline(op)),
    }
}
