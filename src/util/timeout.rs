//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::{CompletionError, ConfabError};

/// Wrap a future with a timeout; elapsing surfaces a retryable completion error.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, ConfabError>>,
) -> Result<T, ConfabError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(CompletionError::Timeout(duration.as_millis() as u64).into()),
    }
}
