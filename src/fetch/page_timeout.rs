//! Timeout utilities for page operations
//!
//! Every network and browser call in the fetchers goes through
//! [`with_page_timeout`], so an elapsed bound surfaces as
//! [`ScanError::Timeout`] and stays eligible for retry.

use std::future::Future;
use std::time::Duration;

use crate::error::ScanError;

/// Wrap an async operation with an explicit timeout
///
/// # Arguments
/// * `operation` - The async Future to execute with a timeout
/// * `timeout` - Upper bound for the operation
/// * `operation_name` - Human-readable name for error messages
pub async fn with_page_timeout<F, T>(
    operation: F,
    timeout: Duration,
    operation_name: &str,
) -> Result<T, ScanError>
where
    F: Future<Output = Result<T, ScanError>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(ScanError::Timeout(format!(
            "{operation_name} timeout after {} ms",
            timeout.as_millis()
        ))),
    }
}
