//! Error taxonomy for scan operations.
//!
//! Every variant maps to one HTTP-style status code so an outer router can
//! translate failures without inspecting messages.

use serde::Serialize;

/// Custom error type for scan operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScanError {
    /// Malformed input, correctable by the caller
    #[error("Validation error: {0}")]
    Validation(String),
    /// Target unreachable, blocked, or returned non-image content
    #[error("External service error: {0}")]
    ExternalService(String),
    /// Fetch, render or download exceeded its time bound
    #[error("Timeout: {0}")]
    Timeout(String),
    /// Requested stored asset or job is absent
    #[error("Not found: {0}")]
    NotFound(String),
    /// Anything unexpected; detail stays in the logs
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Timeout(_) => 408,
            Self::ExternalService(_) => 502,
            Self::Internal(_) => 500,
        }
    }

    /// Message safe to hand to an external caller
    ///
    /// Internal errors are logged with full detail and replaced by a generic
    /// message.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(detail) => {
                tracing::error!("Internal error: {detail}");
                "An unexpected error occurred".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Whether a fetch failure of this kind is worth another attempt
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::ExternalService(_) | Self::Internal(_)
        )
    }

    /// Map a reqwest failure onto the taxonomy
    #[must_use]
    pub fn from_reqwest(err: &reqwest::Error, context: &str) -> Self {
        if err.is_timeout() {
            Self::Timeout(format!("{context}: {err}"))
        } else {
            Self::ExternalService(format!("{context}: {err}"))
        }
    }
}

impl From<anyhow::Error> for ScanError {
    fn from(err: anyhow::Error) -> Self {
        // {:#} keeps the context chain
        Self::Internal(format!("{err:#}"))
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(err.to_string())
        } else {
            Self::Internal(format!("I/O error: {err}"))
        }
    }
}

/// Serializable error body for an outer HTTP boundary
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub error: String,
}

impl From<&ScanError> for ErrorBody {
    fn from(err: &ScanError) -> Self {
        Self {
            status: err.status_code(),
            error: err.public_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(ScanError::Validation(String::new()).status_code(), 400);
        assert_eq!(ScanError::NotFound(String::new()).status_code(), 404);
        assert_eq!(ScanError::Timeout(String::new()).status_code(), 408);
        assert_eq!(ScanError::ExternalService(String::new()).status_code(), 502);
        assert_eq!(ScanError::Internal(String::new()).status_code(), 500);
    }

    #[test]
    fn internal_detail_is_hidden() {
        let err = ScanError::Internal("db password=hunter2".to_string());
        let body = ErrorBody::from(&err);
        assert_eq!(body.status, 500);
        assert!(!body.error.contains("hunter2"));
    }

    #[test]
    fn missing_io_maps_to_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(ScanError::from(io), ScanError::NotFound(_)));
    }
}
