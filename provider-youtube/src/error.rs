//! Error types for YouTube provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// YouTube provider errors
#[derive(Error, Debug)]
pub enum YouTubeError {
    /// API request returned an error
    #[error("YouTube API error (status {status_code}, reason {reason}): {message}")]
    ApiError {
        status_code: u16,
        reason: String,
        message: String,
    },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for YouTube operations
pub type Result<T> = std::result::Result<T, YouTubeError>;

impl From<YouTubeError> for BridgeError {
    fn from(error: YouTubeError) -> Self {
        match error {
            YouTubeError::BridgeError(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = YouTubeError::ApiError {
            status_code: 403,
            reason: "quotaExceeded".to_string(),
            message: "The request cannot be completed".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "YouTube API error (status 403, reason quotaExceeded): The request cannot be completed"
        );
    }

    #[test]
    fn test_error_conversion_keeps_bridge_errors() {
        let error = YouTubeError::BridgeError(BridgeError::Timeout("search".to_string()));
        let bridge_error: BridgeError = error.into();

        assert!(matches!(bridge_error, BridgeError::Timeout(_)));
    }
}
