//! Error types for favwatch
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

use crate::config::ValidationErrors;

/// Result type alias for favwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for favwatch
#[derive(Error, Debug)]
pub enum Error {
    /// Feed source errors that are not better described by another variant
    #[error("Feed source error: {0}")]
    FeedSource(String),

    /// Seen store errors
    #[error("Seen store error: {0}")]
    SeenStore(String),

    /// Event sink errors
    #[error("Event sink error: {0}")]
    Sink(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Option validation failed (lists every offending field)
    #[error("Invalid options: {0}")]
    Validation(#[from] ValidationErrors),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP errors from the remote API
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors (expired or invalid credentials)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Remote resource not found (e.g. unknown username)
    #[error("Not found: {0}")]
    NotFound(String),

    /// A remote item could not be decoded
    #[error("Malformed item: {0}")]
    MalformedItem(String),

    /// Feed-specific error
    #[error("Feed error ({feed}): {message}")]
    Feed {
        /// Feed source name
        feed: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a feed source error
    pub fn feed_source(msg: impl Into<String>) -> Self {
        Self::FeedSource(msg.into())
    }

    /// Create a seen store error
    pub fn seen_store(msg: impl Into<String>) -> Self {
        Self::SeenStore(msg.into())
    }

    /// Create an event sink error
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a malformed item error
    pub fn malformed_item(msg: impl Into<String>) -> Self {
        Self::MalformedItem(msg.into())
    }

    /// Create a feed-specific error
    pub fn feed(feed: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Feed {
            feed: feed.into(),
            message: message.into(),
        }
    }

    /// Whether retrying on the next scheduled tick may succeed
    ///
    /// Authentication, validation and configuration problems need an operator.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::RateLimited(_) | Error::Io(_) | Error::Feed { .. }
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::rate_limited("slow down").is_transient());
        assert!(Error::http("502 Bad Gateway").is_transient());
        assert!(!Error::auth("token expired").is_transient());
        assert!(!Error::malformed_item("missing id").is_transient());
    }

    #[test]
    fn test_feed_error_display() {
        let err = Error::feed("twitter", "connection reset");
        assert_eq!(err.to_string(), "Feed error (twitter): connection reset");
    }
}
