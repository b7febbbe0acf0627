//! Error types for the `arx_sentinel` crate.

use crate::feedback::FeedbackRejection;

/// All errors that can surface from the filtering engine and the gateway.
#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    /// The target URL is missing or cannot be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The target URL uses a scheme other than `http`/`https`.
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// The target URL matches a block pattern outright.
    #[error("Blocked destination: {0}")]
    Blocked(String),

    /// Fetching the remote document failed.
    #[error("Upstream fetch failed: {0}")]
    Upstream(String),

    /// A storage backend failed to read or persist state.
    #[error("Storage failed: {0}")]
    Storage(Box<dyn std::error::Error + Send + Sync>),

    /// A feedback call was rejected.
    #[error("Feedback rejected: {0}")]
    Feedback(#[from] FeedbackRejection),

    /// The configuration or rule set is invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// A document node could not be accessed or modified.
    #[error("Document error: {0}")]
    Document(String),

    /// The in-page API slot was already filled.
    #[error("Engine API already installed")]
    AlreadyInstalled,

    /// The in-page session worker has stopped.
    #[error("Session closed")]
    SessionClosed,
}

/// A type alias for `Result<T, SentinelError>`.
pub type Result<T> = std::result::Result<T, SentinelError>;
