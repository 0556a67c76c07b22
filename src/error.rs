use thiserror::Error;

/// Main error type for the agent
#[derive(Error, Debug)]
pub enum GopherError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Missing credential: {0} is not set")]
    MissingCredential(&'static str),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Component errors
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    State(#[from] StateError),

    // Agent loop errors
    #[error("Invalid phase transition: from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Agent halted: {0}")]
    Halted(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for GopherError
pub type Result<T> = std::result::Result<T, GopherError>;

/// Failures of the market data fetch path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Market data request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Market data rate limited: {0}")]
    RateLimited(String),

    #[error("Market data unauthorized: {0}")]
    Unauthorized(String),

    #[error("Malformed market data response: {0}")]
    MalformedResponse(String),

    #[error("Market data transport failure: {0}")]
    Transport(String),
}

impl FetchError {
    /// Whether the fetcher should retry after this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout { .. } | FetchError::RateLimited(_) | FetchError::Transport(_)
        )
    }

    /// Whether this error must stop the agent
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Unauthorized(_))
    }
}

/// Failures of the generative-text backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompositionError {
    #[error("Generative backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Generative backend timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Generated content rejected: {0}")]
    ContentRejected(String),
}

impl CompositionError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CompositionError::BackendUnavailable(_) | CompositionError::Timeout { .. }
        )
    }
}

/// Failures of the publishing path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("Transient publish failure: {0}")]
    Transient(String),

    #[error("Post rejected by platform: {0}")]
    Rejected(String),

    #[error("Post log unavailable: {0}")]
    Ledger(#[from] StateError),
}

impl PublishError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PublishError::Transient(_))
    }
}

/// Failures reading or writing durable agent files
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Failed to read {path}: {reason}")]
    ReadFailure { path: String, reason: String },

    #[error("Failed to write {path}: {reason}")]
    WriteFailure { path: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_classification() {
        assert!(FetchError::Timeout { elapsed_ms: 100 }.is_transient());
        assert!(FetchError::RateLimited("note".into()).is_transient());
        assert!(FetchError::Transport("reset".into()).is_transient());
        assert!(!FetchError::MalformedResponse("bad".into()).is_transient());

        let unauthorized = FetchError::Unauthorized("bad key".into());
        assert!(!unauthorized.is_transient());
        assert!(unauthorized.is_fatal());
    }

    #[test]
    fn test_publish_error_classification() {
        assert!(PublishError::Transient("503".into()).is_transient());
        assert!(!PublishError::Rejected("policy".into()).is_transient());

        let ledger: PublishError = StateError::ReadFailure {
            path: "posts.jsonl".into(),
            reason: "denied".into(),
        }
        .into();
        assert!(!ledger.is_transient());
    }

    #[test]
    fn test_component_errors_wrap_into_gopher_error() {
        let err: GopherError = FetchError::Unauthorized("apikey".into()).into();
        assert!(matches!(err, GopherError::Fetch(FetchError::Unauthorized(_))));
        assert_eq!(err.to_string(), "Market data unauthorized: apikey");
    }
}
