use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for aggregator operations
pub type Result<T, E = AggregatorError> = std::result::Result<T, E>;

/// Errors that can occur while serving the combined contest listing
#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("Upstream request failed for {resource}: {message}")]
    UpstreamRequestFailed { resource: String, message: String },

    #[error("Upstream timeout for {0}")]
    UpstreamTimeout(String),

    #[error("Upstream returned {status} for {resource}")]
    UpstreamStatus {
        resource: String,
        status: StatusCode,
        body: String,
    },

    #[error("Invalid upstream payload for {resource}: {message}")]
    UpstreamPayload { resource: String, message: String },

    #[error("Upstream task failed: {0}")]
    TaskFailed(String),

    #[error("Response serialization error: {0}")]
    ResponseSerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] crate::config::ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AggregatorError {
    /// Builds the error for a failed call to the upstream of `resource`.
    pub fn from_reqwest(resource: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            AggregatorError::UpstreamTimeout(resource.to_string())
        } else {
            AggregatorError::UpstreamRequestFailed {
                resource: resource.to_string(),
                message: error.to_string(),
            }
        }
    }

    /// Status code returned by the upstream, if it answered at all.
    pub fn upstream_status(&self) -> Option<StatusCode> {
        match self {
            AggregatorError::UpstreamStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response body returned by the upstream along with a non-2xx status.
    pub fn upstream_body(&self) -> Option<&str> {
        match self {
            AggregatorError::UpstreamStatus { body, .. } => Some(body),
            _ => None,
        }
    }
}
