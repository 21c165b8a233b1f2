use serde_json::Value as JsonValue;

/// Error type returned by [`ApiClient`](crate::ApiClient).
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The attempt exceeded its deadline and was cancelled.
    #[error("request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    /// Connection-level failure before a response arrived.
    #[error("network error: {message}")]
    Network { message: String },
    /// Terminal non-success HTTP status.
    #[error("{message}")]
    Http {
        status: u16,
        message: String,
        /// Decoded JSON error body, when the origin sent one.
        body: Option<JsonValue>,
    },
    /// The origin answered but the payload could not be decoded.
    #[error("malformed response (status {status}): {message}")]
    Malformed { status: u16, message: String },
    /// Invalid client configuration or request construction.
    #[error("invalid client configuration: {0}")]
    Config(String),
}

/// Machine-readable classification of an [`ApiError`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Timeout,
    Network,
    HttpStatus(u16),
    Malformed,
    Config,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Network { .. } => ErrorKind::Network,
            Self::Http { status, .. } => ErrorKind::HttpStatus(*status),
            Self::Malformed { .. } => ErrorKind::Malformed,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// HTTP status attached to the error, if the origin answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::Malformed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether another attempt may succeed where this one failed.
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            Self::Malformed { .. } | Self::Config(_) => false,
        }
    }
}
