use std::fmt;

/// Failure reported by an [`ApiClient`](crate::ApiClient) for a single call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub kind: FailureKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidEndpoint,
    HttpStatus(u16),
    Timeout,
    Network,
    /// Body was not JSON, or not a JSON object.
    Malformed,
    /// The API answered with an `error` object.
    Api { code: String },
    /// The HTTP client itself could not be set up.
    Client,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidEndpoint => write!(f, "invalid endpoint"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Malformed => write!(f, "malformed response"),
            FailureKind::Api { code } => write!(f, "api error {code}"),
            FailureKind::Client => write!(f, "http client error"),
        }
    }
}

/// Failure of a namespace or title source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("api error: {0}")]
    Api(#[from] ApiError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// Terminal error of an export run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CrawlError {
    #[error("client cannot export from this wiki: {0}")]
    Incompatible(String),
    #[error("gave up after repeated transient failures: {0}")]
    RetriesExhausted(String),
    #[error("could not list namespaces: {0}")]
    Namespaces(String),
    #[error("could not list titles: {0}")]
    Titles(String),
}

impl CrawlError {
    /// Closing line printed when a run stops on this error.
    pub fn exit_notice(&self) -> &'static str {
        match self {
            CrawlError::Incompatible(_) => "This client does not work with this wiki. Exiting.",
            CrawlError::RetriesExhausted(_) => {
                "The wiki kept failing after every cooldown allowed. Exiting."
            }
            CrawlError::Namespaces(_) | CrawlError::Titles(_) => {
                "Could not enumerate the pages to export. Exiting."
            }
        }
    }
}
