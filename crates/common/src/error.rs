//! Error types for the preservation harness

use thiserror::Error;

/// Result type alias using the harness Error
pub type Result<T> = std::result::Result<T, Error>;

/// Harness error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Object storage error: {0}")]
    Storage(#[from] object_store::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Unexpected status {status} from {method} {url}: {body}")]
    UnexpectedStatus {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Timed out after {elapsed_ms} ms waiting for {what} (last observed: {last_observed})")]
    Timeout {
        what: String,
        elapsed_ms: u64,
        last_observed: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid storage location: {0}")]
    InvalidLocation(String),

    #[error("Malformed METS: {0}")]
    Mets(String),

    /// A non-HTTP status source (such as a rendered page) failed
    #[error("Status source failed: {0}")]
    Source(String),
}

impl Error {
    /// Whether a poller may retry after this error.
    ///
    /// Connection failures, request timeouts, throttling and 5xx responses
    /// are treated as transient. Authentication and assertion failures never are.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_connect() || e.is_timeout(),
            Error::UnexpectedStatus { status, .. } => *status == 429 || *status >= 500,
            Error::NotFound(_) => true,
            _ => false,
        }
    }
}

/// Fail with [`Error::Assertion`] unless the condition holds.
///
/// The error is converted with `Into`, so the macro also works in functions
/// returning an error type that wraps [`Error`].
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::Error::Assertion(format!($($arg)+)).into());
        }
    };
}
