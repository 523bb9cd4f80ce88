//! Error types for probe reads.

use std::num::ParseFloatError;
use std::time::Duration;

use thiserror::Error;

/// Boxed error used for transport-level causes (I/O, TLS, hyper).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for probe operations.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors that can occur while constructing or reading a probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("transport error reaching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to read exposition stream: {0}")]
    Read(#[from] std::io::Error),

    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("{url} answered with HTTP status {status}")]
    Protocol { url: String, status: http::StatusCode },

    #[error("malformed value {token:?} for key {key}: {source}")]
    Parse {
        key: String,
        token: String,
        #[source]
        source: ParseFloatError,
    },

    #[error("value {token:?} for key {key} is out of range for f64")]
    OutOfRange { key: String, token: String },

    #[error("token {key} not found")]
    NotFound { key: String },

    #[error("invalid probe url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("probe key must not be empty")]
    EmptyKey,
}

/// Coarse classification of a [`ProbeError`], for callers that only need
/// to know which layer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeErrorKind {
    /// Anything below HTTP: connect, DNS, TLS, body read, deadline.
    Transport,
    /// Non-success HTTP status.
    Protocol,
    /// The matched line carried a value that is not a float.
    Parse,
    /// No line matched the key.
    NotFound,
    /// The probe itself is misconfigured.
    Config,
}

impl ProbeError {
    pub(crate) fn transport(url: &str, source: impl Into<BoxError>) -> Self {
        Self::Transport {
            url: url.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn invalid_url(url: &str, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ProbeErrorKind {
        match self {
            Self::Transport { .. } | Self::Read(_) | Self::Timeout { .. } => ProbeErrorKind::Transport,
            Self::Protocol { .. } => ProbeErrorKind::Protocol,
            Self::Parse { .. } | Self::OutOfRange { .. } => ProbeErrorKind::Parse,
            Self::NotFound { .. } => ProbeErrorKind::NotFound,
            Self::InvalidUrl { .. } | Self::EmptyKey => ProbeErrorKind::Config,
        }
    }
}
