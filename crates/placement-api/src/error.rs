use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Message shown when a failed reply carries no readable explanation.
pub const GENERIC_FAILURE_MESSAGE: &str = "Processing failed.";

/// Errors produced while talking to the placement service.
#[derive(Debug)]
pub enum ApiError {
    InvalidBaseUrl {
        value: String,
        reason: String,
    },
    ReadFile {
        field: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },
    /// Non-2xx reply. Displays only the server-provided message.
    Backend {
        status: u16,
        message: String,
    },
    Json {
        context: &'static str,
        source: serde_json::Error,
    },
    Base64(base64::DecodeError),
}

impl ApiError {
    /// HTTP status of a backend failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Backend { status, .. } => Some(*status),
            Self::Transport { source, .. } => source.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBaseUrl { value, reason } => {
                write!(f, "invalid service url {value:?}: {reason}")
            }
            Self::ReadFile {
                field,
                path,
                source,
            } => write!(f, "cannot attach {field} {}: {source}", path.display()),
            Self::Transport { endpoint, source } => {
                write!(f, "request to {endpoint} failed: {source}")
            }
            Self::Backend { message, .. } => f.write_str(message),
            Self::Json { context, source } => write!(f, "malformed {context}: {source}"),
            Self::Base64(err) => write!(f, "video payload is not valid base64: {err}"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::Transport { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::Base64(err) => Some(err),
            _ => None,
        }
    }
}

impl From<base64::DecodeError> for ApiError {
    fn from(value: base64::DecodeError) -> Self {
        Self::Base64(value)
    }
}
