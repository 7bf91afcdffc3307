use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Could not read attachment {name}: {reason}")]
    AttachmentRead { name: String, reason: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Provider error ({kind}): {message}")]
    Provider { kind: String, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("No user message to regenerate from")]
    NoUserMessage,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Cloneable tag for a [`ParleyError`], kept in store state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    AttachmentRead,
    Network,
    Timeout,
    Provider,
    NotFound,
    NoUserMessage,
    Persistence,
    Other,
}

impl ParleyError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn provider(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::AttachmentRead { .. } => ErrorKind::AttachmentRead,
            Self::Network(_) | Self::Http(_) => ErrorKind::Network,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Provider { .. } => ErrorKind::Provider,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::NoUserMessage => ErrorKind::NoUserMessage,
            Self::Persistence(_) | Self::Io(_) | Self::Json(_) => ErrorKind::Persistence,
            Self::Other(_) => ErrorKind::Other,
        }
    }
}

/// A dismissible error notice as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ParleyError> for ErrorNotice {
    fn from(err: &ParleyError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ParleyError>;
