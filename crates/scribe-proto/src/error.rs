//! Error kinds surfaced over the wire.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error classification carried in responses. Transports map these
/// onto their native status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed pack, missing or invalid ids.
    InvalidArgument,
    /// Unknown client or document.
    NotFound,
    /// The request requires state the server does not have, e.g. pushing to
    /// a document the client never attached.
    FailedPrecondition,
    /// Store failure, lock failure or violated invariant.
    Internal,
}

impl ErrorKind {
    /// Static code for metrics labeling.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::FailedPrecondition => "failed_precondition",
            Self::Internal => "internal",
        }
    }
}

/// An error as seen by the remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct WireError {
    /// Classification.
    pub kind: ErrorKind,
    /// Human-readable description. Never carries internal details beyond the
    /// failing id.
    pub message: String,
}

impl WireError {
    /// Create a wire error.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
