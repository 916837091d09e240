//! Unified error handling for the scribed agent.
//!
//! One error hierarchy for the request path, with automatic conversions from
//! the store and engine layers, wire-kind mapping, and metric labeling.

use scribe_crdt::CrdtError;
use scribe_proto::{ErrorKind, WireError};
use thiserror::Error;

use crate::db::DbError;

/// Errors that can occur while serving a request.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("client not found: {0}")]
    ClientNotFound(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("client not activated: {0}")]
    ClientNotActivated(String),

    #[error("document not attached: {0}")]
    DocumentNotAttached(String),

    #[error("lock contention on {0}")]
    LockContention(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("store error: {0}")]
    Db(#[from] DbError),

    #[error("engine error: {0}")]
    Crdt(#[from] CrdtError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Static error code for metrics labeling.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::ClientNotFound(_) => "client_not_found",
            Self::DocumentNotFound(_) => "document_not_found",
            Self::ClientNotActivated(_) => "client_not_activated",
            Self::DocumentNotAttached(_) => "document_not_attached",
            Self::LockContention(_) => "lock_contention",
            Self::Cancelled => "cancelled",
            Self::Db(_) => "store_error",
            Self::Crdt(e) => e.error_code(),
            Self::Internal(_) => "internal_error",
        }
    }

    /// The error kind exposed over the wire.
    #[must_use]
    pub fn wire_kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::ClientNotFound(_) | Self::DocumentNotFound(_) => ErrorKind::NotFound,
            Self::ClientNotActivated(_) | Self::DocumentNotAttached(_) => {
                ErrorKind::FailedPrecondition
            }
            // A malformed pack surfaces as a validation error; violated merge
            // invariants and everything below the engine are internal.
            Self::Crdt(e) if !e.is_consistency() => ErrorKind::InvalidArgument,
            Self::LockContention(_)
            | Self::Cancelled
            | Self::Db(_)
            | Self::Crdt(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Project into the shape sent to the remote peer.
    #[must_use]
    pub fn to_wire(&self) -> WireError {
        WireError::new(self.wire_kind(), self.to_string())
    }
}

/// Result type for request handlers.
pub type ServiceResult<T> = Result<T, ServiceError>;
