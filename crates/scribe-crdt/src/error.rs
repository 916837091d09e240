//! Error types for the document engine.

use thiserror::Error;

use crate::clock::Ticket;

/// Errors surfaced by replica operations.
///
/// Validation errors (wrong type, bad operand, unknown key) leave the replica
/// unchanged. Consistency errors indicate a violated merge invariant; callers
/// must fail the surrounding request without persisting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrdtError {
    #[error("element not found: {0}")]
    ElementNotFound(Ticket),

    #[error("run not found: {0}")]
    RunNotFound(Ticket),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("unsupported counter operand: {0}")]
    UnsupportedOperand(&'static str),

    #[error("run {0} has a dangling insertion link")]
    DanglingInsertionLink(Ticket),

    #[error("snapshot decode failed: {0}")]
    SnapshotDecode(String),

    #[error("snapshot encode failed: {0}")]
    SnapshotEncode(String),
}

impl CrdtError {
    /// Static code for metrics labeling.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ElementNotFound(_) => "element_not_found",
            Self::RunNotFound(_) => "run_not_found",
            Self::KeyNotFound(_) => "key_not_found",
            Self::IndexOutOfBounds { .. } => "index_out_of_bounds",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::UnsupportedOperand(_) => "unsupported_operand",
            Self::DanglingInsertionLink(_) => "dangling_insertion_link",
            Self::SnapshotDecode(_) => "snapshot_decode",
            Self::SnapshotEncode(_) => "snapshot_encode",
        }
    }

    /// Whether this error indicates a violated merge invariant rather than a
    /// rejected input.
    #[must_use]
    pub fn is_consistency(&self) -> bool {
        matches!(
            self,
            Self::DanglingInsertionLink(_) | Self::SnapshotDecode(_) | Self::SnapshotEncode(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            CrdtError::KeyNotFound("k".into()).error_code(),
            "key_not_found"
        );
        assert_eq!(
            CrdtError::UnsupportedOperand("u64").error_code(),
            "unsupported_operand"
        );
    }

    #[test]
    fn test_consistency_classification() {
        assert!(CrdtError::DanglingInsertionLink(Ticket::initial()).is_consistency());
        assert!(!CrdtError::KeyNotFound("k".into()).is_consistency());
    }
}
