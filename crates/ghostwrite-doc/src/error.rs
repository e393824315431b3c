//! Error types for the document engine and the decoration bridge.

use thiserror::Error;

/// Errors from reading or editing a [`TextDocument`](crate::TextDocument).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// A position lies past the end of the document.
    #[error("position {pos} is out of bounds (document length {len})")]
    OutOfBounds { pos: usize, len: usize },

    /// A range ends before it starts.
    #[error("invalid range {from}..{to}")]
    InvalidRange { from: usize, to: usize },
}

/// Errors from resolving a selection against the document.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The selection carries no range.
    #[error("selection has no range")]
    MissingRange,

    /// The selection range is not `{ "from": n, "to": m }`.
    #[error("selection range is malformed: {0}")]
    MalformedRange(String),

    /// The document rejected an edit or read.
    #[error(transparent)]
    Document(#[from] DocumentError),
}

pub type DocumentResult<T> = Result<T, DocumentError>;
