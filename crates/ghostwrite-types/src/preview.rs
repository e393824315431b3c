//! Preview lifecycle state.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::response::{AiError, NormalizedResponse};
use crate::selection::{RequestMode, SelectionPayload};

/// Lifecycle status of a preview.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum PreviewStatus {
    /// Nothing requested yet, or reset.
    #[default]
    Idle,
    /// Request in flight (possibly with partial content).
    Processing,
    /// Complete preview waiting for a decision.
    Preview,
    /// Preview accepted and applied.
    Accepted,
    /// Preview rejected.
    Rejected,
    /// Request failed.
    Error,
    /// Request cancelled.
    Cancelled,
}

impl PreviewStatus {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PreviewStatus::Idle => "idle",
            PreviewStatus::Processing => "processing",
            PreviewStatus::Preview => "preview",
            PreviewStatus::Accepted => "accepted",
            PreviewStatus::Rejected => "rejected",
            PreviewStatus::Error => "error",
            PreviewStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states end a request; only a new `start` or `reset` leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PreviewStatus::Accepted
                | PreviewStatus::Rejected
                | PreviewStatus::Error
                | PreviewStatus::Cancelled
        )
    }
}

impl std::fmt::Display for PreviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of the preview lifecycle.
///
/// `selection` and `mode` are recorded on `start` and survive every later
/// transition until the next `start` or `reset`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewState {
    pub status: PreviewStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<NormalizedResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AiError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<RequestMode>,
}

impl PreviewState {
    /// The initial idle state.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Copy of this state with a new status, keeping everything else.
    pub fn with_status(&self, status: PreviewStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    /// Error message, if in the error state.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(PreviewStatus::Processing.to_string(), "processing");
        assert_eq!(PreviewStatus::from_str("CANCELLED"), Some(PreviewStatus::Cancelled));
        assert_eq!(PreviewStatus::from_str("nope"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!PreviewStatus::Idle.is_terminal());
        assert!(!PreviewStatus::Processing.is_terminal());
        assert!(!PreviewStatus::Preview.is_terminal());
        assert!(PreviewStatus::Accepted.is_terminal());
        assert!(PreviewStatus::Rejected.is_terminal());
        assert!(PreviewStatus::Error.is_terminal());
        assert!(PreviewStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_with_status_keeps_selection() {
        let state = PreviewState {
            status: PreviewStatus::Processing,
            selection: Some(SelectionPayload::new("abc")),
            mode: Some(RequestMode::Batch),
            ..PreviewState::idle()
        };
        let next = state.with_status(PreviewStatus::Cancelled);
        assert_eq!(next.status, PreviewStatus::Cancelled);
        assert_eq!(next.selection, state.selection);
        assert_eq!(next.mode, Some(RequestMode::Batch));
    }
}
