//! Orchestrator lifecycle events.
//!
//! For one request the orchestrator emits, in order:
//!
//! ```text
//! start ──► chunk* ──► done ──► readyForDecision
//!                 └──► error
//! ```
//!
//! `cancel`, `accept`, `reject` and `reset` come from explicit calls and can
//! arrive at any time.

use ghostwrite_types::{AiError, NormalizedResponse, RequestMode, SelectionPayload};

use crate::event_bus::EventName;

pub const START: &str = "start";
pub const CHUNK: &str = "chunk";
pub const DONE: &str = "done";
pub const READY_FOR_DECISION: &str = "readyForDecision";
pub const ACCEPT: &str = "accept";
pub const REJECT: &str = "reject";
pub const ERROR: &str = "error";
pub const CANCEL: &str = "cancel";
pub const RESET: &str = "reset";

/// Every event name the orchestrator can emit.
pub const EVENT_NAMES: [&str; 9] = [
    START,
    CHUNK,
    DONE,
    READY_FOR_DECISION,
    ACCEPT,
    REJECT,
    ERROR,
    CANCEL,
    RESET,
];

/// An orchestrator event with its payload.
#[derive(Clone, Debug, PartialEq)]
pub enum PreviewEvent {
    /// A request began.
    Start {
        payload: SelectionPayload,
        mode: RequestMode,
    },
    /// A streamed delta arrived; carries the full merged preview.
    Chunk(NormalizedResponse),
    /// The adapter finished; carries the final preview.
    Done(NormalizedResponse),
    /// The final preview awaits accept/reject.
    ReadyForDecision(NormalizedResponse),
    /// The preview was accepted.
    Accept(NormalizedResponse),
    /// The preview was rejected.
    Reject(NormalizedResponse),
    /// The request failed.
    Error(AiError),
    /// The request was cancelled (or cancel was called with nothing running).
    Cancel { reason: Option<String> },
    /// Back to idle.
    Reset,
}

impl PreviewEvent {
    /// The preview carried by this event, if any.
    pub fn preview(&self) -> Option<&NormalizedResponse> {
        match self {
            Self::Chunk(p)
            | Self::Done(p)
            | Self::ReadyForDecision(p)
            | Self::Accept(p)
            | Self::Reject(p) => Some(p),
            _ => None,
        }
    }
}

impl EventName for PreviewEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => START,
            Self::Chunk(_) => CHUNK,
            Self::Done(_) => DONE,
            Self::ReadyForDecision(_) => READY_FOR_DECISION,
            Self::Accept(_) => ACCEPT,
            Self::Reject(_) => REJECT,
            Self::Error(_) => ERROR,
            Self::Cancel { .. } => CANCEL,
            Self::Reset => RESET,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_cover_all_variants() {
        let events = [
            PreviewEvent::Start {
                payload: SelectionPayload::new("x"),
                mode: RequestMode::Stream,
            },
            PreviewEvent::Chunk(NormalizedResponse::delta("a")),
            PreviewEvent::Done(NormalizedResponse::default()),
            PreviewEvent::ReadyForDecision(NormalizedResponse::default()),
            PreviewEvent::Accept(NormalizedResponse::default()),
            PreviewEvent::Reject(NormalizedResponse::default()),
            PreviewEvent::Error(AiError::new("boom")),
            PreviewEvent::Cancel { reason: None },
            PreviewEvent::Reset,
        ];
        let names: Vec<_> = events.iter().map(EventName::name).collect();
        assert_eq!(names, EVENT_NAMES);
    }

    #[test]
    fn test_preview_accessor() {
        assert!(PreviewEvent::Reset.preview().is_none());
        let ev = PreviewEvent::Chunk(NormalizedResponse::delta("Hel"));
        assert_eq!(ev.preview().and_then(|p| p.delta.as_deref()), Some("Hel"));
    }
}
