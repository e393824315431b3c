//! Pure reducer from orchestrator events to [`PreviewState`].
//!
//! ```text
//!          start            done / readyForDecision
//!  idle ───────► processing ────────────────────────► preview
//!                 ▲    │ chunk                          │
//!                 └────┘                       accept / │ reject
//!                                                      ▼
//!                                         accepted / rejected
//!
//!  error, cancel: from anywhere, keep selection and mode
//!  reset: back to idle
//! ```

use ghostwrite_types::{PreviewState, PreviewStatus};

use crate::events::PreviewEvent;

/// How the reducer treats decisions that arrive after the lifecycle ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransitionPolicy {
    /// Every event applies from every state.
    #[default]
    Permissive,
    /// `accept` and `reject` are ignored once the state is terminal
    /// (accepted, rejected, error, cancelled).
    Strict,
}

/// Apply `event` to `state` under the permissive policy.
pub fn reduce(state: &PreviewState, event: &PreviewEvent) -> PreviewState {
    match event {
        PreviewEvent::Start { payload, mode } => PreviewState {
            status: PreviewStatus::Processing,
            preview: None,
            error: None,
            selection: Some(payload.clone()),
            mode: Some(*mode),
        },
        PreviewEvent::Chunk(preview) => PreviewState {
            preview: Some(preview.clone()),
            ..state.with_status(PreviewStatus::Processing)
        },
        PreviewEvent::Done(preview) | PreviewEvent::ReadyForDecision(preview) => PreviewState {
            preview: Some(preview.clone()),
            ..state.with_status(PreviewStatus::Preview)
        },
        PreviewEvent::Accept(preview) => PreviewState {
            preview: Some(preview.clone()),
            ..state.with_status(PreviewStatus::Accepted)
        },
        PreviewEvent::Reject(preview) => PreviewState {
            preview: Some(preview.clone()),
            ..state.with_status(PreviewStatus::Rejected)
        },
        PreviewEvent::Error(error) => PreviewState {
            error: Some(error.clone()),
            ..state.with_status(PreviewStatus::Error)
        },
        PreviewEvent::Cancel { .. } => state.with_status(PreviewStatus::Cancelled),
        PreviewEvent::Reset => PreviewState::idle(),
    }
}

/// Apply `event` to `state` under `policy`.
pub fn reduce_with(
    policy: TransitionPolicy,
    state: &PreviewState,
    event: &PreviewEvent,
) -> PreviewState {
    let is_decision = matches!(event, PreviewEvent::Accept(_) | PreviewEvent::Reject(_));
    if policy == TransitionPolicy::Strict && is_decision && state.status.is_terminal() {
        tracing::debug!(status = %state.status, "ignoring decision on finished preview");
        return state.clone();
    }
    reduce(state, event)
}
