//! Document bridge contract.
//!
//! A bridge is the host's side of the preview: it draws the suggestion over
//! the document, commits it on accept and cleans up afterwards. Only
//! [`DocumentBridge::render_preview`] and [`DocumentBridge::apply_preview`]
//! are required; every other hook defaults to a no-op.
//!
//! Bridges are called from whatever task emitted the triggering event and
//! must not block on the orchestrator.

use ghostwrite_types::{NormalizedResponse, SelectionPayload};

/// Reverts one applied preview. Called at most once.
pub type UndoHandle = Box<dyn FnOnce() + Send>;

/// Host implementation of preview rendering and commit.
pub trait DocumentBridge: Send + Sync {
    /// Show `preview` over the selection. Called repeatedly while streaming.
    fn render_preview(&self, preview: &NormalizedResponse, selection: Option<&SelectionPayload>);

    /// Commit `preview` into the document. May return a handle that undoes
    /// the commit.
    fn apply_preview(
        &self,
        preview: &NormalizedResponse,
        selection: Option<&SelectionPayload>,
    ) -> Option<UndoHandle>;

    /// Remove any preview overlay.
    fn clear_preview(&self, _selection: Option<&SelectionPayload>) {}

    /// Show a neutral "working" indicator.
    fn show_processing(&self, _selection: Option<&SelectionPayload>) {}

    /// Report a failed request.
    fn on_error(&self, _message: &str, _selection: Option<&SelectionPayload>) {}

    /// Report a cancelled request.
    fn on_cancel(&self, _selection: Option<&SelectionPayload>) {}
}
