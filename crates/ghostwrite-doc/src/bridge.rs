//! Decoration-based [`DocumentBridge`].
//!
//! The preview is one overlay region per bridge instance. While a suggestion
//! is pending, the overlay's text replaces the selection in the document
//! through history-excluded edits tagged with the bridge's own [`Origin`],
//! and a [`DecorationKind::Preview`] decoration marks it. The original text
//! is kept so reject and cancel can put it back verbatim.
//!
//! ```text
//! render  ─► overlay = [from, from+len(preview))   original saved once
//! clear   ─► original restored, overlay dropped
//! apply   ─► original restored, preview committed with history, undo handle
//! ```
//!
//! Any edit not tagged with this bridge's id that touches the current overlay
//! fires the conflict handler once per touching step. The overlay (and the
//! last applied span, for undo) is mapped through every edit, the bridge's own
//! included.

use std::sync::{Arc, Weak};
use std::time::Duration;

use ghostwrite_core::bridge::{DocumentBridge, UndoHandle};
use ghostwrite_types::{NormalizedResponse, SelectionPayload};
use parking_lot::Mutex;
use serde_json::Value;

use crate::decoration::{Decoration, DecorationKind};
use crate::document::{DocumentHost, ObserverId};
use crate::error::BridgeError;
use crate::mapping::Span;
use crate::transaction::{BridgeId, ChangeSet, Origin, Step, Transaction};

/// Default time an error decoration stays visible.
pub const DEFAULT_ERROR_DISPLAY: Duration = Duration::from_millis(2500);

/// Bridge tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// How long error decorations stay before clearing themselves.
    pub error_display: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            error_display: DEFAULT_ERROR_DISPLAY,
        }
    }
}

/// An external edit that touched the pending preview.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictEvent {
    pub bridge: BridgeId,
    /// The overlay before the step was applied.
    pub overlay: Span,
    pub step: Step,
    pub origin: Origin,
    /// Document version after the conflicting transaction.
    pub version: u64,
}

type ConflictHandler = Arc<dyn Fn(&ConflictEvent) + Send + Sync>;

/// Read a selection's `range` as `{ "from": n, "to": m }`.
pub fn selection_span(selection: Option<&SelectionPayload>) -> Result<Span, BridgeError> {
    let range = selection
        .and_then(|s| s.range.as_ref())
        .ok_or(BridgeError::MissingRange)?;
    let bound = |key: &str| {
        range
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| BridgeError::MalformedRange(format!("missing or invalid `{key}` in {range}")))
    };
    let (from, to) = (bound("from")?, bound("to")?);
    if from > to {
        return Err(BridgeError::MalformedRange(format!("`from` {from} is after `to` {to}")));
    }
    Ok(Span::new(from, to))
}

struct Overlay {
    span: Span,
    original: String,
}

#[derive(Default)]
struct BridgeState {
    overlay: Option<Overlay>,
    /// Last committed preview: apply counter and its current span.
    applied: Option<(u64, Span)>,
    applies: u64,
    /// Bumped on every error display so stale timers don't clear newer ones.
    error_epoch: u64,
}

struct BridgeInner {
    id: BridgeId,
    host: Arc<dyn DocumentHost>,
    config: BridgeConfig,
    state: Mutex<BridgeState>,
    on_conflict: Mutex<Option<ConflictHandler>>,
}

impl BridgeInner {
    fn internal(&self) -> Transaction {
        Transaction::new(Origin::Bridge(self.id)).with_history(false)
    }

    fn committed(&self) -> Transaction {
        Transaction::new(Origin::Bridge(self.id))
    }

    fn observe_change(&self, change: &ChangeSet) {
        // Spans follow every edit, own ones included; only foreign edits conflict.
        let own = change.origin.is_bridge(self.id);
        let mut conflicts = Vec::new();
        {
            let mut state = self.state.lock();
            for step in &change.steps {
                if let Some(overlay) = state.overlay.as_mut() {
                    if !own && overlay.span.touches(step) {
                        conflicts.push(ConflictEvent {
                            bridge: self.id,
                            overlay: overlay.span,
                            step: step.clone(),
                            origin: change.origin,
                            version: change.version,
                        });
                    }
                    overlay.span = overlay.span.map(step);
                }
                if let Some((_, span)) = state.applied.as_mut() {
                    *span = span.map(step);
                }
            }
        }

        if conflicts.is_empty() {
            return;
        }
        let handler = self.on_conflict.lock().clone();
        for conflict in &conflicts {
            tracing::warn!(
                bridge = %self.id,
                overlay = %conflict.overlay,
                at = conflict.step.from,
                version = conflict.version,
                "external edit touched pending preview"
            );
            if let Some(handler) = &handler {
                handler(conflict);
            }
        }
    }

    /// Replace the overlay (or the selection, first time) with `content`.
    fn render(&self, content: &str, selection: Option<&SelectionPayload>) -> Result<(), BridgeError> {
        let existing = self.state.lock().overlay.as_ref().map(|o| o.span);
        let (span, original) = match existing {
            Some(span) => (span, None),
            None => {
                let span = selection_span(selection)?;
                (span, Some(self.host.text_between(span.from, span.to)?))
            }
        };

        self.host
            .dispatch(self.internal().replace(span.from, span.to, content))?;

        let rendered = Span::at(span.from, content.chars().count());
        {
            let mut state = self.state.lock();
            if let Some(overlay) = state.overlay.as_mut() {
                overlay.span = rendered;
            } else if let Some(original) = original {
                state.overlay = Some(Overlay {
                    span: rendered,
                    original,
                });
            }
        }
        self.host.set_decorations(
            self.id,
            vec![Decoration::new(rendered, DecorationKind::Preview)],
        );
        Ok(())
    }

    /// Put the original text back over the overlay. Returns the restored span.
    fn restore(&self) -> Result<Option<Span>, BridgeError> {
        let Some(overlay) = self.state.lock().overlay.take() else {
            return Ok(None);
        };
        self.host.dispatch(
            self.internal()
                .replace(overlay.span.from, overlay.span.to, overlay.original.as_str()),
        )?;
        Ok(Some(Span::at(overlay.span.from, overlay.original.chars().count())))
    }

    fn apply(self: &Arc<Self>, content: &str, selection: Option<&SelectionPayload>) -> Result<UndoHandle, BridgeError> {
        let target = match self.restore()? {
            Some(span) => span,
            None => selection_span(selection)?,
        };
        let original = self.host.text_between(target.from, target.to)?;

        self.host
            .dispatch(self.committed().replace(target.from, target.to, content))?;
        self.host.set_decorations(self.id, Vec::new());

        let applied = Span::at(target.from, content.chars().count());
        let ticket = {
            let mut state = self.state.lock();
            state.applies += 1;
            state.applied = Some((state.applies, applied));
            state.applies
        };
        tracing::debug!(bridge = %self.id, span = %applied, "preview applied");

        let weak = Arc::downgrade(self);
        Ok(Box::new(move || undo_apply(&weak, ticket, &original)))
    }

    fn show_error(self: &Arc<Self>, message: &str, selection: Option<&SelectionPayload>) {
        let span = match selection_span(selection) {
            Ok(span) => span,
            Err(err) => {
                tracing::debug!(bridge = %self.id, error = %err, "no range for error decoration");
                return;
            }
        };
        let epoch = {
            let mut state = self.state.lock();
            state.error_epoch += 1;
            state.error_epoch
        };
        self.host.set_decorations(
            self.id,
            vec![Decoration::new(span, DecorationKind::Error).with_label(message)],
        );

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(bridge = %self.id, "no runtime, error decoration stays until next clear");
            return;
        };
        let weak = Arc::downgrade(self);
        let delay = self.config.error_display;
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.clear_error(epoch);
            }
        });
    }

    fn clear_error(&self, epoch: u64) {
        if self.state.lock().error_epoch != epoch {
            return;
        }
        let remaining: Vec<Decoration> = self
            .host
            .decorations(self.id)
            .into_iter()
            .filter(|d| d.kind != DecorationKind::Error)
            .collect();
        self.host.set_decorations(self.id, remaining);
    }
}

fn undo_apply(weak: &Weak<BridgeInner>, ticket: u64, original: &str) {
    let Some(inner) = weak.upgrade() else {
        tracing::warn!("undo after bridge was dropped, nothing to do");
        return;
    };
    let span = {
        let mut state = inner.state.lock();
        let current = state.applied;
        match current {
            Some((applied, span)) if applied == ticket => {
                state.applied = None;
                span
            }
            _ => {
                tracing::warn!(bridge = %inner.id, "undo for a superseded apply ignored");
                return;
            }
        }
    };
    match inner
        .host
        .dispatch(inner.committed().replace(span.from, span.to, original))
    {
        Ok(_) => tracing::debug!(bridge = %inner.id, span = %span, "applied preview undone"),
        Err(err) => tracing::warn!(bridge = %inner.id, error = %err, "undo failed"),
    }
}

/// Reference [`DocumentBridge`] drawing previews as decorated overlays.
pub struct DecorationBridge {
    inner: Arc<BridgeInner>,
    observer: ObserverId,
}

impl DecorationBridge {
    pub fn new(host: Arc<dyn DocumentHost>) -> Self {
        Self::with_config(host, BridgeConfig::default())
    }

    pub fn with_config(host: Arc<dyn DocumentHost>, config: BridgeConfig) -> Self {
        let inner = Arc::new(BridgeInner {
            id: BridgeId::new(),
            host,
            config,
            state: Mutex::new(BridgeState::default()),
            on_conflict: Mutex::new(None),
        });
        let observer = {
            let weak = Arc::downgrade(&inner);
            inner.host.observe(Arc::new(move |change: &ChangeSet| {
                if let Some(inner) = weak.upgrade() {
                    inner.observe_change(change);
                }
            }))
        };
        tracing::debug!(bridge = %inner.id, "decoration bridge attached");
        Self { inner, observer }
    }

    pub fn id(&self) -> BridgeId {
        self.inner.id
    }

    /// Set the handler called for each external edit touching the preview.
    ///
    /// The handler runs after the document and bridge locks are released,
    /// so it may cancel the preview or edit the document.
    pub fn on_conflict(&self, handler: impl Fn(&ConflictEvent) + Send + Sync + 'static) {
        *self.inner.on_conflict.lock() = Some(Arc::new(handler));
    }

    /// The span currently covered by the pending preview.
    pub fn overlay(&self) -> Option<Span> {
        self.inner.state.lock().overlay.as_ref().map(|o| o.span)
    }

    /// The span of the last applied preview, while it can still be undone.
    pub fn applied(&self) -> Option<Span> {
        self.inner.state.lock().applied.map(|(_, span)| span)
    }

    fn clear_overlay(&self) {
        match self.inner.restore() {
            Ok(Some(span)) => tracing::debug!(bridge = %self.inner.id, span = %span, "preview cleared"),
            Ok(None) => {}
            Err(err) => tracing::warn!(bridge = %self.inner.id, error = %err, "failed to restore original text"),
        }
    }
}

impl DocumentBridge for DecorationBridge {
    fn render_preview(&self, preview: &NormalizedResponse, selection: Option<&SelectionPayload>) {
        let content = preview.content().unwrap_or_default();
        if let Err(err) = self.inner.render(content, selection) {
            tracing::warn!(bridge = %self.inner.id, error = %err, "failed to render preview");
        }
    }

    fn apply_preview(
        &self,
        preview: &NormalizedResponse,
        selection: Option<&SelectionPayload>,
    ) -> Option<UndoHandle> {
        let Some(content) = preview.content() else {
            tracing::warn!(bridge = %self.inner.id, "accepted preview has no content, nothing to apply");
            return None;
        };
        match self.inner.apply(content, selection) {
            Ok(undo) => Some(undo),
            Err(err) => {
                tracing::warn!(bridge = %self.inner.id, error = %err, "failed to apply preview");
                None
            }
        }
    }

    fn clear_preview(&self, _selection: Option<&SelectionPayload>) {
        self.clear_overlay();
        self.inner.host.set_decorations(self.inner.id, Vec::new());
    }

    fn show_processing(&self, selection: Option<&SelectionPayload>) {
        let span = self.overlay().map_or_else(|| selection_span(selection), Ok);
        match span {
            Ok(span) => self.inner.host.set_decorations(
                self.inner.id,
                vec![Decoration::new(span, DecorationKind::Processing)],
            ),
            Err(err) => tracing::debug!(bridge = %self.inner.id, error = %err, "no range for processing decoration"),
        }
    }

    fn on_error(&self, message: &str, selection: Option<&SelectionPayload>) {
        self.inner.show_error(message, selection);
    }

    fn on_cancel(&self, _selection: Option<&SelectionPayload>) {
        self.clear_overlay();
        self.inner.host.set_decorations(self.inner.id, Vec::new());
        tracing::debug!(bridge = %self.inner.id, "preview cancelled");
    }
}

impl Drop for DecorationBridge {
    fn drop(&mut self) {
        self.inner.host.unobserve(self.observer);
        self.inner.host.set_decorations(self.inner.id, Vec::new());
    }
}

impl std::fmt::Debug for DecorationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecorationBridge")
            .field("id", &self.inner.id)
            .field("overlay", &self.overlay())
            .field("applied", &self.applied())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TextDocument;
    use serde_json::json;

    const TEXT: &str = "The quick brown fox jumps over the lazy dog";

    fn setup() -> (Arc<TextDocument>, DecorationBridge) {
        let doc = Arc::new(TextDocument::new(TEXT));
        let bridge = DecorationBridge::new(doc.clone());
        (doc, bridge)
    }

    fn selection(from: usize, to: usize) -> SelectionPayload {
        let text: String = TEXT.chars().skip(from).take(to - from).collect();
        SelectionPayload::new(text).with_range(json!({"from": from, "to": to}))
    }

    #[test]
    fn test_selection_span_parsing() {
        assert_eq!(selection_span(Some(&selection(4, 9))).unwrap(), Span::new(4, 9));
        assert!(matches!(selection_span(None), Err(BridgeError::MissingRange)));
        let bad = SelectionPayload::new("x").with_range(json!({"from": 5}));
        assert!(matches!(selection_span(Some(&bad)), Err(BridgeError::MalformedRange(_))));
        let reversed = SelectionPayload::new("x").with_range(json!({"from": 5, "to": 2}));
        assert!(matches!(selection_span(Some(&reversed)), Err(BridgeError::MalformedRange(_))));
    }

    #[test]
    fn test_render_then_clear_restores_original() {
        let (doc, bridge) = setup();
        let sel = selection(4, 9);

        bridge.render_preview(&NormalizedResponse::delta("sl"), Some(&sel));
        bridge.render_preview(&NormalizedResponse::delta("slow"), Some(&sel));
        assert_eq!(doc.text(), "The slow brown fox jumps over the lazy dog");
        assert_eq!(bridge.overlay(), Some(Span::new(4, 8)));
        assert_eq!(doc.decorations(bridge.id())[0].kind, DecorationKind::Preview);

        bridge.clear_preview(Some(&sel));
        assert_eq!(doc.text(), TEXT);
        assert_eq!(bridge.overlay(), None);
        assert!(doc.decorations(bridge.id()).is_empty());
        assert_eq!(doc.history_len(), 0);
    }

    #[test]
    fn test_apply_commits_once_and_undo_restores() {
        let (doc, bridge) = setup();
        let sel = selection(4, 9);

        bridge.render_preview(&NormalizedResponse::text("sluggish"), Some(&sel));
        let undo = bridge
            .apply_preview(&NormalizedResponse::text("sluggish"), Some(&sel))
            .unwrap();
        bridge.clear_preview(Some(&sel));

        assert_eq!(doc.text(), "The sluggish brown fox jumps over the lazy dog");
        let history = doc.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].steps, vec![Step::replace(4, 9, "sluggish")]);
        assert_eq!(bridge.applied(), Some(Span::new(4, 12)));

        doc.dispatch(Transaction::external().insert(0, ">> ")).unwrap();
        assert_eq!(bridge.applied(), Some(Span::new(7, 15)));

        undo();
        assert_eq!(doc.text(), ">> The quick brown fox jumps over the lazy dog");
        assert_eq!(bridge.applied(), None);
    }

    #[test]
    fn test_undo_follows_later_renders() {
        let (doc, bridge) = setup();
        let undo = bridge
            .apply_preview(&NormalizedResponse::text("sluggish"), Some(&selection(4, 9)))
            .unwrap();
        assert_eq!(bridge.applied(), Some(Span::new(4, 12)));

        // A new preview before the applied text shifts it.
        bridge.render_preview(&NormalizedResponse::text("A really very"), Some(&selection(0, 3)));
        assert_eq!(doc.text(), "A really very sluggish brown fox jumps over the lazy dog");
        assert_eq!(bridge.applied(), Some(Span::new(14, 22)));

        undo();
        assert_eq!(doc.text(), "A really very quick brown fox jumps over the lazy dog");
        assert_eq!(bridge.overlay(), Some(Span::new(0, 13)));

        bridge.clear_preview(None);
        assert_eq!(doc.text(), TEXT);
    }

    #[test]
    fn test_undo_shifts_pending_overlay() {
        let (doc, bridge) = setup();
        let undo = bridge
            .apply_preview(&NormalizedResponse::text("sluggish"), Some(&selection(4, 9)))
            .unwrap();
        // "fox" now sits at 19..22.
        let fox = SelectionPayload::new("fox").with_range(json!({"from": 19, "to": 22}));
        bridge.render_preview(&NormalizedResponse::text("cat"), Some(&fox));

        undo();
        assert_eq!(doc.text(), "The quick brown cat jumps over the lazy dog");
        assert_eq!(bridge.overlay(), Some(Span::new(16, 19)));

        bridge.clear_preview(None);
        assert_eq!(doc.text(), TEXT);
    }

    #[test]
    fn test_apply_empty_preview_is_skipped() {
        let (doc, bridge) = setup();
        let undo = bridge.apply_preview(&NormalizedResponse::default(), Some(&selection(4, 9)));
        assert!(undo.is_none());
        assert_eq!(doc.text(), TEXT);
        assert_eq!(doc.history_len(), 0);
    }

    #[test]
    fn test_apply_without_render_uses_selection() {
        let (doc, bridge) = setup();
        let undo = bridge.apply_preview(&NormalizedResponse::text("red"), Some(&selection(10, 15)));
        assert!(undo.is_some());
        assert_eq!(doc.text(), "The quick red fox jumps over the lazy dog");
    }

    #[test]
    fn test_stale_undo_is_ignored() {
        let (doc, bridge) = setup();
        let first = bridge
            .apply_preview(&NormalizedResponse::text("slow"), Some(&selection(4, 9)))
            .unwrap();
        // Offsets refer to the text after the first apply.
        let fox = SelectionPayload::new("fox").with_range(json!({"from": 15, "to": 18}));
        let second = bridge
            .apply_preview(&NormalizedResponse::text("cat"), Some(&fox))
            .unwrap();

        first();
        assert_eq!(doc.text(), "The slow brown cat jumps over the lazy dog");
        second();
        assert_eq!(doc.text(), "The slow brown fox jumps over the lazy dog");
    }

    #[test]
    fn test_external_edit_inside_overlay_conflicts_once() {
        let doc = Arc::new(TextDocument::new("0123456789abcdefghijklmnopqrstuvwxyz"));
        let bridge = DecorationBridge::new(doc.clone());
        let conflicts = Arc::new(Mutex::new(Vec::new()));
        {
            let conflicts = Arc::clone(&conflicts);
            bridge.on_conflict(move |event| conflicts.lock().push(event.clone()));
        }
        let sel = SelectionPayload::new("abcdefghij").with_range(json!({"from": 10, "to": 20}));
        bridge.render_preview(&NormalizedResponse::text("ABCDEFGHIJ"), Some(&sel));
        assert_eq!(bridge.overlay(), Some(Span::new(10, 20)));

        doc.dispatch(Transaction::external().insert(15, "!")).unwrap();

        let conflicts = conflicts.lock();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].overlay, Span::new(10, 20));
        assert_eq!(conflicts[0].step, Step::insert(15, "!"));
        assert_eq!(bridge.overlay(), Some(Span::new(10, 21)));
    }

    #[test]
    fn test_conflicts_counted_per_step_and_own_edits_ignored() {
        let (doc, bridge) = setup();
        let count = Arc::new(Mutex::new(0));
        {
            let count = Arc::clone(&count);
            bridge.on_conflict(move |_| *count.lock() += 1);
        }
        bridge.render_preview(&NormalizedResponse::text("slow"), Some(&selection(4, 9)));
        bridge.render_preview(&NormalizedResponse::text("sleepy"), Some(&selection(4, 9)));
        assert_eq!(*count.lock(), 0);

        // Far away: no conflict, but the overlay shifts.
        doc.dispatch(Transaction::external().insert(0, "> ")).unwrap();
        assert_eq!(*count.lock(), 0);
        assert_eq!(bridge.overlay(), Some(Span::new(6, 12)));

        // Two touching steps in one transaction, boundary contact included.
        doc.dispatch(Transaction::external().insert(12, "!").delete(5, 6))
            .unwrap();
        assert_eq!(*count.lock(), 2);

        // Another bridge's edits are external to this one.
        let other = DecorationBridge::new(doc.clone());
        let at = bridge.overlay().unwrap().from;
        other.apply_preview(
            &NormalizedResponse::text("X"),
            Some(&SelectionPayload::new("").with_range(json!({"from": at, "to": at + 1}))),
        );
        assert_eq!(*count.lock(), 3);
    }

    #[test]
    fn test_show_processing_only_decorates() {
        let (doc, bridge) = setup();
        bridge.show_processing(Some(&selection(4, 9)));
        assert_eq!(doc.text(), TEXT);
        let decorations = doc.decorations(bridge.id());
        assert_eq!(decorations.len(), 1);
        assert_eq!(decorations[0].kind, DecorationKind::Processing);
        assert_eq!(decorations[0].span, Span::new(4, 9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_decoration_clears_itself() {
        let (doc, bridge) = setup();
        bridge.on_error("rate limited", Some(&selection(4, 9)));

        let decorations = doc.decorations(bridge.id());
        assert_eq!(decorations[0].kind, DecorationKind::Error);
        assert_eq!(decorations[0].label.as_deref(), Some("rate limited"));

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(doc.decorations(bridge.id()).len(), 1);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(doc.decorations(bridge.id()).is_empty());
    }

    #[test]
    fn test_drop_detaches_and_clears() {
        let (doc, bridge) = setup();
        bridge.show_processing(Some(&selection(4, 9)));
        drop(bridge);
        assert!(doc.all_decorations().is_empty());
        doc.dispatch(Transaction::external().insert(0, "x")).unwrap();
    }
}
