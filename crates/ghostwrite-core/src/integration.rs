//! Editor integration: drive a [`DocumentBridge`] from controller state.
//!
//! | Status       | Bridge calls                                              |
//! |--------------|-----------------------------------------------------------|
//! | `idle`       | none                                                      |
//! | `processing` | `render_preview` if content, else `clear` + `processing`  |
//! | `preview`    | `render_preview`                                          |
//! | `accepted`   | `apply_preview` (undo kept), then `clear_preview`         |
//! | `rejected`   | `clear_preview`, undo dropped                             |
//! | `error`      | `clear_preview`, undo dropped, `on_error`                 |
//! | `cancelled`  | `clear_preview`, undo dropped, `on_cancel`                |
//!
//! Host hooks are raw pass-throughs of orchestrator events, independent of
//! the state machine, for telemetry and logging.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ghostwrite_types::response::UNKNOWN_ERROR;
use ghostwrite_types::{
    AiError, NormalizedResponse, PreviewState, PreviewStatus, RequestMode, SelectionPayload,
};
use parking_lot::Mutex;

use crate::bridge::{DocumentBridge, UndoHandle};
use crate::controller::{PreviewController, StateSubscription};
use crate::event_bus::Listener;
use crate::events::{self, PreviewEvent};

type SelectionHook = Arc<dyn Fn(&SelectionPayload, RequestMode) + Send + Sync>;
type PreviewHook = Arc<dyn Fn(&NormalizedResponse) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&AiError) + Send + Sync>;
type CancelHook = Arc<dyn Fn(Option<&str>) + Send + Sync>;

/// Optional host callbacks mirroring orchestrator events.
#[derive(Clone, Default)]
pub struct HostHooks {
    on_selection: Option<SelectionHook>,
    on_preview_update: Option<PreviewHook>,
    on_ready_for_decision: Option<PreviewHook>,
    on_accept: Option<PreviewHook>,
    on_reject: Option<PreviewHook>,
    on_error: Option<ErrorHook>,
    on_cancel: Option<CancelHook>,
}

impl HostHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called on `start`.
    pub fn on_selection(mut self, f: impl Fn(&SelectionPayload, RequestMode) + Send + Sync + 'static) -> Self {
        self.on_selection = Some(Arc::new(f));
        self
    }

    /// Called on every `chunk` with the merged preview.
    pub fn on_preview_update(mut self, f: impl Fn(&NormalizedResponse) + Send + Sync + 'static) -> Self {
        self.on_preview_update = Some(Arc::new(f));
        self
    }

    pub fn on_ready_for_decision(mut self, f: impl Fn(&NormalizedResponse) + Send + Sync + 'static) -> Self {
        self.on_ready_for_decision = Some(Arc::new(f));
        self
    }

    pub fn on_accept(mut self, f: impl Fn(&NormalizedResponse) + Send + Sync + 'static) -> Self {
        self.on_accept = Some(Arc::new(f));
        self
    }

    pub fn on_reject(mut self, f: impl Fn(&NormalizedResponse) + Send + Sync + 'static) -> Self {
        self.on_reject = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&AiError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Called on `cancel` with the reason, if any.
    pub fn on_cancel(mut self, f: impl Fn(Option<&str>) + Send + Sync + 'static) -> Self {
        self.on_cancel = Some(Arc::new(f));
        self
    }

    fn subscribe(&self, controller: &PreviewController) -> Vec<Listener<PreviewEvent>> {
        let bus = controller.orchestrator().bus();
        let mut listeners = Vec::new();

        if let Some(hook) = self.on_selection.clone() {
            listeners.push(bus.on(events::START, move |ev: &PreviewEvent| {
                if let PreviewEvent::Start { payload, mode } = ev {
                    hook(payload, *mode);
                }
            }));
        }
        let preview_hooks = [
            (events::CHUNK, &self.on_preview_update),
            (events::READY_FOR_DECISION, &self.on_ready_for_decision),
            (events::ACCEPT, &self.on_accept),
            (events::REJECT, &self.on_reject),
        ];
        for (name, hook) in preview_hooks {
            if let Some(hook) = hook.clone() {
                listeners.push(bus.on(name, move |ev: &PreviewEvent| {
                    if let Some(preview) = ev.preview() {
                        hook(preview);
                    }
                }));
            }
        }
        if let Some(hook) = self.on_error.clone() {
            listeners.push(bus.on(events::ERROR, move |ev: &PreviewEvent| {
                if let PreviewEvent::Error(error) = ev {
                    hook(error);
                }
            }));
        }
        if let Some(hook) = self.on_cancel.clone() {
            listeners.push(bus.on(events::CANCEL, move |ev: &PreviewEvent| {
                if let PreviewEvent::Cancel { reason } = ev {
                    hook(reason.as_deref());
                }
            }));
        }
        listeners
    }
}

impl std::fmt::Debug for HostHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostHooks")
            .field("on_selection", &self.on_selection.is_some())
            .field("on_preview_update", &self.on_preview_update.is_some())
            .field("on_ready_for_decision", &self.on_ready_for_decision.is_some())
            .field("on_accept", &self.on_accept.is_some())
            .field("on_reject", &self.on_reject.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_cancel", &self.on_cancel.is_some())
            .finish()
    }
}

#[derive(Default)]
struct BindingState {
    last_selection: Option<SelectionPayload>,
    undo: Option<UndoHandle>,
}

struct BindingInner {
    bridge: Arc<dyn DocumentBridge>,
    state: Mutex<BindingState>,
    /// False until the initial snapshot from `subscribe` has been seen.
    live: AtomicBool,
}

impl BindingInner {
    fn on_state(&self, state: &PreviewState) {
        let selection = {
            let mut binding = self.state.lock();
            if let Some(selection) = &state.selection {
                binding.last_selection = Some(selection.clone());
            }
            binding.last_selection.clone()
        };

        let live = self.live.load(Ordering::Acquire);
        if !live && !matches!(state.status, PreviewStatus::Processing | PreviewStatus::Preview) {
            // Terminal outcomes that happened before binding were already handled.
            return;
        }
        let selection = selection.as_ref();
        let bridge = &self.bridge;

        match state.status {
            PreviewStatus::Idle => {}
            PreviewStatus::Processing => match state.preview.as_ref().filter(|p| p.has_content()) {
                Some(preview) => bridge.render_preview(preview, selection),
                None => {
                    bridge.clear_preview(selection);
                    bridge.show_processing(selection);
                }
            },
            PreviewStatus::Preview => {
                let preview = state.preview.clone().unwrap_or_default();
                bridge.render_preview(&preview, selection);
            }
            PreviewStatus::Accepted => {
                let preview = state.preview.clone().unwrap_or_default();
                // Whatever the bridge returns replaces the previous handle.
                let undo = bridge.apply_preview(&preview, selection);
                let replaced = std::mem::replace(&mut self.state.lock().undo, undo);
                drop(replaced);
                bridge.clear_preview(selection);
            }
            PreviewStatus::Rejected => {
                bridge.clear_preview(selection);
                self.drop_undo();
            }
            PreviewStatus::Error => {
                bridge.clear_preview(selection);
                self.drop_undo();
                bridge.on_error(state.error_message().unwrap_or(UNKNOWN_ERROR), selection);
            }
            PreviewStatus::Cancelled => {
                bridge.clear_preview(selection);
                self.drop_undo();
                bridge.on_cancel(selection);
            }
        }
    }

    fn drop_undo(&self) {
        let undo = self.state.lock().undo.take();
        drop(undo);
    }
}

/// Live connection between a controller and a document bridge.
///
/// Dropping the binding disposes it.
pub struct EditorBinding {
    inner: Arc<BindingInner>,
    subscription: Mutex<Option<StateSubscription>>,
    hooks: Mutex<Vec<Listener<PreviewEvent>>>,
}

/// Bind `controller` to `bridge`, with optional host pass-through hooks.
///
/// If the controller is mid-request or holding a preview, the bridge is
/// brought up to date immediately.
pub fn bind_editor(
    controller: &PreviewController,
    bridge: Arc<dyn DocumentBridge>,
    hooks: HostHooks,
) -> EditorBinding {
    let inner = Arc::new(BindingInner {
        bridge,
        state: Mutex::new(BindingState::default()),
        live: AtomicBool::new(false),
    });

    let subscription = {
        let inner = Arc::clone(&inner);
        controller.subscribe(move |state| {
            inner.on_state(state);
            inner.live.store(true, Ordering::Release);
        })
    };
    let hook_listeners = hooks.subscribe(controller);
    tracing::debug!(hooks = hook_listeners.len(), "editor bound to preview controller");

    EditorBinding {
        inner,
        subscription: Mutex::new(Some(subscription)),
        hooks: Mutex::new(hook_listeners),
    }
}

impl EditorBinding {
    /// Run the undo from the last applied preview. Only the first call after
    /// an apply does anything.
    pub fn undo_last_apply(&self) -> bool {
        let undo = self.inner.state.lock().undo.take();
        match undo {
            Some(undo) => {
                undo();
                true
            }
            None => false,
        }
    }

    /// Whether an applied preview can still be undone.
    pub fn has_undo(&self) -> bool {
        self.inner.state.lock().undo.is_some()
    }

    /// The most recent selection seen in controller state.
    pub fn last_selection(&self) -> Option<SelectionPayload> {
        self.inner.state.lock().last_selection.clone()
    }

    /// Stop reacting to the controller and remove all host hooks.
    ///
    /// Does not undo anything.
    pub fn dispose(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
            tracing::debug!("editor binding disposed");
        }
        let hooks: Vec<_> = self.hooks.lock().drain(..).collect();
        for hook in hooks {
            hook.unsubscribe();
        }
    }
}

impl Drop for EditorBinding {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for EditorBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorBinding")
            .field("active", &self.subscription.lock().is_some())
            .field("has_undo", &self.has_undo())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Adapters, ChunkStream, streaming_fn};
    use crate::config::AiConfig;
    use crate::orchestrator::AiOrchestrator;
    use futures::StreamExt;
    use serde_json::{Value, json};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingBridge {
        calls: Mutex<Vec<String>>,
        undos: Arc<AtomicUsize>,
    }

    impl RecordingBridge {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn push(&self, call: String) {
            self.calls.lock().push(call);
        }
    }

    fn text_of(selection: Option<&SelectionPayload>) -> &str {
        selection.map(|s| s.text.as_str()).unwrap_or("-")
    }

    impl DocumentBridge for RecordingBridge {
        fn render_preview(&self, preview: &NormalizedResponse, _selection: Option<&SelectionPayload>) {
            self.push(format!("render:{}", preview.content().unwrap_or("")));
        }

        fn apply_preview(
            &self,
            preview: &NormalizedResponse,
            _selection: Option<&SelectionPayload>,
        ) -> Option<UndoHandle> {
            self.push(format!("apply:{}", preview.content().unwrap_or("")));
            if !preview.has_content() {
                return None;
            }
            let undos = Arc::clone(&self.undos);
            Some(Box::new(move || {
                undos.fetch_add(1, Ordering::SeqCst);
            }))
        }

        fn clear_preview(&self, _selection: Option<&SelectionPayload>) {
            self.push("clear".into());
        }

        fn show_processing(&self, _selection: Option<&SelectionPayload>) {
            self.push("processing".into());
        }

        fn on_error(&self, message: &str, selection: Option<&SelectionPayload>) {
            self.push(format!("error:{message}:{}", text_of(selection)));
        }

        fn on_cancel(&self, selection: Option<&SelectionPayload>) {
            self.push(format!("cancel:{}", text_of(selection)));
        }
    }

    /// Bridge implementing only the required methods.
    struct MinimalBridge(Mutex<usize>);

    impl DocumentBridge for MinimalBridge {
        fn render_preview(&self, _preview: &NormalizedResponse, _selection: Option<&SelectionPayload>) {
            *self.0.lock() += 1;
        }

        fn apply_preview(
            &self,
            _preview: &NormalizedResponse,
            _selection: Option<&SelectionPayload>,
        ) -> Option<UndoHandle> {
            None
        }
    }

    fn adapter(values: Vec<Value>) -> Adapters {
        Adapters::none().with_streaming(streaming_fn(move |_payload, _ctx| {
            let items: Vec<anyhow::Result<Value>> = values.clone().into_iter().map(Ok).collect();
            async move { Ok::<ChunkStream, anyhow::Error>(futures::stream::iter(items).boxed()) }
        }))
    }

    fn hello() -> Adapters {
        adapter(vec![
            json!({"delta": "Hel"}),
            json!({"delta": "lo"}),
            json!({"text": "Hello"}),
        ])
    }

    fn setup(adapters: Adapters) -> (PreviewController, Arc<RecordingBridge>) {
        let controller = PreviewController::new(Arc::new(AiOrchestrator::new(AiConfig::new(adapters))));
        (controller, Arc::new(RecordingBridge::default()))
    }

    #[tokio::test]
    async fn test_stream_then_accept_drives_bridge() {
        let (controller, bridge) = setup(hello());
        let binding = bind_editor(&controller, bridge.clone(), HostHooks::new());

        controller
            .send_selection(SelectionPayload::new("hi"), RequestMode::Stream)
            .await;
        controller.accept();

        assert_eq!(
            bridge.calls(),
            [
                "clear",
                "processing",
                "render:Hel",
                "render:Hello",
                "render:Hello",
                "render:Hello",
                "apply:Hello",
                "clear",
            ]
        );
        assert!(binding.has_undo());
        assert_eq!(binding.last_selection().map(|s| s.text).as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_undo_runs_once() {
        let (controller, bridge) = setup(hello());
        let binding = bind_editor(&controller, bridge.clone(), HostHooks::new());
        controller
            .send_selection(SelectionPayload::new("hi"), RequestMode::Stream)
            .await;
        controller.accept();

        assert!(binding.undo_last_apply());
        assert!(!binding.undo_last_apply());
        assert_eq!(bridge.undos.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_accept_always_applies_and_replaces_undo() {
        let (controller, bridge) = setup(hello());
        let binding = bind_editor(&controller, bridge.clone(), HostHooks::new());
        controller
            .send_selection(SelectionPayload::new("hi"), RequestMode::Stream)
            .await;
        controller.accept();
        assert!(binding.has_undo());

        // After a reset the orchestrator has no preview left to accept.
        controller.reset();
        controller.accept();

        let applies: Vec<_> = bridge
            .calls()
            .into_iter()
            .filter(|call| call.starts_with("apply:"))
            .collect();
        assert_eq!(applies, ["apply:Hello", "apply:"]);
        assert!(!binding.has_undo());
        assert!(!binding.undo_last_apply());
        assert_eq!(bridge.undos.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reject_clears_and_drops_undo() {
        let (controller, bridge) = setup(hello());
        let binding = bind_editor(&controller, bridge.clone(), HostHooks::new());
        controller
            .send_selection(SelectionPayload::new("hi"), RequestMode::Stream)
            .await;
        controller.accept();
        controller.reject();

        assert_eq!(bridge.calls().last().map(String::as_str), Some("clear"));
        assert!(!binding.has_undo());
        assert!(!binding.undo_last_apply());
        assert_eq!(bridge.undos.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_error_reports_message_and_selection() {
        let (controller, bridge) = setup(adapter(vec![json!({"error": {"message": "boom"}})]));
        let _binding = bind_editor(&controller, bridge.clone(), HostHooks::new());
        controller
            .send_selection(SelectionPayload::new("pick me"), RequestMode::Stream)
            .await;

        let calls = bridge.calls();
        assert_eq!(calls[calls.len() - 2..], ["clear", "error:boom:pick me"]);
    }

    #[tokio::test]
    async fn test_cancel_uses_last_selection() {
        let (controller, bridge) = setup(hello());
        let _binding = bind_editor(&controller, bridge.clone(), HostHooks::new());
        controller
            .send_selection(SelectionPayload::new("sel"), RequestMode::Stream)
            .await;
        controller.cancel(Some("user"));

        assert_eq!(bridge.calls().last().map(String::as_str), Some("cancel:sel"));
    }

    #[tokio::test]
    async fn test_optional_hooks_default_to_noops() {
        let (controller, _) = setup(hello());
        let bridge = Arc::new(MinimalBridge(Mutex::new(0)));
        let binding = bind_editor(&controller, bridge.clone(), HostHooks::new());
        controller
            .send_selection(SelectionPayload::new("hi"), RequestMode::Stream)
            .await;
        controller.accept();
        controller.cancel(None);

        assert_eq!(*bridge.0.lock(), 4);
        assert!(!binding.has_undo());
    }

    #[tokio::test]
    async fn test_host_hooks_mirror_events() {
        let (controller, bridge) = setup(hello());
        let log = Arc::new(Mutex::new(Vec::<String>::new()));
        let hooks = {
            let (a, b, c, d, e) = (
                Arc::clone(&log),
                Arc::clone(&log),
                Arc::clone(&log),
                Arc::clone(&log),
                Arc::clone(&log),
            );
            HostHooks::new()
                .on_selection(move |payload, mode| a.lock().push(format!("selection:{}:{mode}", payload.text)))
                .on_preview_update(move |p| b.lock().push(format!("update:{}", p.content().unwrap_or(""))))
                .on_ready_for_decision(move |p| c.lock().push(format!("ready:{}", p.content().unwrap_or(""))))
                .on_reject(move |_| d.lock().push("reject".into()))
                .on_cancel(move |reason| e.lock().push(format!("cancel:{}", reason.unwrap_or("-"))))
        };
        let binding = bind_editor(&controller, bridge, hooks);

        controller
            .send_selection(SelectionPayload::new("hi"), RequestMode::Stream)
            .await;
        controller.reject();
        controller.cancel(Some("bye"));

        assert_eq!(
            *log.lock(),
            [
                "selection:hi:stream",
                "update:Hel",
                "update:Hello",
                "ready:Hello",
                "reject",
                "cancel:bye",
            ]
        );

        binding.dispose();
        controller.cancel(None);
        assert_eq!(log.lock().len(), 6);
    }

    #[tokio::test]
    async fn test_dispose_stops_bridge_calls() {
        let (controller, bridge) = setup(hello());
        let binding = bind_editor(&controller, bridge.clone(), HostHooks::new().on_error(|_| {}));
        assert_eq!(controller.orchestrator().bus().listener_count(events::ERROR), 2);

        binding.dispose();
        binding.dispose();
        assert_eq!(controller.orchestrator().bus().listener_count(events::ERROR), 1);

        controller
            .send_selection(SelectionPayload::new("hi"), RequestMode::Stream)
            .await;
        assert!(bridge.calls().is_empty());
    }

    #[tokio::test]
    async fn test_late_bind_does_not_reapply() {
        let (controller, bridge) = setup(hello());
        controller
            .send_selection(SelectionPayload::new("hi"), RequestMode::Stream)
            .await;
        controller.accept();

        let binding = bind_editor(&controller, bridge.clone(), HostHooks::new());
        assert!(bridge.calls().is_empty());
        assert!(!binding.has_undo());

        controller.reset();
        controller.cancel(None);
        assert_eq!(bridge.calls(), ["clear", "cancel:hi"]);
    }

    #[tokio::test]
    async fn test_late_bind_renders_pending_preview() {
        let (controller, bridge) = setup(hello());
        controller
            .send_selection(SelectionPayload::new("hi"), RequestMode::Stream)
            .await;

        let _binding = bind_editor(&controller, bridge.clone(), HostHooks::new());
        assert_eq!(bridge.calls(), ["render:Hello"]);
    }
}
