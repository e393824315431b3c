//! Preview controller: orchestrator events in, [`PreviewState`] out.
//!
//! The controller subscribes to every orchestrator event when it is built,
//! runs each through the reducer and keeps the single resulting state.
//! State listeners are called after the state lock is released, so a
//! listener may call straight back into the controller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use ghostwrite_types::{PreviewState, RequestMode, SelectionPayload};
use parking_lot::Mutex;

use crate::event_bus::{EventName, Listener};
use crate::events::{EVENT_NAMES, PreviewEvent};
use crate::orchestrator::AiOrchestrator;
use crate::state_machine::{TransitionPolicy, reduce_with};

type StateListener = Arc<dyn Fn(&PreviewState) + Send + Sync>;

struct ControllerInner {
    orchestrator: Arc<AiOrchestrator>,
    policy: TransitionPolicy,
    state: Mutex<PreviewState>,
    listeners: Mutex<Vec<(u64, StateListener)>>,
    next_listener: AtomicU64,
    subscriptions: Mutex<Vec<Listener<PreviewEvent>>>,
}

impl ControllerInner {
    fn handle(&self, event: &PreviewEvent) {
        let next = {
            let mut state = self.state.lock();
            let next = reduce_with(self.policy, &state, event);
            *state = next.clone();
            next
        };
        tracing::debug!(event = event.name(), status = %next.status, "preview state updated");
        self.notify(&next);
    }

    fn notify(&self, state: &PreviewState) {
        let listeners: Vec<StateListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(state);
        }
    }

    fn unsubscribe_all(&self) {
        let subscriptions: Vec<_> = self.subscriptions.lock().drain(..).collect();
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

/// Holds the preview state for one orchestrator.
///
/// Cheap to clone; clones share state and listeners.
#[derive(Clone)]
pub struct PreviewController {
    inner: Arc<ControllerInner>,
}

impl PreviewController {
    /// Controller with the permissive transition policy.
    pub fn new(orchestrator: Arc<AiOrchestrator>) -> Self {
        Self::with_policy(orchestrator, TransitionPolicy::default())
    }

    pub fn with_policy(orchestrator: Arc<AiOrchestrator>, policy: TransitionPolicy) -> Self {
        let inner = Arc::new(ControllerInner {
            orchestrator,
            policy,
            state: Mutex::new(PreviewState::idle()),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            subscriptions: Mutex::new(Vec::new()),
        });

        for name in EVENT_NAMES {
            let weak = Arc::downgrade(&inner);
            let subscription = inner.orchestrator.bus().on(name, move |event: &PreviewEvent| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle(event);
                }
            });
            inner.subscriptions.lock().push(subscription);
        }

        Self { inner }
    }

    /// The orchestrator this controller is wired to.
    pub fn orchestrator(&self) -> &Arc<AiOrchestrator> {
        &self.inner.orchestrator
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.inner.policy
    }

    /// Current state snapshot.
    pub fn get_state(&self) -> PreviewState {
        self.inner.state.lock().clone()
    }

    /// Register `listener` and call it immediately with the current state.
    pub fn subscribe<F>(&self, listener: F) -> StateSubscription
    where
        F: Fn(&PreviewState) + Send + Sync + 'static,
    {
        let listener: StateListener = Arc::new(listener);
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::clone(&listener)));

        let current = self.get_state();
        listener(&current);

        StateSubscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub async fn send_selection(&self, payload: SelectionPayload, mode: RequestMode) {
        self.inner.orchestrator.send_selection(payload, mode).await;
    }

    pub fn accept(&self) {
        self.inner.orchestrator.accept_preview();
    }

    pub fn reject(&self) {
        self.inner.orchestrator.reject_preview();
    }

    pub fn cancel(&self, reason: Option<&str>) {
        self.inner.orchestrator.cancel(reason);
    }

    pub fn reset(&self) {
        self.inner.orchestrator.reset();
    }

    /// Drop all state listeners and detach from the orchestrator.
    ///
    /// The orchestrator itself keeps running and can be reused by another
    /// controller.
    pub fn destroy(&self) {
        self.inner.listeners.lock().clear();
        self.inner.unsubscribe_all();
        *self.inner.state.lock() = PreviewState::idle();
        tracing::debug!("preview controller destroyed");
    }
}

impl std::fmt::Debug for PreviewController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewController")
            .field("policy", &self.inner.policy)
            .field("status", &self.inner.state.lock().status)
            .finish_non_exhaustive()
    }
}

/// Handle returned by [`PreviewController::subscribe`].
#[derive(Debug)]
pub struct StateSubscription {
    id: u64,
    inner: Weak<ControllerInner>,
}

impl StateSubscription {
    /// Stop receiving state updates. Returns false if already removed.
    pub fn unsubscribe(&self) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let mut listeners = inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != self.id);
        listeners.len() != before
    }
}
