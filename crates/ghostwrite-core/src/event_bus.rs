//! Typed publish/subscribe bus with optional replay-before-subscription.
//!
//! Listeners subscribe by event name and receive the typed payload. Delivery
//! is synchronous: [`EventBus::emit`] calls every current listener for the
//! name, in subscription order, before it returns.
//!
//! # Replay
//!
//! A bus built with [`EventBus::with_replay`] keeps a bounded FIFO per event
//! name. Emitting a name that has no listeners queues the payload instead of
//! dropping it. The next listener to attach to that name drains the queue
//! immediately, in order, and the queue is cleared:
//!
//! ```text
//! emit(start)  ──► no listeners ──► queue[start] = [start]
//! on("start")  ──► deliver start ──► queue[start] = []
//! emit(start)  ──► listener called directly
//! ```
//!
//! A `once` listener attaching to a non-empty queue takes only the first
//! queued payload; the rest of that queue is discarded.
//!
//! Listeners may re-enter the bus (subscribe, unsubscribe, emit) from inside a
//! callback. The listener list is snapshotted before delivery, and each
//! listener is re-checked right before it is called, so a listener removed
//! mid-delivery is skipped.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Default per-event capacity of a replay queue.
pub const DEFAULT_REPLAY_CAPACITY: usize = 64;

/// Identifier of a registered listener.
pub type ListenerId = u64;

/// Payloads that know which event name they are published under.
pub trait EventName {
    /// The name listeners subscribe to.
    fn name(&self) -> &'static str;
}

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Entry<E> {
    id: ListenerId,
    name: String,
    once: bool,
    callback: Callback<E>,
}

struct BusState<E> {
    listeners: Vec<Entry<E>>,
    queues: HashMap<String, VecDeque<E>>,
    next_id: ListenerId,
}

impl<E> BusState<E> {
    fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|entry| entry.id != id);
        self.listeners.len() != before
    }

    fn contains(&self, id: ListenerId) -> bool {
        self.listeners.iter().any(|entry| entry.id == id)
    }
}

/// Typed event bus.
///
/// Cloning a bus yields another handle to the same listeners and queues.
pub struct EventBus<E> {
    state: Arc<Mutex<BusState<E>>>,
    replay_capacity: Option<usize>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            replay_capacity: self.replay_capacity,
        }
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EventBus")
            .field("listeners", &state.listeners.len())
            .field("queued_names", &state.queues.len())
            .field("replay_capacity", &self.replay_capacity)
            .finish()
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventBus<E> {
    /// Create a bus that drops events emitted with no listeners.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                listeners: Vec::new(),
                queues: HashMap::new(),
                next_id: 1,
            })),
            replay_capacity: None,
        }
    }

    /// Create a bus that queues up to `capacity` unheard events per name.
    ///
    /// A capacity of zero behaves like [`EventBus::new`].
    pub fn with_replay(capacity: usize) -> Self {
        let mut bus = Self::new();
        bus.replay_capacity = (capacity > 0).then_some(capacity);
        bus
    }

    /// Whether unheard events are queued for the next subscriber.
    pub fn replays(&self) -> bool {
        self.replay_capacity.is_some()
    }

    /// Number of listeners for `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .listeners
            .iter()
            .filter(|entry| entry.name == name)
            .count()
    }

    /// Number of payloads waiting in the replay queue for `name`.
    pub fn queued(&self, name: &str) -> usize {
        self.state.lock().queues.get(name).map_or(0, VecDeque::len)
    }

    /// Remove listeners.
    ///
    /// - `off(None, None)` clears every listener and every replay queue
    /// - `off(Some(name), None)` clears all listeners for `name`
    /// - `off(Some(name), Some(id))` removes that listener if it is on `name`
    /// - `off(None, Some(id))` removes that listener whatever its name
    pub fn off(&self, name: Option<&str>, id: Option<ListenerId>) {
        let mut state = self.state.lock();
        match (name, id) {
            (None, None) => {
                state.listeners.clear();
                state.queues.clear();
            }
            (Some(name), None) => state.listeners.retain(|entry| entry.name != name),
            (Some(name), Some(id)) => state
                .listeners
                .retain(|entry| !(entry.id == id && entry.name == name)),
            (None, Some(id)) => {
                state.remove(id);
            }
        }
    }
}

impl<E: Send + 'static> EventBus<E> {
    /// Subscribe to `name`. The returned handle can unsubscribe later.
    pub fn on<F>(&self, name: &str, callback: F) -> Listener<E>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe(name, false, Arc::new(callback))
    }

    /// Subscribe to `name` for a single delivery.
    pub fn once<F>(&self, name: &str, callback: F) -> Listener<E>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe(name, true, Arc::new(callback))
    }

    fn subscribe(&self, name: &str, once: bool, callback: Callback<E>) -> Listener<E> {
        let (id, replay) = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.listeners.push(Entry {
                id,
                name: name.to_string(),
                once,
                callback: Arc::clone(&callback),
            });
            (id, state.queues.remove(name))
        };

        let listener = Listener {
            id,
            name: name.to_string(),
            state: Arc::downgrade(&self.state),
        };

        if let Some(queue) = replay.filter(|q| !q.is_empty()) {
            tracing::debug!(event = name, queued = queue.len(), "replaying queued events to new listener");
            if once {
                self.state.lock().remove(id);
                if let Some(first) = queue.front() {
                    callback(first);
                }
            } else {
                for event in &queue {
                    if !self.state.lock().contains(id) {
                        break;
                    }
                    callback(event);
                }
            }
        }

        listener
    }
}

impl<E: EventName + Send + 'static> EventBus<E> {
    /// Deliver `event` to every listener of its name.
    ///
    /// Returns the number of listeners called. With replay enabled, an event
    /// that reaches nobody is queued (the oldest queued payload is dropped
    /// once the queue is full).
    pub fn emit(&self, event: E) -> usize {
        let name = event.name();
        let targets: Vec<(ListenerId, bool, Callback<E>)> = {
            let mut state = self.state.lock();
            let targets: Vec<_> = state
                .listeners
                .iter()
                .filter(|entry| entry.name == name)
                .map(|entry| (entry.id, entry.once, Arc::clone(&entry.callback)))
                .collect();

            if targets.is_empty() {
                if let Some(capacity) = self.replay_capacity {
                    let queue = state.queues.entry(name.to_string()).or_default();
                    if queue.len() >= capacity {
                        queue.pop_front();
                        tracing::warn!(event = name, capacity, "replay queue full, dropping oldest event");
                    }
                    queue.push_back(event);
                    tracing::trace!(event = name, "no listeners, event queued for replay");
                }
                return 0;
            }

            state.listeners.retain(|entry| !(entry.once && entry.name == name));
            targets
        };

        let mut delivered = 0;
        for (id, once, callback) in targets {
            if !once && !self.state.lock().contains(id) {
                continue;
            }
            callback(&event);
            delivered += 1;
        }
        tracing::trace!(event = name, delivered, "event emitted");
        delivered
    }
}

/// Handle to a registered listener.
///
/// Dropping the handle does not unsubscribe; call [`Listener::unsubscribe`].
pub struct Listener<E> {
    id: ListenerId,
    name: String,
    state: Weak<Mutex<BusState<E>>>,
}

impl<E> Listener<E> {
    /// The listener's identifier (usable with [`EventBus::off`]).
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// The event name this listener is registered for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.state
            .upgrade()
            .is_some_and(|state| state.lock().contains(self.id))
    }

    /// Remove the listener. Returns false if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        match self.state.upgrade() {
            Some(state) => state.lock().remove(self.id),
            None => false,
        }
    }
}

impl<E> std::fmt::Debug for Listener<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
