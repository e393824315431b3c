//! In-memory plain-text document engine.
//!
//! Positions are character offsets. All edits go through
//! [`DocumentHost::dispatch`], which validates every step, applies the
//! transaction atomically, maps decorations through it and then tells
//! observers what changed. Observers run after the document lock is
//! released, so they may read from or dispatch to the document themselves.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::decoration::Decoration;
use crate::error::{DocumentError, DocumentResult};
use crate::transaction::{BridgeId, ChangeSet, Origin, Step, Transaction};

/// Callback invoked after every applied transaction.
pub type Observer = Arc<dyn Fn(&ChangeSet) + Send + Sync>;

/// Identifier returned by [`DocumentHost::observe`].
pub type ObserverId = u64;

/// The document surface a preview bridge needs.
pub trait DocumentHost: Send + Sync {
    /// Length in characters.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text of characters `from..to`.
    fn text_between(&self, from: usize, to: usize) -> DocumentResult<String>;

    /// Apply a transaction.
    fn dispatch(&self, transaction: Transaction) -> DocumentResult<ChangeSet>;

    /// Replace every decoration owned by `owner`.
    fn set_decorations(&self, owner: BridgeId, decorations: Vec<Decoration>);

    /// Decorations currently owned by `owner`.
    fn decorations(&self, owner: BridgeId) -> Vec<Decoration>;

    /// Register `observer` for change notifications.
    fn observe(&self, observer: Observer) -> ObserverId;

    /// Remove an observer. Returns false if it was not registered.
    fn unobserve(&self, id: ObserverId) -> bool;
}

/// One undoable edit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Version the edit produced.
    pub version: u64,
    pub origin: Origin,
    pub steps: Vec<Step>,
}

struct DocState {
    chars: Vec<char>,
    version: u64,
    history: Vec<HistoryEntry>,
    decorations: HashMap<BridgeId, Vec<Decoration>>,
}

impl DocState {
    fn check(&self, step: &Step, len: usize) -> DocumentResult<()> {
        if step.from > step.to {
            return Err(DocumentError::InvalidRange {
                from: step.from,
                to: step.to,
            });
        }
        if step.to > len {
            return Err(DocumentError::OutOfBounds { pos: step.to, len });
        }
        Ok(())
    }
}

/// A plain-text document.
pub struct TextDocument {
    state: Mutex<DocState>,
    observers: Mutex<Vec<(ObserverId, Observer)>>,
    next_observer: AtomicU64,
}

impl TextDocument {
    pub fn new(text: &str) -> Self {
        Self {
            state: Mutex::new(DocState {
                chars: text.chars().collect(),
                version: 0,
                history: Vec::new(),
                decorations: HashMap::new(),
            }),
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(1),
        }
    }

    /// Full document text.
    pub fn text(&self) -> String {
        self.state.lock().chars.iter().collect()
    }

    /// Number of applied transactions.
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    /// Recorded history, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.state.lock().history.clone()
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Every decoration on the document, across owners.
    pub fn all_decorations(&self) -> Vec<Decoration> {
        self.state
            .lock()
            .decorations
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    fn notify(&self, change: &ChangeSet) {
        let observers: Vec<Observer> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer(change);
        }
    }
}

impl DocumentHost for TextDocument {
    fn len(&self) -> usize {
        self.state.lock().chars.len()
    }

    fn text_between(&self, from: usize, to: usize) -> DocumentResult<String> {
        let state = self.state.lock();
        if from > to {
            return Err(DocumentError::InvalidRange { from, to });
        }
        if to > state.chars.len() {
            return Err(DocumentError::OutOfBounds {
                pos: to,
                len: state.chars.len(),
            });
        }
        Ok(state.chars[from..to].iter().collect())
    }

    fn dispatch(&self, transaction: Transaction) -> DocumentResult<ChangeSet> {
        let change = {
            let mut state = self.state.lock();

            // Validate against the lengths each step will actually see.
            let mut len = state.chars.len();
            for step in &transaction.steps {
                state.check(step, len)?;
                len = len - step.deleted_len() + step.inserted_len();
            }

            for step in &transaction.steps {
                drop(state.chars.splice(step.from..step.to, step.insert.chars()));
                for decorations in state.decorations.values_mut() {
                    for decoration in decorations.iter_mut() {
                        *decoration = decoration.map(step);
                    }
                }
            }

            state.version += 1;
            let version = state.version;
            if transaction.add_to_history && !transaction.steps.is_empty() {
                state.history.push(HistoryEntry {
                    version,
                    origin: transaction.origin,
                    steps: transaction.steps.clone(),
                });
            }

            tracing::trace!(
                version,
                steps = transaction.steps.len(),
                origin = ?transaction.origin,
                history = transaction.add_to_history,
                "transaction applied"
            );

            ChangeSet {
                steps: transaction.steps,
                origin: transaction.origin,
                add_to_history: transaction.add_to_history,
                version,
            }
        };

        self.notify(&change);
        Ok(change)
    }

    fn set_decorations(&self, owner: BridgeId, decorations: Vec<Decoration>) {
        let mut state = self.state.lock();
        if decorations.is_empty() {
            state.decorations.remove(&owner);
        } else {
            state.decorations.insert(owner, decorations);
        }
    }

    fn decorations(&self, owner: BridgeId) -> Vec<Decoration> {
        self.state
            .lock()
            .decorations
            .get(&owner)
            .cloned()
            .unwrap_or_default()
    }

    fn observe(&self, observer: Observer) -> ObserverId {
        let id = self.next_observer.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().push((id, observer));
        id
    }

    fn unobserve(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }
}

impl std::fmt::Debug for TextDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TextDocument")
            .field("len", &state.chars.len())
            .field("version", &state.version)
            .field("history", &state.history.len())
            .finish_non_exhaustive()
    }
}
