//! Document edits.
//!
//! A [`Transaction`] is a list of replacement [`Step`]s applied in order.
//! Each step's positions refer to the document as left by the steps before
//! it. Every transaction carries an [`Origin`] so observers can tell their
//! own edits from everyone else's.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one bridge instance, used to tag its edits and decorations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BridgeId(Uuid);

impl BridgeId {
    /// A fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BridgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BridgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 8 hex chars, like a short commit hash.
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

/// Who made an edit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// A user or any other party outside the bridges.
    #[default]
    External,
    /// A specific bridge.
    Bridge(BridgeId),
}

impl Origin {
    /// Whether this edit came from `bridge`.
    pub fn is_bridge(&self, bridge: BridgeId) -> bool {
        *self == Origin::Bridge(bridge)
    }
}

/// Replace characters `from..to` with `insert`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub from: usize,
    pub to: usize,
    pub insert: String,
}

impl Step {
    pub fn replace(from: usize, to: usize, insert: impl Into<String>) -> Self {
        Self {
            from,
            to,
            insert: insert.into(),
        }
    }

    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::replace(at, at, text)
    }

    pub fn delete(from: usize, to: usize) -> Self {
        Self::replace(from, to, String::new())
    }

    /// Characters removed.
    pub fn deleted_len(&self) -> usize {
        self.to.saturating_sub(self.from)
    }

    /// Characters inserted.
    pub fn inserted_len(&self) -> usize {
        self.insert.chars().count()
    }
}

/// An atomic group of steps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub steps: Vec<Step>,
    pub origin: Origin,
    /// Whether the edit is recorded in the undo history.
    pub add_to_history: bool,
}

impl Transaction {
    /// An empty transaction recorded in history.
    pub fn new(origin: Origin) -> Self {
        Self {
            steps: Vec::new(),
            origin,
            add_to_history: true,
        }
    }

    /// An empty transaction from outside any bridge.
    pub fn external() -> Self {
        Self::new(Origin::External)
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn replace(self, from: usize, to: usize, insert: impl Into<String>) -> Self {
        self.step(Step::replace(from, to, insert))
    }

    pub fn insert(self, at: usize, text: impl Into<String>) -> Self {
        self.step(Step::insert(at, text))
    }

    pub fn delete(self, from: usize, to: usize) -> Self {
        self.step(Step::delete(from, to))
    }

    pub fn with_history(mut self, add_to_history: bool) -> Self {
        self.add_to_history = add_to_history;
        self
    }
}

/// What observers see after a transaction is applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeSet {
    pub steps: Vec<Step>,
    pub origin: Origin,
    pub add_to_history: bool,
    /// Document version after the change.
    pub version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_lengths_count_chars() {
        let step = Step::replace(2, 5, "héé");
        assert_eq!(step.deleted_len(), 3);
        assert_eq!(step.inserted_len(), 3);
        assert_eq!(Step::delete(4, 4).deleted_len(), 0);
    }

    #[test]
    fn test_transaction_builder() {
        let id = BridgeId::new();
        let tr = Transaction::new(Origin::Bridge(id))
            .insert(0, "a")
            .delete(3, 4)
            .with_history(false);
        assert_eq!(tr.steps.len(), 2);
        assert!(!tr.add_to_history);
        assert!(tr.origin.is_bridge(id));
        assert!(!tr.origin.is_bridge(BridgeId::new()));
        assert!(!Origin::External.is_bridge(id));
    }

    #[test]
    fn test_bridge_id_display_is_short() {
        let id = BridgeId::new();
        assert_eq!(id.to_string().len(), 8);
        assert!(id.as_uuid().simple().to_string().starts_with(&id.to_string()));
    }
}
