//! Selection snapshots and request modes.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::EnumString;

/// How a request is sent to the adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum RequestMode {
    /// Incremental chunks from a streaming adapter.
    #[default]
    #[strum(serialize = "stream", serialize = "streaming")]
    Stream,
    /// One result from a batch adapter.
    Batch,
}

impl RequestMode {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMode::Stream => "stream",
            RequestMode::Batch => "batch",
        }
    }
}

impl std::fmt::Display for RequestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What happens once a preview is ready for a decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum ApplyMode {
    /// Show the preview and wait for accept/reject.
    #[default]
    #[serde(rename = "preview")]
    Preview,
    /// Accept the preview as soon as it is ready.
    #[serde(rename = "autoApply", alias = "auto_apply")]
    #[strum(serialize = "autoapply", serialize = "auto_apply", serialize = "auto-apply")]
    AutoApply,
}

impl ApplyMode {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyMode::Preview => "preview",
            ApplyMode::AutoApply => "autoApply",
        }
    }
}

impl std::fmt::Display for ApplyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of the text (and where it lives) that a request operates on.
///
/// `range` is an opaque bag of coordinates. Only the document bridge
/// interprets it; the orchestrator passes it through untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionPayload {
    /// The selected text.
    pub text: String,
    /// Position descriptor understood by the bridge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Value>,
    /// Document version the selection was taken at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Caller-defined metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl SelectionPayload {
    /// Create a payload for the given text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Attach a position descriptor.
    pub fn with_range(mut self, range: Value) -> Self {
        self.range = Some(range);
        self
    }

    /// Attach the document version.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Attach metadata.
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}
