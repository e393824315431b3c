//! Non-destructive annotations over document ranges.

use serde::{Deserialize, Serialize};

use crate::mapping::Span;
use crate::transaction::Step;

/// What a decoration marks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecorationKind {
    /// Pending suggestion text.
    Preview,
    /// A request is in flight for this range.
    Processing,
    /// The request for this range failed.
    Error,
}

/// One annotated range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoration {
    pub span: Span,
    pub kind: DecorationKind,
    /// Optional text for tooltips, e.g. an error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Decoration {
    pub fn new(span: Span, kind: DecorationKind) -> Self {
        Self {
            span,
            kind,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The decoration with its span mapped through `step`.
    pub fn map(&self, step: &Step) -> Self {
        Self {
            span: self.span.map(step),
            ..self.clone()
        }
    }
}
