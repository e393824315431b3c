//! Normalized adapter output and the schema that produces it.
//!
//! Adapters return arbitrary JSON. A [`ResponseSchema`] names the four keys
//! that are read off each raw value; everything else is ignored.
//!
//! Merging follows two rules:
//! - `delta` accumulates by concatenation in arrival order
//! - `text`, `meta` and `error` are last-write-wins (never merged deeply)

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message used when an error carries no usable text.
pub const UNKNOWN_ERROR: &str = "unknown error";

/// Error surfaced through the `error` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct AiError {
    /// Provider- or adapter-specific error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Extra context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl AiError {
    /// Create an error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            meta: None,
        }
    }

    /// Set the error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Set the error metadata.
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// The generic "unknown error".
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_ERROR)
    }

    /// Build an error from a raw JSON error field.
    ///
    /// Strings become the message. Objects contribute `message`, `code`
    /// (string or number) and `meta`. Anything else is an unknown error.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(message) if !message.is_empty() => Self::new(message.clone()),
            Value::Object(map) => {
                let message = map
                    .get("message")
                    .and_then(Value::as_str)
                    .filter(|m| !m.is_empty())
                    .unwrap_or(UNKNOWN_ERROR);
                let code = match map.get("code") {
                    Some(Value::String(code)) => Some(code.clone()),
                    Some(Value::Number(code)) => Some(code.to_string()),
                    _ => None,
                };
                let meta = map.get("meta").filter(|m| !m.is_null()).cloned();
                Self {
                    code,
                    message: message.to_string(),
                    meta,
                }
            }
            _ => Self::unknown(),
        }
    }
}

/// The four canonical fields every raw adapter output is mapped onto.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    /// Incremental text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
    /// Full text (replaces, never concatenates).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Provider metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    /// Provider-reported error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AiError>,
}

impl NormalizedResponse {
    /// A response holding only a delta.
    pub fn delta(delta: impl Into<String>) -> Self {
        Self {
            delta: Some(delta.into()),
            ..Self::default()
        }
    }

    /// A response holding only full text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// True when none of the four fields is set.
    pub fn is_empty(&self) -> bool {
        self.delta.is_none() && self.text.is_none() && self.meta.is_none() && self.error.is_none()
    }

    /// True when there is something to show (`delta` or `text`).
    pub fn has_content(&self) -> bool {
        self.delta.is_some() || self.text.is_some()
    }

    /// The text a preview should display: `text` if set, else the accumulated delta.
    pub fn content(&self) -> Option<&str> {
        self.text.as_deref().or(self.delta.as_deref())
    }

    /// Merge a newer response into this one.
    pub fn merge(&mut self, next: &NormalizedResponse) {
        if let Some(delta) = &next.delta {
            self.delta.get_or_insert_with(String::new).push_str(delta);
        }
        if next.text.is_some() {
            self.text.clone_from(&next.text);
        }
        if next.meta.is_some() {
            self.meta.clone_from(&next.meta);
        }
        if next.error.is_some() {
            self.error.clone_from(&next.error);
        }
    }
}

/// Names of the raw keys read off adapter output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseSchema {
    pub text_key: String,
    pub delta_key: String,
    pub meta_key: String,
    pub error_key: String,
}

impl Default for ResponseSchema {
    fn default() -> Self {
        Self {
            text_key: "text".to_string(),
            delta_key: "delta".to_string(),
            meta_key: "meta".to_string(),
            error_key: "error".to_string(),
        }
    }
}

impl ResponseSchema {
    /// Map a raw adapter value onto the canonical fields.
    ///
    /// A bare string is treated as a delta. `null` fields count as absent.
    /// Non-object values produce an empty response.
    pub fn normalize(&self, raw: &Value) -> NormalizedResponse {
        let map = match raw {
            Value::Object(map) => map,
            Value::String(delta) => return NormalizedResponse::delta(delta.clone()),
            _ => return NormalizedResponse::default(),
        };

        let string_field = |key: &str| match map.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };

        NormalizedResponse {
            delta: string_field(&self.delta_key),
            text: string_field(&self.text_key),
            meta: map.get(&self.meta_key).filter(|v| !v.is_null()).cloned(),
            error: map
                .get(&self.error_key)
                .filter(|v| !v.is_null())
                .map(AiError::from_value),
        }
    }
}
