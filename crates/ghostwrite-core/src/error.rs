//! Error types for configuration loading.

use thiserror::Error;

/// Errors from parsing a `preview.rhai` configuration script.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The script failed to compile.
    #[error("preview.rhai parse error: {0}")]
    Parse(String),

    /// The script failed while running.
    #[error("preview.rhai evaluation error: {0}")]
    Eval(String),

    /// A variable had an unusable value.
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue {
        /// The offending variable or map key.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
