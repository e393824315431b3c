//! Orchestrator configuration and Rhai-driven loading.
//!
//! Settings are plain serde data. They can also be read from a `preview.rhai`
//! script whose top-level variables name each setting:
//!
//! ```rhai
//! let mode = "preview";            // or "autoApply"
//! let timeout_ms = 5000;           // batch only, -1 = unlimited
//! let retry = #{ attempts: 2, backoff_ms: 500 };
//! let response_schema = #{ text_key: "content" };
//! let ui_behavior = #{ show_processing: true };
//! ```
//!
//! Missing variables keep their defaults. Schema keys that are not given keep
//! their default names.

use std::time::Duration;

use ghostwrite_types::{ApplyMode, ResponseSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::Adapters;
use crate::error::{ConfigError, ConfigResult};

/// `timeout_ms` value meaning "no limit".
pub const UNLIMITED_TIMEOUT: i64 = -1;

/// The bundled default `preview.rhai`.
pub const DEFAULT_CONFIG_SCRIPT: &str = include_str!("../assets/preview.rhai");

/// Retry settings. Advisory only: the orchestrator never retries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra attempts an adapter may make.
    pub attempts: u32,
    /// Delay between attempts.
    pub backoff_ms: u64,
}

/// Serializable orchestrator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub mode: ApplyMode,
    /// Batch timeout in milliseconds; negative means unlimited.
    pub timeout_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    pub response_schema: ResponseSchema,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_behavior: Option<Value>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            mode: ApplyMode::Preview,
            timeout_ms: UNLIMITED_TIMEOUT,
            retry: None,
            response_schema: ResponseSchema::default(),
            ui_behavior: None,
        }
    }
}

impl OrchestratorSettings {
    /// The batch timeout, or `None` when unlimited.
    pub fn timeout(&self) -> Option<Duration> {
        u64::try_from(self.timeout_ms).ok().map(Duration::from_millis)
    }

    pub fn with_mode(mut self, mode: ApplyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_response_schema(mut self, schema: ResponseSchema) -> Self {
        self.response_schema = schema;
        self
    }

    pub fn with_ui_behavior(mut self, ui_behavior: Value) -> Self {
        self.ui_behavior = Some(ui_behavior);
        self
    }
}

/// Full orchestrator configuration: adapters plus settings.
#[derive(Debug, Clone, Default)]
pub struct AiConfig {
    pub adapters: Adapters,
    pub settings: OrchestratorSettings,
}

impl AiConfig {
    /// Configuration with the given adapters and default settings.
    pub fn new(adapters: Adapters) -> Self {
        Self {
            adapters,
            settings: OrchestratorSettings::default(),
        }
    }

    /// Replace the settings.
    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Parse a `preview.rhai` script into settings.
pub fn load_preview_config(script: &str) -> ConfigResult<OrchestratorSettings> {
    let engine = rhai::Engine::new();
    let ast = engine
        .compile(script)
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    let mut scope = rhai::Scope::new();
    engine
        .run_ast_with_scope(&mut scope, &ast)
        .map_err(|e| ConfigError::Eval(e.to_string()))?;

    let mut settings = OrchestratorSettings::default();

    if let Some(mode) = scope.get_value::<rhai::ImmutableString>("mode") {
        settings.mode = ApplyMode::from_str(&mode)
            .ok_or_else(|| ConfigError::invalid("mode", format!("unknown mode {mode:?}")))?;
    }

    if let Some(timeout_ms) = scope.get_value::<rhai::INT>("timeout_ms") {
        settings.timeout_ms = timeout_ms as i64;
    }

    if let Some(map) = scope.get_value::<rhai::Map>("retry") {
        settings.retry = Some(extract_retry(&map)?);
    }

    if let Some(map) = scope.get_value::<rhai::Map>("response_schema") {
        settings.response_schema = extract_schema(&map)?;
    }

    if let Some(map) = scope.get_value::<rhai::Map>("ui_behavior") {
        let value: Value = rhai::serde::from_dynamic(&rhai::Dynamic::from_map(map))
            .map_err(|e| ConfigError::invalid("ui_behavior", e.to_string()))?;
        settings.ui_behavior = Some(value);
    }

    tracing::debug!(
        mode = %settings.mode,
        timeout_ms = settings.timeout_ms,
        "loaded preview config"
    );
    Ok(settings)
}

fn non_negative(map: &rhai::Map, key: &str, section: &str) -> ConfigResult<Option<u64>> {
    let Some(value) = map.get(key) else {
        return Ok(None);
    };
    let int = value
        .as_int()
        .map_err(|t| ConfigError::invalid(format!("{section}.{key}"), format!("expected integer, got {t}")))?;
    u64::try_from(int)
        .map(Some)
        .map_err(|_| ConfigError::invalid(format!("{section}.{key}"), "must not be negative"))
}

fn extract_retry(map: &rhai::Map) -> ConfigResult<RetryPolicy> {
    let mut retry = RetryPolicy::default();
    if let Some(attempts) = non_negative(map, "attempts", "retry")? {
        retry.attempts = u32::try_from(attempts)
            .map_err(|_| ConfigError::invalid("retry.attempts", "too large"))?;
    }
    if let Some(backoff_ms) = non_negative(map, "backoff_ms", "retry")? {
        retry.backoff_ms = backoff_ms;
    }
    Ok(retry)
}

fn extract_schema(map: &rhai::Map) -> ConfigResult<ResponseSchema> {
    let mut schema = ResponseSchema::default();
    let slots: [(&str, &mut String); 4] = [
        ("text_key", &mut schema.text_key),
        ("delta_key", &mut schema.delta_key),
        ("meta_key", &mut schema.meta_key),
        ("error_key", &mut schema.error_key),
    ];
    for (key, slot) in slots {
        let Some(value) = map.get(key) else {
            continue;
        };
        let name = value
            .clone()
            .into_string()
            .map_err(|t| ConfigError::invalid(format!("response_schema.{key}"), format!("expected string, got {t}")))?;
        if name.is_empty() {
            return Err(ConfigError::invalid(format!("response_schema.{key}"), "must not be empty"));
        }
        *slot = name;
    }
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_defaults() {
        let settings = OrchestratorSettings::default();
        assert_eq!(settings.mode, ApplyMode::Preview);
        assert_eq!(settings.timeout_ms, -1);
        assert!(settings.timeout().is_none());
        assert_eq!(settings.response_schema, ResponseSchema::default());
    }

    #[test]
    fn test_timeout_conversion() {
        let settings = OrchestratorSettings::default().with_timeout_ms(0);
        assert_eq!(settings.timeout(), Some(Duration::ZERO));
        let settings = settings.with_timeout_ms(150);
        assert_eq!(settings.timeout(), Some(Duration::from_millis(150)));
    }

    #[test]
    fn test_settings_serde_partial() {
        let settings: OrchestratorSettings = serde_json::from_value(json!({
            "mode": "autoApply",
            "timeout_ms": 100,
            "response_schema": {"text_key": "content"}
        }))
        .unwrap();
        assert_eq!(settings.mode, ApplyMode::AutoApply);
        assert_eq!(settings.timeout_ms, 100);
        assert_eq!(settings.response_schema.text_key, "content");
        assert_eq!(settings.response_schema.delta_key, "delta");
    }

    const TEST_SCRIPT: &str = r#"
let mode = "autoApply";
let timeout_ms = 2500;
let retry = #{ attempts: 3, backoff_ms: 400 };
let response_schema = #{ text_key: "content", error_key: "failure" };
let ui_behavior = #{ show_processing: false, tone: "formal" };
"#;

    #[test]
    fn test_load_preview_config() {
        let settings = load_preview_config(TEST_SCRIPT).unwrap();
        assert_eq!(settings.mode, ApplyMode::AutoApply);
        assert_eq!(settings.timeout_ms, 2500);
        assert_eq!(
            settings.retry,
            Some(RetryPolicy {
                attempts: 3,
                backoff_ms: 400
            })
        );
        assert_eq!(settings.response_schema.text_key, "content");
        assert_eq!(settings.response_schema.error_key, "failure");
        assert_eq!(settings.response_schema.delta_key, "delta");
        assert_eq!(
            settings.ui_behavior,
            Some(json!({"show_processing": false, "tone": "formal"}))
        );
    }

    #[test]
    fn test_load_empty_script_uses_defaults() {
        let settings = load_preview_config("let x = 1;").unwrap();
        assert_eq!(settings, OrchestratorSettings::default());
    }

    #[test]
    fn test_load_invalid_script() {
        let result = load_preview_config("this is not valid rhai {{{{");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_unknown_mode() {
        let result = load_preview_config(r#"let mode = "yolo";"#);
        assert!(matches!(result, Err(ConfigError::InvalidValue { ref key, .. }) if key == "mode"));
    }

    #[test]
    fn test_load_negative_retry() {
        let result = load_preview_config("let retry = #{ attempts: -1 };");
        assert!(matches!(result, Err(ConfigError::InvalidValue { ref key, .. }) if key == "retry.attempts"));
    }

    #[test]
    fn test_load_bad_schema_key_type() {
        let result = load_preview_config("let response_schema = #{ text_key: 5 };");
        assert!(result.is_err());
    }

    #[test]
    fn test_default_preview_rhai_parses() {
        let settings = load_preview_config(DEFAULT_CONFIG_SCRIPT).unwrap();
        assert_eq!(settings.mode, ApplyMode::Preview);
        assert!(settings.timeout().is_none());
        assert_eq!(settings.response_schema, ResponseSchema::default());
        assert_eq!(settings.ui_behavior, Some(json!({"show_processing": true})));
    }
}
