//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`AskdbSettings::default()`]
//! 2. If `~/.askdb/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `ASKDB_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{AskdbSettings, Language};

/// Resolve the path to the settings file (`~/.askdb/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".askdb").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<AskdbSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON or an invalid value (e.g. an unknown language), returns
/// an error.
pub fn load_settings_from_path(path: &Path) -> Result<AskdbSettings> {
    let defaults = serde_json::to_value(AskdbSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: AskdbSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Each env var has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Floats must parse and fall within the specified range
/// - Invalid values are silently ignored (fall back to file/default)
pub fn apply_env_overrides(settings: &mut AskdbSettings) {
    // ── Controller ──────────────────────────────────────────────────
    if let Some(v) = read_env_u32("ASKDB_MAX_RETRIES", 0, 100) {
        settings.controller.max_retries = v;
    }
    if let Some(v) = read_env_u32("ASKDB_MAX_PASSES", 1, 1000) {
        settings.controller.max_passes = v;
    }
    if let Some(v) = read_env_string("ASKDB_LANGUAGE") {
        match serde_json::from_value::<Language>(Value::String(v.clone())) {
            Ok(lang) => settings.language = lang,
            Err(_) => {
                tracing::warn!(value = %v, "invalid ASKDB_LANGUAGE, ignoring");
            }
        }
    }

    // ── Engine ──────────────────────────────────────────────────────
    if let Some(v) = read_env_string("ASKDB_MODEL") {
        settings.engine.model = v;
    }
    if let Some(v) = read_env_string("ASKDB_ENGINE_API_BASE") {
        settings.engine.api_base = v;
    }
    if let Some(v) = read_env_u64("ASKDB_ENGINE_TIMEOUT_MS", 1000, 3_600_000) {
        settings.engine.timeout_ms = v;
    }

    // ── Warehouse ───────────────────────────────────────────────────
    if let Some(v) = read_env_string("ASKDB_WAREHOUSE_API_BASE") {
        settings.warehouse.api_base = v;
    }
    if let Some(v) = read_env_string("ASKDB_WAREHOUSE_PROJECT") {
        settings.warehouse.project = v;
    }
    if let Some(v) = read_env_string("ASKDB_WAREHOUSE_DATASET") {
        settings.warehouse.dataset = v;
    }
    if let Some(v) = read_env_string("ASKDB_RESULTS_DIR") {
        settings.warehouse.results_dir = v;
    }

    // ── Metadata ────────────────────────────────────────────────────
    if let Some(v) = read_env_string("ASKDB_METADATA_PATH") {
        settings.metadata.path = v;
    }

    // ── Interpreter ─────────────────────────────────────────────────
    if let Some(v) = read_env_string("ASKDB_PYTHON_BIN") {
        settings.interpreter.python_bin = v;
    }
    if let Some(v) = read_env_u64("ASKDB_PYTHON_TIMEOUT_MS", 1000, 3_600_000) {
        settings.interpreter.timeout_ms = v;
    }

    // ── Similarity ──────────────────────────────────────────────────
    if let Some(v) = read_env_string("ASKDB_EMBEDDINGS_API_BASE") {
        settings.similarity.api_base = v;
    }
    if let Some(v) = read_env_string("ASKDB_EMBEDDINGS_MODEL") {
        settings.similarity.model = v;
    }
    if let Some(v) = read_env_string("ASKDB_CACHE_PATH") {
        settings.similarity.cache_path = v;
    }
    if let Some(v) = read_env_f64("ASKDB_SIMILARITY_MIN_SCORE", 0.0, 1.0) {
        settings.similarity.min_score = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as an `f64` within a range.
pub fn parse_f64_range(val: &str, min: f64, max: f64) -> Option<f64> {
    let n: f64 = val.parse().ok()?;
    (n >= min && n <= max && n.is_finite()).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_f64(name: &str, min: f64, max: f64) -> Option<f64> {
    let val = std::env::var(name).ok()?;
    let result = parse_f64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid f64 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_simple_override() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": 10});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 10);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "warehouse": {"project": "p1", "location": "EU"}
        });
        let source = serde_json::json!({
            "warehouse": {"project": "p2"}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["warehouse"]["project"], "p2");
        assert_eq!(merged["warehouse"]["location"], "EU");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_new_keys_added() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"b": 2});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let path = Path::new("/nonexistent/settings.json");
        let settings = load_settings_from_path(path).unwrap();
        let defaults = AskdbSettings::default();
        assert_eq!(settings.controller.max_retries, defaults.controller.max_retries);
        assert_eq!(settings.engine.model, defaults.engine.model);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"controller": {"maxRetries": 4}, "warehouse": {"project": "acme-dw"}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.controller.max_retries, 4);
        assert_eq!(settings.warehouse.project, "acme-dw");
        assert_eq!(settings.controller.max_passes, 8);
        assert_eq!(settings.warehouse.location, "EU");
    }

    #[test]
    fn load_language_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"language": "it"}"#).unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.language, Language::It);
    }

    #[test]
    fn load_unknown_language_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"language": "de"}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_u32_valid_and_bounds() {
        assert_eq!(parse_u32_range("5", 0, 100), Some(5));
        assert_eq!(parse_u32_range("0", 0, 100), Some(0));
        assert_eq!(parse_u32_range("100", 0, 100), Some(100));
        assert_eq!(parse_u32_range("101", 0, 100), None);
        assert_eq!(parse_u32_range("abc", 0, 100), None);
    }

    #[test]
    fn parse_u64_valid_and_bounds() {
        assert_eq!(parse_u64_range("30000", 1000, 600_000), Some(30_000));
        assert_eq!(parse_u64_range("500", 1000, 600_000), None);
        assert_eq!(parse_u64_range("700000", 1000, 600_000), None);
    }

    #[test]
    fn parse_f64_valid_and_bounds() {
        assert_eq!(parse_f64_range("0.8", 0.0, 1.0), Some(0.8));
        assert_eq!(parse_f64_range("1.5", 0.0, 1.0), None);
        assert_eq!(parse_f64_range("nan", 0.0, 1.0), None);
        assert_eq!(parse_f64_range("x", 0.0, 1.0), None);
    }
}
