//! Settings schema.
//!
//! Every group derives `Serialize`/`Deserialize` with camelCase field
//! names and a `Default` carrying the compiled defaults, so a partial
//! settings file only has to name the keys it changes.

use serde::{Deserialize, Serialize};

/// Prompt language.
///
/// Closed enum: a settings file naming an unsupported language fails at
/// deserialization, before any session starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English prompts.
    #[default]
    En,
    /// Italian prompts.
    It,
}

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AskdbSettings {
    /// Settings schema version.
    pub version: u32,
    /// Prompt language.
    pub language: Language,
    /// Workflow controller settings.
    pub controller: ControllerSettings,
    /// Language engine settings.
    pub engine: EngineSettings,
    /// Warehouse query settings.
    pub warehouse: WarehouseSettings,
    /// Schema metadata settings.
    pub metadata: MetadataSettings,
    /// Analysis-script interpreter settings.
    pub interpreter: InterpreterSettings,
    /// Similar-question cache settings.
    pub similarity: SimilaritySettings,
}

/// Workflow controller settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerSettings {
    /// Maximum consecutive capability failures tolerated within one
    /// sub-loop before the controller gives up.
    pub max_retries: u32,
    /// Hard ceiling on generation passes per session. Bounds the
    /// successful-but-insufficient loop that `max_retries` cannot.
    pub max_passes: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            max_passes: 8,
        }
    }
}

/// Language engine settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Model identifier.
    pub model: String,
    /// Base URL of the generation API.
    pub api_base: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,
    /// Whether to record every engine call to disk.
    pub record_calls: bool,
    /// Directory for call recordings (created on demand).
    pub recording_dir: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            api_base: "https://generativelanguage.googleapis.com".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            temperature: 0.0,
            timeout_ms: 120_000,
            record_calls: false,
            recording_dir: "recordings".to_string(),
        }
    }
}

/// Warehouse query settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WarehouseSettings {
    /// Base URL of the warehouse REST API.
    pub api_base: String,
    /// Billing project ID.
    pub project: String,
    /// Default dataset queried.
    pub dataset: String,
    /// Warehouse location (e.g. `EU`, `US`).
    pub location: String,
    /// Per-query timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum rows fetched per query.
    pub max_result_rows: usize,
    /// Directory where full result sets are persisted as CSV.
    pub results_dir: String,
}

impl Default for WarehouseSettings {
    fn default() -> Self {
        Self {
            api_base: "https://bigquery.googleapis.com".to_string(),
            project: String::new(),
            dataset: String::new(),
            location: "EU".to_string(),
            timeout_ms: 60_000,
            max_result_rows: 10_000,
            results_dir: "results".to_string(),
        }
    }
}

/// Schema metadata settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataSettings {
    /// Path to the YAML metadata document.
    pub path: String,
    /// Metadata longer than this many characters is summarized by the
    /// engine before entering the transcript.
    pub summarize_over_chars: usize,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            path: "metadata.yaml".to_string(),
            summarize_over_chars: 5000,
        }
    }
}

/// Analysis-script interpreter settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InterpreterSettings {
    /// Python binary invoked for analysis scripts.
    pub python_bin: String,
    /// Per-script timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for InterpreterSettings {
    fn default() -> Self {
        Self {
            python_bin: "python3".to_string(),
            timeout_ms: 60_000,
        }
    }
}

/// Similar-question cache settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimilaritySettings {
    /// Base URL of the embeddings API.
    pub api_base: String,
    /// Embedding model identifier.
    pub model: String,
    /// Path to the SQLite cache database.
    pub cache_path: String,
    /// Maximum matches returned per lookup.
    pub top_k: usize,
    /// Minimum cosine similarity for a match to be returned.
    pub min_score: f64,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for SimilaritySettings {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            cache_path: "cache.db".to_string(),
            top_k: 3,
            min_score: 0.75,
            timeout_ms: 30_000,
        }
    }
}
