//! Similar-question lookup.
//!
//! Previously answered questions live in a SQLite store together with
//! their embeddings. A lookup embeds the incoming question over HTTP,
//! scores every cached entry by cosine similarity, and returns the
//! top matches above the score floor. The store outlives runs and can
//! be seeded from a JSON file of question/query pairs.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use askdb_core::descriptor::{CapabilityDescriptor, ParameterSchema};
use askdb_core::outcome::{CapabilityPayload, FailureKind, SimilarMatch};

use crate::errors::CapabilityError;
use crate::traits::{require_str, Capability, InvocationContext};

// ─────────────────────────────────────────────────────────────────────────────
// Embeddings client
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP client for the embeddings endpoint (`POST /api/embeddings`).
pub struct EmbeddingsClient {
    api_base: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    embedding: Vec<f64>,
}

impl EmbeddingsClient {
    /// Create a client for the given endpoint and model.
    pub fn new(
        api_base: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CapabilityError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CapabilityError::Http)?;
        Ok(Self {
            api_base: api_base.into(),
            model: model.into(),
            client,
        })
    }

    /// Embed one text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f64>, CapabilityError> {
        let url = format!("{}/api/embeddings", self.api_base.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({"model": self.model, "prompt": text}))
            .send()
            .await
            .map_err(CapabilityError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Validation {
                message: format!("embeddings endpoint returned {status}: {text}"),
            });
        }

        let parsed: EmbeddingsResponse = response.json().await.map_err(CapabilityError::Http)?;
        if parsed.embedding.is_empty() {
            return Err(CapabilityError::Validation {
                message: "embeddings endpoint returned an empty vector".into(),
            });
        }
        Ok(parsed.embedding)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// A cached question with its answering query and embedding.
#[derive(Clone, Debug)]
pub struct CachedQuery {
    /// The cached natural-language question.
    pub question: String,
    /// The query that answered it.
    pub query: String,
    /// Embedding of the question.
    pub embedding: Vec<f64>,
}

/// SQLite-backed store of cached questions.
pub struct SimilarityStore {
    conn: Mutex<Connection>,
}

impl SimilarityStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, CapabilityError> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory store (tests).
    pub fn open_in_memory() -> Result<Self, CapabilityError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CapabilityError> {
        let _ = conn.execute(
            "CREATE TABLE IF NOT EXISTS cached_queries (
                 id        INTEGER PRIMARY KEY,
                 question  TEXT NOT NULL,
                 query     TEXT NOT NULL,
                 embedding TEXT NOT NULL
             )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert one cached question.
    pub fn insert(
        &self,
        question: &str,
        query: &str,
        embedding: &[f64],
    ) -> Result<(), CapabilityError> {
        let encoded = serde_json::to_string(embedding)?;
        let conn = self.conn.lock();
        let _ = conn.execute(
            "INSERT INTO cached_queries (question, query, embedding) VALUES (?1, ?2, ?3)",
            rusqlite::params![question, query, encoded],
        )?;
        Ok(())
    }

    /// Load every cached question.
    pub fn all(&self) -> Result<Vec<CachedQuery>, CapabilityError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT question, query, embedding FROM cached_queries")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (question, query, encoded) = row?;
            entries.push(CachedQuery {
                question,
                query,
                embedding: serde_json::from_str(&encoded)?,
            });
        }
        Ok(entries)
    }

    /// Number of cached questions.
    pub fn len(&self) -> Result<usize, CapabilityError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM cached_queries", [], |row| {
            row.get(0)
        })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

/// Cosine similarity of two vectors. Returns 0.0 on length mismatch or
/// a zero-norm vector.
#[must_use]
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

// ─────────────────────────────────────────────────────────────────────────────
// Seeding
// ─────────────────────────────────────────────────────────────────────────────

/// One entry of the JSON seed file.
#[derive(Debug, Deserialize)]
pub struct SeedEntry {
    /// The natural-language question.
    pub question: String,
    /// The query that answers it.
    pub query: String,
}

/// Seed the store from a JSON file of `{question, query}` pairs,
/// embedding each question. Returns the number of entries inserted.
pub async fn seed_from_json(
    store: &SimilarityStore,
    embeddings: &EmbeddingsClient,
    path: &Path,
) -> Result<usize, CapabilityError> {
    let raw = std::fs::read_to_string(path)?;
    let entries: Vec<SeedEntry> = serde_json::from_str(&raw)?;

    for entry in &entries {
        let embedding = embeddings.embed(&entry.question).await?;
        store.insert(&entry.question, &entry.query, &embedding)?;
    }
    info!(count = entries.len(), "similarity cache seeded");
    Ok(entries.len())
}

// ─────────────────────────────────────────────────────────────────────────────
// Capability
// ─────────────────────────────────────────────────────────────────────────────

/// The `similar_queries` capability.
pub struct SimilarQueries {
    embeddings: Arc<EmbeddingsClient>,
    store: Arc<SimilarityStore>,
    top_k: usize,
    min_score: f64,
    timeout_ms: u64,
}

impl SimilarQueries {
    /// Create the capability over the given client and store.
    #[must_use]
    pub fn new(
        embeddings: Arc<EmbeddingsClient>,
        store: Arc<SimilarityStore>,
        top_k: usize,
        min_score: f64,
        timeout_ms: u64,
    ) -> Self {
        Self {
            embeddings,
            store,
            top_k,
            min_score,
            timeout_ms,
        }
    }
}

#[async_trait]
impl Capability for SimilarQueries {
    fn name(&self) -> &str {
        "similar_queries"
    }

    fn failure_kind(&self) -> FailureKind {
        FailureKind::Similarity
    }

    fn timeout_ms(&self) -> Option<u64> {
        Some(self.timeout_ms)
    }

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: "similar_queries".into(),
            description: "Look up previously answered questions similar to the \
                          current one, with the queries that answered them."
                .into(),
            parameters: ParameterSchema::object(&[(
                "question",
                "string",
                "The question to find similar precedents for",
            )]),
        }
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id))]
    async fn invoke(
        &self,
        arguments: &Map<String, Value>,
        ctx: &InvocationContext,
    ) -> Result<CapabilityPayload, CapabilityError> {
        let question = require_str(arguments, "question")?;
        let k = arguments
            .get("k")
            .and_then(Value::as_u64)
            .map_or(self.top_k, |k| k as usize);

        let query_embedding = self.embeddings.embed(question).await?;
        let cached = self.store.all()?;

        let mut scored: Vec<SimilarMatch> = cached
            .into_iter()
            .map(|entry| {
                let score = cosine(&query_embedding, &entry.embedding);
                SimilarMatch {
                    question: entry.question,
                    query: entry.query,
                    score,
                }
            })
            .filter(|m| m.score >= self.min_score)
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);

        debug!(matches = scored.len(), "similarity lookup completed");
        Ok(CapabilityPayload::Matches { entries: scored })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
