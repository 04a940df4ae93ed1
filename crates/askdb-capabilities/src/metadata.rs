//! Schema metadata retrieval.
//!
//! The catalog lives in a YAML file. Small catalogs enter the
//! transcript verbatim; oversized ones are first condensed by the
//! engine to the tables and columns relevant to the current question.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use askdb_core::descriptor::{CapabilityDescriptor, ParameterSchema};
use askdb_core::outcome::{CapabilityPayload, FailureKind};
use askdb_llm::{CompletionRequest, Engine, SamplingOptions};

use crate::errors::CapabilityError;
use crate::traits::{require_str, Capability, InvocationContext};

/// System prompt for catalog condensation.
const SUMMARIZE_SYSTEM: &str = "You are given a data warehouse schema catalog and a \
question. Return only the tables, columns, types, and descriptions relevant to \
answering the question. Keep the original formatting. Do not invent tables or \
columns that are not in the catalog.";

/// The `fetch_metadata` capability.
pub struct FetchMetadata {
    path: PathBuf,
    /// Catalogs longer than this many characters are condensed.
    summarize_over_chars: usize,
    engine: Arc<dyn Engine>,
    timeout_ms: u64,
}

impl FetchMetadata {
    /// Create the capability over the catalog at `path`.
    #[must_use]
    pub fn new(
        path: impl Into<PathBuf>,
        summarize_over_chars: usize,
        engine: Arc<dyn Engine>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            path: path.into(),
            summarize_over_chars,
            engine,
            timeout_ms,
        }
    }

    /// Read and normalize the catalog. Parsing through `serde_yaml`
    /// also validates the file.
    fn load_catalog(&self) -> Result<String, CapabilityError> {
        let raw = std::fs::read_to_string(&self.path)?;
        let parsed: serde_yaml::Value = serde_yaml::from_str(&raw)?;
        Ok(serde_yaml::to_string(&parsed)?)
    }

    async fn condense(&self, catalog: &str, question: &str) -> Result<String, CapabilityError> {
        let request = CompletionRequest {
            system: Some(SUMMARIZE_SYSTEM.to_string()),
            messages: vec![askdb_core::messages::Message::user(format!(
                "Question: {question}\n\nCatalog:\n{catalog}"
            ))],
            capabilities: Vec::new(),
            options: SamplingOptions::default(),
        };
        let completion = self.engine.complete(&request).await?;
        Ok(completion.into_message().text())
    }
}

#[async_trait]
impl Capability for FetchMetadata {
    fn name(&self) -> &str {
        "fetch_metadata"
    }

    fn failure_kind(&self) -> FailureKind {
        FailureKind::Metadata
    }

    fn timeout_ms(&self) -> Option<u64> {
        Some(self.timeout_ms)
    }

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: "fetch_metadata".into(),
            description: "Fetch the warehouse schema catalog: tables, columns, \
                          types, and descriptions relevant to the question."
                .into(),
            parameters: ParameterSchema::object(&[(
                "question",
                "string",
                "The question the schema is needed for",
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
        let catalog = self.load_catalog()?;

        let text = if catalog.chars().count() > self.summarize_over_chars {
            debug!(chars = catalog.chars().count(), "catalog oversized, condensing");
            self.condense(&catalog, question).await?
        } else {
            catalog
        };

        Ok(CapabilityPayload::Metadata { text })
    }
}
