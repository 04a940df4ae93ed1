//! Call recording for offline inspection.
//!
//! [`RecordingEngine`] wraps any [`Engine`] and writes each call
//! (transcript in, blocks out, or the error) to a JSON file under the
//! recording directory. Recording failures are logged and never fail
//! the call itself.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::engine::{Completion, CompletionRequest, Engine, EngineResult};

/// Serialized form of one recorded call.
#[derive(Serialize)]
struct CallRecord<'a> {
    model: &'a str,
    recorded_at: String,
    system: &'a Option<String>,
    messages: &'a [askdb_core::messages::Message],
    response: Option<&'a [askdb_core::messages::AssistantBlock]>,
    error: Option<String>,
}

/// Engine wrapper that records every call to disk.
pub struct RecordingEngine {
    inner: Arc<dyn Engine>,
    dir: PathBuf,
}

impl RecordingEngine {
    /// Wrap `inner`, recording calls under `dir` (created on demand).
    #[must_use]
    pub fn new(inner: Arc<dyn Engine>, dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            dir: dir.into(),
        }
    }

    fn write_record(&self, record: &CallRecord<'_>) {
        if let Err(err) = std::fs::create_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), %err, "failed to create recording dir");
            return;
        }
        let file = self.dir.join(format!(
            "{}-{}.json",
            Utc::now().format("%Y%m%dT%H%M%S"),
            Uuid::now_v7()
        ));
        match serde_json::to_vec_pretty(record) {
            Ok(bytes) => {
                if let Err(err) = std::fs::write(&file, bytes) {
                    warn!(file = %file.display(), %err, "failed to write call recording");
                }
            }
            Err(err) => warn!(%err, "failed to serialize call recording"),
        }
    }
}

#[async_trait::async_trait]
impl Engine for RecordingEngine {
    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(&self, request: &CompletionRequest) -> EngineResult<Completion> {
        let result = self.inner.complete(request).await;
        let record = CallRecord {
            model: self.inner.model(),
            recorded_at: Utc::now().to_rfc3339(),
            system: &request.system,
            messages: &request.messages,
            response: result.as_ref().ok().map(|c| c.content.as_slice()),
            error: result.as_ref().err().map(ToString::to_string),
        };
        self.write_record(&record);
        result
    }
}
