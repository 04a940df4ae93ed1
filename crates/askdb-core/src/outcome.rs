//! Capability outcome types.
//!
//! Every capability invocation resolves to a [`CapabilityOutcome`]: a typed
//! success payload or a typed failure. Control-flow decisions (retry,
//! branch, give up) are made on this enum, never by inspecting rendered
//! text. The legacy string markers survive only in [`CapabilityOutcome::render`],
//! which produces the transcript text shown to the model.

use serde::{Deserialize, Serialize};

use crate::constants::{
    CODE_ERROR_MARKER, METADATA_ERROR_MARKER, PREVIEW_ROWS, REQUEST_ERROR_MARKER,
    SIMILARITY_ERROR_MARKER, SQL_ERROR_MARKER,
};

/// Which capability family a failure came from.
///
/// Determines the stable marker prefix used in rendered transcript text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Warehouse query execution failed.
    Query,
    /// Analysis-script execution failed.
    Code,
    /// Schema metadata fetch failed.
    Metadata,
    /// Similar-question lookup failed.
    Similarity,
    /// The request itself was bad (unknown capability, malformed
    /// arguments).
    Request,
}

impl FailureKind {
    /// The stable marker prefixing this failure when rendered into the
    /// transcript.
    #[must_use]
    pub fn marker(self) -> &'static str {
        match self {
            Self::Query => SQL_ERROR_MARKER,
            Self::Code => CODE_ERROR_MARKER,
            Self::Metadata => METADATA_ERROR_MARKER,
            Self::Similarity => SIMILARITY_ERROR_MARKER,
            Self::Request => REQUEST_ERROR_MARKER,
        }
    }
}

/// A previously answered question retrieved from the similarity cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimilarMatch {
    /// The cached natural-language question.
    pub question: String,
    /// The query that answered it.
    pub query: String,
    /// Cosine similarity to the current question, in `[0.0, 1.0]`.
    pub score: f64,
}

/// Typed success payload of a capability invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CapabilityPayload {
    /// Tabular query results. Full rows are persisted to disk; the
    /// transcript carries the label plus a bounded preview.
    Table {
        /// Short description of what the rows contain.
        label: String,
        /// Column names, in result order.
        columns: Vec<String>,
        /// Result rows, stringified cell by cell.
        rows: Vec<Vec<String>>,
    },
    /// Schema metadata text (possibly summarized).
    Metadata {
        /// The metadata document.
        text: String,
    },
    /// Standard output of an analysis script.
    ProcessOutput {
        /// Captured stdout.
        stdout: String,
    },
    /// Similar previously-answered questions.
    Matches {
        /// Matches ordered by descending score.
        entries: Vec<SimilarMatch>,
    },
}

/// Result of a single capability invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CapabilityOutcome {
    /// The capability completed and produced a payload.
    Success(CapabilityPayload),
    /// The capability failed. `detail` is the human-readable cause.
    Failure {
        /// Which capability family failed.
        kind: FailureKind,
        /// Human-readable cause, shown to the model verbatim.
        detail: String,
    },
}

impl CapabilityOutcome {
    /// Construct a failure outcome.
    #[must_use]
    pub fn failure(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            detail: detail.into(),
        }
    }

    /// Returns `true` if this outcome is a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    /// Render the outcome into the transcript text shown to the model.
    ///
    /// Failures are prefixed with their stable marker so the model can
    /// recognize them; successes render their payload. Table payloads
    /// include at most [`PREVIEW_ROWS`] rows.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Failure { kind, detail } => format!("{} {detail}", kind.marker()),
            Self::Success(payload) => payload.render(),
        }
    }
}

impl CapabilityPayload {
    /// Render the payload into the transcript text shown to the model.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Table {
                label,
                columns,
                rows,
            } => render_table(label, columns, rows),
            Self::Metadata { text } => text.clone(),
            Self::ProcessOutput { stdout } => stdout.clone(),
            Self::Matches { entries } => render_matches(entries),
        }
    }
}

fn render_table(label: &str, columns: &[String], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    out.push_str(label);
    out.push_str("\n\n");
    out.push_str(&columns.join("\t"));
    out.push('\n');
    for row in rows.iter().take(PREVIEW_ROWS) {
        out.push_str(&row.join("\t"));
        out.push('\n');
    }
    if rows.len() > PREVIEW_ROWS {
        out.push_str(&format!("… ({} more rows)\n", rows.len() - PREVIEW_ROWS));
    }
    out
}

fn render_matches(entries: &[SimilarMatch]) -> String {
    if entries.is_empty() {
        return "No similar questions found.".to_string();
    }
    entries
        .iter()
        .map(|m| {
            format!(
                "Question: {}\nQuery: {}\nSimilarity: {:.3}",
                m.question, m.query, m.score
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
