//! Message types for the askdb conversation model.
//!
//! Messages form the transcript passed to the language engine. Three
//! roles: user, assistant, and capability result. Capability results
//! carry a typed [`CapabilityOutcome`]; control flow never inspects
//! rendered text.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::outcome::CapabilityOutcome;

// ─────────────────────────────────────────────────────────────────────────────
// Capability request
// ─────────────────────────────────────────────────────────────────────────────

/// A capability invocation emitted by the assistant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    /// Unique request ID, assigned by the engine or synthesized.
    pub id: String,
    /// Capability name, as declared by its descriptor.
    pub name: String,
    /// Arguments (JSON object).
    pub arguments: Map<String, Value>,
}

impl CapabilityRequest {
    /// Create a request with the given ID, name, and arguments.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Fetch a string argument by key.
    #[must_use]
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Assistant content blocks
// ─────────────────────────────────────────────────────────────────────────────

/// Content that can appear in assistant messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantBlock {
    /// Free text.
    Text {
        /// The text.
        text: String,
    },
    /// A capability invocation.
    CapabilityUse(CapabilityRequest),
}

impl AssistantBlock {
    /// Create a text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Returns the text if this is a text block, `None` otherwise.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::CapabilityUse(_) => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// A single transcript entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// User input, or controller-injected guidance rendered as user text.
    User {
        /// The text content.
        content: String,
    },
    /// Assistant output: text and/or capability requests.
    Assistant {
        /// Content blocks, in emission order.
        content: Vec<AssistantBlock>,
    },
    /// Result of a single capability invocation.
    CapabilityResult {
        /// ID of the request this result answers.
        request_id: String,
        /// Capability name.
        capability: String,
        /// The typed outcome.
        outcome: CapabilityOutcome,
    },
}

impl Message {
    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Create an assistant message from a single text block.
    #[must_use]
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: vec![AssistantBlock::text(text)],
        }
    }

    /// Create a capability result message.
    #[must_use]
    pub fn capability_result(
        request_id: impl Into<String>,
        capability: impl Into<String>,
        outcome: CapabilityOutcome,
    ) -> Self {
        Self::CapabilityResult {
            request_id: request_id.into(),
            capability: capability.into(),
            outcome,
        }
    }

    /// Concatenated text of all text blocks, if this is an assistant
    /// message. User messages return their content; capability results
    /// return their rendered outcome.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::User { content } => content.clone(),
            Self::Assistant { content } => content
                .iter()
                .filter_map(AssistantBlock::as_text)
                .collect::<Vec<_>>()
                .join("\n"),
            Self::CapabilityResult { outcome, .. } => outcome.render(),
        }
    }

    /// Capability requests carried by this message, in emission order.
    /// Empty for non-assistant messages.
    #[must_use]
    pub fn capability_requests(&self) -> Vec<&CapabilityRequest> {
        match self {
            Self::Assistant { content } => content
                .iter()
                .filter_map(|block| match block {
                    AssistantBlock::CapabilityUse(req) => Some(req),
                    AssistantBlock::Text { .. } => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Returns `true` if this is an assistant message carrying at least
    /// one capability request.
    #[must_use]
    pub fn has_capability_requests(&self) -> bool {
        !self.capability_requests().is_empty()
    }
}
