//! Gemini engine implementing the [`Engine`] trait.
//!
//! Talks to the `generateContent` REST endpoint with API-key auth.
//! Requests are non-streaming: the controller consumes one completed
//! response per generation pass.
//!
//! Gemini function calls carry no call ID, so one is synthesized per
//! request part; capability results are sent back as `functionResponse`
//! parts keyed by capability name.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use askdb_core::messages::{AssistantBlock, CapabilityRequest, Message};

use crate::engine::{
    Completion, CompletionRequest, Engine, EngineError, EngineResult, SamplingOptions,
};

/// API version segment of the `generateContent` URL.
const API_VERSION: &str = "v1beta";

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

/// Content message in Gemini API format.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct GeminiContent {
    /// The role (`user` or `model`).
    role: String,
    /// Content parts.
    parts: Vec<GeminiPart>,
}

/// A content part in a Gemini message.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    /// Function call from the model.
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCallData,
    },
    /// Function response (capability result).
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponseData,
    },
    /// Text content.
    Text { text: String },
}

/// Function call details.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct FunctionCallData {
    name: String,
    args: serde_json::Value,
}

/// Function response details.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct FunctionResponseData {
    name: String,
    response: serde_json::Value,
}

/// Tool definition for the Gemini API.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<FunctionDeclaration>,
}

/// A single function declaration.
#[derive(Clone, Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

/// System instruction for the Gemini API.
#[derive(Clone, Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<SystemPart>,
}

/// A part of a system instruction.
#[derive(Clone, Debug, Serialize)]
struct SystemPart {
    text: String,
}

/// Generation config for the Gemini API.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

/// Top-level `generateContent` request body.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
    generation_config: GenerationConfig,
}

/// Top-level `generateContent` response body.
#[derive(Clone, Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

/// A response candidate.
#[derive(Clone, Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

/// Candidate content.
#[derive(Clone, Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

/// Error body returned by the API on non-success status.
#[derive(Clone, Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Clone, Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Gemini engine configuration.
#[derive(Clone, Debug)]
pub struct GeminiConfig {
    /// Model identifier.
    pub model: String,
    /// Base URL of the generation API.
    pub api_base: String,
    /// API key.
    pub api_key: String,
    /// Default sampling temperature.
    pub temperature: f32,
    /// Per-call timeout.
    pub timeout: Duration,
}

/// Gemini language engine.
#[derive(Debug)]
pub struct GeminiEngine {
    config: GeminiConfig,
    /// HTTP client (reused across requests).
    client: reqwest::Client,
}

impl GeminiEngine {
    /// Create a new Gemini engine.
    ///
    /// Returns [`EngineError::Auth`] if the API key is empty.
    pub fn new(config: GeminiConfig) -> EngineResult<Self> {
        if config.api_key.is_empty() {
            return Err(EngineError::Auth {
                message: "Gemini API key is empty".into(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(EngineError::Http)?;
        Ok(Self { config, client })
    }

    fn api_url(&self) -> String {
        format!(
            "{}/{API_VERSION}/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        )
    }

    fn build_body(&self, request: &CompletionRequest) -> GenerateContentRequest {
        let tools = if request.capabilities.is_empty() {
            None
        } else {
            Some(vec![GeminiTool {
                function_declarations: request
                    .capabilities
                    .iter()
                    .map(|cap| FunctionDeclaration {
                        name: cap.name.clone(),
                        description: cap.description.clone(),
                        parameters: serde_json::to_value(&cap.parameters)
                            .unwrap_or(serde_json::json!({"type": "object"})),
                    })
                    .collect(),
            }])
        };

        GenerateContentRequest {
            contents: convert_messages(&request.messages),
            system_instruction: request.system.as_ref().map(|text| SystemInstruction {
                parts: vec![SystemPart { text: text.clone() }],
            }),
            tools,
            generation_config: GenerationConfig {
                temperature: request
                    .options
                    .temperature
                    .or(Some(self.config.temperature)),
                max_output_tokens: request.options.max_tokens,
            },
        }
    }
}

#[async_trait::async_trait]
impl Engine for GeminiEngine {
    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn complete(&self, request: &CompletionRequest) -> EngineResult<Completion> {
        let body = self.build_body(request);
        let started = std::time::Instant::now();

        let response = self
            .client
            .post(self.api_url())
            .query(&[("key", self.config.api_key.as_str())])
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(EngineError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&error_text)
                .ok()
                .and_then(|b| b.error)
                .map_or(error_text, |d| d.message);
            metrics::counter!("askdb_engine_errors_total", "status" => status.as_u16().to_string())
                .increment(1);
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(EngineError::RateLimited {
                    retry_after_ms: 2000,
                    message,
                });
            }
            return Err(EngineError::Api {
                status: status.as_u16(),
                message,
                retryable: status.is_server_error(),
            });
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(EngineError::Http)?;
        metrics::histogram!("askdb_engine_call_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .ok_or_else(|| EngineError::EmptyCompletion {
                message: "response carried no candidates".into(),
            })?;

        let content = convert_parts(candidate.parts);
        debug!(blocks = content.len(), "engine completion received");
        Ok(Completion { content })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversion: transcript ↔ wire format
// ─────────────────────────────────────────────────────────────────────────────

fn convert_messages(messages: &[Message]) -> Vec<GeminiContent> {
    messages
        .iter()
        .map(|msg| match msg {
            Message::User { content } => GeminiContent {
                role: "user".into(),
                parts: vec![GeminiPart::Text {
                    text: content.clone(),
                }],
            },
            Message::Assistant { content } => GeminiContent {
                role: "model".into(),
                parts: content
                    .iter()
                    .map(|block| match block {
                        AssistantBlock::Text { text } => GeminiPart::Text { text: text.clone() },
                        AssistantBlock::CapabilityUse(req) => GeminiPart::FunctionCall {
                            function_call: FunctionCallData {
                                name: req.name.clone(),
                                args: serde_json::Value::Object(req.arguments.clone()),
                            },
                        },
                    })
                    .collect(),
            },
            Message::CapabilityResult {
                capability,
                outcome,
                ..
            } => GeminiContent {
                role: "user".into(),
                parts: vec![GeminiPart::FunctionResponse {
                    function_response: FunctionResponseData {
                        name: capability.clone(),
                        response: serde_json::json!({"result": outcome.render()}),
                    },
                }],
            },
        })
        .collect()
}

fn convert_parts(parts: Vec<GeminiPart>) -> Vec<AssistantBlock> {
    parts
        .into_iter()
        .filter_map(|part| match part {
            GeminiPart::Text { text } => Some(AssistantBlock::Text { text }),
            GeminiPart::FunctionCall { function_call } => {
                let arguments = match function_call.args {
                    serde_json::Value::Object(map) => map,
                    other => {
                        warn!(?other, name = %function_call.name, "non-object function args");
                        serde_json::Map::new()
                    }
                };
                Some(AssistantBlock::CapabilityUse(CapabilityRequest::new(
                    format!("call-{}", Uuid::now_v7()),
                    function_call.name,
                    arguments,
                )))
            }
            GeminiPart::FunctionResponse { .. } => None,
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
