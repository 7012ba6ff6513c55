//! Gemini `generateContent` backend.
//!
//! One HTTPS call per request. Parts flagged `thought` are returned as
//! reasoning steps, `functionCall` parts as tool calls, and all other text
//! parts are joined into the answer.
//! HTTP 408, 429 and 5xx, timeouts and connection failures are transport
//! errors; anything else that is not a usable answer is a protocol error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, instrument};

use super::{
    ReasoningBackend, RemoteError, RemotePart, RemotePhase, RemoteRequest, RemoteResponse, ToolDeclaration,
};
use crate::config::RemoteSettings;
use crate::domain::analysis::ToolCall;
use crate::error::{RemoteProtocolError, RemoteTransportError};

/// HTTP backend for the Gemini API
pub struct GeminiBackend {
    client: Client,
    settings: RemoteSettings,
    api_key: String,
}

impl GeminiBackend {
    /// Create a backend with an explicit key
    pub fn new(settings: RemoteSettings, api_key: impl Into<String>) -> Result<Self, RemoteTransportError> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| RemoteTransportError::new(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            settings,
            api_key: api_key.into(),
        })
    }

    /// Create a backend with the key from the environment
    pub fn from_env(settings: RemoteSettings) -> Result<Self, RemoteTransportError> {
        let key = crate::config::api_key().ok_or_else(|| {
            RemoteTransportError::new(format!(
                "No API key configured (set {})",
                crate::config::API_KEY_ENVS.join(" or ")
            ))
        })?;
        Self::new(settings, key)
    }

    fn body<'a>(&self, request: &'a RemoteRequest) -> GenerateRequest<'a> {
        let mut parts = Vec::with_capacity(request.parts.len() + 1);
        parts.push(WirePart::Text {
            text: &request.instruction,
        });
        parts.extend(request.parts.iter().map(|part| match part {
            RemotePart::Text { text } => WirePart::Text { text },
            RemotePart::Inline { mime_type, data, .. } => WirePart::Inline {
                inline_data: InlineData { mime_type, data },
            },
        }));

        let thinking_config = match request.phase {
            RemotePhase::Reasoning => Some(ThinkingConfig {
                include_thoughts: true,
            }),
            RemotePhase::Extraction => None,
        };

        let tools = if request.tools.is_empty() {
            Vec::new()
        } else {
            vec![ToolSet {
                function_declarations: &request.tools,
            }]
        };

        GenerateRequest {
            contents: vec![Content { role: "user", parts }],
            tools,
            generation_config: GenerationConfig {
                temperature: self.settings.temperature_for(request.phase),
                max_output_tokens: self.settings.max_output_tokens,
                thinking_config,
            },
        }
    }

    async fn send(&self, request: &RemoteRequest) -> Result<RemoteResponse, RemoteError> {
        let url = self.settings.endpoint_for(request.phase);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| classify_reqwest_error(request.phase, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(request.phase, e))?;

        if !status.is_success() {
            return Err(classify_status(request.phase, status.as_u16(), &body));
        }

        parse_response(request.phase, &body).map_err(RemoteError::from)
    }
}

#[async_trait]
impl ReasoningBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    #[instrument(skip(self, request), fields(phase = request.phase.as_str(), parts = request.parts.len()))]
    async fn request(&self, request: RemoteRequest) -> Result<RemoteResponse, RemoteError> {
        let limit = self.settings.timeout() + Duration::from_secs(5);

        let response = timeout(limit, self.send(&request)).await.map_err(|_| {
            RemoteTransportError::new(format!(
                "{} request timed out after {:?}",
                request.phase.as_str(),
                limit
            ))
        })??;

        debug!(
            answer_len = response.text.len(),
            thoughts = response.thoughts.len(),
            tool_calls = response.tool_calls.len(),
            "Remote call complete"
        );
        Ok(response)
    }
}

fn classify_reqwest_error(phase: RemotePhase, error: reqwest::Error) -> RemoteError {
    if error.is_decode() {
        RemoteProtocolError::new(phase.as_str(), error.to_string()).into()
    } else {
        let status = error.status().map(|s| s.as_u16());
        RemoteTransportError {
            status,
            message: error.to_string(),
        }
        .into()
    }
}

/// Map a non-success status to the error category callers retry on
pub(crate) fn classify_status(phase: RemotePhase, status: u16, body: &str) -> RemoteError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error.message)
        .unwrap_or_else(|| body.chars().take(200).collect());

    if status == 408 || status == 429 || (500..600).contains(&status) {
        RemoteTransportError::with_status(status, message).into()
    } else {
        RemoteProtocolError::new(phase.as_str(), format!("HTTP {}: {}", status, message)).into()
    }
}

/// Split a `generateContent` envelope into answer text and thoughts
pub(crate) fn parse_response(phase: RemotePhase, body: &str) -> Result<RemoteResponse, RemoteProtocolError> {
    let envelope: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| RemoteProtocolError::new(phase.as_str(), format!("invalid response envelope: {}", e)))?;

    let candidate = envelope.candidates.into_iter().next().ok_or_else(|| {
        let reason = envelope
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        RemoteProtocolError::new(phase.as_str(), format!("empty response: {}", reason))
    })?;

    let mut text = Vec::new();
    let mut thoughts = Vec::new();
    let mut tool_calls = Vec::new();
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if let Some(call) = part.function_call {
            tool_calls.push(ToolCall {
                name: call.name,
                args: call.args.unwrap_or(serde_json::Value::Null),
            });
        }
        let Some(part_text) = part.text.filter(|t| !t.trim().is_empty()) else {
            continue;
        };
        if part.thought {
            thoughts.push(part_text.trim().to_string());
        } else {
            text.push(part_text);
        }
    }

    if text.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(RemoteProtocolError::new(
            phase.as_str(),
            format!("no answer text (finish reason: {})", reason),
        ));
    }

    Ok(RemoteResponse {
        text: text.join("\n"),
        thoughts,
        tool_calls,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSet<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolSet<'a> {
    function_declarations: &'a [ToolDeclaration],
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<WirePart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WirePart<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    include_thoughts: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
    function_call: Option<FunctionCall>,
}

#[derive(Deserialize)]
struct FunctionCall {
    name: String,
    args: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> GeminiBackend {
        GeminiBackend::new(RemoteSettings::default(), "test-key").unwrap()
    }

    #[test]
    fn test_request_body_shape() {
        let request = RemoteRequest::new(RemotePhase::Extraction, "Extract claims")
            .with_part(RemotePart::Inline {
                mime_type: "application/pdf".to_string(),
                data: "JVBERg==".to_string(),
                file_name: "memo.pdf".to_string(),
            })
            .with_part(RemotePart::text("File: memo.pdf (document)"));

        let backend = backend();
        let body = serde_json::to_value(backend.body(&request)).unwrap();

        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "Extract claims");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "application/pdf");
        assert_eq!(parts[1]["inlineData"]["data"], "JVBERg==");
        assert_eq!(parts[2]["text"], "File: memo.pdf (document)");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
        assert!(body["generationConfig"].get("thinkingConfig").is_none());
    }

    #[test]
    fn test_reasoning_requests_thoughts() {
        let request = RemoteRequest::new(RemotePhase::Reasoning, "Reconcile");
        let backend = backend();
        let body = serde_json::to_value(backend.body(&request)).unwrap();
        assert_eq!(body["generationConfig"]["thinkingConfig"]["includeThoughts"], true);
    }

    #[test]
    fn test_parse_separates_thoughts() {
        let body = r#"{
            "candidates": [{
                "content": {"parts": [
                    {"text": "Comparing timestamps across files", "thought": true},
                    {"text": "Checking access logs", "thought": true},
                    {"text": "{\"verdict\": \"ok\"}"}
                ]},
                "finishReason": "STOP"
            }]
        }"#;

        let response = parse_response(RemotePhase::Reasoning, body).unwrap();
        assert_eq!(response.text, "{\"verdict\": \"ok\"}");
        assert_eq!(response.thoughts.len(), 2);
        assert_eq!(response.thoughts[1], "Checking access logs");
    }

    #[test]
    fn test_tools_declared_and_calls_returned() {
        let request = RemoteRequest::new(RemotePhase::Reasoning, "Reconcile").with_tools(vec![ToolDeclaration {
            name: "extractTimestamp".to_string(),
            description: "Parse a timestamp".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        }]);
        let body = serde_json::to_value(backend().body(&request)).unwrap();
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "extractTimestamp");

        let plain = serde_json::to_value(backend().body(&RemoteRequest::new(RemotePhase::Extraction, "x"))).unwrap();
        assert!(plain.get("tools").is_none());

        let answer = r#"{"candidates":[{"content":{"parts":[
            {"functionCall": {"name": "detectContradiction", "args": {"claim1": "a", "claim2": "b"}}},
            {"text": "{\"verdict\": \"ok\"}"}
        ]}}]}"#;
        let response = parse_response(RemotePhase::Reasoning, answer).unwrap();
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "detectContradiction");
        assert_eq!(response.tool_calls[0].args["claim2"], "b");
        assert_eq!(response.text, "{\"verdict\": \"ok\"}");
    }

    #[test]
    fn test_parse_rejects_empty_answers() {
        let blocked = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let err = parse_response(RemotePhase::Extraction, blocked).unwrap_err();
        assert!(err.message.contains("SAFETY"));

        let thoughts_only = r#"{"candidates":[{"content":{"parts":[{"text":"hm","thought":true}]},"finishReason":"MAX_TOKENS"}]}"#;
        let err = parse_response(RemotePhase::Reasoning, thoughts_only).unwrap_err();
        assert!(err.message.contains("MAX_TOKENS"));

        assert!(parse_response(RemotePhase::Reasoning, "<html>").is_err());
    }

    #[test]
    fn test_status_classification() {
        let body = r#"{"error": {"code": 429, "message": "Resource has been exhausted"}}"#;
        match classify_status(RemotePhase::Extraction, 429, body) {
            RemoteError::Transport(e) => {
                assert_eq!(e.status, Some(429));
                assert_eq!(e.message, "Resource has been exhausted");
            }
            other => panic!("expected transport error, got {other:?}"),
        }

        assert!(matches!(
            classify_status(RemotePhase::Reasoning, 503, "unavailable"),
            RemoteError::Transport(_)
        ));
        assert!(matches!(
            classify_status(RemotePhase::Reasoning, 400, "{}"),
            RemoteError::Protocol(_)
        ));
    }
}
