//! Core data model: the sum types from which a conversation, a response, and
//! a streamed event are built.
//!
//! Three layers live here:
//! - the logical model (`ResponseInputItem`, `Content`, `Response`,
//!   `StreamEvent`, `Usage`) that application code and the agentic loop work
//!   with;
//! - small validated newtypes (`ModelName`, `BaseUrl`, `Temperature`,
//!   `TopP`) kept from the teacher's construction-time validation idiom;
//! - the OpenAI-compatible wire shapes the Responder serializes to and
//!   parses from, kept close to the teacher's `OpenAI*` structs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ============================================================================
// VALIDATED NEWTYPES
// ============================================================================

/// A validated, non-empty model name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelName(String);

impl ModelName {
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("model name must not be empty".to_string());
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated base URL (must begin with `http://` or `https://`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseUrl(String);

impl BaseUrl {
    pub fn new(url: impl Into<String>) -> Result<Self, String> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(format!("base url must start with http:// or https://, got: {url}"));
        }
        Ok(Self(url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated sampling temperature, constrained to `[0.0, 2.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Temperature(f32);

impl Temperature {
    pub fn new(value: f32) -> Result<Self, String> {
        if !(0.0..=2.0).contains(&value) {
            return Err(format!("temperature must be in [0.0, 2.0], got: {value}"));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}

/// A validated top-p, constrained to `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopP(f32);

impl TopP {
    pub fn new(value: f32) -> Result<Self, String> {
        if !(0.0..=1.0).contains(&value) {
            return Err(format!("top_p must be in [0.0, 1.0], got: {value}"));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}

// ============================================================================
// LOGICAL DATA MODEL
// ============================================================================

/// A conversation role for a `Message` item. The teacher's `System` role is
/// renamed `Developer` here to match the non-user, non-assistant steering
/// message this runtime passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Developer,
    User,
    Assistant,
}

/// Detail level for an image content part; each level has a fixed token
/// cost assigned by the context-window manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Low,
    High,
    #[default]
    Auto,
}

impl ImageDetail {
    /// Fixed per-detail-level token estimate.
    pub fn token_cost(self) -> usize {
        match self {
            ImageDetail::Low => 85,
            ImageDetail::High => 765,
            ImageDetail::Auto => 170,
        }
    }
}

/// One unit of content within a `Message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text { text: String },
    Image {
        /// Either an `http(s)://` URL or a `data:` URI (base64-encoded).
        url: String,
        #[serde(default)]
        detail: ImageDetail,
    },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>, detail: ImageDetail) -> Self {
        Content::Image { url: url.into(), detail }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text { text } => Some(text),
            Content::Image { .. } => None,
        }
    }
}

/// One item of conversation history. Insertion order is conversation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseInputItem {
    Message {
        role: Role,
        contents: Vec<Content>,
    },
    FunctionToolCall {
        call_id: String,
        name: String,
        arguments_json: String,
    },
    FunctionToolCallOutput {
        call_id: String,
        output: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ResponseInputItem {
    pub fn message(role: Role, contents: Vec<Content>) -> Self {
        ResponseInputItem::Message { role, contents }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        ResponseInputItem::Message {
            role: Role::User,
            contents: vec![Content::text(text)],
        }
    }

    pub fn developer_text(text: impl Into<String>) -> Self {
        ResponseInputItem::Message {
            role: Role::Developer,
            contents: vec![Content::text(text)],
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        ResponseInputItem::Message {
            role: Role::Assistant,
            contents: vec![Content::text(text)],
        }
    }

    pub fn tool_call(call_id: impl Into<String>, name: impl Into<String>, arguments_json: impl Into<String>) -> Self {
        ResponseInputItem::FunctionToolCall {
            call_id: call_id.into(),
            name: name.into(),
            arguments_json: arguments_json.into(),
        }
    }

    pub fn tool_output(call_id: impl Into<String>, output: impl Into<String>, is_error: bool) -> Self {
        ResponseInputItem::FunctionToolCallOutput {
            call_id: call_id.into(),
            output: output.into(),
            is_error,
        }
    }

    /// The `callId` this item carries, if any (tool calls and tool outputs).
    pub fn call_id(&self) -> Option<&str> {
        match self {
            ResponseInputItem::FunctionToolCall { call_id, .. } => Some(call_id),
            ResponseInputItem::FunctionToolCallOutput { call_id, .. } => Some(call_id),
            ResponseInputItem::Message { .. } => None,
        }
    }

    /// Concatenated text of a `Message` item's contents, if this is one.
    pub fn text(&self) -> Option<String> {
        match self {
            ResponseInputItem::Message { contents, .. } => Some(
                contents
                    .iter()
                    .filter_map(Content::as_text)
                    .collect::<Vec<_>>()
                    .join(""),
            ),
            _ => None,
        }
    }
}

/// Token usage for one LLM call.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    /// Provider-specific; populated only by a `TelemetryProcessor` that
    /// knows the provider's pricing. `None` otherwise.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cost_usd: Option<f64>,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            cost_usd: None,
        }
    }

    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
        if let Some(c) = other.cost_usd {
            *self.cost_usd.get_or_insert(0.0) += c;
        }
    }
}

/// One item of a completed response's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseOutputItem {
    AssistantMessage { contents: Vec<Content> },
    FunctionToolCall {
        call_id: String,
        name: String,
        arguments_json: String,
    },
}

impl ResponseOutputItem {
    pub fn as_tool_call(&self) -> Option<(&str, &str, &str)> {
        match self {
            ResponseOutputItem::FunctionToolCall { call_id, name, arguments_json } => {
                Some((call_id, name, arguments_json))
            }
            ResponseOutputItem::AssistantMessage { .. } => None,
        }
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self, ResponseOutputItem::FunctionToolCall { .. })
    }
}

/// A fully parsed, non-streamed LLM response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub model: String,
    pub created_at_epoch_seconds: i64,
    pub output: Vec<ResponseOutputItem>,
    pub usage: Usage,
}

impl Response {
    /// Concatenated text of all `AssistantMessage` contents in `output`.
    pub fn output_text(&self) -> String {
        self.output
            .iter()
            .filter_map(|item| match item {
                ResponseOutputItem::AssistantMessage { contents } => Some(
                    contents
                        .iter()
                        .filter_map(Content::as_text)
                        .collect::<Vec<_>>()
                        .join(""),
                ),
                ResponseOutputItem::FunctionToolCall { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Tool calls present in this response's output, in emission order.
    pub fn tool_calls(&self) -> Vec<(&str, &str, &str)> {
        self.output.iter().filter_map(ResponseOutputItem::as_tool_call).collect()
    }

    /// True when the output contains no tool calls, i.e. a candidate final
    /// answer.
    pub fn is_final_answer(&self) -> bool {
        !self.output.iter().any(ResponseOutputItem::is_tool_call)
    }
}

/// Lightweight summary of an outgoing request, passed to
/// `TelemetryProcessor::on_request_start` without exposing full payload
/// contents (which may carry sensitive conversation text).
#[derive(Debug, Clone)]
pub struct RequestPayloadSummary {
    pub model: String,
    pub tool_count: usize,
    pub streaming: bool,
}

/// A `Response` additionally carrying a value decoded against a requested
/// structured-output schema.
#[derive(Debug, Clone)]
pub struct ParsedResponse<T> {
    pub response: Response,
    pub parsed: T,
}

/// Events observed on the SSE channel, in causal order per `call_id`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    TextDelta(String),
    ToolCallStart { call_id: String, name: String },
    ToolCallArgumentsDelta { call_id: String, json_fragment: String },
    ToolCallDone { call_id: String },
    Completed(Response),
    Error { message: String, status_code: Option<u16> },
}

/// `toolChoice` on a payload: let the model decide, forbid tools, require
/// a tool call, or force a specific named tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    Named(String),
}

impl Default for ToolChoice {
    fn default() -> Self {
        ToolChoice::Auto
    }
}

// ============================================================================
// OPENAI-COMPATIBLE WIRE SHAPES
// ============================================================================
//
// These mirror the teacher's `types.rs` wire structs. The Payload Builder
// (`payload.rs`) and Responder (`responder.rs`) translate the logical model
// above to and from these shapes; application code never sees them directly.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenAIContent {
    Text(String),
    Parts(Vec<OpenAIContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAIContentPart {
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: OpenAIImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<OpenAIContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: OpenAIFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIFunction {
    pub name: String,
    /// A JSON-encoded string, per the OpenAI wire quirk.
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAIRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIChunk {
    #[allow(dead_code)]
    pub id: String,
    #[allow(dead_code)]
    pub object: String,
    #[allow(dead_code)]
    pub created: i64,
    pub model: String,
    pub choices: Vec<OpenAIChoice>,
    #[serde(default)]
    pub usage: Option<OpenAIUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIChoice {
    pub index: u32,
    pub delta: OpenAIDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAIDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<OpenAIToolCallDelta>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIToolCallDelta {
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub call_type: Option<String>,
    #[serde(default)]
    pub function: Option<OpenAIFunctionDelta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAIFunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// A non-streamed response in the OpenAI `chat/completions` shape, as
/// returned by `Responder::respond`'s buffered HTTP call.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAICompletion {
    pub id: String,
    pub model: String,
    pub created: i64,
    pub choices: Vec<OpenAICompletionChoice>,
    #[serde(default)]
    pub usage: Option<OpenAIUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAICompletionChoice {
    pub message: OpenAICompletionMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAICompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<OpenAIToolCall>>,
}
