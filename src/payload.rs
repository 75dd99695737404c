//! Payload Builder: assembles a validated, deterministically-serialized
//! request from conversation history, tool definitions, and sampling
//! parameters.
//!
//! Grounded on the teacher's `AgentOptionsBuilder` (`Option<T>` field
//! tracking validated in `build()`) and the OpenAI request shape in
//! `types.rs`.

use crate::error::{Error, Result};
use crate::tools::Tool;
use crate::types::{
    Content, ModelName, OpenAIContent, OpenAIContentPart, OpenAIImageUrl, OpenAIMessage,
    OpenAIRequest, OpenAIToolCall, OpenAIFunction, ResponseInputItem, Role, Temperature, ToolChoice,
    TopP,
};
use serde_json::Value;

/// A validated request ready to serialize onto the wire. Produced only by
/// `PayloadBuilder::build`, which enforces every invariant below.
#[derive(Debug, Clone)]
pub struct RequestPayload {
    pub model: ModelName,
    pub input: Vec<ResponseInputItem>,
    pub tools: Vec<Tool>,
    pub tool_choice: ToolChoice,
    pub temperature: Option<Temperature>,
    pub top_p: Option<TopP>,
    pub max_output_tokens: Option<u32>,
    pub response_schema: Option<Value>,
    pub stream: bool,
}

impl RequestPayload {
    /// Render to the OpenAI-compatible wire shape used by `Responder`.
    ///
    /// Serialization order is fixed (model, messages, stream, then the
    /// sampling knobs in declaration order) so that two builds of the same
    /// logical payload produce byte-identical JSON.
    pub fn to_wire(&self) -> OpenAIRequest {
        let messages = self.input.iter().map(input_item_to_wire).collect();
        let tools = if self.tools.is_empty() {
            None
        } else {
            Some(self.tools.iter().map(Tool::to_openai_format).collect())
        };
        let tool_choice = match &self.tool_choice {
            ToolChoice::Auto if self.tools.is_empty() => None,
            ToolChoice::Auto => Some(Value::String("auto".to_string())),
            ToolChoice::None => Some(Value::String("none".to_string())),
            ToolChoice::Required => Some(Value::String("required".to_string())),
            ToolChoice::Named(name) => Some(serde_json::json!({
                "type": "function",
                "function": { "name": name },
            })),
        };
        let response_format = self.response_schema.as_ref().map(|schema| {
            serde_json::json!({
                "type": "json_schema",
                "json_schema": { "name": "response", "strict": true, "schema": schema },
            })
        });

        OpenAIRequest {
            model: self.model.as_str().to_string(),
            messages,
            stream: self.stream,
            max_tokens: self.max_output_tokens,
            temperature: self.temperature.as_ref().map(Temperature::value),
            top_p: self.top_p.as_ref().map(TopP::value),
            presence_penalty: None,
            frequency_penalty: None,
            user: None,
            tools,
            tool_choice,
            response_format,
        }
    }
}

/// Convert one history item into wire messages. A `FunctionToolCall` on its
/// own (no matching output yet) becomes an assistant message carrying
/// `tool_calls`; a `FunctionToolCallOutput` becomes a `tool`-role message
/// keyed by `tool_call_id`. This fixes the teacher's lossy round-trip,
/// which dropped `tool_calls`/`tool_call_id` entirely.
fn input_item_to_wire(item: &ResponseInputItem) -> OpenAIMessage {
    match item {
        ResponseInputItem::Message { role, contents } => OpenAIMessage {
            role: role_to_wire(*role).to_string(),
            content: Some(contents_to_wire(contents)),
            tool_calls: None,
            tool_call_id: None,
        },
        ResponseInputItem::FunctionToolCall { call_id, name, arguments_json } => OpenAIMessage {
            role: "assistant".to_string(),
            content: None,
            tool_calls: Some(vec![OpenAIToolCall {
                id: call_id.clone(),
                call_type: "function".to_string(),
                function: OpenAIFunction { name: name.clone(), arguments: arguments_json.clone() },
            }]),
            tool_call_id: None,
        },
        ResponseInputItem::FunctionToolCallOutput { call_id, output, .. } => OpenAIMessage {
            role: "tool".to_string(),
            content: Some(OpenAIContent::Text(output.clone())),
            tool_calls: None,
            tool_call_id: Some(call_id.clone()),
        },
    }
}

fn role_to_wire(role: Role) -> &'static str {
    match role {
        Role::Developer => "developer",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn contents_to_wire(contents: &[Content]) -> OpenAIContent {
    if contents.len() == 1 {
        if let Content::Text { text } = &contents[0] {
            return OpenAIContent::Text(text.clone());
        }
    }
    OpenAIContent::Parts(
        contents
            .iter()
            .map(|c| match c {
                Content::Text { text } => OpenAIContentPart::Text { text: text.clone() },
                Content::Image { url, detail } => OpenAIContentPart::ImageUrl {
                    image_url: OpenAIImageUrl {
                        url: url.clone(),
                        detail: Some(
                            match detail {
                                crate::types::ImageDetail::Low => "low",
                                crate::types::ImageDetail::High => "high",
                                crate::types::ImageDetail::Auto => "auto",
                            }
                            .to_string(),
                        ),
                    },
                },
            })
            .collect(),
    )
}

/// Builder for a [`RequestPayload`]. Mirrors the teacher's
/// `AgentOptionsBuilder`: every setter takes `self` by value and returns
/// `Self`, and `build()` is where validation happens, not the setters.
#[derive(Debug, Clone, Default)]
pub struct PayloadBuilder {
    model: Option<String>,
    input: Vec<ResponseInputItem>,
    tools: Vec<Tool>,
    tool_choice: ToolChoice,
    temperature: Option<f32>,
    top_p: Option<f32>,
    max_output_tokens: Option<u32>,
    response_schema: Option<Value>,
    stream: bool,
}

impl PayloadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn input(mut self, input: Vec<ResponseInputItem>) -> Self {
        self.input = input;
        self
    }

    pub fn push_input(mut self, item: ResponseInputItem) -> Self {
        self.input.push(item);
        self
    }

    pub fn tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = choice;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }

    pub fn response_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Validate and assemble the payload.
    ///
    /// Invariants enforced here (not in the setters):
    /// - `model` is set and non-empty
    /// - `temperature`, if set, lies in `[0.0, 2.0]`
    /// - `top_p`, if set, lies in `[0.0, 1.0]`
    /// - tool names are unique
    pub fn build(self) -> Result<RequestPayload> {
        let model_raw = self.model.ok_or_else(|| {
            Error::invalid_request("payload requires a model").with_suggestion("call .model(...) before build()")
        })?;
        let model = ModelName::new(model_raw).map_err(Error::invalid_request)?;

        let temperature = self
            .temperature
            .map(Temperature::new)
            .transpose()
            .map_err(Error::invalid_request)?;
        let top_p = self.top_p.map(TopP::new).transpose().map_err(Error::invalid_request)?;

        let mut seen = std::collections::HashSet::new();
        for tool in &self.tools {
            if !seen.insert(tool.name().to_string()) {
                return Err(Error::invalid_request(format!("duplicate tool name: {}", tool.name())));
            }
        }

        Ok(RequestPayload {
            model,
            input: self.input,
            tools: self.tools,
            tool_choice: self.tool_choice,
            temperature,
            top_p,
            max_output_tokens: self.max_output_tokens,
            response_schema: self.response_schema,
            stream: self.stream,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_model() {
        let result = PayloadBuilder::new().build();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_rejects_out_of_range_temperature() {
        let result = PayloadBuilder::new().model("gpt-4").temperature(3.0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_rejects_duplicate_tool_names() {
        let tool_a = crate::tools::tool("lookup", "look something up")
            .build(|_args| Box::pin(async move { Ok(serde_json::json!({})) }));
        let tool_b = crate::tools::tool("lookup", "a different lookup")
            .build(|_args| Box::pin(async move { Ok(serde_json::json!({})) }));
        let result = PayloadBuilder::new().model("gpt-4").tools(vec![tool_a, tool_b]).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_tool_call_round_trips_through_wire() {
        let payload = PayloadBuilder::new()
            .model("gpt-4")
            .input(vec![
                ResponseInputItem::user_text("what's 2+2?"),
                ResponseInputItem::tool_call("call_1", "add", r#"{"a":2,"b":2}"#),
                ResponseInputItem::tool_output("call_1", "4", false),
            ])
            .build()
            .unwrap();
        let wire = payload.to_wire();
        assert_eq!(wire.messages.len(), 3);
        assert_eq!(wire.messages[1].role, "assistant");
        assert!(wire.messages[1].tool_calls.is_some());
        assert_eq!(wire.messages[2].role, "tool");
        assert_eq!(wire.messages[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_same_payload_serializes_deterministically() {
        let build = || {
            PayloadBuilder::new()
                .model("gpt-4")
                .input(vec![ResponseInputItem::user_text("hi")])
                .temperature(0.5)
                .build()
                .unwrap()
                .to_wire()
        };
        let a = serde_json::to_string(&build()).unwrap();
        let b = serde_json::to_string(&build()).unwrap();
        assert_eq!(a, b);
    }
}
