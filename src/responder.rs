//! Responder: an immutable, `Arc`-shareable HTTP client for one
//! chat-completions endpoint, covering both buffered and streaming calls.
//!
//! Grounded on the teacher's `client.rs::query`/`Client::send` (request
//! building, response status handling, SSE wiring), generalized off
//! `Client`'s ad-hoc per-call logic into a value that's safe to share across
//! concurrent interactions and carries retry/telemetry as first-class
//! concerns instead of being hand-wired into every call site.

use crate::error::{Error, ErrorKind, Result};
use crate::payload::RequestPayload;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::sse::{parse_sse_stream, StreamAggregator};
use crate::telemetry::{RequestOutcome, TelemetryDispatcher};
use crate::types::{
    BaseUrl, Content, OpenAIChunk, OpenAICompletion, OpenAIRequest, OpenAIUsage,
    RequestPayloadSummary, Response, ResponseOutputItem, StreamEvent, Usage,
};
use futures::stream::{self, Stream, StreamExt};
use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::time::{Duration, Instant};

/// Immutable, concurrency-safe client bound to one base URL and API key.
/// Safe to wrap in an `Arc` and share across concurrently-running agents.
pub struct Responder {
    http_client: reqwest::Client,
    base_url: BaseUrl,
    api_key: String,
    retry_config: RetryConfig,
    telemetry: TelemetryDispatcher,
}

impl Responder {
    pub fn new(base_url: BaseUrl, api_key: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http_client,
            base_url,
            api_key: api_key.into(),
            retry_config: RetryConfig::default(),
            telemetry: TelemetryDispatcher::default(),
        })
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryDispatcher) -> Self {
        self.telemetry = telemetry;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.as_str())
    }

    /// Send one request, returning the raw response on a 2xx status and a
    /// classified [`Error`] otherwise. On a 429/503 carrying a `Retry-After`
    /// header, the header's delay-seconds value is appended to the error
    /// message as `retry_after_secs=N`, the convention `retry.rs` looks for
    /// since `reqwest::Error` doesn't expose headers once consumed.
    async fn post(&self, wire: &OpenAIRequest) -> Result<reqwest::Response> {
        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(wire)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_else(|_| "<no body>".to_string());

        let kind = match status.as_u16() {
            429 => ErrorKind::RateLimit,
            401 | 403 => ErrorKind::Authentication,
            s if (500..600).contains(&s) => ErrorKind::Server,
            _ => ErrorKind::InvalidRequest,
        };
        let mut message = format!("{status}: {body}");
        if let Some(secs) = retry_after {
            message.push_str(&format!(" retry_after_secs={secs}"));
        }
        Err(Error::new(kind, message))
    }

    /// Buffered (non-streaming) call: retries transient failures, then
    /// parses the full completion body into a [`Response`].
    pub async fn respond(&self, payload: &RequestPayload) -> Result<Response> {
        let summary = RequestPayloadSummary {
            model: payload.model.as_str().to_string(),
            tool_count: payload.tools.len(),
            streaming: false,
        };
        self.telemetry.request_start(&summary).await;

        let mut wire = payload.to_wire();
        wire.stream = false;
        let started = Instant::now();
        let attempt_used = Cell::new(1u32);

        let config = self.retry_config.clone();
        let result = retry_with_backoff(config, |attempt| {
            attempt_used.set(attempt);
            let wire = &wire;
            async move {
                match self.post(wire).await {
                    Ok(response) => response.json::<OpenAICompletion>().await.map_err(Error::from),
                    Err(err) => {
                        self.telemetry.request_error(&err.kind.to_string(), attempt).await;
                        Err(err)
                    }
                }
            }
        })
        .await;

        match result {
            Ok(completion) => {
                let response = completion_to_response(completion);
                let outcome = RequestOutcome {
                    model: response.model.clone(),
                    duration: started.elapsed(),
                    usage: Some(response.usage.clone()),
                    attempt: attempt_used.get(),
                };
                self.telemetry.request_complete(&outcome).await;
                Ok(response)
            }
            Err(err) => Err(err),
        }
    }

    /// Streaming call: the initial connection (and its status check) is
    /// retried like `respond`; once events start flowing, a mid-stream
    /// failure ends the stream with a [`StreamEvent::Error`] rather than
    /// silently re-sending the whole request.
    pub async fn respond_stream(&self, payload: &RequestPayload) -> Result<ResponseStream> {
        let summary = RequestPayloadSummary {
            model: payload.model.as_str().to_string(),
            tool_count: payload.tools.len(),
            streaming: true,
        };
        self.telemetry.request_start(&summary).await;

        let mut wire = payload.to_wire();
        wire.stream = true;
        let model = payload.model.as_str().to_string();
        let started = Instant::now();

        let config = self.retry_config.clone();
        let response = retry_with_backoff(config, |attempt| {
            let wire = &wire;
            async move {
                match self.post(wire).await {
                    Ok(response) => Ok(response),
                    Err(err) => {
                        self.telemetry.request_error(&err.kind.to_string(), attempt).await;
                        Err(err)
                    }
                }
            }
        })
        .await?;

        let chunks = parse_sse_stream(response);
        let state = StreamState {
            chunks,
            aggregator: StreamAggregator::new(),
            pending: VecDeque::new(),
            text_acc: String::new(),
            tool_calls_acc: HashMap::new(),
            call_order: Vec::new(),
            model,
            response_id: String::new(),
            created_at_epoch_seconds: 0,
            final_usage: None,
            telemetry: self.telemetry.clone(),
            started,
            done: false,
        };

        Ok(ResponseStream { inner: Box::pin(stream::unfold(state, next_stream_item)) })
    }
}

fn completion_to_response(completion: OpenAICompletion) -> Response {
    let mut output = Vec::new();

    if let Some(choice) = completion.choices.into_iter().next() {
        let message = choice.message;
        if let Some(content) = message.content {
            if !content.is_empty() {
                output.push(ResponseOutputItem::AssistantMessage { contents: vec![Content::text(content)] });
            }
        }
        if let Some(tool_calls) = message.tool_calls {
            for call in tool_calls {
                output.push(ResponseOutputItem::FunctionToolCall {
                    call_id: call.id,
                    name: call.function.name,
                    arguments_json: call.function.arguments,
                });
            }
        }
    }

    let usage = completion
        .usage
        .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_else(|| Usage::new(0, 0));

    Response { id: completion.id, model: completion.model, created_at_epoch_seconds: completion.created, output, usage }
}

/// A handle over an in-flight streaming call. Implements [`Stream`]
/// directly, or can be consumed explicitly via [`ResponseStream::start`].
pub struct ResponseStream {
    inner: Pin<Box<dyn Stream<Item = StreamEvent> + Send>>,
}

impl ResponseStream {
    /// Consume the handle and hand back the underlying event stream.
    pub fn start(self) -> Pin<Box<dyn Stream<Item = StreamEvent> + Send>> {
        self.inner
    }
}

impl Stream for ResponseStream {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.inner.as_mut().poll_next(cx)
    }
}

struct StreamState {
    chunks: Pin<Box<dyn Stream<Item = Result<OpenAIChunk>> + Send>>,
    aggregator: StreamAggregator,
    pending: VecDeque<StreamEvent>,
    /// Accumulated across the whole turn, to synthesize `Completed`'s
    /// `Response` once the stream ends.
    text_acc: String,
    tool_calls_acc: HashMap<String, (String, String)>,
    call_order: Vec<String>,
    model: String,
    response_id: String,
    created_at_epoch_seconds: i64,
    final_usage: Option<OpenAIUsage>,
    telemetry: TelemetryDispatcher,
    started: Instant,
    done: bool,
}

fn track_event(state: &mut StreamState, event: &StreamEvent) {
    match event {
        StreamEvent::TextDelta(text) => state.text_acc.push_str(text),
        StreamEvent::ToolCallStart { call_id, name } => {
            state.tool_calls_acc.entry(call_id.clone()).or_insert_with(|| (name.clone(), String::new()));
            state.call_order.push(call_id.clone());
        }
        StreamEvent::ToolCallArgumentsDelta { call_id, json_fragment } => {
            if let Some(entry) = state.tool_calls_acc.get_mut(call_id) {
                entry.1.push_str(json_fragment);
            }
        }
        StreamEvent::ToolCallDone { .. } | StreamEvent::Completed(_) | StreamEvent::Error { .. } => {}
    }
}

fn build_final_response(state: &StreamState) -> Response {
    let mut output = Vec::new();
    if !state.text_acc.is_empty() {
        output.push(ResponseOutputItem::AssistantMessage { contents: vec![Content::text(state.text_acc.clone())] });
    }
    for call_id in &state.call_order {
        if let Some((name, arguments)) = state.tool_calls_acc.get(call_id) {
            output.push(ResponseOutputItem::FunctionToolCall {
                call_id: call_id.clone(),
                name: name.clone(),
                arguments_json: arguments.clone(),
            });
        }
    }
    let usage = state
        .final_usage
        .as_ref()
        .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_else(|| Usage::new(0, 0));
    Response {
        id: state.response_id.clone(),
        model: state.model.clone(),
        created_at_epoch_seconds: state.created_at_epoch_seconds,
        output,
        usage,
    }
}

async fn next_stream_item(mut state: StreamState) -> Option<(StreamEvent, StreamState)> {
    loop {
        if let Some(event) = state.pending.pop_front() {
            track_event(&mut state, &event);
            return Some((event, state));
        }
        if state.done {
            return None;
        }

        match state.chunks.next().await {
            Some(Ok(chunk)) => {
                if state.response_id.is_empty() {
                    state.response_id = chunk.id.clone();
                    state.created_at_epoch_seconds = chunk.created;
                }
                if !chunk.model.is_empty() {
                    state.model = chunk.model.clone();
                }
                if chunk.usage.is_some() {
                    state.final_usage = chunk.usage.clone();
                }
                match state.aggregator.process_chunk(chunk) {
                    Ok(events) => {
                        state.pending.extend(events);
                        continue;
                    }
                    Err(err) => {
                        state.done = true;
                        return Some((StreamEvent::Error { message: err.message, status_code: None }, state));
                    }
                }
            }
            Some(Err(err)) => {
                state.done = true;
                self_report_stream_error(&state, &err).await;
                return Some((StreamEvent::Error { message: err.message, status_code: None }, state));
            }
            None => {
                state.done = true;
                let response = build_final_response(&state);
                let outcome = RequestOutcome {
                    model: response.model.clone(),
                    duration: state.started.elapsed(),
                    usage: Some(response.usage.clone()),
                    attempt: 1,
                };
                state.telemetry.request_complete(&outcome).await;
                return Some((StreamEvent::Completed(response), state));
            }
        }
    }
}

async fn self_report_stream_error(state: &StreamState, err: &Error) {
    state.telemetry.request_error(&err.kind.to_string(), 1).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PayloadBuilder;
    use crate::types::ResponseInputItem;
    use futures::StreamExt as _;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn responder_for(server: &MockServer) -> Responder {
        Responder::new(BaseUrl::new(server.uri()).unwrap(), "test-key").unwrap()
    }

    fn payload() -> RequestPayload {
        PayloadBuilder::new().model("gpt-4").input(vec![ResponseInputItem::user_text("hi")]).build().unwrap()
    }

    #[tokio::test]
    async fn test_respond_parses_buffered_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "resp_1",
                "model": "gpt-4",
                "created": 1700000000,
                "choices": [{"message": {"content": "hello there", "tool_calls": null}}],
                "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
            })))
            .mount(&server)
            .await;

        let responder = responder_for(&server);
        let response = responder.respond(&payload()).await.unwrap();
        assert_eq!(response.output_text(), "hello there");
        assert_eq!(response.usage.input_tokens, 5);
    }

    #[tokio::test]
    async fn test_respond_retries_on_server_error_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "resp_2",
                "model": "gpt-4",
                "created": 0,
                "choices": [{"message": {"content": "ok", "tool_calls": null}}],
                "usage": null
            })))
            .mount(&server)
            .await;

        let responder = responder_for(&server)
            .with_retry_config(RetryConfig::new().with_max_attempts(3).with_initial_delay(Duration::from_millis(1)));
        let response = responder.respond(&payload()).await.unwrap();
        assert_eq!(response.output_text(), "ok");
    }

    #[tokio::test]
    async fn test_respond_does_not_retry_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .expect(1)
            .mount(&server)
            .await;

        let responder = responder_for(&server)
            .with_retry_config(RetryConfig::new().with_max_attempts(3).with_initial_delay(Duration::from_millis(1)));
        let err = responder.respond(&payload()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_respond_carries_retry_after_into_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7").set_body_string("slow down"))
            .mount(&server)
            .await;

        let responder = responder_for(&server).with_retry_config(RetryConfig::new().with_max_attempts(1));
        let err = responder.respond(&payload()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimit);
        assert!(err.message.contains("retry_after_secs=7"));
    }

    #[tokio::test]
    async fn test_respond_stream_emits_text_and_completed() {
        let server = MockServer::start().await;
        let body = "data: {\"id\":\"s1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hi\"},\"finish_reason\":null}]}\n\n\
                    data: {\"id\":\"s1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n\
                    data: [DONE]\n\n";
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let responder = responder_for(&server);
        let handle = responder.respond_stream(&payload()).await.unwrap();
        let events: Vec<StreamEvent> = handle.start().collect().await;

        assert!(events.iter().any(|e| matches!(e, StreamEvent::TextDelta(t) if t == "Hi")));
        assert!(events.iter().any(|e| matches!(e, StreamEvent::Completed(r) if r.output_text() == "Hi")));
    }
}
