//! Server-Sent Events parsing and streaming tool-call aggregation.
//!
//! Generalizes the teacher's `parse_sse_stream`/`ToolCallAggregator` pair in
//! two ways:
//!
//! - [`parse_sse_stream`] buffers bytes across `bytes_stream()` polls instead
//!   of scanning each chunk independently, so an event split across an HTTP
//!   chunk boundary (e.g. `data: {"i` arriving in one poll and `d":1}\n\n` in
//!   the next) is reassembled rather than silently dropped. It also follows
//!   the SSE field grammar more closely: `:`-prefixed comment/heartbeat
//!   lines are skipped, and multiple `data:` lines belonging to the same
//!   event are joined with `\n` before parsing, rather than assuming exactly
//!   one `data:` line per chunk.
//! - [`StreamAggregator`] emits [`StreamEvent`]s incrementally as deltas
//!   arrive, rather than buffering silently until `finish_reason` and
//!   returning a batch. Callers that want the teacher's buffered behavior
//!   can simply collect events until [`StreamEvent::ToolCallDone`]/text
//!   completion themselves.

use crate::error::{Error, Result};
use crate::types::{OpenAIChunk, StreamEvent};
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::pin::Pin;

struct SseState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    carry: String,
    data_lines: Vec<String>,
    done: bool,
}

enum LineOutcome {
    Continue,
    Event(Result<OpenAIChunk>),
}

fn handle_line(state: &mut SseState, line: &str) -> LineOutcome {
    if line.is_empty() {
        if state.data_lines.is_empty() {
            return LineOutcome::Continue;
        }
        let payload = state.data_lines.join("\n");
        state.data_lines.clear();
        if payload == "[DONE]" {
            state.done = true;
            return LineOutcome::Continue;
        }
        let chunk = serde_json::from_str(&payload)
            .map_err(|e| Error::streaming(format!("failed to parse SSE chunk: {e}")));
        return LineOutcome::Event(chunk);
    }

    if line.starts_with(':') {
        // Comment / heartbeat line, per the SSE spec. Ignored.
        return LineOutcome::Continue;
    }

    if let Some(rest) = line.strip_prefix("data:") {
        let rest = rest.strip_prefix(' ').unwrap_or(rest);
        state.data_lines.push(rest.to_string());
    }
    // Other fields (`event:`, `id:`, `retry:`) carry no meaning for this
    // API and are ignored rather than rejected, so future additions don't
    // break parsing.
    LineOutcome::Continue
}

async fn next_event(mut state: SseState) -> Option<(Result<OpenAIChunk>, SseState)> {
    loop {
        if state.done {
            return None;
        }

        if let Some(pos) = state.carry.find('\n') {
            let mut line: String = state.carry.drain(..=pos).collect();
            line.pop(); // drop the '\n' just drained
            if line.ends_with('\r') {
                line.pop();
            }
            match handle_line(&mut state, &line) {
                LineOutcome::Continue => continue,
                LineOutcome::Event(result) => return Some((result, state)),
            }
        }

        match state.body.next().await {
            Some(Ok(bytes)) => {
                state.carry.push_str(&String::from_utf8_lossy(&bytes));
                continue;
            }
            Some(Err(e)) => {
                state.done = true;
                return Some((Err(Error::from(e)), state));
            }
            None => {
                state.done = true;
                if state.carry.is_empty() {
                    return None;
                }
                let line = std::mem::take(&mut state.carry);
                match handle_line(&mut state, &line) {
                    LineOutcome::Event(result) => return Some((result, state)),
                    LineOutcome::Continue => return None,
                }
            }
        }
    }
}

/// Turns a raw streaming HTTP response into a stream of parsed [`OpenAIChunk`]s.
pub fn parse_sse_stream(response: reqwest::Response) -> Pin<Box<dyn Stream<Item = Result<OpenAIChunk>> + Send>> {
    parse_sse_bytes(response.bytes_stream())
}

/// Core of [`parse_sse_stream`], generic over the byte stream so it can be
/// exercised directly with synthetic chunk boundaries in tests.
fn parse_sse_bytes<B>(body: B) -> Pin<Box<dyn Stream<Item = Result<OpenAIChunk>> + Send>>
where
    B: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let state = SseState { body: body.boxed(), carry: String::new(), data_lines: Vec::new(), done: false };
    Box::pin(stream::unfold(state, next_event))
}

/// An in-progress tool call being assembled from argument deltas.
#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Accumulates per-chunk deltas into [`StreamEvent`]s, emitted as soon as
/// enough information is available rather than only at `finish_reason`.
///
/// One aggregator is scoped to a single turn; `finish_reason` resets its
/// internal state so the same instance can't accidentally be reused to
/// straddle two turns.
#[derive(Debug, Default)]
pub struct StreamAggregator {
    tool_calls: HashMap<u32, PartialToolCall>,
    started: HashSet<u32>,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes one chunk, returning zero or more events in arrival order.
    pub fn process_chunk(&mut self, chunk: OpenAIChunk) -> Result<Vec<StreamEvent>> {
        let mut events = Vec::new();

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    events.push(StreamEvent::TextDelta(content));
                }
            }

            if let Some(tool_calls) = choice.delta.tool_calls {
                for delta in tool_calls {
                    let index = delta.index;
                    let entry = self.tool_calls.entry(index).or_default();

                    if let Some(id) = delta.id {
                        entry.id = Some(id);
                    }
                    if let Some(function) = delta.function {
                        if let Some(name) = function.name {
                            entry.name = Some(name);
                        }
                        if let Some(args) = function.arguments {
                            if !args.is_empty() {
                                entry.arguments.push_str(&args);
                                if let Some(call_id) = entry.id.clone() {
                                    events.push(StreamEvent::ToolCallArgumentsDelta { call_id, json_fragment: args });
                                }
                            }
                        }
                    }

                    if !self.started.contains(&index) {
                        if let (Some(call_id), Some(name)) = (entry.id.clone(), entry.name.clone()) {
                            events.push(StreamEvent::ToolCallStart { call_id, name });
                            self.started.insert(index);
                        }
                    }
                }
            }

            if choice.finish_reason.is_some() {
                let mut indices: Vec<u32> = self.tool_calls.keys().copied().collect();
                indices.sort_unstable();
                for index in indices {
                    if let Some(partial) = self.tool_calls.remove(&index) {
                        if let Some(call_id) = partial.id {
                            events.push(StreamEvent::ToolCallDone { call_id });
                        }
                    }
                }
                self.started.clear();
            }
        }

        Ok(events)
    }

    /// Parses the fully-accumulated argument JSON for a finished tool call.
    /// Returns an empty object for tool calls with no arguments emitted.
    pub fn finished_call_ids(&self) -> Vec<String> {
        self.tool_calls.values().filter_map(|p| p.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OpenAIChoice, OpenAIDelta, OpenAIFunctionDelta, OpenAIToolCallDelta};
    use futures::StreamExt as _;

    fn chunk(choices: Vec<OpenAIChoice>) -> OpenAIChunk {
        OpenAIChunk { id: "c".into(), object: "chat.completion.chunk".into(), created: 0, model: "m".into(), choices, usage: None }
    }

    #[test]
    fn test_text_delta_emitted_immediately() {
        let mut agg = StreamAggregator::new();
        let events = agg
            .process_chunk(chunk(vec![OpenAIChoice {
                index: 0,
                delta: OpenAIDelta { role: None, content: Some("Hello".into()), tool_calls: None },
                finish_reason: None,
            }]))
            .unwrap();
        assert_eq!(events, vec![StreamEvent::TextDelta("Hello".into())]);
    }

    #[test]
    fn test_tool_call_start_waits_for_id_and_name() {
        let mut agg = StreamAggregator::new();
        let events = agg
            .process_chunk(chunk(vec![OpenAIChoice {
                index: 0,
                delta: OpenAIDelta {
                    role: None,
                    content: None,
                    tool_calls: Some(vec![OpenAIToolCallDelta {
                        index: 0,
                        id: Some("call_1".into()),
                        call_type: Some("function".into()),
                        function: Some(OpenAIFunctionDelta { name: Some("search".into()), arguments: Some("{\"q".into()) }),
                    }]),
                },
                finish_reason: None,
            }]))
            .unwrap();

        assert!(events.iter().any(|e| matches!(e, StreamEvent::ToolCallStart { call_id, name } if call_id == "call_1" && name == "search")));
        assert!(events.iter().any(|e| matches!(e, StreamEvent::ToolCallArgumentsDelta { json_fragment, .. } if json_fragment == "{\"q")));
    }

    #[test]
    fn test_finish_reason_emits_tool_call_done_and_resets() {
        let mut agg = StreamAggregator::new();
        agg.process_chunk(chunk(vec![OpenAIChoice {
            index: 0,
            delta: OpenAIDelta {
                role: None,
                content: None,
                tool_calls: Some(vec![OpenAIToolCallDelta {
                    index: 0,
                    id: Some("call_1".into()),
                    call_type: Some("function".into()),
                    function: Some(OpenAIFunctionDelta { name: Some("search".into()), arguments: Some("{}".into()) }),
                }]),
            },
            finish_reason: None,
        }]))
        .unwrap();

        let events = agg
            .process_chunk(chunk(vec![OpenAIChoice {
                index: 0,
                delta: OpenAIDelta { role: None, content: None, tool_calls: None },
                finish_reason: Some("tool_calls".into()),
            }]))
            .unwrap();

        assert_eq!(events, vec![StreamEvent::ToolCallDone { call_id: "call_1".into() }]);
        assert!(agg.finished_call_ids().is_empty());
    }

    #[tokio::test]
    async fn test_parse_sse_bytes_reassembles_split_events() {
        // Simulate a response body cut mid-event across two polls.
        let sse_text = "data: {\"id\":\"1\",\"object\":\"chat.completion.chunk\",\"created\":0,\"model\":\"m\",\"choices\":[]}\n\ndata: [DONE]\n\n";
        let (first, second) = sse_text.split_at(20);
        let body_stream = stream::iter(vec![
            Ok::<Bytes, reqwest::Error>(Bytes::from(first.to_string())),
            Ok::<Bytes, reqwest::Error>(Bytes::from(second.to_string())),
        ]);

        let mut stream = parse_sse_bytes(body_stream);
        let first_chunk = stream.next().await.expect("one chunk").expect("parses");
        assert_eq!(first_chunk.id, "1");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_parse_sse_bytes_skips_heartbeat_comments() {
        let sse_text = ": keep-alive\n\ndata: {\"id\":\"2\",\"object\":\"chat.completion.chunk\",\"created\":0,\"model\":\"m\",\"choices\":[]}\n\n";
        let body_stream = stream::iter(vec![Ok::<Bytes, reqwest::Error>(Bytes::from(sse_text.to_string()))]);

        let mut stream = parse_sse_bytes(body_stream);
        let chunk = stream.next().await.expect("one chunk").expect("parses");
        assert_eq!(chunk.id, "2");
    }
}
