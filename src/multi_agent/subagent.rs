//! Wrap any `Agent` as a plain [`crate::tools::Tool`] so it can be dropped
//! into an ordinary [`crate::tools::FunctionToolStore`] alongside regular
//! tools, outside the agentic loop's own sub-agent dispatch.
//!
//! This is a different, lower-fidelity path than
//! [`crate::agent::AgentOptionsBuilder::sub_agent`]: a generic tool handler
//! only ever receives `Value` arguments, with no access to the caller's
//! live [`crate::context::AgentContext`], so every invocation starts a
//! fresh context. Reach for `sub_agent` when the wrapped agent should share
//! the caller's history or state; reach for `agent_as_tool` when composing
//! agents into a plain tool registry is all that's needed.

use crate::agent::{Agent, AgentResult};
use crate::context::AgentContext;
use crate::error::Error;
use crate::tools::{tool, Tool};
use serde_json::Value;
use std::sync::Arc;

pub fn agent_as_tool(name: impl Into<String>, description: impl Into<String>, agent: Arc<Agent>) -> Tool {
    tool(name, description).param("input", "string").build(move |args: Value| {
        let agent = agent.clone();
        async move {
            let input = args
                .get("input")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::invalid_request("agent_as_tool requires a string \"input\" argument"))?
                .to_string();

            match agent.interact(&input, AgentContext::new()).await? {
                AgentResult::Success { output, .. } => Ok(Value::String(output)),
                AgentResult::Handoff { target_agent, .. } => Err(Error::configuration(format!(
                    "wrapped agent attempted a handoff to {target_agent}, which agent_as_tool cannot carry out"
                ))),
                AgentResult::Paused(_) => Err(Error::configuration(
                    "wrapped agent paused on a confirmation-gated tool, which agent_as_tool cannot resume",
                )),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentOptions;
    use crate::responder::Responder;
    use crate::types::BaseUrl;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion_body(content: &str) -> serde_json::Value {
        json!({
            "id": "r1",
            "model": "gpt-4",
            "created": 0,
            "choices": [{"message": {"content": content, "tool_calls": null}}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        })
    }

    #[tokio::test]
    async fn test_agent_as_tool_invokes_wrapped_agent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("42")))
            .mount(&server)
            .await;

        let responder = Arc::new(Responder::new(BaseUrl::new(server.uri()).unwrap(), "test-key").unwrap());
        let calculator = Arc::new(Agent::new(
            AgentOptions::builder("calculator").model("gpt-4").build().unwrap(),
            responder,
        ));
        let wrapped = agent_as_tool("calculator", "does arithmetic", calculator);

        let output = wrapped.execute(json!({"input": "what is 6 times 7?"})).await.unwrap();
        assert_eq!(output, Value::String("42".to_string()));
    }

    #[tokio::test]
    async fn test_agent_as_tool_rejects_missing_input() {
        let server = MockServer::start().await;
        let responder = Arc::new(Responder::new(BaseUrl::new(server.uri()).unwrap(), "test-key").unwrap());
        let agent = Arc::new(Agent::new(AgentOptions::builder("a").model("gpt-4").build().unwrap(), responder));
        let wrapped = agent_as_tool("a", "desc", agent);

        let err = wrapped.execute(json!({})).await.unwrap_err();
        assert!(err.to_string().contains("input"));
    }
}
