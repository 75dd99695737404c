//! Run several agents concurrently against the same input.
//!
//! Grounded on the teacher's `Client::interrupt` (`Arc<AtomicBool>`
//! cooperative cancellation) generalized to `tokio::task::JoinHandle::abort`
//! for `run_first`'s losers, and `futures::future::join_all` for the
//! wait-for-everyone case.

use crate::agent::{Agent, AgentResult};
use crate::context::AgentContext;
use crate::error::{Error, Result};
use futures::future::{join_all, select_all};
use std::sync::Arc;

/// A fixed set of agents run against the same input, either waiting for
/// all of them, racing for the first, or synthesizing a single answer from
/// everyone's contribution.
pub struct ParallelAgents {
    agents: Vec<Arc<Agent>>,
}

impl ParallelAgents {
    pub fn new(agents: Vec<Arc<Agent>>) -> Self {
        Self { agents }
    }

    /// Run every agent against `input`, each against its own copy of
    /// `context`, and wait for all of them. A task panic surfaces as a
    /// `Configuration` error for that agent's slot rather than failing the
    /// whole batch.
    pub async fn run(&self, input: &str, context: &AgentContext) -> Vec<Result<AgentResult>> {
        let handles: Vec<_> = self
            .agents
            .iter()
            .map(|agent| {
                let agent = agent.clone();
                let ctx = context.copy();
                let input = input.to_string();
                tokio::spawn(async move { agent.interact(&input, ctx).await })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(result) => result,
                Err(join_err) => Err(Error::configuration(format!("agent task panicked: {join_err}"))),
            })
            .collect()
    }

    /// Race every agent against `input`; return the first to finish and
    /// abort the rest.
    pub async fn run_first(&self, input: &str, context: &AgentContext) -> Result<AgentResult> {
        if self.agents.is_empty() {
            return Err(Error::configuration("run_first requires at least one agent"));
        }

        let handles: Vec<_> = self
            .agents
            .iter()
            .map(|agent| {
                let agent = agent.clone();
                let ctx = context.copy();
                let input = input.to_string();
                tokio::spawn(async move { agent.interact(&input, ctx).await })
            })
            .collect();

        let (first, _index, rest) = select_all(handles).await;
        for handle in rest {
            handle.abort();
        }

        match first {
            Ok(result) => result,
            Err(join_err) => Err(Error::configuration(format!("agent task panicked: {join_err}"))),
        }
    }

    /// Run every agent, then feed their combined contributions (successes
    /// and failures alike, labeled by position) to `synthesizer` for a
    /// single merged answer.
    pub async fn run_and_synthesize(
        &self,
        input: &str,
        context: &AgentContext,
        synthesizer: &Agent,
    ) -> Result<AgentResult> {
        let results = self.run(input, context).await;
        let mut combined = String::new();
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(AgentResult::Success { output, .. }) => {
                    combined.push_str(&format!("Agent {index}: {output}\n\n"));
                }
                Ok(other) => {
                    combined.push_str(&format!("Agent {index} did not produce a final answer: {other:?}\n\n"));
                }
                Err(err) => {
                    combined.push_str(&format!("Agent {index} failed: {err}\n\n"));
                }
            }
        }
        synthesizer.interact(&combined, context.copy()).await
    }
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
    async fn test_run_waits_for_all_agents() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("answer")))
            .mount(&server)
            .await;

        let responder = Arc::new(Responder::new(BaseUrl::new(server.uri()).unwrap(), "test-key").unwrap());
        let agents: Vec<Arc<Agent>> = (0..3)
            .map(|i| {
                Arc::new(Agent::new(
                    AgentOptions::builder(format!("agent-{i}")).model("gpt-4").build().unwrap(),
                    responder.clone(),
                ))
            })
            .collect();

        let parallel = ParallelAgents::new(agents);
        let results = parallel.run("question", &AgentContext::new()).await;
        assert_eq!(results.len(), 3);
        for result in results {
            match result.unwrap() {
                AgentResult::Success { output, .. } => assert_eq!(output, "answer"),
                other => panic!("expected Success, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_run_and_synthesize_merges_contributions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("partial answer")))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("synthesized answer")))
            .mount(&server)
            .await;

        let responder = Arc::new(Responder::new(BaseUrl::new(server.uri()).unwrap(), "test-key").unwrap());
        let agents: Vec<Arc<Agent>> = (0..2)
            .map(|i| {
                Arc::new(Agent::new(
                    AgentOptions::builder(format!("agent-{i}")).model("gpt-4").build().unwrap(),
                    responder.clone(),
                ))
            })
            .collect();
        let synthesizer =
            Agent::new(AgentOptions::builder("synthesizer").model("gpt-4").build().unwrap(), responder);

        let parallel = ParallelAgents::new(agents);
        let result = parallel.run_and_synthesize("question", &AgentContext::new(), &synthesizer).await.unwrap();
        match result {
            AgentResult::Success { output, .. } => assert_eq!(output, "synthesized answer"),
            other => panic!("expected Success, got {other:?}"),
        }
    }
}
