//! A round-robin peer network: each agent speaks in turn, sees every prior
//! contribution in the round, and an optional synthesizer merges the
//! finished transcript into one answer.
//!
//! Grounded on the teacher's per-call `AgentContext`-free `query` path
//! generalized into a multi-turn transcript; there is no teacher analog for
//! round-robin peer debate, so the round/transcript shape is adapted from
//! `qntx-machi`'s multi-agent orchestration notes referenced in the design.

use crate::agent::{Agent, AgentResult};
use crate::context::AgentContext;
use crate::error::{Error, Result};
use std::sync::Arc;

struct Peer {
    name: String,
    agent: Arc<Agent>,
}

/// One contribution to the running transcript.
#[derive(Debug, Clone)]
pub struct Contribution {
    pub peer_name: String,
    pub round: u32,
    pub text: String,
}

pub struct AgentNetwork {
    peers: Vec<Peer>,
    rounds: u32,
    synthesizer: Option<Arc<Agent>>,
}

impl AgentNetwork {
    pub fn new(peers: Vec<(String, Arc<Agent>)>, rounds: u32) -> Self {
        Self {
            peers: peers.into_iter().map(|(name, agent)| Peer { name, agent }).collect(),
            rounds,
            synthesizer: None,
        }
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<Agent>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Run `rounds` of round-robin discussion on `topic`, returning the
    /// full transcript plus the synthesized answer, if a synthesizer is
    /// configured (otherwise the transcript joined into one string).
    pub async fn run(&self, topic: &str) -> Result<(Vec<Contribution>, String)> {
        let mut transcript = Vec::new();

        for round in 0..self.rounds {
            for peer in &self.peers {
                let prompt = self.prompt_for(topic, &transcript);
                let result = peer.agent.interact(&prompt, AgentContext::new()).await?;
                let text = match result {
                    AgentResult::Success { output, .. } => output,
                    other => {
                        return Err(Error::configuration(format!(
                            "peer {} did not produce a final answer in round {round}: {other:?}",
                            peer.name
                        )))
                    }
                };
                transcript.push(Contribution { peer_name: peer.name.clone(), round, text });
            }
        }

        let final_answer = match &self.synthesizer {
            Some(synth) => {
                let joined = render_transcript(&transcript);
                let result = synth
                    .interact(&format!("Synthesize this discussion on \"{topic}\":\n\n{joined}"), AgentContext::new())
                    .await?;
                match result {
                    AgentResult::Success { output, .. } => output,
                    other => {
                        return Err(Error::configuration(format!(
                            "synthesizer did not produce a final answer: {other:?}"
                        )))
                    }
                }
            }
            None => render_transcript(&transcript),
        };

        Ok((transcript, final_answer))
    }

    fn prompt_for(&self, topic: &str, transcript: &[Contribution]) -> String {
        if transcript.is_empty() {
            format!("Topic: {topic}\n\nShare your perspective.")
        } else {
            format!("Topic: {topic}\n\nPrior contributions:\n{}\n\nAdd your perspective, building on or challenging the above.", render_transcript(transcript))
        }
    }
}

fn render_transcript(transcript: &[Contribution]) -> String {
    transcript.iter().map(|c| format!("{}: {}", c.peer_name, c.text)).collect::<Vec<_>>().join("\n\n")
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
    async fn test_network_runs_rounds_and_synthesizes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("a perspective")))
            .up_to_n_times(4)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("final synthesis")))
            .mount(&server)
            .await;

        let responder = Arc::new(Responder::new(BaseUrl::new(server.uri()).unwrap(), "test-key").unwrap());
        let peer_a = Arc::new(Agent::new(AgentOptions::builder("a").model("gpt-4").build().unwrap(), responder.clone()));
        let peer_b = Arc::new(Agent::new(AgentOptions::builder("b").model("gpt-4").build().unwrap(), responder.clone()));
        let synthesizer =
            Arc::new(Agent::new(AgentOptions::builder("synth").model("gpt-4").build().unwrap(), responder));

        let network =
            AgentNetwork::new(vec![("a".to_string(), peer_a), ("b".to_string(), peer_b)], 2).with_synthesizer(synthesizer);

        let (transcript, answer) = network.run("the future of work").await.unwrap();
        assert_eq!(transcript.len(), 4);
        assert_eq!(answer, "final synthesis");
    }
}
