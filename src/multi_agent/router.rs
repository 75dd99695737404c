//! Router: one classification call picks which of several agents should
//! handle the interaction, then the whole interaction is delegated to it.
//!
//! Grounded on the teacher's structured-output path (`response_schema` on
//! `PayloadBuilder`/`Responder`), generalized into a dedicated
//! classify-then-delegate component rather than something every caller
//! reimplements by hand.

use crate::agent::{Agent, AgentResult};
use crate::context::AgentContext;
use crate::error::{Error, Result};
use crate::payload::PayloadBuilder;
use crate::responder::Responder;
use crate::schema::SchemaFor;
use crate::types::{ModelName, ResponseInputItem};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct RouteDecision {
    choice: String,
    reasoning: Option<String>,
}

struct Route {
    name: String,
    agent: Arc<Agent>,
    description: String,
}

/// Classifies the input against a catalog of named agents and delegates to
/// whichever one the classifier picks, falling back to a default agent
/// when the choice doesn't match any route.
pub struct Router {
    responder: Arc<Responder>,
    model: ModelName,
    routes: Vec<Route>,
    fallback: Option<Arc<Agent>>,
}

impl Router {
    pub fn builder(model: impl Into<String>) -> RouterBuilder {
        RouterBuilder::new(model)
    }

    /// Classify `input`, then run the chosen agent's full interaction.
    pub async fn route(&self, input: &str, context: AgentContext) -> Result<AgentResult> {
        let catalog = self
            .routes
            .iter()
            .map(|r| format!("- {}: {}", r.name, r.description))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Choose exactly one route by name for the request below. Respond only with the \
             chosen route's name and, optionally, a short reason.\n\nRoutes:\n{catalog}\n\nRequest:\n{input}"
        );

        let payload = PayloadBuilder::new()
            .model(self.model.as_str())
            .input(vec![
                ResponseInputItem::developer_text("You are a routing classifier."),
                ResponseInputItem::user_text(prompt),
            ])
            .response_schema(RouteDecision::json_schema()?)
            .build()?;

        let response = self.responder.respond(&payload).await?;
        let decision: RouteDecision = serde_json::from_str(&response.output_text())?;
        debug!(choice = %decision.choice, "router decision");

        let chosen = self
            .routes
            .iter()
            .find(|r| r.name == decision.choice)
            .map(|r| r.agent.clone())
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| {
                Error::configuration(format!("router has no route or fallback for choice: {}", decision.choice))
            })?;

        chosen.interact(input, context).await
    }
}

pub struct RouterBuilder {
    model: String,
    routes: Vec<Route>,
    fallback: Option<Arc<Agent>>,
}

impl RouterBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into(), routes: Vec::new(), fallback: None }
    }

    pub fn route(mut self, name: impl Into<String>, agent: Arc<Agent>, description: impl Into<String>) -> Self {
        self.routes.push(Route { name: name.into(), agent, description: description.into() });
        self
    }

    pub fn fallback(mut self, agent: Arc<Agent>) -> Self {
        self.fallback = Some(agent);
        self
    }

    pub fn build(self, responder: Arc<Responder>) -> Result<Router> {
        if self.routes.is_empty() {
            return Err(Error::configuration("router requires at least one route"));
        }
        let model = ModelName::new(self.model).map_err(Error::configuration)?;
        Ok(Router { responder, model, routes: self.routes, fallback: self.fallback })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentOptions;
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
    async fn test_router_delegates_to_chosen_agent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
                "{\"choice\":\"billing\",\"reasoning\":\"payment question\"}",
            )))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("your invoice is settled")))
            .mount(&server)
            .await;

        let responder = Arc::new(Responder::new(BaseUrl::new(server.uri()).unwrap(), "test-key").unwrap());
        let billing = Arc::new(Agent::new(
            AgentOptions::builder("billing").model("gpt-4").build().unwrap(),
            responder.clone(),
        ));
        let router = Router::builder("gpt-4").route("billing", billing, "billing questions").build(responder).unwrap();

        let result = router.route("why was I charged twice?", AgentContext::new()).await.unwrap();
        match result {
            AgentResult::Success { output, .. } => assert_eq!(output, "your invoice is settled"),
            other => panic!("expected Success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_router_falls_back_on_unknown_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("{\"choice\":\"nonexistent\"}")))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("handled by fallback")))
            .mount(&server)
            .await;

        let responder = Arc::new(Responder::new(BaseUrl::new(server.uri()).unwrap(), "test-key").unwrap());
        let billing = Arc::new(Agent::new(
            AgentOptions::builder("billing").model("gpt-4").build().unwrap(),
            responder.clone(),
        ));
        let general = Arc::new(Agent::new(
            AgentOptions::builder("general").model("gpt-4").build().unwrap(),
            responder.clone(),
        ));
        let router = Router::builder("gpt-4")
            .route("billing", billing, "billing questions")
            .fallback(general)
            .build(responder)
            .unwrap();

        let result = router.route("what's the weather", AgentContext::new()).await.unwrap();
        match result {
            AgentResult::Success { output, .. } => assert_eq!(output, "handled by fallback"),
            other => panic!("expected Success, got {other:?}"),
        }
    }
}
