//! Blueprints: serialize an agent (or any constellation rooted at one) to a
//! data document and reconstruct an equivalent live object.
//!
//! A `Blueprint` never carries the HTTP client, a tool's closure, or a
//! guardrail's trait object directly — Rust has no reflective no-arg
//! constructor, so tools and guardrails serialize as stable names/ids and
//! are looked up in a process-global [`ToolRegistry`]/
//! [`crate::guardrails::GuardrailRegistry`] at restore time. A tool absent
//! from the registry is silently omitted from the restored agent, matching
//! the same limitation for guardrails (an unresolvable guardrail id is
//! instead a fatal `Configuration` error, since dropping a guardrail
//! silently would be a safety regression rather than a missing capability).
//!
//! Grounded on the teacher's `config.rs` env-var resolution (reused for
//! `apiKeyEnvVar`) and `ContentBlock`'s `#[serde(tag = "type")]` pattern
//! (types.rs) for the discriminated `Blueprint` sum type.

use crate::agent::{Agent, AgentOptions, SubAgentSharePolicy};
use crate::config::Provider;
use crate::error::{Error, Result};
use crate::guardrails::GuardrailRegistry;
use crate::multi_agent::{AgentNetwork, Hierarchy, ParallelAgents, Router, RouterBuilder, SupervisorBuilder};
use crate::responder::Responder;
use crate::retry::RetryConfig;
use crate::tools::Tool;
use crate::types::{BaseUrl, ToolChoice};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

// ============================================================================
// TOOL REGISTRY
// ============================================================================

type ToolConstructor = Arc<dyn Fn() -> Tool + Send + Sync>;

/// Process-wide, name-keyed registry of no-arg tool constructors so a
/// `Blueprint` can reference a tool by name instead of serializing its
/// handler closure.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    constructors: Arc<RwLock<HashMap<String, ToolConstructor>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Tool + Send + Sync + 'static,
    {
        self.constructors.write().expect("tool registry lock poisoned").insert(name.into(), Arc::new(constructor));
    }

    /// Build a fresh `Tool` from the registered constructor, or `None` if
    /// no constructor is registered under `name`.
    pub fn resolve(&self, name: &str) -> Option<Tool> {
        self.constructors.read().expect("tool registry lock poisoned").get(name).map(|ctor| ctor())
    }
}

// ============================================================================
// RETRY POLICY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicyBlueprint {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub retryable_status_codes: Vec<u16>,
}

impl From<&RetryConfig> for RetryPolicyBlueprint {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay_ms: config.initial_delay.as_millis() as u64,
            max_delay_ms: config.max_delay.as_millis() as u64,
            backoff_multiplier: config.backoff_multiplier,
            retryable_status_codes: config.retryable_status_codes.clone(),
        }
    }
}

impl From<RetryPolicyBlueprint> for RetryConfig {
    fn from(blueprint: RetryPolicyBlueprint) -> Self {
        RetryConfig {
            max_attempts: blueprint.max_attempts,
            initial_delay: Duration::from_millis(blueprint.initial_delay_ms),
            max_delay: Duration::from_millis(blueprint.max_delay_ms),
            backoff_multiplier: blueprint.backoff_multiplier,
            retryable_status_codes: blueprint.retryable_status_codes,
        }
    }
}

// ============================================================================
// RESPONDER BLUEPRINT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponderEndpoint {
    Provider { provider: String },
    BaseUrl { base_url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderBlueprint {
    #[serde(flatten)]
    pub endpoint: ResponderEndpoint,
    pub api_key_env_var: String,
    pub retry_policy: RetryPolicyBlueprint,
    pub default_trace_metadata: HashMap<String, serde_json::Value>,
}

impl ResponderBlueprint {
    pub fn for_provider(provider: Provider, retry_policy: &RetryConfig) -> Self {
        Self {
            endpoint: ResponderEndpoint::Provider { provider: format!("{provider:?}") },
            api_key_env_var: provider.api_key_env_var().to_string(),
            retry_policy: retry_policy.into(),
            default_trace_metadata: HashMap::new(),
        }
    }

    pub fn for_base_url(
        base_url: impl Into<String>,
        api_key_env_var: impl Into<String>,
        retry_policy: &RetryConfig,
    ) -> Self {
        Self {
            endpoint: ResponderEndpoint::BaseUrl { base_url: base_url.into() },
            api_key_env_var: api_key_env_var.into(),
            retry_policy: retry_policy.into(),
            default_trace_metadata: HashMap::new(),
        }
    }

    /// Reconstruct a live `Responder`. Reads `api_key_env_var` from the
    /// process environment; its absence is a `Configuration` error.
    pub fn restore(&self) -> Result<Arc<Responder>> {
        let api_key = env::var(&self.api_key_env_var).map_err(|_| {
            Error::configuration(format!("environment variable {} is not set", self.api_key_env_var))
        })?;
        let url = match &self.endpoint {
            ResponderEndpoint::Provider { provider } => {
                Provider::from_str(provider).map_err(Error::configuration)?.default_url().to_string()
            }
            ResponderEndpoint::BaseUrl { base_url } => base_url.clone(),
        };
        let base_url = BaseUrl::new(url).map_err(Error::configuration)?;
        let responder = Responder::new(base_url, api_key)?.with_retry_config(self.retry_policy.clone().into());
        Ok(Arc::new(responder))
    }
}

// ============================================================================
// SHARED SUB-STRUCTURES
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SubAgentSharePolicyBlueprint {
    pub share_state: bool,
    pub share_history: bool,
}

impl From<SubAgentSharePolicy> for SubAgentSharePolicyBlueprint {
    fn from(policy: SubAgentSharePolicy) -> Self {
        Self { share_state: policy.share_state, share_history: policy.share_history }
    }
}

impl From<SubAgentSharePolicyBlueprint> for SubAgentSharePolicy {
    fn from(blueprint: SubAgentSharePolicyBlueprint) -> Self {
        Self { share_state: blueprint.share_state, share_history: blueprint.share_history }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentBlueprint {
    pub name: String,
    pub policy: SubAgentSharePolicyBlueprint,
    pub agent: Box<Blueprint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffBlueprint {
    pub name: String,
    pub description: String,
}

// ============================================================================
// AGENT BLUEPRINT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentBlueprint {
    pub name: String,
    pub system_prompt: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub tool_choice: ToolChoice,
    pub max_turns: u32,
    pub response_schema: Option<serde_json::Value>,
    pub tool_names: Vec<String>,
    pub input_guardrail_ids: Vec<String>,
    pub output_guardrail_ids: Vec<String>,
    pub sub_agents: Vec<SubAgentBlueprint>,
    pub handoffs: Vec<HandoffBlueprint>,
}

fn restore_agent(
    blueprint: &AgentBlueprint,
    responder: Arc<Responder>,
    tools: &ToolRegistry,
    guardrails: &GuardrailRegistry,
) -> Result<Agent> {
    let mut options = AgentOptions::builder(blueprint.name.clone()).model(blueprint.model.clone());
    if let Some(prompt) = &blueprint.system_prompt {
        options = options.system_prompt(prompt.clone());
    }
    if let Some(t) = blueprint.temperature {
        options = options.temperature(t);
    }
    if let Some(p) = blueprint.top_p {
        options = options.top_p(p);
    }
    if let Some(tokens) = blueprint.max_output_tokens {
        options = options.max_output_tokens(tokens);
    }
    options = options.tool_choice(blueprint.tool_choice.clone()).max_turns(blueprint.max_turns);
    if let Some(schema) = &blueprint.response_schema {
        options = options.response_schema(schema.clone());
    }

    for name in &blueprint.tool_names {
        if let Some(tool) = tools.resolve(name) {
            options = options.tool(tool);
        }
        // Absent from the registry: silently omitted, matching the
        // no-reflective-constructor limitation documented above.
    }

    for id in &blueprint.input_guardrail_ids {
        let guardrail =
            guardrails.input(id).ok_or_else(|| Error::configuration(format!("unknown input guardrail id: {id}")))?;
        options = options.input_guardrail(guardrail);
    }
    for id in &blueprint.output_guardrail_ids {
        let guardrail =
            guardrails.output(id).ok_or_else(|| Error::configuration(format!("unknown output guardrail id: {id}")))?;
        options = options.output_guardrail(guardrail);
    }

    for sub in &blueprint.sub_agents {
        let restored = sub.agent.restore(responder.clone(), tools, guardrails)?.into_agent()?;
        options = options.sub_agent(sub.name.clone(), restored, sub.policy.into());
    }

    for handoff in &blueprint.handoffs {
        options = options.handoff(handoff.name.clone(), handoff.description.clone());
    }

    Ok(Agent::new(options.build()?, responder))
}

// ============================================================================
// COMPOSITE BLUEPRINTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteBlueprint {
    pub name: String,
    pub description: String,
    pub agent: Box<Blueprint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterBlueprint {
    pub model: String,
    pub routes: Vec<RouteBlueprint>,
    pub fallback: Option<Box<Blueprint>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorBlueprint {
    pub name: String,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub max_turns: Option<u32>,
    pub input_guardrail_ids: Vec<String>,
    pub output_guardrail_ids: Vec<String>,
    pub workers: Vec<SubAgentBlueprint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelBlueprint {
    pub agents: Vec<Blueprint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkPeerBlueprint {
    pub name: String,
    pub agent: Blueprint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkBlueprint {
    pub peers: Vec<NetworkPeerBlueprint>,
    pub rounds: u32,
    pub synthesizer: Option<Box<Blueprint>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchicalBlueprint {
    pub name: String,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub subordinates: Vec<SubAgentBlueprint>,
}

/// A serializable description of an agent or composition pattern, tagged by
/// `kind`. Child agents (handoffs, workers, peers, synthesizer, sub-agents)
/// serialize as nested blueprints, recursively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Blueprint {
    Agent(AgentBlueprint),
    Router(RouterBlueprint),
    Supervisor(SupervisorBlueprint),
    Parallel(ParallelBlueprint),
    Network(NetworkBlueprint),
    Hierarchical(HierarchicalBlueprint),
}

/// The live object a `Blueprint` restores to. Distinct variants because
/// `Router`/`ParallelAgents`/`AgentNetwork` aren't themselves `Agent`s —
/// only `Agent`, `Supervisor`, and `Hierarchical` blueprints restore to one.
pub enum RestoredComponent {
    Agent(Arc<Agent>),
    Router(Arc<Router>),
    Parallel(ParallelAgents),
    Network(AgentNetwork),
}

impl RestoredComponent {
    fn kind_name(&self) -> &'static str {
        match self {
            RestoredComponent::Agent(_) => "agent",
            RestoredComponent::Router(_) => "router",
            RestoredComponent::Parallel(_) => "parallel",
            RestoredComponent::Network(_) => "network",
        }
    }

    /// Unwrap into an `Arc<Agent>`, as required whenever a restored
    /// component is about to be registered as a sub-agent, worker, route
    /// target, or peer.
    pub fn into_agent(self) -> Result<Arc<Agent>> {
        match self {
            RestoredComponent::Agent(agent) => Ok(agent),
            other => {
                Err(Error::configuration(format!("blueprint restored to a {}, expected an agent", other.kind_name())))
            }
        }
    }
}

impl Blueprint {
    pub fn restore(
        &self,
        responder: Arc<Responder>,
        tools: &ToolRegistry,
        guardrails: &GuardrailRegistry,
    ) -> Result<RestoredComponent> {
        match self {
            Blueprint::Agent(blueprint) => {
                Ok(RestoredComponent::Agent(Arc::new(restore_agent(blueprint, responder, tools, guardrails)?)))
            }

            Blueprint::Supervisor(blueprint) => {
                let mut builder = SupervisorBuilder::new(blueprint.name.clone());
                if let Some(model) = &blueprint.model {
                    builder = builder.model(model.clone());
                }
                if let Some(prompt) = &blueprint.system_prompt {
                    builder = builder.system_prompt(prompt.clone());
                }
                if let Some(turns) = blueprint.max_turns {
                    builder = builder.max_turns(turns);
                }
                for id in &blueprint.input_guardrail_ids {
                    let guardrail = guardrails
                        .input(id)
                        .ok_or_else(|| Error::configuration(format!("unknown input guardrail id: {id}")))?;
                    builder = builder.input_guardrail(guardrail);
                }
                for id in &blueprint.output_guardrail_ids {
                    let guardrail = guardrails
                        .output(id)
                        .ok_or_else(|| Error::configuration(format!("unknown output guardrail id: {id}")))?;
                    builder = builder.output_guardrail(guardrail);
                }
                for worker in &blueprint.workers {
                    let restored = worker.agent.restore(responder.clone(), tools, guardrails)?.into_agent()?;
                    builder = builder.worker_with_policy(worker.name.clone(), restored, worker.policy.into());
                }
                Ok(RestoredComponent::Agent(Arc::new(builder.build(responder)?)))
            }

            Blueprint::Hierarchical(blueprint) => {
                let mut options = AgentOptions::builder(blueprint.name.clone());
                if let Some(model) = &blueprint.model {
                    options = options.model(model.clone());
                }
                if let Some(prompt) = &blueprint.system_prompt {
                    options = options.system_prompt(prompt.clone());
                }
                let mut subordinates = Vec::with_capacity(blueprint.subordinates.len());
                for sub in &blueprint.subordinates {
                    let restored = sub.agent.restore(responder.clone(), tools, guardrails)?.into_agent()?;
                    subordinates.push((sub.name.clone(), restored));
                }
                Ok(RestoredComponent::Agent(Arc::new(Hierarchy::build_level(options, subordinates, responder)?)))
            }

            Blueprint::Router(blueprint) => {
                let mut builder = RouterBuilder::new(blueprint.model.clone());
                for route in &blueprint.routes {
                    let restored = route.agent.restore(responder.clone(), tools, guardrails)?.into_agent()?;
                    builder = builder.route(route.name.clone(), restored, route.description.clone());
                }
                if let Some(fallback) = &blueprint.fallback {
                    let restored = fallback.restore(responder.clone(), tools, guardrails)?.into_agent()?;
                    builder = builder.fallback(restored);
                }
                Ok(RestoredComponent::Router(Arc::new(builder.build(responder)?)))
            }

            Blueprint::Parallel(blueprint) => {
                let mut agents = Vec::with_capacity(blueprint.agents.len());
                for agent_blueprint in &blueprint.agents {
                    agents.push(agent_blueprint.restore(responder.clone(), tools, guardrails)?.into_agent()?);
                }
                Ok(RestoredComponent::Parallel(ParallelAgents::new(agents)))
            }

            Blueprint::Network(blueprint) => {
                let mut peers = Vec::with_capacity(blueprint.peers.len());
                for peer in &blueprint.peers {
                    let restored = peer.agent.restore(responder.clone(), tools, guardrails)?.into_agent()?;
                    peers.push((peer.name.clone(), restored));
                }
                let mut network = AgentNetwork::new(peers, blueprint.rounds);
                if let Some(synthesizer) = &blueprint.synthesizer {
                    network = network.with_synthesizer(synthesizer.restore(responder, tools, guardrails)?.into_agent()?);
                }
                Ok(RestoredComponent::Network(network))
            }
        }
    }
}

// ============================================================================
// AGENT DEFINITION (LLM-GENERATED AGENT SPECS)
// ============================================================================

/// A structured-output shape an LLM can generate to describe an agent it
/// wants created ("an agent that creates agents"). Deliberately excludes
/// infrastructure (model, responder, tool implementations) the caller
/// supplies at materialization time; tool references are by human-readable
/// name rather than class name, since Rust has no class registry to name.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentDefinition {
    pub name: String,
    pub system_prompt: Option<String>,
    pub tool_names: Vec<String>,
    pub input_guardrail_ids: Vec<String>,
    pub output_guardrail_ids: Vec<String>,
    pub max_turns: Option<u32>,
}

impl AgentDefinition {
    /// Materialize into a live `Agent`, supplying the model and responder
    /// the definition itself omits.
    pub fn materialize(
        &self,
        model: impl Into<String>,
        responder: Arc<Responder>,
        tools: &ToolRegistry,
        guardrails: &GuardrailRegistry,
    ) -> Result<Agent> {
        let mut options = AgentOptions::builder(self.name.clone()).model(model);
        if let Some(prompt) = &self.system_prompt {
            options = options.system_prompt(prompt.clone());
        }
        if let Some(turns) = self.max_turns {
            options = options.max_turns(turns);
        }
        for name in &self.tool_names {
            if let Some(tool) = tools.resolve(name) {
                options = options.tool(tool);
            }
        }
        for id in &self.input_guardrail_ids {
            let guardrail =
                guardrails.input(id).ok_or_else(|| Error::configuration(format!("unknown input guardrail id: {id}")))?;
            options = options.input_guardrail(guardrail);
        }
        for id in &self.output_guardrail_ids {
            let guardrail = guardrails
                .output(id)
                .ok_or_else(|| Error::configuration(format!("unknown output guardrail id: {id}")))?;
            options = options.output_guardrail(guardrail);
        }
        Ok(Agent::new(options.build()?, responder))
    }
}
