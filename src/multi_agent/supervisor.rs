//! Supervisor: an orchestrator agent whose tools are other agents.
//!
//! This is exactly what [`crate::agent::AgentOptionsBuilder::sub_agent`]
//! already builds; `SupervisorBuilder` is a thin, purpose-named wrapper so
//! call sites describing a supervisor/worker topology don't have to spell
//! out `AgentOptionsBuilder` directly.

use crate::agent::{Agent, AgentOptions, AgentOptionsBuilder, SubAgentSharePolicy};
use crate::error::Result;
use crate::guardrails::{InputGuardrail, OutputGuardrail};
use crate::responder::Responder;
use std::sync::Arc;

pub struct SupervisorBuilder {
    options: AgentOptionsBuilder,
}

impl SupervisorBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { options: AgentOptions::builder(name) }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options = self.options.model(model);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.options = self.options.system_prompt(prompt);
        self
    }

    pub fn max_turns(mut self, turns: u32) -> Self {
        self.options = self.options.max_turns(turns);
        self
    }

    pub fn input_guardrail(mut self, guardrail: Arc<dyn InputGuardrail>) -> Self {
        self.options = self.options.input_guardrail(guardrail);
        self
    }

    pub fn output_guardrail(mut self, guardrail: Arc<dyn OutputGuardrail>) -> Self {
        self.options = self.options.output_guardrail(guardrail);
        self
    }

    /// Register `worker` as a tool named `name`, sharing the supervisor's
    /// conversation history by default (so the worker sees what's been
    /// discussed so far) but not its state bag.
    pub fn worker(mut self, name: impl Into<String>, worker: Arc<Agent>) -> Self {
        self.options = self.options.sub_agent(name, worker, SubAgentSharePolicy::default());
        self
    }

    pub fn worker_with_policy(mut self, name: impl Into<String>, worker: Arc<Agent>, policy: SubAgentSharePolicy) -> Self {
        self.options = self.options.sub_agent(name, worker, policy);
        self
    }

    pub fn build(self, responder: Arc<Responder>) -> Result<Agent> {
        Ok(Agent::new(self.options.build()?, responder))
    }
}
