//! `Agent`: the turn loop that drives one Responder through tool dispatch,
//! guardrails, handoffs, and sub-agent delegation until a final answer,
//! a pause, or a handoff is reached.
//!
//! Grounded on the teacher's `Client::auto_execute_loop` (client.rs) for the
//! turn-loop/tool-dispatch shape, generalized with guardrail enforcement,
//! handoff detection (a reserved `handoff_to_` tool-name prefix), and a
//! pause/resume state machine for tools that require confirmation.

use crate::context::AgentContext;
use crate::context_window::ContextWindowManager;
use crate::error::{Error, ErrorKind, Result};
use crate::guardrails::{
    run_input_guardrails_sequential, run_output_guardrails_sequential, InputGuardrail, OutputGuardrail,
};
use crate::hooks::{Hooks, PostToolUseEvent, PreToolUseEvent};
use crate::payload::PayloadBuilder;
use crate::responder::Responder;
use crate::tools::FunctionToolStore;
use crate::types::{Content, ModelName, Response, ResponseInputItem, ResponseOutputItem, Temperature, ToolChoice, TopP, Usage};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Prefix recognized by the turn loop as a handoff rather than an ordinary
/// tool call or sub-agent invocation.
pub const HANDOFF_PREFIX: &str = "handoff_to_";

/// A synchronous approval gate for tools that require confirmation,
/// supplied up front rather than via the serialize-and-pause/resume path.
/// Takes the pending call, returns whether to proceed with it.
pub type ApprovalCallback = Arc<dyn Fn(&PendingToolCall) -> bool + Send + Sync>;

/// Policy for how a sub-agent invocation sees the parent's conversation.
#[derive(Debug, Clone, Copy)]
pub struct SubAgentSharePolicy {
    pub share_state: bool,
    pub share_history: bool,
}

impl Default for SubAgentSharePolicy {
    fn default() -> Self {
        Self { share_state: true, share_history: false }
    }
}

struct SubAgentBinding {
    agent: Arc<Agent>,
    policy: SubAgentSharePolicy,
}

/// Immutable configuration for one `Agent`. Built once via
/// [`AgentOptionsBuilder`], mirroring the teacher's `AgentOptionsBuilder`
/// construction-config idiom.
pub struct AgentOptions {
    pub name: String,
    pub system_prompt: Option<String>,
    pub model: ModelName,
    pub temperature: Option<Temperature>,
    pub top_p: Option<TopP>,
    pub max_output_tokens: Option<u32>,
    pub tool_choice: ToolChoice,
    pub max_turns: u32,
    pub response_schema: Option<Value>,
    tools: FunctionToolStore,
    input_guardrails: Vec<Arc<dyn InputGuardrail>>,
    output_guardrails: Vec<Arc<dyn OutputGuardrail>>,
    hooks: Hooks,
    context_window: Option<ContextWindowManager>,
    sub_agents: HashMap<String, SubAgentBinding>,
    approval_callback: Option<ApprovalCallback>,
}

impl AgentOptions {
    pub fn builder(name: impl Into<String>) -> AgentOptionsBuilder {
        AgentOptionsBuilder::new(name)
    }
}

pub struct AgentOptionsBuilder {
    name: String,
    system_prompt: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    max_output_tokens: Option<u32>,
    tool_choice: ToolChoice,
    max_turns: u32,
    response_schema: Option<Value>,
    tools: Vec<crate::tools::Tool>,
    input_guardrails: Vec<Arc<dyn InputGuardrail>>,
    output_guardrails: Vec<Arc<dyn OutputGuardrail>>,
    hooks: Hooks,
    context_window: Option<ContextWindowManager>,
    sub_agents: HashMap<String, (Arc<Agent>, SubAgentSharePolicy)>,
    approval_callback: Option<ApprovalCallback>,
}

impl AgentOptionsBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: None,
            model: None,
            temperature: None,
            top_p: None,
            max_output_tokens: None,
            tool_choice: ToolChoice::default(),
            max_turns: 10,
            response_schema: None,
            tools: Vec::new(),
            input_guardrails: Vec::new(),
            output_guardrails: Vec::new(),
            hooks: Hooks::new(),
            context_window: None,
            sub_agents: HashMap::new(),
            approval_callback: None,
        }
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
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

    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    pub fn tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = choice;
        self
    }

    pub fn max_turns(mut self, turns: u32) -> Self {
        self.max_turns = turns;
        self
    }

    pub fn response_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn tool(mut self, tool: crate::tools::Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = crate::tools::Tool>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn input_guardrail(mut self, guardrail: Arc<dyn InputGuardrail>) -> Self {
        self.input_guardrails.push(guardrail);
        self
    }

    pub fn output_guardrail(mut self, guardrail: Arc<dyn OutputGuardrail>) -> Self {
        self.output_guardrails.push(guardrail);
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn context_window(mut self, manager: ContextWindowManager) -> Self {
        self.context_window = Some(manager);
        self
    }

    /// Supply a synchronous approval gate for confirmation-required tools.
    /// When set, a confirmation-required tool call is approved or rejected
    /// by invoking this callback in place, rather than pausing the
    /// interaction for an out-of-band resume.
    pub fn approval_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&PendingToolCall) -> bool + Send + Sync + 'static,
    {
        self.approval_callback = Some(Arc::new(callback));
        self
    }

    /// Register `agent` as a sub-agent, callable as a tool named `name`
    /// with a single string `input` parameter.
    pub fn sub_agent(mut self, name: impl Into<String>, agent: Arc<Agent>, policy: SubAgentSharePolicy) -> Self {
        self.sub_agents.insert(name.into(), (agent, policy));
        self
    }

    /// Register a handoff target. Exposes a tool named
    /// `handoff_to_{name}` that the turn loop recognizes and short-circuits
    /// before dispatch, rather than ever invoking a handler.
    pub fn handoff(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        let tool_name = format!("{HANDOFF_PREFIX}{}", name.into());
        self.tools.push(
            crate::tools::tool(tool_name, description)
                .param("reason", "string")
                .build(|_args| async move { Ok(Value::Null) }),
        );
        self
    }

    pub fn build(self) -> Result<AgentOptions> {
        let model = ModelName::new(self.model.unwrap_or_default()).map_err(Error::configuration)?;
        let temperature = self.temperature.map(Temperature::new).transpose().map_err(Error::configuration)?;
        let top_p = self.top_p.map(TopP::new).transpose().map_err(Error::configuration)?;

        let mut names = std::collections::HashSet::new();
        for tool in &self.tools {
            if !names.insert(tool.name().to_string()) {
                return Err(Error::configuration(format!("duplicate tool name: {}", tool.name())));
            }
        }
        for name in self.sub_agents.keys() {
            if !names.insert(name.clone()) {
                return Err(Error::configuration(format!("duplicate tool name: {name}")));
            }
        }

        let sub_agents = self
            .sub_agents
            .into_iter()
            .map(|(name, (agent, policy))| (name, SubAgentBinding { agent, policy }))
            .collect();

        Ok(AgentOptions {
            name: self.name,
            system_prompt: self.system_prompt,
            model,
            temperature,
            top_p,
            max_output_tokens: self.max_output_tokens,
            tool_choice: self.tool_choice,
            max_turns: self.max_turns,
            response_schema: self.response_schema,
            tools: FunctionToolStore::from_tools(self.tools),
            input_guardrails: self.input_guardrails,
            output_guardrails: self.output_guardrails,
            hooks: self.hooks,
            context_window: self.context_window,
            sub_agents,
            approval_callback: self.approval_callback,
        })
    }
}

/// A pending tool call awaiting caller confirmation, carried in a paused
/// [`AgentRunState`].
#[derive(Debug, Clone)]
pub struct PendingToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments_json: String,
}

/// A durable snapshot of a paused interaction, sufficient to resume once the
/// caller has approved or rejected the pending tool call.
#[derive(Debug, Clone)]
pub struct AgentRunState {
    pub agent_name: String,
    pub context: AgentContext,
    pub pending_tool_call: PendingToolCall,
    /// Keyed by `call_id`, a successful tool output supplied by the caller.
    pub approved_outputs: HashMap<String, Value>,
    /// Keyed by `call_id`, a rejection reason supplied by the caller.
    pub rejected_reasons: HashMap<String, String>,
}

/// Outcome of `interact`/`resume`.
#[derive(Debug)]
pub enum AgentResult {
    Success { output: String, turns_used: u32, usage: Usage },
    Handoff { target_agent: String, context: AgentContext },
    Paused(Box<AgentRunState>),
}

/// Whether a tool call, once dispatched, should keep the turn loop going
/// (`Continue`, the usual case) or end it immediately (`Pause`/`Handoff`).
enum DispatchOutcome {
    Continue,
    Pause(AgentRunState),
    Handoff { target_agent: String, context: AgentContext },
}

/// One configured agent bound to a shared [`Responder`]. `Agent` itself is
/// `Send + Sync` and safe to wrap in an `Arc`, matching `Responder`'s
/// concurrency story; all mutable state lives in the [`AgentContext`] passed
/// into `interact`.
pub struct Agent {
    pub options: AgentOptions,
    responder: Arc<Responder>,
}

impl Agent {
    pub fn new(options: AgentOptions, responder: Arc<Responder>) -> Self {
        Self { options, responder }
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    /// Run one interaction to completion: applies input guardrails, then
    /// loops the Responder and tool dispatch until a final answer, a
    /// handoff, or a required pause is reached.
    pub async fn interact(&self, input: &str, mut context: AgentContext) -> Result<AgentResult> {
        context.push(ResponseInputItem::user_text(input));

        run_input_guardrails_sequential(&self.options.input_guardrails, input, &context)
            .await
            .map_err(|e| e.with_agent(self.name()))?;

        self.run_turn_loop(context).await
    }

    /// Resume a paused interaction. The pending tool call is resolved from
    /// `state.approved_outputs`/`rejected_reasons`, appended to context as a
    /// `FunctionToolCallOutput`, and the turn loop reenters as if the tool
    /// had just completed.
    pub async fn resume(&self, mut state: AgentRunState) -> Result<AgentResult> {
        let call_id = state.pending_tool_call.call_id.clone();
        let output_item = if let Some(output) = state.approved_outputs.remove(&call_id) {
            ResponseInputItem::tool_output(call_id, output.to_string(), false)
        } else if let Some(reason) = state.rejected_reasons.remove(&call_id) {
            ResponseInputItem::tool_output(call_id, format!("Tool execution was rejected: {reason}"), true)
        } else {
            return Err(Error::configuration(format!(
                "resume called with no approval or rejection recorded for call_id={call_id}"
            )));
        };
        state.context.push(output_item);
        self.run_turn_loop(state.context).await
    }

    async fn run_turn_loop(&self, mut context: AgentContext) -> Result<AgentResult> {
        loop {
            if context.turn_count >= self.options.max_turns {
                return Err(Error::max_turns_exceeded(context.turn_count).with_agent(self.name()));
            }
            context.increment_turn();
            debug!(agent = self.name(), turn = context.turn_count, "starting turn");

            let history = match &self.options.context_window {
                Some(manager) => manager.maybe_shrink(&context.history).await?,
                None => context.history.clone(),
            };

            let mut input = Vec::with_capacity(history.len() + 1);
            if let Some(system_prompt) = &self.options.system_prompt {
                input.push(ResponseInputItem::developer_text(system_prompt.clone()));
            }
            input.extend(history);

            let mut builder = PayloadBuilder::new()
                .model(self.options.model.as_str())
                .input(input)
                .tools(self.options.tools.to_vec())
                .tool_choice(self.options.tool_choice.clone())
                .stream(false);
            if let Some(t) = self.options.temperature {
                builder = builder.temperature(t.value());
            }
            if let Some(p) = self.options.top_p {
                builder = builder.top_p(p.value());
            }
            if let Some(tokens) = self.options.max_output_tokens {
                builder = builder.max_output_tokens(tokens);
            }
            if let Some(schema) = &self.options.response_schema {
                builder = builder.response_schema(schema.clone());
            }
            let payload = builder.build()?;

            let response =
                self.responder.respond(&payload).await.map_err(|e| e.with_agent(self.name()).with_phase("llm_call"))?;

            let tool_calls: Vec<(String, String, String)> = response
                .output
                .iter()
                .filter_map(ResponseOutputItem::as_tool_call)
                .map(|(id, name, args)| (id.to_string(), name.to_string(), args.to_string()))
                .collect();

            if tool_calls.is_empty() {
                let answer = response.output_text();
                let turns_used = context.turn_count;
                return self.finish_with_answer(context, answer, turns_used, response.usage).await;
            }

            push_assistant_turn(&mut context, &response);

            for (call_id, name, arguments_json) in tool_calls {
                match self.dispatch_tool_call(&mut context, call_id, name, arguments_json).await? {
                    DispatchOutcome::Continue => {}
                    DispatchOutcome::Pause(state) => return Ok(AgentResult::Paused(Box::new(state))),
                    DispatchOutcome::Handoff { target_agent, context } => {
                        return Ok(AgentResult::Handoff { target_agent, context })
                    }
                }
            }
        }
    }

    async fn finish_with_answer(&self, context: AgentContext, answer: String, turns_used: u32, usage: Usage) -> Result<AgentResult> {
        run_output_guardrails_sequential(&self.options.output_guardrails, &answer, &context)
            .await
            .map_err(|e| e.with_agent(self.name()).with_turns(turns_used))?;
        Ok(AgentResult::Success { output: answer, turns_used, usage })
    }

    async fn dispatch_tool_call(
        &self,
        context: &mut AgentContext,
        call_id: String,
        name: String,
        arguments_json: String,
    ) -> Result<DispatchOutcome> {
        if let Some(target) = name.strip_prefix(HANDOFF_PREFIX) {
            info!(agent = self.name(), handoff_target = target, "handing off");
            return Ok(DispatchOutcome::Handoff { target_agent: target.to_string(), context: context.clone() });
        }

        let arguments: Value = serde_json::from_str(&arguments_json).unwrap_or(Value::Null);

        if let Some(binding) = self.options.sub_agents.get(&name) {
            let sub_input = arguments.get("input").and_then(Value::as_str).unwrap_or("");
            let sub_context = if binding.policy.share_history {
                context.fork(format!("{}::{name}", context.trace_id))
            } else {
                context.fork_isolated(format!("{}::{name}", context.trace_id))
            };
            let sub_context = if binding.policy.share_state {
                sub_context
            } else {
                AgentContext { state: HashMap::new(), ..sub_context }
            };

            let result = Box::pin(binding.agent.interact(sub_input, sub_context)).await;
            let output = match result {
                Ok(AgentResult::Success { output, .. }) => (output, false),
                Ok(AgentResult::Handoff { target_agent, .. }) => {
                    (format!("sub-agent handed off to {target_agent} before answering"), true)
                }
                Ok(AgentResult::Paused(_)) => ("sub-agent paused awaiting confirmation".to_string(), true),
                Err(err) => (err.message, true),
            };
            context.push(ResponseInputItem::tool_output(call_id, output.0, output.1));
            return Ok(DispatchOutcome::Continue);
        }

        let tool = self.options.tools.get(&name);
        let requires_confirmation = tool.as_ref().map(|t| t.requires_confirmation()).unwrap_or(false);

        if requires_confirmation {
            let pending = PendingToolCall { call_id: call_id.clone(), name: name.clone(), arguments_json: arguments_json.clone() };

            match &self.options.approval_callback {
                // An approval callback takes priority over the
                // serialize-and-pause path: the caller decides in place,
                // synchronously, rather than the interaction suspending for
                // an out-of-band `resume`.
                Some(callback) => {
                    if !callback(&pending) {
                        context.push(ResponseInputItem::tool_output(
                            call_id,
                            "Tool execution was rejected: not approved".to_string(),
                            true,
                        ));
                        return Ok(DispatchOutcome::Continue);
                    }
                }
                None => {
                    return Ok(DispatchOutcome::Pause(AgentRunState {
                        agent_name: self.name().to_string(),
                        context: context.clone(),
                        pending_tool_call: pending,
                        approved_outputs: HashMap::new(),
                        rejected_reasons: HashMap::new(),
                    }));
                }
            }
        }

        let pre_event = PreToolUseEvent::new(name.clone(), arguments.clone(), call_id.clone(), Vec::new());
        if let Some(decision) = self.options.hooks.execute_pre_tool_use(pre_event).await {
            if !decision.continue_execution {
                let reason = decision.reason.unwrap_or_else(|| "blocked by pre_tool_use hook".to_string());
                context.push(ResponseInputItem::tool_output(call_id, reason, true));
                return Ok(DispatchOutcome::Continue);
            }
        }

        let result = self.options.tools.invoke(&name, arguments.clone()).await;
        let (output_json, is_error) = match result {
            Ok(value) => (value, false),
            Err(err) => {
                warn!(agent = self.name(), tool = %name, error = %err, "tool execution failed");
                (serde_json::json!({ "error": err.message }), true)
            }
        };

        let post_event =
            PostToolUseEvent::new(name.clone(), arguments, call_id.clone(), output_json.clone(), Vec::new());
        let output_json = match self.options.hooks.execute_post_tool_use(post_event).await {
            Some(decision) if decision.modified_input.is_some() => decision.modified_input.unwrap(),
            _ => output_json,
        };

        context.push(ResponseInputItem::tool_output(call_id, output_json.to_string(), is_error));
        Ok(DispatchOutcome::Continue)
    }
}

/// Mirror a response's output items into history one-for-one: an
/// `AssistantMessage` becomes an assistant text item, a `FunctionToolCall`
/// becomes its own history item so `payload::to_wire` can serialize the
/// matching `tool_calls` entry before the tool's output message follows.
fn push_assistant_turn(context: &mut AgentContext, response: &Response) {
    for item in &response.output {
        match item {
            ResponseOutputItem::AssistantMessage { contents } => {
                let text: String = contents.iter().filter_map(Content::as_text).collect();
                if !text.is_empty() {
                    context.push(ResponseInputItem::assistant_text(text));
                }
            }
            ResponseOutputItem::FunctionToolCall { call_id, name, arguments_json } => {
                context.push(ResponseInputItem::tool_call(call_id.clone(), name.clone(), arguments_json.clone()));
            }
        }
    }
}
