//! # Open Agent SDK - Rust Implementation
//!
//! A production-ready Rust SDK for building tool-using, multi-turn LLM
//! agents against any OpenAI-compatible chat-completions endpoint (LM
//! Studio, Ollama, llama.cpp, vLLM, or a hosted provider).
//!
//! ## Key Features
//!
//! - **Agentic loop**: guardrails, tool dispatch, confirmation-gated
//!   pause/resume, and handoffs ([`agent`])
//! - **Multi-agent composition**: routers, supervisors, hierarchies,
//!   concurrent fan-out, and peer networks ([`multi_agent`])
//! - **Blueprints**: serialize an agent or composition to data and
//!   reconstruct it later ([`blueprint`])
//! - **Streaming and buffered calls** against one shared, retrying HTTP
//!   client ([`responder`])
//! - **Lifecycle hooks** for intercepting tool calls ([`hooks`])
//! - **Context window management**: sliding-window and summarization
//!   strategies ([`context_window`])
//! - **Structured output** via JSON Schema derivation ([`schema`])
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use open_agent::{Agent, AgentOptions, AgentResult, AgentContext, Responder, BaseUrl};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let responder = Arc::new(Responder::new(
//!         BaseUrl::new("http://localhost:1234/v1")?,
//!         "not-needed-for-local-servers",
//!     )?);
//!
//!     let options = AgentOptions::builder("assistant")
//!         .system_prompt("You are a helpful assistant")
//!         .model("qwen2.5-32b-instruct")
//!         .build()?;
//!     let agent = Agent::new(options, responder);
//!
//!     match agent.interact("What's the capital of France?", AgentContext::new()).await? {
//!         AgentResult::Success { output, .. } => println!("{output}"),
//!         other => println!("did not finish: {other:?}"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **responder**: the shared, retrying HTTP client bound to one
//!   chat-completions endpoint
//! - **payload**: request construction and validation
//! - **sse**: Server-Sent Events parsing for streaming calls
//! - **agent**: the turn loop — guardrails, tool dispatch, handoffs,
//!   pause/resume
//! - **multi_agent**: router, supervisor, hierarchy, parallel, and network
//!   composition patterns built on top of `agent`
//! - **blueprint**: data-driven serialization/reconstruction of agents and
//!   compositions
//! - **tools**: tool definition with automatic JSON Schema generation
//! - **guardrails**: input/output validation hooks around an interaction
//! - **hooks**: pre/post tool-use lifecycle interception
//! - **context**: per-interaction conversation state (`AgentContext`)
//! - **context_window**: sliding-window and summarization truncation
//!   strategies
//! - **schema**: JSON Schema derivation for structured output
//! - **types**: wire and domain types shared across the crate
//! - **config**: provider defaults and environment variable resolution
//! - **retry**: exponential backoff with jitter for transport failures
//! - **telemetry**: pluggable request-outcome reporting
//! - **error**: the crate's `Error`/`Result` types

mod agent;
mod blueprint;
mod config;
mod context;
mod context_window;
mod error;
mod guardrails;
mod hooks;
mod multi_agent;
mod partial_json;
mod payload;
mod responder;
mod schema;
mod sse;
mod telemetry;
mod tools;
mod types;

pub mod retry;

// --- Agentic loop ---

pub use agent::{
    AgentOptions, AgentOptionsBuilder, AgentResult, AgentRunState, PendingToolCall, SubAgentSharePolicy, HANDOFF_PREFIX,
};
pub use agent::Agent;

// --- Multi-agent composition ---

pub use multi_agent::{agent_as_tool, AgentNetwork, Contribution, Hierarchy, ParallelAgents, Router, RouterBuilder, SupervisorBuilder};

// --- Blueprints ---

pub use blueprint::{
    AgentBlueprint, AgentDefinition, Blueprint, HandoffBlueprint, HierarchicalBlueprint, NetworkBlueprint,
    NetworkPeerBlueprint, ParallelBlueprint, ResponderBlueprint, ResponderEndpoint, RestoredComponent,
    RetryPolicyBlueprint, RouteBlueprint, RouterBlueprint, SubAgentBlueprint, SubAgentSharePolicyBlueprint,
    SupervisorBlueprint, ToolRegistry,
};

// --- Transport ---

pub use responder::Responder;

// --- Provider configuration ---

pub use config::{get_base_url, get_model, Provider};

// --- Conversation state ---

pub use context::AgentContext;

// --- Context window management ---

pub use context_window::{is_approaching_limit, CharCountTokenCounter, ContextStrategy, ContextWindowManager, Summarization, SlidingWindow, TokenCounter};

// --- Error handling ---

pub use error::{Error, ErrorKind, Result};

// --- Guardrails ---

pub use guardrails::{run_input_guardrails_sequential, run_output_guardrails_sequential, GuardrailRegistry, GuardrailResult, InputGuardrail, OutputGuardrail};

// --- Lifecycle hooks ---

pub use hooks::{HookDecision, Hooks, PostToolUseEvent, PreToolUseEvent, HOOK_POST_TOOL_USE, HOOK_PRE_TOOL_USE};

// --- Structured output schemas ---

pub use schema::{SchemaFor, MAX_SCHEMA_DEPTH};

// --- Tool system ---

pub use tools::{tool, FunctionToolStore, Tool, ToolBuilder};

// --- Core wire/domain types ---

pub use types::{
    BaseUrl, Content, ImageDetail, ModelName, Response, ResponseInputItem, ResponseOutputItem, Role, Temperature,
    ToolChoice, TopP, Usage,
};

// --- Retry ---

pub use retry::RetryConfig;

// --- Telemetry ---

pub use telemetry::{RequestOutcome, TelemetryDispatcher, TelemetryProcessor};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// The most commonly used types and functions for typical usage. Import
/// with `use open_agent::prelude::*;`.
pub mod prelude {
    pub use crate::{
        tool, Agent, AgentContext, AgentOptions, AgentOptionsBuilder, AgentResult, BaseUrl, Error, HookDecision,
        Hooks, PostToolUseEvent, PreToolUseEvent, Responder, Result, Tool,
    };
}
