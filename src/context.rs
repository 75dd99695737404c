//! `AgentContext`: the mutable conversation state threaded through one
//! interaction.
//!
//! Grounded on `qntx-machi`'s `RunContext` (trace/span identifiers carried
//! alongside history so multi-agent delegation can be followed in logs).
//! Unlike `Responder`/`Agent`/`Router`, a context is NOT concurrency-safe —
//! concurrent interactions must each hold their own via [`AgentContext::fork`]
//! or [`AgentContext::copy`].

use crate::types::ResponseInputItem;
use std::collections::HashMap;
use uuid::Uuid;

/// Conversation history, turn count, and trace identifiers for one
/// in-flight interaction.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub history: Vec<ResponseInputItem>,
    pub turn_count: u32,
    pub trace_id: String,
    pub parent_span_id: Option<String>,
    pub request_id: String,
    /// Free-form state bag for guardrails/tools/handoffs to stash
    /// per-interaction data (e.g. a running PII-redaction tally).
    pub state: HashMap<String, serde_json::Value>,
}

impl AgentContext {
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
            turn_count: 0,
            trace_id: Uuid::new_v4().to_string(),
            parent_span_id: None,
            request_id: Uuid::new_v4().to_string(),
            state: HashMap::new(),
        }
    }

    pub fn with_history(history: Vec<ResponseInputItem>) -> Self {
        Self { history, ..Self::new() }
    }

    pub fn push(&mut self, item: ResponseInputItem) {
        self.history.push(item);
    }

    pub fn increment_turn(&mut self) {
        self.turn_count += 1;
    }

    /// Produce an independent context for a sub-agent invocation that
    /// starts a fresh span under this context's trace, carrying the full
    /// history forward (the teacher's "sub-agent sees everything so far"
    /// default).
    pub fn fork(&self, new_span_id: impl Into<String>) -> Self {
        Self {
            history: self.history.clone(),
            turn_count: 0,
            trace_id: self.trace_id.clone(),
            parent_span_id: Some(new_span_id.into()),
            request_id: Uuid::new_v4().to_string(),
            state: self.state.clone(),
        }
    }

    /// A fully independent copy for running a concurrent interaction
    /// against the same starting point (used by `ParallelAgents`), sharing
    /// no further mutation with the original.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Fork with a deliberately empty history, for a sub-agent that should
    /// not see the parent conversation (`shareHistory: false` policy).
    pub fn fork_isolated(&self, new_span_id: impl Into<String>) -> Self {
        Self {
            history: Vec::new(),
            turn_count: 0,
            trace_id: self.trace_id.clone(),
            parent_span_id: Some(new_span_id.into()),
            request_id: Uuid::new_v4().to_string(),
            state: HashMap::new(),
        }
    }
}

impl Default for AgentContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_has_distinct_ids() {
        let a = AgentContext::new();
        let b = AgentContext::new();
        assert_ne!(a.trace_id, b.trace_id);
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_fork_preserves_trace_but_not_turn_count() {
        let mut parent = AgentContext::new();
        parent.push(ResponseInputItem::user_text("hi"));
        parent.increment_turn();

        let child = parent.fork("span-2");
        assert_eq!(child.trace_id, parent.trace_id);
        assert_eq!(child.parent_span_id.as_deref(), Some("span-2"));
        assert_eq!(child.turn_count, 0);
        assert_eq!(child.history.len(), 1);
    }

    #[test]
    fn test_fork_isolated_drops_history() {
        let mut parent = AgentContext::new();
        parent.push(ResponseInputItem::user_text("secret"));
        let child = parent.fork_isolated("span-3");
        assert!(child.history.is_empty());
        assert_eq!(child.trace_id, parent.trace_id);
    }

    #[test]
    fn test_copy_is_independent() {
        let mut original = AgentContext::new();
        original.push(ResponseInputItem::user_text("hi"));
        let mut copied = original.copy();
        copied.push(ResponseInputItem::user_text("more"));
        assert_eq!(original.history.len(), 1);
        assert_eq!(copied.history.len(), 2);
    }
}
