//! Input and output guardrails.
//!
//! Grounded on `qntx-machi`'s `crate::guardrail` module: guardrails are
//! async trait objects checked before the first LLM call (input) and
//! before a candidate final answer is delivered (output), with sequential
//! and parallel execution both supported by the loop.

use crate::context::AgentContext;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Outcome of a single guardrail check.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardrailResult {
    pub passed: bool,
    pub reason: Option<String>,
    pub suggestion: Option<String>,
    pub guardrail_name: String,
}

impl GuardrailResult {
    pub fn pass(name: impl Into<String>) -> Self {
        Self { passed: true, reason: None, suggestion: None, guardrail_name: name.into() }
    }

    pub fn fail(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { passed: false, reason: Some(reason.into()), suggestion: None, guardrail_name: name.into() }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Checked against the user's raw input before the first LLM call of a
/// turn.
#[async_trait]
pub trait InputGuardrail: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self, input: &str, context: &AgentContext) -> Result<GuardrailResult>;
}

/// Checked against a candidate final answer before it's returned to the
/// caller.
#[async_trait]
pub trait OutputGuardrail: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self, output: &str, context: &AgentContext) -> Result<GuardrailResult>;
}

/// Run every input guardrail sequentially, stopping (and reporting) at the
/// first failure. Sequential order matters when later guardrails assume
/// earlier ones already narrowed the input (e.g. a PII redactor running
/// before a profanity filter).
pub async fn run_input_guardrails_sequential(
    guardrails: &[Arc<dyn InputGuardrail>],
    input: &str,
    context: &AgentContext,
) -> Result<()> {
    for guardrail in guardrails {
        let result = guardrail.check(input, context).await?;
        if !result.passed {
            let mut err = Error::input_guardrail(
                result.reason.clone().unwrap_or_else(|| format!("{} rejected the input", result.guardrail_name)),
            );
            if let Some(s) = result.suggestion {
                err = err.with_suggestion(s);
            }
            return Err(err);
        }
    }
    Ok(())
}

/// Run every input guardrail concurrently; any single failure fails the
/// whole batch. Use when guardrails are independent checks (profanity,
/// PII, jailbreak detection) and latency matters more than ordering.
pub async fn run_input_guardrails_parallel(
    guardrails: &[Arc<dyn InputGuardrail>],
    input: &str,
    context: &AgentContext,
) -> Result<()> {
    let checks = guardrails.iter().map(|g| g.check(input, context));
    let results = futures::future::try_join_all(checks).await?;
    for result in results {
        if !result.passed {
            let mut err = Error::input_guardrail(
                result.reason.clone().unwrap_or_else(|| format!("{} rejected the input", result.guardrail_name)),
            );
            if let Some(s) = result.suggestion {
                err = err.with_suggestion(s);
            }
            return Err(err);
        }
    }
    Ok(())
}

/// Run every output guardrail sequentially.
pub async fn run_output_guardrails_sequential(
    guardrails: &[Arc<dyn OutputGuardrail>],
    output: &str,
    context: &AgentContext,
) -> Result<()> {
    for guardrail in guardrails {
        let result = guardrail.check(output, context).await?;
        if !result.passed {
            let mut err = Error::output_guardrail(
                result.reason.clone().unwrap_or_else(|| format!("{} rejected the output", result.guardrail_name)),
            );
            if let Some(s) = result.suggestion {
                err = err.with_suggestion(s);
            }
            return Err(err);
        }
    }
    Ok(())
}

/// Run every output guardrail concurrently.
pub async fn run_output_guardrails_parallel(
    guardrails: &[Arc<dyn OutputGuardrail>],
    output: &str,
    context: &AgentContext,
) -> Result<()> {
    let checks = guardrails.iter().map(|g| g.check(output, context));
    let results = futures::future::try_join_all(checks).await?;
    for result in results {
        if !result.passed {
            let mut err = Error::output_guardrail(
                result.reason.clone().unwrap_or_else(|| format!("{} rejected the output", result.guardrail_name)),
            );
            if let Some(s) = result.suggestion {
                err = err.with_suggestion(s);
            }
            return Err(err);
        }
    }
    Ok(())
}

/// Process-wide, name-keyed registry so a `Blueprint` can reference
/// guardrails by stable string id instead of serializing closures.
#[derive(Clone, Default)]
pub struct GuardrailRegistry {
    input: Arc<RwLock<HashMap<String, Arc<dyn InputGuardrail>>>>,
    output: Arc<RwLock<HashMap<String, Arc<dyn OutputGuardrail>>>>,
}

impl GuardrailRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_input(&self, id: impl Into<String>, guardrail: Arc<dyn InputGuardrail>) {
        self.input.write().expect("guardrail registry lock poisoned").insert(id.into(), guardrail);
    }

    pub fn register_output(&self, id: impl Into<String>, guardrail: Arc<dyn OutputGuardrail>) {
        self.output.write().expect("guardrail registry lock poisoned").insert(id.into(), guardrail);
    }

    pub fn input(&self, id: &str) -> Option<Arc<dyn InputGuardrail>> {
        self.input.read().expect("guardrail registry lock poisoned").get(id).cloned()
    }

    pub fn output(&self, id: &str) -> Option<Arc<dyn OutputGuardrail>> {
        self.output.read().expect("guardrail registry lock poisoned").get(id).cloned()
    }

    pub fn resolve_inputs(&self, ids: &[String]) -> Result<Vec<Arc<dyn InputGuardrail>>> {
        ids.iter()
            .map(|id| {
                self.input(id)
                    .ok_or_else(|| Error::configuration(format!("unknown input guardrail id: {id}")))
            })
            .collect()
    }

    pub fn resolve_outputs(&self, ids: &[String]) -> Result<Vec<Arc<dyn OutputGuardrail>>> {
        ids.iter()
            .map(|id| {
                self.output(id)
                    .ok_or_else(|| Error::configuration(format!("unknown output guardrail id: {id}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AgentContext;

    struct RejectsBanned;

    #[async_trait]
    impl InputGuardrail for RejectsBanned {
        fn name(&self) -> &str {
            "rejects_banned"
        }

        async fn check(&self, input: &str, _context: &AgentContext) -> Result<GuardrailResult> {
            if input.contains("banned") {
                Ok(GuardrailResult::fail(self.name(), "input contains a banned term"))
            } else {
                Ok(GuardrailResult::pass(self.name()))
            }
        }
    }

    struct AlwaysPassesOutput;

    #[async_trait]
    impl OutputGuardrail for AlwaysPassesOutput {
        fn name(&self) -> &str {
            "always_passes"
        }

        async fn check(&self, _output: &str, _context: &AgentContext) -> Result<GuardrailResult> {
            Ok(GuardrailResult::pass(self.name()))
        }
    }

    #[tokio::test]
    async fn test_sequential_input_guardrail_rejects() {
        let context = AgentContext::new();
        let guardrails: Vec<Arc<dyn InputGuardrail>> = vec![Arc::new(RejectsBanned)];
        let result = run_input_guardrails_sequential(&guardrails, "this has a banned word", &context).await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind, crate::ErrorKind::InputGuardrail);
    }

    #[tokio::test]
    async fn test_sequential_input_guardrail_passes() {
        let context = AgentContext::new();
        let guardrails: Vec<Arc<dyn InputGuardrail>> = vec![Arc::new(RejectsBanned)];
        let result = run_input_guardrails_sequential(&guardrails, "clean input", &context).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_parallel_output_guardrails_pass() {
        let context = AgentContext::new();
        let guardrails: Vec<Arc<dyn OutputGuardrail>> = vec![Arc::new(AlwaysPassesOutput)];
        let result = run_output_guardrails_parallel(&guardrails, "final answer", &context).await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_registry_resolve_unknown_id_is_configuration_error() {
        let registry = GuardrailRegistry::new();
        let err = registry.resolve_inputs(&["missing".to_string()]).unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::Configuration);
    }

    #[test]
    fn test_registry_round_trip() {
        let registry = GuardrailRegistry::new();
        registry.register_input("banned", Arc::new(RejectsBanned));
        assert!(registry.input("banned").is_some());
        let resolved = registry.resolve_inputs(&["banned".to_string()]).unwrap();
        assert_eq!(resolved.len(), 1);
    }
}
