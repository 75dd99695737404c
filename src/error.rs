//! Error taxonomy for the agent runtime.
//!
//! The closed set of [`ErrorKind`]s mirrors the error table in the design:
//! every failure the runtime can produce is classified into exactly one kind,
//! carries a stable code (the kind itself), a human-readable message, and —
//! for errors produced inside the agentic loop — the agent name, phase, and
//! turns completed so far.

use thiserror::Error as ThisError;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Closed set of error kinds. See the error table in the design notes for
/// raise conditions and retryability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// HTTP 429 after retries exhausted.
    RateLimit,
    /// HTTP 401/403.
    Authentication,
    /// HTTP 5xx after retries exhausted.
    Server,
    /// HTTP 4xx other than 401/403/429.
    InvalidRequest,
    /// Connection dropped mid-stream.
    Streaming,
    /// Missing env var, unknown registry ID, or other misconfiguration.
    Configuration,
    /// An input guardrail failed.
    InputGuardrail,
    /// An output guardrail failed.
    OutputGuardrail,
    /// A tool threw or returned an invalid payload.
    ToolExecution,
    /// A handoff target was misconfigured.
    Handoff,
    /// Final JSON did not match the requested schema.
    Parsing,
    /// The turn limit was reached without a final answer.
    MaxTurnsExceeded,
    /// A cancellation signal was observed.
    Cancelled,
}

impl ErrorKind {
    /// Whether the transport layer should retry a request that failed with
    /// this classification. Only meaningful for kinds the Responder itself
    /// can raise (`RateLimit`, `Server`, `Streaming`); other kinds are never
    /// produced by the retry loop and are treated as non-retryable.
    pub fn is_retryable_at_transport(self) -> bool {
        matches!(self, ErrorKind::RateLimit | ErrorKind::Server | ErrorKind::Streaming)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Server => "server",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Streaming => "streaming",
            ErrorKind::Configuration => "configuration",
            ErrorKind::InputGuardrail => "input_guardrail",
            ErrorKind::OutputGuardrail => "output_guardrail",
            ErrorKind::ToolExecution => "tool_execution",
            ErrorKind::Handoff => "handoff",
            ErrorKind::Parsing => "parsing",
            ErrorKind::MaxTurnsExceeded => "max_turns_exceeded",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// The runtime's single error type. Every fallible operation returns
/// `Result<T, Error>` rather than throwing; panics are reserved for
/// programmer bugs.
#[derive(Debug, ThisError)]
#[error("{kind}: {message}")]
pub struct Error {
    /// Stable classification, also serves as the error's `code`.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Optional actionable suggestion for the caller.
    pub suggestion: Option<String>,
    /// Underlying cause, if any.
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    /// Agent that produced the error, if raised inside the agentic loop.
    pub agent_name: Option<String>,
    /// Loop phase the error occurred in (e.g. "llm_call", "tool_exec").
    pub phase: Option<String>,
    /// Turns completed before the error, if raised inside the agentic loop.
    pub turns_completed: Option<u32>,
}

impl Error {
    /// Construct a bare error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            suggestion: None,
            cause: None,
            agent_name: None,
            phase: None,
            turns_completed: None,
        }
    }

    /// Attach an actionable suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach an underlying cause.
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Attach the agent name that produced this error.
    pub fn with_agent(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = Some(agent_name.into());
        self
    }

    /// Attach the loop phase the error occurred in.
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    /// Attach the number of turns completed before the error.
    pub fn with_turns(mut self, turns: u32) -> Self {
        self.turns_completed = Some(turns);
        self
    }

    /// `code` as surfaced to callers (the kind's stable string form).
    pub fn code(&self) -> String {
        self.kind.to_string()
    }

    pub fn rate_limit(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, msg)
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, msg)
    }

    pub fn server(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Server, msg)
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, msg)
    }

    pub fn streaming(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Streaming, msg)
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, msg)
    }

    pub fn input_guardrail(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InputGuardrail, msg)
    }

    pub fn output_guardrail(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::OutputGuardrail, msg)
    }

    pub fn tool_execution(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ToolExecution, msg)
    }

    pub fn handoff(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Handoff, msg)
    }

    pub fn parsing(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parsing, msg)
    }

    pub fn max_turns_exceeded(turns: u32) -> Self {
        Self::new(
            ErrorKind::MaxTurnsExceeded,
            format!("turn limit reached after {turns} turns without a final answer"),
        )
        .with_turns(turns)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "the interaction was cancelled")
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::parsing(e.to_string()).with_cause(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Error::streaming("request timed out").with_cause(e);
        }
        let kind = match e.status().map(|s| s.as_u16()) {
            Some(429) => ErrorKind::RateLimit,
            Some(401) | Some(403) => ErrorKind::Authentication,
            Some(s) if (500..600).contains(&s) => ErrorKind::Server,
            Some(_) => ErrorKind::InvalidRequest,
            None => ErrorKind::Streaming,
        };
        let message = e.to_string();
        Error::new(kind, message).with_cause(e)
    }
}
