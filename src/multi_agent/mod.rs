//! Composition patterns built on top of [`crate::agent::Agent`]: classify-
//! and-delegate routing, supervisor/worker and multi-level hierarchies,
//! concurrent fan-out, round-robin peer discussion, and wrapping an agent
//! as a plain tool.

mod hierarchy;
mod network;
mod parallel;
mod router;
mod subagent;
mod supervisor;

pub use hierarchy::Hierarchy;
pub use network::{AgentNetwork, Contribution};
pub use parallel::ParallelAgents;
pub use router::{Router, RouterBuilder};
pub use subagent::agent_as_tool;
pub use supervisor::SupervisorBuilder;
