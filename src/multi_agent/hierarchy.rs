//! Hierarchy: build a level (manager over workers, or executive over
//! managers) by wiring named sub-agents onto a coordinator's options. The
//! same operation builds every level, so an arbitrary-depth hierarchy is
//! just repeated calls, bottom-up.
//!
//! Grounded on [`crate::agent::AgentOptionsBuilder::sub_agent`]; a
//! hierarchy is nothing more than nested supervisors, so this module adds
//! no new mechanism over [`crate::multi_agent::supervisor::SupervisorBuilder`],
//! only the "tools are named after the level below" framing.

use crate::agent::{Agent, AgentOptionsBuilder, SubAgentSharePolicy};
use crate::error::Result;
use crate::responder::Responder;
use std::sync::Arc;

pub struct Hierarchy;

impl Hierarchy {
    /// Build one coordinator level: `options` becomes an `Agent` with each
    /// of `subordinates` registered as a sub-agent tool under its given
    /// name. Call once per level, bottom-up — workers first, then the
    /// managers that coordinate them, then the executive that coordinates
    /// the managers.
    pub fn build_level(
        options: AgentOptionsBuilder,
        subordinates: Vec<(String, Arc<Agent>)>,
        responder: Arc<Responder>,
    ) -> Result<Agent> {
        let mut options = options;
        for (name, subordinate) in subordinates {
            options = options.sub_agent(name, subordinate, SubAgentSharePolicy::default());
        }
        Ok(Agent::new(options.build()?, responder))
    }
}
