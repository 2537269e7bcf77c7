//! Agent lookup.
//!
//! Agents live in another service. The ledger only needs their billing
//! snapshot, and only for withdrawals; charges carry the snapshot inline.

use std::collections::HashMap;

use async_trait::async_trait;

use credit_ledger_core::{AgentBilling, AgentId, Result};

/// Resolves agents by id.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Look up an agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be queried.
    async fn agent(&self, agent_id: &AgentId) -> Result<Option<AgentBilling>>;
}

/// In-memory directory with a fixed set of agents.
#[derive(Debug, Clone, Default)]
pub struct StaticAgentDirectory {
    agents: HashMap<AgentId, AgentBilling>,
}

impl StaticAgentDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an agent.
    #[must_use]
    pub fn with_agent(mut self, agent: AgentBilling) -> Self {
        self.insert(agent);
        self
    }

    /// Add or replace an agent.
    pub fn insert(&mut self, agent: AgentBilling) {
        self.agents.insert(agent.id.clone(), agent);
    }
}

impl FromIterator<AgentBilling> for StaticAgentDirectory {
    fn from_iter<I: IntoIterator<Item = AgentBilling>>(iter: I) -> Self {
        Self {
            agents: iter
                .into_iter()
                .map(|agent| (agent.id.clone(), agent))
                .collect(),
        }
    }
}

#[async_trait]
impl AgentDirectory for StaticAgentDirectory {
    async fn agent(&self, agent_id: &AgentId) -> Result<Option<AgentBilling>> {
        Ok(self.agents.get(agent_id).cloned())
    }
}
