//! Traffic-measurement agent trait
//!
//! The optional trigger evaluator consumes accumulated traffic totals
//! from a per-host agent. Only the consuming side lives here; the agent's
//! HTTP endpoint is an external collaborator.

use async_trait::async_trait;

use crate::config::Agent;
use crate::error::Result;

/// Accumulated receive totals for the three calendar windows, with the
/// agent-supplied identifier of the period each total belongs to
/// (e.g. "2025-08-13", "2025-W33", "2025-08").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageTotals {
    pub rx_bytes_today: u64,
    pub rx_bytes_this_week: u64,
    pub rx_bytes_this_month: u64,
    pub period_day: String,
    pub period_week: String,
    pub period_month: String,
}

/// Interface over one host's traffic-measurement agent
#[async_trait]
pub trait TrafficAgent: Send + Sync {
    /// Read the agent's current window totals
    async fn totals(&self) -> Result<UsageTotals>;

    /// Agent name for logging
    fn agent_name(&self) -> &str;
}

/// Constructs traffic agents from their configuration entries
pub trait AgentFactory: Send + Sync {
    /// Create an agent client for the given configuration entry
    fn create(&self, agent: &Agent) -> Result<std::sync::Arc<dyn TrafficAgent>>;
}
