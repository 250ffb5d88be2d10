// # HTTP Traffic Agent
//
// Implements the `TrafficAgent` trait over a per-host measurement
// agent's HTTP endpoint. One GET per poll, no retries (the trigger
// evaluator simply tries again at its next sub-cadence pass), API key
// never logged.
//
// Endpoint contract:
//
// ```http
// GET {base_url}/v1/usage
// X-Api-Key: <key>
//
// {
//   "rx_bytes_today": 123,
//   "rx_bytes_this_week": 456,
//   "rx_bytes_this_month": 789,
//   "periods": { "daily": "2025-08-13", "weekly": "2025-W33", "monthly": "2025-08" }
// }
// ```

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use rotor_core::config::Agent;
use rotor_core::traits::traffic_agent::{AgentFactory, TrafficAgent, UsageTotals};
use rotor_core::{Error, Result};

/// Per-request timeout
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct UsagePayload {
    rx_bytes_today: u64,
    rx_bytes_this_week: u64,
    rx_bytes_this_month: u64,
    periods: Periods,
}

#[derive(Debug, Deserialize)]
struct Periods {
    daily: String,
    weekly: String,
    monthly: String,
}

/// HTTP client for one traffic-measurement agent
pub struct HttpTrafficAgent {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpTrafficAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTrafficAgent")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

impl HttpTrafficAgent {
    /// Create a client for the given agent endpoint
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        let base_url = base_url.into();
        if base_url.is_empty() {
            return Err(Error::config("agent base_url cannot be empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            name: name.into(),
            base_url,
            api_key: api_key.into(),
            client,
        })
    }
}

#[async_trait]
impl TrafficAgent for HttpTrafficAgent {
    async fn totals(&self) -> Result<UsageTotals> {
        let url = format!("{}/v1/usage", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| Error::transient(format!("agent request failed: {}", e)))?;

        let status = response.status();
        if matches!(status.as_u16(), 401 | 403) {
            return Err(Error::auth(format!(
                "agent {} rejected the API key ({})",
                self.name, status
            )));
        }
        if !status.is_success() {
            return Err(Error::transient(format!(
                "agent {} returned {}",
                self.name, status
            )));
        }

        let payload: UsagePayload = response
            .json()
            .await
            .map_err(|e| Error::transient(format!("agent {} sent malformed usage: {}", self.name, e)))?;

        tracing::debug!(
            agent = %self.name,
            month = payload.rx_bytes_this_month,
            "usage polled"
        );
        Ok(UsageTotals {
            rx_bytes_today: payload.rx_bytes_today,
            rx_bytes_this_week: payload.rx_bytes_this_week,
            rx_bytes_this_month: payload.rx_bytes_this_month,
            period_day: payload.periods.daily,
            period_week: payload.periods.weekly,
            period_month: payload.periods.monthly,
        })
    }

    fn agent_name(&self) -> &str {
        &self.name
    }
}

/// Factory handing the engine one client per configured agent
pub struct HttpAgentFactory;

impl AgentFactory for HttpAgentFactory {
    fn create(&self, agent: &Agent) -> Result<Arc<dyn TrafficAgent>> {
        Ok(Arc::new(HttpTrafficAgent::new(
            agent.name.clone(),
            agent.base_url.clone(),
            agent.api_key.clone(),
        )?))
    }
}
