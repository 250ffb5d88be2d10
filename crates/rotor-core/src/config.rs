//! Operator configuration
//!
//! The whole configuration is one JSON document owned by the interactive
//! tooling; the engine re-reads it at every tick boundary and never
//! writes it. Loading validates the document exhaustively so the engine
//! only ever operates on well-typed, cross-referenced values, and a
//! validation failure rejects the whole document naming the first
//! offending entity.
//!
//! Writes (used by the configuration tooling, not the engine) go through
//! [`Config::save`]: serialize to a temporary sibling, fsync, rename.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::traits::dns_provider::RecordKind;

/// Jobs may not fire more often than this
pub const MIN_INTERVAL_MINUTES: u32 = 5;

/// A named credential bundle authorizing provider access
#[derive(Clone, Serialize, Deserialize)]
pub struct Account {
    /// Stable opaque id
    pub id: String,
    /// Display name
    pub name: String,
    /// Provider API token. Never logged.
    pub token: String,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("token", &"<REDACTED>")
            .finish()
    }
}

/// A cached reference to a provider-owned DNS zone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneRef {
    /// Provider-assigned zone id
    pub id: String,
    /// Owning account
    pub account_id: String,
    /// Apex domain
    pub name: String,
}

/// A scheduled rotation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Stable opaque id
    pub id: String,
    /// Account whose credentials apply
    pub account_id: String,
    /// Zone the records live in
    pub zone_id: String,
    /// Minimum minutes between firings (floor: [`MIN_INTERVAL_MINUTES`])
    pub interval_minutes: u32,
    /// Disabled jobs are skipped without evaluation
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Kind-specific payload
    #[serde(flatten)]
    pub spec: JobSpec,
}

/// Kind-specific rotation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobSpec {
    /// Rotate one record through an ordered IP pool
    Single {
        record_id: String,
        record_type: RecordKind,
        ip_pool: Vec<IpAddr>,
    },
    /// Slide a window of pool IPs across an ordered set of records
    MultiPool {
        record_ids: Vec<String>,
        record_type: RecordKind,
        ip_pool: Vec<IpAddr>,
    },
    /// Cyclically shift the live values of an ordered set of records
    Shuffle {
        record_ids: Vec<String>,
        #[serde(default = "default_shift")]
        shift: u32,
    },
}

impl JobSpec {
    /// Kind name for logs
    pub fn kind_name(&self) -> &'static str {
        match self {
            JobSpec::Single { .. } => "single",
            JobSpec::MultiPool { .. } => "multi_pool",
            JobSpec::Shuffle { .. } => "shuffle",
        }
    }
}

/// Calendar window a traffic trigger measures over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    Daily,
    Weekly,
    Monthly,
}

/// A traffic-usage alert threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    /// Stable opaque id
    pub id: String,
    /// Agent whose totals are compared
    pub agent_id: String,
    /// Calendar window measured
    pub window: Window,
    /// Threshold in gigabytes
    pub limit_gb: f64,
    /// Operator-facing label used in the alert
    pub label: String,
}

/// A registered traffic-measurement agent
#[derive(Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Stable opaque id
    pub id: String,
    /// Display name
    pub name: String,
    /// Agent endpoint base URL
    pub base_url: String,
    /// Agent API key. Never logged.
    pub api_key: String,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

/// The full operator configuration
///
/// Fields are private; access goes through the per-entity accessors and
/// mutators below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    accounts: Vec<Account>,
    #[serde(default)]
    zones: Vec<ZoneRef>,
    #[serde(default)]
    jobs: Vec<Job>,
    #[serde(default)]
    triggers: Vec<Trigger>,
    #[serde(default)]
    agents: Vec<Agent>,
}

impl Config {
    /// Empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate the configuration document
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::config(format!("failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration atomically: temp sibling, fsync, rename
    ///
    /// Refuses to create the file when the containing directory is
    /// missing — that means the installation is broken and silently
    /// creating directories would hide it.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.validate()?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            return Err(Error::config(format!(
                "config directory does not exist: {}",
                parent.display()
            )));
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::config(format!("failed to serialize config: {}", e)))?;

        let mut tmp = path.to_path_buf();
        tmp.set_extension("tmp");
        {
            let mut file = fs::File::create(&tmp).await.map_err(|e| {
                Error::config(format!(
                    "cannot write config directory (check ownership): {}: {}",
                    tmp.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes())
                .await
                .map_err(|e| Error::config(format!("failed to write {}: {}", tmp.display(), e)))?;
            file.sync_all()
                .await
                .map_err(|e| Error::config(format!("failed to sync {}: {}", tmp.display(), e)))?;
        }

        fs::rename(&tmp, path).await.map_err(|e| {
            Error::config(format!(
                "failed to rename {} to {}: {}",
                tmp.display(),
                path.display(),
                e
            ))
        })?;
        Ok(())
    }

    /// Validate the whole document; the first offending entity's id is
    /// named in the error
    pub fn validate(&self) -> Result<()> {
        let mut account_ids = HashSet::new();
        for account in &self.accounts {
            if !account_ids.insert(account.id.as_str()) {
                return Err(Error::config(format!("duplicate account id: {}", account.id)));
            }
            if account.token.is_empty() {
                return Err(Error::config(format!("account {}: empty token", account.id)));
            }
        }

        for zone in &self.zones {
            if self.account(&zone.account_id).is_none() {
                return Err(Error::config(format!(
                    "zone {}: unknown account {}",
                    zone.id, zone.account_id
                )));
            }
        }

        let mut job_ids = HashSet::new();
        for job in &self.jobs {
            if !job_ids.insert(job.id.as_str()) {
                return Err(Error::config(format!("duplicate job id: {}", job.id)));
            }
            self.validate_job(job)?;
        }

        let mut agent_ids = HashSet::new();
        for agent in &self.agents {
            if !agent_ids.insert(agent.id.as_str()) {
                return Err(Error::config(format!("duplicate agent id: {}", agent.id)));
            }
            if agent.base_url.is_empty() {
                return Err(Error::config(format!("agent {}: empty base_url", agent.id)));
            }
        }

        for trigger in &self.triggers {
            if self.agent(&trigger.agent_id).is_none() {
                return Err(Error::config(format!(
                    "trigger {}: unknown agent {}",
                    trigger.id, trigger.agent_id
                )));
            }
            if trigger.limit_gb <= 0.0 {
                return Err(Error::config(format!(
                    "trigger {}: limit_gb must be positive",
                    trigger.id
                )));
            }
        }

        Ok(())
    }

    fn validate_job(&self, job: &Job) -> Result<()> {
        if self.account(&job.account_id).is_none() {
            return Err(Error::config(format!(
                "job {}: unknown account {}",
                job.id, job.account_id
            )));
        }
        let Some(zone) = self.zone(&job.zone_id) else {
            return Err(Error::config(format!(
                "job {}: unknown zone {}",
                job.id, job.zone_id
            )));
        };
        if zone.account_id != job.account_id {
            return Err(Error::config(format!(
                "job {}: zone {} belongs to account {}, not {}",
                job.id, zone.id, zone.account_id, job.account_id
            )));
        }
        if job.interval_minutes < MIN_INTERVAL_MINUTES {
            return Err(Error::config(format!(
                "job {}: interval_minutes {} below minimum {}",
                job.id, job.interval_minutes, MIN_INTERVAL_MINUTES
            )));
        }

        match &job.spec {
            JobSpec::Single {
                record_id,
                record_type,
                ip_pool,
            } => {
                if record_id.is_empty() {
                    return Err(Error::config(format!("job {}: empty record_id", job.id)));
                }
                validate_pool(&job.id, *record_type, ip_pool, 1)?;
            }
            JobSpec::MultiPool {
                record_ids,
                record_type,
                ip_pool,
            } => {
                if record_ids.is_empty() {
                    return Err(Error::config(format!("job {}: no record_ids", job.id)));
                }
                validate_pool(&job.id, *record_type, ip_pool, record_ids.len())?;
            }
            JobSpec::Shuffle { record_ids, shift } => {
                if record_ids.len() < 2 {
                    return Err(Error::config(format!(
                        "job {}: shuffle needs at least 2 records",
                        job.id
                    )));
                }
                if *shift == 0 || *shift as usize >= record_ids.len() {
                    return Err(Error::config(format!(
                        "job {}: shift {} out of range 1..{}",
                        job.id,
                        shift,
                        record_ids.len()
                    )));
                }
            }
        }
        Ok(())
    }

    // ---- accessors ----

    /// Look up an account by id
    pub fn account(&self, id: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }

    /// Look up a zone reference by id
    pub fn zone(&self, id: &str) -> Option<&ZoneRef> {
        self.zones.iter().find(|z| z.id == id)
    }

    /// Look up an agent by id
    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// All jobs, in configuration order
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// All accounts
    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// All zone references
    pub fn zones(&self) -> &[ZoneRef] {
        &self.zones
    }

    /// All triggers
    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// All agents
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    // ---- mutators (used by the configuration tooling) ----

    /// Insert or replace an account
    pub fn upsert_account(&mut self, account: Account) {
        match self.accounts.iter_mut().find(|a| a.id == account.id) {
            Some(slot) => *slot = account,
            None => self.accounts.push(account),
        }
    }

    /// Remove an account. Refused while any zone references it.
    pub fn remove_account(&mut self, id: &str) -> Result<()> {
        if let Some(zone) = self.zones.iter().find(|z| z.account_id == id) {
            return Err(Error::config(format!(
                "account {} still referenced by zone {}",
                id, zone.id
            )));
        }
        self.accounts.retain(|a| a.id != id);
        Ok(())
    }

    /// Insert or replace a zone reference
    pub fn upsert_zone(&mut self, zone: ZoneRef) {
        match self.zones.iter_mut().find(|z| z.id == zone.id) {
            Some(slot) => *slot = zone,
            None => self.zones.push(zone),
        }
    }

    /// Remove a zone reference. Refused while any job references it.
    pub fn remove_zone(&mut self, id: &str) -> Result<()> {
        if let Some(job) = self.jobs.iter().find(|j| j.zone_id == id) {
            return Err(Error::config(format!(
                "zone {} still referenced by job {}",
                id, job.id
            )));
        }
        self.zones.retain(|z| z.id != id);
        Ok(())
    }

    /// Insert or replace a job
    pub fn upsert_job(&mut self, job: Job) {
        match self.jobs.iter_mut().find(|j| j.id == job.id) {
            Some(slot) => *slot = job,
            None => self.jobs.push(job),
        }
    }

    /// Remove a job
    pub fn remove_job(&mut self, id: &str) {
        self.jobs.retain(|j| j.id != id);
    }

    /// Insert or replace a trigger
    pub fn upsert_trigger(&mut self, trigger: Trigger) {
        match self.triggers.iter_mut().find(|t| t.id == trigger.id) {
            Some(slot) => *slot = trigger,
            None => self.triggers.push(trigger),
        }
    }

    /// Remove a trigger
    pub fn remove_trigger(&mut self, id: &str) {
        self.triggers.retain(|t| t.id != id);
    }

    /// Insert or replace an agent
    pub fn upsert_agent(&mut self, agent: Agent) {
        match self.agents.iter_mut().find(|a| a.id == agent.id) {
            Some(slot) => *slot = agent,
            None => self.agents.push(agent),
        }
    }

    /// Remove an agent. Refused while any trigger references it.
    pub fn remove_agent(&mut self, id: &str) -> Result<()> {
        if let Some(trigger) = self.triggers.iter().find(|t| t.agent_id == id) {
            return Err(Error::config(format!(
                "agent {} still referenced by trigger {}",
                id, trigger.id
            )));
        }
        self.agents.retain(|a| a.id != id);
        Ok(())
    }
}

fn validate_pool(job_id: &str, kind: RecordKind, pool: &[IpAddr], min_len: usize) -> Result<()> {
    if pool.len() < min_len {
        return Err(Error::config(format!(
            "job {}: ip_pool has {} entries, needs at least {}",
            job_id,
            pool.len(),
            min_len
        )));
    }
    for ip in pool {
        if !kind.matches(*ip) {
            return Err(Error::config(format!(
                "job {}: pool entry {} does not match record type {}",
                job_id, ip, kind
            )));
        }
    }
    Ok(())
}

fn default_enabled() -> bool {
    true
}

fn default_shift() -> u32 {
    1
}
