//! Test doubles and fixtures for the engine contract tests
//!
//! The engine is driven through `tick()` with a manual clock, so cadence
//! assertions are exact instead of sleep-based.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rotor_core::config::{Account, Agent, Config, Job, JobSpec, Trigger, Window, ZoneRef};
use rotor_core::traits::dns_provider::{
    DnsProvider, DnsRecord, ProviderFactory, RecordKind, TokenCheck, Zone,
};
use rotor_core::traits::traffic_agent::{AgentFactory, TrafficAgent, UsageTotals};
use rotor_core::{Clock, EngineOptions, Error, MemoryStateStore, Result, RotationEngine};

/// Fixed test epoch: 2025-08-13 12:00:00 UTC
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 13, 12, 0, 0).unwrap()
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn ips(list: &[&str]) -> Vec<IpAddr> {
    list.iter().map(|s| ip(s)).collect()
}

/// A clock the test advances by hand
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn at(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(start)))
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.0.lock().unwrap() = to;
    }

    pub fn advance_minutes(&self, minutes: i64) {
        let mut now = self.0.lock().unwrap();
        *now += chrono::Duration::minutes(minutes);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// How the mock provider should fail updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailKind {
    Transient,
    Auth,
    NotFound,
}

impl FailKind {
    fn to_error(self, record_id: &str) -> Error {
        match self {
            FailKind::Transient => Error::transient(format!("502 updating {}", record_id)),
            FailKind::Auth => Error::auth(format!("token lacks edit on {}", record_id)),
            FailKind::NotFound => Error::record(format!("record {} not found", record_id)),
        }
    }
}

/// In-memory DNS provider double with programmable failures
#[derive(Default)]
pub struct MockDnsProvider {
    records: Mutex<HashMap<String, DnsRecord>>,
    reads: Mutex<Vec<String>>,
    updates: Mutex<Vec<(String, IpAddr)>>,
    fail_all_updates: Mutex<Option<FailKind>>,
    fail_records: Mutex<HashMap<String, FailKind>>,
}

impl MockDnsProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_record(&self, id: &str, kind: RecordKind, value: &str) {
        self.records.lock().unwrap().insert(
            id.to_string(),
            DnsRecord {
                id: id.to_string(),
                name: format!("{}.example.com", id),
                kind,
                value: ip(value),
                proxied: false,
                ttl: 300,
            },
        );
    }

    pub fn record_value(&self, id: &str) -> IpAddr {
        self.records.lock().unwrap().get(id).expect("record seeded").value
    }

    /// All update calls issued so far, in order
    pub fn updates(&self) -> Vec<(String, IpAddr)> {
        self.updates.lock().unwrap().clone()
    }

    /// All `get_record` calls issued so far, in order
    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    /// Fail every subsequent update with the given kind
    pub fn fail_updates_with(&self, kind: FailKind) {
        *self.fail_all_updates.lock().unwrap() = Some(kind);
    }

    /// Fail updates of one record transiently
    pub fn fail_record(&self, id: &str) {
        self.fail_record_with(id, FailKind::Transient);
    }

    /// Fail updates of one record with the given kind
    pub fn fail_record_with(&self, id: &str, kind: FailKind) {
        self.fail_records
            .lock()
            .unwrap()
            .insert(id.to_string(), kind);
    }

    pub fn clear_failures(&self) {
        *self.fail_all_updates.lock().unwrap() = None;
        self.fail_records.lock().unwrap().clear();
    }
}

#[async_trait]
impl DnsProvider for MockDnsProvider {
    async fn list_zones(&self) -> Result<Vec<Zone>> {
        Ok(vec![Zone {
            id: "zone-1".into(),
            name: "example.com".into(),
        }])
    }

    async fn list_records(
        &self,
        _zone_id: &str,
        kind: Option<RecordKind>,
    ) -> Result<Vec<DnsRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| kind.is_none_or(|k| r.kind == k))
            .cloned()
            .collect())
    }

    async fn get_record(&self, _zone_id: &str, record_id: &str) -> Result<DnsRecord> {
        self.reads.lock().unwrap().push(record_id.to_string());
        self.records
            .lock()
            .unwrap()
            .get(record_id)
            .cloned()
            .ok_or_else(|| Error::record(format!("record {} not found", record_id)))
    }

    async fn update_record(
        &self,
        _zone_id: &str,
        record_id: &str,
        value: IpAddr,
    ) -> Result<DnsRecord> {
        if let Some(kind) = *self.fail_all_updates.lock().unwrap() {
            return Err(kind.to_error(record_id));
        }
        if let Some(kind) = self.fail_records.lock().unwrap().get(record_id).copied() {
            return Err(kind.to_error(record_id));
        }

        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(record_id)
            .ok_or_else(|| Error::record(format!("record {} not found", record_id)))?;
        record.value = value;
        let updated = record.clone();
        drop(records);

        self.updates
            .lock()
            .unwrap()
            .push((record_id.to_string(), value));
        Ok(updated)
    }

    async fn verify_token(&self) -> Result<TokenCheck> {
        Ok(TokenCheck {
            valid: true,
            missing_permissions: Vec::new(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Factory handing every account the same shared mock
pub struct SharedProviderFactory(pub Arc<MockDnsProvider>);

impl ProviderFactory for SharedProviderFactory {
    fn create(&self, _account: &Account) -> Result<Arc<dyn DnsProvider>> {
        Ok(Arc::clone(&self.0) as Arc<dyn DnsProvider>)
    }
}

/// Traffic-agent double with settable totals
pub struct MockAgent {
    totals: Mutex<UsageTotals>,
    polls: AtomicUsize,
}

impl MockAgent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            totals: Mutex::new(UsageTotals {
                rx_bytes_today: 0,
                rx_bytes_this_week: 0,
                rx_bytes_this_month: 0,
                period_day: "2025-08-13".into(),
                period_week: "2025-W33".into(),
                period_month: "2025-08".into(),
            }),
            polls: AtomicUsize::new(0),
        })
    }

    pub fn set_month_usage(&self, gb: f64, period: &str) {
        let mut totals = self.totals.lock().unwrap();
        totals.rx_bytes_this_month = (gb * 1_000_000_000.0) as u64;
        totals.period_month = period.to_string();
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrafficAgent for MockAgent {
    async fn totals(&self) -> Result<UsageTotals> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(self.totals.lock().unwrap().clone())
    }

    fn agent_name(&self) -> &str {
        "mock-agent"
    }
}

/// Factory handing every trigger the same shared mock agent
pub struct SharedAgentFactory(pub Arc<MockAgent>);

impl AgentFactory for SharedAgentFactory {
    fn create(&self, _agent: &Agent) -> Result<Arc<dyn TrafficAgent>> {
        Ok(Arc::clone(&self.0) as Arc<dyn TrafficAgent>)
    }
}

// ---- config fixtures ----

/// One account ("acct-1") owning one zone ("zone-1")
pub fn base_config() -> Config {
    let mut config = Config::new();
    config.upsert_account(Account {
        id: "acct-1".into(),
        name: "primary".into(),
        token: "test-token".into(),
    });
    config.upsert_zone(ZoneRef {
        id: "zone-1".into(),
        account_id: "acct-1".into(),
        name: "example.com".into(),
    });
    config
}

pub fn single_job(id: &str, record_id: &str, interval: u32, pool: &[&str]) -> Job {
    Job {
        id: id.into(),
        account_id: "acct-1".into(),
        zone_id: "zone-1".into(),
        interval_minutes: interval,
        enabled: true,
        spec: JobSpec::Single {
            record_id: record_id.into(),
            record_type: RecordKind::A,
            ip_pool: ips(pool),
        },
    }
}

pub fn multi_pool_job(id: &str, record_ids: &[&str], interval: u32, pool: &[&str]) -> Job {
    Job {
        id: id.into(),
        account_id: "acct-1".into(),
        zone_id: "zone-1".into(),
        interval_minutes: interval,
        enabled: true,
        spec: JobSpec::MultiPool {
            record_ids: record_ids.iter().map(|s| s.to_string()).collect(),
            record_type: RecordKind::A,
            ip_pool: ips(pool),
        },
    }
}

pub fn shuffle_job(id: &str, record_ids: &[&str], interval: u32, shift: u32) -> Job {
    Job {
        id: id.into(),
        account_id: "acct-1".into(),
        zone_id: "zone-1".into(),
        interval_minutes: interval,
        enabled: true,
        spec: JobSpec::Shuffle {
            record_ids: record_ids.iter().map(|s| s.to_string()).collect(),
            shift,
        },
    }
}

pub fn monthly_trigger(id: &str, limit_gb: f64) -> (Trigger, Agent) {
    (
        Trigger {
            id: id.into(),
            agent_id: "agent-1".into(),
            window: Window::Monthly,
            limit_gb,
            label: "vps traffic".into(),
        },
        Agent {
            id: "agent-1".into(),
            name: "vps".into(),
            base_url: "http://10.0.0.5:9000".into(),
            api_key: "key".into(),
        },
    )
}

// ---- engine wiring ----

/// Everything a contract test needs, pre-wired
pub struct TestWorld {
    _dir: tempfile::TempDir,
    pub config_path: PathBuf,
    pub provider: Arc<MockDnsProvider>,
    pub agent: Arc<MockAgent>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStateStore>,
    pub engine: RotationEngine,
}

impl TestWorld {
    /// Persist the config document and build an engine around the mocks.
    /// Triggers are evaluated every tick so sub-cadence does not get in
    /// the way of scenario tests.
    pub async fn new(config: Config) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        config.save(&config_path).await.unwrap();

        let provider = MockDnsProvider::new();
        let agent = MockAgent::new();
        let clock = ManualClock::at(t0());
        let store = Arc::new(MemoryStateStore::new());

        let engine = RotationEngine::new(
            &config_path,
            Arc::clone(&store) as Arc<dyn rotor_core::StateStore>,
            Box::new(SharedProviderFactory(Arc::clone(&provider))),
            Box::new(SharedAgentFactory(Arc::clone(&agent))),
            Arc::clone(&clock) as Arc<dyn Clock>,
            EngineOptions {
                trigger_every_ticks: 1,
                ..EngineOptions::default()
            },
        );

        Self {
            _dir: dir,
            config_path,
            provider,
            agent,
            clock,
            store,
            engine,
        }
    }

    /// The persisted state of one job
    pub async fn job_state(&self, job_id: &str) -> rotor_core::JobState {
        use rotor_core::StateStore;
        self.store.job_state(job_id).await.unwrap()
    }
}
