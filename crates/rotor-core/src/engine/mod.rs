//! Rotation engine
//!
//! The driver that ties the pieces together. One [`RotationEngine::tick`]
//! pass: reload the configuration, evaluate every enabled job in
//! configuration order, apply the resulting updates through the
//! provider, and persist rotation state after each successful firing so
//! a crash mid-tick never duplicates an already-persisted rotation.
//!
//! Jobs fan out one task per account; a per-account mutex keeps at most
//! one provider request in flight per account while distinct accounts
//! proceed in parallel. Trigger evaluation runs on a slower sub-cadence.
//!
//! The same `tick()` backs both operating modes: an externally scheduled
//! one-shot invocation, or the internal ticker loop in [`RotationEngine::run`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::{Account, Config, Job};
use crate::error::{Error, Result};
use crate::evaluator::{self, Outcome, SkipReason};
use crate::rotation::Plan;
use crate::traits::dns_provider::{DnsProvider, ProviderFactory};
use crate::traits::state_store::{JobState, StateStore};
use crate::traits::traffic_agent::AgentFactory;
use crate::trigger::{self, Alert};

/// A tick that runs longer than this many tick periods is abandoned;
/// the remaining jobs wait for the next tick.
const TICK_TIMEOUT_FACTOR: u32 = 5;

/// Engine tuning knobs
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Interval between ticks in long-running mode
    pub tick_period: Duration,
    /// Evaluate triggers every N ticks
    pub trigger_every_ticks: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(60),
            trigger_every_ticks: 5,
        }
    }
}

/// What happened to one job during a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// At least one record update landed; state was persisted
    Fired { job_id: String },
    /// Nothing to do (not due)
    Skipped { job_id: String, reason: SkipReason },
    /// Transient failure; failure streak incremented, retried next tick
    Failed { job_id: String, error: String },
    /// Record-scope or auth fault; no retry within this tick. `auth`
    /// marks faults that poison the whole account for the tick.
    Quarantined {
        job_id: String,
        error: String,
        auth: bool,
    },
}

impl JobOutcome {
    fn job_id(&self) -> &str {
        match self {
            JobOutcome::Fired { job_id }
            | JobOutcome::Skipped { job_id, .. }
            | JobOutcome::Failed { job_id, .. }
            | JobOutcome::Quarantined { job_id, .. } => job_id,
        }
    }
}

/// Summary of one tick, for logs and tests
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub fired: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    pub quarantined: Vec<String>,
    pub alerts: Vec<Alert>,
    /// True when the tick hit its deadline and remaining jobs were dropped
    pub timed_out: bool,
}

impl TickReport {
    fn absorb(&mut self, outcome: JobOutcome) {
        let job_id = outcome.job_id().to_string();
        match outcome {
            JobOutcome::Fired { .. } => self.fired.push(job_id),
            JobOutcome::Skipped { .. } => self.skipped.push(job_id),
            JobOutcome::Failed { .. } => self.failed.push(job_id),
            JobOutcome::Quarantined { .. } => self.quarantined.push(job_id),
        }
    }
}

/// The rotation driver
///
/// All collaborators are injected: the provider and agent factories, the
/// state store, and the clock, so the contract tests run the engine
/// against doubles and a manual clock.
pub struct RotationEngine {
    config_path: PathBuf,
    state: Arc<dyn StateStore>,
    providers: Box<dyn ProviderFactory>,
    agents: Box<dyn AgentFactory>,
    clock: Arc<dyn Clock>,
    options: EngineOptions,
    /// Provider per account, rebuilt when the account's token changes
    provider_cache: std::sync::Mutex<HashMap<String, (String, Arc<dyn DnsProvider>)>>,
    /// One in-flight provider request per account
    account_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    ticks: AtomicU64,
}

impl RotationEngine {
    /// Create an engine reading its configuration from `config_path`
    pub fn new(
        config_path: impl Into<PathBuf>,
        state: Arc<dyn StateStore>,
        providers: Box<dyn ProviderFactory>,
        agents: Box<dyn AgentFactory>,
        clock: Arc<dyn Clock>,
        options: EngineOptions,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            state,
            providers,
            agents,
            clock,
            options,
            provider_cache: std::sync::Mutex::new(HashMap::new()),
            account_locks: std::sync::Mutex::new(HashMap::new()),
            ticks: AtomicU64::new(0),
        }
    }

    /// Verify every configured account's token.
    ///
    /// Returns an auth fault naming the first account whose token is
    /// invalid; intended for startup so bad credentials surface before
    /// the first tick.
    pub async fn verify_accounts(&self) -> Result<()> {
        let config = Config::load(&self.config_path).await?;
        for account in config.accounts() {
            let provider = self.provider_for(account)?;
            let check = provider.verify_token().await?;
            if !check.valid {
                return Err(Error::auth(format!(
                    "account {}: token rejected by provider",
                    account.id
                )));
            }
            if !check.missing_permissions.is_empty() {
                warn!(
                    account = %account.id,
                    missing = ?check.missing_permissions,
                    "token verified but lacks permissions"
                );
            }
        }
        Ok(())
    }

    /// Run one evaluation pass over all jobs (and, on its sub-cadence,
    /// the triggers).
    ///
    /// A configuration that fails to load or parse aborts the tick with
    /// the config fault; nothing is evaluated against a stale snapshot.
    pub async fn tick(&self) -> Result<TickReport> {
        let config = Config::load(&self.config_path).await?;
        let tick_index = self.ticks.fetch_add(1, Ordering::SeqCst);

        let mut report = TickReport::default();
        let mut tasks: JoinSet<Result<Vec<JobOutcome>>> = JoinSet::new();

        for (account, jobs) in group_by_account(&config) {
            let provider = match self.provider_for(account) {
                Ok(provider) => provider,
                Err(e) => {
                    error!(account = %account.id, error = %e, "provider construction failed");
                    for job in &jobs {
                        report.absorb(JobOutcome::Quarantined {
                            job_id: job.id.clone(),
                            error: e.to_string(),
                            auth: matches!(e, Error::Auth(_)),
                        });
                    }
                    continue;
                }
            };
            let lock = self.account_lock(&account.id);
            let state = Arc::clone(&self.state);
            let clock = Arc::clone(&self.clock);
            let account_id = account.id.clone();

            tasks.spawn(async move {
                let mut outcomes = Vec::with_capacity(jobs.len());
                let mut account_poisoned = false;
                for job in jobs {
                    if account_poisoned {
                        outcomes.push(JobOutcome::Quarantined {
                            job_id: job.id.clone(),
                            error: format!("account {} failed authentication this tick", account_id),
                            auth: true,
                        });
                        continue;
                    }
                    let _guard = lock.lock().await;
                    let outcome = process_job(&*provider, &*state, &*clock, &job).await?;
                    if matches!(outcome, JobOutcome::Quarantined { auth: true, .. }) {
                        account_poisoned = true;
                    }
                    outcomes.push(outcome);
                }
                Ok(outcomes)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let outcomes = joined.map_err(|e| Error::state(format!("job task panicked: {}", e)))??;
            for outcome in outcomes {
                report.absorb(outcome);
            }
        }

        if tick_index % self.options.trigger_every_ticks.max(1) == 0 {
            report.alerts = self.evaluate_triggers(&config).await;
        }

        info!(
            fired = report.fired.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            quarantined = report.quarantined.len(),
            alerts = report.alerts.len(),
            "tick complete"
        );
        Ok(report)
    }

    /// `tick()` bounded by the whole-tick deadline (5 × tick period).
    ///
    /// On deadline the remaining jobs are dropped; every rotation that
    /// already landed has its state persisted, so nothing is lost beyond
    /// the skipped work.
    pub async fn timed_tick(&self) -> Result<TickReport> {
        let deadline = self.options.tick_period * TICK_TIMEOUT_FACTOR;
        match tokio::time::timeout(deadline, self.tick()).await {
            Ok(report) => report,
            Err(_) => {
                warn!(?deadline, "tick exceeded deadline, remaining jobs skipped");
                Ok(TickReport {
                    timed_out: true,
                    ..TickReport::default()
                })
            }
        }
    }

    /// Long-running mode: drive `tick()` on the configured interval
    /// until ctrl-c.
    pub async fn run(&self) -> Result<()> {
        self.run_with_shutdown(None).await
    }

    /// Run loop with an optional programmatic shutdown signal (tests).
    ///
    /// The shutdown is observed between ticks; an in-flight tick runs to
    /// completion and its state is persisted before exit.
    pub async fn run_with_shutdown(
        &self,
        shutdown: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        let mut interval = tokio::time::interval(self.options.tick_period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        if let Some(mut shutdown) = shutdown {
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.timed_tick().await {
                            error!(error = %e, "tick aborted");
                        }
                    }
                    _ = &mut shutdown => {
                        info!("shutdown signal received");
                        break;
                    }
                }
            }
        } else {
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.timed_tick().await {
                            error!(error = %e, "tick aborted");
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("shutdown signal received");
                        break;
                    }
                }
            }
        }

        self.state.flush().await?;
        info!("state flushed, engine stopped");
        Ok(())
    }

    fn provider_for(&self, account: &Account) -> Result<Arc<dyn DnsProvider>> {
        let mut cache = self.provider_cache.lock().expect("provider cache poisoned");
        if let Some((token, provider)) = cache.get(&account.id)
            && *token == account.token
        {
            return Ok(Arc::clone(provider));
        }
        let provider = self.providers.create(account)?;
        cache.insert(
            account.id.clone(),
            (account.token.clone(), Arc::clone(&provider)),
        );
        Ok(provider)
    }

    fn account_lock(&self, account_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.account_locks.lock().expect("account lock map poisoned");
        Arc::clone(
            locks
                .entry(account_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Evaluate all triggers. Agent failures are logged and never affect
    /// rotation; alerts surface through the same log stream the engine
    /// uses, at most once per (trigger, period).
    async fn evaluate_triggers(&self, config: &Config) -> Vec<Alert> {
        let mut fired = Vec::new();
        for trig in config.triggers() {
            // Validation guarantees the agent reference resolves.
            let Some(agent_cfg) = config.agent(&trig.agent_id) else {
                continue;
            };
            let agent = match self.agents.create(agent_cfg) {
                Ok(agent) => agent,
                Err(e) => {
                    warn!(trigger = %trig.id, agent = %agent_cfg.id, error = %e, "agent unavailable");
                    continue;
                }
            };
            let totals = match agent.totals().await {
                Ok(totals) => totals,
                Err(e) => {
                    warn!(trigger = %trig.id, agent = %agent_cfg.id, error = %e, "usage poll failed");
                    continue;
                }
            };
            let last = match self.state.trigger_period(&trig.id).await {
                Ok(last) => last,
                Err(e) => {
                    error!(trigger = %trig.id, error = %e, "trigger state unreadable");
                    continue;
                }
            };
            if let Some(alert) = trigger::check(trig, &totals, last.as_deref()) {
                warn!(
                    trigger = %alert.trigger_id,
                    label = %alert.label,
                    period = %alert.period,
                    used_gb = alert.used_gb,
                    limit_gb = alert.limit_gb,
                    "traffic limit exceeded"
                );
                if let Err(e) = self.state.set_trigger_period(&trig.id, &alert.period).await {
                    error!(trigger = %trig.id, error = %e, "failed to persist trigger period");
                    continue;
                }
                fired.push(alert);
            }
        }
        fired
    }
}

/// Enabled jobs grouped by account, both levels in configuration order
fn group_by_account(config: &Config) -> Vec<(&Account, Vec<Job>)> {
    let mut groups: Vec<(&Account, Vec<Job>)> = Vec::new();
    for job in config.jobs() {
        if !job.enabled {
            debug!(job = %job.id, "disabled, skipping");
            continue;
        }
        let Some(account) = config.account(&job.account_id) else {
            // Unreachable after validation; defensively skip.
            continue;
        };
        match groups.iter_mut().find(|(a, _)| a.id == account.id) {
            Some((_, jobs)) => jobs.push(job.clone()),
            None => groups.push((account, vec![job.clone()])),
        }
    }
    groups
}

/// Evaluate and apply one job.
///
/// Errors bubble out only for state-store faults, which abort the tick;
/// provider failures are folded into the returned outcome.
async fn process_job(
    provider: &dyn DnsProvider,
    state_store: &dyn StateStore,
    clock: &dyn Clock,
    job: &Job,
) -> Result<JobOutcome> {
    let now = clock.now();
    let state = state_store.job_state(&job.id).await?;

    let plan = match evaluator::evaluate(now, job, &state, provider).await {
        Ok(Outcome::Plan(plan)) => plan,
        Ok(Outcome::Skip(reason)) => {
            debug!(job = %job.id, %reason, "skipped");
            return Ok(JobOutcome::Skipped {
                job_id: job.id.clone(),
                reason,
            });
        }
        Err(e) if e.is_fatal_for_job() => {
            error!(job = %job.id, kind = job.spec.kind_name(), error = %e, "job quarantined for this tick");
            return Ok(JobOutcome::Quarantined {
                job_id: job.id.clone(),
                auth: matches!(e, Error::Auth(_)),
                error: e.to_string(),
            });
        }
        Err(e) if e.is_transient() => {
            return record_failure(state_store, job, state, &e).await;
        }
        Err(e) => return Err(e),
    };

    apply_plan(provider, state_store, job, state, plan, now).await
}

/// Apply a plan's updates sequentially and persist the resulting state.
async fn apply_plan(
    provider: &dyn DnsProvider,
    state_store: &dyn StateStore,
    job: &Job,
    state: JobState,
    plan: Plan,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<JobOutcome> {
    let mut successes = 0usize;
    let mut fatal: Option<Error> = None;
    let mut last_transient: Option<Error> = None;

    // Every record in the batch gets its update attempt; a failed one
    // is left on its previous value, never cut off by a neighbor's
    // failure. The outcome is classified only after the full pass.
    for update in &plan.updates {
        match provider
            .update_record(&job.zone_id, &update.record_id, update.value)
            .await
        {
            Ok(_) => {
                debug!(job = %job.id, record = %update.record_id, value = %update.value, "record updated");
                successes += 1;
            }
            Err(e) if e.is_transient() => {
                warn!(job = %job.id, record = %update.record_id, error = %e, "record update failed");
                last_transient = Some(e);
            }
            Err(e) => {
                error!(job = %job.id, record = %update.record_id, error = %e, "record update rejected");
                if fatal.is_none() {
                    fatal = Some(e);
                }
            }
        }
    }

    if successes > 0 {
        // The firing counts: cadence restarts and the cursor advances
        // even if part of the batch failed.
        let new_state = JobState::fired(now, plan.new_cursor.unwrap_or(state.cursor));
        state_store.set_job_state(&job.id, &new_state).await?;
    }

    if let Some(e) = fatal {
        return Ok(JobOutcome::Quarantined {
            job_id: job.id.clone(),
            auth: matches!(e, Error::Auth(_)),
            error: e.to_string(),
        });
    }
    if successes == 0 {
        let e = last_transient.unwrap_or_else(|| Error::transient("no updates applied"));
        return record_failure(state_store, job, state, &e).await;
    }

    info!(job = %job.id, kind = job.spec.kind_name(), updated = successes, "job fired");
    Ok(JobOutcome::Fired {
        job_id: job.id.clone(),
    })
}

/// Count a transient failure against the job's streak, warning on the
/// first occurrence and every power-of-two occurrence after.
async fn record_failure(
    state_store: &dyn StateStore,
    job: &Job,
    mut state: JobState,
    error: &Error,
) -> Result<JobOutcome> {
    state.consecutive_failures += 1;
    state_store.set_job_state(&job.id, &state).await?;

    let streak = state.consecutive_failures;
    if streak.is_power_of_two() {
        warn!(job = %job.id, streak, error = %error, "rotation failed, will retry next tick");
    } else {
        debug!(job = %job.id, streak, error = %error, "rotation failed, will retry next tick");
    }

    Ok(JobOutcome::Failed {
        job_id: job.id.clone(),
        error: error.to_string(),
    })
}
