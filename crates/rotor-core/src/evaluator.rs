//! Job evaluator
//!
//! Decides, for one job, whether it is due and what updates it should
//! issue. Reads live record values from the provider just-in-time but
//! never writes anything — applying the plan and persisting state belong
//! to the engine, which keeps the per-kind logic testable in isolation.

use chrono::{DateTime, Duration, Utc};

use crate::config::{Job, JobSpec};
use crate::error::{Error, Result};
use crate::rotation::{self, Plan, RecordUpdate};
use crate::traits::dns_provider::DnsProvider;
use crate::traits::state_store::JobState;

/// Why a job did not produce a plan this tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Cadence floor not reached yet
    NotDue { due_at: DateTime<Utc> },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotDue { due_at } => write!(f, "not due until {}", due_at),
        }
    }
}

/// Result of evaluating one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Concrete updates to apply
    Plan(Plan),
    /// Nothing to do this tick
    Skip(SkipReason),
}

/// Evaluate one job against the current time and its persisted state.
///
/// Record-scope faults (a referenced record missing at the provider, a
/// live record whose type does not match the job) surface as errors; the
/// engine quarantines the job for the tick.
pub async fn evaluate(
    now: DateTime<Utc>,
    job: &Job,
    state: &JobState,
    provider: &dyn DnsProvider,
) -> Result<Outcome> {
    if let Some(last) = state.last_fired_at {
        let due_at = last + Duration::minutes(job.interval_minutes as i64);
        if now < due_at {
            return Ok(Outcome::Skip(SkipReason::NotDue { due_at }));
        }
    }

    match &job.spec {
        JobSpec::Single {
            record_id,
            record_type,
            ip_pool,
        } => {
            let record = provider.get_record(&job.zone_id, record_id).await?;
            if record.kind != *record_type {
                return Err(Error::record(format!(
                    "record {} is type {}, job {} expects {}",
                    record.name, record.kind, job.id, record_type
                )));
            }

            let (value, cursor) = rotation::pick_single(ip_pool, record.value, state.cursor);
            Ok(Outcome::Plan(Plan {
                updates: vec![RecordUpdate {
                    record_id: record_id.clone(),
                    value,
                }],
                new_cursor: Some(cursor),
            }))
        }

        JobSpec::MultiPool {
            record_ids,
            record_type,
            ip_pool,
        } => {
            // Confirm every referenced record exists before planning;
            // a missing one skips the whole job this tick.
            for record_id in record_ids {
                let record = provider.get_record(&job.zone_id, record_id).await?;
                if record.kind != *record_type {
                    return Err(Error::record(format!(
                        "record {} is type {}, job {} expects {}",
                        record.name, record.kind, job.id, record_type
                    )));
                }
            }

            let (values, cursor) = rotation::pool_window(ip_pool, record_ids.len(), state.cursor);
            let updates = record_ids
                .iter()
                .zip(values)
                .map(|(record_id, value)| RecordUpdate {
                    record_id: record_id.clone(),
                    value,
                })
                .collect();
            Ok(Outcome::Plan(Plan {
                updates,
                new_cursor: Some(cursor),
            }))
        }

        JobSpec::Shuffle { record_ids, shift } => {
            // Sample all live values up front so the cyclic shift is
            // deterministic within the firing.
            let mut live = Vec::with_capacity(record_ids.len());
            for record_id in record_ids {
                let record = provider.get_record(&job.zone_id, record_id).await?;
                live.push(record.value);
            }

            let values = rotation::shuffle_values(&live, *shift);
            let updates = record_ids
                .iter()
                .zip(values)
                .map(|(record_id, value)| RecordUpdate {
                    record_id: record_id.clone(),
                    value,
                })
                .collect();
            Ok(Outcome::Plan(Plan {
                updates,
                new_cursor: None,
            }))
        }
    }
}
