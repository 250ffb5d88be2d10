//! Rotation-state store trait
//!
//! Tracks, per job, when it last fired and where its cursor stands, plus
//! the per-trigger firing markers. This is what makes rotations
//! idempotent under restart and keeps the cadence floor intact.
//!
//! Writes are rare (one per successful firing) but must be durable;
//! reads happen once per tick and implementations may cache in memory as
//! long as every write goes through the store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Persistent per-job rotation state
///
/// A job with no stored state reads as [`JobState::default`]: never
/// fired, cursor at zero, no failure streak.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    /// When the job last fired successfully. `None` = never.
    #[serde(with = "chrono::serde::ts_seconds_option", default)]
    pub last_fired_at: Option<DateTime<Utc>>,

    /// Algorithm position: pool-window start for multi-pool jobs,
    /// round-robin index for single-record jobs. Unused by shuffles.
    #[serde(default)]
    pub cursor: u32,

    /// Length of the current transient-failure streak
    #[serde(default)]
    pub consecutive_failures: u32,
}

impl JobState {
    /// State after a successful firing at `now` with the given cursor
    pub fn fired(now: DateTime<Utc>, cursor: u32) -> Self {
        Self {
            last_fired_at: Some(now),
            cursor,
            consecutive_failures: 0,
        }
    }
}

/// Trait for rotation-state persistence
///
/// Implementations must be safe to call concurrently; the engine fans
/// out across accounts and every firing persists through this trait.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a job's state; missing entries read as never-fired
    async fn job_state(&self, job_id: &str) -> Result<JobState>;

    /// Replace a job's state and persist it durably
    async fn set_job_state(&self, job_id: &str, state: &JobState) -> Result<()>;

    /// Read the period identifier a trigger last fired in
    async fn trigger_period(&self, trigger_id: &str) -> Result<Option<String>>;

    /// Record the period a trigger fired in and persist it durably
    async fn set_trigger_period(&self, trigger_id: &str, period: &str) -> Result<()>;

    /// Persist any buffered changes
    async fn flush(&self) -> Result<()>;
}
