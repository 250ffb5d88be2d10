//! Injectable time source
//!
//! All cadence decisions go through [`Clock`] so the contract tests can
//! drive the engine with a manual clock instead of sleeping.

use chrono::{DateTime, Utc};

/// Wall-clock time source for the engine
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
