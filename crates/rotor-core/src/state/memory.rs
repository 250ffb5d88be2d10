//! In-memory rotation-state store
//!
//! Nothing persists across restarts: after a crash every job reads as
//! never-fired and will rotate on its first due tick. Acceptable for
//! tests and for ephemeral containers where an early rotation is
//! harmless.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::traits::state_store::{JobState, StateStore};

/// In-memory state store
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    jobs: Arc<RwLock<HashMap<String, JobState>>>,
    triggers: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn job_state(&self, job_id: &str) -> Result<JobState> {
        Ok(self
            .jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_job_state(&self, job_id: &str, state: &JobState) -> Result<()> {
        self.jobs
            .write()
            .await
            .insert(job_id.to_string(), state.clone());
        Ok(())
    }

    async fn trigger_period(&self, trigger_id: &str) -> Result<Option<String>> {
        Ok(self.triggers.read().await.get(trigger_id).cloned())
    }

    async fn set_trigger_period(&self, trigger_id: &str, period: &str) -> Result<()> {
        self.triggers
            .write()
            .await
            .insert(trigger_id.to_string(), period.to_string());
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
