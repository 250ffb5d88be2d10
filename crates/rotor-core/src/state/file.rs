//! File-backed rotation-state store
//!
//! Persists per-job rotation state and trigger firing markers to a JSON
//! file. Writes are atomic (temp sibling, fsync, rename) so a concurrent
//! reader never observes a torn document and a crash mid-write leaves
//! the previous state intact.
//!
//! An absent file reads as empty state (every job "never fired"). An
//! unreadable or unparseable file is a state fault and is surfaced — the
//! operator must repair or remove it; guessing would silently break
//! cadence guarantees.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::traits::state_store::{JobState, StateStore};

/// State file format version, for future migrations
const STATE_FILE_VERSION: &str = "1";

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct TriggerMarker {
    last_fired_period: String,
}

/// Serialized state file shape
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    #[serde(default)]
    jobs: HashMap<String, JobState>,
    #[serde(default)]
    triggers: HashMap<String, TriggerMarker>,
}

#[derive(Debug, Default)]
struct Cached {
    jobs: HashMap<String, JobState>,
    triggers: HashMap<String, TriggerMarker>,
    dirty: bool,
}

/// File-backed state store with atomic writes
///
/// State is cached in memory across ticks; every mutation writes through
/// to disk immediately so a successful rotation is durable before the
/// engine moves to the next job.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    cache: Arc<RwLock<Cached>>,
}

impl FileStateStore {
    /// Open the store, loading existing state if the file is present
    ///
    /// The parent directory is created if needed. A file that exists but
    /// cannot be read or parsed is a fatal state fault.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::state(format!(
                    "failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let cached = Self::load(&path).await?;
        Ok(Self {
            path,
            cache: Arc::new(RwLock::new(cached)),
        })
    }

    async fn load(path: &Path) -> Result<Cached> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "state file absent, starting empty");
            return Ok(Cached::default());
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| Error::state(format!("failed to read {}: {}", path.display(), e)))?;

        let parsed: StateFileFormat = serde_json::from_str(&content)
            .map_err(|e| Error::state(format!("corrupt state file {}: {}", path.display(), e)))?;

        if parsed.version != STATE_FILE_VERSION {
            tracing::warn!(
                expected = STATE_FILE_VERSION,
                found = %parsed.version,
                "state file version mismatch, loading anyway"
            );
        }

        tracing::debug!(jobs = parsed.jobs.len(), "loaded state file");
        Ok(Cached {
            jobs: parsed.jobs,
            triggers: parsed.triggers,
            dirty: false,
        })
    }

    /// Serialize the cache and atomically replace the file
    async fn write_through(&self) -> Result<()> {
        let json = {
            let cache = self.cache.read().await;
            let doc = StateFileFormat {
                version: STATE_FILE_VERSION.to_string(),
                jobs: cache.jobs.clone(),
                triggers: cache.triggers.clone(),
            };
            serde_json::to_string_pretty(&doc)
                .map_err(|e| Error::state(format!("failed to serialize state: {}", e)))?
        };

        let mut tmp = self.path.clone();
        tmp.set_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)
                .await
                .map_err(|e| Error::state(format!("failed to create {}: {}", tmp.display(), e)))?;
            file.write_all(json.as_bytes())
                .await
                .map_err(|e| Error::state(format!("failed to write {}: {}", tmp.display(), e)))?;
            file.sync_all()
                .await
                .map_err(|e| Error::state(format!("failed to sync {}: {}", tmp.display(), e)))?;
        }

        fs::rename(&tmp, &self.path).await.map_err(|e| {
            Error::state(format!(
                "failed to rename {} to {}: {}",
                tmp.display(),
                self.path.display(),
                e
            ))
        })?;

        self.cache.write().await.dirty = false;
        tracing::trace!(path = %self.path.display(), "state written");
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn job_state(&self, job_id: &str) -> Result<JobState> {
        let cache = self.cache.read().await;
        Ok(cache.jobs.get(job_id).cloned().unwrap_or_default())
    }

    async fn set_job_state(&self, job_id: &str, state: &JobState) -> Result<()> {
        {
            let mut cache = self.cache.write().await;
            cache.jobs.insert(job_id.to_string(), state.clone());
            cache.dirty = true;
        }
        self.write_through().await
    }

    async fn trigger_period(&self, trigger_id: &str) -> Result<Option<String>> {
        let cache = self.cache.read().await;
        Ok(cache
            .triggers
            .get(trigger_id)
            .map(|m| m.last_fired_period.clone()))
    }

    async fn set_trigger_period(&self, trigger_id: &str, period: &str) -> Result<()> {
        {
            let mut cache = self.cache.write().await;
            cache.triggers.insert(
                trigger_id.to_string(),
                TriggerMarker {
                    last_fired_period: period.to_string(),
                },
            );
            cache.dirty = true;
        }
        self.write_through().await
    }

    async fn flush(&self) -> Result<()> {
        let dirty = self.cache.read().await.dirty;
        if dirty { self.write_through().await } else { Ok(()) }
    }
}
