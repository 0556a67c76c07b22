//! Durable `AgentState`
//!
//! The state file is replaced atomically (write temp file, fsync, rename) so
//! a crash mid-write leaves the previous consistent state on disk.

use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::domain::AgentState;
use crate::error::StateError;

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load persisted state, defaulting to all-unset when no file exists
    pub async fn load(&self) -> Result<AgentState, StateError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No state at {}, starting fresh", self.path.display());
                return Ok(AgentState::default());
            }
            Err(e) => return Err(self.read_failure(e)),
        };

        let state: AgentState = serde_json::from_str(&raw).map_err(|e| self.read_failure(e))?;
        debug!(
            "Loaded state from {} (active_kind: {})",
            self.path.display(),
            state.active_kind
        );
        Ok(state)
    }

    /// Write-replace the state file
    pub async fn save(&self, state: &AgentState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.write_failure(e))?;
        }

        let body = serde_json::to_vec_pretty(state).map_err(|e| self.write_failure(e))?;
        let tmp = self.path.with_extension("json.tmp");

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| self.write_failure(e))?;
        file.write_all(&body)
            .await
            .map_err(|e| self.write_failure(e))?;
        file.sync_all().await.map_err(|e| self.write_failure(e))?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.write_failure(e))?;
        Ok(())
    }

    /// Save, retrying once immediately on failure
    pub async fn save_with_retry(&self, state: &AgentState) -> Result<(), StateError> {
        retry_once(|| self.save(state)).await
    }

    fn read_failure(&self, e: impl std::fmt::Display) -> StateError {
        StateError::ReadFailure {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        }
    }

    fn write_failure(&self, e: impl std::fmt::Display) -> StateError {
        StateError::WriteFailure {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        }
    }
}

async fn retry_once<F, Fut>(mut write: F) -> Result<(), StateError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), StateError>>,
{
    match write().await {
        Ok(()) => Ok(()),
        Err(first) => {
            warn!("State write failed, retrying once: {}", first);
            write().await
        }
    }
}
