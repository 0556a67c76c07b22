//! Append-only log of published posts, one JSON record per line
//!
//! The publisher consults it before every platform call, which is what makes
//! a retried publish after a crash idempotent.

use std::path::{Path, PathBuf};
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::warn;

use crate::domain::PostRecord;
use crate::error::StateError;

pub struct PostLog {
    path: PathBuf,
}

impl PostLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records in publish order. A torn final line is skipped.
    pub async fn read_all(&self) -> Result<Vec<PostRecord>, StateError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StateError::ReadFailure {
                    path: self.path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };

        let mut records = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PostRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    "Skipping unreadable post log line {} in {}: {}",
                    line_no + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(records)
    }

    /// Record previously published under `idempotency_key`
    pub async fn find(&self, idempotency_key: &str) -> Result<Option<PostRecord>, StateError> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .find(|r| r.idempotency_key == idempotency_key))
    }

    /// Most recent `limit` records, newest last
    pub async fn latest(&self, limit: usize) -> Result<Vec<PostRecord>, StateError> {
        let mut records = self.read_all().await?;
        let skip = records.len().saturating_sub(limit);
        Ok(records.split_off(skip))
    }

    pub async fn append(&self, record: &PostRecord) -> Result<(), StateError> {
        let write_failure = |e: &dyn std::fmt::Display| StateError::WriteFailure {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_failure(&e))?;
        }

        let mut line = serde_json::to_string(record).map_err(|e| write_failure(&e))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| write_failure(&e))?;

        // Terminate a torn previous line so the new record stays readable
        let len = file.metadata().await.map_err(|e| write_failure(&e))?.len();
        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::Start(len - 1))
                .await
                .map_err(|e| write_failure(&e))?;
            file.read_exact(&mut last)
                .await
                .map_err(|e| write_failure(&e))?;
            if last[0] != b'\n' {
                warn!("Post log {} ends with a torn line", self.path.display());
                line.insert(0, '\n');
            }
        }

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| write_failure(&e))?;
        file.sync_data().await.map_err(|e| write_failure(&e))?;
        Ok(())
    }
}
