//! Durable, encrypted persistence of pending jobs.
//!
//! One file per job (`<id>.job`) under a configured directory, each holding
//! the serialized record sealed by the injected [`EncryptionCapability`].
//! Writes go through a temp file, fsync, and rename so a crash never leaves
//! a half-written record under the final name.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::crypto::EncryptionCapability;
use crate::error::{JobError, Result};
use crate::job::record::JobRecord;

const RECORD_EXTENSION: &str = "job";

/// File-backed job store. The manager's coordinator is its only writer.
pub struct FileJobStore {
    dir: PathBuf,
    crypto: Arc<dyn EncryptionCapability>,
}

impl FileJobStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub async fn open(
        dir: impl Into<PathBuf>,
        crypto: Arc<dyn EncryptionCapability>,
    ) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir, crypto })
    }

    fn record_path(&self, id: &Uuid) -> PathBuf {
        self.dir.join(format!("{}.{}", id, RECORD_EXTENSION))
    }

    /// Write a record durably. Returns only after the bytes are fsynced and
    /// the final name is in place; this is the crash-safety boundary for
    /// `add`.
    pub async fn persist(&self, record: &JobRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)
            .map_err(|e| JobError::Internal(format!("serialize job record: {}", e)))?;
        let sealed = self.crypto.encrypt(&bytes)?;

        let tmp_path = self.dir.join(format!("{}.{}.tmp", record.id, RECORD_EXTENSION));
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&sealed).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp_path, self.record_path(&record.id)).await?;

        tracing::debug!(job_id = %record.id, run_count = record.run_count, "Job record persisted");
        Ok(())
    }

    /// Delete a record. Removing an absent id is not an error.
    pub async fn remove(&self, id: &Uuid) -> Result<()> {
        match fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Load every stored record. Used only at startup. Records that fail to
    /// decrypt or deserialize are corrupt: logged and skipped, never fatal.
    pub async fn load_all(&self) -> Result<Vec<JobRecord>> {
        let mut records = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            match self.load_one(&path).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping corrupt job record");
                }
            }
        }

        Ok(records)
    }

    async fn load_one(&self, path: &Path) -> Result<JobRecord> {
        let sealed = fs::read(path).await?;
        let bytes = self.crypto.decrypt(&sealed)?;
        serde_json::from_slice(&bytes).map_err(|e| JobError::Corrupt(e.to_string()))
    }

    /// Whether a record exists on disk for this id. Diagnostics only.
    pub async fn contains(&self, id: &Uuid) -> bool {
        fs::try_exists(self.record_path(id)).await.unwrap_or(false)
    }
}
