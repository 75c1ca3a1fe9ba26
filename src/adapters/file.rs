use crate::domain::model::{HistoryRecord, QueueEntry};
use crate::domain::ports::{HistoryLog, QueueStore};
use crate::utils::error::Result;
use crate::utils::validation::validate_identifier;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One JSON document per service under `<base>/queues/`.
#[derive(Debug, Clone)]
pub struct JsonFileQueueStore {
    base_path: PathBuf,
}

impl JsonFileQueueStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn queue_path(&self, service_id: &str) -> Result<PathBuf> {
        validate_identifier("service_id", service_id)?;
        Ok(self
            .base_path
            .join("queues")
            .join(format!("{}.json", service_id)))
    }

    /// Path for reads and deletes. An id that can never name a file has no queue.
    fn existing_queue_path(&self, service_id: &str) -> Option<PathBuf> {
        match self.queue_path(service_id) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::debug!("No queue file for {:?}: {}", service_id, e);
                None
            }
        }
    }
}

/// Writes through a sibling temp file so readers never see a half-written queue.
async fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl QueueStore for JsonFileQueueStore {
    async fn get_queue(&self, service_id: &str) -> Result<Vec<QueueEntry>> {
        let Some(path) = self.existing_queue_path(service_id) else {
            return Ok(Vec::new());
        };
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_queue(&self, service_id: &str, entries: Vec<QueueEntry>) -> Result<()> {
        let path = self.queue_path(service_id)?;
        let data = serde_json::to_vec_pretty(&entries)?;
        tracing::debug!("Writing {} entries to {}", entries.len(), path.display());
        write_atomically(&path, &data).await
    }

    async fn delete_queue(&self, service_id: &str) -> Result<()> {
        let Some(path) = self.existing_queue_path(service_id) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Append-only JSON-lines history file.
#[derive(Debug)]
pub struct JsonlHistoryLog {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl JsonlHistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl HistoryLog for JsonlHistoryLog {
    async fn append(&self, record: HistoryRecord) -> Result<()> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let _guard = self.append_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<HistoryRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    "Skipping unreadable history line {} in {}: {}",
                    line_no + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(records)
    }
}
