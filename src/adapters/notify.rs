use crate::domain::model::Notification;
use crate::domain::ports::Notifier;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// Inbox of notifications, newest first.
///
/// When opened with a path the inbox is loaded from and saved to a JSON file
/// on every change.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    items: RwLock<Vec<Notification>>,
    path: Option<PathBuf>,
}

impl NotificationCenter {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let items = match tokio::fs::read(&path).await {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            items: RwLock::new(items),
            path: Some(path),
        })
    }

    pub async fn list(&self) -> Vec<Notification> {
        self.items.read().await.clone()
    }

    pub async fn unread_count(&self) -> usize {
        self.items.read().await.iter().filter(|n| !n.read).count()
    }

    pub async fn mark_all_read(&self) -> Result<()> {
        let mut items = self.items.write().await;
        items.iter_mut().for_each(|n| n.read = true);
        self.save(&items).await
    }

    async fn save(&self, items: &[Notification]) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_vec_pretty(items)?).await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for NotificationCenter {
    async fn emit(&self, notification: Notification) -> Result<()> {
        let mut items = self.items.write().await;
        items.insert(0, notification);
        self.save(&items).await
    }
}

/// Writes every notification to the log and keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn emit(&self, notification: Notification) -> Result<()> {
        tracing::info!("🔔 [{:?}] {}", notification.kind, notification.message);
        Ok(())
    }
}
