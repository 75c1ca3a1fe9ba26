use crate::domain::model::{HistoryRecord, Notification, QueueEntry, Service};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable mapping from service id to that service's waiting entries.
///
/// Only the scheduling engine writes through this port. An unknown service id
/// reads as an empty queue.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn get_queue(&self, service_id: &str) -> Result<Vec<QueueEntry>>;
    async fn put_queue(&self, service_id: &str, entries: Vec<QueueEntry>) -> Result<()>;
    async fn delete_queue(&self, service_id: &str) -> Result<()>;
}

/// Read side of the service catalog.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    async fn get_service(&self, service_id: &str) -> Result<Option<Service>>;
    async fn list_services(&self) -> Result<Vec<Service>>;
}

#[async_trait]
pub trait HistoryLog: Send + Sync {
    async fn append(&self, record: HistoryRecord) -> Result<()>;
    async fn all(&self) -> Result<Vec<HistoryRecord>>;

    async fn for_entrant(&self, entrant_id: &str) -> Result<Vec<HistoryRecord>> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|record| record.entrant_id == entrant_id)
            .collect())
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn emit(&self, notification: Notification) -> Result<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
