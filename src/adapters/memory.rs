use crate::domain::model::{HistoryRecord, QueueEntry, Service};
use crate::domain::ports::{HistoryLog, QueueStore, ServiceRegistry};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    queues: RwLock<HashMap<String, Vec<QueueEntry>>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn get_queue(&self, service_id: &str) -> Result<Vec<QueueEntry>> {
        Ok(self
            .queues
            .read()
            .await
            .get(service_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn put_queue(&self, service_id: &str, entries: Vec<QueueEntry>) -> Result<()> {
        self.queues
            .write()
            .await
            .insert(service_id.to_string(), entries);
        Ok(())
    }

    async fn delete_queue(&self, service_id: &str) -> Result<()> {
        self.queues.write().await.remove(service_id);
        Ok(())
    }
}

/// Service catalog kept in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryServiceRegistry {
    services: RwLock<Vec<Service>>,
}

impl InMemoryServiceRegistry {
    pub fn new(services: Vec<Service>) -> Self {
        Self {
            services: RwLock::new(services),
        }
    }

    /// Inserts or replaces a service by id.
    pub async fn upsert(&self, service: Service) -> Result<()> {
        service.validate()?;
        let mut services = self.services.write().await;
        match services.iter_mut().find(|s| s.id == service.id) {
            Some(existing) => *existing = service,
            None => services.push(service),
        }
        Ok(())
    }

    pub async fn remove(&self, service_id: &str) -> Option<Service> {
        let mut services = self.services.write().await;
        let idx = services.iter().position(|s| s.id == service_id)?;
        Some(services.remove(idx))
    }

    pub async fn set_open(&self, service_id: &str, open: bool) -> bool {
        let mut services = self.services.write().await;
        match services.iter_mut().find(|s| s.id == service_id) {
            Some(service) => {
                service.open = open;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ServiceRegistry for InMemoryServiceRegistry {
    async fn get_service(&self, service_id: &str) -> Result<Option<Service>> {
        Ok(self
            .services
            .read()
            .await
            .iter()
            .find(|s| s.id == service_id)
            .cloned())
    }

    async fn list_services(&self) -> Result<Vec<Service>> {
        Ok(self.services.read().await.clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryHistoryLog {
    records: RwLock<Vec<HistoryRecord>>,
}

impl InMemoryHistoryLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryLog for InMemoryHistoryLog {
    async fn append(&self, record: HistoryRecord) -> Result<()> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<HistoryRecord>> {
        Ok(self.records.read().await.clone())
    }
}
