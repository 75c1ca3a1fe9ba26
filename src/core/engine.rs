use crate::adapters::clock::SystemClock;
use crate::core::scoring::ScoringPolicy;
use crate::core::{
    Clock, Direction, HistoryLog, HistoryRecord, JoinOutcome, Notification, NotificationKind,
    Notifier, Outcome, PriorityTier, QueueEntry, QueueStatus, QueueStore, RankedEntry, Service,
    ServiceRegistry,
};
use crate::utils::error::{QueueError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as ServiceLock, OwnedMutexGuard};

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// How many of the new head entries get an alert after a serve.
    pub next_up_alerts: usize,
    pub walk_in_prefix: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            next_up_alerts: 2,
            walk_in_prefix: "walkin".to_string(),
        }
    }
}

/// Owns every mutation of the queue store.
///
/// Mutations on one service run under that service's lock for the whole
/// read-rank-write cycle; different services never contend. History and
/// notifications are written after the queue and their failures are only
/// logged.
pub struct SchedulingEngine<S: QueueStore, R: ServiceRegistry> {
    store: S,
    registry: R,
    history: Arc<dyn HistoryLog>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    policy: ScoringPolicy,
    settings: EngineSettings,
    locks: Mutex<HashMap<String, Arc<ServiceLock<()>>>>,
    /// Serializes mutations on ids the registry does not know.
    unregistered_lock: Arc<ServiceLock<()>>,
    sequence: AtomicU64,
}

impl<S: QueueStore, R: ServiceRegistry> SchedulingEngine<S, R> {
    pub fn new(
        store: S,
        registry: R,
        history: Arc<dyn HistoryLog>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            registry,
            history,
            notifier,
            clock: Arc::new(SystemClock),
            policy: ScoringPolicy::default(),
            settings: EngineSettings::default(),
            locks: Mutex::new(HashMap::new()),
            unregistered_lock: Arc::new(ServiceLock::new(())),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: ScoringPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    // ===== Mutations =====

    /// Adds `entrant_id` to the service's queue with `joined_at = now`.
    ///
    /// Joining a queue the entrant is already in returns the existing entry
    /// untouched.
    pub async fn join(
        &self,
        service_id: &str,
        entrant_id: &str,
        display_name: Option<&str>,
        tier: Option<PriorityTier>,
    ) -> Result<JoinOutcome> {
        let service = self.open_service(service_id).await?;
        let _guard = self.lock_service(service_id).await;

        let mut queue = self.store.get_queue(service_id).await?;
        if let Some(existing) = queue.iter().find(|e| e.entrant_id == entrant_id) {
            tracing::debug!("{} is already queued for {}", entrant_id, service_id);
            return Ok(JoinOutcome::AlreadyQueued(existing.clone()));
        }

        let entry = QueueEntry::new(
            entrant_id,
            display_name.unwrap_or(entrant_id),
            tier.unwrap_or(service.default_priority),
            self.clock.now(),
        );
        queue.push(entry.clone());
        self.store.put_queue(service_id, queue).await?;

        tracing::info!(
            "{} joined {} with {} priority",
            entrant_id,
            service_id,
            entry.priority_tier
        );
        self.notify(
            NotificationKind::Joined,
            format!(
                "{} joined {} queue ({} priority)",
                entry.display_name, service.name, entry.priority_tier
            ),
        )
        .await;

        Ok(JoinOutcome::Joined(entry))
    }

    /// Adds a walk-in without an account under a generated entrant id.
    pub async fn admin_add(
        &self,
        service_id: &str,
        name: &str,
        tier: PriorityTier,
        contact: Option<String>,
        notes: Option<String>,
    ) -> Result<QueueEntry> {
        let service = self.open_service(service_id).await?;
        let _guard = self.lock_service(service_id).await;

        let mut queue = self.store.get_queue(service_id).await?;
        let now = self.clock.now();
        // The sequence restarts with the process, so a stored id may already match.
        let entrant_id = loop {
            let candidate = self.next_id(&self.settings.walk_in_prefix, now);
            if !queue.iter().any(|e| e.entrant_id == candidate) {
                break candidate;
            }
            tracing::debug!("Walk-in id {} is taken in {}, generating another", candidate, service_id);
        };

        let mut entry = QueueEntry::new(entrant_id, name, tier, now);
        entry.is_walk_in = true;
        entry.contact = contact.filter(|c| !c.trim().is_empty());
        entry.notes = notes.filter(|n| !n.trim().is_empty());
        queue.push(entry.clone());
        self.store.put_queue(service_id, queue).await?;

        tracing::info!("Walk-in {} added to {} as {}", name, service_id, entry.entrant_id);
        self.notify(
            NotificationKind::WalkInAdded,
            format!("Admin added {} to {} queue ({})", name, service.name, tier),
        )
        .await;

        Ok(entry)
    }

    /// Removes the entrant and records a `left` outcome. Absent entrants are a no-op.
    pub async fn leave(&self, service_id: &str, entrant_id: &str) -> Result<Option<QueueEntry>> {
        let _guard = self.lock_service(service_id).await;

        let Some(entry) = self.take_entry(service_id, entrant_id).await? else {
            tracing::debug!("leave: {} is not queued for {}", entrant_id, service_id);
            return Ok(None);
        };

        let service_name = self.service_name(service_id).await;
        tracing::info!("{} left {}", entrant_id, service_id);
        self.record(&entry, service_id, &service_name, Outcome::Left).await;
        self.notify(
            NotificationKind::Left,
            format!("{} left {} queue", entry.display_name, service_name),
        )
        .await;

        Ok(Some(entry))
    }

    /// Serves the entry ranked first right now.
    ///
    /// Returns `None` when the queue is empty. After the serve, the new head
    /// entries receive next-up alerts.
    pub async fn serve_next(&self, service_id: &str) -> Result<Option<QueueEntry>> {
        let _guard = self.lock_service(service_id).await;

        let now = self.clock.now();
        let mut queue = self.store.get_queue(service_id).await?;
        let Some(best) = self.policy.select_best(&queue, now) else {
            tracing::debug!("serve_next: {} has nobody waiting", service_id);
            return Ok(None);
        };

        let served = queue.remove(best);
        let upcoming = self.policy.rank(&queue, now);
        self.store.put_queue(service_id, queue).await?;

        let service_name = self.service_name(service_id).await;
        tracing::info!(
            "Served {} for {} ({} still waiting)",
            served.entrant_id,
            service_id,
            upcoming.len()
        );
        self.record(&served, service_id, &service_name, Outcome::Served).await;
        self.notify(
            NotificationKind::Served,
            format!("{} served for {}", served.display_name, service_name),
        )
        .await;

        for ranked in upcoming.iter().take(self.settings.next_up_alerts) {
            let (kind, message) = if ranked.position == 1 {
                (
                    NotificationKind::NextUp,
                    format!("{}: You are NEXT for {}!", ranked.entry.display_name, service_name),
                )
            } else {
                (
                    NotificationKind::AlmostReady,
                    format!(
                        "{}: Almost your turn for {} (position #{})",
                        ranked.entry.display_name, service_name, ranked.position
                    ),
                )
            };
            self.notify(kind, message).await;
        }

        Ok(Some(served))
    }

    /// Administrative removal. Writes no history.
    pub async fn remove(&self, service_id: &str, entrant_id: &str) -> Result<Option<QueueEntry>> {
        let _guard = self.lock_service(service_id).await;

        let removed = self.take_entry(service_id, entrant_id).await?;
        if removed.is_some() {
            tracing::info!("Removed {} from {}", entrant_id, service_id);
        }
        Ok(removed)
    }

    /// Exchanges scoring inputs with the ranked neighbor in `direction`.
    ///
    /// Returns `false` when the entrant is absent or has no neighbor there.
    pub async fn boost(
        &self,
        service_id: &str,
        entrant_id: &str,
        direction: Direction,
    ) -> Result<bool> {
        let _guard = self.lock_service(service_id).await;

        let mut queue = self.store.get_queue(service_id).await?;
        let ranked = self.policy.rank(&queue, self.clock.now());
        let Some(idx) = ranked.iter().position(|r| r.entry.entrant_id == entrant_id) else {
            return Ok(false);
        };

        let neighbor = match direction {
            Direction::Up => idx.checked_sub(1),
            Direction::Down => Some(idx + 1).filter(|&n| n < ranked.len()),
        };
        let Some(neighbor) = neighbor else {
            tracing::debug!("boost: {} has no neighbor {:?} in {}", entrant_id, direction, service_id);
            return Ok(false);
        };

        let other = ranked[neighbor].entry.entrant_id.as_str();
        if !swap_scoring_inputs(&mut queue, entrant_id, other) {
            return Ok(false);
        }
        self.store.put_queue(service_id, queue).await?;

        tracing::info!("Boosted {} {:?} past {} in {}", entrant_id, direction, other, service_id);
        Ok(true)
    }

    /// Exchanges scoring inputs with the first-ranked entry.
    pub async fn move_to_top(&self, service_id: &str, entrant_id: &str) -> Result<bool> {
        let _guard = self.lock_service(service_id).await;

        let mut queue = self.store.get_queue(service_id).await?;
        let Some(best) = self.policy.select_best(&queue, self.clock.now()) else {
            return Ok(false);
        };
        let top = queue[best].entrant_id.clone();
        if top == entrant_id {
            return Ok(false);
        }
        if !swap_scoring_inputs(&mut queue, entrant_id, &top) {
            return Ok(false);
        }
        self.store.put_queue(service_id, queue).await?;

        tracing::info!("Moved {} to the top of {} (was {})", entrant_id, service_id, top);
        Ok(true)
    }

    /// Sets a new tier, keeping `joined_at` so aging credit carries over.
    pub async fn change_priority(
        &self,
        service_id: &str,
        entrant_id: &str,
        tier: PriorityTier,
    ) -> Result<bool> {
        let _guard = self.lock_service(service_id).await;

        let mut queue = self.store.get_queue(service_id).await?;
        let Some(entry) = queue.iter_mut().find(|e| e.entrant_id == entrant_id) else {
            return Ok(false);
        };
        let previous = std::mem::replace(&mut entry.priority_tier, tier);
        self.store.put_queue(service_id, queue).await?;

        tracing::info!(
            "Priority of {} in {} changed {} -> {}",
            entrant_id,
            service_id,
            previous,
            tier
        );
        Ok(true)
    }

    /// Drops a whole queue without history, for when the service itself is deleted.
    ///
    /// The service's lock entry is released too unless another call is
    /// already waiting on it.
    pub async fn discard_queue(&self, service_id: &str) -> Result<()> {
        let registered = self.is_registered(service_id).await;
        let _unregistered = if registered {
            None
        } else {
            Some(self.unregistered_lock.clone().lock_owned().await)
        };
        let tracked = self.tracked_lock(service_id, registered);
        let _guard = match &tracked {
            Some(lock) => Some(lock.clone().lock_owned().await),
            None => None,
        };

        self.store.delete_queue(service_id).await?;
        if let Some(lock) = &tracked {
            self.release_lock(service_id, lock);
        }
        tracing::info!("Discarded queue for {}", service_id);
        Ok(())
    }

    // ===== Reads =====

    pub async fn rank(&self, service_id: &str) -> Result<Vec<RankedEntry>> {
        self.rank_at(service_id, self.clock.now()).await
    }

    pub async fn rank_at(&self, service_id: &str, now: DateTime<Utc>) -> Result<Vec<RankedEntry>> {
        let queue = self.store.get_queue(service_id).await?;
        tracing::debug!("Ranking {} entries for {}", queue.len(), service_id);
        Ok(self.policy.rank(&queue, now))
    }

    /// Raw entries in store order.
    pub async fn queue_snapshot(&self, service_id: &str) -> Result<Vec<QueueEntry>> {
        self.store.get_queue(service_id).await
    }

    /// Where the entrant stands, scanning services in registry order.
    ///
    /// An entrant queued for several services reports the first one found.
    pub async fn status_for(&self, entrant_id: &str) -> Result<Option<QueueStatus>> {
        let now = self.clock.now();

        for service in self.registry.list_services().await? {
            let queue = self.store.get_queue(&service.id).await?;
            if !queue.iter().any(|e| e.entrant_id == entrant_id) {
                continue;
            }

            let ranked = self.policy.rank(&queue, now);
            let total_in_queue = ranked.len();
            if let Some(found) = ranked.into_iter().find(|r| r.entry.entrant_id == entrant_id) {
                return Ok(Some(QueueStatus {
                    service_id: service.id.clone(),
                    service_name: service.name.clone(),
                    position: found.position,
                    total_in_queue,
                    priority_tier: found.entry.priority_tier,
                    joined_at: found.entry.joined_at,
                    score: found.score,
                    estimated_wait_minutes: (found.position as u64 - 1)
                        * u64::from(service.expected_duration_minutes),
                }));
            }
        }

        Ok(None)
    }

    pub async fn history(&self) -> Result<Vec<HistoryRecord>> {
        self.history.all().await
    }

    pub async fn history_for(&self, entrant_id: &str) -> Result<Vec<HistoryRecord>> {
        self.history.for_entrant(entrant_id).await
    }

    // ===== Internals =====

    /// Registered services each get their own lock; every other id shares one.
    async fn lock_service(&self, service_id: &str) -> OwnedMutexGuard<()> {
        let lock = if self.is_registered(service_id).await {
            self.tracked_lock(service_id, true)
        } else {
            None
        };
        lock.unwrap_or_else(|| self.unregistered_lock.clone())
            .lock_owned()
            .await
    }

    async fn is_registered(&self, service_id: &str) -> bool {
        match self.registry.get_service(service_id).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                tracing::warn!("Service lookup for {} failed: {}", service_id, e);
                false
            }
        }
    }

    fn tracked_lock(&self, service_id: &str, create: bool) -> Option<Arc<ServiceLock<()>>> {
        let mut table = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if create {
            let lock = table
                .entry(service_id.to_string())
                .or_insert_with(|| Arc::new(ServiceLock::new(())));
            Some(lock.clone())
        } else {
            table.get(service_id).cloned()
        }
    }

    /// Drops the table entry for a lock its caller holds, unless someone else
    /// has cloned it (the table, the caller and its guard account for three).
    fn release_lock(&self, service_id: &str, lock: &Arc<ServiceLock<()>>) {
        let mut table = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = table
            .get(service_id)
            .is_some_and(|held| Arc::ptr_eq(held, lock) && Arc::strong_count(lock) <= 3);
        if idle {
            table.remove(service_id);
        }
    }

    #[cfg(test)]
    fn tracked_lock_count(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn open_service(&self, service_id: &str) -> Result<Service> {
        match self.registry.get_service(service_id).await? {
            None => Err(QueueError::ServiceNotFound {
                service_id: service_id.to_string(),
            }),
            Some(service) if !service.open => {
                tracing::warn!("Rejected join for closed service {}", service_id);
                Err(QueueError::ServiceClosed {
                    service_id: service_id.to_string(),
                })
            }
            Some(service) => Ok(service),
        }
    }

    async fn take_entry(&self, service_id: &str, entrant_id: &str) -> Result<Option<QueueEntry>> {
        let mut queue = self.store.get_queue(service_id).await?;
        let Some(idx) = queue.iter().position(|e| e.entrant_id == entrant_id) else {
            return Ok(None);
        };
        let entry = queue.remove(idx);
        self.store.put_queue(service_id, queue).await?;
        Ok(Some(entry))
    }

    async fn service_name(&self, service_id: &str) -> String {
        match self.registry.get_service(service_id).await {
            Ok(Some(service)) => service.name,
            Ok(None) => service_id.to_string(),
            Err(e) => {
                tracing::warn!("Service lookup for {} failed: {}", service_id, e);
                service_id.to_string()
            }
        }
    }

    fn next_id(&self, prefix: &str, now: DateTime<Utc>) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}_{}", prefix, now.timestamp_millis(), seq)
    }

    async fn record(&self, entry: &QueueEntry, service_id: &str, service_name: &str, outcome: Outcome) {
        let now = self.clock.now();
        let record = HistoryRecord {
            id: self.next_id("h", now),
            entrant_id: entry.entrant_id.clone(),
            display_name: entry.display_name.clone(),
            service_id: service_id.to_string(),
            service_name: service_name.to_string(),
            priority_tier: entry.priority_tier,
            joined_at: entry.joined_at,
            resolved_at: now,
            outcome,
        };
        if let Err(e) = self.history.append(record).await {
            tracing::warn!("History append for {} failed: {}", entry.entrant_id, e);
        }
    }

    async fn notify(&self, kind: NotificationKind, message: String) {
        let now = self.clock.now();
        let notification = Notification {
            id: self.next_id("n", now),
            kind,
            message,
            read: false,
            created_at: now,
        };
        if let Err(e) = self.notifier.emit(notification).await {
            tracing::warn!("Notification {:?} dropped: {}", kind, e);
        }
    }
}

/// Swaps `joined_at` and `priority_tier` between two entrants of one queue.
fn swap_scoring_inputs(queue: &mut [QueueEntry], a: &str, b: &str) -> bool {
    let ia = queue.iter().position(|e| e.entrant_id == a);
    let ib = queue.iter().position(|e| e.entrant_id == b);
    let (Some(ia), Some(ib)) = (ia, ib) else {
        return false;
    };
    if ia == ib {
        return false;
    }

    let (lo, hi) = (ia.min(ib), ia.max(ib));
    let (left, right) = queue.split_at_mut(hi);
    left[lo].swap_scoring_inputs(&mut right[0]);
    true
}
