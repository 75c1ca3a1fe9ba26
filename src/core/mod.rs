pub mod engine;
pub mod scoring;

pub use crate::domain::model::{
    Direction, HistoryRecord, JoinOutcome, Notification, NotificationKind, Outcome, PriorityTier,
    QueueEntry, QueueStatus, RankedEntry, Service,
};
pub use crate::domain::ports::{Clock, HistoryLog, Notifier, QueueStore, ServiceRegistry};
pub use crate::utils::error::Result;
