//! Service queues ordered by declared priority plus waiting time.
//!
//! Each entrant's effective score is `weight[tier] + aging_rate * minutes_waited`,
//! so urgent arrivals get a head start while everyone else keeps climbing
//! until they are served. The [`SchedulingEngine`] owns every queue mutation
//! and talks to storage, the service catalog, the history log and the
//! notifier through the ports in [`domain::ports`].

pub mod adapters;
#[cfg(feature = "cli")]
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::QueueConfig;

pub use adapters::{
    InMemoryHistoryLog, InMemoryQueueStore, InMemoryServiceRegistry, ManualClock,
    NotificationCenter, SystemClock,
};
pub use self::core::{engine::SchedulingEngine, scoring::ScoringPolicy};
pub use utils::error::{QueueError, Result};
