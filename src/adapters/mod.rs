// Adapters layer: concrete implementations of the domain ports.

pub mod clock;
pub mod file;
pub mod memory;
pub mod notify;

pub use clock::{ManualClock, SystemClock};
pub use file::{JsonFileQueueStore, JsonlHistoryLog};
pub use memory::{InMemoryHistoryLog, InMemoryQueueStore, InMemoryServiceRegistry};
pub use notify::{NotificationCenter, TracingNotifier};
