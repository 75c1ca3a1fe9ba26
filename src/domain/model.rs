use crate::utils::error::{QueueError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declared urgency class of an entrant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    #[default]
    Low,
    Medium,
    High,
}

impl PriorityTier {
    pub const ALL: [PriorityTier; 3] = [PriorityTier::Low, PriorityTier::Medium, PriorityTier::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityTier::Low => "low",
            PriorityTier::Medium => "medium",
            PriorityTier::High => "high",
        }
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityTier {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(PriorityTier::Low),
            "medium" => Ok(PriorityTier::Medium),
            "high" => Ok(PriorityTier::High),
            _ => Err(QueueError::InvalidPriority {
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub expected_duration_minutes: u32,
    #[serde(default)]
    pub default_priority: PriorityTier,
    #[serde(default = "default_open")]
    pub open: bool,
}

fn default_open() -> bool {
    true
}

impl Service {
    pub fn new(id: impl Into<String>, name: impl Into<String>, expected_duration_minutes: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            expected_duration_minutes,
            default_priority: PriorityTier::Low,
            open: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_default_priority(mut self, tier: PriorityTier) -> Self {
        self.default_priority = tier;
        self
    }

    pub fn closed(mut self) -> Self {
        self.open = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        crate::utils::validation::validate_identifier("service.id", &self.id)?;
        crate::utils::validation::validate_non_empty_string("service.name", &self.name)?;
        crate::utils::validation::validate_positive_number(
            "service.expected_duration_minutes",
            self.expected_duration_minutes,
            1,
        )
    }
}

/// One person waiting in one service's queue.
///
/// `joined_at` and `priority_tier` are the only scoring inputs; administrative
/// reordering exchanges them between entries instead of moving entries around.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub entrant_id: String,
    pub display_name: String,
    pub priority_tier: PriorityTier,
    pub joined_at: DateTime<Utc>,
    #[serde(default)]
    pub is_walk_in: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl QueueEntry {
    pub fn new(
        entrant_id: impl Into<String>,
        display_name: impl Into<String>,
        priority_tier: PriorityTier,
        joined_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entrant_id: entrant_id.into(),
            display_name: display_name.into(),
            priority_tier,
            joined_at,
            is_walk_in: false,
            contact: None,
            notes: None,
        }
    }

    /// Exchanges the scoring inputs of two entries.
    pub fn swap_scoring_inputs(&mut self, other: &mut QueueEntry) {
        std::mem::swap(&mut self.joined_at, &mut other.joined_at);
        std::mem::swap(&mut self.priority_tier, &mut other.priority_tier);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Served,
    Left,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    pub id: String,
    pub entrant_id: String,
    pub display_name: String,
    pub service_id: String,
    pub service_name: String,
    pub priority_tier: PriorityTier,
    pub joined_at: DateTime<Utc>,
    pub resolved_at: DateTime<Utc>,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Joined,
    WalkInAdded,
    Left,
    Served,
    NextUp,
    AlmostReady,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl FromStr for Direction {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            _ => Err(QueueError::InvalidDirection {
                value: s.to_string(),
            }),
        }
    }
}

/// One row of a ranking snapshot.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankedEntry {
    pub position: usize,
    pub score: f64,
    pub entry: QueueEntry,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueueStatus {
    pub service_id: String,
    pub service_name: String,
    pub position: usize,
    pub total_in_queue: usize,
    pub priority_tier: PriorityTier,
    pub joined_at: DateTime<Utc>,
    pub score: f64,
    pub estimated_wait_minutes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    Joined(QueueEntry),
    AlreadyQueued(QueueEntry),
}

impl JoinOutcome {
    pub fn entry(&self) -> &QueueEntry {
        match self {
            JoinOutcome::Joined(entry) | JoinOutcome::AlreadyQueued(entry) => entry,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, JoinOutcome::Joined(_))
    }
}
