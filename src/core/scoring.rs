//! Effective score and ranking.
//!
//! `score = weight[tier] + aging_rate * minutes_waited`. Scores depend on the
//! current time, so they are recomputed on every read and never stored.
//! Higher score is served sooner; equal scores fall back to earlier
//! `joined_at`, then to `entrant_id` so the order is total.

use crate::domain::model::{PriorityTier, QueueEntry, RankedEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityWeights {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            high: 30.0,
            medium: 15.0,
            low: 0.0,
        }
    }
}

impl PriorityWeights {
    pub fn weight(&self, tier: PriorityTier) -> f64 {
        match tier {
            PriorityTier::High => self.high,
            PriorityTier::Medium => self.medium,
            PriorityTier::Low => self.low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringPolicy {
    pub weights: PriorityWeights,
    /// Points gained per minute of waiting.
    pub aging_rate: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            weights: PriorityWeights::default(),
            aging_rate: 1.0,
        }
    }
}

/// Fractional minutes between `joined_at` and `now`, millisecond resolution.
pub fn minutes_elapsed(joined_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - joined_at).num_milliseconds() as f64 / 60_000.0
}

impl ScoringPolicy {
    pub fn score(&self, entry: &QueueEntry, now: DateTime<Utc>) -> f64 {
        self.weights.weight(entry.priority_tier)
            + self.aging_rate * minutes_elapsed(entry.joined_at, now)
    }

    fn compare(&self, a: &(f64, &QueueEntry), b: &(f64, &QueueEntry)) -> Ordering {
        b.0.total_cmp(&a.0)
            .then_with(|| a.1.joined_at.cmp(&b.1.joined_at))
            .then_with(|| a.1.entrant_id.cmp(&b.1.entrant_id))
    }

    /// Returns the ranking snapshot for `entries` at `now`, first to be served first.
    pub fn rank(&self, entries: &[QueueEntry], now: DateTime<Utc>) -> Vec<RankedEntry> {
        let mut scored: Vec<(f64, &QueueEntry)> = entries
            .iter()
            .map(|entry| (self.score(entry, now), entry))
            .collect();

        scored.sort_by(|a, b| self.compare(a, b));

        scored
            .into_iter()
            .enumerate()
            .map(|(idx, (score, entry))| RankedEntry {
                position: idx + 1,
                score,
                entry: entry.clone(),
            })
            .collect()
    }

    /// Index into `entries` of the entry that would be served next.
    pub fn select_best(&self, entries: &[QueueEntry], now: DateTime<Utc>) -> Option<usize> {
        entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (idx, (self.score(entry, now), entry)))
            .min_by(|(_, a), (_, b)| self.compare(a, b))
            .map(|(idx, _)| idx)
    }
}
