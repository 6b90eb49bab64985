//! Progress derivation from stored score rows.
//!
//! The snapshot is never persisted. It is a pure function of the rows for one
//! user and is recomputed after every mutation and on load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::level::{parse_level_number, sanitise_level_id};

/// One scored submission for a level, as stored in the scores table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub user_id: String,
    pub level_id: String,
    pub score: u32,
    pub recorded_at: DateTime<Utc>,
}

impl AttemptRecord {
    /// Build a record with a canonical level id.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        level_id: &str,
        score: u32,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            level_id: sanitise_level_id(level_id),
            score,
            recorded_at,
        }
    }
}

/// Display state of a level on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelStatus {
    Completed,
    Current,
    Unlocked,
    Locked,
}

/// Fully derived progress view for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub user_id: String,
    pub total_levels: u32,
    /// Ascending and deduplicated.
    pub completed_level_numbers: BTreeSet<u32>,
    pub completed_level_ids: BTreeSet<String>,
    pub high_scores: BTreeMap<String, u32>,
    pub total_score: u64,
    pub next_playable_level: u32,
}

impl ProgressSnapshot {
    /// Snapshot with nothing completed.
    #[must_use]
    pub fn empty(user_id: impl Into<String>, total_levels: u32) -> Self {
        Self {
            user_id: user_id.into(),
            total_levels,
            completed_level_numbers: BTreeSet::new(),
            completed_level_ids: BTreeSet::new(),
            high_scores: BTreeMap::new(),
            total_score: 0,
            next_playable_level: total_levels.min(1),
        }
    }

    /// Number of distinct levels completed.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.completed_level_numbers.len()
    }

    /// Every level has at least one passing attempt; replay is unlocked.
    #[must_use]
    pub fn all_completed(&self) -> bool {
        let total = usize::try_from(self.total_levels).unwrap_or(usize::MAX);
        self.completed_level_numbers.len() >= total || self.completed_level_ids.len() >= total
    }

    #[must_use]
    pub fn is_completed(&self, level_number: u32) -> bool {
        self.completed_level_numbers.contains(&level_number)
    }

    /// Completed either by canonical id or by parsed number.
    #[must_use]
    pub fn has_completed(&self, level_id: &str) -> bool {
        self.completed_level_ids.contains(level_id)
            || parse_level_number(level_id).is_some_and(|n| self.is_completed(n))
    }

    /// Map status of a level.
    #[must_use]
    pub fn level_status(&self, level_number: u32) -> LevelStatus {
        if self.is_completed(level_number) {
            LevelStatus::Completed
        } else if level_number == self.next_playable_level {
            LevelStatus::Current
        } else if level_number <= self.next_playable_level {
            LevelStatus::Unlocked
        } else {
            LevelStatus::Locked
        }
    }

    /// Highest recorded score for a level id.
    #[must_use]
    pub fn high_score(&self, level_id: &str) -> Option<u32> {
        self.high_scores.get(level_id).copied()
    }
}

/// Derive a user's progress from their attempt rows.
///
/// Rows whose level id has no usable number, or a number outside
/// `1..=total_levels`, are ignored. The next playable level counts completed
/// levels; it does not check which ones were completed.
#[must_use]
pub fn aggregate<'a, I>(user_id: &str, attempts: I, total_levels: u32) -> ProgressSnapshot
where
    I: IntoIterator<Item = &'a AttemptRecord>,
{
    let mut snapshot = ProgressSnapshot::empty(user_id, total_levels);

    for attempt in attempts {
        let level_id = sanitise_level_id(attempt.level_id.as_str());
        let Some(number) = parse_level_number(&level_id) else {
            continue;
        };
        if !(1..=total_levels).contains(&number) {
            continue;
        }
        snapshot.completed_level_numbers.insert(number);
        let best = snapshot.high_scores.entry(level_id.clone()).or_insert(0);
        *best = (*best).max(attempt.score);
        snapshot.completed_level_ids.insert(level_id);
    }

    snapshot.total_score = snapshot.high_scores.values().map(|s| u64::from(*s)).sum();
    let completed = u32::try_from(snapshot.completed_level_numbers.len()).unwrap_or(u32::MAX);
    snapshot.next_playable_level = completed.saturating_add(1).min(total_levels);
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(level: &str, score: u32) -> AttemptRecord {
        AttemptRecord::new("user-1", level, score, DateTime::<Utc>::UNIX_EPOCH)
    }

    #[test]
    fn aggregates_high_scores_and_next_level() {
        let rows = vec![
            attempt("level_1", 10),
            attempt("level_1", 30),
            attempt("level_2", 5),
        ];
        let snapshot = aggregate("user-1", &rows, 14);
        assert_eq!(
            snapshot.completed_level_numbers.iter().copied().collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(snapshot.high_score("level_1"), Some(30));
        assert_eq!(snapshot.high_score("level_2"), Some(5));
        assert_eq!(snapshot.total_score, 35);
        assert_eq!(snapshot.next_playable_level, 3);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let rows = vec![attempt("3", 7), attempt("level_1", 2), attempt("level_3", 9)];
        assert_eq!(aggregate("user-1", &rows, 14), aggregate("user-1", &rows, 14));
    }

    #[test]
    fn unusable_and_out_of_range_rows_are_ignored() {
        let rows = vec![
            attempt("bonus", 100),
            attempt("level_0", 100),
            attempt("level_15", 100),
            attempt("level_4", 1),
        ];
        let snapshot = aggregate("user-1", &rows, 14);
        assert_eq!(snapshot.completed_count(), 1);
        assert_eq!(snapshot.total_score, 1);
        assert_eq!(snapshot.high_scores.len(), 1);
    }

    #[test]
    fn next_level_is_capped_at_last_level() {
        let rows: Vec<_> = (1..=14).map(|n| attempt(&n.to_string(), n)).collect();
        let snapshot = aggregate("user-1", &rows, 14);
        assert_eq!(snapshot.next_playable_level, 14);
        assert!(snapshot.all_completed());
    }

    #[test]
    fn out_of_order_completion_counts_quantity() {
        let rows = vec![attempt("level_5", 1)];
        let snapshot = aggregate("user-1", &rows, 14);
        assert_eq!(snapshot.next_playable_level, 2);
        assert_eq!(snapshot.level_status(5), LevelStatus::Completed);
        assert_eq!(snapshot.level_status(2), LevelStatus::Current);
        assert_eq!(snapshot.level_status(1), LevelStatus::Unlocked);
        assert_eq!(snapshot.level_status(3), LevelStatus::Locked);
    }

    #[test]
    fn distinct_ids_with_same_number_keep_separate_high_scores() {
        let rows = vec![attempt("level_01", 4), attempt("level_1", 6)];
        let snapshot = aggregate("user-1", &rows, 14);
        assert_eq!(snapshot.completed_count(), 1);
        assert_eq!(snapshot.high_scores.len(), 2);
        assert_eq!(snapshot.total_score, 10);
        assert!(snapshot.has_completed("level_1"));
    }

    #[test]
    fn empty_snapshot_starts_at_first_level() {
        let snapshot = aggregate("user-1", &Vec::<AttemptRecord>::new(), 14);
        assert_eq!(snapshot.next_playable_level, 1);
        assert_eq!(snapshot.level_status(1), LevelStatus::Current);
        assert!(!snapshot.all_completed());
    }
}
