//! # Work-Item Generation
//!
//! Produces date-keyed work items walking backwards from an anchor date and
//! filters out keys already recorded in a [`DeduplicationSet`].

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

/// Hour of day (UTC) each item's target instant is pinned to.
const TARGET_HOUR: u32 = 12;

/// One unit of campaign work, identified by its idempotency key.
#[derive(Debug, Clone, Serialize)]
pub struct WorkItem {
    pub key: String,
    pub date: NaiveDate,
    pub days_back: u32,
}

impl WorkItem {
    pub fn new(date: NaiveDate, days_back: u32) -> Self {
        Self {
            key: date.format("%Y-%m-%d").to_string(),
            date,
            days_back,
        }
    }

    /// Noon UTC on the item's date.
    pub fn target_time(&self) -> DateTime<Utc> {
        let noon = NaiveTime::from_hms_opt(TARGET_HOUR, 0, 0).unwrap_or_default();
        self.date.and_time(noon).and_utc()
    }

    /// Unix seconds of [`Self::target_time`].
    pub fn start_timestamp(&self) -> i64 {
        self.target_time().timestamp()
    }
}

impl PartialEq for WorkItem {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for WorkItem {}

impl Hash for WorkItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

/// Keys already dispatched. Serialises as a sorted list so callers can
/// persist it between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeduplicationSet {
    keys: BTreeSet<String>,
}

impl DeduplicationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Returns `true` if the key was not present.
    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        self.keys.insert(key.into())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

/// Walks backwards from an anchor date one day at a time.
#[derive(Debug, Clone)]
pub struct WorkItemGenerator {
    anchor: NaiveDate,
    days_back: u32,
    batch_size: usize,
    exhausted: bool,
}

impl WorkItemGenerator {
    pub fn new(anchor: NaiveDate, batch_size: usize) -> Self {
        Self {
            anchor,
            days_back: 1,
            batch_size: batch_size.max(1),
            exhausted: false,
        }
    }

    pub fn cursor(&self) -> u32 {
        self.days_back
    }

    /// `true` once the walk has run past the earliest representable date.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Examine up to `limit` (capped at the batch size) candidates, returning
    /// the ones not yet in `seen` and recording them there.
    pub fn next_batch(&mut self, limit: usize, seen: &mut DeduplicationSet) -> Vec<WorkItem> {
        let limit = limit.min(self.batch_size);
        let mut batch = Vec::with_capacity(limit);
        if self.exhausted {
            return batch;
        }

        let mut examined: u32 = 0;
        for offset in 0..limit as u32 {
            let date = self
                .days_back
                .checked_add(offset)
                .and_then(|days_back| {
                    let date = self.anchor.checked_sub_days(Days::new(days_back as u64))?;
                    Some((date, days_back))
                });
            let Some((date, days_back)) = date else {
                self.exhausted = true;
                break;
            };
            examined += 1;

            let item = WorkItem::new(date, days_back);
            if seen.insert(item.key.clone()) {
                batch.push(item);
            }
        }

        let advance = if batch.is_empty() {
            self.batch_size as u32
        } else {
            examined
        };
        match self.days_back.checked_add(advance) {
            Some(next) => self.days_back = next,
            None => self.exhausted = true,
        }

        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn anchor() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    #[test]
    fn test_items_walk_backwards_from_anchor() {
        let mut generator = WorkItemGenerator::new(anchor(), 2);
        let mut seen = DeduplicationSet::new();

        let batch = generator.next_batch(2, &mut seen);
        let keys: Vec<_> = batch.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["2024-03-09", "2024-03-08"]);
        assert_eq!(generator.cursor(), 3);
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_no_key_is_yielded_twice() {
        let mut generator = WorkItemGenerator::new(anchor(), 3);
        let mut seen = DeduplicationSet::new();
        let mut all = HashSet::new();

        for _ in 0..20 {
            for item in generator.next_batch(3, &mut seen) {
                assert!(all.insert(item.key.clone()), "duplicate key {}", item.key);
            }
        }
        assert_eq!(all.len(), 60);
    }

    #[test]
    fn test_prior_keys_are_skipped() {
        let mut seen = DeduplicationSet::from_keys(["2024-03-08"]);
        let mut generator = WorkItemGenerator::new(anchor(), 3);

        let batch = generator.next_batch(3, &mut seen);
        let keys: Vec<_> = batch.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["2024-03-09", "2024-03-07"]);
        assert_eq!(generator.cursor(), 4);
    }

    #[test]
    fn test_fully_duplicate_batch_still_advances() {
        let mut seen = DeduplicationSet::from_keys(["2024-03-09", "2024-03-08"]);
        let mut generator = WorkItemGenerator::new(anchor(), 2);

        assert!(generator.next_batch(2, &mut seen).is_empty());
        assert_eq!(generator.cursor(), 3);

        let batch = generator.next_batch(2, &mut seen);
        assert_eq!(batch[0].key, "2024-03-07");
    }

    #[test]
    fn test_limit_caps_batch() {
        let mut generator = WorkItemGenerator::new(anchor(), 5);
        let mut seen = DeduplicationSet::new();
        assert_eq!(generator.next_batch(1, &mut seen).len(), 1);
        assert_eq!(generator.cursor(), 2);
    }

    #[test]
    fn test_walk_stops_at_earliest_date() {
        let anchor = NaiveDate::MIN.checked_add_days(Days::new(1)).unwrap();
        let mut generator = WorkItemGenerator::new(anchor, 3);
        let mut seen = DeduplicationSet::new();

        let batch = generator.next_batch(3, &mut seen);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].date, NaiveDate::MIN);
        assert!(generator.is_exhausted());
        assert!(generator.next_batch(3, &mut seen).is_empty());
    }

    #[test]
    fn test_start_timestamp_is_noon_utc() {
        let item = WorkItem::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 1);
        assert_eq!(item.start_timestamp(), 1_704_110_400);
    }

    #[test]
    fn test_dedup_set_serializes_as_list() {
        let seen = DeduplicationSet::from_keys(["2024-01-02", "2024-01-01"]);
        let json = serde_json::to_string(&seen).unwrap();
        assert_eq!(json, r#"["2024-01-01","2024-01-02"]"#);

        let back: DeduplicationSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, seen);
    }
}
