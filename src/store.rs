//! # Snapshot store
//! The sole shared mutable resource: per-key append-only history plus a
//! "latest" projection, an event log with cooldown dedup, and the book of
//! current predictions.
//!
//! Records are built fully off to the side, wrapped in an `Arc`, and only
//! then swapped into the maps under a short-held lock. Readers clone the
//! `Arc` and can never observe a torn record. No lock is ever held across
//! an await point.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};

use crate::model::{
    Event, EventType, FlowRecord, MacroIndicator, Prediction, PremiumRecord, Quote, Timestamped,
};

/// Append-only history plus latest projection for one record type.
#[derive(Debug)]
pub struct SeriesMap<T> {
    inner: RwLock<HashMap<String, Series<T>>>,
    retention: usize,
}

#[derive(Debug)]
struct Series<T> {
    history: Vec<Arc<T>>,
    latest: Arc<T>,
}

impl<T: Timestamped> SeriesMap<T> {
    pub fn new(retention: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            retention: retention.max(1),
        }
    }

    /// Apply a whole normalized batch under one lock: all keys land
    /// together or (on an empty batch) nothing changes. Per-key timestamps
    /// must strictly increase; an item not newer than the current latest
    /// for its key is dropped.
    pub fn write_batch(&self, items: Vec<(String, T)>) -> usize {
        if items.is_empty() {
            return 0;
        }
        let mut map = self.inner.write().expect("series map lock poisoned");
        let mut written = 0;
        for (key, item) in items {
            let record = Arc::new(item);
            match map.get_mut(&key) {
                Some(series) => {
                    if record.recorded_at() <= series.latest.recorded_at() {
                        tracing::debug!(key = %key, "dropping non-monotonic snapshot");
                        continue;
                    }
                    series.history.push(Arc::clone(&record));
                    if series.history.len() > self.retention {
                        let excess = series.history.len() - self.retention;
                        series.history.drain(0..excess);
                    }
                    series.latest = record;
                }
                None => {
                    map.insert(
                        key,
                        Series {
                            history: vec![Arc::clone(&record)],
                            latest: record,
                        },
                    );
                }
            }
            written += 1;
        }
        written
    }

    pub fn latest(&self, key: &str) -> Option<Arc<T>> {
        let map = self.inner.read().expect("series map lock poisoned");
        map.get(key).map(|s| Arc::clone(&s.latest))
    }

    /// History for one key, oldest first, optionally bounded below by
    /// `since` and truncated to the most recent `limit` entries.
    pub fn history(
        &self,
        key: &str,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Vec<Arc<T>> {
        let map = self.inner.read().expect("series map lock poisoned");
        let Some(series) = map.get(key) else {
            return Vec::new();
        };
        let filtered: Vec<Arc<T>> = series
            .history
            .iter()
            .filter(|r| since.is_none_or(|s| r.recorded_at() >= s))
            .cloned()
            .collect();
        let start = filtered.len().saturating_sub(limit);
        filtered[start..].to_vec()
    }

    pub fn keys(&self) -> Vec<String> {
        let map = self.inner.read().expect("series map lock poisoned");
        map.keys().cloned().collect()
    }
}

/// Append-only event log. Uniqueness is enforced here via the dedup key,
/// so replaying a derivation never double-alerts, no external locking needed.
#[derive(Debug)]
pub struct EventLog {
    inner: Mutex<VecDeque<Arc<Event>>>,
    retention: usize,
    cooldown: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<EventType>,
    pub target_index: Option<String>,
    pub min_importance: Option<u8>,
}

impl EventLog {
    pub fn new(retention: usize, cooldown_secs: i64) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            retention: retention.max(1),
            cooldown: Duration::seconds(cooldown_secs.max(0)),
        }
    }

    /// Append unless an event with the same dedup key landed within the
    /// cooldown window. Returns whether the event was kept.
    pub fn append(&self, event: Event) -> bool {
        let mut log = self.inner.lock().expect("event log lock poisoned");
        let suppressed = log.iter().rev().any(|e| {
            e.dedup_key == event.dedup_key && event.created_at - e.created_at < self.cooldown
        });
        if suppressed {
            tracing::debug!(dedup_key = %event.dedup_key, "event suppressed by cooldown");
            return false;
        }
        log.push_back(Arc::new(event));
        if log.len() > self.retention {
            let excess = log.len() - self.retention;
            log.drain(0..excess);
        }
        true
    }

    /// Newest first, filtered, truncated to `limit`.
    pub fn list(&self, filter: &EventFilter, limit: usize) -> Vec<Arc<Event>> {
        let log = self.inner.lock().expect("event log lock poisoned");
        log.iter()
            .rev()
            .filter(|e| {
                filter.event_type.is_none_or(|t| e.event_type == t)
                    && filter
                        .target_index
                        .as_deref()
                        .is_none_or(|t| e.target_index == t)
                    && filter.min_importance.is_none_or(|m| e.importance >= m)
            })
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("event log lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Current prediction per index. Publishing supersedes; nothing is deleted
/// until superseded, and an expired entry is reported as absent.
#[derive(Debug, Default)]
pub struct PredictionBook {
    inner: RwLock<HashMap<String, Arc<Prediction>>>,
}

impl PredictionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, prediction: Prediction) {
        let mut map = self.inner.write().expect("prediction book lock poisoned");
        map.insert(prediction.index_code.clone(), Arc::new(prediction));
    }

    pub fn current(&self, index_code: &str, now: DateTime<Utc>) -> Option<Arc<Prediction>> {
        let map = self.inner.read().expect("prediction book lock poisoned");
        map.get(index_code)
            .filter(|p| !p.is_expired(now))
            .cloned()
    }

    pub fn current_all(&self, now: DateTime<Utc>) -> Vec<Arc<Prediction>> {
        let map = self.inner.read().expect("prediction book lock poisoned");
        let mut out: Vec<Arc<Prediction>> = map
            .values()
            .filter(|p| !p.is_expired(now))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.index_code.cmp(&b.index_code));
        out
    }
}

/// Everything the pipelines share.
#[derive(Debug)]
pub struct SnapshotStore {
    pub quotes: SeriesMap<Quote>,
    pub premiums: SeriesMap<PremiumRecord>,
    pub flows: SeriesMap<FlowRecord>,
    pub indicators: SeriesMap<MacroIndicator>,
    pub events: EventLog,
    pub predictions: PredictionBook,
}

impl SnapshotStore {
    pub fn new(history_retention: usize, event_retention: usize, cooldown_secs: i64) -> Self {
        Self {
            quotes: SeriesMap::new(history_retention),
            premiums: SeriesMap::new(history_retention),
            flows: SeriesMap::new(history_retention),
            indicators: SeriesMap::new(history_retention),
            events: EventLog::new(event_retention, cooldown_secs),
            predictions: PredictionBook::new(),
        }
    }
}
