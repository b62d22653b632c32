//! Pipeline observation: the diagnostic side channel of the cache.
//!
//! The tiered cache and the fallback resolver never log directly. They emit
//! [`CacheEvent`]s into a [`CacheObserver`], which may forward them to
//! `tracing`, count them, record them for assertions, or drop them.
//! Observers cannot influence control flow.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`TracingObserver`] | Default; forwards events to `tracing` |
//! | [`NoopObserver`] | Discards every event |
//! | [`RecordingObserver`] | Keeps events in memory for tests and debugging |
//! | [`StatsObserver`] | Aggregates hit/miss counters into [`CacheStats`] |
//! | [`CompositeObserver`] | Fans events out to several observers |

use crate::cache::CacheKey;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Which tier operation an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierOperation {
    Get,
    Set,
}

/// A single observation emitted by the cache pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    KeyGenerated {
        key: CacheKey,
    },
    TierHit {
        tier: String,
        index: usize,
        key: CacheKey,
    },
    TierMiss {
        tier: String,
        index: usize,
        key: CacheKey,
    },
    /// A value found at a later tier was written back into an earlier one.
    Backfill {
        tier: String,
        index: usize,
        key: CacheKey,
    },
    OriginFetch {
        key: CacheKey,
    },
    /// A freshly fetched origin result was written into a tier.
    Populate {
        tier: String,
        index: usize,
        key: CacheKey,
    },
    TierError {
        tier: String,
        index: usize,
        operation: TierOperation,
        error: String,
    },
    SourceAttempt {
        source: String,
        position: usize,
    },
    SourceFailed {
        source: String,
        position: usize,
        error: String,
    },
    SourcesExhausted {
        attempted: usize,
    },
    /// A filter pair without `=` was dropped while reconstructing a key.
    MalformedPairSkipped {
        pair: String,
    },
}

/// Receiver of pipeline events.
pub trait CacheObserver: Send + Sync {
    fn observe(&self, event: &CacheEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CacheObserver for NoopObserver {
    fn observe(&self, _: &CacheEvent) {}
}

/// Forwards events to `tracing`.
///
/// Full keys are logged at `debug`; `info` lines carry the key digest so
/// filter values stay out of default-level logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl CacheObserver for TracingObserver {
    fn observe(&self, event: &CacheEvent) {
        match event {
            CacheEvent::KeyGenerated { key } => {
                tracing::debug!(key = %key, digest = %key.digest(), "generated cache key");
            }
            CacheEvent::TierHit { tier, index, key } => {
                tracing::info!(tier = %tier, index, digest = %key.digest(), "cache hit");
            }
            CacheEvent::TierMiss { tier, index, key } => {
                tracing::info!(tier = %tier, index, digest = %key.digest(), "cache miss");
            }
            CacheEvent::Backfill { tier, index, key } => {
                tracing::info!(tier = %tier, index, digest = %key.digest(), "backfilling tier");
            }
            CacheEvent::OriginFetch { key } => {
                tracing::info!(digest = %key.digest(), "fetching from origin");
            }
            CacheEvent::Populate { tier, index, key } => {
                tracing::info!(tier = %tier, index, digest = %key.digest(), "populating tier");
            }
            CacheEvent::TierError {
                tier,
                index,
                operation,
                error,
            } => {
                tracing::warn!(tier = %tier, index, ?operation, error = %error, "tier operation failed");
            }
            CacheEvent::SourceAttempt { source, position } => {
                tracing::info!(source = %source, position, "trying data source");
            }
            CacheEvent::SourceFailed {
                source,
                position,
                error,
            } => {
                tracing::warn!(source = %source, position, error = %error, "data source failed");
            }
            CacheEvent::SourcesExhausted { attempted } => {
                tracing::warn!(attempted, "all data sources failed");
            }
            CacheEvent::MalformedPairSkipped { pair } => {
                tracing::warn!(pair = %pair, "dropping malformed filter pair");
            }
        }
    }
}

/// Events kept by [`RecordingObserver::new`].
pub const DEFAULT_MAX_EVENTS: usize = 1024;

/// Keeps the most recent events in memory, oldest first.
pub struct RecordingObserver {
    events: RwLock<VecDeque<CacheEvent>>,
    max_events: usize,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::with_max_events(DEFAULT_MAX_EVENTS)
    }

    /// Keep at most `max` events; the oldest is dropped on overflow.
    pub fn with_max_events(max: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            max_events: max,
        }
    }

    pub fn max_events(&self) -> usize {
        self.max_events
    }

    pub fn events(&self) -> Vec<CacheEvent> {
        self.events
            .read()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RecordingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheObserver for RecordingObserver {
    fn observe(&self, event: &CacheEvent) {
        if let Ok(mut events) = self.events.write() {
            events.push_back(event.clone());
            while events.len() > self.max_events {
                events.pop_front();
            }
        }
    }
}

/// Point-in-time counters collected by [`StatsObserver`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub backfills: u64,
    pub populates: u64,
    pub origin_fetches: u64,
    pub origin_failures: u64,
    pub tier_errors: u64,
}

impl CacheStats {
    /// Fraction of tier probes that hit. Each missed tier counts once, so a
    /// query that hits the third tier contributes one hit and two misses.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    backfills: AtomicU64,
    populates: AtomicU64,
    origin_fetches: AtomicU64,
    origin_failures: AtomicU64,
    tier_errors: AtomicU64,
}

impl AtomicStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            backfills: AtomicU64::new(0),
            populates: AtomicU64::new(0),
            origin_fetches: AtomicU64::new(0),
            origin_failures: AtomicU64::new(0),
            tier_errors: AtomicU64::new(0),
        }
    }

    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            backfills: self.backfills.load(Ordering::Relaxed),
            populates: self.populates.load(Ordering::Relaxed),
            origin_fetches: self.origin_fetches.load(Ordering::Relaxed),
            origin_failures: self.origin_failures.load(Ordering::Relaxed),
            tier_errors: self.tier_errors.load(Ordering::Relaxed),
        }
    }
}

/// Counts pipeline events with relaxed atomics.
pub struct StatsObserver {
    stats: AtomicStats,
}

impl StatsObserver {
    pub fn new() -> Self {
        Self {
            stats: AtomicStats::new(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }
}

impl Default for StatsObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheObserver for StatsObserver {
    fn observe(&self, event: &CacheEvent) {
        let counter = match event {
            CacheEvent::TierHit { .. } => &self.stats.hits,
            CacheEvent::TierMiss { .. } => &self.stats.misses,
            CacheEvent::Backfill { .. } => &self.stats.backfills,
            CacheEvent::Populate { .. } => &self.stats.populates,
            CacheEvent::OriginFetch { .. } => &self.stats.origin_fetches,
            CacheEvent::SourceFailed { .. } => &self.stats.origin_failures,
            CacheEvent::TierError { .. } => &self.stats.tier_errors,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Fans events out to every registered observer, in registration order.
pub struct CompositeObserver {
    observers: Vec<Arc<dyn CacheObserver>>,
}

impl CompositeObserver {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn add_observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl Default for CompositeObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheObserver for CompositeObserver {
    fn observe(&self, event: &CacheEvent) {
        for observer in &self.observers {
            observer.observe(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(index: usize) -> CacheEvent {
        CacheEvent::TierHit {
            tier: format!("t{index}"),
            index,
            key: CacheKey::new("users|id=1"),
        }
    }

    fn miss(index: usize) -> CacheEvent {
        CacheEvent::TierMiss {
            tier: format!("t{index}"),
            index,
            key: CacheKey::new("users|id=1"),
        }
    }

    #[test]
    fn stats_count_probes() {
        let observer = StatsObserver::new();
        observer.observe(&miss(0));
        observer.observe(&miss(1));
        observer.observe(&hit(2));
        observer.observe(&CacheEvent::SourceAttempt {
            source: "db".into(),
            position: 0,
        });

        let stats = observer.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert!((stats.hit_ratio() - 1.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_stats_have_zero_ratio() {
        assert_eq!(CacheStats::default().hit_ratio(), 0.0);
    }

    #[test]
    fn composite_forwards_to_all() {
        let recording = Arc::new(RecordingObserver::new());
        let stats = Arc::new(StatsObserver::new());
        let composite = CompositeObserver::new()
            .add_observer(recording.clone())
            .add_observer(stats.clone());

        composite.observe(&hit(0));

        assert_eq!(recording.events(), vec![hit(0)]);
        assert_eq!(stats.stats().hits, 1);
        recording.clear();
        assert!(recording.is_empty());
    }

    #[test]
    fn recording_drops_oldest_past_max_events() {
        let recording = RecordingObserver::with_max_events(2);
        for index in 0..5 {
            recording.observe(&hit(index));
        }

        assert_eq!(recording.len(), 2);
        assert_eq!(recording.events(), vec![hit(3), hit(4)]);
        assert_eq!(RecordingObserver::new().max_events(), DEFAULT_MAX_EVENTS);
    }
}
