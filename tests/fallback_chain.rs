//! Ordered origin fallback.

use async_trait::async_trait;
use query_tier_cache::telemetry::{CacheEvent, RecordingObserver};
use query_tier_cache::{DataSource, Error, FallbackDataSource, Query, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Origin that sleeps briefly and then either answers or fails.
struct SlowSource {
    name: &'static str,
    answer: Option<&'static str>,
    calls: AtomicUsize,
}

impl SlowSource {
    fn ok(name: &'static str, answer: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            answer: Some(answer),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            answer: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource<Query, String> for SlowSource {
    async fn query(&self, query: &Query) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        match self.answer {
            Some(answer) => Ok(format!("{answer}:{}", query.table_name().unwrap_or_default())),
            None => Err(Error::origin(self.name, anyhow::anyhow!("connection reset"))),
        }
    }

    fn name(&self) -> &str {
        self.name
    }
}

fn chain(sources: &[Arc<SlowSource>]) -> FallbackDataSource<Query, String> {
    FallbackDataSource::new(
        sources
            .iter()
            .map(|s| s.clone() as Arc<dyn DataSource<Query, String>>)
            .collect(),
    )
}

#[tokio::test]
async fn test_first_success_wins_and_later_sources_are_skipped() {
    let s1 = SlowSource::failing("s1");
    let s2 = SlowSource::ok("s2", "rows");
    let s3 = SlowSource::ok("s3", "unused");
    let resolver = chain(&[s1.clone(), s2.clone(), s3.clone()]);

    let result = resolver.query(&Query::table("users").build()).await.unwrap();

    assert_eq!(result, "rows:users");
    assert_eq!((s1.calls(), s2.calls(), s3.calls()), (1, 1, 0));
}

#[tokio::test]
async fn test_every_call_restarts_from_the_first_source() {
    let s1 = SlowSource::failing("s1");
    let s2 = SlowSource::ok("s2", "rows");
    let resolver = chain(&[s1.clone(), s2.clone()]);

    for _ in 0..3 {
        resolver.query(&Query::table("users").build()).await.unwrap();
    }
    assert_eq!(s1.calls(), 3);
    assert_eq!(s2.calls(), 3);
}

#[tokio::test]
async fn test_all_failing_sources_exhaust_the_chain() {
    let recording = Arc::new(RecordingObserver::new());
    let resolver = chain(&[SlowSource::failing("s1"), SlowSource::failing("s2")])
        .with_observer(recording.clone());

    let err = resolver
        .query(&Query::table("users").build())
        .await
        .unwrap_err();

    assert!(err.is_exhausted());
    assert!(!err.to_string().contains("connection reset"));
    assert_eq!(
        recording.events().last(),
        Some(&CacheEvent::SourcesExhausted { attempted: 2 })
    );
}

#[tokio::test]
async fn test_empty_chain_fails_without_calls() {
    let resolver = chain(&[]);
    let err = resolver
        .query(&Query::opaque("anything"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AllSourcesExhausted { attempted: 0 }));
}
