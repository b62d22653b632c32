//! Ordered fallback across origins.
//!
//! Sources are tried strictly in list order. A failure is reported to the
//! observer and the next source is tried; the first success is returned and
//! later sources are never invoked. Every call starts again from the first
//! source.

use super::DataSource;
use crate::telemetry::{CacheEvent, CacheObserver, TracingObserver};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

pub struct FallbackDataSource<Q, R> {
    sources: Vec<Arc<dyn DataSource<Q, R>>>,
    observer: Arc<dyn CacheObserver>,
}

impl<Q, R> FallbackDataSource<Q, R> {
    pub fn new(sources: Vec<Arc<dyn DataSource<Q, R>>>) -> Self {
        Self {
            sources,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl<Q, R> DataSource<Q, R> for FallbackDataSource<Q, R>
where
    Q: Send + Sync + 'static,
    R: Send + 'static,
{
    async fn query(&self, query: &Q) -> Result<R> {
        for (position, source) in self.sources.iter().enumerate() {
            self.observer.observe(&CacheEvent::SourceAttempt {
                source: source.name().to_string(),
                position,
            });
            match source.query(query).await {
                Ok(result) => return Ok(result),
                Err(e) => self.observer.observe(&CacheEvent::SourceFailed {
                    source: source.name().to_string(),
                    position,
                    error: e.to_string(),
                }),
            }
        }

        let attempted = self.sources.len();
        self.observer
            .observe(&CacheEvent::SourcesExhausted { attempted });
        Err(Error::AllSourcesExhausted { attempted })
    }

    fn name(&self) -> &str {
        "fallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::FnSource;
    use crate::telemetry::RecordingObserver;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(
        name: &'static str,
        calls: Arc<AtomicUsize>,
        outcome: std::result::Result<&'static str, &'static str>,
    ) -> Arc<dyn DataSource<String, String>> {
        Arc::new(FnSource::new(name, move |_: &String| {
            calls.fetch_add(1, Ordering::SeqCst);
            outcome
                .map(str::to_string)
                .map_err(|msg| Error::origin(name, anyhow::anyhow!(msg)))
        }))
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let calls: Vec<_> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let resolver = FallbackDataSource::new(vec![
            counting("s1", calls[0].clone(), Err("down")),
            counting("s2", calls[1].clone(), Ok("v")),
            counting("s3", calls[2].clone(), Ok("never")),
        ]);

        assert_eq!(resolver.query(&"q".to_string()).await.unwrap(), "v");
        assert_eq!(calls[0].load(Ordering::SeqCst), 1);
        assert_eq!(calls[1].load(Ordering::SeqCst), 1);
        assert_eq!(calls[2].load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retries_full_chain_on_every_call() {
        let first = Arc::new(AtomicUsize::new(0));
        let resolver = FallbackDataSource::new(vec![
            counting("s1", first.clone(), Err("down")),
            counting("s2", Arc::new(AtomicUsize::new(0)), Ok("v")),
        ]);

        resolver.query(&"q".to_string()).await.unwrap();
        resolver.query(&"q".to_string()).await.unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhaustion_reports_every_failure() {
        let recording = Arc::new(RecordingObserver::new());
        let resolver = FallbackDataSource::new(vec![
            counting("s1", Arc::new(AtomicUsize::new(0)), Err("timeout")),
            counting("s2", Arc::new(AtomicUsize::new(0)), Err("refused")),
        ])
        .with_observer(recording.clone());

        let err = resolver.query(&"q".to_string()).await.unwrap_err();
        assert!(matches!(err, Error::AllSourcesExhausted { attempted: 2 }));

        let failures: Vec<_> = recording
            .events()
            .into_iter()
            .filter_map(|e| match e {
                CacheEvent::SourceFailed { source, .. } => Some(source),
                _ => None,
            })
            .collect();
        assert_eq!(failures, vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn empty_chain_is_exhausted() {
        let resolver: FallbackDataSource<String, String> = FallbackDataSource::new(Vec::new());
        assert!(resolver.is_empty());
        let err = resolver.query(&"q".to_string()).await.unwrap_err();
        assert!(matches!(err, Error::AllSourcesExhausted { attempted: 0 }));
    }
}
