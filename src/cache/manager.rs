//! Tiered cache manager.
//!
//! Lookup protocol for one query:
//!
//! 1. Generate the key once; it is reused for every tier.
//! 2. Probe tiers in order. On the first hit at index `i`, write the value
//!    into every tier `j < i` (read-repair) and return it. Tiers after `i`
//!    are not touched.
//! 3. If every tier misses, ask the origin with the structured query, write
//!    the result into every tier in order, and return it.

use super::backend::{CacheTier, MemoryTier};
use super::key::{CacheKey, KeyCodec, KeyCodecConfig, PositionalKeyCodec};
use crate::config::CacheConfig;
use crate::origin::{DataSource, FallbackDataSource};
use crate::query::Query;
use crate::telemetry::{CacheEvent, CacheObserver, TierOperation, TracingObserver};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How tier `get`/`set` failures affect a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierErrorPolicy {
    /// Return the tier error to the caller.
    #[default]
    Propagate,
    /// Treat a failed `get` as a miss and skip a failed `set`.
    Tolerate,
}

pub struct TieredCache<Q, R> {
    codec: Arc<dyn KeyCodec<Q>>,
    tiers: Vec<Arc<dyn CacheTier<R>>>,
    origin: Arc<dyn DataSource<Q, R>>,
    observer: Arc<dyn CacheObserver>,
    tier_errors: TierErrorPolicy,
}

impl<Q, R> TieredCache<Q, R>
where
    Q: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub fn builder() -> TieredCacheBuilder<Q, R> {
        TieredCacheBuilder::new()
    }

    /// Answer `query` from the first tier that has it, or from the origin.
    pub async fn query(&self, query: &Q) -> Result<R> {
        self.resolve(query).await
    }

    /// Run several queries concurrently. Fails on the first error.
    pub async fn query_many(&self, queries: &[Q]) -> Result<Vec<R>> {
        futures::future::try_join_all(queries.iter().map(|q| self.resolve(q))).await
    }

    /// The key `query` would be cached under.
    pub fn key_for(&self, query: &Q) -> Result<CacheKey> {
        self.codec.generate_key(query)
    }

    /// Decode a stored key with this cache's codec.
    pub fn reconstruct_query(&self, key: &str) -> Result<Q> {
        self.codec.reconstruct_query(key)
    }

    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    pub fn tier_errors(&self) -> TierErrorPolicy {
        self.tier_errors
    }

    async fn resolve(&self, query: &Q) -> Result<R> {
        let key = self.codec.generate_key(query)?;
        self.observer
            .observe(&CacheEvent::KeyGenerated { key: key.clone() });

        for (index, tier) in self.tiers.iter().enumerate() {
            if let Some(value) = self.probe(index, tier.as_ref(), &key).await? {
                self.observer.observe(&CacheEvent::TierHit {
                    tier: tier.name().to_string(),
                    index,
                    key: key.clone(),
                });
                for (earlier_index, earlier) in self.tiers[..index].iter().enumerate() {
                    self.observer.observe(&CacheEvent::Backfill {
                        tier: earlier.name().to_string(),
                        index: earlier_index,
                        key: key.clone(),
                    });
                    self.store(earlier_index, earlier.as_ref(), &key, value.clone())
                        .await?;
                }
                return Ok(value);
            }
            self.observer.observe(&CacheEvent::TierMiss {
                tier: tier.name().to_string(),
                index,
                key: key.clone(),
            });
        }

        self.observer
            .observe(&CacheEvent::OriginFetch { key: key.clone() });
        let result = self.origin.query(query).await?;

        for (index, tier) in self.tiers.iter().enumerate() {
            self.observer.observe(&CacheEvent::Populate {
                tier: tier.name().to_string(),
                index,
                key: key.clone(),
            });
            self.store(index, tier.as_ref(), &key, result.clone()).await?;
        }
        Ok(result)
    }

    async fn probe(
        &self,
        index: usize,
        tier: &dyn CacheTier<R>,
        key: &CacheKey,
    ) -> Result<Option<R>> {
        match tier.get(key.as_str()).await {
            Ok(found) => Ok(found),
            Err(e) => {
                self.tier_failed(index, tier, TierOperation::Get, &e);
                match self.tier_errors {
                    TierErrorPolicy::Propagate => Err(e),
                    TierErrorPolicy::Tolerate => Ok(None),
                }
            }
        }
    }

    async fn store(
        &self,
        index: usize,
        tier: &dyn CacheTier<R>,
        key: &CacheKey,
        value: R,
    ) -> Result<()> {
        match tier.set(key.as_str(), value).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.tier_failed(index, tier, TierOperation::Set, &e);
                match self.tier_errors {
                    TierErrorPolicy::Propagate => Err(e),
                    TierErrorPolicy::Tolerate => Ok(()),
                }
            }
        }
    }

    fn tier_failed(
        &self,
        index: usize,
        tier: &dyn CacheTier<R>,
        operation: TierOperation,
        e: &Error,
    ) {
        self.observer.observe(&CacheEvent::TierError {
            tier: tier.name().to_string(),
            index,
            operation,
            error: e.to_string(),
        });
    }
}

/// The cache is itself a data source, so caches can be stacked or placed in
/// a fallback chain.
#[async_trait]
impl<Q, R> DataSource<Q, R> for TieredCache<Q, R>
where
    Q: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    async fn query(&self, query: &Q) -> Result<R> {
        self.resolve(query).await
    }

    fn name(&self) -> &str {
        "tiered_cache"
    }
}

/// Built codecs are used as given; deferred ones receive the cache observer
/// in `build()`.
enum CodecSpec<Q> {
    Built(Arc<dyn KeyCodec<Q>>),
    Deferred(Box<dyn FnOnce(Arc<dyn CacheObserver>) -> Arc<dyn KeyCodec<Q>>>),
}

enum OriginSpec<Q, R> {
    Single(Arc<dyn DataSource<Q, R>>),
    Chain(Vec<Arc<dyn DataSource<Q, R>>>),
}

pub struct TieredCacheBuilder<Q, R> {
    codec: Option<CodecSpec<Q>>,
    tiers: Vec<Arc<dyn CacheTier<R>>>,
    origin: Option<OriginSpec<Q, R>>,
    observer: Option<Arc<dyn CacheObserver>>,
    tier_errors: TierErrorPolicy,
}

impl<Q, R> TieredCacheBuilder<Q, R>
where
    Q: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            codec: None,
            tiers: Vec::new(),
            origin: None,
            observer: None,
            tier_errors: TierErrorPolicy::default(),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn KeyCodec<Q>>) -> Self {
        self.codec = Some(CodecSpec::Built(codec));
        self
    }

    /// Append a tier; tiers are probed in the order they are added.
    pub fn with_tier(mut self, tier: Arc<dyn CacheTier<R>>) -> Self {
        self.tiers.push(tier);
        self
    }

    pub fn with_tiers(mut self, tiers: impl IntoIterator<Item = Arc<dyn CacheTier<R>>>) -> Self {
        self.tiers.extend(tiers);
        self
    }

    /// Use a single origin; its failures reach the caller unchanged.
    pub fn with_origin(mut self, origin: Arc<dyn DataSource<Q, R>>) -> Self {
        self.origin = Some(OriginSpec::Single(origin));
        self
    }

    /// Use an ordered fallback chain of origins.
    pub fn with_fallback(mut self, sources: Vec<Arc<dyn DataSource<Q, R>>>) -> Self {
        self.origin = Some(OriginSpec::Chain(sources));
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_tier_errors(mut self, policy: TierErrorPolicy) -> Self {
        self.tier_errors = policy;
        self
    }

    pub fn build(self) -> Result<TieredCache<Q, R>> {
        let codec = self.codec.ok_or_else(|| {
            Error::configuration_with_context(
                "a key codec is required",
                ErrorContext::new()
                    .with_field_path("codec")
                    .with_source("tiered_cache_builder"),
            )
        })?;
        let observer = self
            .observer
            .unwrap_or_else(|| Arc::new(TracingObserver) as Arc<dyn CacheObserver>);
        let codec = match codec {
            CodecSpec::Built(codec) => codec,
            CodecSpec::Deferred(make) => make(observer.clone()),
        };
        let origin = match self.origin {
            Some(OriginSpec::Single(origin)) => origin,
            Some(OriginSpec::Chain(sources)) => Arc::new(
                FallbackDataSource::new(sources).with_observer(observer.clone()),
            ) as Arc<dyn DataSource<Q, R>>,
            None => {
                return Err(Error::configuration_with_context(
                    "an origin data source is required",
                    ErrorContext::new()
                        .with_field_path("origin")
                        .with_source("tiered_cache_builder"),
                ))
            }
        };

        Ok(TieredCache {
            codec,
            tiers: self.tiers,
            origin,
            observer,
            tier_errors: self.tier_errors,
        })
    }
}

impl<Q, R> Default for TieredCacheBuilder<Q, R>
where
    Q: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R> TieredCacheBuilder<Query, R>
where
    R: Clone + Send + Sync + 'static,
{
    /// Use the positional codec with `config`. The codec reports to the
    /// builder's observer, whenever that is set.
    pub fn with_positional_codec(mut self, config: KeyCodecConfig) -> Self {
        self.codec = Some(CodecSpec::Deferred(Box::new(move |observer: Arc<dyn CacheObserver>| {
            Arc::new(PositionalKeyCodec::with_config(config).with_observer(observer))
                as Arc<dyn KeyCodec<Query>>
        })));
        self
    }

    /// Apply a loaded [`CacheConfig`]: codec options, tier error policy, and
    /// one in-memory tier per configured name, appended in order.
    pub fn with_config(self, config: &CacheConfig) -> Self {
        let tiers: Vec<Arc<dyn CacheTier<R>>> = config
            .tiers
            .iter()
            .map(|name| Arc::new(MemoryTier::<R>::new(name.clone())) as Arc<dyn CacheTier<R>>)
            .collect();
        self.with_positional_codec(config.codec.clone())
            .with_tier_errors(config.tier_errors)
            .with_tiers(tiers)
    }
}
