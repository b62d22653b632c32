//! 分层查询缓存模块：规范化键、逐层探测、读修复与回源填充。
//!
//! # Tiered Query Cache
//!
//! This module memoizes origin query results across an ordered list of
//! cache tiers.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`TieredCache`] | Probe, backfill and populate pipeline |
//! | [`TieredCacheBuilder`] | Wires codec, tiers, origin and observer |
//! | [`KeyCodec`] | Trait for query ↔ key strategies |
//! | [`PositionalKeyCodec`] | Canonical `TABLE\|FILTERS\|PROJECTION` codec |
//! | [`CacheTier`] | Trait for tier implementations |
//! | [`MemoryTier`] | Concurrent in-memory tier |
//! | [`NullTier`] | Tier that never stores anything |
//!
//! ## Example
//!
//! ```rust
//! use query_tier_cache::cache::{KeyCodecConfig, MemoryTier, TieredCache};
//! use query_tier_cache::origin::FnSource;
//! use query_tier_cache::{Error, Query};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let cache = TieredCache::<Query, String>::builder()
//!     .with_positional_codec(KeyCodecConfig::default())
//!     .with_tier(Arc::new(MemoryTier::<String>::new("l1")))
//!     .with_tier(Arc::new(MemoryTier::<String>::new("l2")))
//!     .with_origin(Arc::new(FnSource::new("db", |_: &Query| {
//!         Ok::<_, Error>("42 rows".to_string())
//!     })))
//!     .build()?;
//!
//! let query = Query::table("orders").filter("status", "SHIPPED").build();
//! assert_eq!(cache.query(&query).await?, "42 rows");
//! assert_eq!(cache.key_for(&query)?.as_str(), "orders|status=SHIPPED");
//! # Ok::<(), Error>(())
//! # }).unwrap();
//! ```

mod backend;
mod key;
mod manager;

pub use backend::{CacheTier, MemoryTier, NullTier};
pub use key::{
    CacheKey, EscapeMode, KeyCodec, KeyCodecConfig, MalformedPairPolicy, PositionalKeyCodec,
    DEFAULT_PROJECTIONS, KV_DELIMITER, OPAQUE_PREFIX, PAIR_DELIMITER, SEGMENT_DELIMITER,
    UNKNOWN_TABLE,
};
pub use manager::{TierErrorPolicy, TieredCache, TieredCacheBuilder};
