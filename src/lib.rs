//! # query-tier-cache
//!
//! 分层查询结果缓存：在慢速数据源之前按优先级逐层缓存查询结果。
//!
//! A tiered query-result cache that sits in front of one or more slow origin
//! data sources, memoizes results under a canonical key, and serves repeat
//! queries from the fastest tier that has them.
//!
//! ## Core Pieces
//!
//! - **Canonical keys**: structured queries encode to
//!   `TABLE|FILTER=VALUE;...|PROJECTION`, independent of field order, and
//!   decode back to an equivalent query
//! - **Read-repair**: a hit in a later tier is written back into every
//!   earlier tier that missed
//! - **Populate on miss**: an origin result is written into every tier
//! - **Ordered fallback**: several origins are tried in turn until one succeeds
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Keys, tiers and the tiered cache pipeline |
//! | [`origin`] | Data source trait and fallback chain |
//! | [`query`] | Structured / opaque query model |
//! | [`telemetry`] | Observers for pipeline events and statistics |
//! | [`config`] | YAML configuration |

pub mod cache;
pub mod config;
pub mod origin;
pub mod query;
pub mod telemetry;

pub use cache::{CacheKey, CacheTier, KeyCodec, PositionalKeyCodec, TieredCache};
pub use config::CacheConfig;
pub use origin::{DataSource, FallbackDataSource};
pub use query::Query;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
