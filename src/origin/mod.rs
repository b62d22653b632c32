//! Origin data sources.
//!
//! An origin is the authoritative, slow source consulted only after every
//! cache tier has missed. [`FallbackDataSource`] chains several origins and
//! returns the first success.

mod fallback;

pub use fallback::FallbackDataSource;

use crate::Result;
use async_trait::async_trait;

/// Anything that can answer a query.
///
/// Failures of any kind are reported as `Err`; callers do not rely on a
/// particular error variant beyond "failed".
#[async_trait]
pub trait DataSource<Q, R>: Send + Sync {
    async fn query(&self, query: &Q) -> Result<R>;

    /// Label used in diagnostics.
    fn name(&self) -> &str {
        "origin"
    }
}

/// Adapts a synchronous closure into a [`DataSource`].
pub struct FnSource<F> {
    name: String,
    func: F,
}

impl<F> FnSource<F> {
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<Q, R, F> DataSource<Q, R> for FnSource<F>
where
    Q: Send + Sync + 'static,
    R: Send + 'static,
    F: Fn(&Q) -> Result<R> + Send + Sync,
{
    async fn query(&self, query: &Q) -> Result<R> {
        (self.func)(query)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
