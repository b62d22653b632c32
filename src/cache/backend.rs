//! Cache tier implementations.

use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A named key/value store probed by the tiered cache.
///
/// `get` returns `Ok(None)` on a miss; an `Err` is reserved for backend
/// failures. `set` overwrites unconditionally.
#[async_trait]
pub trait CacheTier<V>: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<V>>;
    async fn set(&self, key: &str, value: V) -> Result<()>;
    fn name(&self) -> &str;
}

/// Concurrent in-memory tier. Entries live until overwritten or cleared.
pub struct MemoryTier<V> {
    name: String,
    entries: Arc<RwLock<HashMap<String, V>>>,
}

impl<V> MemoryTier<V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }
}

#[async_trait]
impl<V> CacheTier<V> for MemoryTier<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>> {
        tracing::debug!(tier = %self.name, key, "checking tier");
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: V) -> Result<()> {
        tracing::debug!(tier = %self.name, key, "writing tier");
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Tier that always misses and discards writes.
pub struct NullTier {
    name: String,
}

impl NullTier {
    pub fn new() -> Self {
        Self {
            name: "null".to_string(),
        }
    }
}

impl Default for NullTier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> CacheTier<V> for NullTier
where
    V: Send + 'static,
{
    async fn get(&self, _: &str) -> Result<Option<V>> {
        Ok(None)
    }

    async fn set(&self, _: &str, _: V) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
