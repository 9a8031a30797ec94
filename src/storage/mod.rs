//! Cache storage abstraction: named generations of request -> response
//! entries.

mod disk;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::generation::GenerationName;
use crate::request::CachedResponse;

pub use disk::DiskStorage;

/// Storage holding every cache generation.
///
/// Operations are atomic per entry; `put_all` is atomic per batch with
/// respect to readers, which see either none or all of its entries.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Names of all generations present, in creation order where the
    /// backend can tell, otherwise sorted.
    async fn keys(&self) -> Result<Vec<GenerationName>>;

    /// True if a generation with this name exists.
    async fn has(&self, name: &GenerationName) -> Result<bool> {
        Ok(self.keys().await?.contains(name))
    }

    /// Stores `entries` in generation `name`, creating it if absent.
    /// An entry with the same key as an existing one replaces it.
    async fn put_all(&self, name: &GenerationName, entries: Vec<CachedResponse>) -> Result<()>;

    /// Looks up `key` in one generation.
    async fn match_in(&self, name: &GenerationName, key: &str)
    -> Result<Option<CachedResponse>>;

    /// Keys stored in one generation, sorted. Empty if it does not exist.
    async fn entry_keys(&self, name: &GenerationName) -> Result<Vec<String>>;

    /// Deletes a generation. Returns false if it did not exist.
    async fn delete(&self, name: &GenerationName) -> Result<bool>;

    /// Looks up `key` across generations, trying `preferred` first and then
    /// every other generation in [`keys`](Self::keys) order.
    async fn match_any(
        &self,
        preferred: &GenerationName,
        key: &str,
    ) -> Result<Option<CachedResponse>> {
        if let Some(hit) = self.match_in(preferred, key).await? {
            return Ok(Some(hit));
        }
        for name in self.keys().await? {
            if name == *preferred {
                continue;
            }
            if let Some(hit) = self.match_in(&name, key).await? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    order: Vec<GenerationName>,
    generations: HashMap<GenerationName, HashMap<String, CachedResponse>>,
}

/// In-process storage; contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: RwLock<MemoryInner>,
}

impl MemoryStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn keys(&self) -> Result<Vec<GenerationName>> {
        Ok(self.inner.read().await.order.clone())
    }

    async fn has(&self, name: &GenerationName) -> Result<bool> {
        Ok(self.inner.read().await.generations.contains_key(name))
    }

    async fn put_all(&self, name: &GenerationName, entries: Vec<CachedResponse>) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.generations.contains_key(name) {
            inner.order.push(name.clone());
        }
        let generation = inner.generations.entry(name.clone()).or_default();
        for entry in entries {
            generation.insert(entry.url.clone(), entry);
        }
        Ok(())
    }

    async fn match_in(
        &self,
        name: &GenerationName,
        key: &str,
    ) -> Result<Option<CachedResponse>> {
        Ok(self
            .inner
            .read()
            .await
            .generations
            .get(name)
            .and_then(|g| g.get(key))
            .cloned())
    }

    async fn entry_keys(&self, name: &GenerationName) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        let mut keys: Vec<String> = inner
            .generations
            .get(name)
            .map(|g| g.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, name: &GenerationName) -> Result<bool> {
        let mut inner = self.inner.write().await;
        inner.order.retain(|n| n != name);
        Ok(inner.generations.remove(name).is_some())
    }
}
