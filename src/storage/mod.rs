//! Persistence contract for series state and endpoint registrations.
//!
//! The pipeline never issues raw storage queries beyond this trait. Two
//! backends ship: [`MemoryStore`] for tests and one-off runs, and
//! [`LocalStore`], a JSON watchlist file with atomic writes.

pub mod local;
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{ChapterKey, Endpoint, Series};

pub use local::LocalStore;
pub use memory::MemoryStore;

/// Read/write contract the pipeline holds against the persistence layer.
#[async_trait]
pub trait SeriesStore: Send + Sync {
    /// Series whose poll interval has elapsed at `now`.
    async fn due_series(&self, now: DateTime<Utc>) -> Result<Vec<Series>>;

    /// Advance a series' last-known chapter and check timestamp.
    ///
    /// Implementations must never regress the stored key; manual
    /// corrections go through the owning subscription manager, not here.
    async fn update_last_known(
        &self,
        series_id: &str,
        key: ChapterKey,
        label: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Record a successful no-change check.
    async fn mark_checked(&self, series_id: &str, checked_at: DateTime<Utc>) -> Result<()>;

    /// Endpoints registered against a series.
    async fn endpoints_for(&self, series_id: &str) -> Result<Vec<Endpoint>>;

    /// Monotonically increasing counter, bumped on every mutation.
    /// Caches compare versions instead of sharing an invalidation flag.
    async fn version(&self) -> Result<u64>;
}

#[derive(Default)]
struct CacheInner {
    version: u64,
    entries: HashMap<String, Vec<Endpoint>>,
}

/// Endpoint lookup cache, invalidated by store version comparison.
#[derive(Default)]
pub struct EndpointCache {
    inner: Mutex<CacheInner>,
}

impl EndpointCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached endpoint resolution; any store mutation since the last call
    /// clears the whole cache.
    pub async fn get(&self, store: &dyn SeriesStore, series_id: &str) -> Result<Vec<Endpoint>> {
        let version = store.version().await?;

        {
            let mut inner = self.inner.lock().await;
            if inner.version != version {
                inner.entries.clear();
                inner.version = version;
            } else if let Some(hit) = inner.entries.get(series_id) {
                return Ok(hit.clone());
            }
        }

        let endpoints = store.endpoints_for(series_id).await?;

        let mut inner = self.inner.lock().await;
        if inner.version == version {
            inner
                .entries
                .insert(series_id.to_string(), endpoints.clone());
        }
        Ok(endpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PollConfig;

    fn endpoint(id: &str) -> Endpoint {
        Endpoint {
            id: id.to_string(),
            url: format!("https://hooks.example.com/{id}"),
            mention: None,
        }
    }

    fn sample_series(id: &str) -> Series {
        Series {
            id: id.to_string(),
            source: "manganato".to_string(),
            source_id: id.to_string(),
            title: id.to_string(),
            status: Default::default(),
            last_chapter: None,
            last_chapter_label: None,
            last_checked: None,
        }
    }

    #[tokio::test]
    async fn test_cache_serves_hits_until_store_changes() {
        let store = MemoryStore::new(PollConfig::default());
        store.insert_series(sample_series("a")).await;
        store.insert_endpoint(endpoint("hook1")).await;
        store.subscribe("a", "hook1").await;

        let cache = EndpointCache::new();
        let first = cache.get(&store, "a").await.unwrap();
        assert_eq!(first.len(), 1);

        // A mutation bumps the version and must invalidate the cache.
        store.insert_endpoint(endpoint("hook2")).await;
        store.subscribe("a", "hook2").await;

        let second = cache.get(&store, "a").await.unwrap();
        assert_eq!(second.len(), 2);
    }
}
