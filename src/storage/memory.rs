//! In-memory store for tests and one-off runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{ChapterKey, Endpoint, PollConfig, Series};

use super::SeriesStore;

#[derive(Default)]
struct Inner {
    series: HashMap<String, Series>,
    endpoints: HashMap<String, Endpoint>,
    /// series id -> endpoint ids
    subscriptions: HashMap<String, Vec<String>>,
    version: u64,
}

/// In-memory series store.
pub struct MemoryStore {
    poll: PollConfig,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(poll: PollConfig) -> Self {
        Self {
            poll,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub async fn insert_series(&self, series: Series) {
        let mut inner = self.inner.lock().await;
        inner.series.insert(series.id.clone(), series);
        inner.version += 1;
    }

    pub async fn insert_endpoint(&self, endpoint: Endpoint) {
        let mut inner = self.inner.lock().await;
        inner.endpoints.insert(endpoint.id.clone(), endpoint);
        inner.version += 1;
    }

    /// Register an endpoint against a series.
    pub async fn subscribe(&self, series_id: &str, endpoint_id: &str) {
        let mut inner = self.inner.lock().await;
        inner
            .subscriptions
            .entry(series_id.to_string())
            .or_default()
            .push(endpoint_id.to_string());
        inner.version += 1;
    }

    /// Current state of a series, for assertions.
    pub async fn get_series(&self, series_id: &str) -> Option<Series> {
        self.inner.lock().await.series.get(series_id).cloned()
    }
}

#[async_trait]
impl SeriesStore for MemoryStore {
    async fn due_series(&self, now: DateTime<Utc>) -> Result<Vec<Series>> {
        let inner = self.inner.lock().await;
        let mut due: Vec<Series> = inner
            .series
            .values()
            .filter(|s| match s.last_checked {
                None => true,
                Some(checked) => {
                    let interval = self.poll.interval_for(&s.source);
                    (now - checked).to_std().map_or(false, |age| age >= interval)
                }
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(due)
    }

    async fn update_last_known(
        &self,
        series_id: &str,
        key: ChapterKey,
        label: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let series = inner
            .series
            .get_mut(series_id)
            .ok_or_else(|| AppError::store(format!("unknown series '{series_id}'")))?;

        if series.last_chapter.is_some_and(|stored| stored > key) {
            log::warn!(
                "Refusing to regress '{}' from {:?} to {}",
                series_id,
                series.last_chapter,
                key
            );
        } else {
            series.last_chapter = Some(key);
            series.last_chapter_label = Some(label.to_string());
        }
        series.last_checked = Some(checked_at);
        inner.version += 1;
        Ok(())
    }

    async fn mark_checked(&self, series_id: &str, checked_at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let series = inner
            .series
            .get_mut(series_id)
            .ok_or_else(|| AppError::store(format!("unknown series '{series_id}'")))?;
        series.last_checked = Some(checked_at);
        inner.version += 1;
        Ok(())
    }

    async fn endpoints_for(&self, series_id: &str) -> Result<Vec<Endpoint>> {
        let inner = self.inner.lock().await;
        let ids = inner.subscriptions.get(series_id);
        Ok(ids
            .into_iter()
            .flatten()
            .filter_map(|id| inner.endpoints.get(id).cloned())
            .collect())
    }

    async fn version(&self) -> Result<u64> {
        Ok(self.inner.lock().await.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::models::SeriesStatus;

    fn sample_series(id: &str, checked: Option<DateTime<Utc>>) -> Series {
        Series {
            id: id.to_string(),
            source: "manganato".to_string(),
            source_id: id.to_string(),
            title: id.to_string(),
            status: SeriesStatus::Ongoing,
            last_chapter: None,
            last_chapter_label: None,
            last_checked: checked,
        }
    }

    #[tokio::test]
    async fn test_due_filtering() {
        let poll = PollConfig {
            default_interval_secs: 3600,
            ..PollConfig::default()
        };
        let store = MemoryStore::new(poll);
        let now = Utc::now();

        store.insert_series(sample_series("never-checked", None)).await;
        store
            .insert_series(sample_series("stale", Some(now - Duration::hours(2))))
            .await;
        store
            .insert_series(sample_series("fresh", Some(now - Duration::minutes(5))))
            .await;

        let due = store.due_series(now).await.unwrap();
        let ids: Vec<_> = due.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["never-checked", "stale"]);
    }

    #[tokio::test]
    async fn test_update_never_regresses() {
        let store = MemoryStore::new(PollConfig::default());
        store.insert_series(sample_series("a", None)).await;
        let now = Utc::now();

        store
            .update_last_known("a", ChapterKey::from_number(10.0), "Chapter 10", now)
            .await
            .unwrap();
        store
            .update_last_known("a", ChapterKey::from_number(7.0), "Chapter 7", now)
            .await
            .unwrap();

        let series = store.get_series("a").await.unwrap();
        assert_eq!(series.last_chapter, Some(ChapterKey::from_number(10.0)));
        assert_eq!(series.last_chapter_label.as_deref(), Some("Chapter 10"));
    }

    #[tokio::test]
    async fn test_version_bumps_on_mutation() {
        let store = MemoryStore::new(PollConfig::default());
        let before = store.version().await.unwrap();

        store.insert_series(sample_series("a", None)).await;
        store.mark_checked("a", Utc::now()).await.unwrap();

        assert!(store.version().await.unwrap() > before);
    }

    #[tokio::test]
    async fn test_unknown_series_is_store_error() {
        let store = MemoryStore::new(PollConfig::default());
        let err = store.mark_checked("ghost", Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
    }
}
