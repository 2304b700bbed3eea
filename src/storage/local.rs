//! Local filesystem store: one JSON watchlist document, written
//! atomically (temp file then rename) on every mutation.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{ChapterKey, Endpoint, PollConfig, Series};

use super::SeriesStore;

const WATCHLIST_FILE: &str = "watchlist.json";

/// On-disk document shape.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct Watchlist {
    #[serde(default)]
    version: u64,
    #[serde(default)]
    series: Vec<Series>,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
    #[serde(default)]
    subscriptions: Vec<Subscription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Subscription {
    series_id: String,
    endpoint_id: String,
}

/// JSON-file-backed series store.
pub struct LocalStore {
    path: PathBuf,
    poll: PollConfig,
    inner: Mutex<Watchlist>,
}

impl LocalStore {
    /// Open (or start empty) the watchlist under the given data directory.
    pub async fn open(data_dir: impl Into<PathBuf>, poll: PollConfig) -> Result<Self> {
        let path = data_dir.into().join(WATCHLIST_FILE);
        let watchlist = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Watchlist::default(),
            Err(e) => return Err(AppError::Io(e)),
        };

        Ok(Self {
            path,
            poll,
            inner: Mutex::new(watchlist),
        })
    }

    /// Write the document atomically: temp file, flush, rename.
    async fn persist(&self, watchlist: &Watchlist) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(watchlist)?;
        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    pub async fn insert_series(&self, series: Series) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.series.retain(|s| s.id != series.id);
        inner.series.push(series);
        inner.version += 1;
        self.persist(&inner).await
    }

    pub async fn insert_endpoint(&self, endpoint: Endpoint) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.endpoints.retain(|e| e.id != endpoint.id);
        inner.endpoints.push(endpoint);
        inner.version += 1;
        self.persist(&inner).await
    }

    pub async fn subscribe(&self, series_id: &str, endpoint_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.subscriptions.push(Subscription {
            series_id: series_id.to_string(),
            endpoint_id: endpoint_id.to_string(),
        });
        inner.version += 1;
        self.persist(&inner).await
    }

    pub async fn series_count(&self) -> usize {
        self.inner.lock().await.series.len()
    }
}

#[async_trait]
impl SeriesStore for LocalStore {
    async fn due_series(&self, now: DateTime<Utc>) -> Result<Vec<Series>> {
        let inner = self.inner.lock().await;
        let mut due: Vec<Series> = inner
            .series
            .iter()
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
            .iter_mut()
            .find(|s| s.id == series_id)
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
        self.persist(&inner).await
    }

    async fn mark_checked(&self, series_id: &str, checked_at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let series = inner
            .series
            .iter_mut()
            .find(|s| s.id == series_id)
            .ok_or_else(|| AppError::store(format!("unknown series '{series_id}'")))?;
        series.last_checked = Some(checked_at);
        inner.version += 1;
        self.persist(&inner).await
    }

    async fn endpoints_for(&self, series_id: &str) -> Result<Vec<Endpoint>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .subscriptions
            .iter()
            .filter(|sub| sub.series_id == series_id)
            .filter_map(|sub| inner.endpoints.iter().find(|e| e.id == sub.endpoint_id))
            .cloned()
            .collect())
    }

    async fn version(&self) -> Result<u64> {
        Ok(self.inner.lock().await.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::models::SeriesStatus;

    fn sample_series(id: &str) -> Series {
        Series {
            id: id.to_string(),
            source: "manganato".to_string(),
            source_id: id.to_string(),
            title: id.to_string(),
            status: SeriesStatus::Ongoing,
            last_chapter: None,
            last_chapter_label: None,
            last_checked: None,
        }
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let tmp = TempDir::new().unwrap();

        {
            let store = LocalStore::open(tmp.path(), PollConfig::default())
                .await
                .unwrap();
            store.insert_series(sample_series("a")).await.unwrap();
            store
                .update_last_known("a", ChapterKey::from_number(12.0), "Chapter 12", Utc::now())
                .await
                .unwrap();
        }

        let reopened = LocalStore::open(tmp.path(), PollConfig::default())
            .await
            .unwrap();
        assert_eq!(reopened.series_count().await, 1);

        let due = reopened.due_series(Utc::now() + chrono::Duration::days(1)).await.unwrap();
        assert_eq!(due[0].last_chapter, Some(ChapterKey::from_number(12.0)));
    }

    #[tokio::test]
    async fn test_endpoint_resolution() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open(tmp.path(), PollConfig::default())
            .await
            .unwrap();

        store.insert_series(sample_series("a")).await.unwrap();
        store
            .insert_endpoint(Endpoint {
                id: "hook1".to_string(),
                url: "https://hooks.example.com/1".to_string(),
                mention: Some("@updates".to_string()),
            })
            .await
            .unwrap();
        store.subscribe("a", "hook1").await.unwrap();

        let endpoints = store.endpoints_for("a").await.unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].mention.as_deref(), Some("@updates"));

        assert!(store.endpoints_for("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open(tmp.path(), PollConfig::default())
            .await
            .unwrap();
        assert_eq!(store.series_count().await, 0);
        assert_eq!(store.version().await.unwrap(), 0);
    }
}
