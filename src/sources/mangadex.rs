//! MangaDex adapter: JSON API with offset/limit pagination.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::fetch::{FetchExecutor, FetchRequest};
use crate::models::{Chapter, Series, SeriesMetadata};

use super::{SourceAdapter, SourceCapabilities, status_error};

const API_URL: &str = "https://api.mangadex.org";
const PAGE_SIZE: usize = 100;

pub struct MangaDex;

impl MangaDex {
    fn feed_url(series: &Series, offset: usize) -> String {
        format!(
            "{}/manga/{}/feed?translatedLanguage[]=en&order[chapter]=asc&limit={}&offset={}",
            API_URL, series.source_id, PAGE_SIZE, offset
        )
    }

    fn manga_url(series: &Series) -> String {
        format!("{}/manga/{}", API_URL, series.source_id)
    }
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    data: Vec<FeedItem>,
    total: usize,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    id: String,
    attributes: FeedAttributes,
}

#[derive(Debug, Deserialize)]
struct FeedAttributes {
    chapter: Option<String>,
    title: Option<String>,
    #[serde(rename = "publishAt")]
    publish_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct MangaResponse {
    data: MangaData,
}

#[derive(Debug, Deserialize)]
struct MangaData {
    attributes: MangaAttributes,
}

#[derive(Debug, Deserialize)]
struct MangaAttributes {
    title: std::collections::HashMap<String, String>,
    status: Option<String>,
}

impl FeedItem {
    fn into_chapter(self, position: usize) -> Chapter {
        let label = match (&self.attributes.chapter, &self.attributes.title) {
            (Some(number), _) => format!("Chapter {number}"),
            (None, Some(title)) if !title.is_empty() => title.clone(),
            _ => "Oneshot".to_string(),
        };
        let url = format!("https://mangadex.org/chapter/{}", self.id);
        let chapter = Chapter::new(label, url, position);
        match self.attributes.publish_at {
            Some(published) => chapter.with_published(published),
            None => chapter,
        }
    }
}

#[async_trait]
impl SourceAdapter for MangaDex {
    fn key(&self) -> &'static str {
        "mangadex"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities {
            paginated: true,
            needs_session: false,
            needs_render: false,
        }
    }

    async fn fetch_series_metadata(
        &self,
        fetch: &FetchExecutor,
        series: &Series,
    ) -> Result<SeriesMetadata> {
        let response = fetch
            .fetch(FetchRequest::new(self.key(), Self::manga_url(series)))
            .await?;
        if !response.is_success() {
            return Err(status_error(self.key(), series, response.status));
        }

        let parsed: MangaResponse = serde_json::from_str(&response.body)
            .map_err(|e| AppError::parse(self.key(), e, &response.body))?;

        let title = parsed
            .data
            .attributes
            .title
            .get("en")
            .or_else(|| parsed.data.attributes.title.values().next())
            .cloned()
            .unwrap_or_else(|| series.title.clone());

        Ok(SeriesMetadata {
            title,
            completed: parsed.data.attributes.status.as_deref() == Some("completed"),
        })
    }

    async fn fetch_chapter_list(
        &self,
        fetch: &FetchExecutor,
        series: &Series,
    ) -> Result<Vec<Chapter>> {
        let mut chapters = Vec::new();
        let mut offset = 0;

        for _page in 0..fetch.max_pages() {
            let response = fetch
                .fetch(FetchRequest::new(self.key(), Self::feed_url(series, offset)))
                .await?;
            if !response.is_success() {
                return Err(status_error(self.key(), series, response.status));
            }

            let parsed: FeedResponse = serde_json::from_str(&response.body)
                .map_err(|e| AppError::parse(self.key(), e, &response.body))?;

            let batch = parsed.data.len();
            for item in parsed.data {
                let position = chapters.len();
                chapters.push(item.into_chapter(position));
            }

            offset += batch;
            if batch < PAGE_SIZE || offset >= parsed.total {
                break;
            }
        }

        Ok(chapters)
    }
}
