//! Aquamanga adapter: anti-bot protected Madara site, fetched through
//! the external rendering collaborator.

use async_trait::async_trait;
use scraper::Html;

use crate::error::{AppError, Result};
use crate::fetch::FetchExecutor;
use crate::models::{Chapter, Series, SeriesMetadata};

use super::{SourceAdapter, SourceCapabilities, parse_selector};

const BASE_URL: &str = "https://aquamanga.com";

pub struct Aquamanga;

impl Aquamanga {
    fn series_url(series: &Series) -> String {
        format!("{}/read/{}/", BASE_URL, series.source_id)
    }
}

#[async_trait]
impl SourceAdapter for Aquamanga {
    fn key(&self) -> &'static str {
        "aquamanga"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities {
            paginated: false,
            needs_session: false,
            needs_render: true,
        }
    }

    async fn fetch_series_metadata(
        &self,
        fetch: &FetchExecutor,
        series: &Series,
    ) -> Result<SeriesMetadata> {
        let body = fetch
            .fetch_rendered(self.key(), &Self::series_url(series))
            .await?;
        parse_metadata(&body)
    }

    async fn fetch_chapter_list(
        &self,
        fetch: &FetchExecutor,
        series: &Series,
    ) -> Result<Vec<Chapter>> {
        let body = fetch
            .fetch_rendered(self.key(), &Self::series_url(series))
            .await?;
        parse_chapters(&body)
    }
}

fn parse_metadata(body: &str) -> Result<SeriesMetadata> {
    let document = Html::parse_document(body);
    let title_sel = parse_selector("div.post-title h1")?;
    let status_sel = parse_selector("div.post-status div.summary-content")?;

    let title = document
        .select(&title_sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .ok_or_else(|| AppError::parse("aquamanga", "missing series title", body))?;

    let completed = document
        .select(&status_sel)
        .any(|el| el.text().collect::<String>().trim().eq_ignore_ascii_case("completed"));

    Ok(SeriesMetadata { title, completed })
}

fn parse_chapters(body: &str) -> Result<Vec<Chapter>> {
    let document = Html::parse_document(body);
    let row_sel = parse_selector("li.wp-manga-chapter > a")?;

    let rows: Vec<(String, String)> = document
        .select(&row_sel)
        .filter_map(|a| {
            let href = a.value().attr("href")?.to_string();
            let label = a.text().collect::<String>().trim().to_string();
            (!label.is_empty()).then_some((label, href))
        })
        .collect();

    if rows.is_empty() && !body.contains("wp-manga-chapter") {
        return Err(AppError::parse(
            "aquamanga",
            "rendered page carries no chapter listing",
            body,
        ));
    }

    Ok(rows
        .into_iter()
        .rev()
        .enumerate()
        .map(|(i, (label, url))| Chapter::new(label, url, i))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::fetch::{Fetcher, Renderer};
    use crate::models::{FetchConfig, SeriesStatus};

    struct NeverFetch;

    #[async_trait]
    impl Fetcher for NeverFetch {
        async fn get(
            &self,
            _request: &crate::fetch::FetchRequest,
        ) -> crate::error::Result<crate::fetch::FetchResponse> {
            panic!("render-only source must not hit the plain fetcher");
        }
    }

    struct StaticRenderer {
        body: String,
    }

    #[async_trait]
    impl Renderer for StaticRenderer {
        async fn render(&self, _url: &str) -> crate::error::Result<String> {
            Ok(self.body.clone())
        }
    }

    fn series() -> Series {
        Series {
            id: "aquamanga:abc".to_string(),
            source: "aquamanga".to_string(),
            source_id: "abc".to_string(),
            title: "abc".to_string(),
            status: SeriesStatus::Ongoing,
            last_chapter: None,
            last_chapter_label: None,
            last_checked: None,
        }
    }

    #[tokio::test]
    async fn test_chapters_come_from_renderer() {
        let body = r#"
            <ul><li class="wp-manga-chapter"><a href="https://aquamanga.com/read/abc/ch-2/">Chapter 2</a></li>
            <li class="wp-manga-chapter"><a href="https://aquamanga.com/read/abc/ch-1/">Chapter 1</a></li></ul>"#;
        let executor = FetchExecutor::new(
            Arc::new(NeverFetch),
            Some(Arc::new(StaticRenderer {
                body: body.to_string(),
            })),
            FetchConfig::default(),
        );

        let chapters = Aquamanga
            .fetch_chapter_list(&executor, &series())
            .await
            .unwrap();

        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].label, "Chapter 1");
    }

    #[tokio::test]
    async fn test_unconfigured_renderer_is_unavailable() {
        let executor =
            FetchExecutor::new(Arc::new(NeverFetch), None, FetchConfig::default());

        let err = Aquamanga
            .fetch_chapter_list(&executor, &series())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::SourceUnavailable { .. }));
    }
}
