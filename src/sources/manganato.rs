//! Manganato adapter: plain HTML, full chapter list on one page.

use async_trait::async_trait;
use scraper::Html;
use url::Url;

use crate::error::{AppError, Result};
use crate::fetch::{FetchExecutor, FetchRequest};
use crate::models::{Chapter, Series, SeriesMetadata};
use crate::utils::resolve_url;

use super::{SourceAdapter, parse_selector, status_error};

const BASE_URL: &str = "https://chapmanganato.com";

pub struct Manganato;

impl Manganato {
    fn series_url(series: &Series) -> String {
        format!("{}/{}", BASE_URL, series.source_id)
    }
}

#[async_trait]
impl SourceAdapter for Manganato {
    fn key(&self) -> &'static str {
        "manganato"
    }

    async fn fetch_series_metadata(
        &self,
        fetch: &FetchExecutor,
        series: &Series,
    ) -> Result<SeriesMetadata> {
        let response = fetch
            .fetch(FetchRequest::new(self.key(), Self::series_url(series)))
            .await?;
        if !response.is_success() {
            return Err(status_error(self.key(), series, response.status));
        }
        parse_metadata(&response.body)
    }

    async fn fetch_chapter_list(
        &self,
        fetch: &FetchExecutor,
        series: &Series,
    ) -> Result<Vec<Chapter>> {
        let response = fetch
            .fetch(FetchRequest::new(self.key(), Self::series_url(series)))
            .await?;
        if !response.is_success() {
            return Err(status_error(self.key(), series, response.status));
        }
        parse_chapters(&response.body)
    }
}

fn parse_metadata(body: &str) -> Result<SeriesMetadata> {
    let document = Html::parse_document(body);
    let title_sel = parse_selector("div.story-info-right h1")?;
    let status_sel = parse_selector("td.table-value")?;

    let title = document
        .select(&title_sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .ok_or_else(|| AppError::parse("manganato", "missing series title", body))?;

    let completed = document
        .select(&status_sel)
        .any(|el| el.text().collect::<String>().trim().eq_ignore_ascii_case("completed"));

    Ok(SeriesMetadata { title, completed })
}

fn parse_chapters(body: &str) -> Result<Vec<Chapter>> {
    let document = Html::parse_document(body);
    let container_sel = parse_selector("div.panel-story-chapter-list")?;
    let link_sel = parse_selector("a.chapter-name")?;
    let base = Url::parse(BASE_URL)?;

    let container = document
        .select(&container_sel)
        .next()
        .ok_or_else(|| AppError::parse("manganato", "chapter list container missing", body))?;

    // Listed newest first; reverse to ascending before keying.
    let rows: Vec<(String, String)> = container
        .select(&link_sel)
        .filter_map(|a| {
            let href = resolve_url(&base, a.value().attr("href")?);
            let label = a.text().collect::<String>().trim().to_string();
            (!label.is_empty()).then_some((label, href))
        })
        .collect();

    Ok(rows
        .into_iter()
        .rev()
        .enumerate()
        .map(|(i, (label, url))| Chapter::new(label, url, i))
        .collect())
}
