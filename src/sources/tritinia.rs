//! Tritinia Scans adapter: Madara CMS, chapter list served from the
//! `ajax/chapters` endpoint in one response.

use async_trait::async_trait;
use scraper::Html;

use crate::error::{AppError, Result};
use crate::fetch::{FetchExecutor, FetchRequest};
use crate::models::{Chapter, Series, SeriesMetadata};

use super::{SourceAdapter, parse_selector, status_error};

const BASE_URL: &str = "https://tritinia.org";

pub struct Tritinia;

impl Tritinia {
    fn series_url(series: &Series) -> String {
        format!("{}/manga/{}/", BASE_URL, series.source_id)
    }

    fn chapters_url(series: &Series) -> String {
        format!("{}ajax/chapters/", Self::series_url(series))
    }
}

#[async_trait]
impl SourceAdapter for Tritinia {
    fn key(&self) -> &'static str {
        "tritinia"
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
            .fetch(FetchRequest::new(self.key(), Self::chapters_url(series)))
            .await?;
        if !response.is_success() {
            return Err(status_error(self.key(), series, response.status));
        }
        parse_chapters(&response.body)
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
        .ok_or_else(|| AppError::parse("tritinia", "missing series title", body))?;

    let completed = document
        .select(&status_sel)
        .any(|el| el.text().collect::<String>().trim().eq_ignore_ascii_case("completed"));

    Ok(SeriesMetadata { title, completed })
}

fn parse_chapters(body: &str) -> Result<Vec<Chapter>> {
    let document = Html::parse_fragment(body);
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
            "tritinia",
            "chapter rows missing from ajax response",
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

    const AJAX_RESPONSE: &str = r#"
        <ul class="main">
          <li class="wp-manga-chapter"><a href="https://tritinia.org/manga/abc/ch-12-5/">Ch. 12.5</a></li>
          <li class="wp-manga-chapter"><a href="https://tritinia.org/manga/abc/ch-12/">Ch. 12</a></li>
          <li class="wp-manga-chapter"><a href="https://tritinia.org/manga/abc/ch-11/">Ch. 11</a></li>
        </ul>"#;

    #[test]
    fn test_parse_ajax_chapters() {
        let chapters = parse_chapters(AJAX_RESPONSE).unwrap();
        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].label, "Ch. 11");
        assert_eq!(chapters[2].label, "Ch. 12.5");
        assert!(chapters[1].key < chapters[2].key);
    }

    #[test]
    fn test_unexpected_markup_is_parse_error() {
        let err = parse_chapters("<div>cloudflare interstitial</div>").unwrap_err();
        assert!(matches!(err, AppError::Parse { .. }));
    }
}
