//! Toonily adapter: Madara CMS behind a cookie gate, chapter list
//! paginated over `?page=N`.
//!
//! The site refuses listing requests without the mature-content cookie
//! plus a valid session cookie, so every fetch goes through a lazily
//! refreshed handshake; a blocked-class response invalidates the session
//! and retries once with a fresh one.

use async_trait::async_trait;
use scraper::Html;

use crate::error::{AppError, Result};
use crate::fetch::{FetchExecutor, FetchRequest, FetchResponse, SessionCache};
use crate::models::{Chapter, Series, SeriesMetadata};

use super::{SourceAdapter, SourceCapabilities, parse_selector, status_error};

const BASE_URL: &str = "https://toonily.com";

#[derive(Default)]
pub struct Toonily {
    session: SessionCache,
}

impl Toonily {
    pub fn new() -> Self {
        Self::default()
    }

    fn series_url(series: &Series) -> String {
        format!("{}/webtoon/{}/", BASE_URL, series.source_id)
    }

    fn page_url(series: &Series, page: usize) -> String {
        if page == 1 {
            Self::series_url(series)
        } else {
            format!("{}?page={}", Self::series_url(series), page)
        }
    }

    /// Hit the landing page and assemble the cookie header value.
    async fn handshake(&self, fetch: &FetchExecutor) -> Result<String> {
        let response = fetch.fetch(FetchRequest::new("toonily", BASE_URL)).await?;
        let session_cookie = response
            .header("set-cookie")
            .and_then(|c| c.split(';').next())
            .map(str::to_string);

        Ok(match session_cookie {
            Some(cookie) => format!("{cookie}; toonily-mature=1"),
            None => "toonily-mature=1".to_string(),
        })
    }

    /// Fetch one URL with the session cookie, refreshing the session once
    /// on a blocked-class response.
    async fn fetch_with_session(&self, fetch: &FetchExecutor, url: &str) -> Result<FetchResponse> {
        let ttl = fetch.session_ttl();
        for refreshed in [false, true] {
            let cookie = self
                .session
                .cookie("toonily", ttl, || self.handshake(fetch))
                .await?;
            let response = fetch
                .fetch(FetchRequest::new("toonily", url).with_header("cookie", cookie))
                .await?;

            if response.is_blocked() && !refreshed {
                log::debug!("toonily session rejected for {url}, refreshing");
                self.session.invalidate("toonily").await;
                continue;
            }
            return Ok(response);
        }
        unreachable!("second pass always returns")
    }
}

#[async_trait]
impl SourceAdapter for Toonily {
    fn key(&self) -> &'static str {
        "toonily"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities {
            paginated: true,
            needs_session: true,
            needs_render: false,
        }
    }

    async fn fetch_series_metadata(
        &self,
        fetch: &FetchExecutor,
        series: &Series,
    ) -> Result<SeriesMetadata> {
        let response = self
            .fetch_with_session(fetch, &Self::series_url(series))
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
        let mut rows: Vec<(String, String)> = Vec::new();
        let mut prev_first: Option<String> = None;

        for page in 1..=fetch.max_pages() {
            let response = self
                .fetch_with_session(fetch, &Self::page_url(series, page))
                .await?;
            if !response.is_success() {
                return Err(status_error(self.key(), series, response.status));
            }

            let page_rows = parse_chapter_rows(&response.body, page == 1)?;

            // Terminal page: no more results, or the source repeats the
            // last page for any out-of-range page number.
            if page_rows.is_empty() {
                break;
            }
            if prev_first.as_deref() == Some(page_rows[0].1.as_str()) {
                break;
            }
            prev_first = Some(page_rows[0].1.clone());
            rows.extend(page_rows);
        }

        // Pages run newest first; reverse the concatenation to ascending.
        Ok(rows
            .into_iter()
            .rev()
            .enumerate()
            .map(|(i, (label, url))| Chapter::new(label, url, i))
            .collect())
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
        .ok_or_else(|| AppError::parse("toonily", "missing series title", body))?;

    let completed = document
        .select(&status_sel)
        .any(|el| el.text().collect::<String>().trim().eq_ignore_ascii_case("completed"));

    Ok(SeriesMetadata { title, completed })
}

fn parse_chapter_rows(body: &str, first_page: bool) -> Result<Vec<(String, String)>> {
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

    if rows.is_empty() && first_page && !body.contains("wp-manga-chapter") {
        return Err(AppError::parse(
            "toonily",
            "chapter listing missing from first page",
            body,
        ));
    }
    Ok(rows)
}
