//! Update events produced by the change detector.

use chrono::{DateTime, Utc};

use super::Chapter;

/// The set of newly detected chapters for one series in one cycle.
///
/// Ephemeral: created by the change detector, consumed once by the
/// dispatcher, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateEvent {
    pub series_id: String,
    pub series_title: String,
    pub source: String,

    /// Newly detected chapters, ascending by key
    pub chapters: Vec<Chapter>,

    pub detected_at: DateTime<Utc>,
}

impl UpdateEvent {
    /// Format one chapter announcement using a template.
    ///
    /// Supported placeholders: `{title}`, `{chapter}`, `{url}`
    pub fn format_chapter(&self, template: &str, chapter: &Chapter) -> String {
        template
            .replace("{title}", &self.series_title)
            .replace("{chapter}", &chapter.label)
            .replace("{url}", &chapter.url)
    }
}
