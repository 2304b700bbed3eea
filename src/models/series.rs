//! Tracked series data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ChapterKey;

/// Completion status of a tracked series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SeriesStatus {
    #[default]
    Ongoing,
    Completed,
    Dropped,
}

impl SeriesStatus {
    /// Whether the scheduler should still poll this series.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Ongoing)
    }
}

/// A tracked work on one source.
///
/// Owned by the persistence layer; the pipeline only advances the
/// `last_chapter*` and `last_checked` fields through the store contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Store-wide unique identifier
    pub id: String,

    /// Key of the source this series lives on
    pub source: String,

    /// Source-local identifier (URL slug or API id)
    pub source_id: String,

    /// Human title
    pub title: String,

    /// Completion status
    #[serde(default)]
    pub status: SeriesStatus,

    /// Ordering key of the last known chapter, None until first observation
    #[serde(default)]
    pub last_chapter: Option<ChapterKey>,

    /// Label of the last known chapter, for log and notification text
    #[serde(default)]
    pub last_chapter_label: Option<String>,

    /// When this series was last successfully checked
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
}

/// Metadata fetched from a source for one series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesMetadata {
    pub title: String,
    pub completed: bool,
}
