//! Chapter data structures and the chapter ordering key.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Totally ordered key for a chapter within a series.
///
/// Stored in milli-ordinal units so decimal labels ("Chapter 12.5") stay
/// comparable with whole ordinals without floating point in the state.
/// Labels that carry no number fall back to the chapter's list position.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ChapterKey(i64);

impl ChapterKey {
    const MILLI: f64 = 1000.0;

    /// Build a key from a chapter label, falling back to the ascending
    /// list position when the label carries no parsable number.
    pub fn from_label(label: &str, position: usize) -> Self {
        match parse_chapter_number(label) {
            Some(number) => Self::from_number(number),
            None => Self::from_position(position),
        }
    }

    /// Build a key from a numeric chapter ordinal.
    pub fn from_number(number: f64) -> Self {
        Self((number * Self::MILLI).round() as i64)
    }

    /// Build a key from a zero-based ascending list position.
    pub fn from_position(position: usize) -> Self {
        Self::from_number((position + 1) as f64)
    }

    /// Raw milli-ordinal value.
    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ChapterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 1000 == 0 {
            write!(f, "{}", self.0 / 1000)
        } else {
            write!(f, "{}", self.0 as f64 / Self::MILLI)
        }
    }
}

/// Extract the first decimal number from a chapter label.
///
/// "Chapter 12.5", "Ch.103 - The End", "103" all parse; "Side Story" does not.
pub fn parse_chapter_number(label: &str) -> Option<f64> {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let re = NUMBER.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("valid regex"));
    re.captures(label)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// One publishable unit within a series, immutable once observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// Source-reported label ("Chapter 12.5", "Ch. 7 - Side Story")
    pub label: String,

    /// Full URL to the chapter
    pub url: String,

    /// Ordering key derived from the label, or the list position
    pub key: ChapterKey,

    /// Publish timestamp, when the source exposes one
    pub published: Option<DateTime<Utc>>,
}

impl Chapter {
    /// Create a chapter from its label, URL and ascending list position.
    pub fn new(label: impl Into<String>, url: impl Into<String>, position: usize) -> Self {
        let label = label.into();
        let key = ChapterKey::from_label(&label, position);
        Self {
            label,
            url: url.into(),
            key,
            published: None,
        }
    }

    /// Attach a publish timestamp.
    pub fn with_published(mut self, published: DateTime<Utc>) -> Self {
        self.published = Some(published);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chapter_number() {
        assert_eq!(parse_chapter_number("Chapter 103"), Some(103.0));
        assert_eq!(parse_chapter_number("Ch. 12.5 - Aftermath"), Some(12.5));
        assert_eq!(parse_chapter_number("45"), Some(45.0));
        assert_eq!(parse_chapter_number("Side Story"), None);
        assert_eq!(parse_chapter_number(""), None);
    }

    #[test]
    fn test_key_ordering() {
        let a = ChapterKey::from_label("Chapter 12", 0);
        let b = ChapterKey::from_label("Chapter 12.5", 1);
        let c = ChapterKey::from_label("Chapter 13", 2);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_key_position_fallback() {
        let first = ChapterKey::from_label("Prologue", 0);
        let second = ChapterKey::from_label("Epilogue", 1);
        assert!(first < second);
        assert_eq!(first, ChapterKey::from_number(1.0));
    }

    #[test]
    fn test_key_display() {
        assert_eq!(ChapterKey::from_number(103.0).to_string(), "103");
        assert_eq!(ChapterKey::from_number(12.5).to_string(), "12.5");
    }

    #[test]
    fn test_chapter_new_derives_key() {
        let chapter = Chapter::new("Chapter 7", "https://example.com/ch/7", 6);
        assert_eq!(chapter.key, ChapterKey::from_number(7.0));
        assert!(chapter.published.is_none());
    }
}
