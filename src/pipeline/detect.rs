//! Change detection for new-chapter events.
//!
//! Compares a freshly fetched chapter list against the series' stored
//! last-known chapter key and turns the strictly newer tail into one
//! [`UpdateEvent`], exactly once.

use chrono::Utc;

use crate::error::{AppError, Result};
use crate::models::{Chapter, ChapterKey, Series, UpdateEvent};

/// Outcome of one detection pass.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    /// Key and label the series' stored state should advance to.
    /// Committed by the caller before the event is dispatched.
    pub advance_to: Option<(ChapterKey, String)>,

    /// New-chapter event, if any chapters are strictly newer.
    pub event: Option<UpdateEvent>,
}

impl Detection {
    fn none() -> Self {
        Self::default()
    }
}

/// Detector comparing fresh chapter lists against stored series state.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    /// New-chapter count above which one cycle is logged as a backlog burst
    burst_threshold: usize,
}

impl ChangeDetector {
    pub fn new(burst_threshold: usize) -> Self {
        Self { burst_threshold }
    }

    /// Detect new chapters for a series.
    ///
    /// An empty fresh list for a series that previously had chapters is a
    /// soft failure (the source is glitching, the series is not gone);
    /// stored state must not regress. A series observed for the first
    /// time baselines silently: state advances, no event is emitted.
    pub fn detect(&self, series: &Series, fresh: &[Chapter]) -> Result<Detection> {
        if fresh.is_empty() {
            if series.last_chapter.is_some() {
                return Err(AppError::unavailable(
                    &series.source,
                    format!("empty chapter list for previously populated '{}'", series.id),
                ));
            }
            return Ok(Detection::none());
        }

        let newest = fresh
            .iter()
            .max_by_key(|c| c.key)
            .expect("non-empty list has a maximum");

        let Some(last_known) = series.last_chapter else {
            log::debug!(
                "Baselining '{}' at {} ({})",
                series.id,
                newest.key,
                newest.label
            );
            return Ok(Detection {
                advance_to: Some((newest.key, newest.label.clone())),
                event: None,
            });
        };

        let mut new_chapters: Vec<Chapter> = fresh
            .iter()
            .filter(|c| c.key > last_known)
            .cloned()
            .collect();
        if new_chapters.is_empty() {
            return Ok(Detection::none());
        }

        new_chapters.sort_by_key(|c| c.key);
        new_chapters.dedup_by_key(|c| c.key);

        if new_chapters.len() > self.burst_threshold {
            log::warn!(
                "Backlog burst for '{}': {} new chapters in one cycle",
                series.id,
                new_chapters.len()
            );
        }

        let top = new_chapters.last().expect("non-empty after filter");
        let advance_to = Some((top.key, top.label.clone()));

        Ok(Detection {
            advance_to,
            event: Some(UpdateEvent {
                series_id: series.id.clone(),
                series_title: series.title.clone(),
                source: series.source.clone(),
                chapters: new_chapters,
                detected_at: Utc::now(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SeriesStatus;

    fn make_series(last: Option<f64>) -> Series {
        Series {
            id: "manganato:overgeared".to_string(),
            source: "manganato".to_string(),
            source_id: "overgeared".to_string(),
            title: "Overgeared".to_string(),
            status: SeriesStatus::Ongoing,
            last_chapter: last.map(ChapterKey::from_number),
            last_chapter_label: last.map(|n| format!("Chapter {n}")),
            last_checked: None,
        }
    }

    fn make_chapters(numbers: &[f64]) -> Vec<Chapter> {
        numbers
            .iter()
            .enumerate()
            .map(|(i, n)| {
                Chapter::new(
                    format!("Chapter {n}"),
                    format!("https://example.com/ch/{n}"),
                    i,
                )
            })
            .collect()
    }

    fn detector() -> ChangeDetector {
        ChangeDetector::new(20)
    }

    /// Simulate the scheduler's commit step.
    fn commit(series: &mut Series, detection: &Detection) {
        if let Some((key, label)) = &detection.advance_to {
            series.last_chapter = Some(*key);
            series.last_chapter_label = Some(label.clone());
        }
    }

    #[test]
    fn test_growth_yields_exactly_the_new_tail() {
        let series = make_series(Some(3.0));
        let detection = detector()
            .detect(&series, &make_chapters(&[1.0, 2.0, 3.0, 4.0, 5.0]))
            .unwrap();

        let event = detection.event.unwrap();
        let labels: Vec<_> = event.chapters.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["Chapter 4", "Chapter 5"]);
        assert_eq!(
            detection.advance_to,
            Some((ChapterKey::from_number(5.0), "Chapter 5".to_string()))
        );
    }

    #[test]
    fn test_detect_is_idempotent_after_commit() {
        let mut series = make_series(Some(3.0));
        let fresh = make_chapters(&[1.0, 2.0, 3.0, 4.0, 5.0]);

        let first = detector().detect(&series, &fresh).unwrap();
        assert!(first.event.is_some());
        commit(&mut series, &first);

        let second = detector().detect(&series, &fresh).unwrap();
        assert!(second.event.is_none());
        assert!(second.advance_to.is_none());
    }

    #[test]
    fn test_last_known_key_never_decreases() {
        let mut series = make_series(None);
        let lists: Vec<Vec<Chapter>> = vec![
            make_chapters(&[1.0, 2.0, 3.0]),
            make_chapters(&[1.0, 2.0]),
            make_chapters(&[1.0, 2.0, 3.0, 4.0]),
        ];

        let mut highest = ChapterKey::from_number(0.0);
        for fresh in &lists {
            let detection = detector().detect(&series, fresh).unwrap();
            commit(&mut series, &detection);
            let current = series.last_chapter.unwrap();
            assert!(current >= highest);
            highest = current;
        }
        assert_eq!(highest, ChapterKey::from_number(4.0));
    }

    #[test]
    fn test_first_observation_baselines_without_event() {
        let series = make_series(None);
        let detection = detector()
            .detect(&series, &make_chapters(&[1.0, 2.0, 3.0]))
            .unwrap();

        assert!(detection.event.is_none());
        assert_eq!(
            detection.advance_to,
            Some((ChapterKey::from_number(3.0), "Chapter 3".to_string()))
        );
    }

    #[test]
    fn test_empty_list_after_history_is_soft_failure() {
        let series = make_series(Some(3.0));
        let err = detector().detect(&series, &[]).unwrap_err();

        assert!(matches!(err, AppError::SourceUnavailable { .. }));
    }

    #[test]
    fn test_empty_list_without_history_is_quiet() {
        let series = make_series(None);
        let detection = detector().detect(&series, &[]).unwrap();

        assert!(detection.event.is_none());
        assert!(detection.advance_to.is_none());
    }

    #[test]
    fn test_burst_still_reports_everything_ascending() {
        let series = make_series(Some(0.0));
        let numbers: Vec<f64> = (1..=50).map(|n| n as f64).collect();
        let detection = ChangeDetector::new(10)
            .detect(&series, &make_chapters(&numbers))
            .unwrap();

        let event = detection.event.unwrap();
        assert_eq!(event.chapters.len(), 50);
        assert!(
            event
                .chapters
                .windows(2)
                .all(|pair| pair[0].key < pair[1].key)
        );
    }

    #[test]
    fn test_duplicate_keys_reported_once() {
        let series = make_series(Some(3.0));
        let mut fresh = make_chapters(&[1.0, 2.0, 3.0, 4.0]);
        fresh.push(Chapter::new("Chapter 4", "https://example.com/ch/4-dup", 4));

        let detection = detector().detect(&series, &fresh).unwrap();
        assert_eq!(detection.event.unwrap().chapters.len(), 1);
    }
}
