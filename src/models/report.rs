//! Per-cycle observability report.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Summary of one full scheduler pass over all due series.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Series that were due and attempted this cycle
    pub series_checked: usize,

    /// Update events produced (one per series with new chapters)
    pub events: usize,

    /// New chapters across all events
    pub new_chapters: usize,

    /// Transient failures per source key
    pub failures: HashMap<String, usize>,

    /// Series the source affirmatively reported as removed. Surfaced for
    /// the external subscription manager, never silently dropped.
    pub removed_series: Vec<String>,

    pub deliveries_ok: usize,
    pub deliveries_failed: usize,
}

impl CycleReport {
    pub fn record_failure(&mut self, source: &str) {
        *self.failures.entry(source.to_string()).or_default() += 1;
    }

    pub fn failure_count(&self) -> usize {
        self.failures.values().sum()
    }

    /// Wall-clock duration of the cycle, if both timestamps are set.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_tally() {
        let mut report = CycleReport::default();
        report.record_failure("manganato");
        report.record_failure("manganato");
        report.record_failure("toonily");

        assert_eq!(report.failures["manganato"], 2);
        assert_eq!(report.failure_count(), 3);
    }
}
