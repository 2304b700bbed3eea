//! Poll scheduler.
//!
//! One cycle collects the due series, groups them by source (sessions
//! and per-source caps are shared within a group), and runs fetch +
//! detect + commit + dispatch for every series with bounded concurrency.
//! Source groups run concurrently so one slow source cannot starve the
//! others; one failing series never aborts its batch or the cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::error::{AppError, Result};
use crate::fetch::FetchExecutor;
use crate::models::{Config, CycleReport, Series};
use crate::sources::{SourceAdapter, SourceRegistry};
use crate::storage::{EndpointCache, SeriesStore};

use super::detect::ChangeDetector;
use super::dispatch::NotificationDispatcher;

/// Per-series outcome within one cycle.
enum SeriesOutcome {
    NoChange,
    Updated {
        chapters: usize,
        delivered: usize,
        failed: usize,
    },
    Removed {
        series_id: String,
    },
    Failed,
}

/// Orchestrates periodic polling across all tracked series.
pub struct PollScheduler {
    store: Arc<dyn SeriesStore>,
    registry: Arc<SourceRegistry>,
    fetch: Arc<FetchExecutor>,
    detector: ChangeDetector,
    dispatcher: NotificationDispatcher,
    endpoints: EndpointCache,
    config: Arc<Config>,
    /// Consecutive parse failures per source, for operator escalation
    parse_failures: Mutex<HashMap<String, u32>>,
}

impl PollScheduler {
    pub fn new(
        store: Arc<dyn SeriesStore>,
        registry: Arc<SourceRegistry>,
        fetch: Arc<FetchExecutor>,
        dispatcher: NotificationDispatcher,
        config: Arc<Config>,
    ) -> Self {
        let detector = ChangeDetector::new(config.poll.burst_threshold);
        Self {
            store,
            registry,
            fetch,
            detector,
            dispatcher,
            endpoints: EndpointCache::new(),
            config,
            parse_failures: Mutex::new(HashMap::new()),
        }
    }

    /// Run one full pass over all due series.
    ///
    /// Only a persistence failure on the due-series query is fatal; it
    /// aborts the cycle cleanly and the next scheduled cycle retries.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let started = Utc::now();
        log::info!("Checking for updates...");

        let due = self.store.due_series(started).await?;
        let active: Vec<Series> = due
            .into_iter()
            .filter(|s| {
                if !s.status.is_active() {
                    log::debug!("Skipping inactive series '{}'", s.id);
                }
                s.status.is_active()
            })
            .collect();

        let mut report = CycleReport {
            started_at: Some(started),
            series_checked: active.len(),
            ..CycleReport::default()
        };

        let mut groups: HashMap<String, Vec<Series>> = HashMap::new();
        for series in active {
            groups.entry(series.source.clone()).or_default().push(series);
        }

        let group_count = groups.len().max(1);
        let outcomes: Vec<(String, Vec<SeriesOutcome>)> = stream::iter(groups)
            .map(|(source, batch)| async move {
                let outcomes = self.poll_source(&source, batch).await;
                (source, outcomes)
            })
            .buffer_unordered(group_count)
            .collect()
            .await;

        for (source, source_outcomes) in outcomes {
            for outcome in source_outcomes {
                match outcome {
                    SeriesOutcome::NoChange => {}
                    SeriesOutcome::Updated {
                        chapters,
                        delivered,
                        failed,
                    } => {
                        report.events += 1;
                        report.new_chapters += chapters;
                        report.deliveries_ok += delivered;
                        report.deliveries_failed += failed;
                    }
                    SeriesOutcome::Removed { series_id } => {
                        report.removed_series.push(series_id);
                    }
                    SeriesOutcome::Failed => report.record_failure(&source),
                }
            }
        }

        report.finished_at = Some(Utc::now());
        log::info!(
            "Cycle complete: {} series checked, {} events ({} chapters), {} failures, {} deliveries ok / {} failed in {} ms",
            report.series_checked,
            report.events,
            report.new_chapters,
            report.failure_count(),
            report.deliveries_ok,
            report.deliveries_failed,
            report.duration().map(|d| d.num_milliseconds()).unwrap_or(0)
        );
        Ok(report)
    }

    /// Poll one source's batch through a bounded worker pool.
    async fn poll_source(&self, source: &str, batch: Vec<Series>) -> Vec<SeriesOutcome> {
        let Some(adapter) = self.registry.get(source) else {
            log::warn!("Unknown source '{}' for {} series", source, batch.len());
            return batch.iter().map(|_| SeriesOutcome::Failed).collect();
        };

        log::debug!("Checking {} series on '{}'", batch.len(), source);
        let cap = self.config.fetch.max_concurrent_per_source.max(1);

        stream::iter(batch)
            .map(|series| {
                let adapter = Arc::clone(&adapter);
                async move { self.poll_series(adapter.as_ref(), series).await }
            })
            .buffer_unordered(cap)
            .collect()
            .await
    }

    /// Check one series, classifying failures without letting them escape.
    async fn poll_series(&self, adapter: &dyn SourceAdapter, series: Series) -> SeriesOutcome {
        match self.check_series(adapter, &series).await {
            Ok(outcome) => {
                self.reset_parse_failures(&series.source);
                outcome
            }
            Err(AppError::SeriesNotFound { .. }) => {
                log::warn!(
                    "Source '{}' affirmatively reports '{}' removed",
                    series.source,
                    series.id
                );
                SeriesOutcome::Removed {
                    series_id: series.id,
                }
            }
            Err(e @ AppError::Parse { .. }) => {
                log::warn!("Check failed for '{}': {}", series.id, e);
                self.record_parse_failure(&series.source);
                SeriesOutcome::Failed
            }
            Err(e) if e.is_transient() => {
                log::warn!("Check failed for '{}': {}", series.id, e);
                SeriesOutcome::Failed
            }
            Err(e) => {
                log::error!("Check failed for '{}': {}", series.id, e);
                SeriesOutcome::Failed
            }
        }
    }

    /// Fetch, detect, commit, then dispatch. Commit happens before the
    /// event leaves for the dispatcher, so a concurrent later cycle can
    /// never re-detect the same chapters.
    async fn check_series(
        &self,
        adapter: &dyn SourceAdapter,
        series: &Series,
    ) -> Result<SeriesOutcome> {
        let fresh = adapter.fetch_chapter_list(&self.fetch, series).await?;
        let detection = self.detector.detect(series, &fresh)?;

        let now = Utc::now();
        match &detection.advance_to {
            Some((key, label)) => {
                self.store
                    .update_last_known(&series.id, *key, label, now)
                    .await?;
            }
            None => self.store.mark_checked(&series.id, now).await?,
        }

        let Some(event) = detection.event else {
            return Ok(SeriesOutcome::NoChange);
        };

        for chapter in &event.chapters {
            log::info!(
                "({}) {} ====> {} released!",
                event.source,
                event.series_title,
                chapter.label
            );
        }

        let endpoints = self
            .endpoints
            .get(self.store.as_ref(), &event.series_id)
            .await?;
        let results = self.dispatcher.dispatch(&event, &endpoints).await;
        let delivered = results.iter().filter(|r| r.is_delivered()).count();

        Ok(SeriesOutcome::Updated {
            chapters: event.chapters.len(),
            delivered,
            failed: results.len() - delivered,
        })
    }

    fn record_parse_failure(&self, source: &str) {
        let mut failures = self.parse_failures.lock().expect("counter map poisoned");
        let count = failures.entry(source.to_string()).or_insert(0);
        *count += 1;
        if *count >= self.config.poll.parse_failure_escalation {
            log::error!(
                "Source '{}' failed to parse {} times in a row; its markup may have changed",
                source,
                count
            );
        }
    }

    fn reset_parse_failures(&self, source: &str) {
        self.parse_failures
            .lock()
            .expect("counter map poisoned")
            .remove(source);
    }
}
