// src/models/mod.rs

//! Domain models for the update pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod chapter;
mod config;
mod endpoint;
mod event;
mod report;
mod series;

// Re-export all public types
pub use chapter::{Chapter, ChapterKey, parse_chapter_number};
pub use config::{Config, DispatchConfig, FetchConfig, LoggingConfig, PollConfig, StorageConfig};
pub use endpoint::{DeliveryOutcome, DeliveryResult, Endpoint};
pub use event::UpdateEvent;
pub use report::CycleReport;
pub use series::{Series, SeriesMetadata, SeriesStatus};
