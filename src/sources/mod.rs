// src/sources/mod.rs

//! Source adapters.
//!
//! One implementation per external site, each normalizing site-specific
//! fetch and parsing into the uniform series/chapter contract. Adapters
//! are selected through [`SourceRegistry`]; adding a source means
//! implementing [`SourceAdapter`], never touching the scheduler.

mod aquamanga;
mod mangadex;
mod manganato;
mod toonily;
mod tritinia;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use scraper::Selector;

use crate::error::{AppError, Result};
use crate::fetch::FetchExecutor;
use crate::models::{Chapter, Series, SeriesMetadata};

pub use aquamanga::Aquamanga;
pub use mangadex::MangaDex;
pub use manganato::Manganato;
pub use toonily::Toonily;
pub use tritinia::Tritinia;

/// Capability set of a source, fixed at registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceCapabilities {
    /// Chapter listings span multiple physical pages
    pub paginated: bool,
    /// Requests need a pre-fetch session/cookie handshake
    pub needs_session: bool,
    /// Listings only load through the external rendering collaborator
    pub needs_render: bool,
}

/// Uniform contract every concrete source implements.
///
/// `fetch_chapter_list` returns the complete list in ascending key order,
/// regardless of how many physical pages the source splits it across.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Unique source key, also used for per-source rate limiting.
    fn key(&self) -> &'static str;

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::default()
    }

    async fn fetch_series_metadata(
        &self,
        fetch: &FetchExecutor,
        series: &Series,
    ) -> Result<SeriesMetadata>;

    async fn fetch_chapter_list(
        &self,
        fetch: &FetchExecutor,
        series: &Series,
    ) -> Result<Vec<Chapter>>;
}

/// Registry of all known sources, keyed on source key.
#[derive(Default)]
pub struct SourceRegistry {
    adapters: HashMap<&'static str, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in source.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Manganato));
        registry.register(Arc::new(Tritinia));
        registry.register(Arc::new(Toonily::new()));
        registry.register(Arc::new(MangaDex));
        registry.register(Arc::new(Aquamanga));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.key(), adapter);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys: Vec<_> = self.adapters.keys().copied().collect();
        keys.sort_unstable();
        keys
    }
}

pub(crate) fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::validation(format!("invalid selector '{s}': {e:?}")))
}

/// Map a terminal HTTP status to the adapter-level error taxonomy.
///
/// 404/410 are affirmative removal signals; everything else non-2xx is a
/// transient source failure (anti-bot challenges commonly 403).
pub(crate) fn status_error(source: &str, series: &Series, status: u16) -> AppError {
    match status {
        404 | 410 => AppError::not_found(source, &series.id),
        _ => AppError::unavailable(source, format!("status {status} for {}", series.source_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_defaults() {
        let registry = SourceRegistry::with_defaults();
        assert_eq!(
            registry.keys(),
            vec!["aquamanga", "mangadex", "manganato", "toonily", "tritinia"]
        );
        assert!(registry.get("manganato").is_some());
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn test_capabilities() {
        let registry = SourceRegistry::with_defaults();
        assert!(registry.get("toonily").unwrap().capabilities().needs_session);
        assert!(registry.get("toonily").unwrap().capabilities().paginated);
        assert!(registry.get("aquamanga").unwrap().capabilities().needs_render);
        assert!(!registry.get("manganato").unwrap().capabilities().paginated);
    }

    #[test]
    fn test_parse_selector() {
        assert!(parse_selector("div.chapter a").is_ok());
        assert!(parse_selector("[[invalid").is_err());
    }
}
