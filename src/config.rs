// src/config.rs

//! Configuration loading utilities.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::Config;

/// Load and validate configuration from a TOML file.
///
/// A missing or unreadable file falls back to defaults with a warning;
/// an invalid configuration is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load_or_default(path);
    config
        .validate()
        .map_err(|e| AppError::config(format!("invalid configuration: {e}")))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load_config(Path::new("/definitely/not/here.toml")).unwrap();
        assert_eq!(config.dispatch.max_concurrent_deliveries, 5);
    }

    #[test]
    fn test_loads_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[poll]\ndefault_interval_secs = 900\n\n[fetch]\nmax_pagination_pages = 4"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.poll.default_interval_secs, 900);
        assert_eq!(config.fetch.max_pagination_pages, 4);
    }
}
