//! Configuration management for rawbuf

use crate::crc::Kernel;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable that overrides `log_filter`
pub const LOG_ENV: &str = "RAWBUF_LOG";

/// Process-wide settings, read once when the context is built
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Track per-type allocations in every pool
    pub debug_mode: bool,

    /// Force a CRC32C kernel instead of the fastest supported one
    pub crc_kernel: Option<Kernel>,

    /// `tracing` filter directive, e.g. `"rawbuf=debug"`
    pub log_filter: Option<String>,
}

impl Config {
    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::io("reading config", e))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        Ok(config)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io("creating config dir", e))?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("serializing config: {}", e)))?;
        std::fs::write(path, contents).map_err(|e| Error::io("writing config", e))?;
        Ok(())
    }

    /// The filter to log with: `RAWBUF_LOG` wins over the file setting
    pub fn effective_log_filter(&self) -> Option<String> {
        std::env::var(LOG_ENV).ok().or_else(|| self.log_filter.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.debug_mode);
        assert_eq!(config.crc_kernel, None);
        assert_eq!(config.log_filter, None);
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml_str("debug_mode = true\ncrc_kernel = \"sse42\"").unwrap();
        assert!(config.debug_mode);
        assert_eq!(config.crc_kernel, Some(Kernel::Sse42));
        assert_eq!(config.log_filter, None);
    }

    #[test]
    fn test_unknown_kernel_rejected() {
        let result = Config::from_toml_str("crc_kernel = \"quantum\"");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rawbuf.toml");
        let config = Config {
            debug_mode: true,
            crc_kernel: Some(Kernel::Portable),
            log_filter: Some("rawbuf=trace".to_string()),
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }
}
