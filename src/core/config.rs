//! Engine configuration.
//!
//! Configuration can be built in code with the `with_*` builder methods,
//! parsed from TOML, and overridden from the environment:
//!
//! ```toml
//! threads = 8
//! preview_priority = 20
//! export_priority = 10
//! tile_width = 512
//! tile_height = 512
//! backward_margin = 1
//! ```

use crate::core::error::ConfigError;
use crate::threading::priority::Priority;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable overriding the worker thread count.
pub const ENV_THREADS: &str = "RAWFLOW_THREADS";

/// Environment variable overriding the tile size (`512` or `512x256`).
pub const ENV_TILE_SIZE: &str = "RAWFLOW_TILE_SIZE";

/// Minimum tile size in pixels
pub const MIN_TILE_SIZE: u32 = 16;

/// Maximum tile size in pixels
pub const MAX_TILE_SIZE: u32 = 8192;

/// Configuration for episodes and tile negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of worker threads per episode (0 = auto).
    pub threads: usize,
    /// Priority of interactive preview episodes.
    pub preview_priority: Priority,
    /// Priority of full-resolution export episodes.
    pub export_priority: Priority,
    /// Preferred output tile width.
    pub tile_width: u32,
    /// Preferred output tile height.
    pub tile_height: u32,
    /// Margin, in output pixels, added around tiles before backward mapping.
    pub backward_margin: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            preview_priority: Priority::PREVIEW,
            export_priority: Priority::EXPORT,
            tile_width: 512,
            tile_height: 512,
            backward_margin: 1,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the tile size.
    pub fn with_tile_size(mut self, width: u32, height: u32) -> Self {
        self.tile_width = width.clamp(MIN_TILE_SIZE, MAX_TILE_SIZE);
        self.tile_height = height.clamp(MIN_TILE_SIZE, MAX_TILE_SIZE);
        self
    }

    /// Set the preview and export priorities.
    pub fn with_priorities(mut self, preview: Priority, export: Priority) -> Self {
        self.preview_priority = preview;
        self.export_priority = export;
        self
    }

    /// Set the backward margin in output pixels.
    pub fn with_backward_margin(mut self, margin: u32) -> Self {
        self.backward_margin = margin;
        self
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.display().to_string(),
            error,
        })?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_THREADS) {
            self.threads = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: ENV_THREADS.to_string(),
                reason: format!("'{}' is not a thread count", value),
            })?;
        }
        if let Some(value) = lookup(ENV_TILE_SIZE) {
            let (w, h) = parse_tile_size(&value).ok_or_else(|| ConfigError::InvalidValue {
                field: ENV_TILE_SIZE.to_string(),
                reason: format!("'{}' is not WxH or N", value),
            })?;
            self = self.with_tile_size(w, h);
        }
        self.validate()?;
        Ok(self)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("tile_width", self.tile_width), ("tile_height", self.tile_height)] {
            if !(MIN_TILE_SIZE..=MAX_TILE_SIZE).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: format!("{} outside {}..={}", value, MIN_TILE_SIZE, MAX_TILE_SIZE),
                });
            }
        }
        if self.preview_priority < self.export_priority {
            return Err(ConfigError::InvalidValue {
                field: "preview_priority".to_string(),
                reason: "preview must not rank below export".to_string(),
            });
        }
        Ok(())
    }

    /// Effective worker count: the configured value, or the detected core count.
    pub fn effective_threads(&self) -> usize {
        resolve_threads(self.threads)
    }
}

/// Resolve a requested thread count, where 0 means the detected core count.
pub fn resolve_threads(requested: usize) -> usize {
    if requested > 0 {
        return requested;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn parse_tile_size(value: &str) -> Option<(u32, u32)> {
    let value = value.trim();
    match value.split_once(['x', 'X']) {
        Some((w, h)) => Some((w.trim().parse().ok()?, h.trim().parse().ok()?)),
        None => {
            let n = value.parse().ok()?;
            Some((n, n))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_threads(4)
            .with_tile_size(256, 128)
            .with_backward_margin(2);
        assert_eq!(config.threads, 4);
        assert_eq!(config.tile_width, 256);
        assert_eq!(config.tile_height, 128);
        assert_eq!(config.backward_margin, 2);
        assert_eq!(config.effective_threads(), 4);
    }

    #[test]
    fn test_tile_size_is_clamped() {
        let config = EngineConfig::new().with_tile_size(1, 100_000);
        assert_eq!(config.tile_width, MIN_TILE_SIZE);
        assert_eq!(config.tile_height, MAX_TILE_SIZE);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = EngineConfig::from_toml_str("threads = 3\ntile_width = 256\n").unwrap();
        assert_eq!(config.threads, 3);
        assert_eq!(config.tile_width, 256);
        assert_eq!(config.tile_height, 512);
        assert_eq!(config.preview_priority, Priority::PREVIEW);
    }

    #[test]
    fn test_from_toml_rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_toml_str("tile_width = 2"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("threads = \"many\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(EngineConfig::from_toml_str("preview_priority = 1\nexport_priority = 5").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "threads = 2\nbackward_margin = 3").unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.threads, 2);
        assert_eq!(config.backward_margin, 3);

        let missing = EngineConfig::from_file("/nonexistent/rawflow.toml");
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> =
            [(ENV_THREADS, "6"), (ENV_TILE_SIZE, "128x64")].into_iter().collect();
        let config = EngineConfig::new()
            .with_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.threads, 6);
        assert_eq!((config.tile_width, config.tile_height), (128, 64));

        let bad = EngineConfig::new().with_overrides(|k| {
            (k == ENV_THREADS).then(|| "lots".to_string())
        });
        assert!(bad.is_err());
    }

    #[test]
    fn test_resolve_threads() {
        assert_eq!(resolve_threads(3), 3);
        assert!(resolve_threads(0) >= 1);
    }
}
