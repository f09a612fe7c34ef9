//! Router configuration, loadable from TOML

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::formats::graph_file::LoadOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    /// Read buffer for the one-time file load
    pub cache_size_bytes: usize,
    /// Default search radius for coordinate lookups
    pub nearest_radius_m: f64,
    /// Initial slot capacity of each handle arena
    pub pool_capacity: usize,
    pub verify_checksum: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cache_size_bytes: 4 * 1024 * 1024,
            nearest_radius_m: 250.0,
            pool_capacity: 256,
            verify_checksum: true,
        }
    }
}

impl RouterConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.nearest_radius_m.is_finite() || self.nearest_radius_m < 0.0 {
            return Err(ConfigError::Invalid {
                field: "nearest_radius_m",
                reason: format!("{} is not a non-negative distance", self.nearest_radius_m),
            });
        }
        Ok(())
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            cache_size_bytes: self.cache_size_bytes,
            verify_checksum: self.verify_checksum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RouterConfig::from_toml_str("cache_size_bytes = 65536\n").unwrap();
        assert_eq!(config.cache_size_bytes, 65536);
        assert_eq!(config.nearest_radius_m, RouterConfig::default().nearest_radius_m);
        assert!(config.verify_checksum);
    }

    #[test]
    fn test_rejects_unknown_and_invalid_fields() {
        assert!(matches!(
            RouterConfig::from_toml_str("cache_size = 1\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            RouterConfig::from_toml_str("nearest_radius_m = -5.0\n"),
            Err(ConfigError::Invalid { field: "nearest_radius_m", .. })
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("router.toml");
        std::fs::write(&path, "pool_capacity = 8\nverify_checksum = false\n").unwrap();
        let config = RouterConfig::from_file(&path).unwrap();
        assert_eq!(config.pool_capacity, 8);
        assert!(!config.load_options().verify_checksum);

        assert!(matches!(
            RouterConfig::from_file(dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
