use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::engine::dispatch::DEFAULT_EVENT_QUEUE;
use crate::engine::entity_cache::CacheOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level configuration, loaded from concord-cache.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct CacheConfig {
    pub cache: CacheSection,
    pub log: LogSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Construct the everyone role when a server is first cached.
    pub create_everyone_role: bool,
    /// Construct locked-zero roles for unknown role ids held by members.
    pub lazy_roles: bool,
    /// Bound of the dispatcher's inbound event queue.
    pub event_queue: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            create_everyone_role: true,
            lazy_roles: true,
            event_queue: DEFAULT_EVENT_QUEUE,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// `tracing_subscriber::EnvFilter` directive used when RUST_LOG is unset.
    pub filter: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            filter: "info".into(),
        }
    }
}

impl CacheConfig {
    /// Load config from a TOML file. Falls back to defaults if the file doesn't exist.
    /// Environment variables override TOML values.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_string(),
                source,
            })?;
            Self::from_toml(path, &contents)?
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn from_toml(path: &str, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Toml {
            path: path.to_string(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CACHE_CREATE_EVERYONE_ROLE")
            && let Ok(flag) = v.parse()
        {
            self.cache.create_everyone_role = flag;
        }
        if let Ok(v) = std::env::var("CACHE_LAZY_ROLES")
            && let Ok(flag) = v.parse()
        {
            self.cache.lazy_roles = flag;
        }
        if let Ok(v) = std::env::var("CACHE_EVENT_QUEUE")
            && let Ok(len) = v.parse()
        {
            self.cache.event_queue = len;
        }
        if let Ok(v) = std::env::var("CACHE_LOG") {
            self.log.filter = v;
        }
    }

    /// Convert into the options the cache itself understands.
    pub fn to_cache_options(&self) -> CacheOptions {
        CacheOptions {
            create_everyone_role: self.cache.create_everyone_role,
            lazy_roles: self.cache.lazy_roles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert!(config.cache.create_everyone_role);
        assert!(config.cache.lazy_roles);
        assert_eq!(config.cache.event_queue, DEFAULT_EVENT_QUEUE);
        assert_eq!(config.log.filter, "info");
        assert_eq!(config.to_cache_options(), CacheOptions::default());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = CacheConfig::from_toml(
            "test.toml",
            "[cache]\nlazy_roles = false\n\n[log]\nfilter = \"debug\"\n",
        )
        .unwrap();
        assert!(!config.cache.lazy_roles);
        assert!(config.cache.create_everyone_role);
        assert_eq!(config.log.filter, "debug");
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let err = CacheConfig::from_toml("bad.toml", "[cache\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = CacheConfig::load("/nonexistent/concord-cache.toml").unwrap();
        assert!(config.cache.event_queue > 0);
    }
}
