//! Agent configuration

use lazarus_common::{LazarusError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// App-shell cache name. Bumping the suffix invalidates the whole cache.
pub const APP_SHELL_CACHE: &str = "lazarus-v1";

/// Cache for third-party CDN resources.
pub const CDN_CACHE: &str = "lazarus-cdn-v1";

/// Application shell, relative to the agent scope.
pub const PRECACHE_URLS: &[&str] = &[
    "./",
    "./index.html",
    "./manifest.json",
    "./icons/icon-192.png",
    "./icons/icon-512.png",
];

/// Hostname substrings served cache-first from the CDN cache.
pub const CDN_HOSTS: &[&str] = &[
    "cdnjs.cloudflare.com",
    "fonts.googleapis.com",
    "fonts.gstatic.com",
    "esm.sh",
    "unpkg.com",
];

/// Camera/controller endpoints. Never cached.
pub const DEVICE_HOSTS: &[&str] = &["192.168.107.1"];

/// Document served to offline navigations.
pub const NAVIGATION_FALLBACK: &str = "./index.html";

/// Offline agent configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Names of the two caches owned by the agent
    pub caches: CacheNames,

    /// Paths fetched and stored on install, relative to the scope
    pub precache: Vec<String>,

    /// Hostname substrings routed to the CDN cache
    pub cdn_hosts: Vec<String>,

    /// Exact hostnames that always bypass the agent
    pub device_hosts: Vec<String>,

    /// Path of the document served to offline navigations
    pub navigation_fallback: String,

    /// Activate a new version as soon as it installs instead of waiting
    /// for the current one to be released
    pub skip_waiting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheNames {
    /// App-shell cache
    pub app_shell: String,

    /// CDN resource cache
    pub cdn: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            caches: CacheNames::default(),
            precache: PRECACHE_URLS.iter().map(|s| s.to_string()).collect(),
            cdn_hosts: CDN_HOSTS.iter().map(|s| s.to_string()).collect(),
            device_hosts: DEVICE_HOSTS.iter().map(|s| s.to_string()).collect(),
            navigation_fallback: NAVIGATION_FALLBACK.to_string(),
            skip_waiting: true,
        }
    }
}

impl Default for CacheNames {
    fn default() -> Self {
        Self {
            app_shell: APP_SHELL_CACHE.to_string(),
            cdn: CDN_CACHE.to_string(),
        }
    }
}

impl CacheNames {
    /// Whether `name` is one of the caches this configuration owns.
    pub fn is_current(&self, name: &str) -> bool {
        name == self.app_shell || name == self.cdn
    }
}

impl AgentConfig {
    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| LazarusError::config_with_source("invalid agent config", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading agent config");
        let json = std::fs::read_to_string(path)
            .context(format!("reading {}", path.display()))?;
        Self::from_json_str(&json)
    }

    /// Check invariants the agent relies on.
    pub fn validate(&self) -> Result<()> {
        if self.caches.app_shell.is_empty() || self.caches.cdn.is_empty() {
            return Err(LazarusError::config("cache names must not be empty"));
        }
        if self.caches.app_shell == self.caches.cdn {
            return Err(LazarusError::config(format!(
                "app-shell and CDN caches share the name {:?}",
                self.caches.app_shell
            )));
        }
        if self.navigation_fallback.is_empty() {
            return Err(LazarusError::config("navigation fallback must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_matches_shipped_constants() {
        let config = AgentConfig::default();
        assert_eq!(config.caches.app_shell, "lazarus-v1");
        assert_eq!(config.caches.cdn, "lazarus-cdn-v1");
        assert_eq!(config.precache.len(), 5);
        assert_eq!(config.precache[0], "./");
        assert!(config.cdn_hosts.iter().any(|h| h == "esm.sh"));
        assert_eq!(config.device_hosts, vec!["192.168.107.1".to_string()]);
        assert_eq!(config.navigation_fallback, "./index.html");
        assert!(config.skip_waiting);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            AgentConfig::from_json_str(r#"{ "caches": { "app_shell": "lazarus-v2" } }"#).unwrap();
        assert_eq!(config.caches.app_shell, "lazarus-v2");
        assert_eq!(config.caches.cdn, "lazarus-cdn-v1");
        assert_eq!(config.precache, AgentConfig::default().precache);
        assert!(config.skip_waiting);

        let waiting = AgentConfig::from_json_str(r#"{ "skip_waiting": false }"#).unwrap();
        assert!(!waiting.skip_waiting);
    }

    #[test]
    fn test_rejects_shared_cache_name() {
        let err = AgentConfig::from_json_str(
            r#"{ "caches": { "app_shell": "same", "cdn": "same" } }"#,
        )
        .unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = AgentConfig::from_json_str("{ not json").unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_is_current() {
        let names = CacheNames::default();
        assert!(names.is_current("lazarus-v1"));
        assert!(names.is_current("lazarus-cdn-v1"));
        assert!(!names.is_current("lazarus-v0"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "cdn_hosts": ["cdn.example.net"] }}"#).unwrap();

        let config = AgentConfig::load(file.path()).unwrap();
        assert_eq!(config.cdn_hosts, vec!["cdn.example.net".to_string()]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = AgentConfig::load(Path::new("/nonexistent/lazarus.json")).unwrap_err();
        assert_eq!(err.category(), "context");
    }
}
