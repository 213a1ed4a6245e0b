//! Harness configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::registry::{PortTable, ServerRegistry};
use crate::resolver::UrlResolver;

/// Environment variable overriding [`HarnessConfig::base_url`]
pub const ENV_BASE_URL: &str = "FENCED_HARNESS_BASE_URL";
/// Environment variable overriding [`HarnessConfig::relay_url`]
pub const ENV_RELAY_URL: &str = "FENCED_HARNESS_RELAY_URL";

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Location of the top-level test page; relative URLs resolve against it
    pub base_url: String,

    /// Base URL of an already running signal relay. Unset runs use the
    /// in-process store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_url: Option<String>,

    /// Interval between relay polls
    pub poll_interval_ms: u64,

    /// How long an unread signal is kept before it is swept
    pub value_ttl_secs: u64,

    /// Interval between sweeps of expired signals
    pub sweep_interval_secs: u64,

    /// Deployment port allocation
    pub ports: PortTable,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "https://web-platform.test:8443/fenced-frame/".to_string(),
            relay_url: None,
            poll_interval_ms: 20,
            value_ttl_secs: 300,
            sweep_interval_secs: 30,
            ports: PortTable::default(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from the environment
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(base_url) = non_empty_env(ENV_BASE_URL) {
            self.base_url = base_url;
        }
        if let Some(relay_url) = non_empty_env(ENV_RELAY_URL) {
            self.relay_url = Some(relay_url);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig("poll_interval_ms must be > 0".to_string()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(Error::InvalidConfig("sweep_interval_secs must be > 0".to_string()));
        }
        if let Some(relay_url) = &self.relay_url {
            url::Url::parse(relay_url).map_err(|source| Error::InvalidUrl {
                input: relay_url.clone(),
                source,
            })?;
        }
        self.resolver().map(|_| ())
    }

    pub fn resolver(&self) -> Result<UrlResolver> {
        UrlResolver::parse(&self.base_url)
    }

    pub fn registry(&self) -> ServerRegistry {
        ServerRegistry::from_ports(&self.ports)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn value_ttl(&self) -> Duration {
        Duration::from_secs(self.value_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/harness.toml");

        let mut config = HarnessConfig::default();
        config.poll_interval_ms = 50;
        config.ports.http.public = Some(9003);
        config.save(&path).unwrap();

        let loaded = HarnessConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.registry().http_public().unwrap().port, 9003);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.toml");
        std::fs::write(
            &path,
            r#"
base_url = "https://wpt.example:9443/fenced-frame/"

[ports.https]
local = 9445
"#,
        )
        .unwrap();

        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.poll_interval_ms, 20);
        assert_eq!(config.relay_url, None);
        assert_eq!(config.ports.https.local, Some(9445));
        assert_eq!(config.ports.https.public, None);
        assert_eq!(config.ports.http, PortTable::default().http);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = HarnessConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_relay_url_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.toml");
        std::fs::write(
            &path,
            r#"
relay_url = "http://127.0.0.1:9090"
value_ttl_secs = 60
sweep_interval_secs = 5
"#,
        )
        .unwrap();

        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.relay_url.as_deref(), Some("http://127.0.0.1:9090"));
        assert_eq!(config.value_ttl(), Duration::from_secs(60));
        assert_eq!(config.sweep_interval(), Duration::from_secs(5));
        config.validate().unwrap();

        config.save(&path).unwrap();
        assert_eq!(HarnessConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_unset_relay_url_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.toml");
        HarnessConfig::default().save(&path).unwrap();
        assert!(!std::fs::read_to_string(&path).unwrap().contains("relay_url"));
    }

    #[test]
    fn test_validate_rejects_bad_relay_url_and_zero_sweep() {
        let config = HarnessConfig {
            relay_url: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidUrl { .. })));

        let config = HarnessConfig {
            sweep_interval_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
