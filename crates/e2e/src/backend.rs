//! Where scenario signals travel

use fenced_harness_common::HarnessConfig;
use fenced_harness_relay::{
    RelayClient, RelayProcess, RelayProcessConfig, SignalChannel, SignalStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;
use url::Url;

use crate::error::E2eResult;

/// Signal backend of a run
pub enum SignalBackend {
    /// Store in this process, swept on the configured schedule
    InProcess {
        store: SignalStore,
        sweeper: JoinHandle<()>,
    },
    /// Relay someone else started
    Remote(RelayClient),
    /// Relay started for this run; stopped when the backend is dropped
    Spawned(RelayProcess),
}

impl SignalBackend {
    /// Use `relay_url`, else the configured relay, else an in-process store
    pub async fn connect(relay_url: Option<&str>, config: &HarnessConfig) -> E2eResult<Self> {
        match relay_url.or(config.relay_url.as_deref()) {
            Some(url) => {
                let client = RelayClient::new(url, config.poll_interval())?;
                client.health().await?;
                info!("Using signal relay at {}", url);
                Ok(Self::Remote(client))
            }
            None => Self::in_process(config),
        }
    }

    /// Store in this process with a sweeper task
    pub fn in_process(config: &HarnessConfig) -> E2eResult<Self> {
        let store = SignalStore::new();
        let sweeper = store.spawn_sweeper(config.value_ttl(), config.sweep_interval())?;
        info!("Using in-process signal store");
        Ok(Self::InProcess { store, sweeper })
    }

    /// Start `binary` with the configured ttl and sweep interval
    pub async fn spawn(binary: PathBuf, config: &HarnessConfig) -> E2eResult<Self> {
        let process = RelayProcess::spawn(RelayProcessConfig {
            binary_path: binary,
            value_ttl: config.value_ttl(),
            sweep_interval: config.sweep_interval(),
            poll_interval: config.poll_interval(),
            ..Default::default()
        })
        .await?;
        Ok(Self::Spawned(process))
    }

    pub fn channel(&self) -> Arc<dyn SignalChannel> {
        match self {
            Self::InProcess { store, .. } => Arc::new(store.clone()),
            Self::Remote(client) => Arc::new(client.clone()),
            Self::Spawned(process) => Arc::new(process.client().clone()),
        }
    }

    /// HTTP address pages can report to, if any
    pub fn relay_url(&self) -> Option<&Url> {
        match self {
            Self::InProcess { .. } => None,
            Self::Remote(client) => Some(client.base_url()),
            Self::Spawned(process) => Some(process.base_url()),
        }
    }
}

impl Drop for SignalBackend {
    fn drop(&mut self) {
        if let Self::InProcess { sweeper, .. } = self {
            sweeper.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fenced_harness_common::Token;
    use fenced_harness_relay::{RelayServer, RelayServerConfig};
    use std::time::Duration;

    async fn running_relay() -> String {
        let server = RelayServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            SignalStore::new(),
            RelayServerConfig::default(),
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_configured_relay_url_selects_client() {
        let url = running_relay().await;
        let config = HarnessConfig {
            relay_url: Some(url.clone()),
            ..Default::default()
        };

        let backend = SignalBackend::connect(None, &config).await.unwrap();
        assert!(matches!(backend, SignalBackend::Remote(_)));
        assert_eq!(backend.relay_url().map(Url::as_str), Some(url.as_str()));

        let channel = backend.channel();
        let token = Token::mint();
        channel.publish(&token, "loaded").await.unwrap();
        assert_eq!(channel.await_value(&token).await.unwrap(), "loaded");
    }

    #[tokio::test]
    async fn test_explicit_url_wins_over_config() {
        let url = running_relay().await;
        let config = HarnessConfig {
            relay_url: Some("http://127.0.0.1:1/".to_string()),
            ..Default::default()
        };

        let backend = SignalBackend::connect(Some(&url), &config).await.unwrap();
        assert_eq!(backend.relay_url().map(Url::as_str), Some(url.as_str()));
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_an_error() {
        let config = HarnessConfig {
            relay_url: Some("http://127.0.0.1:1/".to_string()),
            ..Default::default()
        };
        assert!(SignalBackend::connect(None, &config).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_process_store_is_swept() {
        let config = HarnessConfig {
            value_ttl_secs: 60,
            sweep_interval_secs: 10,
            ..Default::default()
        };
        let backend = SignalBackend::connect(None, &config).await.unwrap();
        assert!(backend.relay_url().is_none());

        backend
            .channel()
            .publish(&Token::mint(), "posted after the deadline")
            .await
            .unwrap();

        let SignalBackend::InProcess { store, .. } = &backend else {
            panic!("expected the in-process store");
        };
        assert_eq!(store.len(), 1);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(store.is_empty());
    }
}
