//! HTTP client for a remote relay server

use async_trait::async_trait;
use fenced_harness_common::Token;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

use crate::channel::SignalChannel;
use crate::error::{RelayError, RelayResult};
use crate::server::{NOT_SET, STORE_PATH};

/// Polling client for the relay's key-value endpoint
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    base: Url,
    poll_interval: Duration,
}

impl RelayClient {
    pub fn new(base_url: &str, poll_interval: Duration) -> RelayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base: Url::parse(base_url)?,
            poll_interval,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// URL at which `token` is read (and, with `value`, written)
    pub fn store_url(&self, token: &Token, value: Option<&str>) -> RelayResult<Url> {
        let mut url = self.base.join(STORE_PATH)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("key", token.as_str());
            if let Some(value) = value {
                pairs.append_pair("value", value);
            }
        }
        Ok(url)
    }

    pub async fn health(&self) -> RelayResult<()> {
        let url = self.base.join("/health")?;
        let resp = self.http.get(url).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(unexpected(resp).await)
        }
    }

    /// Take the value for `token` if it is set
    pub async fn try_take(&self, token: &Token) -> RelayResult<Option<String>> {
        let resp = self.http.get(self.store_url(token, None)?).send().await?;
        match resp.status() {
            StatusCode::OK => {
                let body = resp.text().await?;
                if body == NOT_SET {
                    Ok(None)
                } else {
                    Ok(Some(body))
                }
            }
            StatusCode::GONE => Err(RelayError::AlreadyDelivered(token.clone())),
            _ => Err(unexpected(resp).await),
        }
    }
}

#[async_trait]
impl SignalChannel for RelayClient {
    async fn publish(&self, token: &Token, value: &str) -> RelayResult<()> {
        let url = self.store_url(token, None)?;
        let resp = self.http.post(url).body(value.to_string()).send().await?;
        match resp.status() {
            StatusCode::OK => Ok(()),
            StatusCode::CONFLICT => Err(RelayError::AlreadyPublished(token.clone())),
            _ => Err(unexpected(resp).await),
        }
    }

    async fn await_value(&self, token: &Token) -> RelayResult<String> {
        debug!("Polling relay for {}", token);
        loop {
            if let Some(value) = self.try_take(token).await? {
                trace!("Relay delivered {}", token);
                return Ok(value);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

async fn unexpected(resp: reqwest::Response) -> RelayError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    RelayError::UnexpectedStatus { status, body }
}
