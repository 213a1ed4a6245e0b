//! Transport-independent signal channel

use async_trait::async_trait;
use fenced_harness_common::Token;
use std::time::Duration;
use tracing::debug;

use crate::error::RelayResult;
use crate::store::SignalStore;

/// A cross-context channel: content publishes one value per token, the
/// orchestrator awaits it.
#[async_trait]
pub trait SignalChannel: Send + Sync {
    /// Report `value` under `token`
    async fn publish(&self, token: &Token, value: &str) -> RelayResult<()>;

    /// Wait for the value reported under `token`. Never times out on its own.
    async fn await_value(&self, token: &Token) -> RelayResult<String>;
}

#[async_trait]
impl SignalChannel for SignalStore {
    async fn publish(&self, token: &Token, value: &str) -> RelayResult<()> {
        SignalStore::publish(self, token, value)
    }

    async fn await_value(&self, token: &Token) -> RelayResult<String> {
        SignalStore::await_value(self, token).await
    }
}

/// Which branch of a signal/deadline race won
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaceOutcome {
    Signal(String),
    Deadline,
}

impl RaceOutcome {
    /// The relayed value, or `deadline_value` when the deadline won
    pub fn value_or<'a>(&'a self, deadline_value: &'a str) -> &'a str {
        match self {
            RaceOutcome::Signal(value) => value,
            RaceOutcome::Deadline => deadline_value,
        }
    }
}

/// Race the value for `token` against a fixed deadline.
///
/// The losing wait is dropped, which releases it in the channel.
pub async fn race_deadline(
    channel: &dyn SignalChannel,
    token: &Token,
    deadline: Duration,
) -> RelayResult<RaceOutcome> {
    tokio::select! {
        value = channel.await_value(token) => Ok(RaceOutcome::Signal(value?)),
        _ = tokio::time::sleep(deadline) => {
            debug!("Deadline of {:?} passed waiting for {}", deadline, token);
            Ok(RaceOutcome::Deadline)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_wins_without_signal() {
        let store = SignalStore::new();
        let token = Token::mint();

        let outcome = race_deadline(&store, &token, Duration::from_millis(10_000))
            .await
            .unwrap();

        assert_eq!(outcome, RaceOutcome::Deadline);
        assert_eq!(outcome.value_or("timeout"), "timeout");
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_wins_over_late_signal() {
        let store = SignalStore::new();
        let token = Token::mint();

        {
            let store = store.clone();
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(15_000)).await;
                store.publish(&token, "loaded").unwrap();
            });
        }

        let outcome = race_deadline(&store, &token, Duration::from_millis(10_000))
            .await
            .unwrap();
        assert_eq!(outcome, RaceOutcome::Deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_wins_before_deadline() {
        let store = SignalStore::new();
        let token = Token::mint();

        {
            let store = store.clone();
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                store.publish(&token, "loaded").unwrap();
            });
        }

        let outcome = race_deadline(&store, &token, Duration::from_millis(10_000))
            .await
            .unwrap();
        assert_eq!(outcome, RaceOutcome::Signal("loaded".to_string()));
    }
}
