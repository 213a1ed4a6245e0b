//! Concurrent token/value store
//!
//! Each token carries at most one value, written once and delivered once.
//! A reader either takes the value immediately or parks a single waiter
//! that the writer completes. Delivered tokens leave a tombstone so a second
//! read is reported instead of hanging.

use fenced_harness_common::Token;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{RelayError, RelayResult};

enum Slot {
    Ready { value: String, since: Instant },
    Waiting { waiter: oneshot::Sender<String> },
    Delivered { at: Instant },
}

/// Counts of slots by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub ready: usize,
    pub waiting: usize,
    pub delivered: usize,
}

/// In-process signal store, shared by cloning
#[derive(Clone, Default)]
pub struct SignalStore {
    slots: Arc<Mutex<HashMap<Token, Slot>>>,
}

impl SignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `token`, completing a parked waiter if there is one
    pub fn publish(&self, token: &Token, value: impl Into<String>) -> RelayResult<()> {
        let value = value.into();
        let mut slots = self.slots.lock();

        match slots.remove(token) {
            None => {
                trace!("Stored value for {}", token);
                slots.insert(token.clone(), Slot::Ready { value, since: Instant::now() });
                Ok(())
            }
            Some(Slot::Waiting { waiter }) => {
                match waiter.send(value) {
                    Ok(()) => {
                        trace!("Delivered value for {} to waiter", token);
                        slots.insert(token.clone(), Slot::Delivered { at: Instant::now() });
                    }
                    // The waiter went away; keep the value for the next reader.
                    Err(value) => {
                        slots.insert(token.clone(), Slot::Ready { value, since: Instant::now() });
                    }
                }
                Ok(())
            }
            Some(existing) => {
                slots.insert(token.clone(), existing);
                Err(RelayError::AlreadyPublished(token.clone()))
            }
        }
    }

    /// Take the value for `token` if it has been published.
    ///
    /// Returns `Ok(None)` while no value is available, including while an
    /// in-process waiter is parked on the token.
    pub fn try_take(&self, token: &Token) -> RelayResult<Option<String>> {
        let mut slots = self.slots.lock();
        match slots.remove(token) {
            Some(Slot::Ready { value, .. }) => {
                slots.insert(token.clone(), Slot::Delivered { at: Instant::now() });
                Ok(Some(value))
            }
            Some(delivered @ Slot::Delivered { .. }) => {
                slots.insert(token.clone(), delivered);
                Err(RelayError::AlreadyDelivered(token.clone()))
            }
            Some(waiting) => {
                slots.insert(token.clone(), waiting);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Wait until a value is published under `token`.
    ///
    /// Suspends indefinitely if no value ever arrives; bound it with a
    /// deadline. Dropping the returned future deregisters the waiter, and a
    /// value that raced with the drop is put back for the next reader.
    pub async fn await_value(&self, token: &Token) -> RelayResult<String> {
        let receiver = {
            let mut slots = self.slots.lock();
            match slots.remove(token) {
                Some(Slot::Ready { value, .. }) => {
                    slots.insert(token.clone(), Slot::Delivered { at: Instant::now() });
                    return Ok(value);
                }
                Some(delivered @ Slot::Delivered { .. }) => {
                    slots.insert(token.clone(), delivered);
                    return Err(RelayError::AlreadyDelivered(token.clone()));
                }
                Some(Slot::Waiting { waiter }) if !waiter.is_closed() => {
                    slots.insert(token.clone(), Slot::Waiting { waiter });
                    return Err(RelayError::AlreadyAwaited(token.clone()));
                }
                // No slot, or a waiter whose reader is gone.
                _ => {
                    let (waiter, receiver) = oneshot::channel();
                    slots.insert(token.clone(), Slot::Waiting { waiter });
                    receiver
                }
            }
        };

        let mut wait = PendingWait {
            store: self.clone(),
            token: token.clone(),
            receiver,
            finished: false,
        };
        let result = (&mut wait.receiver).await;
        wait.finished = true;
        result.map_err(|_| RelayError::Abandoned(token.clone()))
    }

    /// Drop unread values and tombstones older than `ttl`, and waiters whose
    /// reader is gone. Returns the number of slots removed.
    pub fn sweep(&self, ttl: Duration) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| match slot {
            Slot::Ready { since, .. } => since.elapsed() < ttl,
            Slot::Delivered { at } => at.elapsed() < ttl,
            Slot::Waiting { waiter } => !waiter.is_closed(),
        });
        let removed = before - slots.len();
        if removed > 0 {
            debug!("Swept {} expired signal slots", removed);
        }
        removed
    }

    /// Run [`sweep`](Self::sweep) every `interval` on the current runtime.
    ///
    /// The task runs until the returned handle is aborted.
    pub fn spawn_sweeper(&self, ttl: Duration, interval: Duration) -> RelayResult<JoinHandle<()>> {
        if interval.is_zero() {
            return Err(RelayError::InvalidConfig(
                "sweep interval must be greater than zero".to_string(),
            ));
        }

        let store = self.clone();
        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if store.sweep(ttl) > 0 {
                    trace!("Signal store after sweep: {:?}", store.stats());
                }
            }
        }))
    }

    pub fn stats(&self) -> StoreStats {
        let slots = self.slots.lock();
        let mut stats = StoreStats::default();
        for slot in slots.values() {
            match slot {
                Slot::Ready { .. } => stats.ready += 1,
                Slot::Waiting { .. } => stats.waiting += 1,
                Slot::Delivered { .. } => stats.delivered += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    fn release(&self, token: &Token, receiver: &mut oneshot::Receiver<String>) {
        let mut slots = self.slots.lock();
        receiver.close();
        match receiver.try_recv() {
            // Sent after we stopped polling: nobody saw it, make it readable again.
            Ok(value) => {
                slots.insert(token.clone(), Slot::Ready { value, since: Instant::now() });
            }
            Err(_) => {
                if matches!(slots.get(token), Some(Slot::Waiting { waiter }) if waiter.is_closed()) {
                    slots.remove(token);
                }
            }
        }
    }
}

struct PendingWait {
    store: SignalStore,
    token: Token,
    receiver: oneshot::Receiver<String>,
    finished: bool,
}

impl Drop for PendingWait {
    fn drop(&mut self) {
        if !self.finished {
            trace!("Abandoned wait for {}", self.token);
            self.store.release(&self.token, &mut self.receiver);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{race_deadline, RaceOutcome};

    #[tokio::test]
    async fn test_publish_then_await() {
        let store = SignalStore::new();
        let token = Token::mint();

        store.publish(&token, "loaded").unwrap();
        assert_eq!(store.await_value(&token).await.unwrap(), "loaded");
    }

    #[tokio::test]
    async fn test_await_then_publish() {
        let store = SignalStore::new();
        let token = Token::mint();

        let waiter = {
            let store = store.clone();
            let token = token.clone();
            tokio::spawn(async move { store.await_value(&token).await })
        };
        while store.stats().waiting == 0 {
            tokio::task::yield_now().await;
        }

        store.publish(&token, "success").unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), "success");
        assert_eq!(store.stats().delivered, 1);
    }

    #[tokio::test]
    async fn test_single_delivery() {
        let store = SignalStore::new();
        let token = Token::mint();

        store.publish(&token, "v").unwrap();
        store.await_value(&token).await.unwrap();

        assert!(matches!(
            store.await_value(&token).await,
            Err(RelayError::AlreadyDelivered(_))
        ));
        assert!(matches!(store.try_take(&token), Err(RelayError::AlreadyDelivered(_))));
    }

    #[tokio::test]
    async fn test_single_writer() {
        let store = SignalStore::new();
        let token = Token::mint();

        store.publish(&token, "first").unwrap();
        assert!(matches!(
            store.publish(&token, "second"),
            Err(RelayError::AlreadyPublished(_))
        ));
        assert_eq!(store.try_take(&token).unwrap().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_second_concurrent_waiter_rejected() {
        let store = SignalStore::new();
        let token = Token::mint();

        let first = {
            let store = store.clone();
            let token = token.clone();
            tokio::spawn(async move { store.await_value(&token).await })
        };
        while store.stats().waiting == 0 {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            store.await_value(&token).await,
            Err(RelayError::AlreadyAwaited(_))
        ));

        store.publish(&token, "x").unwrap();
        assert_eq!(first.await.unwrap().unwrap(), "x");
    }

    #[tokio::test]
    async fn test_tokens_are_independent() {
        let store = SignalStore::new();
        let a = Token::mint();
        let b = Token::mint();

        store.publish(&b, "b").unwrap();
        store.publish(&a, "a").unwrap();

        assert_eq!(store.await_value(&a).await.unwrap(), "a");
        assert_eq!(store.await_value(&b).await.unwrap(), "b");
    }

    #[tokio::test]
    async fn test_dropped_wait_is_released() {
        let store = SignalStore::new();
        let token = Token::mint();

        let timed_out =
            tokio::time::timeout(Duration::from_millis(10), store.await_value(&token)).await;
        assert!(timed_out.is_err());
        assert!(store.is_empty());

        // the token can still be awaited and published afterwards
        store.publish(&token, "late").unwrap();
        assert_eq!(store.await_value(&token).await.unwrap(), "late");
    }

    #[tokio::test]
    async fn test_try_take_pending() {
        let store = SignalStore::new();
        let token = Token::mint();
        assert_eq!(store.try_take(&token).unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_reclaims_values_posted_after_deadline() {
        let store = SignalStore::new();
        let sweeper = store
            .spawn_sweeper(Duration::from_secs(300), Duration::from_secs(30))
            .unwrap();

        for _ in 0..100 {
            let token = Token::mint();
            let outcome = race_deadline(&store, &token, Duration::from_millis(10_000))
                .await
                .unwrap();
            assert_eq!(outcome, RaceOutcome::Deadline);
            store.publish(&token, "loaded").unwrap();
        }
        let read = Token::mint();
        store.publish(&read, "read").unwrap();
        store.try_take(&read).unwrap();
        assert_eq!(
            store.stats(),
            StoreStats {
                ready: 100,
                waiting: 0,
                delivered: 1
            }
        );

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(store.is_empty());
        sweeper.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_keeps_fresh_values() {
        let store = SignalStore::new();
        let sweeper = store
            .spawn_sweeper(Duration::from_secs(300), Duration::from_secs(30))
            .unwrap();

        let token = Token::mint();
        store.publish(&token, "fresh").unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(store.try_take(&token).unwrap().as_deref(), Some("fresh"));
        sweeper.abort();
    }

    #[tokio::test]
    async fn test_sweeper_rejects_zero_interval() {
        let store = SignalStore::new();
        assert!(matches!(
            store.spawn_sweeper(Duration::from_secs(300), Duration::ZERO),
            Err(RelayError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_sweep_expires_old_slots() {
        let store = SignalStore::new();
        let unread = Token::mint();
        let read = Token::mint();

        store.publish(&unread, "never read").unwrap();
        store.publish(&read, "read").unwrap();
        store.try_take(&read).unwrap();

        assert_eq!(store.sweep(Duration::from_secs(60)), 0);
        assert_eq!(store.sweep(Duration::ZERO), 2);
        assert!(store.is_empty());
    }
}
