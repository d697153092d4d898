// SPDX-License-Identifier: MIT OR Apache-2.0

//! Watcher trait definition and the change channel watchers write to.
//!
//! A watcher turns one source into a stream of [`Change`] batches. All
//! watchers of a monitor share a single bounded channel; [`ChangeSender`] wraps
//! its sending half and applies the configured [`Backpressure`] policy so a slow
//! consumer is visible instead of silently stalling every source.

use crate::domain::settings::BackpressureSettings;
use crate::domain::{Change, ConfigError, Result, Source};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio_util::sync::CancellationToken;

/// A source of change batches.
///
/// # Lifecycle
///
/// [`Watcher::watch`] registers background tasks and returns immediately.
/// Cancelling the token *requests* a stop; [`Watcher::stopped`] resolves once
/// every task the watcher started has actually exited.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use harvestcfg::domain::{Result, Source};
/// use harvestcfg::ports::{ChangeSender, Watcher};
/// use tokio_util::sync::CancellationToken;
///
/// struct Silent;
///
/// #[async_trait]
/// impl Watcher for Silent {
///     fn source(&self) -> Source {
///         Source::File
///     }
///
///     fn watch(&self, _cancel: CancellationToken, _changes: ChangeSender) -> Result<()> {
///         Ok(())
///     }
///
///     async fn stopped(&self) {}
/// }
/// ```
#[async_trait]
pub trait Watcher: Send + Sync {
    /// The source this watcher reports changes for.
    fn source(&self) -> Source;

    /// Starts emitting change batches into `changes` until `cancel` fires.
    ///
    /// Fails with [`ConfigError::InvalidArgument`] when the token is already
    /// cancelled or the channel is closed, and with
    /// [`ConfigError::WatcherError`] when called outside a tokio runtime.
    fn watch(&self, cancel: CancellationToken, changes: ChangeSender) -> Result<()>;

    /// Resolves once every task started by [`Watcher::watch`] has exited.
    async fn stopped(&self);
}

/// Checks the common `watch` preconditions and returns the runtime to spawn on.
pub(crate) fn watch_preconditions(
    cancel: &CancellationToken,
    changes: &ChangeSender,
) -> Result<Handle> {
    if cancel.is_cancelled() {
        return Err(ConfigError::invalid_argument("context is already cancelled"));
    }
    if changes.is_closed() {
        return Err(ConfigError::invalid_argument("change channel is closed"));
    }
    Handle::try_current().map_err(|e| ConfigError::WatcherError {
        message: "watchers must be started inside a tokio runtime".to_string(),
        source: Some(Box::new(e)),
    })
}

/// What a watcher does when the change channel has no room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backpressure {
    /// Wait until the consumer makes room.
    #[default]
    Block,
    /// Wait up to the given duration, then drop the batch.
    BlockFor(Duration),
    /// Drop the batch if there is no room right now.
    DropNewest,
}

impl From<BackpressureSettings> for Backpressure {
    fn from(settings: BackpressureSettings) -> Self {
        match settings {
            BackpressureSettings::Block => Backpressure::Block,
            BackpressureSettings::BlockFor { timeout_ms } => {
                Backpressure::BlockFor(Duration::from_millis(timeout_ms))
            }
            BackpressureSettings::DropNewest => Backpressure::DropNewest,
        }
    }
}

/// Result of [`ChangeSender::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The consumer has the batch.
    Delivered,
    /// The backpressure policy discarded the batch.
    Dropped,
    /// The consumer is gone; the watcher should stop.
    Closed,
}

/// Sending half of the shared change channel.
///
/// Cloning is cheap; all clones share the drop counter.
#[derive(Debug, Clone)]
pub struct ChangeSender {
    tx: mpsc::Sender<Vec<Change>>,
    policy: Backpressure,
    dropped: Arc<AtomicU64>,
}

impl ChangeSender {
    /// Wraps an existing channel sender.
    pub fn new(tx: mpsc::Sender<Vec<Change>>, policy: Backpressure) -> Self {
        Self {
            tx,
            policy,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates a bounded channel. A zero capacity is raised to one.
    pub fn channel(capacity: usize, policy: Backpressure) -> (Self, mpsc::Receiver<Vec<Change>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx, policy), rx)
    }

    /// The policy in effect.
    pub fn policy(&self) -> Backpressure {
        self.policy
    }

    /// Whether the receiving side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Number of batches discarded by the backpressure policy so far.
    pub fn dropped_batches(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Sends one batch as a unit, honoring the backpressure policy.
    pub async fn send(&self, batch: Vec<Change>) -> SendOutcome {
        let size = batch.len();
        let outcome = match self.policy {
            Backpressure::Block => match self.tx.send(batch).await {
                Ok(()) => SendOutcome::Delivered,
                Err(_) => SendOutcome::Closed,
            },
            Backpressure::BlockFor(timeout) => match self.tx.send_timeout(batch, timeout).await {
                Ok(()) => SendOutcome::Delivered,
                Err(SendTimeoutError::Timeout(_)) => SendOutcome::Dropped,
                Err(SendTimeoutError::Closed(_)) => SendOutcome::Closed,
            },
            Backpressure::DropNewest => match self.tx.try_send(batch) {
                Ok(()) => SendOutcome::Delivered,
                Err(TrySendError::Full(_)) => SendOutcome::Dropped,
                Err(TrySendError::Closed(_)) => SendOutcome::Closed,
            },
        };

        if outcome == SendOutcome::Dropped {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(
                changes = size,
                dropped_total = total,
                policy = ?self.policy,
                "change batch dropped, consumer is not keeping up"
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(key: &str) -> Vec<Change> {
        vec![Change::new(Source::Redis, key, "v", 1)]
    }

    #[tokio::test]
    async fn test_block_delivers() {
        let (tx, mut rx) = ChangeSender::channel(1, Backpressure::Block);
        assert_eq!(tx.send(batch("a")).await, SendOutcome::Delivered);
        assert_eq!(rx.recv().await.unwrap()[0].key(), "a");
    }

    #[tokio::test]
    async fn test_drop_newest_when_full() {
        let (tx, mut rx) = ChangeSender::channel(1, Backpressure::DropNewest);
        assert_eq!(tx.send(batch("a")).await, SendOutcome::Delivered);
        assert_eq!(tx.send(batch("b")).await, SendOutcome::Dropped);
        assert_eq!(tx.dropped_batches(), 1);
        assert_eq!(rx.recv().await.unwrap()[0].key(), "a");
        assert_eq!(tx.send(batch("c")).await, SendOutcome::Delivered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_for_times_out() {
        let (tx, _rx) = ChangeSender::channel(1, Backpressure::BlockFor(Duration::from_millis(50)));
        assert_eq!(tx.send(batch("a")).await, SendOutcome::Delivered);
        assert_eq!(tx.send(batch("b")).await, SendOutcome::Dropped);
        assert_eq!(tx.clone().dropped_batches(), 1);
    }

    #[tokio::test]
    async fn test_closed_channel() {
        let (tx, rx) = ChangeSender::channel(1, Backpressure::Block);
        drop(rx);
        assert!(tx.is_closed());
        assert_eq!(tx.send(batch("a")).await, SendOutcome::Closed);
    }

    #[tokio::test]
    async fn test_preconditions() {
        let (tx, rx) = ChangeSender::channel(1, Backpressure::Block);
        let cancel = CancellationToken::new();
        assert!(watch_preconditions(&cancel, &tx).is_ok());

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        assert!(matches!(
            watch_preconditions(&cancelled, &tx),
            Err(ConfigError::InvalidArgument { .. })
        ));

        drop(rx);
        assert!(matches!(
            watch_preconditions(&cancel, &tx),
            Err(ConfigError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_preconditions_outside_runtime() {
        let (tx, _rx) = ChangeSender::channel(1, Backpressure::Block);
        let err = watch_preconditions(&CancellationToken::new(), &tx).unwrap_err();
        assert!(matches!(err, ConfigError::WatcherError { .. }));
    }

    #[test]
    fn test_backpressure_from_settings() {
        assert_eq!(
            Backpressure::from(BackpressureSettings::BlockFor { timeout_ms: 10 }),
            Backpressure::BlockFor(Duration::from_millis(10))
        );
        assert_eq!(
            Backpressure::from(BackpressureSettings::default()),
            Backpressure::Block
        );
    }

    #[test]
    fn test_watcher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Arc<dyn Watcher>>();
    }
}
