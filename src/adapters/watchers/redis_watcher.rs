// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redis configuration watcher.
//!
//! Redis has no per-key revision, so this watcher polls: every interval it bulk
//! fetches a fixed key set, compares each value's content digest with the last
//! one it saw, and emits only the keys whose content changed. Versions are local
//! counters, one per key, incremented by exactly one per emitted change.

use crate::domain::{Change, ConfigError, Result, Source};
use crate::ports::watcher::watch_preconditions;
use crate::ports::{ChangeSender, MultiGet, SendOutcome, Watcher};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, Span};

/// Polling watcher for Redis keys.
///
/// # Examples
///
/// ```rust,no_run
/// use harvestcfg::adapters::RedisWatcher;
/// use harvestcfg::ports::{Backpressure, ChangeSender, Watcher};
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> harvestcfg::domain::Result<()> {
/// let watcher = RedisWatcher::connect(
///     "redis://127.0.0.1:6379",
///     Duration::from_millis(500),
///     vec!["app:log-level".to_string()],
/// )
/// .await?;
///
/// let (changes, mut rx) = ChangeSender::channel(1, Backpressure::Block);
/// let cancel = CancellationToken::new();
/// watcher.watch(cancel.clone(), changes)?;
///
/// if let Some(batch) = rx.recv().await {
///     println!("{:?}", batch);
/// }
/// cancel.cancel();
/// watcher.stopped().await;
/// # Ok(())
/// # }
/// ```
pub struct RedisWatcher {
    client: Arc<dyn MultiGet>,
    keys: Vec<String>,
    poll_interval: Duration,
    tracker: TaskTracker,
    span: Span,
}

impl RedisWatcher {
    /// Creates a watcher polling `keys` through `client` every `poll_interval`.
    ///
    /// Fails with [`ConfigError::InvalidArgument`] if the interval is zero or
    /// the key set is empty.
    pub fn new(client: Arc<dyn MultiGet>, poll_interval: Duration, keys: Vec<String>) -> Result<Self> {
        if poll_interval.is_zero() {
            return Err(ConfigError::invalid_argument(
                "poll interval should be a positive number",
            ));
        }
        if keys.is_empty() {
            return Err(ConfigError::invalid_argument("keys are empty"));
        }

        Ok(Self {
            client,
            keys,
            poll_interval,
            tracker: TaskTracker::new(),
            span: tracing::info_span!("redis_watcher"),
        })
    }

    /// Connects to the Redis server at `url` and creates a watcher for it.
    #[cfg(feature = "redis")]
    pub async fn connect(url: &str, poll_interval: Duration, keys: Vec<String>) -> Result<Self> {
        let store = crate::adapters::RedisStore::connect(url).await?;
        Self::new(Arc::new(store), poll_interval, keys)
    }

    /// Records this watcher's logs under `span` instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// The watched keys, in emission order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

#[async_trait]
impl Watcher for RedisWatcher {
    fn source(&self) -> Source {
        Source::Redis
    }

    fn watch(&self, cancel: CancellationToken, changes: ChangeSender) -> Result<()> {
        let handle = watch_preconditions(&cancel, &changes)?;

        let state = PollState::new(self.keys.clone());
        let client = Arc::clone(&self.client);
        let poll_interval = self.poll_interval;
        tracing::debug!(parent: &self.span, keys = ?self.keys, ?poll_interval, "starting redis poll loop");

        self.tracker.spawn_on(
            poll(client, state, poll_interval, cancel, changes).instrument(self.span.clone()),
            &handle,
        );
        Ok(())
    }

    async fn stopped(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

async fn poll(
    client: Arc<dyn MultiGet>,
    mut state: PollState,
    poll_interval: Duration,
    cancel: CancellationToken,
    changes: ChangeSender,
) {
    let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let values = tokio::select! {
            _ = cancel.cancelled() => break,
            result = client.multi_get(&state.keys) => match result {
                Ok(values) => values,
                Err(e) => {
                    tracing::error!(keys = ?state.keys, error = %e, "failed to MGET keys");
                    continue;
                }
            },
        };

        let pending = state.diff(&values);
        if pending.is_empty() {
            continue;
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = changes.send(pending.changes.clone()) => outcome,
        };
        match outcome {
            SendOutcome::Delivered => state.commit(&pending),
            SendOutcome::Dropped => {}
            SendOutcome::Closed => {
                tracing::debug!("change channel closed");
                break;
            }
        }
    }
    tracing::debug!("redis watcher stopping");
}

/// Per-key digest and version bookkeeping owned by a single poll loop.
#[derive(Debug)]
pub(crate) struct PollState {
    keys: Vec<String>,
    digests: Vec<Option<md5::Digest>>,
    versions: Vec<u64>,
}

/// Changes found by [`PollState::diff`], not yet committed.
#[derive(Debug, Default)]
pub(crate) struct PendingChanges {
    pub(crate) changes: Vec<Change>,
    updates: Vec<(usize, md5::Digest)>,
}

impl PendingChanges {
    pub(crate) fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl PollState {
    pub(crate) fn new(keys: Vec<String>) -> Self {
        let len = keys.len();
        Self {
            keys,
            digests: vec![None; len],
            versions: vec![0; len],
        }
    }

    /// Compares fetched `values` (one per key) against the last committed digests.
    pub(crate) fn diff(&self, values: &[Option<String>]) -> PendingChanges {
        let mut pending = PendingChanges::default();
        for (i, (key, value)) in self.keys.iter().zip(values).enumerate() {
            let Some(value) = value else {
                continue;
            };
            let digest = md5::compute(value.as_bytes());
            if self.digests[i] == Some(digest) {
                continue;
            }
            pending
                .changes
                .push(Change::new(Source::Redis, key.clone(), value.clone(), self.versions[i] + 1));
            pending.updates.push((i, digest));
        }
        pending
    }

    /// Records delivered changes: new digests and one version step per key.
    pub(crate) fn commit(&mut self, pending: &PendingChanges) {
        for (i, digest) in &pending.updates {
            self.digests[*i] = Some(*digest);
            self.versions[*i] += 1;
        }
    }

    #[cfg(test)]
    pub(crate) fn version(&self, i: usize) -> u64 {
        self.versions[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::Backpressure;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockStore {
        values: Mutex<HashMap<String, String>>,
        failing: AtomicBool,
        calls: AtomicUsize,
    }

    impl MockStore {
        fn with(pairs: &[(&str, &str)]) -> Arc<Self> {
            let store = Self::default();
            for (k, v) in pairs {
                store.set(k, v);
            }
            Arc::new(store)
        }

        fn set(&self, key: &str, value: &str) {
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
        }
    }

    #[async_trait]
    impl MultiGet for MockStore {
        async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(ConfigError::SourceError {
                    source_name: "redis".to_string(),
                    message: "connection reset".to_string(),
                    source: None,
                });
            }
            let values = self.values.lock().unwrap();
            Ok(keys.iter().map(|k| values.get(k).cloned()).collect())
        }
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_new_validates_arguments() {
        let store = MockStore::with(&[]);
        assert!(matches!(
            RedisWatcher::new(store.clone(), Duration::ZERO, keys(&["a"])),
            Err(ConfigError::InvalidArgument { .. })
        ));
        assert!(matches!(
            RedisWatcher::new(store.clone(), Duration::from_millis(10), vec![]),
            Err(ConfigError::InvalidArgument { .. })
        ));
        assert!(RedisWatcher::new(store, Duration::from_millis(10), keys(&["a"])).is_ok());
    }

    #[test]
    fn test_diff_skips_missing_and_unchanged_values() {
        let mut state = PollState::new(keys(&["a", "b", "c"]));
        let first = state.diff(&[Some("1".into()), None, Some("3".into())]);
        assert_eq!(
            first.changes,
            vec![
                Change::new(Source::Redis, "a", "1", 1),
                Change::new(Source::Redis, "c", "3", 1),
            ]
        );
        state.commit(&first);

        let again = state.diff(&[Some("1".into()), None, Some("3".into())]);
        assert!(again.is_empty());
        assert_eq!(state.version(0), 1);
        assert_eq!(state.version(1), 0);
    }

    #[test]
    fn test_uncommitted_diff_does_not_advance_versions() {
        let state = PollState::new(keys(&["a"]));
        let first = state.diff(&[Some("1".into())]);
        let retry = state.diff(&[Some("1".into())]);
        assert_eq!(first.changes, retry.changes);
        assert_eq!(state.version(0), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_only_changed_keys_between_ticks() {
        let store = MockStore::with(&[("a", "1"), ("b", "2")]);
        let watcher =
            RedisWatcher::new(store.clone(), Duration::from_millis(100), keys(&["a", "b"])).unwrap();
        let (tx, mut rx) = ChangeSender::channel(1, Backpressure::Block);
        let cancel = CancellationToken::new();
        watcher.watch(cancel.clone(), tx).unwrap();

        let batch = rx.recv().await.unwrap();
        assert_eq!(
            batch,
            vec![
                Change::new(Source::Redis, "a", "1", 1),
                Change::new(Source::Redis, "b", "2", 1),
            ]
        );

        store.set("b", "3");
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch, vec![Change::new(Source::Redis, "b", "3", 2)]);

        cancel.cancel();
        watcher.stopped().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_content_never_emits() {
        let store = MockStore::with(&[("a", "1")]);
        let watcher = RedisWatcher::new(store.clone(), Duration::from_millis(100), keys(&["a"])).unwrap();
        let (tx, mut rx) = ChangeSender::channel(1, Backpressure::Block);
        let cancel = CancellationToken::new();
        watcher.watch(cancel.clone(), tx).unwrap();

        rx.recv().await.unwrap();
        let quiet = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(quiet.is_err());
        assert!(store.calls.load(Ordering::SeqCst) >= 10);

        cancel.cancel();
        watcher.stopped().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_skips_tick_and_recovers() {
        let store = MockStore::with(&[("a", "1")]);
        store.failing.store(true, Ordering::SeqCst);
        let watcher = RedisWatcher::new(store.clone(), Duration::from_millis(100), keys(&["a"])).unwrap();
        let (tx, mut rx) = ChangeSender::channel(1, Backpressure::Block);
        let cancel = CancellationToken::new();
        watcher.watch(cancel.clone(), tx).unwrap();

        let quiet = tokio::time::timeout(Duration::from_millis(450), rx.recv()).await;
        assert!(quiet.is_err());

        store.failing.store(false, Ordering::SeqCst);
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch, vec![Change::new(Source::Redis, "a", "1", 1)]);

        cancel.cancel();
        watcher.stopped().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_batch_is_re_emitted_with_same_version() {
        let store = MockStore::with(&[("a", "1"), ("b", "2")]);
        let watcher =
            RedisWatcher::new(store.clone(), Duration::from_millis(100), keys(&["a", "b"])).unwrap();
        let (tx, mut rx) = ChangeSender::channel(1, Backpressure::DropNewest);
        let cancel = CancellationToken::new();
        watcher.watch(cancel.clone(), tx.clone()).unwrap();

        // Let the first batch fill the channel, then change a key while it is full.
        tokio::time::sleep(Duration::from_millis(150)).await;
        store.set("a", "9");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(tx.dropped_batches() >= 1);

        let first = rx.recv().await.unwrap();
        assert_eq!(first[0], Change::new(Source::Redis, "a", "1", 1));

        let second = rx.recv().await.unwrap();
        assert_eq!(second, vec![Change::new(Source::Redis, "a", "9", 2)]);

        cancel.cancel();
        watcher.stopped().await;
    }

    #[tokio::test]
    async fn test_watch_rejects_closed_channel() {
        let store = MockStore::with(&[("a", "1")]);
        let watcher = RedisWatcher::new(store, Duration::from_millis(100), keys(&["a"])).unwrap();
        let (tx, rx) = ChangeSender::channel(1, Backpressure::Block);
        drop(rx);
        let err = watcher.watch(CancellationToken::new(), tx).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidArgument { .. }));
    }
}
