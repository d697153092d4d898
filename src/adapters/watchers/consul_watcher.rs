// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consul configuration watcher.
//!
//! Runs one blocking-query plan per [`WatchItem`]. Each plan holds a request
//! open until the data moves past the last seen index, then turns the new
//! payload into a change batch:
//!
//! - a key plan emits one change under the bare key, versioned by the entry's
//!   `ModifyIndex`
//! - a prefix plan re-emits every entry under the prefix on each trigger
//!
//! Every failed query is retried until the plan is cancelled, waiting the
//! retry interval times the square of the consecutive failures, capped at four
//! intervals. A plan that cannot be set up ends on its own; the remaining plans
//! keep running.

use crate::adapters::consul::{ConsulClient, ConsulError, QueryKind, QueryResponse, WatchPayload};
use crate::domain::{Change, ConfigError, Result, Source};
use crate::ports::watcher::watch_preconditions;
use crate::ports::{ChangeSender, SendOutcome, Watcher};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, Span};

/// Delay before the first retry of a failed query.
const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// The retry delay never exceeds this many retry intervals.
const MAX_BACKOFF_FACTOR: u32 = 4;

/// One thing to watch in Consul.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchItem {
    /// A single key, optionally stored under a folder prefix. Changes are
    /// reported under `key` alone.
    Key {
        /// The key fields are bound to
        key: String,
        /// Folder the key lives in, if any
        prefix: Option<String>,
    },
    /// Every key under a prefix. Changes are reported under each entry's full key.
    Prefix(String),
}

impl WatchItem {
    /// Watches `key` at the root of the KV store.
    pub fn key(key: impl Into<String>) -> Self {
        WatchItem::Key {
            key: key.into(),
            prefix: None,
        }
    }

    /// Watches `key` stored under the folder `prefix`.
    pub fn key_with_prefix(key: impl Into<String>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        WatchItem::Key {
            key: key.into(),
            prefix: (!prefix.is_empty()).then_some(prefix),
        }
    }

    /// Watches every key under `prefix`.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        WatchItem::Prefix(prefix.into())
    }

    /// The query shape for this item.
    pub fn kind(&self) -> QueryKind {
        match self {
            WatchItem::Key { .. } => QueryKind::Key,
            WatchItem::Prefix(_) => QueryKind::KeyPrefix,
        }
    }

    /// The KV path queried for this item.
    pub fn path(&self) -> String {
        match self {
            WatchItem::Key { key, prefix: None } => key.clone(),
            WatchItem::Key {
                key,
                prefix: Some(prefix),
            } => join_path(prefix, key),
            WatchItem::Prefix(prefix) => prefix.clone(),
        }
    }
}

/// Joins KV path segments, collapsing repeated and trailing slashes.
fn join_path(prefix: &str, key: &str) -> String {
    prefix
        .split('/')
        .chain(key.split('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn retry_backoff(interval: Duration, failures: u32) -> Duration {
    let max = interval.saturating_mul(MAX_BACKOFF_FACTOR);
    let factor = failures.min(MAX_BACKOFF_FACTOR).saturating_mul(failures.min(MAX_BACKOFF_FACTOR));
    interval.saturating_mul(factor).min(max)
}

/// Blocking-query watcher for Consul KV.
///
/// # Examples
///
/// ```rust,no_run
/// use harvestcfg::adapters::{ConsulWatcher, WatchItem};
/// use harvestcfg::ports::{Backpressure, ChangeSender, Watcher};
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> harvestcfg::domain::Result<()> {
/// let watcher = ConsulWatcher::new(
///     "127.0.0.1:8500",
///     "",
///     "",
///     Some(Duration::from_secs(30)),
///     vec![WatchItem::key("log-level"), WatchItem::prefix("features/")],
/// )?;
///
/// let (changes, mut rx) = ChangeSender::channel(1, Backpressure::Block);
/// let cancel = CancellationToken::new();
/// watcher.watch(cancel.clone(), changes)?;
///
/// while let Some(batch) = rx.recv().await {
///     println!("{:?}", batch);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ConsulWatcher {
    client: ConsulClient,
    items: Vec<WatchItem>,
    retry_interval: Duration,
    tracker: TaskTracker,
    span: Span,
}

impl ConsulWatcher {
    /// Creates a watcher for `items` on the agent at `address`.
    ///
    /// Fails with [`ConfigError::InvalidArgument`] if `address` or `items` is empty.
    pub fn new(
        address: &str,
        datacenter: &str,
        token: &str,
        wait: Option<Duration>,
        items: Vec<WatchItem>,
    ) -> Result<Self> {
        let client = ConsulClient::new(address, datacenter, token, wait)?;
        Self::from_client(client, items)
    }

    /// Creates a watcher sharing an existing client.
    pub fn from_client(client: ConsulClient, items: Vec<WatchItem>) -> Result<Self> {
        if items.is_empty() {
            return Err(ConfigError::invalid_argument("watch items are empty"));
        }
        Ok(Self {
            client,
            items,
            retry_interval: RETRY_INTERVAL,
            tracker: TaskTracker::new(),
            span: tracing::info_span!("consul_watcher"),
        })
    }

    /// Records this watcher's logs under `span` instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Sets the base delay between retries of a failed query (default 5s).
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// The watched items.
    pub fn items(&self) -> &[WatchItem] {
        &self.items
    }
}

#[async_trait]
impl Watcher for ConsulWatcher {
    fn source(&self) -> Source {
        Source::Consul
    }

    fn watch(&self, cancel: CancellationToken, changes: ChangeSender) -> Result<()> {
        let handle = watch_preconditions(&cancel, &changes)?;

        for item in &self.items {
            let span = tracing::info_span!(
                parent: &self.span,
                "plan",
                kind = item.kind().as_str(),
                path = %item.path()
            );
            let task = run_plan(
                self.client.clone(),
                item.clone(),
                self.retry_interval,
                cancel.clone(),
                changes.clone(),
            );
            self.tracker.spawn_on(task.instrument(span), &handle);
        }

        let plans = self.items.len();
        self.tracker.spawn_on(
            async move {
                cancel.cancelled().await;
                tracing::debug!(plans, "stop requested for watch plans");
            }
            .instrument(self.span.clone()),
            &handle,
        );
        Ok(())
    }

    async fn stopped(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

async fn run_plan(
    client: ConsulClient,
    item: WatchItem,
    retry_interval: Duration,
    cancel: CancellationToken,
    changes: ChangeSender,
) {
    let mut plan = match Plan::parse(item) {
        Ok(plan) => plan,
        Err((item, e)) => {
            tracing::error!(
                error = %e,
                "plan {} of type {} failed",
                item.path(),
                item.kind().as_str()
            );
            return;
        }
    };
    plan_loop(&client, &mut plan, retry_interval, &cancel, &changes).await;
    tracing::debug!("watch plan stopped");
}

async fn plan_loop(
    client: &ConsulClient,
    plan: &mut Plan,
    retry_interval: Duration,
    cancel: &CancellationToken,
    changes: &ChangeSender,
) {
    let mut failures: u32 = 0;
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = client.query(plan.kind, &plan.path, plan.last_index) => result,
        };

        let response = match result {
            Ok(response) => {
                failures = 0;
                response
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                let backoff = retry_backoff(retry_interval, failures);
                log_query_error(&e, failures, backoff);
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(backoff) => continue,
                }
            }
        };

        let Some(payload) = plan.observe(response) else {
            continue;
        };
        let Some(batch) = plan.changes(payload) else {
            continue;
        };

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return,
            outcome = changes.send(batch) => outcome,
        };
        if outcome == SendOutcome::Closed {
            tracing::debug!("change channel closed");
            return;
        }
    }
}

fn log_query_error(e: &ConsulError, failures: u32, backoff: Duration) {
    if e.is_transient() {
        tracing::warn!(error = %e, failures, ?backoff, "watch query failed, retrying");
    } else {
        tracing::error!(error = %e, failures, ?backoff, "watch query rejected, retrying");
    }
}

/// State of one blocking-query plan.
#[derive(Debug)]
pub(crate) struct Plan {
    item: WatchItem,
    kind: QueryKind,
    path: String,
    last_index: u64,
    last_payload: Option<Option<WatchPayload>>,
}

impl Plan {
    /// Builds a plan, rejecting items with nothing to query.
    pub(crate) fn parse(item: WatchItem) -> std::result::Result<Self, (WatchItem, ConfigError)> {
        let empty = match &item {
            WatchItem::Key { key, .. } => key.trim_matches('/').is_empty(),
            WatchItem::Prefix(_) => false,
        };
        if empty {
            return Err((item, ConfigError::invalid_argument("watched key is empty")));
        }
        Ok(Self::new(item))
    }

    pub(crate) fn new(item: WatchItem) -> Self {
        Self {
            kind: item.kind(),
            path: item.path(),
            item,
            last_index: 0,
            last_payload: None,
        }
    }

    /// Advances the index and returns the payload if the handler should fire.
    ///
    /// The first response always fires. Afterwards a response fires only if its
    /// index moved and its payload differs from the last one handled. An index
    /// that goes backwards resets the plan to a non-blocking query.
    pub(crate) fn observe(&mut self, response: QueryResponse) -> Option<Option<WatchPayload>> {
        let seen = self.last_payload.is_some();
        if seen && response.index == self.last_index {
            return None;
        }

        let previous = self.last_index;
        self.last_index = if response.index < previous {
            0
        } else {
            response.index
        };

        if self.last_payload.as_ref() == Some(&response.payload) {
            return None;
        }
        self.last_payload = Some(response.payload.clone());
        Some(response.payload)
    }

    /// Maps a payload to the batch it produces, if any.
    pub(crate) fn changes(&self, payload: Option<WatchPayload>) -> Option<Vec<Change>> {
        match (&self.item, payload?) {
            (WatchItem::Key { key, .. }, WatchPayload::Entry(entry)) => Some(vec![Change::new(
                Source::Consul,
                key.clone(),
                entry.value,
                entry.modify_index,
            )]),
            (WatchItem::Prefix(_), WatchPayload::Entries(entries)) => {
                if entries.is_empty() {
                    return None;
                }
                Some(
                    entries
                        .into_iter()
                        .map(|e| Change::new(Source::Consul, e.key, e.value, e.modify_index))
                        .collect(),
                )
            }
            (_, other) => {
                tracing::error!(payload = ?other, "unexpected payload for watch plan");
                None
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn last_index(&self) -> u64 {
        self.last_index
    }
}
