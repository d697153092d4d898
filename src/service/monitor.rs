// SPDX-License-Identifier: MIT OR Apache-2.0

//! Change routing.
//!
//! The monitor owns a routing table from `(source, key)` to the field bound to
//! it, starts every watcher against one shared change channel, and applies each
//! incoming change to its field.

use crate::domain::{Change, Config, ConfigError, Field, Result, Source};
use crate::ports::{Backpressure, ChangeSender, Watcher};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, Span};

type Routes = HashMap<Source, HashMap<String, Arc<Field>>>;

/// Routes changes from a set of watchers to the fields they belong to.
///
/// # Examples
///
/// ```rust,no_run
/// use harvestcfg::adapters::RedisWatcher;
/// use harvestcfg::domain::{Config, Field, Value};
/// use harvestcfg::ports::Watcher;
/// use harvestcfg::service::Monitor;
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> harvestcfg::domain::Result<()> {
/// let level = Value::<String>::shared("INFO".to_string());
/// let config = Config::builder()
///     .field(Field::builder("log_level", level.clone()).redis("app:log-level").build())
///     .build()?;
///
/// let watcher = RedisWatcher::connect(
///     "redis://127.0.0.1:6379",
///     Duration::from_secs(1),
///     config.keys_for(harvestcfg::domain::Source::Redis),
/// )
/// .await?;
/// let watchers: Vec<Arc<dyn Watcher>> = vec![Arc::new(watcher)];
///
/// let monitor = Monitor::new(&config, watchers)?;
/// let cancel = CancellationToken::new();
/// monitor.monitor(cancel.clone())?;
///
/// // ... later
/// cancel.cancel();
/// monitor.stopped().await;
/// # Ok(())
/// # }
/// ```
pub struct Monitor {
    routes: Arc<Routes>,
    watchers: Vec<Arc<dyn Watcher>>,
    capacity: usize,
    backpressure: Backpressure,
    started: AtomicBool,
    tracker: TaskTracker,
    span: Span,
}

impl Monitor {
    /// Builds the routing table for `config` and takes ownership of `watchers`.
    ///
    /// Fails with [`ConfigError::InvalidArgument`] when `watchers` is empty and
    /// with [`ConfigError::DuplicateKey`] when two fields claim the same key of
    /// the same source.
    pub fn new(config: &Config, watchers: Vec<Arc<dyn Watcher>>) -> Result<Self> {
        if watchers.is_empty() {
            return Err(ConfigError::invalid_argument("watchers are empty"));
        }

        let span = tracing::info_span!("monitor");
        let routes = build_routes(config, &span)?;

        Ok(Self {
            routes: Arc::new(routes),
            watchers,
            capacity: 1,
            backpressure: Backpressure::default(),
            started: AtomicBool::new(false),
            tracker: TaskTracker::new(),
            span,
        })
    }

    /// Sets how many batches the change channel buffers (default 1).
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Sets what watchers do when the channel is full (default: block).
    pub fn with_backpressure(mut self, backpressure: Backpressure) -> Self {
        self.backpressure = backpressure;
        self
    }

    /// Records the dispatch loop's logs under `span` instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Starts dispatching and then every watcher, in order.
    ///
    /// Returns the first watcher start failure. Watchers started before the
    /// failing one keep running until `cancel` fires.
    pub fn monitor(&self, cancel: CancellationToken) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ConfigError::WatcherError {
                message: "monitor already started".to_string(),
                source: None,
            });
        }
        let handle = Handle::try_current().map_err(|e| ConfigError::WatcherError {
            message: "monitor must be started inside a tokio runtime".to_string(),
            source: Some(Box::new(e)),
        })?;

        let (changes, rx) = ChangeSender::channel(self.capacity, self.backpressure);
        self.tracker.spawn_on(
            dispatch(Arc::clone(&self.routes), rx, cancel.clone()).instrument(self.span.clone()),
            &handle,
        );

        for watcher in &self.watchers {
            if let Err(e) = watcher.watch(cancel.clone(), changes.clone()) {
                tracing::error!(parent: &self.span, source = %watcher.source(), error = %e, "failed to start watcher");
                return Err(e);
            }
            tracing::debug!(parent: &self.span, source = %watcher.source(), "watcher started");
        }
        Ok(())
    }

    /// Applies one batch of changes to the fields they are routed to.
    ///
    /// Changes for unknown sources or keys are dropped; a change the field
    /// rejects is logged and the rest of the batch still applies.
    pub fn apply(&self, batch: &[Change]) {
        let _entered = self.span.enter();
        apply_batch(&self.routes, batch);
    }

    /// Resolves once the dispatch loop and every watcher have exited.
    pub async fn stopped(&self) {
        for watcher in &self.watchers {
            watcher.stopped().await;
        }
        self.tracker.close();
        self.tracker.wait().await;
    }
}

fn build_routes(config: &Config, span: &Span) -> Result<Routes> {
    let mut routes: Routes = HashMap::new();
    for field in config.fields() {
        let mut monitored = Vec::new();
        for (source, key) in field.sources() {
            if *source == Source::Seed {
                continue;
            }
            let keys = routes.entry(*source).or_default();
            if keys.contains_key(key) {
                return Err(ConfigError::DuplicateKey {
                    origin: *source,
                    key: key.clone(),
                });
            }
            keys.insert(key.clone(), Arc::clone(field));
            if source.is_monitored() {
                monitored.push(*source);
            }
        }
        if monitored.len() > 1 {
            tracing::warn!(
                parent: span,
                field = field.name(),
                sources = ?monitored,
                "field is monitored from more than one source, their versions are not comparable"
            );
        }
    }
    Ok(routes)
}

fn apply_batch(routes: &Routes, batch: &[Change]) {
    for change in batch {
        let Some(field) = routes
            .get(&change.source())
            .and_then(|keys| keys.get(change.key()))
        else {
            tracing::debug!(
                source = %change.source(),
                key = change.key(),
                "no field registered for change, dropping"
            );
            continue;
        };

        if let Err(e) = field.set(change.value(), change.version()) {
            tracing::error!(
                field = field.name(),
                source = %change.source(),
                key = change.key(),
                version = change.version(),
                error = %e,
                "failed to apply change"
            );
        }
    }
}

async fn dispatch(routes: Arc<Routes>, mut rx: mpsc::Receiver<Vec<Change>>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("stopping dispatch");
                break;
            }
            batch = rx.recv() => match batch {
                Some(batch) => apply_batch(&routes, &batch),
                None => {
                    tracing::debug!("all watchers gone, stopping dispatch");
                    break;
                }
            },
        }
    }
}
