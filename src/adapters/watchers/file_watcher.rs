// SPDX-License-Identifier: MIT OR Apache-2.0

//! File system watcher for file-bound fields.
//!
//! Watches the parent directory of every file (watching files directly is
//! unreliable with editors that replace them), debounces bursts of events, and
//! emits a change only when a file's content digest actually moved.

use crate::domain::{Change, ConfigError, Result, Source};
use crate::ports::watcher::watch_preconditions;
use crate::ports::{ChangeSender, SendOutcome, Watcher};
use async_trait::async_trait;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as _};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, Span};

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Watcher emitting the full contents of files whenever they change.
///
/// Each change is keyed by the path exactly as given, which is the key
/// file-bound fields declare.
///
/// # Examples
///
/// ```rust,no_run
/// use harvestcfg::adapters::FileWatcher;
/// use harvestcfg::ports::{Backpressure, ChangeSender, Watcher};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> harvestcfg::domain::Result<()> {
/// let watcher = FileWatcher::new(vec!["/etc/app/log-level".to_string()])?;
///
/// let (changes, mut rx) = ChangeSender::channel(1, Backpressure::Block);
/// let cancel = CancellationToken::new();
/// watcher.watch(cancel.clone(), changes)?;
///
/// if let Some(batch) = rx.recv().await {
///     println!("{:?}", batch);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileWatcher {
    paths: Vec<String>,
    debounce: Duration,
    tracker: TaskTracker,
    span: Span,
}

impl FileWatcher {
    /// Creates a watcher for `paths`. Every path must exist.
    pub fn new(paths: Vec<String>) -> Result<Self> {
        if paths.is_empty() {
            return Err(ConfigError::invalid_argument("paths are empty"));
        }
        for path in &paths {
            if !Path::new(path).exists() {
                return Err(ConfigError::WatcherError {
                    message: format!("File does not exist: {}", path),
                    source: None,
                });
            }
        }

        Ok(Self {
            paths,
            debounce: DEFAULT_DEBOUNCE,
            tracker: TaskTracker::new(),
            span: tracing::info_span!("file_watcher"),
        })
    }

    /// Sets how long to wait for a burst of events to settle (default 500ms).
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Records this watcher's logs under `span` instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    fn parent_dirs(&self) -> BTreeSet<PathBuf> {
        self.paths
            .iter()
            .map(|p| match Path::new(p).parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            })
            .collect()
    }
}

#[async_trait]
impl Watcher for FileWatcher {
    fn source(&self) -> Source {
        Source::File
    }

    fn watch(&self, cancel: CancellationToken, changes: ChangeSender) -> Result<()> {
        let handle = watch_preconditions(&cancel, &changes)?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |event: notify::Result<Event>| {
                let _ = event_tx.send(event);
            },
            notify::Config::default(),
        )
        .map_err(|e| ConfigError::WatcherError {
            message: format!("Failed to create file watcher: {}", e),
            source: Some(Box::new(e)),
        })?;

        for dir in self.parent_dirs() {
            watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .map_err(|e| ConfigError::WatcherError {
                    message: format!("Failed to start watching {}: {}", dir.display(), e),
                    source: Some(Box::new(e)),
                })?;
        }

        let state = FileState::primed(self.paths.clone());
        self.tracker.spawn_on(
            run(watcher, event_rx, state, self.debounce, cancel, changes)
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

async fn run(
    // Dropping the notify watcher stops event delivery, so the task owns it.
    _watcher: RecommendedWatcher,
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    mut state: FileState,
    debounce: Duration,
    cancel: CancellationToken,
    changes: ChangeSender,
) {
    let mut deadline: Option<Instant> = None;

    loop {
        let settle = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(Ok(event)) => {
                    if deadline.is_none() && state.is_relevant(&event) {
                        deadline = Some(Instant::now() + debounce);
                    }
                }
                Some(Err(e)) => tracing::warn!(error = %e, "file watch error"),
                None => break,
            },
            _ = settle => {
                deadline = None;
                let pending = state.diff();
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
                    SendOutcome::Closed => break,
                }
            }
        }
    }
    tracing::debug!("file watcher stopping");
}

#[derive(Debug)]
struct FileState {
    paths: Vec<String>,
    digests: Vec<Option<md5::Digest>>,
    versions: Vec<u64>,
}

#[derive(Debug, Default)]
struct PendingChanges {
    changes: Vec<Change>,
    updates: Vec<(usize, md5::Digest)>,
}

impl PendingChanges {
    fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl FileState {
    /// Records the current digest of each file so only later edits are reported.
    fn primed(paths: Vec<String>) -> Self {
        let digests = paths
            .iter()
            .map(|p| std::fs::read(p).ok().map(md5::compute))
            .collect();
        let versions = vec![0; paths.len()];
        Self {
            paths,
            digests,
            versions,
        }
    }

    fn is_relevant(&self, event: &Event) -> bool {
        event.paths.iter().any(|changed| {
            self.paths
                .iter()
                .any(|p| Path::new(p).file_name() == changed.file_name())
        })
    }

    fn diff(&self) -> PendingChanges {
        let mut pending = PendingChanges::default();
        for (i, path) in self.paths.iter().enumerate() {
            let contents = match std::fs::read(path) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    tracing::error!(path = %path, error = %e, "failed to read file");
                    continue;
                }
            };
            let digest = md5::compute(contents.as_bytes());
            if self.digests[i] == Some(digest) {
                continue;
            }
            pending
                .changes
                .push(Change::new(Source::File, path.clone(), contents, self.versions[i] + 1));
            pending.updates.push((i, digest));
        }
        pending
    }

    fn commit(&mut self, pending: &PendingChanges) {
        for (i, digest) in &pending.updates {
            self.digests[*i] = Some(*digest);
            self.versions[*i] += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::Backpressure;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> String {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_new_requires_existing_paths() {
        assert!(matches!(
            FileWatcher::new(vec![]),
            Err(ConfigError::InvalidArgument { .. })
        ));
        assert!(matches!(
            FileWatcher::new(vec!["/nonexistent/path/to/file".to_string()]),
            Err(ConfigError::WatcherError { .. })
        ));
    }

    #[test]
    fn test_primed_state_reports_only_edits() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a", "one");
        let b = write(&dir, "b", "two");

        let mut state = FileState::primed(vec![a.clone(), b]);
        assert!(state.diff().is_empty());

        fs::write(&a, "three").unwrap();
        let pending = state.diff();
        assert_eq!(
            pending.changes,
            vec![Change::new(Source::File, a.clone(), "three", 1)]
        );
        state.commit(&pending);
        assert!(state.diff().is_empty());

        fs::write(&a, "four").unwrap();
        assert_eq!(state.diff().changes[0].version(), 2);
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a", "one");
        let state = FileState::primed(vec![a.clone()]);
        fs::remove_file(&a).unwrap();
        assert!(state.diff().is_empty());
    }

    #[tokio::test]
    async fn test_emits_on_file_change() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "log-level", "INFO");

        let watcher = FileWatcher::new(vec![path.clone()])
            .unwrap()
            .with_debounce(Duration::from_millis(50));
        let (tx, mut rx) = ChangeSender::channel(1, Backpressure::Block);
        let cancel = CancellationToken::new();
        watcher.watch(cancel.clone(), tx).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&path, "DEBUG").unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch, vec![Change::new(Source::File, path, "DEBUG", 1)]);

        cancel.cancel();
        watcher.stopped().await;
    }
}
