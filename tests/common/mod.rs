// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared helpers for integration tests: Docker detection and in-memory stores
//! and watchers.

#![allow(dead_code)]

use async_trait::async_trait;
use harvestcfg::domain::{Change, ConfigError, Result, Source};
use harvestcfg::ports::{ChangeSender, Getter, MultiGet, SendOutcome, Watcher};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use tokio_util::sync::CancellationToken;

/// Cached result of Docker availability check.
static DOCKER_AVAILABLE: OnceLock<bool> = OnceLock::new();

/// Checks if Docker is available on the system.
///
/// This check is cached after the first call.
pub fn is_docker_available() -> bool {
    *DOCKER_AVAILABLE.get_or_init(|| {
        std::process::Command::new("docker")
            .args(["ps"])
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    })
}

/// Prints a warning message that a test is skipped due to Docker being unavailable.
pub fn print_docker_unavailable_warning(test_name: &str) {
    eprintln!("\n⚠️  SKIPPED: {} - Docker is not available", test_name);
    eprintln!("   To run this test, ensure Docker is installed and running.");
    eprintln!("   Installation: https://docs.docker.com/get-docker/\n");
}

/// Installs a test subscriber so `RUST_LOG`-style output shows up with `--nocapture`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// In-memory key-value store usable as both a getter and a bulk reader.
#[derive(Default)]
pub struct MockStore {
    values: Mutex<HashMap<String, (String, u64)>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: &str) {
        self.set_versioned(key, value, 0);
    }

    pub fn set_versioned(&self, key: &str, value: &str, version: u64) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), version));
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ConfigError::SourceError {
                source_name: "mock".to_string(),
                message: "store unavailable".to_string(),
                source: None,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Getter for MockStore {
    async fn get(&self, key: &str) -> Result<(Option<String>, u64)> {
        self.check()?;
        Ok(match self.values.lock().unwrap().get(key) {
            Some((value, version)) => (Some(value.clone()), *version),
            None => (None, 0),
        })
    }
}

#[async_trait]
impl MultiGet for MockStore {
    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.check()?;
        let values = self.values.lock().unwrap();
        Ok(keys
            .iter()
            .map(|k| values.get(k).map(|(v, _)| v.clone()))
            .collect())
    }
}

/// Watcher driven by the test: batches are pushed through [`ManualWatcher::emit`].
pub struct ManualWatcher {
    source: Source,
    sender: Mutex<Option<ChangeSender>>,
    started: AtomicBool,
}

impl ManualWatcher {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            sender: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub async fn emit(&self, batch: Vec<Change>) -> SendOutcome {
        let sender = self.sender.lock().unwrap().clone();
        match sender {
            Some(sender) => sender.send(batch).await,
            None => SendOutcome::Closed,
        }
    }
}

#[async_trait]
impl Watcher for ManualWatcher {
    fn source(&self) -> Source {
        self.source
    }

    fn watch(&self, _cancel: CancellationToken, changes: ChangeSender) -> Result<()> {
        *self.sender.lock().unwrap() = Some(changes);
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stopped(&self) {
        self.sender.lock().unwrap().take();
    }
}

/// Watcher whose start always fails.
pub struct FailingWatcher(pub Source);

#[async_trait]
impl Watcher for FailingWatcher {
    fn source(&self) -> Source {
        self.0
    }

    fn watch(&self, _cancel: CancellationToken, _changes: ChangeSender) -> Result<()> {
        Err(ConfigError::WatcherError {
            message: format!("{} watcher refused to start", self.0),
            source: None,
        })
    }

    async fn stopped(&self) {}
}
