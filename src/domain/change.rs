// SPDX-License-Identifier: MIT OR Apache-2.0

//! The change event emitted by watchers.

use crate::domain::Source;
use serde::Serialize;

/// One observed update of a key in a source.
///
/// Changes are immutable once created. Watchers emit them in batches
/// (`Vec<Change>`) that keep the watcher's own key order.
///
/// # Examples
///
/// ```
/// use harvestcfg::domain::{Change, Source};
///
/// let change = Change::new(Source::Redis, "app:level", "INFO", 3);
/// assert_eq!(change.key(), "app:level");
/// assert_eq!(change.version(), 3);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Change {
    source: Source,
    key: String,
    value: String,
    version: u64,
}

impl Change {
    /// Creates a new change.
    pub fn new(source: Source, key: impl Into<String>, value: impl Into<String>, version: u64) -> Self {
        Self {
            source,
            key: key.into(),
            value: value.into(),
            version,
        }
    }

    /// The source that produced the change.
    pub fn source(&self) -> Source {
        self.source
    }

    /// The source-specific key that changed.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The new raw text value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The version reported by the producer. Its meaning is source specific.
    pub fn version(&self) -> u64 {
        self.version
    }
}
