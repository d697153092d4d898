// SPDX-License-Identifier: MIT OR Apache-2.0

//! Point and bulk lookups against key-value stores.

use crate::domain::Result;
use async_trait::async_trait;

/// Point lookup used while seeding.
///
/// Returns the value, or `None` when the key does not exist, together with the
/// store's version of that key (`0` when the store has no notion of versions).
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use harvestcfg::domain::Result;
/// use harvestcfg::ports::Getter;
/// use std::collections::HashMap;
///
/// struct Fixed(HashMap<String, String>);
///
/// #[async_trait]
/// impl Getter for Fixed {
///     async fn get(&self, key: &str) -> Result<(Option<String>, u64)> {
///         Ok((self.0.get(key).cloned(), 0))
///     }
/// }
/// ```
#[async_trait]
pub trait Getter: Send + Sync {
    /// Looks `key` up.
    async fn get(&self, key: &str) -> Result<(Option<String>, u64)>;
}

/// Bulk fetch of a fixed key set in one round trip, used by polling watchers.
#[async_trait]
pub trait MultiGet: Send + Sync {
    /// Fetches `keys`; the result has one entry per key, in the same order.
    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>>;
}
