// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provenance of configuration values.

use crate::domain::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a configuration value comes from.
///
/// The set is closed. Sources are ordered by declaration; the order in which
/// they are applied while seeding is described on `Seeder`.
///
/// # Examples
///
/// ```
/// use harvestcfg::domain::Source;
///
/// let source: Source = "consul".parse().unwrap();
/// assert_eq!(source, Source::Consul);
/// assert_eq!(source.to_string(), "consul");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// A static literal declared with the field
    Seed,
    /// A process environment variable
    Env,
    /// A command-line flag
    Flag,
    /// The whole contents of a file
    File,
    /// A Consul KV key
    Consul,
    /// A Redis key
    Redis,
}

impl Source {
    /// Every source, in declaration order.
    pub const ALL: [Source; 6] = [
        Source::Seed,
        Source::Env,
        Source::Flag,
        Source::File,
        Source::Consul,
        Source::Redis,
    ];

    /// Returns the stable identifier used in logs and settings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Seed => "seed",
            Source::Env => "env",
            Source::Flag => "flag",
            Source::File => "file",
            Source::Consul => "consul",
            Source::Redis => "redis",
        }
    }

    /// Returns `true` for sources a watcher can report changes for at runtime.
    pub fn is_monitored(&self) -> bool {
        matches!(self, Source::File | Source::Consul | Source::Redis)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| ConfigError::invalid_argument(format!("unknown source: {}", s)))
    }
}
