// SPDX-License-Identifier: MIT OR Apache-2.0

//! A hexagonal architecture configuration harvesting crate.
//!
//! This crate seeds a set of typed, named configuration fields from a layered
//! list of sources (literal seeds, environment variables, command-line flags,
//! files, Consul and Redis) and then keeps them current at runtime by watching
//! the stores for changes.
//!
//! # Architecture
//!
//! The crate follows hexagonal architecture principles:
//!
//! - **Domain Layer**: Core types (`Source`, `Change`, `Field`, `Config`, errors)
//! - **Ports**: Trait definitions (`Watcher`, `Getter`, `MultiGet`) and the change channel
//! - **Adapters**: Consul and Redis clients and the watchers built on them
//! - **Service**: The `Seeder`, the `Monitor` and the `Harvester` that runs both
//!
//! # Change flow
//!
//! Each watcher emits batches of [`domain::Change`] into one bounded channel.
//! The monitor routes every change by `(source, key)` to its field, and the
//! field applies it only if its version is newer than the last one applied.
//!
//! # Feature Flags
//!
//! - `yaml`: Load harvester settings from YAML files (default)
//! - `consul`: Consul seeding and blocking-query watching (default)
//! - `redis`: Redis seeding and polling (default)
//! - `reload`: Watch file-bound fields for changes
//! - `remote`: Enable all remote sources (consul + redis)
//! - `full`: Enable all features
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use harvestcfg::prelude::*;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let level = Value::<String>::shared(String::new());
//! let retention = Value::<i64>::shared(0);
//!
//! let config = Config::builder()
//!     .field(
//!         Field::builder("log_level", level.clone())
//!             .seed("INFO")
//!             .env("LOG_LEVEL")
//!             .flag("loglevel")
//!             .consul("app/log-level")
//!             .build(),
//!     )
//!     .field(
//!         Field::builder("cache_retention", retention.clone())
//!             .seed("43200")
//!             .redis("app:cache-retention")
//!             .build(),
//!     )
//!     .build()?;
//!
//! let harvester = Harvester::builder(config)
//!     .with_consul_seed("127.0.0.1:8500", "", "", None)
//!     .with_consul_monitor("127.0.0.1:8500", "", "", None)
//!     .with_redis_seed("redis://127.0.0.1:6379")
//!     .with_redis_monitor("redis://127.0.0.1:6379", Duration::from_secs(1))
//!     .build()
//!     .await?;
//!
//! let cancel = CancellationToken::new();
//! harvester.harvest(cancel.clone()).await?;
//! println!("{} {}", level.get(), retention.get());
//!
//! cancel.cancel();
//! harvester.stopped().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![warn(clippy::all)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

/// Commonly used types and traits.
///
/// This module re-exports the most commonly used types and traits for convenient access.
pub mod prelude {
    pub use crate::domain::{
        Change, Config, ConfigError, Field, FieldValue, Result, Settings, Source, Value,
    };
    pub use crate::ports::{Backpressure, ChangeSender, Getter, MultiGet, SendOutcome, Watcher};
    pub use crate::service::{Harvester, Monitor, Seeder};

    // Re-export adapters based on feature flags
    #[cfg(feature = "consul")]
    pub use crate::adapters::{ConsulGetter, ConsulWatcher, WatchItem};
    #[cfg(feature = "reload")]
    pub use crate::adapters::FileWatcher;
    #[cfg(feature = "redis")]
    pub use crate::adapters::RedisStore;
    pub use crate::adapters::RedisWatcher;
    #[cfg(feature = "yaml")]
    pub use crate::adapters::SettingsFile;
}
