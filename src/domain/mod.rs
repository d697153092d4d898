// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain layer containing the core types.
//!
//! Sources, change events, fields and their typed values, the declared
//! configuration schema, harvester settings and errors. Nothing here performs
//! I/O.

pub mod change;
pub mod config;
pub mod errors;
pub mod field;
pub mod settings;
pub mod source;
pub mod value;

// Re-export commonly used types
pub use change::Change;
pub use config::{Config, ConfigBuilder};
pub use errors::{ConfigError, Result};
pub use field::{Field, FieldBuilder};
pub use settings::{
    BackpressureSettings, ConsulSettings, MonitorSettings, RedisSettings, Settings,
};
pub use source::Source;
pub use value::{FieldValue, ParseValue, Value};
