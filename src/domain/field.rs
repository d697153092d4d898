// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named, version-gated configuration fields.

use crate::domain::errors::{ConfigError, Result};
use crate::domain::{FieldValue, Source};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// A named configuration cell bound to one key per source.
///
/// A field is declared once at startup, seeded once, and then updated in place
/// by the monitor for the lifetime of the process.
///
/// # Version gate
///
/// [`Field::set`] with version `0` always applies; seeding uses it. Any other
/// version only applies when it is strictly greater than the version of the
/// last applied update, so redundant and stale notifications are ignored.
///
/// # Examples
///
/// ```
/// use harvestcfg::domain::{Field, Value};
///
/// let level = Value::<String>::shared(String::new());
/// let field = Field::builder("log_level", level.clone())
///     .seed("DEBUG")
///     .env("LOG_LEVEL")
///     .flag("loglevel")
///     .build();
///
/// field.set("INFO", 5).unwrap();
/// field.set("WARN", 4).unwrap(); // stale, ignored
/// assert_eq!(level.get(), "INFO");
/// ```
#[derive(Debug)]
pub struct Field {
    name: String,
    sources: BTreeMap<Source, String>,
    value: Arc<dyn FieldValue>,
    version: Mutex<u64>,
}

impl Field {
    /// Starts declaring a field named `name` whose value lives in `value`.
    pub fn builder(name: impl Into<String>, value: Arc<dyn FieldValue>) -> FieldBuilder {
        FieldBuilder {
            name: name.into(),
            sources: BTreeMap::new(),
            value,
        }
    }

    /// The field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name of the field's value type.
    pub fn type_name(&self) -> &'static str {
        self.value.type_name()
    }

    /// The source-specific key for every source the field is bound to.
    ///
    /// For [`Source::Seed`] the "key" is the literal seed value.
    pub fn sources(&self) -> &BTreeMap<Source, String> {
        &self.sources
    }

    /// The key bound for `source`, if any.
    pub fn key(&self, source: Source) -> Option<&str> {
        self.sources.get(&source).map(String::as_str)
    }

    /// The version of the last applied update.
    pub fn version(&self) -> u64 {
        match self.version.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Parses and stores `value` if `version` passes the version gate.
    ///
    /// Returns an error only when the value cannot be parsed into the field's
    /// type; a gated update is not an error.
    pub fn set(&self, value: &str, version: u64) -> Result<()> {
        let mut current = self.version.lock().map_err(|_| ConfigError::SourceError {
            source_name: self.name.clone(),
            message: "field version lock poisoned".to_string(),
            source: None,
        })?;

        if version != 0 && version <= *current {
            tracing::debug!(
                field = %self.name,
                version,
                current = *current,
                "version is older or same as the field's, skipping"
            );
            return Ok(());
        }

        self.value.set_raw(&self.name, value)?;
        *current = version;
        tracing::info!(field = %self.name, version, "field value changed");
        Ok(())
    }
}

/// Builder for [`Field`].
#[derive(Debug)]
pub struct FieldBuilder {
    name: String,
    sources: BTreeMap<Source, String>,
    value: Arc<dyn FieldValue>,
}

impl FieldBuilder {
    /// Binds the field to `key` in `source`, replacing any earlier binding.
    pub fn source(mut self, source: Source, key: impl Into<String>) -> Self {
        self.sources.insert(source, key.into());
        self
    }

    /// Declares a static seed literal.
    pub fn seed(self, value: impl Into<String>) -> Self {
        self.source(Source::Seed, value)
    }

    /// Binds the field to an environment variable.
    pub fn env(self, var: impl Into<String>) -> Self {
        self.source(Source::Env, var)
    }

    /// Binds the field to a command-line flag name (without dashes).
    pub fn flag(self, name: impl Into<String>) -> Self {
        self.source(Source::Flag, name)
    }

    /// Binds the field to the contents of a file.
    pub fn file(self, path: impl Into<String>) -> Self {
        self.source(Source::File, path)
    }

    /// Binds the field to a Consul KV key.
    pub fn consul(self, key: impl Into<String>) -> Self {
        self.source(Source::Consul, key)
    }

    /// Binds the field to a Redis key.
    pub fn redis(self, key: impl Into<String>) -> Self {
        self.source(Source::Redis, key)
    }

    /// Finishes the declaration.
    pub fn build(self) -> Field {
        Field {
            name: self.name,
            sources: self.sources,
            value: self.value,
            version: Mutex::new(0),
        }
    }
}
