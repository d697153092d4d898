// SPDX-License-Identifier: MIT OR Apache-2.0

//! The declared schema: the ordered list of fields to harvest.

use crate::domain::errors::{ConfigError, Result};
use crate::domain::{Field, Source};
use std::collections::HashSet;
use std::sync::Arc;

/// An ordered set of uniquely named fields.
///
/// # Examples
///
/// ```
/// use harvestcfg::domain::{Config, Field, Source, Value};
///
/// # fn main() -> harvestcfg::domain::Result<()> {
/// let config = Config::builder()
///     .field(Field::builder("index_name", Value::<String>::shared(String::new())).seed("customers-v1").build())
///     .field(Field::builder("balance", Value::<f64>::shared(0.0)).consul("app/balance").build())
///     .build()?;
///
/// assert_eq!(config.len(), 2);
/// assert_eq!(config.keys_for(Source::Consul), vec!["app/balance".to_string()]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Config {
    fields: Vec<Arc<Field>>,
}

impl Config {
    /// Starts declaring a configuration.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder { fields: Vec::new() }
    }

    /// The fields in declaration order.
    pub fn fields(&self) -> &[Arc<Field>] {
        &self.fields
    }

    /// Looks a field up by name.
    pub fn field(&self, name: &str) -> Option<&Arc<Field>> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Number of declared fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no field is declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Every key bound for `source`, in field declaration order.
    pub fn keys_for(&self, source: Source) -> Vec<String> {
        self.fields
            .iter()
            .filter_map(|f| f.key(source).map(str::to_string))
            .collect()
    }
}

/// Builder for [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    fields: Vec<Field>,
}

impl ConfigBuilder {
    /// Adds a field.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Validates names and produces the configuration.
    pub fn build(self) -> Result<Config> {
        let mut names = HashSet::new();
        for field in &self.fields {
            if field.name().is_empty() {
                return Err(ConfigError::invalid_argument("field name is empty"));
            }
            if !names.insert(field.name().to_string()) {
                return Err(ConfigError::invalid_argument(format!(
                    "field {} declared more than once",
                    field.name()
                )));
            }
        }
        Ok(Config {
            fields: self.fields.into_iter().map(Arc::new).collect(),
        })
    }
}
