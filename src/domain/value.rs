// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thread-safe typed value holders.
//!
//! Sources deliver raw text. A [`FieldValue`] parses that text into its own type
//! and stores it so the application can read it concurrently with updates.

use crate::domain::errors::{ConfigError, Result};
use std::fmt;
use std::sync::{Arc, RwLock};

/// Conversion from raw configuration text into a typed value.
///
/// # Examples
///
/// ```
/// use harvestcfg::domain::ParseValue;
///
/// assert_eq!(u16::parse_value("port", "8080").unwrap(), 8080);
/// assert!(bool::parse_value("debug", "yes").unwrap());
/// ```
pub trait ParseValue: Sized {
    /// Human readable name of the target type.
    const TYPE_NAME: &'static str;

    /// Parses `raw`. `name` identifies the field in error messages.
    fn parse_value(name: &str, raw: &str) -> Result<Self>;
}

impl ParseValue for String {
    const TYPE_NAME: &'static str = "string";

    fn parse_value(_name: &str, raw: &str) -> Result<Self> {
        Ok(raw.to_string())
    }
}

impl ParseValue for bool {
    const TYPE_NAME: &'static str = "bool";

    /// Recognizes true/yes/1/on and false/no/0/off, case-insensitively.
    fn parse_value(name: &str, raw: &str) -> Result<Self> {
        match raw.to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(true),
            "false" | "no" | "0" | "off" => Ok(false),
            _ => raw
                .parse::<bool>()
                .map_err(|e| ConfigError::from_parse_bool_error(name.to_string(), e)),
        }
    }
}

macro_rules! parse_int {
    ($($ty:ty),*) => {
        $(
            impl ParseValue for $ty {
                const TYPE_NAME: &'static str = stringify!($ty);

                fn parse_value(name: &str, raw: &str) -> Result<Self> {
                    raw.parse::<$ty>()
                        .map_err(|e| ConfigError::from_parse_int_error(name.to_string(), e))
                }
            }
        )*
    };
}

macro_rules! parse_float {
    ($($ty:ty),*) => {
        $(
            impl ParseValue for $ty {
                const TYPE_NAME: &'static str = stringify!($ty);

                fn parse_value(name: &str, raw: &str) -> Result<Self> {
                    raw.parse::<$ty>()
                        .map_err(|e| ConfigError::from_parse_float_error(name.to_string(), e))
                }
            }
        )*
    };
}

parse_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
parse_float!(f32, f64);

/// Storage side of a field: parses raw text and keeps the typed result.
///
/// Implementations must be safe to update from the monitor's dispatch task while
/// the application reads them.
pub trait FieldValue: Send + Sync + fmt::Debug {
    /// Name of the stored type, for diagnostics.
    fn type_name(&self) -> &'static str;

    /// Parses `raw` and replaces the stored value. `field` names the owning field.
    fn set_raw(&self, field: &str, raw: &str) -> Result<()>;
}

/// A concurrently readable value of type `T`.
///
/// # Examples
///
/// ```
/// use harvestcfg::domain::{FieldValue, Value};
///
/// let retention = Value::<i64>::shared(0);
/// retention.set_raw("cache_retention", "86400").unwrap();
/// assert_eq!(retention.get(), 86400);
/// ```
pub struct Value<T> {
    inner: RwLock<T>,
}

impl<T> Value<T> {
    /// Creates a holder with an initial value.
    pub fn new(initial: T) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    /// Creates a holder already wrapped in an `Arc`, ready to be shared with a field.
    pub fn shared(initial: T) -> Arc<Self> {
        Arc::new(Self::new(initial))
    }
}

impl<T: Clone> Value<T> {
    /// Returns a copy of the current value.
    pub fn get(&self) -> T {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl<T: Default> Default for Value<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.read() {
            Ok(guard) => f.debug_tuple("Value").field(&*guard).finish(),
            Err(_) => f.write_str("Value(<poisoned>)"),
        }
    }
}

impl<T> FieldValue for Value<T>
where
    T: ParseValue + fmt::Debug + Send + Sync,
{
    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn set_raw(&self, field: &str, raw: &str) -> Result<()> {
        let parsed = T::parse_value(field, raw)?;
        match self.inner.write() {
            Ok(mut guard) => *guard = parsed,
            Err(poisoned) => *poisoned.into_inner() = parsed,
        }
        Ok(())
    }
}
