//! Scalar property values
//!
//! Every mapped (non-navigation) property of a tracked entity holds one
//! [`Value`]. Values compare with plain structural equality: an integer is
//! never equal to a float, even when they denote the same number.
//!
//! ## String representation
//!
//! Audit records store values as optional strings. [`Value::to_audit_string`]
//! performs that conversion; `Null` becomes `None`, never the text `"null"`.
//!
//! | Variant     | Stored as                       |
//! |-------------|---------------------------------|
//! | `Null`      | `None`                          |
//! | `Bool`      | `true` / `false`                |
//! | `Int`       | decimal                         |
//! | `Float`     | Rust `Display` (`1.5`, `2`)     |
//! | `Text`      | verbatim                        |
//! | `Timestamp` | RFC 3339                        |
//! | `Uuid`      | hyphenated lowercase            |

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A scalar value held by an entity property
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// Absent value (SQL `NULL`)
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Text value
    Text(String),
    /// Point in time
    Timestamp(DateTime<Utc>),
    /// UUID value
    Uuid(Uuid),
}

impl Value {
    /// Returns true if the value is `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Converts the value to its stored audit representation
    ///
    /// # Example
    ///
    /// ```
    /// use entaudit_core::domain::Value;
    ///
    /// assert_eq!(Value::Int(42).to_audit_string(), Some("42".to_string()));
    /// assert_eq!(Value::Null.to_audit_string(), None);
    /// ```
    pub fn to_audit_string(&self) -> Option<String> {
        match self {
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::Timestamp(ts) => f.write_str(&ts.to_rfc3339()),
            Value::Uuid(u) => write!(f, "{u}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<Uuid> for Value {
    fn from(u: Uuid) -> Self {
        Value::Uuid(u)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

/// An ordered list of `(property name, value)` pairs
///
/// Order is significant: it is the column order of a row or the property
/// order of an entity type, and it drives the iteration order of diffs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyValues(Vec<(String, Value)>);

impl PropertyValues {
    /// Creates an empty value list
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, see [`PropertyValues::set`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a value, replacing an existing entry in place or appending a new one
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((name, value)),
        }
    }

    /// Returns the value for `name`, if present
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Returns true if a value for `name` is present
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over property names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    /// Iterates over `(name, value)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no properties
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N: Into<String>, V: Into<Value>> FromIterator<(N, V)> for PropertyValues {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut values = PropertyValues::new();
        for (name, value) in iter {
            values.set(name, value);
        }
        values
    }
}
