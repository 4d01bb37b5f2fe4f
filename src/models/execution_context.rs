//! # Execution Context
//!
//! Ordered key/value checkpoint snapshot attached to a job or step execution.
//!
//! Values are restricted to a handful of primitive types so that any storage
//! backend can hold them without loss. A context is always replaced wholesale
//! when persisted; the repository never merges two contexts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A typed value held in an [`ExecutionContext`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ContextValue {
    String(String),
    Integer(i32),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
}

impl ContextValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Long(_) => "long",
            Self::Double(_) => "double",
            Self::Boolean(_) => "boolean",
            Self::Date(_) => "date",
        }
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Date(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i32> for ContextValue {
    fn from(value: i32) -> Self {
        Self::Integer(value)
    }
}

impl From<i64> for ContextValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<f64> for ContextValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<bool> for ContextValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DateTime<Utc>> for ContextValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}

/// Checkpoint state needed to resume a job or step from its last committed point
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    entries: BTreeMap<String, ContextValue>,
    #[serde(skip)]
    dirty: bool,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) {
        let key = key.into();
        let value = value.into();
        if self.entries.get(&key) != Some(&value) {
            self.entries.insert(key, value);
            self.dirty = true;
        }
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.entries.get(key)
    }

    /// Copy every entry of `other` into this context, replacing equal keys
    pub fn put_all(&mut self, other: &ExecutionContext) {
        for (key, value) in &other.entries {
            self.put(key.clone(), value.clone());
        }
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(ContextValue::String(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.entries.get(key) {
            Some(ContextValue::Integer(v)) => Some(*v),
            _ => None,
        }
    }

    /// Long lookup that also widens integers
    pub fn get_long(&self, key: &str) -> Option<i64> {
        match self.entries.get(key) {
            Some(ContextValue::Long(v)) => Some(*v),
            Some(ContextValue::Integer(v)) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn get_double(&self, key: &str) -> Option<f64> {
        match self.entries.get(key) {
            Some(ContextValue::Double(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.entries.get(key) {
            Some(ContextValue::Boolean(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_date(&self, key: &str) -> Option<DateTime<Utc>> {
        match self.entries.get(key) {
            Some(ContextValue::Date(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ContextValue> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True when the context changed since it was loaded or last persisted
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Stable string encoding used by storage backends.
    ///
    /// Keys are emitted in sorted order so equal contexts always encode to the
    /// same string.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.entries)
    }

    pub fn decode(encoded: &str) -> Result<Self, serde_json::Error> {
        let entries: BTreeMap<String, ContextValue> = serde_json::from_str(encoded)?;
        Ok(Self {
            entries,
            dirty: false,
        })
    }
}

impl PartialEq for ExecutionContext {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl FromIterator<(String, ContextValue)> for ExecutionContext {
    fn from_iter<T: IntoIterator<Item = (String, ContextValue)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            dirty: true,
        }
    }
}
