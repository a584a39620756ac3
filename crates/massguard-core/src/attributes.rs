//! Caller-supplied attribute mappings.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::value::Value;

/// An ordered mapping of attribute name to value.
///
/// This is the raw, untrusted input to every build/create call. Nothing in it
/// reaches a record without passing the assignment policy first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    values: BTreeMap<String, Value>,
}

impl Attributes {
    /// Create an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(name.into(), value.into())
    }

    /// Get a value by attribute name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Remove a value, returning it.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// Check whether an attribute is present.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Attribute names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Iterate over `(name, value)` pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no attributes are present.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keep only the attributes for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Value) -> bool) {
        self.values.retain(|k, v| keep(k, v));
    }

    /// Build attributes from a JSON object, e.g. decoded request parameters.
    ///
    /// Anything other than a JSON object is rejected.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| (k, Value::from_json(v)))
                .collect()),
            other => Err(Error::InvalidInput(format!(
                "expected a JSON object of attributes, got {other}"
            ))),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Attributes {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl IntoIterator for Attributes {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// Input to a build/create call: one attribute mapping or a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeInput {
    /// Build a single record.
    One(Attributes),
    /// Build one record per mapping, preserving order.
    Many(Vec<Attributes>),
}

impl Default for AttributeInput {
    fn default() -> Self {
        AttributeInput::One(Attributes::new())
    }
}

impl From<Attributes> for AttributeInput {
    fn from(attrs: Attributes) -> Self {
        AttributeInput::One(attrs)
    }
}

impl From<Vec<Attributes>> for AttributeInput {
    fn from(batch: Vec<Attributes>) -> Self {
        AttributeInput::Many(batch)
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for AttributeInput {
    fn from(pairs: [(K, V); N]) -> Self {
        AttributeInput::One(Attributes::from(pairs))
    }
}
