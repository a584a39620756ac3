//! Creation scopes: attribute values an association forces onto the records
//! it builds.
//!
//! A scope is derived from an association's reflection and its owner, never
//! from caller input. Its mutators are crate-private, so the unprotected
//! [`Record::apply_scope`](crate::record::Record) path can only ever carry
//! association-controlled values.

use std::collections::{BTreeMap, BTreeSet};

use crate::record::Record;
use crate::reflection::{AssociationKind, Reflection};
use crate::value::Value;

/// Attribute name -> forced value, plus the keys that always apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreationScope {
    values: BTreeMap<String, Value>,
    /// Keys re-applied even when the record already changed them.
    forced: BTreeSet<String>,
}

impl CreationScope {
    /// An empty scope.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Scope for records built through `reflection` on `owner`.
    ///
    /// Key-on-target associations force the owner's key into the foreign key.
    /// Through and belongs-to associations only carry static conditions.
    pub(crate) fn for_association(reflection: &Reflection, owner: &Record) -> Self {
        let mut scope = Self::empty();
        for (attribute, value) in &reflection.conditions {
            scope.insert(*attribute, value.clone());
        }
        let owns_key = matches!(
            reflection.kind,
            AssociationKind::HasMany | AssociationKind::HasOne
        );
        if owns_key && !reflection.is_through() {
            scope.force(reflection.foreign_key.as_ref(), owner.id_value());
        }
        scope
    }

    /// Add a conditional entry: skipped when the record already changed it.
    pub(crate) fn insert(&mut self, attribute: impl Into<String>, value: Value) {
        let attribute = attribute.into();
        self.forced.remove(&attribute);
        self.values.insert(attribute, value);
    }

    /// Add an entry that always applies.
    pub(crate) fn force(&mut self, attribute: impl Into<String>, value: Value) {
        let attribute = attribute.into();
        self.forced.insert(attribute.clone());
        self.values.insert(attribute, value);
    }

    /// The scope minus every key `record` already changed, except forced keys.
    pub(crate) fn except_changed(&self, record: &Record) -> Self {
        let changed: BTreeSet<&str> = record.changed().into_iter().collect();
        let values = self
            .values
            .iter()
            .filter(|(k, _)| self.forced.contains(*k) || !changed.contains(k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            values,
            forced: self.forced.clone(),
        }
    }

    /// Value forced for `attribute`, if any.
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.values.get(attribute)
    }

    /// Whether `attribute` always applies.
    pub fn is_forced(&self, attribute: &str) -> bool {
        self.forced.contains(attribute)
    }

    /// Iterate over `(attribute, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the scope forces nothing.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
