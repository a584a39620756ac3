//! Dynamic records and the shared handles associations pass around.
//!
//! A `Record` stores its values by column name like a dynamic model, tracks
//! which columns changed, carries validation errors, and holds links to the
//! records associated with it. Records are shared through [`RecordRef`] so
//! that the record returned from a build call is the same instance that sits
//! in the owner's association target.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::attributes::Attributes;
use crate::changed::ChangedFields;
use crate::error::{Error, Result};
use crate::policy::AssignmentPolicy;
use crate::reflection::AssociationKind;
use crate::schema::ModelSchema;
use crate::scope::CreationScope;
use crate::validate::ValidationErrors;
use crate::value::Value;

/// Persistence state of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordState {
    /// Built in memory, never saved (or its insert was rolled back).
    #[default]
    New,
    /// Saved to the store.
    Persisted,
}

/// Records reachable through one association of a record.
#[derive(Debug, Clone)]
pub struct Link {
    /// Kind of the association this link belongs to.
    pub kind: AssociationKind,
    /// Foreign key column of that association.
    pub foreign_key: String,
    /// The linked records.
    pub targets: LinkTargets,
}

/// Owned or back-reference targets of a [`Link`].
#[derive(Debug, Clone)]
pub enum LinkTargets {
    /// Records this record holds on to (collections, singular slots).
    Owned(Vec<RecordRef>),
    /// A back-reference to a record that owns this one. Held weakly so
    /// parent/child pairs don't keep each other alive.
    Back(WeakRecordRef),
}

impl Link {
    /// Strong handles to every linked record still alive.
    pub fn records(&self) -> Vec<RecordRef> {
        match &self.targets {
            LinkTargets::Owned(records) => records.clone(),
            LinkTargets::Back(weak) => weak.upgrade().into_iter().collect(),
        }
    }
}

/// A dynamically-typed instance of a [`ModelSchema`].
pub struct Record {
    schema: Arc<ModelSchema>,
    values: HashMap<String, Value>,
    changed: ChangedFields,
    errors: ValidationErrors,
    state: RecordState,
    links: HashMap<&'static str, Link>,
}

impl Record {
    /// Create an empty, unsaved record.
    pub fn new(schema: Arc<ModelSchema>) -> Self {
        let changed = ChangedFields::empty(schema.column_defs().len());
        Self {
            schema,
            values: HashMap::new(),
            changed,
            errors: ValidationErrors::new(),
            state: RecordState::New,
            links: HashMap::new(),
        }
    }

    /// The record's schema.
    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    /// Model name.
    pub fn model(&self) -> &'static str {
        self.schema.name()
    }

    /// Primary key, once saved.
    pub fn id(&self) -> Option<i64> {
        self.get(self.schema.primary_key_column())
            .and_then(Value::as_i64)
    }

    /// Primary key as a value (`Null` while unsaved).
    pub fn id_value(&self) -> Value {
        self.id().map_or(Value::Null, Value::BigInt)
    }

    /// Get a value by column name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Set a known column directly and mark it changed.
    ///
    /// This is not mass assignment: it is for trusted code such as build
    /// customizers.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<()> {
        if !self.schema.has_column(column) {
            return Err(Error::UnknownAttribute {
                model: self.model().to_string(),
                attribute: column.to_string(),
            });
        }
        self.write_attribute(column, value.into());
        Ok(())
    }

    /// Write a value and mark its column changed.
    ///
    /// Neither the assignment policy nor the column list is consulted. This
    /// is for persistence layers copying keys between linked records; build
    /// customizers use [`set`](Self::set) and caller input goes through
    /// [`assign_attributes`](Self::assign_attributes).
    pub fn write_attribute(&mut self, column: &str, value: Value) {
        if let Some(idx) = self.schema.column_index(column) {
            self.changed.mark(idx);
        }
        self.values.insert(column.to_string(), value);
    }

    /// Mass-assign caller-supplied attributes through `policy`.
    ///
    /// Nothing is written unless the policy accepts the mapping and every
    /// surviving attribute is a column of the model.
    pub fn assign_attributes(
        &mut self,
        attributes: Attributes,
        policy: &dyn AssignmentPolicy,
    ) -> Result<()> {
        let sanitized = policy.sanitize(self.model(), attributes)?;
        if let Some(unknown) = sanitized.names().find(|n| !self.schema.has_column(n)) {
            return Err(Error::UnknownAttribute {
                model: self.model().to_string(),
                attribute: unknown.to_string(),
            });
        }
        for (name, value) in sanitized {
            self.write_attribute(&name, value);
        }
        Ok(())
    }

    /// Write every entry of an association-derived scope.
    pub(crate) fn apply_scope(&mut self, scope: &CreationScope) {
        for (name, value) in scope.iter() {
            self.write_attribute(name, value.clone());
        }
    }

    /// Fill column defaults for columns nothing has assigned. Defaults do not
    /// count as changes.
    pub(crate) fn apply_defaults(&mut self) {
        for column in self.schema.column_defs() {
            if let Some(default) = &column.default {
                self.values
                    .entry(column.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
    }

    /// Names of changed columns, in declaration order.
    pub fn changed(&self) -> Vec<&str> {
        let columns = self.schema.column_defs();
        self.changed
            .positions()
            .filter_map(|idx| columns.get(idx).map(|c| c.name.as_str()))
            .collect()
    }

    /// Whether a column changed.
    pub fn is_changed(&self, column: &str) -> bool {
        self.schema
            .column_index(column)
            .is_some_and(|idx| self.changed.is_marked(idx))
    }

    /// Current values of every column that has one, as attributes.
    pub fn attributes(&self) -> Attributes {
        self.schema
            .column_defs()
            .iter()
            .filter_map(|c| self.values.get(&c.name).map(|v| (c.name.clone(), v.clone())))
            .collect()
    }

    /// Validation errors from the last validation run.
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// Mutable errors, for stores that reject a record for non-validation
    /// reasons.
    pub fn errors_mut(&mut self) -> &mut ValidationErrors {
        &mut self.errors
    }

    /// Run the schema's validations, replacing previous errors.
    pub fn validate(&mut self) -> bool {
        self.errors.clear();
        for validation in self.schema.validations() {
            if let Some(message) = validation.check(self.values.get(validation.attribute())) {
                self.errors.add(validation.attribute(), message);
            }
        }
        self.errors.is_empty()
    }

    /// Persistence state.
    pub fn state(&self) -> RecordState {
        self.state
    }

    /// True until the record is saved.
    pub fn is_new(&self) -> bool {
        self.state == RecordState::New
    }

    /// True once saved.
    pub fn is_persisted(&self) -> bool {
        self.state == RecordState::Persisted
    }

    /// Mark the record saved under `id` and forget its changes.
    pub fn mark_persisted(&mut self, id: i64) {
        let pk = self.schema.primary_key_column();
        self.values.insert(pk.to_string(), Value::BigInt(id));
        self.state = RecordState::Persisted;
        self.changed.clear();
    }

    /// Forget pending changes after an update.
    pub fn clear_changes(&mut self) {
        self.changed.clear();
    }

    /// Return a rolled-back record to the unsaved state.
    pub fn mark_new(&mut self) {
        let pk = self.schema.primary_key_column();
        self.values.remove(pk);
        self.state = RecordState::New;
    }

    /// Link for an association, if anything was linked.
    pub fn link(&self, association: &str) -> Option<&Link> {
        self.links.get(association)
    }

    /// All links, keyed by association name.
    pub fn links(&self) -> impl Iterator<Item = (&'static str, &Link)> {
        self.links.iter().map(|(k, v)| (*k, v))
    }

    /// Records currently in a collection association's target.
    pub fn target_many(&self, association: &str) -> Vec<RecordRef> {
        self.links.get(association).map(Link::records).unwrap_or_default()
    }

    /// Record currently in a singular association's slot.
    pub fn target_one(&self, association: &str) -> Option<RecordRef> {
        self.links
            .get(association)
            .and_then(|link| link.records().into_iter().next())
    }

    /// Append to a collection association's target.
    pub(crate) fn push_target(
        &mut self,
        association: &'static str,
        kind: AssociationKind,
        foreign_key: &str,
        record: RecordRef,
    ) {
        let link = self.links.entry(association).or_insert_with(|| Link {
            kind,
            foreign_key: foreign_key.to_string(),
            targets: LinkTargets::Owned(Vec::new()),
        });
        match &mut link.targets {
            LinkTargets::Owned(records) => records.push(record),
            LinkTargets::Back(_) => link.targets = LinkTargets::Owned(vec![record]),
        }
    }

    /// Replace a singular association's slot.
    pub(crate) fn set_target(
        &mut self,
        association: &'static str,
        kind: AssociationKind,
        foreign_key: &str,
        record: RecordRef,
    ) {
        self.links.insert(
            association,
            Link {
                kind,
                foreign_key: foreign_key.to_string(),
                targets: LinkTargets::Owned(vec![record]),
            },
        );
    }

    /// Point a back-reference association at `owner`.
    pub(crate) fn set_back_reference(
        &mut self,
        association: &'static str,
        kind: AssociationKind,
        foreign_key: &str,
        owner: &RecordRef,
    ) {
        self.links.insert(
            association,
            Link {
                kind,
                foreign_key: foreign_key.to_string(),
                targets: LinkTargets::Back(owner.downgrade()),
            },
        );
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("model", &self.model())
            .field("state", &self.state)
            .field("attributes", &self.attributes())
            .field("changed", &self.changed())
            .field("links", &self.links.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Shared handle to a record.
#[derive(Clone)]
pub struct RecordRef(Rc<RefCell<Record>>);

impl RecordRef {
    /// Wrap a record.
    pub fn new(record: Record) -> Self {
        Self(Rc::new(RefCell::new(record)))
    }

    /// Borrow the record.
    ///
    /// Panics if the record is mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, Record> {
        self.0.borrow()
    }

    /// Mutably borrow the record.
    ///
    /// Panics if the record is already borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, Record> {
        self.0.borrow_mut()
    }

    /// Whether both handles point at the same record.
    pub fn ptr_eq(&self, other: &RecordRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Weak handle.
    pub fn downgrade(&self) -> WeakRecordRef {
        WeakRecordRef(Rc::downgrade(&self.0))
    }

    /// Validation messages joined for display.
    pub fn error_summary(&self) -> String {
        self.0
            .try_borrow()
            .map(|r| r.errors().full_messages().join(", "))
            .unwrap_or_else(|_| "<record in use>".to_string())
    }
}

impl std::fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.try_borrow() {
            Ok(record) => match record.id() {
                Some(id) => write!(f, "RecordRef({}#{id})", record.model()),
                None => write!(f, "RecordRef({}#new)", record.model()),
            },
            Err(_) => f.write_str("RecordRef(<borrowed>)"),
        }
    }
}

/// Weak handle to a record.
#[derive(Clone, Default)]
pub struct WeakRecordRef(Weak<RefCell<Record>>);

impl WeakRecordRef {
    /// Upgrade to a strong handle if the record is still alive.
    pub fn upgrade(&self) -> Option<RecordRef> {
        self.0.upgrade().map(RecordRef)
    }
}

impl std::fmt::Debug for WeakRecordRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.upgrade() {
            Some(record) => write!(f, "Weak({record:?})"),
            None => f.write_str("Weak(<dropped>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Whitelist;
    use crate::schema::ColumnDef;
    use crate::validate::Validation;

    fn schema() -> Arc<ModelSchema> {
        Arc::new(
            ModelSchema::new("Post")
                .column(ColumnDef::new("id"))
                .column(ColumnDef::new("title"))
                .column(ColumnDef::new("author_id"))
                .validate(Validation::Presence("title")),
        )
    }

    #[test]
    fn test_assign_attributes_through_policy() {
        let mut record = Record::new(schema());
        let policy = Whitelist::new().allow("Post", ["title"]);
        record
            .assign_attributes(Attributes::from([("title", "Hi")]), &policy)
            .unwrap();
        assert_eq!(record.get("title"), Some(&Value::from("Hi")));
        assert_eq!(record.changed(), vec!["title"]);
    }

    #[test]
    fn test_forbidden_assignment_writes_nothing() {
        let mut record = Record::new(schema());
        let policy = Whitelist::new().allow("Post", ["title"]);
        let attrs = Attributes::from([("title", "Hi"), ("author_id", "3")]);
        assert!(record.assign_attributes(attrs, &policy).is_err());
        assert!(record.get("title").is_none());
        assert!(record.changed().is_empty());
    }

    #[test]
    fn test_unknown_attribute_is_rejected() {
        let mut record = Record::new(schema());
        let policy = Whitelist::new().allow("Post", ["title", "bogus"]);
        let err = record
            .assign_attributes(Attributes::from([("bogus", 1)]), &policy)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownAttribute { .. }));
        assert!(record.set("bogus", 1).is_err());
    }

    #[test]
    fn test_set_checks_columns_only() {
        let mut record = Record::new(schema());
        let policy = Whitelist::new().allow("Post", ["title"]);
        assert!(record
            .assign_attributes(Attributes::from([("author_id", 3)]), &policy)
            .is_err());

        record.set("author_id", 3).unwrap();
        assert_eq!(record.get("author_id"), Some(&Value::from(3)));
        assert_eq!(record.changed(), vec!["author_id"]);
        assert!(matches!(record.set("missing", 3), Err(Error::UnknownAttribute { .. })));
        assert_eq!(record.changed(), vec!["author_id"]);
    }

    #[test]
    fn test_validate_populates_errors() {
        let mut record = Record::new(schema());
        assert!(!record.validate());
        assert_eq!(record.errors().on("title"), ["can't be blank".to_string()]);
        record.set("title", "ok").unwrap();
        assert!(record.validate());
        assert!(record.errors().is_empty());
    }

    #[test]
    fn test_persist_and_rollback_state() {
        let mut record = Record::new(schema());
        record.set("title", "x").unwrap();
        record.mark_persisted(5);
        assert!(record.is_persisted());
        assert_eq!(record.id(), Some(5));
        assert!(record.changed().is_empty());

        record.mark_new();
        assert!(record.is_new());
        assert_eq!(record.id(), None);
        assert_eq!(record.id_value(), Value::Null);
    }

    #[test]
    fn test_links_and_back_references() {
        let parent = RecordRef::new(Record::new(schema()));
        let child = RecordRef::new(Record::new(schema()));

        parent.borrow_mut().push_target(
            "children",
            AssociationKind::HasMany,
            "parent_id",
            child.clone(),
        );
        child.borrow_mut().set_back_reference(
            "parent",
            AssociationKind::BelongsTo,
            "parent_id",
            &parent,
        );

        let targets = parent.borrow().target_many("children");
        assert_eq!(targets.len(), 1);
        assert!(targets[0].ptr_eq(&child));

        let back = child.borrow().target_one("parent").unwrap();
        assert!(back.ptr_eq(&parent));

        drop(back);
        drop(parent);
        assert!(child.borrow().target_one("parent").is_none());
    }
}
