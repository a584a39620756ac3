//! In-memory persistence for massguard.
//!
//! `MemoryStore` is the unit-of-work end of the association operations. It
//! keeps one row map per table, hands out ids from a per-table sequence and
//! coordinates transactions the create paths open around each insert.
//!
//! # Design Philosophy
//!
//! - **Joined nesting**: a nested `begin` joins the open transaction; only the
//!   outermost commit or rollback takes effect
//! - **Snapshot rollback**: rows are restored from the snapshot taken at the
//!   outermost `begin`, and records inserted since then return to `New`
//! - **Autosave**: inserting a record first saves new belongs-to parents, then
//!   inserts new has-many/has-one children with the parent key filled in
//!
//! # Example
//!
//! ```ignore
//! let store = Rc::new(MemoryStore::new());
//! let ctx = AssociationContext::new(registry, policy, store.clone());
//!
//! let posts = ctx.collection(&author, "posts")?;
//! posts.create(Attributes::from([("title", "Hello")]))?;
//!
//! assert_eq!(store.count("posts"), 1);
//! ```

use massguard_core::{
    AssociationKind, Attributes, Error, LinkTargets, Persistence, RecordRef, Result, Value,
};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// Store Configuration
// ============================================================================

/// Configuration for [`MemoryStore`] behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Whether `save` runs validations before writing.
    pub validate_on_save: bool,
    /// Whether inserts also save new linked records.
    pub autosave_links: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            validate_on_save: true,
            autosave_links: true,
        }
    }
}

// ============================================================================
// Object Key
// ============================================================================

/// Address of one stored row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Table the row lives in.
    pub table: String,
    /// Primary key.
    pub id: i64,
}

impl ObjectKey {
    /// Key of a persisted record, if it has an id.
    pub fn from_record(record: &RecordRef) -> Option<Self> {
        let record = record.borrow();
        record.id().map(|id| Self {
            table: record.schema().table_name().to_string(),
            id,
        })
    }
}

// ============================================================================
// Store
// ============================================================================

type Rows = BTreeMap<ObjectKey, Attributes>;

#[derive(Default)]
struct StoreState {
    rows: Rows,
    /// Last id handed out, per table. Not rolled back.
    sequences: HashMap<String, i64>,
    depth: usize,
    /// Rows as of the outermost `begin`.
    snapshot: Option<Rows>,
    /// Records inserted since the outermost `begin`.
    journal: Vec<RecordRef>,
    /// Set when a joined transaction rolled back.
    rollback_only: bool,
}

/// An in-memory, single-threaded record store.
#[derive(Default)]
pub struct MemoryStore {
    state: RefCell<StoreState>,
    config: StoreConfig,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create an empty store with custom configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            state: RefCell::new(StoreState::default()),
            config,
        }
    }

    /// Get the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Stored attributes of row `id` in `table`.
    pub fn find(&self, table: &str, id: i64) -> Option<Attributes> {
        let key = ObjectKey {
            table: table.to_string(),
            id,
        };
        self.state.borrow().rows.get(&key).cloned()
    }

    /// Every row of `table`, in id order.
    pub fn all(&self, table: &str) -> Vec<Attributes> {
        self.state
            .borrow()
            .rows
            .iter()
            .filter(|(key, _)| key.table == table)
            .map(|(_, row)| row.clone())
            .collect()
    }

    /// Number of rows in `table`.
    pub fn count(&self, table: &str) -> usize {
        self.state
            .borrow()
            .rows
            .keys()
            .filter(|key| key.table == table)
            .count()
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.state.borrow().depth > 0
    }

    /// Dump store state for debugging.
    pub fn debug_state(&self) -> StoreDebugInfo {
        let state = self.state.borrow();
        StoreDebugInfo {
            rows: state.rows.len(),
            depth: state.depth,
            journaled: state.journal.len(),
            rollback_only: state.rollback_only,
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    fn next_id(&self, table: &str) -> i64 {
        let mut state = self.state.borrow_mut();
        let seq = state.sequences.entry(table.to_string()).or_insert(0);
        *seq += 1;
        *seq
    }

    fn write_row(&self, record: &RecordRef) {
        let Some(key) = ObjectKey::from_record(record) else {
            return;
        };
        let row = record.borrow().attributes();
        self.state.borrow_mut().rows.insert(key, row);
    }

    /// Save new belongs-to parents and copy their keys onto `record`.
    ///
    /// Returns false when a parent failed to save.
    fn save_parents(&self, record: &RecordRef) -> Result<bool> {
        let parents: Vec<(&'static str, String, RecordRef)> = record
            .borrow()
            .links()
            .filter(|(_, link)| link.kind == AssociationKind::BelongsTo)
            .flat_map(|(name, link)| {
                link.records()
                    .into_iter()
                    .map(move |parent| (name, link.foreign_key.clone(), parent))
            })
            .collect();

        for (name, foreign_key, parent) in parents {
            let is_new = parent.borrow().is_new();
            if is_new && !self.save(&parent)? {
                record.borrow_mut().errors_mut().add(name, "is invalid");
                return Ok(false);
            }
            let id = parent.borrow().id_value();
            if !id.is_null() {
                record.borrow_mut().write_attribute(&foreign_key, id);
            }
        }
        Ok(true)
    }

    /// Give owned has-many/has-one children `record`'s key and insert the
    /// new ones.
    fn save_children(&self, record: &RecordRef) -> Result<()> {
        let (id, children): (Value, Vec<(String, RecordRef)>) = {
            let record = record.borrow();
            let children = record
                .links()
                .filter(|(_, link)| link.kind.key_on_target())
                .filter_map(|(_, link)| match &link.targets {
                    LinkTargets::Owned(records) => Some((link.foreign_key.clone(), records.clone())),
                    LinkTargets::Back(_) => None,
                })
                .flat_map(|(fk, records)| records.into_iter().map(move |r| (fk.clone(), r)))
                .collect();
            (record.id_value(), children)
        };

        for (foreign_key, child) in children {
            if !child.borrow().is_new() {
                continue;
            }
            if child.borrow().schema().has_column(&foreign_key) {
                child.borrow_mut().write_attribute(&foreign_key, id.clone());
            }
            if !self.insert(&child, true)? {
                tracing::debug!(
                    model = child.borrow().model(),
                    errors = %child.error_summary(),
                    "Autosaved child rejected by validation"
                );
            }
        }
        Ok(())
    }

    fn persist_new(&self, record: &RecordRef) -> Result<bool> {
        if self.config.autosave_links && !self.save_parents(record)? {
            return Ok(false);
        }
        // A parent's autosave may already have inserted this record.
        if record.borrow().is_persisted() {
            return Ok(true);
        }

        let (model, table) = {
            let record = record.borrow();
            (record.model(), record.schema().table_name().to_string())
        };
        let id = self.next_id(&table);
        record.borrow_mut().mark_persisted(id);
        self.write_row(record);

        {
            let mut state = self.state.borrow_mut();
            if state.depth > 0 {
                state.journal.push(record.clone());
            }
        }
        tracing::info!(model, table = %table, id, "Inserted record");

        if self.config.autosave_links {
            self.save_children(record)?;
        }
        Ok(true)
    }

    fn restore_snapshot(&self) {
        let (journal, snapshot) = {
            let mut state = self.state.borrow_mut();
            state.depth = 0;
            state.rollback_only = false;
            (std::mem::take(&mut state.journal), state.snapshot.take())
        };
        if let Some(rows) = snapshot {
            self.state.borrow_mut().rows = rows;
        }
        for record in journal.iter().rev() {
            record.borrow_mut().mark_new();
        }
        tracing::debug!(reverted = journal.len(), "Restored snapshot");
    }
}

// ============================================================================
// Transaction Management
// ============================================================================

impl Persistence for MemoryStore {
    #[tracing::instrument(level = "debug", skip(self))]
    fn begin(&self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.depth == 0 {
            tracing::info!("Beginning transaction");
            state.snapshot = Some(state.rows.clone());
            state.journal.clear();
            state.rollback_only = false;
        }
        state.depth += 1;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn commit(&self) -> Result<()> {
        let rollback_only = {
            let mut state = self.state.borrow_mut();
            if state.depth == 0 {
                return Err(Error::Transaction("commit without an open transaction".to_string()));
            }
            state.depth -= 1;
            if state.depth > 0 {
                return Ok(());
            }
            state.rollback_only
        };

        if rollback_only {
            tracing::info!("Rolling back transaction marked rollback-only");
            self.restore_snapshot();
            return Err(Error::Transaction(
                "a joined transaction rolled back; nothing was committed".to_string(),
            ));
        }

        tracing::info!("Committing transaction");
        let mut state = self.state.borrow_mut();
        state.snapshot = None;
        state.journal.clear();
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn rollback(&self) -> Result<()> {
        {
            let mut state = self.state.borrow_mut();
            if state.depth == 0 {
                return Err(Error::Transaction(
                    "rollback without an open transaction".to_string(),
                ));
            }
            if state.depth > 1 {
                state.depth -= 1;
                state.rollback_only = true;
                return Ok(());
            }
        }
        tracing::info!("Rolling back transaction");
        self.restore_snapshot();
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, record), fields(model = record.borrow().model()))]
    fn insert(&self, record: &RecordRef, validate: bool) -> Result<bool> {
        if record.borrow().is_persisted() {
            return Err(Error::InvalidInput(format!(
                "{record:?} is already persisted"
            )));
        }
        if validate && !record.borrow_mut().validate() {
            return Ok(false);
        }
        self.persist_new(record)
    }

    #[tracing::instrument(level = "debug", skip(self, record), fields(model = record.borrow().model()))]
    fn save(&self, record: &RecordRef) -> Result<bool> {
        if self.config.validate_on_save && !record.borrow_mut().validate() {
            return Ok(false);
        }
        if record.borrow().is_new() {
            return self.persist_new(record);
        }

        self.write_row(record);
        record.borrow_mut().clear_changes();
        tracing::debug!("Updated record");
        if self.config.autosave_links {
            self.save_children(record)?;
        }
        Ok(true)
    }
}

/// Debug information about store state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDebugInfo {
    /// Total stored rows.
    pub rows: usize,
    /// Transaction nesting depth.
    pub depth: usize,
    /// Records inserted in the open transaction.
    pub journaled: usize,
    /// Whether a joined transaction rolled back.
    pub rollback_only: bool,
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use massguard_core::{ModelSchema, Record, Reflection, Registry, Validation};
    use std::sync::Arc;

    fn registry() -> Registry {
        Registry::new()
            .model(
                ModelSchema::new("Author")
                    .columns(["id", "name"])
                    .reflect(Reflection::has_many("posts", "Post")),
            )
            .model(
                ModelSchema::new("Post")
                    .columns(["id", "author_id", "title"])
                    .reflect(Reflection::belongs_to("author", "Author"))
                    .validate(Validation::Presence("title")),
            )
    }

    fn record(registry: &Registry, model: &str, values: &[(&str, Value)]) -> RecordRef {
        let mut record = Record::new(Arc::clone(registry.schema(model).unwrap()));
        for (column, value) in values {
            record.set(column, value.clone()).unwrap();
        }
        RecordRef::new(record)
    }

    #[test]
    fn test_store_config_defaults() {
        let config = StoreConfig::default();
        assert!(config.validate_on_save);
        assert!(config.autosave_links);
    }

    #[test]
    fn test_insert_assigns_sequential_ids_per_table() {
        let registry = registry();
        let store = MemoryStore::new();
        let a = record(&registry, "Author", &[("name", Value::from("Ada"))]);
        let b = record(&registry, "Author", &[("name", Value::from("Bob"))]);
        let p = record(&registry, "Post", &[("title", Value::from("Hi"))]);

        assert!(store.insert(&a, true).unwrap());
        assert!(store.insert(&b, true).unwrap());
        assert!(store.insert(&p, true).unwrap());

        assert_eq!(a.borrow().id(), Some(1));
        assert_eq!(b.borrow().id(), Some(2));
        assert_eq!(p.borrow().id(), Some(1));
        assert_eq!(store.count("authors"), 2);
        assert_eq!(
            store.find("authors", 2).unwrap().get("name"),
            Some(&Value::from("Bob"))
        );
    }

    #[test]
    fn test_invalid_insert_writes_nothing() {
        let registry = registry();
        let store = MemoryStore::new();
        let post = record(&registry, "Post", &[]);

        assert!(!store.insert(&post, true).unwrap());
        assert!(post.borrow().is_new());
        assert_eq!(post.borrow().errors().on("title"), ["can't be blank"]);
        assert_eq!(store.count("posts"), 0);
    }

    #[test]
    fn test_rollback_restores_rows_and_record_state() {
        let registry = registry();
        let store = MemoryStore::new();
        let kept = record(&registry, "Post", &[("title", Value::from("kept"))]);
        store.insert(&kept, true).unwrap();

        store.begin().unwrap();
        let dropped = record(&registry, "Post", &[("title", Value::from("dropped"))]);
        store.insert(&dropped, true).unwrap();
        assert_eq!(store.count("posts"), 2);
        store.rollback().unwrap();

        assert_eq!(store.count("posts"), 1);
        assert!(dropped.borrow().is_new());
        assert!(dropped.borrow().id().is_none());
        assert!(kept.borrow().is_persisted());
        assert!(!store.in_transaction());
    }

    #[test]
    fn test_nested_transactions_join_the_outer_one() {
        let registry = registry();
        let store = MemoryStore::new();

        store.begin().unwrap();
        store.begin().unwrap();
        let post = record(&registry, "Post", &[("title", Value::from("inner"))]);
        store.insert(&post, true).unwrap();
        store.commit().unwrap();
        assert!(store.in_transaction());
        store.rollback().unwrap();

        assert_eq!(store.count("posts"), 0);
        assert!(post.borrow().is_new());
    }

    #[test]
    fn test_inner_rollback_poisons_outer_commit() {
        let store = MemoryStore::new();
        store.begin().unwrap();
        store.begin().unwrap();
        store.rollback().unwrap();
        assert!(store.debug_state().rollback_only);

        let err = store.commit().unwrap_err();
        assert!(matches!(err, Error::Transaction(_)));
        assert!(!store.in_transaction());
    }

    #[test]
    fn test_commit_and_rollback_require_open_transaction() {
        let store = MemoryStore::new();
        assert!(matches!(store.commit(), Err(Error::Transaction(_))));
        assert!(matches!(store.rollback(), Err(Error::Transaction(_))));
    }

    #[test]
    fn test_save_updates_persisted_record() {
        let registry = registry();
        let store = MemoryStore::new();
        let post = record(&registry, "Post", &[("title", Value::from("draft"))]);
        store.save(&post).unwrap();

        post.borrow_mut().set("title", "final").unwrap();
        assert!(store.save(&post).unwrap());
        assert!(post.borrow().changed().is_empty());
        assert_eq!(
            store.find("posts", 1).unwrap().get("title"),
            Some(&Value::from("final"))
        );
    }

    #[test]
    fn test_insert_rejects_persisted_record() {
        let registry = registry();
        let store = MemoryStore::new();
        let post = record(&registry, "Post", &[("title", Value::from("x"))]);
        store.insert(&post, true).unwrap();
        assert!(matches!(store.insert(&post, true), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_debug_state_tracks_journal() {
        let registry = registry();
        let store = MemoryStore::new();
        store.begin().unwrap();
        let post = record(&registry, "Post", &[("title", Value::from("x"))]);
        store.insert(&post, true).unwrap();
        assert_eq!(
            store.debug_state(),
            StoreDebugInfo {
                rows: 1,
                depth: 1,
                journaled: 1,
                rollback_only: false,
            }
        );
        store.commit().unwrap();
        assert_eq!(store.debug_state().journaled, 0);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"autosave_links": false}"#).unwrap();
        assert!(config.validate_on_save);
        assert!(!config.autosave_links);
    }
}
