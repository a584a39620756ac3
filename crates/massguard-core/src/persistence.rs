//! The persistence contract association operations sequence calls against.
//!
//! Stores implement the primitives; [`transaction`] wraps a closure in
//! begin/commit with rollback on error.

use crate::error::Result;
use crate::record::RecordRef;

/// Storage primitives used by the create paths.
///
/// Implementations decide how transactions nest; the only requirement is
/// that a `rollback` undoes every insert/save since the matching `begin`.
pub trait Persistence {
    /// Open (or join) a transaction.
    fn begin(&self) -> Result<()>;

    /// Commit the innermost `begin`.
    fn commit(&self) -> Result<()>;

    /// Roll back the innermost `begin`.
    fn rollback(&self) -> Result<()>;

    /// Insert a new record, optionally validating it first.
    ///
    /// Returns `Ok(false)` when validation fails; the record's errors are
    /// populated and nothing is written.
    fn insert(&self, record: &RecordRef, validate: bool) -> Result<bool>;

    /// Insert or update a record, validating it first.
    fn save(&self, record: &RecordRef) -> Result<bool>;
}

/// Run `f` inside a transaction.
///
/// Commits when `f` succeeds. When `f` fails the transaction is rolled back
/// and `f`'s error is returned unchanged.
pub fn transaction<T>(store: &dyn Persistence, f: impl FnOnce() -> Result<T>) -> Result<T> {
    store.begin()?;
    match f() {
        Ok(value) => {
            store.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = store.rollback() {
                tracing::error!(
                    error = %rollback_err,
                    "Rollback failed while unwinding a failed transaction"
                );
            }
            Err(e)
        }
    }
}
