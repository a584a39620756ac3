//! Building a single associated record.

use std::rc::Rc;
use std::sync::Arc;

use crate::attributes::Attributes;
use crate::error::Result;
use crate::policy::AssignmentPolicy;
use crate::record::RecordRef;
use crate::schema::ModelSchema;
use crate::scope::CreationScope;

/// Builds one unsaved record for an association.
///
/// Implementations are stacked: through-aware builders wrap the protected
/// builder and adjust the scope or link extra records around it.
pub trait RecordBuilder {
    /// Build a record from caller `attributes`, forcing `scope` onto it.
    fn build_record(&self, attributes: Attributes, scope: CreationScope) -> Result<RecordRef>;

    /// Link records built alongside `record` into the owner, once `record`
    /// has been accepted into the target.
    fn link_built(&self, _record: &RecordRef) -> Result<()> {
        Ok(())
    }
}

/// The leaf builder: protected assignment plus creation scope.
///
/// Caller attributes go through the assignment policy inside the factory.
/// The scope is applied in the factory's initializer, minus any attribute
/// the record already changed unless the scope forces it.
pub struct ProtectedBuilder {
    target: Arc<ModelSchema>,
    policy: Rc<dyn AssignmentPolicy>,
}

impl ProtectedBuilder {
    /// Builder for records of `target`.
    pub fn new(target: Arc<ModelSchema>, policy: Rc<dyn AssignmentPolicy>) -> Self {
        Self { target, policy }
    }
}

impl RecordBuilder for ProtectedBuilder {
    fn build_record(&self, attributes: Attributes, scope: CreationScope) -> Result<RecordRef> {
        let record = ModelSchema::instantiate(&self.target, attributes, self.policy.as_ref(), |record| {
            let scope = scope.except_changed(record);
            record.apply_scope(&scope);
        })?;
        tracing::trace!(
            model = self.target.name(),
            changed = ?record.changed(),
            "Built protected record"
        );
        Ok(RecordRef::new(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Whitelist;
    use crate::schema::ColumnDef;
    use crate::value::Value;

    fn builder(policy: Whitelist) -> ProtectedBuilder {
        let schema = ModelSchema::new("Post")
            .column(ColumnDef::new("id"))
            .column(ColumnDef::new("title"))
            .column(ColumnDef::new("author_id"))
            .column(ColumnDef::new("state").with_default("draft"));
        ProtectedBuilder::new(Arc::new(schema), Rc::new(policy))
    }

    fn scope() -> CreationScope {
        let mut scope = CreationScope::empty();
        scope.force("author_id", Value::BigInt(4));
        scope.insert("state", Value::from("pending"));
        scope
    }

    #[test]
    fn test_scope_applies_to_empty_attributes() {
        let record = builder(Whitelist::new())
            .build_record(Attributes::new(), scope())
            .unwrap();
        let record = record.borrow();
        assert_eq!(record.get("author_id"), Some(&Value::BigInt(4)));
        assert_eq!(record.get("state"), Some(&Value::from("pending")));
        assert!(record.is_new());
    }

    #[test]
    fn test_caller_value_survives_unforced_scope_key() {
        let policy = Whitelist::new().allow("Post", ["state", "author_id"]);
        let attrs = Attributes::from([("state", Value::from("live")), ("author_id", Value::BigInt(99))]);
        let record = builder(policy).build_record(attrs, scope()).unwrap();
        let record = record.borrow();
        assert_eq!(record.get("state"), Some(&Value::from("live")));
        assert_eq!(record.get("author_id"), Some(&Value::BigInt(4)));
    }

    #[test]
    fn test_forbidden_attribute_fails_build() {
        let attrs = Attributes::from([("author_id", 1)]);
        let err = builder(Whitelist::new())
            .build_record(attrs, scope())
            .unwrap_err();
        assert!(err.is_forbidden_attributes());
    }
}
