//! Association handles and the builders behind them.
//!
//! An [`AssociationContext`] bundles the model registry, the assignment
//! policy and the store. It hands out [`CollectionProxy`] and
//! [`SingularAssociation`] handles for an owner record and picks the
//! builder chain each association needs.

pub mod builder;
pub mod collection;
pub mod proxy;
pub mod singular;
pub mod through;

use std::rc::Rc;
use std::sync::Arc;

use crate::attributes::Attributes;
use crate::error::{Error, Result};
use crate::persistence::Persistence;
use crate::policy::AssignmentPolicy;
use crate::record::RecordRef;
use crate::reflection::{AssociationKind, Reflection};
use crate::schema::{ModelSchema, Registry};
use crate::scope::CreationScope;

use builder::{ProtectedBuilder, RecordBuilder};
use collection::CollectionAssociation;
use proxy::CollectionProxy;
use singular::SingularAssociation;
use through::{HasManyThroughBuilder, JoinSpec, ThroughBuilder, ThroughTarget};

/// Shared services for association operations.
///
/// Cloning is cheap; every handle carries its own copy.
#[derive(Clone)]
pub struct AssociationContext {
    registry: Arc<Registry>,
    policy: Rc<dyn AssignmentPolicy>,
    store: Rc<dyn Persistence>,
}

impl AssociationContext {
    /// Create a context over `registry`, guarded by `policy`, persisting to `store`.
    pub fn new(
        registry: Arc<Registry>,
        policy: Rc<dyn AssignmentPolicy>,
        store: Rc<dyn Persistence>,
    ) -> Self {
        Self {
            registry,
            policy,
            store,
        }
    }

    /// The model registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The assignment policy.
    pub fn policy(&self) -> &dyn AssignmentPolicy {
        self.policy.as_ref()
    }

    /// The store.
    pub fn store(&self) -> &dyn Persistence {
        self.store.as_ref()
    }

    /// Build a standalone record of `model` with protected assignment.
    pub fn new_record(&self, model: &str, attributes: impl Into<Attributes>) -> Result<RecordRef> {
        let schema = self.registry.schema(model)?;
        let record = ModelSchema::instantiate(schema, attributes.into(), self.policy.as_ref(), |_| {})?;
        Ok(RecordRef::new(record))
    }

    /// The has-many association `name` of `owner`.
    pub fn has_many(&self, owner: &RecordRef, name: &str) -> Result<CollectionAssociation> {
        let reflection = self.lookup(owner, name)?;
        if !reflection.kind.is_collection() {
            return Err(Error::InvalidInput(format!(
                "association '{name}' is not a collection"
            )));
        }
        Ok(CollectionAssociation::new(self.clone(), owner.clone(), reflection))
    }

    /// Collection proxy over the has-many association `name` of `owner`.
    pub fn collection(&self, owner: &RecordRef, name: &str) -> Result<CollectionProxy> {
        self.has_many(owner, name).map(CollectionProxy::wrap)
    }

    /// The has-one or belongs-to association `name` of `owner`.
    pub fn singular(&self, owner: &RecordRef, name: &str) -> Result<SingularAssociation> {
        let reflection = self.lookup(owner, name)?;
        if reflection.kind.is_collection() {
            return Err(Error::InvalidInput(format!(
                "association '{name}' is a collection"
            )));
        }
        Ok(SingularAssociation::new(self.clone(), owner.clone(), reflection))
    }

    fn lookup(&self, owner: &RecordRef, name: &str) -> Result<Reflection> {
        let model = owner.borrow().model();
        self.registry.reflection(model, name).cloned()
    }

    /// The builder chain for records of `reflection` owned by `owner`.
    pub(crate) fn record_builder(
        &self,
        owner: &RecordRef,
        reflection: &Reflection,
    ) -> Result<Box<dyn RecordBuilder>> {
        let target = Arc::clone(self.registry.schema(reflection.target)?);
        let protected = ProtectedBuilder::new(target, Rc::clone(&self.policy));

        let Some(through) = self.registry.through_reflection(reflection)? else {
            return Ok(Box::new(protected));
        };
        let source = self
            .registry
            .source_reflection(reflection)?
            .ok_or_else(|| Error::UnknownReflection {
                model: through.target.to_string(),
                name: reflection.name.to_string(),
            })?;
        let inverse = self.registry.inverse_of(source)?.cloned();
        let through_target = ThroughTarget::of(&owner.borrow(), through);
        let builder = ThroughBuilder::new(protected, inverse.clone(), through_target);

        if reflection.kind != AssociationKind::HasMany {
            return Ok(Box::new(builder));
        }

        let join = JoinSpec {
            owner: owner.clone(),
            through: through.clone(),
            through_inverse: self.registry.inverse_of(through)?.cloned(),
            source: source.clone(),
            schema: Arc::clone(self.registry.schema(through.target)?),
            scope: CreationScope::for_association(through, &owner.borrow()),
            policy: Rc::clone(&self.policy),
        };
        let nested = through.is_through() || source.is_through();
        Ok(Box::new(HasManyThroughBuilder::new(
            builder,
            reflection.name,
            nested,
            inverse,
            join,
        )))
    }

    /// Point `record`'s inverse association back at `owner`.
    ///
    /// Through associations and collection inverses are left alone.
    pub(crate) fn set_inverse_instance(
        &self,
        reflection: &Reflection,
        owner: &RecordRef,
        record: &RecordRef,
    ) -> Result<()> {
        if reflection.is_through() {
            return Ok(());
        }
        let Some(inverse) = self.registry.inverse_of(reflection)? else {
            return Ok(());
        };
        if inverse.kind.is_collection() {
            return Ok(());
        }
        record
            .borrow_mut()
            .set_back_reference(inverse.name, inverse.kind, &inverse.foreign_key, owner);
        Ok(())
    }
}
