//! Builders for associations reached through a join model.
//!
//! `ThroughBuilder` pins the new record's back-reference to an already
//! loaded join-side target. `HasManyThroughBuilder` additionally builds the
//! join record and links it on both sides.

use std::rc::Rc;
use std::sync::Arc;

use crate::associations::builder::RecordBuilder;
use crate::attributes::Attributes;
use crate::error::{Error, Result};
use crate::policy::AssignmentPolicy;
use crate::record::{Record, RecordRef};
use crate::reflection::{AssociationKind, Reflection};
use crate::schema::ModelSchema;
use crate::scope::CreationScope;
use crate::value::Value;

/// What the owner currently holds in its through association.
#[derive(Debug, Clone, Default)]
pub enum ThroughTarget {
    /// Nothing loaded.
    #[default]
    NotLoaded,
    /// A singular target.
    One(RecordRef),
    /// A collection target.
    Many(Vec<RecordRef>),
}

impl ThroughTarget {
    /// Read the through target from `owner`'s links.
    pub fn of(owner: &Record, through: &Reflection) -> Self {
        let Some(link) = owner.link(through.name) else {
            return ThroughTarget::NotLoaded;
        };
        let records = link.records();
        if through.kind.is_collection() {
            ThroughTarget::Many(records)
        } else {
            records
                .into_iter()
                .next()
                .map_or(ThroughTarget::NotLoaded, ThroughTarget::One)
        }
    }
}

/// Forces the inverse key of the source association from a singular,
/// loaded through target, then delegates.
pub struct ThroughBuilder<B> {
    inner: B,
    /// Inverse of the source reflection, on the target model.
    inverse: Option<Reflection>,
    through_target: ThroughTarget,
}

impl<B: RecordBuilder> ThroughBuilder<B> {
    /// Wrap `inner`.
    pub fn new(inner: B, inverse: Option<Reflection>, through_target: ThroughTarget) -> Self {
        Self {
            inner,
            inverse,
            through_target,
        }
    }
}

impl<B: RecordBuilder> RecordBuilder for ThroughBuilder<B> {
    fn build_record(&self, attributes: Attributes, mut scope: CreationScope) -> Result<RecordRef> {
        if let (Some(inverse), ThroughTarget::One(target)) = (&self.inverse, &self.through_target) {
            let id = target.borrow().id_value();
            tracing::trace!(
                inverse = inverse.name,
                foreign_key = %inverse.foreign_key,
                target = %id,
                "Forcing inverse key from through target"
            );
            // Forced through the scope rather than merged into the caller's
            // attributes, so the policy never sees it.
            scope.force(inverse.foreign_key.as_ref(), id);
        }
        self.inner.build_record(attributes, scope)
    }

    fn link_built(&self, record: &RecordRef) -> Result<()> {
        self.inner.link_built(record)
    }
}

/// Everything needed to build the join record for a has-many-through build.
pub struct JoinSpec {
    /// The association owner.
    pub owner: RecordRef,
    /// Owner -> join association.
    pub through: Reflection,
    /// Join -> owner association, if declared.
    pub through_inverse: Option<Reflection>,
    /// Join -> target association.
    pub source: Reflection,
    /// Join model schema.
    pub schema: Arc<ModelSchema>,
    /// Scope of the through association, forced onto the join record.
    pub scope: CreationScope,
    /// Assignment policy.
    pub policy: Rc<dyn AssignmentPolicy>,
}

impl JoinSpec {
    /// Build a join record pointing at `far` and back at the owner.
    ///
    /// The owner's through association is untouched until
    /// [`link_into_owner`](Self::link_into_owner).
    fn build_through_record(&self, far: &RecordRef) -> Result<RecordRef> {
        let scope = &self.scope;
        let join = ModelSchema::instantiate(&self.schema, Attributes::new(), self.policy.as_ref(), |record| {
            record.apply_scope(scope);
        })?;
        let join = RecordRef::new(join);

        {
            let mut record = join.borrow_mut();
            if let Some(inverse) = &self.through_inverse {
                record.set_back_reference(inverse.name, inverse.kind, &inverse.foreign_key, &self.owner);
            }
            let source = &self.source;
            record.set_back_reference(source.name, source.kind, &source.foreign_key, far);
            if source.kind == AssociationKind::BelongsTo {
                if let Some(id) = far.borrow().id() {
                    record.write_attribute(&source.foreign_key, Value::BigInt(id));
                }
            }
        }

        Ok(join)
    }

    /// Add `join` to the owner's through association.
    fn link_into_owner(&self, join: RecordRef) {
        let mut owner = self.owner.borrow_mut();
        let through = &self.through;
        if through.kind.is_collection() {
            owner.push_target(through.name, through.kind, &through.foreign_key, join);
        } else {
            owner.set_target(through.name, through.kind, &through.foreign_key, join);
        }
    }
}

/// Has-many-through builder: rejects nested chains, builds the far record,
/// then links a join record into the far record's inverse association.
pub struct HasManyThroughBuilder<B> {
    inner: ThroughBuilder<B>,
    reflection: &'static str,
    nested: bool,
    /// Inverse of the source reflection, on the target model.
    inverse: Option<Reflection>,
    join: JoinSpec,
}

impl<B: RecordBuilder> HasManyThroughBuilder<B> {
    /// Wrap a through builder.
    pub fn new(
        inner: ThroughBuilder<B>,
        reflection: &'static str,
        nested: bool,
        inverse: Option<Reflection>,
        join: JoinSpec,
    ) -> Self {
        Self {
            inner,
            reflection,
            nested,
            inverse,
            join,
        }
    }

    fn ensure_not_nested(&self) -> Result<()> {
        if self.nested {
            return Err(Error::UnsupportedNestedThrough {
                reflection: self.reflection.to_string(),
            });
        }
        Ok(())
    }
}

impl<B: RecordBuilder> RecordBuilder for HasManyThroughBuilder<B> {
    fn build_record(&self, attributes: Attributes, scope: CreationScope) -> Result<RecordRef> {
        self.ensure_not_nested()?;

        let record = self.inner.build_record(attributes, scope)?;

        if let Some(inverse) = &self.inverse {
            match inverse.kind {
                AssociationKind::HasMany => {
                    let join = self.join.build_through_record(&record)?;
                    record
                        .borrow_mut()
                        .push_target(inverse.name, inverse.kind, &inverse.foreign_key, join);
                }
                AssociationKind::HasOne => {
                    let join = self.join.build_through_record(&record)?;
                    record
                        .borrow_mut()
                        .set_target(inverse.name, inverse.kind, &inverse.foreign_key, join);
                }
                AssociationKind::BelongsTo => {}
            }
        }

        Ok(record)
    }

    fn link_built(&self, record: &RecordRef) -> Result<()> {
        self.inner.link_built(record)?;
        let Some(inverse) = &self.inverse else {
            return Ok(());
        };
        if inverse.kind == AssociationKind::BelongsTo {
            return Ok(());
        }
        let joins = record
            .borrow()
            .link(inverse.name)
            .map(|link| link.records())
            .unwrap_or_default();
        for join in joins {
            self.join.link_into_owner(join);
        }
        Ok(())
    }
}
