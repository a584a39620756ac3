//! Build and create for has-one and belongs-to associations.

use crate::associations::AssociationContext;
use crate::associations::collection::OnInvalid;
use crate::attributes::Attributes;
use crate::error::{Error, Result};
use crate::record::{Record, RecordRef};
use crate::reflection::{AssociationKind, Reflection};
use crate::scope::CreationScope;

/// A live singular association of one owner record.
///
/// Unlike collections, singular creates do not require a saved owner, never
/// batch, and put the new record in the owner's slot whether or not it saved.
#[derive(Clone)]
pub struct SingularAssociation {
    ctx: AssociationContext,
    owner: RecordRef,
    reflection: Reflection,
}

impl SingularAssociation {
    pub(crate) fn new(ctx: AssociationContext, owner: RecordRef, reflection: Reflection) -> Self {
        Self {
            ctx,
            owner,
            reflection,
        }
    }

    /// The owner record.
    pub fn owner(&self) -> &RecordRef {
        &self.owner
    }

    /// The association's reflection.
    pub fn reflection(&self) -> &Reflection {
        &self.reflection
    }

    /// The record currently in the owner's slot.
    pub fn target(&self) -> Option<RecordRef> {
        self.owner.borrow().target_one(self.reflection.name)
    }

    /// Build a record and put it in the owner's slot.
    pub fn build(&self, attributes: impl Into<Attributes>) -> Result<RecordRef> {
        self.build_with(attributes, |_| Ok(()))
    }

    /// [`build`](Self::build) with a customizer run before assignment.
    #[tracing::instrument(level = "debug", skip_all, fields(association = self.reflection.name))]
    pub fn build_with<F>(&self, attributes: impl Into<Attributes>, mut customize: F) -> Result<RecordRef>
    where
        F: FnMut(&mut Record) -> Result<()>,
    {
        let record = self.build_record(attributes.into())?;
        customize(&mut *record.borrow_mut())?;
        self.set_new_record(&record)?;
        Ok(record)
    }

    /// Build, save and assign; an invalid record is returned unsaved.
    pub fn create(&self, attributes: impl Into<Attributes>) -> Result<RecordRef> {
        self.create_record(attributes.into(), OnInvalid::ReturnRecord, &mut |_| Ok(()))
    }

    /// [`create`](Self::create) with a customizer run before the save.
    pub fn create_with<F>(&self, attributes: impl Into<Attributes>, mut customize: F) -> Result<RecordRef>
    where
        F: FnMut(&mut Record) -> Result<()>,
    {
        self.create_record(attributes.into(), OnInvalid::ReturnRecord, &mut customize)
    }

    /// Build, save and assign; an invalid record is still assigned, then
    /// reported as [`Error::RecordInvalid`].
    pub fn create_strict(&self, attributes: impl Into<Attributes>) -> Result<RecordRef> {
        self.create_record(attributes.into(), OnInvalid::Fail, &mut |_| Ok(()))
    }

    /// [`create_strict`](Self::create_strict) with a customizer.
    pub fn create_strict_with<F>(
        &self,
        attributes: impl Into<Attributes>,
        mut customize: F,
    ) -> Result<RecordRef>
    where
        F: FnMut(&mut Record) -> Result<()>,
    {
        self.create_record(attributes.into(), OnInvalid::Fail, &mut customize)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(association = self.reflection.name, on_invalid = ?on_invalid))]
    fn create_record(
        &self,
        attributes: Attributes,
        on_invalid: OnInvalid,
        customize: &mut dyn FnMut(&mut Record) -> Result<()>,
    ) -> Result<RecordRef> {
        let record = self.build_record(attributes)?;
        customize(&mut *record.borrow_mut())?;
        let saved = self.ctx.store().save(&record)?;
        self.set_new_record(&record)?;

        if !saved && on_invalid == OnInvalid::Fail {
            return Err(Error::RecordInvalid(record));
        }
        Ok(record)
    }

    fn build_record(&self, attributes: Attributes) -> Result<RecordRef> {
        let scope = CreationScope::for_association(&self.reflection, &self.owner.borrow());
        let builder = self.ctx.record_builder(&self.owner, &self.reflection)?;
        builder.build_record(attributes, scope)
    }

    /// Replace the owner's slot. Belongs-to owners also take the new
    /// record's key.
    fn set_new_record(&self, record: &RecordRef) -> Result<()> {
        let reflection = &self.reflection;
        let id = record.borrow().id_value();
        {
            let mut owner = self.owner.borrow_mut();
            owner.set_target(reflection.name, reflection.kind, &reflection.foreign_key, record.clone());
            if reflection.kind == AssociationKind::BelongsTo {
                owner.write_attribute(&reflection.foreign_key, id);
            }
        }
        self.ctx.set_inverse_instance(reflection, &self.owner, record)
    }
}
