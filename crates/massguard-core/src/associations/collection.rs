//! Build and create for has-many associations.

use crate::associations::AssociationContext;
use crate::associations::builder::RecordBuilder;
use crate::attributes::{AttributeInput, Attributes};
use crate::error::{Error, Result};
use crate::persistence::transaction;
use crate::record::{Record, RecordRef};
use crate::reflection::Reflection;
use crate::scope::CreationScope;

/// What a create call does when the new record fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnInvalid {
    /// Hand back the unsaved record; the caller inspects its errors.
    ReturnRecord,
    /// Fail with [`Error::RecordInvalid`].
    Fail,
}

/// Records produced by a build/create call, shaped like its input.
#[derive(Debug, Clone)]
pub enum Built {
    /// Result of a single attribute mapping.
    One(RecordRef),
    /// Results of a batch, in input order.
    Many(Vec<RecordRef>),
}

impl Built {
    /// The single record, if the input was a single mapping.
    pub fn into_one(self) -> Option<RecordRef> {
        match self {
            Built::One(record) => Some(record),
            Built::Many(_) => None,
        }
    }

    /// All records, in input order.
    pub fn into_many(self) -> Vec<RecordRef> {
        match self {
            Built::One(record) => vec![record],
            Built::Many(records) => records,
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        match self {
            Built::One(_) => 1,
            Built::Many(records) => records.len(),
        }
    }

    /// True for an empty batch.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A live has-many association of one owner record.
///
/// The target lives in the owner's links, so every record built here is
/// immediately visible through the owner.
#[derive(Clone)]
pub struct CollectionAssociation {
    ctx: AssociationContext,
    owner: RecordRef,
    reflection: Reflection,
}

impl CollectionAssociation {
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

    /// Records currently in the target, in insertion order.
    pub fn target(&self) -> Vec<RecordRef> {
        self.owner.borrow().target_many(self.reflection.name)
    }

    /// Build one record or a batch and add them to the target.
    pub fn build(&self, input: impl Into<AttributeInput>) -> Result<Built> {
        self.build_with(input, |_| Ok(()))
    }

    /// Like [`build`](Self::build), running `customize` on each new record
    /// before it joins the target.
    #[tracing::instrument(level = "debug", skip_all, fields(association = self.reflection.name))]
    pub fn build_with<F>(&self, input: impl Into<AttributeInput>, mut customize: F) -> Result<Built>
    where
        F: FnMut(&mut Record) -> Result<()>,
    {
        match input.into() {
            AttributeInput::Many(batch) => {
                tracing::debug!(count = batch.len(), "Building batch");
                batch
                    .into_iter()
                    .map(|attributes| self.build_one(attributes, &mut customize))
                    .collect::<Result<Vec<_>>>()
                    .map(Built::Many)
            }
            AttributeInput::One(attributes) => self.build_one(attributes, &mut customize).map(Built::One),
        }
    }

    /// Create and insert; invalid records come back unsaved with errors.
    pub fn create(&self, input: impl Into<AttributeInput>) -> Result<Built> {
        self.create_record(input.into(), OnInvalid::ReturnRecord, &mut |_| Ok(()))
    }

    /// [`create`](Self::create) with a customizer run before the insert.
    pub fn create_with<F>(&self, input: impl Into<AttributeInput>, mut customize: F) -> Result<Built>
    where
        F: FnMut(&mut Record) -> Result<()>,
    {
        self.create_record(input.into(), OnInvalid::ReturnRecord, &mut customize)
    }

    /// Create and insert; an invalid record fails with
    /// [`Error::RecordInvalid`] and its transaction rolls back.
    pub fn create_strict(&self, input: impl Into<AttributeInput>) -> Result<Built> {
        self.create_record(input.into(), OnInvalid::Fail, &mut |_| Ok(()))
    }

    /// [`create_strict`](Self::create_strict) with a customizer.
    pub fn create_strict_with<F>(
        &self,
        input: impl Into<AttributeInput>,
        mut customize: F,
    ) -> Result<Built>
    where
        F: FnMut(&mut Record) -> Result<()>,
    {
        self.create_record(input.into(), OnInvalid::Fail, &mut customize)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(association = self.reflection.name, on_invalid = ?on_invalid))]
    fn create_record(
        &self,
        input: AttributeInput,
        on_invalid: OnInvalid,
        customize: &mut dyn FnMut(&mut Record) -> Result<()>,
    ) -> Result<Built> {
        if !self.owner.borrow().is_persisted() {
            return Err(Error::RecordNotSaved(
                "cannot create unless the parent is saved".to_string(),
            ));
        }

        match input {
            AttributeInput::Many(batch) => {
                tracing::debug!(count = batch.len(), "Creating batch, one transaction per record");
                batch
                    .into_iter()
                    .map(|attributes| self.create_one(attributes, on_invalid, customize))
                    .collect::<Result<Vec<_>>>()
                    .map(Built::Many)
            }
            AttributeInput::One(attributes) => {
                self.create_one(attributes, on_invalid, customize).map(Built::One)
            }
        }
    }

    fn build_one(
        &self,
        attributes: Attributes,
        customize: &mut dyn FnMut(&mut Record) -> Result<()>,
    ) -> Result<RecordRef> {
        let builder = self.ctx.record_builder(&self.owner, &self.reflection)?;
        let record = self.build_record(builder.as_ref(), attributes)?;
        self.add_to_target(builder.as_ref(), record, |record| customize(&mut *record.borrow_mut()))
    }

    fn create_one(
        &self,
        attributes: Attributes,
        on_invalid: OnInvalid,
        customize: &mut dyn FnMut(&mut Record) -> Result<()>,
    ) -> Result<RecordRef> {
        transaction(self.ctx.store(), || {
            let builder = self.ctx.record_builder(&self.owner, &self.reflection)?;
            let record = self.build_record(builder.as_ref(), attributes)?;
            self.add_to_target(builder.as_ref(), record, |record| {
                customize(&mut *record.borrow_mut())?;
                self.insert_record(record, on_invalid)
            })
        })
    }

    fn build_record(&self, builder: &dyn RecordBuilder, attributes: Attributes) -> Result<RecordRef> {
        let scope = CreationScope::for_association(&self.reflection, &self.owner.borrow());
        builder.build_record(attributes, scope)
    }

    /// Run `before_add`, then link anything built alongside `record`, append
    /// it and point its inverse at the owner. A failing `before_add` leaves
    /// the owner untouched.
    fn add_to_target(
        &self,
        builder: &dyn RecordBuilder,
        record: RecordRef,
        before_add: impl FnOnce(&RecordRef) -> Result<()>,
    ) -> Result<RecordRef> {
        before_add(&record)?;
        builder.link_built(&record)?;
        self.owner.borrow_mut().push_target(
            self.reflection.name,
            self.reflection.kind,
            &self.reflection.foreign_key,
            record.clone(),
        );
        self.ctx
            .set_inverse_instance(&self.reflection, &self.owner, &record)?;
        Ok(record)
    }

    fn insert_record(&self, record: &RecordRef, on_invalid: OnInvalid) -> Result<()> {
        let saved = self.ctx.store().insert(record, true)?;
        if !saved {
            tracing::debug!(
                model = record.borrow().model(),
                errors = %record.error_summary(),
                "Insert rejected by validation"
            );
            if on_invalid == OnInvalid::Fail {
                return Err(Error::RecordInvalid(record.clone()));
            }
        }
        Ok(())
    }
}
