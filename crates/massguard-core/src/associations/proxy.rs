//! Collection-like handle over a has-many association.

use crate::associations::collection::{Built, CollectionAssociation};
use crate::attributes::AttributeInput;
use crate::error::Result;
use crate::record::{Record, RecordRef};

/// Public face of a has-many association. Every construction call forwards
/// verbatim to the wrapped [`CollectionAssociation`].
#[derive(Clone)]
pub struct CollectionProxy {
    association: CollectionAssociation,
}

impl CollectionProxy {
    pub(crate) fn wrap(association: CollectionAssociation) -> Self {
        Self { association }
    }

    /// The underlying association.
    pub fn association(&self) -> &CollectionAssociation {
        &self.association
    }

    /// See [`CollectionAssociation::build`].
    pub fn build(&self, input: impl Into<AttributeInput>) -> Result<Built> {
        self.association.build(input)
    }

    /// See [`CollectionAssociation::build_with`].
    pub fn build_with<F>(&self, input: impl Into<AttributeInput>, customize: F) -> Result<Built>
    where
        F: FnMut(&mut Record) -> Result<()>,
    {
        self.association.build_with(input, customize)
    }

    /// Alias of [`build`](Self::build).
    #[allow(clippy::new_ret_no_self, clippy::wrong_self_convention)]
    pub fn new(&self, input: impl Into<AttributeInput>) -> Result<Built> {
        self.build(input)
    }

    /// See [`CollectionAssociation::create`].
    pub fn create(&self, input: impl Into<AttributeInput>) -> Result<Built> {
        self.association.create(input)
    }

    /// See [`CollectionAssociation::create_with`].
    pub fn create_with<F>(&self, input: impl Into<AttributeInput>, customize: F) -> Result<Built>
    where
        F: FnMut(&mut Record) -> Result<()>,
    {
        self.association.create_with(input, customize)
    }

    /// See [`CollectionAssociation::create_strict`].
    pub fn create_strict(&self, input: impl Into<AttributeInput>) -> Result<Built> {
        self.association.create_strict(input)
    }

    /// See [`CollectionAssociation::create_strict_with`].
    pub fn create_strict_with<F>(&self, input: impl Into<AttributeInput>, customize: F) -> Result<Built>
    where
        F: FnMut(&mut Record) -> Result<()>,
    {
        self.association.create_strict_with(input, customize)
    }

    /// Records currently in the target.
    pub fn records(&self) -> Vec<RecordRef> {
        self.association.target()
    }

    /// Number of records in the target.
    pub fn len(&self) -> usize {
        self.records().len()
    }

    /// True when the target is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
