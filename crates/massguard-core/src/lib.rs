//! Core types and association builders for massguard.
//!
//! `massguard-core` is the **foundation layer**. It defines the dynamic record
//! model, the assignment policy contract and the association operations that
//! build and create associated records without letting caller input bypass
//! mass-assignment protection.
//!
//! # Role In The Architecture
//!
//! - **Contract layer**: [`AssignmentPolicy`] decides which caller attributes
//!   a model accepts; [`Persistence`] is implemented by stores.
//! - **Data model**: [`Record`], [`Value`] and [`Attributes`] carry record
//!   state; [`ModelSchema`] and [`Reflection`] describe models and their
//!   associations.
//! - **Associations**: [`CollectionProxy`] and [`SingularAssociation`] build
//!   and create records. Association-derived keys reach new records only
//!   through a [`CreationScope`], never through caller attributes.
//!
//! # Who Uses This Crate
//!
//! - `massguard-session` implements [`Persistence`] with an in-memory store.
//! - The `massguard` facade re-exports both for applications.

pub mod associations;
pub mod attributes;
pub mod changed;
pub mod error;
pub mod persistence;
pub mod policy;
pub mod record;
pub mod reflection;
pub mod schema;
pub mod scope;
pub mod validate;
pub mod value;

pub use associations::builder::{ProtectedBuilder, RecordBuilder};
pub use associations::collection::{Built, CollectionAssociation};
pub use associations::proxy::CollectionProxy;
pub use associations::singular::SingularAssociation;
pub use associations::through::{HasManyThroughBuilder, JoinSpec, ThroughBuilder, ThroughTarget};
pub use associations::AssociationContext;
pub use attributes::{AttributeInput, Attributes};
pub use changed::ChangedFields;
pub use error::{Error, Result};
pub use persistence::{Persistence, transaction};
pub use policy::{AssignmentPolicy, DEFAULT_ROLE, SanitizerMode, Whitelist, WhitelistConfig};
pub use record::{Link, LinkTargets, Record, RecordRef, RecordState, WeakRecordRef};
pub use reflection::{AssociationKind, Reflection};
pub use schema::{ColumnDef, ModelSchema, Registry};
pub use scope::CreationScope;
pub use validate::{Validation, ValidationErrors};
pub use value::Value;
