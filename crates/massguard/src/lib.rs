//! Mass-assignment protection for ORM association builders.
//!
//! `massguard` is the facade crate. It re-exports the record model and
//! association handles from `massguard-core` and the in-memory store from
//! `massguard-session`.
//!
//! Every record built through an association runs caller attributes through
//! an [`AssignmentPolicy`](massguard_core::AssignmentPolicy). Keys the
//! association controls (the owner's foreign key, static conditions, the
//! inverse key of a through association) are forced through a
//! [`CreationScope`](massguard_core::CreationScope) and can never be supplied
//! by the caller.
//!
//! # Example
//!
//! ```
//! use massguard::prelude::*;
//! use std::rc::Rc;
//! use std::sync::Arc;
//!
//! let registry = Registry::new()
//!     .model(
//!         ModelSchema::new("Author")
//!             .columns(["id", "name"])
//!             .reflect(Reflection::has_many("posts", "Post")),
//!     )
//!     .model(ModelSchema::new("Post").columns(["id", "author_id", "title"]));
//! let policy = Whitelist::new().allow("Author", ["name"]).allow("Post", ["title"]);
//! let store = Rc::new(MemoryStore::new());
//! let ctx = AssociationContext::new(Arc::new(registry), Rc::new(policy), store.clone());
//!
//! let author = ctx.new_record("Author", [("name", "Ada")]).unwrap();
//! store.save(&author).unwrap();
//!
//! let posts = ctx.collection(&author, "posts").unwrap();
//! let post = posts.create([("title", "Hello")]).unwrap().into_one().unwrap();
//! assert_eq!(post.borrow().get("author_id"), Some(&Value::BigInt(1)));
//!
//! let err = posts.build([("author_id", 7)]).unwrap_err();
//! assert!(err.is_forbidden_attributes());
//! ```

pub use massguard_core::{
    AssignmentPolicy, AssociationContext, AssociationKind, AttributeInput, Attributes, Built,
    CollectionAssociation, CollectionProxy, ColumnDef, CreationScope, Error, ModelSchema,
    Persistence, Record, RecordRef, Reflection, Registry, Result, SanitizerMode,
    SingularAssociation, Validation, Value, Whitelist, WhitelistConfig,
};
pub use massguard_session::{MemoryStore, StoreConfig, StoreDebugInfo};

/// Everything needed to declare models and work with their associations.
pub mod prelude {
    pub use massguard_core::{
        AssignmentPolicy, AssociationContext, AssociationKind, AttributeInput, Attributes, Built,
        CollectionAssociation, CollectionProxy, ColumnDef, CreationScope, Error, ModelSchema,
        Persistence, Record, RecordRef, Reflection, Registry, Result, SanitizerMode,
        SingularAssociation, Validation, ValidationErrors, Value, Whitelist, WhitelistConfig,
        transaction,
    };
    pub use massguard_session::{MemoryStore, StoreConfig};
}
