//! Association metadata.
//!
//! A `Reflection` is the static description of one association declared on a
//! model. Builders and associations read it to decide which keys to force onto
//! new records, where to find the inverse side, and whether the association
//! is reached through a join model.

use std::borrow::Cow;

use crate::value::Value;

/// The macro kind of an association.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AssociationKind {
    /// One-to-many: `Author` has many `Post`s. The target holds the key.
    #[default]
    HasMany,
    /// One-to-one: `Author` has one `Profile`. The target holds the key.
    HasOne,
    /// Many-to-one: `Post` belongs to an `Author`. The owner holds the key.
    BelongsTo,
}

impl AssociationKind {
    /// True for kinds whose target is a collection.
    #[must_use]
    pub const fn is_collection(&self) -> bool {
        matches!(self, AssociationKind::HasMany)
    }

    /// True when the foreign key lives on the associated (target) record.
    #[must_use]
    pub const fn key_on_target(&self) -> bool {
        !matches!(self, AssociationKind::BelongsTo)
    }
}

/// Metadata about one association between models.
#[derive(Debug, Clone, PartialEq)]
pub struct Reflection {
    /// Association name, e.g. `"posts"`.
    pub name: &'static str,

    /// Declaring model name, filled in when the reflection is registered.
    pub model: &'static str,

    /// Target model name, e.g. `"Post"`.
    pub target: &'static str,

    /// Kind of association.
    pub kind: AssociationKind,

    /// Foreign key column. Lives on the target for `HasMany`/`HasOne`, on the
    /// declaring model for `BelongsTo`. Empty until derived at registration.
    pub foreign_key: Cow<'static, str>,

    /// Name of the mirror association on the target model.
    pub inverse_of: Option<&'static str>,

    /// Name of the association (on the declaring model) reaching the join model.
    pub through: Option<&'static str>,

    /// Name of the association on the join model pointing at the final target.
    pub source: Option<&'static str>,

    /// Static equality conditions; built records get these values.
    pub conditions: Vec<(&'static str, Value)>,
}

impl Reflection {
    /// Create a reflection with required fields.
    #[must_use]
    pub const fn new(name: &'static str, target: &'static str, kind: AssociationKind) -> Self {
        Self {
            name,
            model: "",
            target,
            kind,
            foreign_key: Cow::Borrowed(""),
            inverse_of: None,
            through: None,
            source: None,
            conditions: Vec::new(),
        }
    }

    /// `has_many name -> target`.
    #[must_use]
    pub const fn has_many(name: &'static str, target: &'static str) -> Self {
        Self::new(name, target, AssociationKind::HasMany)
    }

    /// `has_one name -> target`.
    #[must_use]
    pub const fn has_one(name: &'static str, target: &'static str) -> Self {
        Self::new(name, target, AssociationKind::HasOne)
    }

    /// `belongs_to name -> target`.
    #[must_use]
    pub const fn belongs_to(name: &'static str, target: &'static str) -> Self {
        Self::new(name, target, AssociationKind::BelongsTo)
    }

    /// Set the foreign key column.
    #[must_use]
    pub fn foreign_key(mut self, key: &'static str) -> Self {
        self.foreign_key = Cow::Borrowed(key);
        self
    }

    /// Declare the inverse association on the target model.
    #[must_use]
    pub fn inverse_of(mut self, name: &'static str) -> Self {
        self.inverse_of = Some(name);
        self
    }

    /// Reach the target through another association of the declaring model.
    #[must_use]
    pub fn through(mut self, name: &'static str) -> Self {
        self.through = Some(name);
        self
    }

    /// Name the source association on the join model.
    #[must_use]
    pub fn source(mut self, name: &'static str) -> Self {
        self.source = Some(name);
        self
    }

    /// Add a static condition forced onto built records.
    #[must_use]
    pub fn where_eq(mut self, attribute: &'static str, value: impl Into<Value>) -> Self {
        self.conditions.push((attribute, value.into()));
        self
    }

    /// Whether the target is reached through a join association.
    #[must_use]
    pub const fn is_through(&self) -> bool {
        self.through.is_some()
    }

    /// Source association names to try on the join model, in order.
    ///
    /// An explicit `source` wins; otherwise the association's own name and
    /// its naive singular form are tried.
    pub fn source_candidates(&self) -> Vec<&'static str> {
        if let Some(source) = self.source {
            return vec![source];
        }
        let mut names = vec![self.name];
        if let Some(singular) = self.name.strip_suffix('s') {
            names.push(singular);
        }
        names
    }

    /// Derive the default foreign key for a reflection declared on `model`.
    ///
    /// `has_many`/`has_one` use the declaring model (`Author` -> `author_id`),
    /// `belongs_to` uses the association name (`author` -> `author_id`).
    pub(crate) fn default_foreign_key(&self, model: &str) -> String {
        match self.kind {
            AssociationKind::BelongsTo => format!("{}_id", self.name),
            AssociationKind::HasMany | AssociationKind::HasOne => {
                format!("{}_id", snake_case(model))
            }
        }
    }
}

/// `BlogPost` -> `blog_post`.
pub(crate) fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
