//! Runtime model schemas and the registry that resolves associations
//! between them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::attributes::Attributes;
use crate::error::{Error, Result};
use crate::policy::AssignmentPolicy;
use crate::record::Record;
use crate::reflection::Reflection;
use crate::validate::Validation;
use crate::value::Value;

/// A column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Value filled in when nothing assigned the column during instantiation.
    pub default: Option<Value>,
}

impl ColumnDef {
    /// Create a new column definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    /// Set the default value.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Shape of one model: columns, associations and validations.
///
/// # Example
///
/// ```
/// use massguard_core::schema::{ColumnDef, ModelSchema};
/// use massguard_core::reflection::Reflection;
///
/// let author = ModelSchema::new("Author")
///     .column(ColumnDef::new("id"))
///     .column(ColumnDef::new("name"))
///     .reflect(Reflection::has_many("posts", "Post"));
///
/// assert_eq!(author.table_name(), "authors");
/// assert_eq!(author.reflection("posts").unwrap().foreign_key, "author_id");
/// ```
#[derive(Debug, Clone)]
pub struct ModelSchema {
    name: &'static str,
    table_name: String,
    primary_key: &'static str,
    columns: Vec<ColumnDef>,
    reflections: Vec<Reflection>,
    validations: Vec<Validation>,
}

impl ModelSchema {
    /// Create a schema with a conventional table name (`Post` -> `posts`).
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            table_name: format!("{}s", crate::reflection::snake_case(name)),
            primary_key: "id",
            columns: Vec::new(),
            reflections: Vec::new(),
            validations: Vec::new(),
        }
    }

    /// Override the table name.
    #[must_use]
    pub fn table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    /// Override the primary key column.
    #[must_use]
    pub fn primary_key(mut self, column: &'static str) -> Self {
        self.primary_key = column;
        self
    }

    /// Add a column.
    #[must_use]
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Add several plain columns at once.
    #[must_use]
    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(names.into_iter().map(ColumnDef::new));
        self
    }

    /// Declare an association. The foreign key is derived when left unset.
    #[must_use]
    pub fn reflect(mut self, mut reflection: Reflection) -> Self {
        reflection.model = self.name;
        if reflection.foreign_key.is_empty() {
            reflection.foreign_key = reflection.default_foreign_key(self.name).into();
        }
        self.reflections.push(reflection);
        self
    }

    /// Declare a validation.
    #[must_use]
    pub fn validate(mut self, validation: Validation) -> Self {
        self.validations.push(validation);
        self
    }

    /// Model name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Primary key column.
    pub fn primary_key_column(&self) -> &'static str {
        self.primary_key
    }

    /// Column definitions in declaration order.
    pub fn column_defs(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Position of a column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Whether the model has this column.
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Declared validations.
    pub fn validations(&self) -> &[Validation] {
        &self.validations
    }

    /// Declared associations.
    pub fn reflections(&self) -> &[Reflection] {
        &self.reflections
    }

    /// Look up an association by name.
    pub fn reflection(&self, name: &str) -> Option<&Reflection> {
        self.reflections.iter().find(|r| r.name == name)
    }

    /// Build a new, unsaved record.
    ///
    /// `attributes` go through `policy` first. `initialize` then sees the
    /// record before column defaults are filled in, so values it writes win
    /// over defaults.
    pub fn instantiate(
        schema: &Arc<Self>,
        attributes: Attributes,
        policy: &dyn AssignmentPolicy,
        initialize: impl FnOnce(&mut Record),
    ) -> Result<Record> {
        let mut record = Record::new(Arc::clone(schema));
        record.assign_attributes(attributes, policy)?;
        initialize(&mut record);
        record.apply_defaults();
        Ok(record)
    }
}

/// All known models, by name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    models: HashMap<&'static str, Arc<ModelSchema>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model, replacing any previous schema of the same name.
    #[must_use]
    pub fn model(mut self, schema: ModelSchema) -> Self {
        self.models.insert(schema.name(), Arc::new(schema));
        self
    }

    /// Get a model schema.
    pub fn schema(&self, name: &str) -> Result<&Arc<ModelSchema>> {
        self.models
            .get(name)
            .ok_or_else(|| Error::UnknownModel(name.to_string()))
    }

    /// Get an association declared on `model`.
    pub fn reflection(&self, model: &str, name: &str) -> Result<&Reflection> {
        self.schema(model)?
            .reflection(name)
            .ok_or_else(|| Error::UnknownReflection {
                model: model.to_string(),
                name: name.to_string(),
            })
    }

    /// The declared inverse of `reflection`, looked up on its target model.
    ///
    /// `Ok(None)` when no inverse is declared; an error when one is declared
    /// but does not exist.
    pub fn inverse_of(&self, reflection: &Reflection) -> Result<Option<&Reflection>> {
        reflection
            .inverse_of
            .map(|name| self.reflection(reflection.target, name))
            .transpose()
    }

    /// The owner -> join association of a through reflection.
    pub fn through_reflection(&self, reflection: &Reflection) -> Result<Option<&Reflection>> {
        reflection
            .through
            .map(|name| self.reflection(reflection.model, name))
            .transpose()
    }

    /// The join -> target association of a through reflection.
    pub fn source_reflection(&self, reflection: &Reflection) -> Result<Option<&Reflection>> {
        let Some(through) = self.through_reflection(reflection)? else {
            return Ok(None);
        };
        let join = self.schema(through.target)?;
        let candidates = reflection.source_candidates();
        candidates
            .iter()
            .find_map(|name| join.reflection(name))
            .map(Some)
            .ok_or_else(|| Error::UnknownReflection {
                model: through.target.to_string(),
                name: candidates.join(" or "),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Whitelist;

    fn registry() -> Registry {
        Registry::new()
            .model(
                ModelSchema::new("User")
                    .columns(["id", "name"])
                    .reflect(Reflection::has_many("memberships", "Membership"))
                    .reflect(Reflection::has_many("groups", "Group").through("memberships")),
            )
            .model(
                ModelSchema::new("Membership")
                    .columns(["id", "user_id", "group_id"])
                    .reflect(Reflection::belongs_to("user", "User"))
                    .reflect(Reflection::belongs_to("group", "Group").inverse_of("memberships")),
            )
            .model(
                ModelSchema::new("Group")
                    .columns(["id", "name"])
                    .reflect(Reflection::has_many("memberships", "Membership")),
            )
    }

    #[test]
    fn test_reflect_derives_foreign_keys() {
        let registry = registry();
        assert_eq!(registry.reflection("User", "memberships").unwrap().foreign_key, "user_id");
        assert_eq!(registry.reflection("Membership", "group").unwrap().foreign_key, "group_id");
        assert_eq!(registry.reflection("Membership", "group").unwrap().model, "Membership");
    }

    #[test]
    fn test_through_and_source_resolution() {
        let registry = registry();
        let groups = registry.reflection("User", "groups").unwrap();
        let through = registry.through_reflection(groups).unwrap().unwrap();
        assert_eq!(through.name, "memberships");

        let source = registry.source_reflection(groups).unwrap().unwrap();
        assert_eq!(source.name, "group");
        assert_eq!(source.model, "Membership");

        let inverse = registry.inverse_of(source).unwrap().unwrap();
        assert_eq!(inverse.name, "memberships");
        assert_eq!(inverse.model, "Group");
    }

    #[test]
    fn test_unknown_lookups() {
        let registry = registry();
        assert!(matches!(registry.schema("Nope"), Err(Error::UnknownModel(_))));
        assert!(matches!(
            registry.reflection("User", "nope"),
            Err(Error::UnknownReflection { .. })
        ));
        let memberships = registry.reflection("User", "memberships").unwrap();
        assert!(registry.source_reflection(memberships).unwrap().is_none());
    }

    #[test]
    fn test_instantiate_runs_initializer_before_defaults() {
        let schema = Arc::new(
            ModelSchema::new("Post")
                .column(ColumnDef::new("id"))
                .column(ColumnDef::new("title"))
                .column(ColumnDef::new("state").with_default("draft"))
                .column(ColumnDef::new("kind").with_default("article")),
        );
        let policy = Whitelist::new().allow("Post", ["title"]);

        let record = ModelSchema::instantiate(
            &schema,
            Attributes::from([("title", "Hello")]),
            &policy,
            |record| record.write_attribute("state", Value::from("review")),
        )
        .unwrap();

        assert_eq!(record.get("title"), Some(&Value::from("Hello")));
        assert_eq!(record.get("state"), Some(&Value::from("review")));
        assert_eq!(record.get("kind"), Some(&Value::from("article")));
        assert!(!record.is_changed("kind"));
        assert!(record.is_new());
    }

    #[test]
    fn test_instantiate_propagates_policy_errors() {
        let schema = Arc::new(ModelSchema::new("Post").columns(["id", "title"]));
        let policy = Whitelist::new();
        let err = ModelSchema::instantiate(
            &schema,
            Attributes::from([("title", "x")]),
            &policy,
            |_| {},
        )
        .unwrap_err();
        assert!(err.is_forbidden_attributes());
    }
}
