//! Attribute whitelist policy.
//!
//! The policy decides which attribute names may be mass-assigned to a model.
//! Association builders hand every caller-supplied mapping to
//! [`AssignmentPolicy::sanitize`] and only ever apply what comes back.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::attributes::Attributes;
use crate::error::{Error, Result};

/// Role used when none is configured.
pub const DEFAULT_ROLE: &str = "default";

/// Decides which attributes may be mass-assigned.
pub trait AssignmentPolicy {
    /// Filter `attributes` for `model`.
    ///
    /// Implementations either fail with [`Error::ForbiddenAttributes`] or
    /// return only permitted attributes. There is no way to ask a policy to
    /// skip itself.
    fn sanitize(&self, model: &str, attributes: Attributes) -> Result<Attributes>;
}

/// What a [`Whitelist`] does with attributes outside the permitted set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizerMode {
    /// Fail the whole assignment.
    #[default]
    Strict,
    /// Drop the offending attributes and emit a warning.
    Log,
}

/// Configuration for [`Whitelist`] behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhitelistConfig {
    /// How forbidden attributes are handled.
    pub mode: SanitizerMode,
    /// Role whose accessible sets apply.
    pub role: String,
}

impl Default for WhitelistConfig {
    fn default() -> Self {
        Self {
            mode: SanitizerMode::Strict,
            role: DEFAULT_ROLE.to_string(),
        }
    }
}

/// Per-model, per-role accessible attribute sets.
///
/// # Example
///
/// ```
/// use massguard_core::policy::{AssignmentPolicy, Whitelist};
/// use massguard_core::Attributes;
///
/// let policy = Whitelist::new()
///     .allow("Post", ["title", "body"])
///     .allow_for("admin", "Post", ["title", "body", "featured"]);
///
/// let ok = policy.sanitize("Post", Attributes::from([("title", "Hi")]));
/// assert!(ok.is_ok());
///
/// let denied = policy.sanitize("Post", Attributes::from([("featured", true)]));
/// assert!(denied.is_err());
///
/// let admin = policy.as_role("admin");
/// assert!(admin.sanitize("Post", Attributes::from([("featured", true)])).is_ok());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    /// (role, model) -> accessible attribute names.
    accessible: HashMap<(String, String), BTreeSet<String>>,
    config: WhitelistConfig,
}

impl Whitelist {
    /// Create an empty whitelist: nothing is assignable.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty whitelist with custom configuration.
    #[must_use]
    pub fn with_config(config: WhitelistConfig) -> Self {
        Self {
            accessible: HashMap::new(),
            config,
        }
    }

    /// Permit attributes for `model` under the default role.
    #[must_use]
    pub fn allow<I, S>(self, model: &str, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_for(DEFAULT_ROLE, model, attributes)
    }

    /// Permit attributes for `model` under `role`.
    #[must_use]
    pub fn allow_for<I, S>(mut self, role: &str, model: &str, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accessible
            .entry((role.to_string(), model.to_string()))
            .or_default()
            .extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Same whitelist, evaluated under another role.
    #[must_use]
    pub fn as_role(&self, role: &str) -> Self {
        let mut scoped = self.clone();
        scoped.config.role = role.to_string();
        scoped
    }

    /// Same whitelist with a different sanitizer mode.
    #[must_use]
    pub fn mode(mut self, mode: SanitizerMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Get the whitelist configuration.
    pub fn config(&self) -> &WhitelistConfig {
        &self.config
    }

    /// Whether `attribute` is assignable to `model` under the current role.
    pub fn permits(&self, model: &str, attribute: &str) -> bool {
        self.accessible
            .get(&(self.config.role.clone(), model.to_string()))
            .is_some_and(|set| set.contains(attribute))
    }
}

impl AssignmentPolicy for Whitelist {
    fn sanitize(&self, model: &str, mut attributes: Attributes) -> Result<Attributes> {
        let rejected: Vec<String> = attributes
            .names()
            .filter(|name| !self.permits(model, name))
            .map(str::to_string)
            .collect();

        if rejected.is_empty() {
            return Ok(attributes);
        }

        match self.config.mode {
            SanitizerMode::Strict => Err(Error::ForbiddenAttributes {
                model: model.to_string(),
                attributes: rejected,
            }),
            SanitizerMode::Log => {
                tracing::warn!(
                    model = model,
                    role = %self.config.role,
                    attributes = ?rejected,
                    "Can't mass-assign protected attributes, dropping them"
                );
                attributes.retain(|name, _| !rejected.iter().any(|r| r == name));
                Ok(attributes)
            }
        }
    }
}
