//! Model validations run before a record is saved.
//!
//! Validations are declared on a `ModelSchema` and evaluated against a
//! record's current attributes. Failures accumulate into `ValidationErrors`
//! on the record; callers of the non-strict create paths inspect them there.

use std::collections::{BTreeMap, HashMap};
use std::sync::{OnceLock, PoisonError, RwLock};

use regex::Regex;

use crate::value::Value;

/// Thread-safe regex cache for compiled patterns.
///
/// Patterns are compiled lazily on first use and cached for the lifetime
/// of the program.
struct RegexCache {
    cache: RwLock<HashMap<String, Regex>>,
}

impl RegexCache {
    fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_compile(&self, pattern: &str) -> Result<Regex, regex::Error> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(regex) = cache.get(pattern) {
                return Ok(regex.clone());
            }
        }

        let regex = Regex::new(pattern)?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

fn regex_cache() -> &'static RegexCache {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE.get_or_init(RegexCache::new)
}

/// Check if a string matches a regex pattern.
///
/// Returns `false` if the pattern is invalid (logs a warning).
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    match regex_cache().get_or_compile(pattern) {
        Ok(regex) => regex.is_match(value),
        Err(e) => {
            tracing::warn!(
                pattern = pattern,
                error = %e,
                "Invalid regex pattern in validation, treating as non-match"
            );
            false
        }
    }
}

/// A single declared validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// The attribute must be present and not blank.
    Presence(&'static str),
    /// Text attributes must match `pattern`. Null is skipped (pair with
    /// `Presence` to require it).
    Format {
        /// Attribute to check.
        attribute: &'static str,
        /// Regex the text must match.
        pattern: &'static str,
    },
    /// Text length bounds, in characters. Null is skipped.
    Length {
        /// Attribute to check.
        attribute: &'static str,
        /// Inclusive minimum.
        min: Option<usize>,
        /// Inclusive maximum.
        max: Option<usize>,
    },
}

impl Validation {
    /// Attribute this validation inspects.
    #[must_use]
    pub const fn attribute(&self) -> &'static str {
        match self {
            Validation::Presence(attribute)
            | Validation::Format { attribute, .. }
            | Validation::Length { attribute, .. } => *attribute,
        }
    }

    /// Evaluate against the attribute's current value.
    ///
    /// Returns the error message on failure.
    pub fn check(&self, value: Option<&Value>) -> Option<String> {
        let value = value.unwrap_or(&Value::Null);
        match self {
            Validation::Presence(_) => value.is_blank().then(|| "can't be blank".to_string()),
            Validation::Format { pattern, .. } => match value {
                Value::Null => None,
                Value::Text(s) if matches_pattern(s, pattern) => None,
                _ => Some("is invalid".to_string()),
            },
            Validation::Length { min, max, .. } => {
                let len = value.as_str()?.chars().count();
                if let Some(min) = min.filter(|m| len < *m) {
                    return Some(format!("is too short (minimum is {min} characters)"));
                }
                if let Some(max) = max.filter(|m| len > *m) {
                    return Some(format!("is too long (maximum is {max} characters)"));
                }
                None
            }
        }
    }
}

/// Validation failures keyed by attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    /// Create an empty error set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for an attribute.
    pub fn add(&mut self, attribute: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(attribute.into())
            .or_default()
            .push(message.into());
    }

    /// Messages for one attribute.
    pub fn on(&self, attribute: &str) -> &[String] {
        self.errors.get(attribute).map_or(&[], Vec::as_slice)
    }

    /// True when nothing failed.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Total number of messages.
    pub fn len(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    /// Drop all recorded failures.
    pub fn clear(&mut self) {
        self.errors.clear();
    }

    /// "attribute message" strings, ordered by attribute.
    pub fn full_messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .flat_map(|(attr, msgs)| msgs.iter().map(move |m| format!("{attr} {m}")))
            .collect()
    }
}
