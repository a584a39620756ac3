//! Error types shared by every massguard layer.

use crate::record::RecordRef;

/// Result alias used throughout massguard.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while building or creating associated records.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The assignment policy refused one or more attributes.
    #[error("can't mass-assign protected attributes for {model}: {}", .attributes.join(", "))]
    ForbiddenAttributes {
        /// Model the attributes were assigned to.
        model: String,
        /// Rejected attribute names, sorted.
        attributes: Vec<String>,
    },

    /// A create was attempted through an owner that has not been saved.
    #[error("{0}")]
    RecordNotSaved(String),

    /// A strict create failed validation. The unsaved record is attached.
    #[error("validation failed: {}", .0.error_summary())]
    RecordInvalid(RecordRef),

    /// A join-mediated association whose chain has more than one hop.
    #[error("cannot build records through nested through association '{reflection}'")]
    UnsupportedNestedThrough {
        /// Name of the offending association.
        reflection: String,
    },

    /// No model with this name is registered.
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    /// The model has no association with this name.
    #[error("model '{model}' has no association named '{name}'")]
    UnknownReflection {
        /// Model that was searched.
        model: String,
        /// Association name that was requested.
        name: String,
    },

    /// The attribute is not a column of the model.
    #[error("unknown attribute '{attribute}' for {model}")]
    UnknownAttribute {
        /// Model that was assigned to.
        model: String,
        /// The unknown attribute.
        attribute: String,
    },

    /// Transaction misuse (commit/rollback with nothing open).
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Malformed caller input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// The record carried by a `RecordInvalid` error.
    pub fn record(&self) -> Option<&RecordRef> {
        match self {
            Error::RecordInvalid(record) => Some(record),
            _ => None,
        }
    }

    /// Whether this error came from the assignment policy.
    pub const fn is_forbidden_attributes(&self) -> bool {
        matches!(self, Error::ForbiddenAttributes { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_attributes_message() {
        let err = Error::ForbiddenAttributes {
            model: "Post".to_string(),
            attributes: vec!["admin".to_string(), "author_id".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "can't mass-assign protected attributes for Post: admin, author_id"
        );
        assert!(err.is_forbidden_attributes());
        assert!(err.record().is_none());
    }

    #[test]
    fn test_record_not_saved_message() {
        let err = Error::RecordNotSaved("cannot create unless the parent is saved".to_string());
        assert_eq!(err.to_string(), "cannot create unless the parent is saved");
    }
}
