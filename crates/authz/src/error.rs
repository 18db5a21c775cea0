//! Authorization error types.

use thiserror::Error;
use uuid::Uuid;

/// Authorization errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A record for this `(action, entity, role)` triple already exists.
    ///
    /// Under concurrent writers this means another caller created the record
    /// first; retrying the grant/deny turns it into an update.
    #[error("permission already exists for action '{action}', role '{role}'{}", entity_suffix(.entity))]
    DuplicateKey {
        action: String,
        role: String,
        entity: Option<String>,
    },

    /// An update referenced a record id that does not exist.
    #[error("permission record not found: {0}")]
    NotFound(Uuid),

    /// A typed parameter field had no value to store.
    #[error("parameter field '{field}' is null")]
    NullField { field: String },

    /// A stored parameter value could not be converted into the target field type.
    #[error("parameter '{field}' = '{value}' is not a valid {expected}")]
    ParameterTypeMismatch {
        field: String,
        value: String,
        expected: &'static str,
    },

    /// The parameter type does not have a field-based shape.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// A model value violated its invariants (empty action, `None` verdict on a record, ...).
    #[error("invalid permission: {0}")]
    Invalid(String),

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap a backend-specific error.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(err))
    }

    /// Whether a caller may reasonably retry the operation.
    ///
    /// Only duplicate-key rejections qualify: the racing writer's record now
    /// exists, so a second grant/deny will update it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::DuplicateKey { .. })
    }
}

fn entity_suffix(entity: &Option<String>) -> String {
    entity
        .as_ref()
        .map(|e| format!(", entity '{e}'"))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_is_retryable() {
        let err = Error::DuplicateKey {
            action: "Publish".into(),
            role: "Editor".into(),
            entity: Some("doc-1".into()),
        };
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "permission already exists for action 'Publish', role 'Editor', entity 'doc-1'"
        );
    }

    #[test]
    fn other_errors_are_not_retryable() {
        assert!(!Error::NotFound(Uuid::nil()).is_retryable());
        assert!(!Error::NullField { field: "owner".into() }.is_retryable());
    }
}
