use thiserror::Error;

use crate::ids::EntityId;
use crate::kind::EntityKind;

/// Computed parameters the document would reject no matter what.
/// Raised before any document call.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid {field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Failures reported by the host document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DocumentError {
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("attribute '{attribute}' is read-only")]
    ReadOnlyAttribute { attribute: String },
    #[error("attribute '{attribute}' is not applicable to {kind}")]
    NotApplicable { attribute: String, kind: EntityKind },
    #[error("{0} has dependents that cannot be removed")]
    HasIrremovableDependents(EntityId),
    #[error("{0} does not exist")]
    NotFound(EntityId),
    #[error("transaction error: {0}")]
    Transaction(String),
    #[error("document backend error: {0}")]
    Backend(String),
}

impl DocumentError {
    /// Whether the reconciler may fall back to Recreate on this error.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, DocumentError::ConstraintViolation(_))
    }
}

/// Failure of a single node evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NodeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("no reconciler registered for kind '{0}'")]
    UnknownKind(EntityKind),
    #[error("output slot '{0}' is not declared by this node")]
    UndeclaredSlot(String),
}

pub type Result<T> = std::result::Result<T, NodeError>;
