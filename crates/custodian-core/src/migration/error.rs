//! Migration-specific error types.

use thiserror::Error;

use crate::ddl::DdlError;
use crate::error::Error;
use crate::meta::MetaError;

/// Migration-specific errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The migration is already recorded in history.
    #[error("migration with id '{id}' has already been applied")]
    AlreadyApplied {
        /// Migration id.
        id: String,
    },

    /// The migration description is malformed or cannot be applied.
    #[error("invalid migration description: {reason}")]
    InvalidDescription {
        /// What is wrong with it.
        reason: String,
    },

    /// Current and desired descriptions are identical.
    #[error("no changes were detected")]
    NoChangesDetected,

    /// Siblings were applied after the migration was constructed.
    #[error("migration '{id}': its parents have changed since it was constructed")]
    ParentsChanged {
        /// Migration id.
        id: String,
    },

    /// The migration conflicts with an applied sibling.
    #[error("migration '{id}' cannot be applied along with its siblings: {reason}")]
    NotCompatibleWithSiblings {
        /// Migration id.
        id: String,
        /// The conflicting operation.
        reason: String,
    },

    /// The history of the target type moved on since the migration was built.
    #[error("migration '{id}' is not actual: {reason}")]
    IsNotActual {
        /// Migration id.
        id: String,
        /// Why it is outdated.
        reason: String,
    },

    /// A field cannot be reverted because the parent snapshot lacks it.
    #[error("field '{field}' was not found in the previous state of object '{meta}'")]
    PreviousStateFieldNotFound {
        /// Type name.
        meta: String,
        /// Field name.
        field: String,
    },

    /// An action cannot be reverted because the parent snapshot lacks it.
    #[error("action '{action}' was not found in the previous state of object '{meta}'")]
    PreviousStateActionNotFound {
        /// Type name.
        meta: String,
        /// Action name.
        action: String,
    },

    /// The requested change is not supported.
    #[error("not implemented: {reason}")]
    NotImplemented {
        /// The unsupported change.
        reason: String,
    },

    /// No applied migration has this id.
    #[error("migration '{id}' not found")]
    NotFound {
        /// Migration id.
        id: String,
    },

    /// Invalid or inconsistent description.
    #[error(transparent)]
    Meta(#[from] MetaError),

    /// Physical schema error.
    #[error(transparent)]
    Ddl(#[from] DdlError),

    /// Store error.
    #[error(transparent)]
    Store(Error),
}

impl MigrationError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            MigrationError::AlreadyApplied { .. } => "migration_already_applied",
            MigrationError::InvalidDescription { .. } => "invalid_description",
            MigrationError::NoChangesDetected => "no_changes_were_detected",
            MigrationError::ParentsChanged { .. } => "parents_changed",
            MigrationError::NotCompatibleWithSiblings { .. } => "not_compatible_with_siblings",
            MigrationError::IsNotActual { .. } => "is_not_actual",
            MigrationError::PreviousStateFieldNotFound { .. } => "previous_state_field_not_found",
            MigrationError::PreviousStateActionNotFound { .. } => "previous_state_action_not_found",
            MigrationError::NotImplemented { .. } => "not_implemented",
            MigrationError::NotFound { .. } => "migration_not_found",
            MigrationError::Meta(_) => "invalid_object",
            MigrationError::Ddl(e) => e.code(),
            MigrationError::Store(_) => "store_error",
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        MigrationError::InvalidDescription { reason: reason.into() }
    }

    pub(crate) fn not_implemented(reason: impl Into<String>) -> Self {
        MigrationError::NotImplemented { reason: reason.into() }
    }
}

impl From<Error> for MigrationError {
    fn from(e: Error) -> Self {
        match e {
            Error::Meta(e) => MigrationError::Meta(e),
            Error::Ddl(e) => MigrationError::Ddl(e),
            e => MigrationError::Store(e),
        }
    }
}

impl From<serde_json::Error> for MigrationError {
    fn from(e: serde_json::Error) -> Self {
        MigrationError::Store(e.into())
    }
}
