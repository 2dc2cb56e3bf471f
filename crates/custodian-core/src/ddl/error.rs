//! Physical schema errors.

use thiserror::Error;

/// Errors raised while synthesizing, diffing or executing DDL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DdlError {
    /// A field type has no column type.
    #[error("table '{table}': unsupported column type for field '{field}' of type '{field_type}'")]
    UnsupportedColumnType {
        /// Table name.
        table: String,
        /// Field name.
        field: String,
        /// Logical field type.
        field_type: String,
    },

    /// A field/link combination cannot be mapped to columns.
    #[error("table '{table}': unsupported link type for field '{field}': {reason}")]
    UnsupportedLinkType {
        /// Table name.
        table: String,
        /// Field name.
        field: String,
        /// Why the combination is rejected.
        reason: String,
    },

    /// The table does not exist in the live catalog.
    #[error("table '{table}' not found")]
    NotFound {
        /// Table name.
        table: String,
    },

    /// A default value cannot be rendered.
    #[error("table '{table}': wrong default value for field '{field}': {reason}")]
    WrongDefaultValue {
        /// Table name.
        table: String,
        /// Field name.
        field: String,
        /// Why the default is rejected.
        reason: String,
    },

    /// A statement failed against the live catalog.
    #[error("error while executing statement '{statement}': {message}")]
    Execution {
        /// Statement identity, e.g. `add_column#o_a.title`.
        statement: String,
        /// Failure reported by the catalog.
        message: String,
    },
}

impl DdlError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            DdlError::UnsupportedColumnType { .. } => "unsupported_column_type",
            DdlError::UnsupportedLinkType { .. } => "unsupported_link_type",
            DdlError::NotFound { .. } => "not_found",
            DdlError::WrongDefaultValue { .. } => "wrong_default_value",
            DdlError::Execution { .. } => "exec_ddl",
        }
    }

    /// Whether this is the "table does not exist" outcome of introspection.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DdlError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = DdlError::NotFound {
            table: "o_a".to_string(),
        };
        assert_eq!(err.code(), "not_found");
        assert!(err.is_not_found());

        let err = DdlError::Execution {
            statement: "add_column#o_a.title".to_string(),
            message: "column already exists".to_string(),
        };
        assert_eq!(err.code(), "exec_ddl");
        assert!(err.to_string().contains("add_column#o_a.title"));
    }
}
