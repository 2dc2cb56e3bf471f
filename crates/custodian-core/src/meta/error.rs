//! Validation and resolution errors of the type model.

use thiserror::Error;

/// Errors raised while validating or resolving object type descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetaError {
    /// An external string does not name any variant of an enum.
    #[error("invalid {kind}: '{value}'")]
    InvalidEnum {
        /// Which enum was being parsed.
        kind: &'static str,
        /// The offending string.
        value: String,
    },

    /// Two fields share a name.
    #[error("object '{meta}' contains duplicated field '{field}'")]
    DuplicateField {
        /// Object type name.
        meta: String,
        /// Duplicated field name.
        field: String,
    },

    /// Two actions share a name.
    #[error("object '{meta}' contains duplicated action '{action}'")]
    DuplicateAction {
        /// Object type name.
        meta: String,
        /// Duplicated action name.
        action: String,
    },

    /// The declared key field does not exist.
    #[error("object '{meta}' is incorrect: key field '{key}' not found")]
    KeyNotFound {
        /// Object type name.
        meta: String,
        /// Declared key.
        key: String,
    },

    /// The key field is a link.
    #[error("object '{meta}' is incorrect: key field '{key}' is not simple")]
    KeyNotSimple {
        /// Object type name.
        meta: String,
        /// Declared key.
        key: String,
    },

    /// `cas` is enabled without a numeric `cas` field.
    #[error("object '{meta}' has cas enabled but {reason}")]
    CasFieldMissing {
        /// Object type name.
        meta: String,
        /// What is wrong with the `cas` field.
        reason: String,
    },

    /// A mandatory field declares a default.
    #[error("field '{field}' of object '{meta}' is mandatory and cannot have a default value")]
    MandatoryFieldWithDefault {
        /// Object type name.
        meta: String,
        /// Field name.
        field: String,
    },

    /// A referenced field does not exist.
    #[error("object '{meta}' has no field '{field}'")]
    FieldNotFound {
        /// Object type name.
        meta: String,
        /// Missing field name.
        field: String,
    },

    /// A link references a type that does not exist.
    #[error("field '{field}' of object '{meta}' references object '{target}', which does not exist")]
    LinkTargetNotFound {
        /// Object type name.
        meta: String,
        /// Link field name.
        field: String,
        /// Missing target type.
        target: String,
    },

    /// A link is structurally wrong.
    #[error("field '{field}' of object '{meta}' has incorrect link: {reason}")]
    LinkTargetInvalid {
        /// Object type name.
        meta: String,
        /// Link field name.
        field: String,
        /// Rule that was violated.
        reason: String,
    },

    /// A key value cannot be coerced to the field's type.
    #[error("value '{value}' is not valid for field '{field}': {reason}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl MetaError {
    /// Name of the object type the error is about, if any.
    pub fn meta(&self) -> Option<&str> {
        match self {
            MetaError::DuplicateField { meta, .. }
            | MetaError::DuplicateAction { meta, .. }
            | MetaError::KeyNotFound { meta, .. }
            | MetaError::KeyNotSimple { meta, .. }
            | MetaError::CasFieldMissing { meta, .. }
            | MetaError::MandatoryFieldWithDefault { meta, .. }
            | MetaError::FieldNotFound { meta, .. }
            | MetaError::LinkTargetNotFound { meta, .. }
            | MetaError::LinkTargetInvalid { meta, .. } => Some(meta),
            MetaError::InvalidEnum { .. } | MetaError::InvalidValue { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MetaError::DuplicateField {
            meta: "a".to_string(),
            field: "title".to_string(),
        };
        assert_eq!(err.to_string(), "object 'a' contains duplicated field 'title'");
        assert_eq!(err.meta(), Some("a"));

        let err = MetaError::LinkTargetNotFound {
            meta: "b".to_string(),
            field: "owner".to_string(),
            target: "c".to_string(),
        };
        assert!(err.to_string().contains("'c'"));
    }
}
