//! Enumerations of the type and link model.
//!
//! Every enum has a stable external string form, used by the JSON
//! description format. Parsing an unknown string fails with
//! [`MetaError::InvalidEnum`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::MetaError;

/// Declares a closed string enum with `as_str`, `FromStr`, `Display` and
/// serde conversions that go through `FromStr`.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// External string form.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }

            /// Every variant, in declaration order.
            pub fn all() -> &'static [$name] {
                &[$( $name::$variant ),+]
            }
        }

        impl FromStr for $name {
            type Err = MetaError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err(MetaError::InvalidEnum {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = MetaError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.as_str().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum! {
    /// Type of a field.
    FieldType, "field type" {
        /// Text.
        String => "string",
        /// Arbitrary-precision number.
        Number => "number",
        /// Boolean.
        Bool => "bool",
        /// Calendar date.
        Date => "date",
        /// Timestamp with time zone.
        DateTime => "datetime",
        /// Time of day with time zone.
        Time => "time",
        /// Single link, inner or outer.
        Object => "object",
        /// Outer reflection of an object link.
        Array => "array",
        /// Many-to-many link through a join type.
        Objects => "objects",
        /// Polymorphic link.
        Generic => "generic",
    }
}

string_enum! {
    /// Which side of a link a field is.
    LinkType, "link type" {
        /// The owning type stores the reference.
        Inner => "inner",
        /// Virtual reflection of an inner link on the far side.
        Outer => "outer",
    }
}

string_enum! {
    /// Method an action is bound to.
    Method, "method" {
        /// Record read.
        Retrieve => "retrieve",
        /// Record creation.
        Create => "create",
        /// Record removal.
        Remove => "remove",
        /// Record update.
        Update => "update",
    }
}

string_enum! {
    /// What happens to a referencing record when its target is deleted.
    OnDelete, "on-delete strategy" {
        /// Delete the referencing record too.
        Cascade => "cascade",
        /// Null out the reference.
        SetNull => "setNull",
        /// Refuse to delete the target.
        Restrict => "restrict",
        /// Reset the reference to the column default.
        SetDefault => "setDefault",
    }
}

impl FieldType {
    /// True unless the type is a link type.
    pub fn is_simple(&self) -> bool {
        !matches!(
            self,
            FieldType::Object | FieldType::Array | FieldType::Objects | FieldType::Generic
        )
    }
}

impl Default for OnDelete {
    fn default() -> Self {
        OnDelete::Cascade
    }
}

impl OnDelete {
    /// SQL form used in foreign key clauses.
    pub fn to_db_value(&self) -> &'static str {
        match self {
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
            OnDelete::Restrict => "RESTRICT",
            OnDelete::SetDefault => "SET DEFAULT",
        }
    }

    /// Parse the SQL form back, as reported by catalog introspection.
    pub fn from_db_value(value: &str) -> Result<Self, MetaError> {
        match value.to_ascii_uppercase().as_str() {
            "CASCADE" => Ok(OnDelete::Cascade),
            "SET NULL" => Ok(OnDelete::SetNull),
            "RESTRICT" => Ok(OnDelete::Restrict),
            "SET DEFAULT" => Ok(OnDelete::SetDefault),
            _ => Err(MetaError::InvalidEnum {
                kind: "on-delete strategy",
                value: value.to_string(),
            }),
        }
    }
}
