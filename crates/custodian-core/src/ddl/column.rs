//! Column types and column defaults.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::DdlError;
use crate::meta::{DefaultValue, Field, FieldType};

/// Prefix of every table backing an object type.
pub const TABLE_PREFIX: &str = "o_";

/// Table backing the object type `meta`.
pub fn table_name(meta: &str) -> String {
    format!("{}{}", TABLE_PREFIX, meta)
}

/// Dedicated sequence of an auto-increment field.
pub fn sequence_name(meta: &str, field: &str) -> String {
    format!("{}{}_{}_seq", TABLE_PREFIX, meta, field)
}

/// SQL column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// `text`
    Text,
    /// `numeric`
    Numeric,
    /// `bool`
    Bool,
    /// `date`
    Date,
    /// `timestamp with time zone`
    Timestamp,
    /// `time with time zone`
    Time,
}

impl ColumnType {
    /// Column type of a simple field type.
    pub fn from_field_type(field_type: FieldType) -> Option<Self> {
        match field_type {
            FieldType::String => Some(ColumnType::Text),
            FieldType::Number => Some(ColumnType::Numeric),
            FieldType::Bool => Some(ColumnType::Bool),
            FieldType::Date => Some(ColumnType::Date),
            FieldType::DateTime => Some(ColumnType::Timestamp),
            FieldType::Time => Some(ColumnType::Time),
            FieldType::Object | FieldType::Array | FieldType::Objects | FieldType::Generic => None,
        }
    }

    /// SQL spelling.
    pub fn ddl_type(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Numeric => "numeric",
            ColumnType::Bool => "bool",
            ColumnType::Date => "date",
            ColumnType::Timestamp => "timestamp with time zone",
            ColumnType::Time => "time with time zone",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ddl_type())
    }
}

/// Default clause of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnDefault {
    /// Literal string, number or boolean.
    Literal {
        /// The literal.
        value: Value,
    },
    /// `nextval('<sequence>')`
    Sequence {
        /// Sequence name.
        name: String,
    },
    /// `CURRENT_DATE`
    CurrentDate,
    /// `CURRENT_TIMESTAMP`
    CurrentTimestamp,
    /// `NOW()`
    Now,
    /// Any other function call.
    Function {
        /// Function name.
        name: String,
        /// Literal arguments.
        args: Vec<Value>,
    },
}

fn literal_to_sql(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(format!("'{}'", s.replace('\'', "''"))),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn is_literal(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

impl ColumnDefault {
    /// Build the default clause of `field` on type `meta`.
    ///
    /// `nextval` gets a dedicated sequence named after the type and the
    /// field unless its first argument names one.
    pub fn for_field(meta: &str, field: &Field) -> Result<Option<Self>, DdlError> {
        let wrong = |reason: &str| DdlError::WrongDefaultValue {
            table: table_name(meta),
            field: field.name.clone(),
            reason: reason.to_string(),
        };

        let default = match &field.default {
            None => return Ok(None),
            Some(default) => default,
        };

        let column_default = match default {
            DefaultValue::Constant(value) => {
                if !is_literal(value) {
                    return Err(wrong("only string, number and bool constants are supported"));
                }
                ColumnDefault::Literal {
                    value: value.clone(),
                }
            }
            DefaultValue::Function { func, args } => match func.to_ascii_lowercase().as_str() {
                "nextval" => {
                    let name = match args.first() {
                        None => sequence_name(meta, &field.name),
                        Some(Value::String(name)) => name.clone(),
                        Some(_) => return Err(wrong("nextval expects a sequence name")),
                    };
                    ColumnDefault::Sequence { name }
                }
                "current_date" => ColumnDefault::CurrentDate,
                "current_timestamp" => ColumnDefault::CurrentTimestamp,
                "now" => ColumnDefault::Now,
                _ => {
                    if !args.iter().all(is_literal) {
                        return Err(wrong("function arguments must be literals"));
                    }
                    ColumnDefault::Function {
                        name: func.clone(),
                        args: args.clone(),
                    }
                }
            },
        };
        Ok(Some(column_default))
    }

    /// Sequence this default draws from, if any.
    pub fn sequence(&self) -> Option<&str> {
        match self {
            ColumnDefault::Sequence { name } => Some(name),
            _ => None,
        }
    }

    /// SQL spelling.
    pub fn to_sql(&self) -> String {
        match self {
            ColumnDefault::Literal { value } => literal_to_sql(value).unwrap_or_else(|| "NULL".to_string()),
            ColumnDefault::Sequence { name } => format!("nextval('{}')", name),
            ColumnDefault::CurrentDate => "CURRENT_DATE".to_string(),
            ColumnDefault::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
            ColumnDefault::Now => "NOW()".to_string(),
            ColumnDefault::Function { name, args } => {
                let args: Vec<String> = args.iter().filter_map(literal_to_sql).collect();
                format!("{}({})", name, args.join(","))
            }
        }
    }
}

impl fmt::Display for ColumnDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}
