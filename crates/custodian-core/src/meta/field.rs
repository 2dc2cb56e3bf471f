//! Field definitions for object types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{FieldType, LinkType, OnDelete};

/// Suffix of automatically generated reverse fields.
pub const REVERSE_FIELD_SUFFIX: &str = "_set";

/// Name of the reverse field a type receives for an inner link owned by `owner`.
pub fn reverse_field_name(owner: &str) -> String {
    format!("{}{}", owner, REVERSE_FIELD_SUFFIX)
}

/// Column holding the target type name of a generic inner link.
pub fn generic_type_column(field: &str) -> String {
    format!("{}__type", field)
}

/// Column holding the stringified target key of a generic inner link.
pub fn generic_key_column(field: &str) -> String {
    format!("{}__key", field)
}

/// Name of the join type behind an `objects` field.
pub fn join_type_name(owner: &str, target: &str) -> String {
    format!("{}__{}", owner, target)
}

fn default_true() -> bool {
    true
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Default value of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    /// Function evaluated by the store, e.g. `nextval` or `now`.
    Function {
        /// Function name.
        func: String,
        /// Function arguments.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<Value>,
    },
    /// Literal constant.
    Constant(Value),
}

impl DefaultValue {
    /// A constant default.
    pub fn constant(value: impl Into<Value>) -> Self {
        DefaultValue::Constant(value.into())
    }

    /// A function default without arguments.
    pub fn function(func: impl Into<String>) -> Self {
        DefaultValue::Function {
            func: func.into(),
            args: Vec::new(),
        }
    }

    /// The `nextval` auto-increment default.
    pub fn nextval() -> Self {
        Self::function("nextval")
    }

    /// Function name, if this is a function default.
    pub fn func(&self) -> Option<&str> {
        match self {
            DefaultValue::Function { func, .. } => Some(func),
            DefaultValue::Constant(_) => None,
        }
    }
}

/// A field definition within an object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// Field name, unique within the type.
    pub name: String,
    /// Field type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Target type of a single-target link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_meta: Option<String>,
    /// Target types of a generic link, as an ordered set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link_meta_list: Vec<String>,
    /// Link side, for link fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<LinkType>,
    /// For outer links: the inner field on the far side this field reflects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outer_link_field: Option<String>,
    /// Whether the field may be left empty.
    #[serde(default)]
    pub optional: bool,
    /// On-delete strategy of an inner link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<OnDelete>,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    /// Whether values must be unique.
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,
    /// Whether the field can be used in queries.
    #[serde(default = "default_true")]
    pub query_mode: bool,
    /// Whether the field can be retrieved and set directly.
    #[serde(default = "default_true")]
    pub retrieve_mode: bool,
}

impl Field {
    /// Create a mandatory simple field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            link_meta: None,
            link_meta_list: Vec::new(),
            link_type: None,
            outer_link_field: None,
            optional: false,
            on_delete: None,
            default: None,
            unique: false,
            query_mode: true,
            retrieve_mode: true,
        }
    }

    /// Create an optional simple field.
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self::new(name, field_type).with_optional(true)
    }

    /// Create an inner object link to `target`.
    pub fn inner_link(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut field = Self::new(name, FieldType::Object);
        field.link_meta = Some(target.into());
        field.link_type = Some(LinkType::Inner);
        field
    }

    /// Create an outer link reflecting `outer_link_field` of `target`.
    pub fn outer_link(
        name: impl Into<String>,
        field_type: FieldType,
        target: impl Into<String>,
        outer_link_field: impl Into<String>,
    ) -> Self {
        let mut field = Self::new(name, field_type);
        field.link_meta = Some(target.into());
        field.link_type = Some(LinkType::Outer);
        field.outer_link_field = Some(outer_link_field.into());
        field.optional = true;
        field
    }

    /// Create a generic inner link to any of `targets`.
    pub fn generic_link<I, S>(name: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut field = Self::new(name, FieldType::Generic);
        field.link_meta_list = targets.into_iter().map(Into::into).collect();
        field.link_type = Some(LinkType::Inner);
        field
    }

    /// Create a many-to-many link to `target`.
    pub fn objects_link(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut field = Self::new(name, FieldType::Objects);
        field.link_meta = Some(target.into());
        field.link_type = Some(LinkType::Inner);
        field.optional = true;
        field
    }

    /// Set the optional flag.
    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Set the on-delete strategy.
    pub fn with_on_delete(mut self, on_delete: OnDelete) -> Self {
        self.on_delete = Some(on_delete);
        self
    }

    /// Mark as unique.
    pub fn with_unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Set the query/retrieve visibility flags.
    pub fn with_modes(mut self, query_mode: bool, retrieve_mode: bool) -> Self {
        self.query_mode = query_mode;
        self.retrieve_mode = retrieve_mode;
        self
    }

    /// True unless this is a link field.
    pub fn is_simple(&self) -> bool {
        self.field_type.is_simple()
    }

    /// Whether this is an inner link.
    pub fn is_inner(&self) -> bool {
        self.link_type == Some(LinkType::Inner)
    }

    /// Whether this is an outer link.
    pub fn is_outer(&self) -> bool {
        self.link_type == Some(LinkType::Outer)
    }

    /// Inner single-object link.
    pub fn is_inner_object(&self) -> bool {
        self.field_type == FieldType::Object && self.is_inner()
    }

    /// Inner polymorphic link.
    pub fn is_inner_generic(&self) -> bool {
        self.field_type == FieldType::Generic && self.is_inner()
    }

    /// Outer polymorphic link.
    pub fn is_outer_generic(&self) -> bool {
        self.field_type == FieldType::Generic && self.is_outer()
    }

    /// Whether a default value is declared.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Effective on-delete strategy.
    pub fn on_delete_strategy(&self) -> OnDelete {
        self.on_delete.unwrap_or_default()
    }

    /// Whether `linkMetaList` holds the same names as `other`'s, ignoring order.
    pub fn same_link_meta_list(&self, other: &Field) -> bool {
        let mine: std::collections::BTreeSet<&str> =
            self.link_meta_list.iter().map(String::as_str).collect();
        let theirs: std::collections::BTreeSet<&str> =
            other.link_meta_list.iter().map(String::as_str).collect();
        mine == theirs
    }

    /// Fill in values that may be omitted in a description.
    ///
    /// Inner object and generic links without an on-delete strategy get
    /// `cascade`.
    pub fn normalize(&mut self) {
        let needs_strategy = self.field_type == FieldType::Object && !self.is_outer()
            || self.is_inner_generic();
        if needs_strategy && self.on_delete.is_none() {
            self.on_delete = Some(OnDelete::Cascade);
        }
    }
}
