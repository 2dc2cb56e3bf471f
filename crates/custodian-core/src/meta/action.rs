//! Actions bound to object types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::Method;

/// A notification trigger owned by an object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Action name, unique within the type.
    pub name: String,
    /// Record method that triggers the action.
    pub method: Method,
    /// Delivery protocol, e.g. `REST` or `TEST`.
    pub protocol: String,
    /// Protocol arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Only fire when the record is changed through a nested write.
    #[serde(default)]
    pub active_if_not_root: bool,
    /// Extra values attached to the notification payload.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub include_values: BTreeMap<String, Value>,
}

impl Action {
    /// Create a new action.
    pub fn new(name: impl Into<String>, method: Method, protocol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            protocol: protocol.into(),
            args: Vec::new(),
            active_if_not_root: false,
            include_values: BTreeMap::new(),
        }
    }

    /// Add a protocol argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set the activation predicate.
    pub fn with_active_if_not_root(mut self, active: bool) -> Self {
        self.active_if_not_root = active;
        self
    }

    /// Attach an extra payload value.
    pub fn with_include_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.include_values.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_json_format() {
        let json = r#"{
            "name": "notify",
            "method": "create",
            "protocol": "REST",
            "args": ["http://localhost/hook"],
            "activeIfNotRoot": true,
            "includeValues": {"amount": "total"}
        }"#;
        let action: Action = serde_json::from_str(json).unwrap();
        assert_eq!(action.method, Method::Create);
        assert!(action.active_if_not_root);
        assert_eq!(action.include_values["amount"], "total");

        let expected = Action::new("notify", Method::Create, "REST")
            .with_arg("http://localhost/hook")
            .with_active_if_not_root(true)
            .with_include_value("amount", "total");
        assert_eq!(action, expected);
    }
}
