//! Raw, storage-agnostic object type descriptions.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::action::Action;
use super::error::MetaError;
use super::field::Field;
use super::types::FieldType;

/// Name of the optimistic-concurrency field of a `cas` type.
pub const CAS_FIELD: &str = "cas";

/// An object type description.
///
/// Descriptions are values: every change produces a new description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaDescription {
    /// Type name.
    pub name: String,
    /// Name of the key field.
    pub key: String,
    /// Fields, in declaration order.
    pub fields: Vec<Field>,
    /// Actions.
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Whether optimistic concurrency control is enabled.
    #[serde(default)]
    pub cas: bool,
}

impl MetaDescription {
    /// Create a description without fields.
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            fields: Vec::new(),
            actions: Vec::new(),
            cas: false,
        }
    }

    /// Add a field.
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Add an action.
    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Enable or disable optimistic concurrency.
    pub fn with_cas(mut self, cas: bool) -> Self {
        self.cas = cas;
        self
    }

    /// Find a field by name.
    pub fn find_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Find an action by name.
    pub fn find_action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// The key field, if present.
    pub fn key_field(&self) -> Option<&Field> {
        self.find_field(&self.key)
    }

    /// Append a field.
    pub fn add_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// Remove a field by name, returning it.
    pub fn remove_field(&mut self, name: &str) -> Option<Field> {
        let index = self.fields.iter().position(|f| f.name == name)?;
        Some(self.fields.remove(index))
    }

    /// Replace the field named `name` in place, keeping its position.
    pub fn replace_field(&mut self, name: &str, field: Field) -> bool {
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(slot) => {
                *slot = field;
                true
            }
            None => false,
        }
    }

    /// Append an action.
    pub fn add_action(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Remove an action by name, returning it.
    pub fn remove_action(&mut self, name: &str) -> Option<Action> {
        let index = self.actions.iter().position(|a| a.name == name)?;
        Some(self.actions.remove(index))
    }

    /// Replace the action named `name` in place.
    pub fn replace_action(&mut self, name: &str, action: Action) -> bool {
        match self.actions.iter_mut().find(|a| a.name == name) {
            Some(slot) => {
                *slot = action;
                true
            }
            None => false,
        }
    }

    /// Fill in omitted values on every field.
    pub fn normalize(&mut self) {
        for field in &mut self.fields {
            field.normalize();
        }
    }

    /// Normalized copy.
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// Check the invariants that do not need any other type.
    pub fn validate(&self) -> Result<(), MetaError> {
        let mut names = HashSet::new();
        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return Err(MetaError::DuplicateField {
                    meta: self.name.clone(),
                    field: field.name.clone(),
                });
            }
            if !field.optional && field.has_default() {
                return Err(MetaError::MandatoryFieldWithDefault {
                    meta: self.name.clone(),
                    field: field.name.clone(),
                });
            }
        }

        let mut actions = HashSet::new();
        for action in &self.actions {
            if !actions.insert(action.name.as_str()) {
                return Err(MetaError::DuplicateAction {
                    meta: self.name.clone(),
                    action: action.name.clone(),
                });
            }
        }

        match self.key_field() {
            None => {
                return Err(MetaError::KeyNotFound {
                    meta: self.name.clone(),
                    key: self.key.clone(),
                })
            }
            Some(key) if !key.is_simple() => {
                return Err(MetaError::KeyNotSimple {
                    meta: self.name.clone(),
                    key: self.key.clone(),
                })
            }
            Some(_) => {}
        }

        if self.cas {
            match self.find_field(CAS_FIELD) {
                None => {
                    return Err(MetaError::CasFieldMissing {
                        meta: self.name.clone(),
                        reason: "the field 'cas' is absent".to_string(),
                    })
                }
                Some(field) if field.field_type != FieldType::Number => {
                    return Err(MetaError::CasFieldMissing {
                        meta: self.name.clone(),
                        reason: format!("the field 'cas' is of type '{}', not 'number'", field.field_type),
                    })
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    /// Inner links (object and generic) owned by this type.
    pub fn inner_links(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(|f| f.is_inner_object() || f.is_inner_generic())
    }

    /// Names of every type this description references.
    pub fn referenced_types(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for field in &self.fields {
            if let Some(target) = field.link_meta.as_deref() {
                names.push(target);
            }
            names.extend(field.link_meta_list.iter().map(String::as_str));
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::field::DefaultValue;

    fn base(name: &str) -> MetaDescription {
        MetaDescription::new(name, "id").with_field(
            Field::optional("id", FieldType::Number).with_default(DefaultValue::nextval()),
        )
    }

    #[test]
    fn test_valid_description() {
        let meta = base("a")
            .with_field(Field::new("title", FieldType::String))
            .with_field(Field::optional("cas", FieldType::Number))
            .with_cas(true);
        assert!(meta.validate().is_ok());
    }

    #[test]
    fn test_duplicate_field() {
        let meta = base("a").with_field(Field::new("id", FieldType::String));
        assert_eq!(
            meta.validate(),
            Err(MetaError::DuplicateField {
                meta: "a".to_string(),
                field: "id".to_string()
            })
        );
    }

    #[test]
    fn test_key_rules() {
        let meta = MetaDescription::new("a", "pk").with_field(Field::new("id", FieldType::Number));
        assert!(matches!(meta.validate(), Err(MetaError::KeyNotFound { .. })));

        let meta = MetaDescription::new("a", "owner").with_field(Field::inner_link("owner", "b"));
        assert!(matches!(meta.validate(), Err(MetaError::KeyNotSimple { .. })));
    }

    #[test]
    fn test_cas_rules() {
        let meta = base("a").with_cas(true);
        assert!(matches!(meta.validate(), Err(MetaError::CasFieldMissing { .. })));

        let meta = base("a")
            .with_field(Field::new("cas", FieldType::String))
            .with_cas(true);
        assert!(matches!(meta.validate(), Err(MetaError::CasFieldMissing { .. })));
    }

    #[test]
    fn test_mandatory_field_with_default() {
        let meta = base("a")
            .with_field(Field::new("count", FieldType::Number).with_default(DefaultValue::constant(1)));
        assert!(matches!(
            meta.validate(),
            Err(MetaError::MandatoryFieldWithDefault { ref field, .. }) if field == "count"
        ));
    }

    #[test]
    fn test_field_editing_keeps_order() {
        let mut meta = base("a")
            .with_field(Field::new("x", FieldType::String))
            .with_field(Field::new("y", FieldType::String));
        assert!(meta.replace_field("x", Field::new("z", FieldType::Bool)));
        let names: Vec<_> = meta.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "z", "y"]);

        assert!(meta.remove_field("z").is_some());
        assert!(meta.remove_field("z").is_none());
    }

    #[test]
    fn test_json_round_trip_shape() {
        let json = r#"{
            "name": "b",
            "key": "id",
            "fields": [
                {"name": "id", "type": "number", "optional": true, "default": {"func": "nextval"}},
                {"name": "target_object", "type": "generic", "linkType": "inner", "linkMetaList": ["a"]}
            ]
        }"#;
        let meta: MetaDescription = serde_json::from_str(json).unwrap();
        assert!(meta.actions.is_empty());
        assert!(!meta.cas);
        assert_eq!(meta.referenced_types(), vec!["a"]);
        assert_eq!(meta.inner_links().count(), 1);
    }
}
