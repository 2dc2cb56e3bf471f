//! Migration descriptions: the persisted and exchanged migration format.
//!
//! ```json
//! {
//!   "id": "3f9a1c2e",
//!   "applyTo": "a",
//!   "dependsOn": ["7b0d44f1"],
//!   "operations": [
//!     {"type": "addField", "field": {"name": "title", "type": "string", "optional": true}},
//!     {"type": "updateField", "field": {"name": "name", "type": "string", "previousName": "title"}}
//!   ],
//!   "metaState": {"name": "a", "key": "id", "fields": []},
//!   "description": "add title"
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::error::MigrationError;
use crate::meta::{Action, Field, MetaDescription};
use crate::store::HistoryRecord;

/// Length of generated migration ids.
pub const MIGRATION_ID_LENGTH: usize = 8;

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a fresh migration id.
pub fn generate_migration_id() -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut hasher = blake3::Hasher::new();
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&counter.to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    let mut id = hex::encode(hasher.finalize().as_bytes());
    id.truncate(MIGRATION_ID_LENGTH);
    id
}

fn is_empty(value: &str) -> bool {
    value.is_empty()
}

/// A field together with the name it had before the migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationFieldDescription {
    /// The field.
    #[serde(flatten)]
    pub field: Field,
    /// Name of the field before the migration, empty if unchanged.
    #[serde(default, skip_serializing_if = "is_empty")]
    pub previous_name: String,
}

impl MigrationFieldDescription {
    /// Wrap a field without a previous name.
    pub fn new(field: Field) -> Self {
        Self {
            field,
            previous_name: String::new(),
        }
    }

    /// Wrap a field that used to be called `previous_name`.
    pub fn renamed(field: Field, previous_name: impl Into<String>) -> Self {
        Self {
            field,
            previous_name: previous_name.into(),
        }
    }

    /// Name to look the field up by in the current description.
    pub fn lookup_name(&self) -> &str {
        if self.previous_name.is_empty() {
            &self.field.name
        } else {
            &self.previous_name
        }
    }
}

/// An action together with the name it had before the migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationActionDescription {
    /// The action.
    #[serde(flatten)]
    pub action: Action,
    /// Name of the action before the migration, empty if unchanged.
    #[serde(default, skip_serializing_if = "is_empty")]
    pub previous_name: String,
}

impl MigrationActionDescription {
    /// Wrap an action without a previous name.
    pub fn new(action: Action) -> Self {
        Self {
            action,
            previous_name: String::new(),
        }
    }

    /// Wrap an action that used to be called `previous_name`.
    pub fn renamed(action: Action, previous_name: impl Into<String>) -> Self {
        Self {
            action,
            previous_name: previous_name.into(),
        }
    }

    /// Name to look the action up by in the current description.
    pub fn lookup_name(&self) -> &str {
        if self.previous_name.is_empty() {
            &self.action.name
        } else {
            &self.previous_name
        }
    }
}

/// One operation of a migration, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MigrationOperationDescription {
    /// Create a type.
    CreateObject {
        /// The new description.
        object: MetaDescription,
    },
    /// Rename the type to `object.name`.
    RenameObject {
        /// Description carrying the new name.
        object: MetaDescription,
    },
    /// Delete the type.
    DeleteObject {
        /// Description of the deleted type.
        object: MetaDescription,
    },
    /// Add a field.
    AddField {
        /// The new field.
        field: MigrationFieldDescription,
    },
    /// Remove a field.
    RemoveField {
        /// The removed field.
        field: MigrationFieldDescription,
    },
    /// Replace the field named `field.previousName` (or `field.name`).
    UpdateField {
        /// The new field.
        field: MigrationFieldDescription,
    },
    /// Add an action.
    AddAction {
        /// The new action.
        action: MigrationActionDescription,
    },
    /// Remove an action.
    RemoveAction {
        /// The removed action.
        action: MigrationActionDescription,
    },
    /// Replace the action named `action.previousName` (or `action.name`).
    UpdateAction {
        /// The new action.
        action: MigrationActionDescription,
    },
}

impl MigrationOperationDescription {
    /// External tag of the operation.
    pub fn kind(&self) -> &'static str {
        match self {
            MigrationOperationDescription::CreateObject { .. } => "createObject",
            MigrationOperationDescription::RenameObject { .. } => "renameObject",
            MigrationOperationDescription::DeleteObject { .. } => "deleteObject",
            MigrationOperationDescription::AddField { .. } => "addField",
            MigrationOperationDescription::RemoveField { .. } => "removeField",
            MigrationOperationDescription::UpdateField { .. } => "updateField",
            MigrationOperationDescription::AddAction { .. } => "addAction",
            MigrationOperationDescription::RemoveAction { .. } => "removeAction",
            MigrationOperationDescription::UpdateAction { .. } => "updateAction",
        }
    }

    /// The field payload of a field operation.
    pub fn field(&self) -> Option<&MigrationFieldDescription> {
        match self {
            MigrationOperationDescription::AddField { field }
            | MigrationOperationDescription::RemoveField { field }
            | MigrationOperationDescription::UpdateField { field } => Some(field),
            _ => None,
        }
    }

    /// The action payload of an action operation.
    pub fn action(&self) -> Option<&MigrationActionDescription> {
        match self {
            MigrationOperationDescription::AddAction { action }
            | MigrationOperationDescription::RemoveAction { action }
            | MigrationOperationDescription::UpdateAction { action } => Some(action),
            _ => None,
        }
    }

    /// The object payload of a type operation.
    pub fn object(&self) -> Option<&MetaDescription> {
        match self {
            MigrationOperationDescription::CreateObject { object }
            | MigrationOperationDescription::RenameObject { object }
            | MigrationOperationDescription::DeleteObject { object } => Some(object),
            _ => None,
        }
    }

    /// Create `object`.
    pub fn create_object(object: MetaDescription) -> Self {
        MigrationOperationDescription::CreateObject { object }
    }

    /// Add `field`.
    pub fn add_field(field: Field) -> Self {
        MigrationOperationDescription::AddField {
            field: MigrationFieldDescription::new(field),
        }
    }

    /// Remove `field`.
    pub fn remove_field(field: Field) -> Self {
        MigrationOperationDescription::RemoveField {
            field: MigrationFieldDescription::new(field),
        }
    }

    /// Replace the field called `previous_name` with `field`.
    pub fn update_field(field: Field, previous_name: impl Into<String>) -> Self {
        MigrationOperationDescription::UpdateField {
            field: MigrationFieldDescription::renamed(field, previous_name),
        }
    }
}

/// A migration as written to files and history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationDescription {
    /// Globally unique id; empty for spawned migrations.
    #[serde(default)]
    pub id: String,
    /// Target type, empty when the migration creates it.
    #[serde(default)]
    pub apply_to: String,
    /// Parent migration ids.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Operations, in application order.
    pub operations: Vec<MigrationOperationDescription>,
    /// Description of the type after the migration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_state: Option<MetaDescription>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl MigrationDescription {
    /// Create an empty migration with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            apply_to: String::new(),
            depends_on: Vec::new(),
            operations: Vec::new(),
            meta_state: None,
            description: String::new(),
        }
    }

    /// A spawned migration applying `operation` to `apply_to`.
    pub fn spawned(apply_to: impl Into<String>, operation: MigrationOperationDescription) -> Self {
        Self::new("")
            .with_apply_to(apply_to)
            .with_operation(operation)
    }

    /// Set the target type.
    pub fn with_apply_to(mut self, apply_to: impl Into<String>) -> Self {
        self.apply_to = apply_to.into();
        self
    }

    /// Set the parents.
    pub fn with_depends_on<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = parents.into_iter().map(Into::into).collect();
        self
    }

    /// Append an operation.
    pub fn with_operation(mut self, operation: MigrationOperationDescription) -> Self {
        self.operations.push(operation);
        self
    }

    /// Set the free-form description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Whether this migration was spawned by normalization.
    pub fn is_spawned(&self) -> bool {
        self.id.is_empty()
    }

    /// Name of the type the migration is about: `applyTo`, or the name of
    /// the type created by the first operation.
    pub fn meta_name(&self) -> Result<String, MigrationError> {
        if !self.apply_to.is_empty() {
            return Ok(self.apply_to.clone());
        }
        match self.operations.first() {
            Some(MigrationOperationDescription::CreateObject { object }) => Ok(object.name.clone()),
            _ => Err(MigrationError::invalid(
                "migration has neither applyTo defined nor createObject operation",
            )),
        }
    }

    /// Parse a migration from JSON.
    pub fn from_json(json: &str) -> Result<Self, MigrationError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render the migration as pretty JSON.
    pub fn to_json(&self) -> Result<String, MigrationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rebuild the description of an applied migration.
    ///
    /// Fails if the stored snapshot no longer matches its digest.
    pub fn from_record(record: &HistoryRecord) -> Result<Self, MigrationError> {
        if !record.verify() {
            return Err(MigrationError::invalid(format!(
                "snapshot of migration '{}' does not match its digest",
                record.id
            )));
        }
        let meta_state = if record.meta_state.is_empty() {
            None
        } else {
            Some(serde_json::from_str(&record.meta_state)?)
        };
        Ok(Self {
            id: record.id.clone(),
            apply_to: record.apply_to.clone(),
            depends_on: record.depends_on.clone(),
            operations: serde_json::from_str(&record.operations)?,
            meta_state,
            description: record.description.clone(),
        })
    }
}

/// A desired description, as given to the diff constructor.
///
/// Fields and actions may carry `previousName` to express a rename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationMetaDescription {
    /// Type name.
    pub name: String,
    /// Key field name.
    pub key: String,
    /// Fields.
    pub fields: Vec<MigrationFieldDescription>,
    /// Actions.
    #[serde(default)]
    pub actions: Vec<MigrationActionDescription>,
    /// Optimistic concurrency flag.
    #[serde(default)]
    pub cas: bool,
}

impl MigrationMetaDescription {
    /// Desired state equal to `meta`, without renames.
    pub fn from_meta(meta: &MetaDescription) -> Self {
        Self {
            name: meta.name.clone(),
            key: meta.key.clone(),
            fields: meta.fields.iter().cloned().map(MigrationFieldDescription::new).collect(),
            actions: meta.actions.iter().cloned().map(MigrationActionDescription::new).collect(),
            cas: meta.cas,
        }
    }

    /// The plain description, rename hints dropped.
    pub fn to_meta(&self) -> MetaDescription {
        MetaDescription {
            name: self.name.clone(),
            key: self.key.clone(),
            fields: self.fields.iter().map(|f| f.field.clone()).collect(),
            actions: self.actions.iter().map(|a| a.action.clone()).collect(),
            cas: self.cas,
        }
    }

    /// Find a field by its new name.
    pub fn find_field(&self, name: &str) -> Option<&MigrationFieldDescription> {
        self.fields.iter().find(|f| f.field.name == name)
    }

    /// Find an action by its new name.
    pub fn find_action(&self, name: &str) -> Option<&MigrationActionDescription> {
        self.actions.iter().find(|a| a.action.name == name)
    }
}
