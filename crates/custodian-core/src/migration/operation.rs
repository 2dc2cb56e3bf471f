//! Primitive migration operations.
//!
//! Each operation turns the current description of its type into the next
//! one ([`Operation::next_description`]), writes that description to the
//! store ([`Operation::sync_meta`]) and brings the physical catalog in line
//! ([`Operation::sync_db`]).

use tracing::debug;

use super::description::MigrationOperationDescription;
use super::error::MigrationError;
use crate::config::ManagerConfig;
use crate::ddl::{
    add_field_script, create_table_script, drop_table_script, remove_field_script,
    rename_table_script, table_name, update_field_script, DdlStatement, FieldProperties,
    SchemaDiff, Synthesizer,
};
use crate::error::Error;
use crate::meta::{Action, CandidateLookup, Field, FieldType, MetaDescription, MetaError, Resolver};
use crate::store::Transaction;

/// A resolved primitive operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Create a type.
    CreateObject(MetaDescription),
    /// Rename the type.
    RenameObject {
        /// New type name.
        name: String,
    },
    /// Delete the type.
    DeleteObject,
    /// Add a field.
    AddField(Field),
    /// Remove a field, as currently stored.
    RemoveField(Field),
    /// Replace a field.
    UpdateField {
        /// The field as currently stored.
        current: Field,
        /// The replacement.
        new: Field,
    },
    /// Add an action.
    AddAction(Action),
    /// Remove an action, as currently stored.
    RemoveAction(Action),
    /// Replace an action.
    UpdateAction {
        /// The action as currently stored.
        current: Action,
        /// The replacement.
        new: Action,
    },
}

fn require<'m>(current: Option<&'m MetaDescription>, kind: &str) -> Result<&'m MetaDescription, MigrationError> {
    current.ok_or_else(|| MigrationError::invalid(format!("'{}' operation needs an existing object", kind)))
}

fn field_not_found(meta: &MetaDescription, field: &str) -> MigrationError {
    MetaError::FieldNotFound {
        meta: meta.name.clone(),
        field: field.to_string(),
    }
    .into()
}

fn action_not_found(meta: &MetaDescription, action: &str) -> MigrationError {
    MigrationError::invalid(format!("object '{}' has no action '{}'", meta.name, action))
}

/// Point every link of `meta` that targets `from` at `to`.
pub(crate) fn rewrite_references(meta: &mut MetaDescription, from: &str, to: &str) -> bool {
    let mut changed = false;
    for field in &mut meta.fields {
        if field.link_meta.as_deref() == Some(from) {
            field.link_meta = Some(to.to_string());
            changed = true;
        }
        for target in &mut field.link_meta_list {
            if target == from {
                *target = to.to_string();
                changed = true;
            }
        }
    }
    changed
}

/// Whether `field` is an inner link (plain, generic or many-to-many) to `target`.
fn links_to(field: &Field, target: &str) -> bool {
    field.is_inner()
        && (field.link_meta.as_deref() == Some(target) || field.link_meta_list.iter().any(|t| t == target))
}

impl Operation {
    /// Build the operation for `description`, against the current state of
    /// its type.
    pub fn from_description(
        description: &MigrationOperationDescription,
        current: Option<&MetaDescription>,
    ) -> Result<Self, MigrationError> {
        let operation = match description {
            MigrationOperationDescription::CreateObject { object } => {
                Operation::CreateObject(object.clone().normalized())
            }
            MigrationOperationDescription::RenameObject { object } => {
                require(current, description.kind())?;
                Operation::RenameObject {
                    name: object.name.clone(),
                }
            }
            MigrationOperationDescription::DeleteObject { .. } => {
                require(current, description.kind())?;
                Operation::DeleteObject
            }
            MigrationOperationDescription::AddField { field } => {
                let mut field = field.field.clone();
                field.normalize();
                Operation::AddField(field)
            }
            MigrationOperationDescription::RemoveField { field } => {
                let meta = require(current, description.kind())?;
                let existing = meta
                    .find_field(&field.field.name)
                    .ok_or_else(|| field_not_found(meta, &field.field.name))?;
                Operation::RemoveField(existing.clone())
            }
            MigrationOperationDescription::UpdateField { field } => {
                let meta = require(current, description.kind())?;
                let existing = meta
                    .find_field(field.lookup_name())
                    .ok_or_else(|| field_not_found(meta, field.lookup_name()))?;
                let mut new = field.field.clone();
                new.normalize();
                Operation::UpdateField {
                    current: existing.clone(),
                    new,
                }
            }
            MigrationOperationDescription::AddAction { action } => Operation::AddAction(action.action.clone()),
            MigrationOperationDescription::RemoveAction { action } => {
                let meta = require(current, description.kind())?;
                let existing = meta
                    .find_action(&action.action.name)
                    .ok_or_else(|| action_not_found(meta, &action.action.name))?;
                Operation::RemoveAction(existing.clone())
            }
            MigrationOperationDescription::UpdateAction { action } => {
                let meta = require(current, description.kind())?;
                let existing = meta
                    .find_action(action.lookup_name())
                    .ok_or_else(|| action_not_found(meta, action.lookup_name()))?;
                Operation::UpdateAction {
                    current: existing.clone(),
                    new: action.action.clone(),
                }
            }
        };
        Ok(operation)
    }

    /// External tag of the operation.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::CreateObject(_) => "createObject",
            Operation::RenameObject { .. } => "renameObject",
            Operation::DeleteObject => "deleteObject",
            Operation::AddField(_) => "addField",
            Operation::RemoveField(_) => "removeField",
            Operation::UpdateField { .. } => "updateField",
            Operation::AddAction(_) => "addAction",
            Operation::RemoveAction(_) => "removeAction",
            Operation::UpdateAction { .. } => "updateAction",
        }
    }

    /// The description the type has after this operation, `None` once it
    /// is deleted. Touches no store.
    ///
    /// `explicit` tells operations of user migrations from spawned ones: an
    /// outer field added explicitly is retrievable, a spawned one is only
    /// queryable.
    pub fn next_description(
        &self,
        current: Option<&MetaDescription>,
        explicit: bool,
    ) -> Result<Option<MetaDescription>, MigrationError> {
        let next = match self {
            Operation::CreateObject(object) => {
                if let Some(meta) = current {
                    return Err(MigrationError::invalid(format!("object '{}' already exists", meta.name)));
                }
                object.clone()
            }
            Operation::RenameObject { name } => {
                let meta = require(current, self.kind())?;
                let mut next = meta.clone();
                next.name = name.clone();
                rewrite_references(&mut next, &meta.name, name);
                next
            }
            Operation::DeleteObject => {
                require(current, self.kind())?;
                return Ok(None);
            }
            Operation::AddField(field) => {
                let meta = require(current, self.kind())?;
                let mut next = meta.clone();
                if let Some(existing) = meta.find_field(&field.name) {
                    // two inner links to the same type share one reverse field
                    if existing.is_outer() && field.is_outer() && existing.outer_link_field != field.outer_link_field {
                        debug!(meta = %meta.name, field = %field.name, "reverse field already exists");
                        return Ok(Some(next));
                    }
                    return Err(MetaError::DuplicateField {
                        meta: meta.name.clone(),
                        field: field.name.clone(),
                    }
                    .into());
                }
                let mut field = field.clone();
                if explicit && field.is_outer() {
                    field.query_mode = true;
                    field.retrieve_mode = true;
                }
                next.add_field(field);
                next
            }
            Operation::RemoveField(field) => {
                let meta = require(current, self.kind())?;
                let mut next = meta.clone();
                next.remove_field(&field.name).ok_or_else(|| field_not_found(meta, &field.name))?;
                next
            }
            Operation::UpdateField { current: old, new } => {
                let meta = require(current, self.kind())?;
                let mut next = meta.clone();
                if !next.replace_field(&old.name, new.clone()) {
                    return Err(field_not_found(meta, &old.name));
                }
                if old.name != new.name {
                    // reverse fields of self links follow the rename
                    for field in next.fields.iter_mut().filter(|f| {
                        f.is_outer()
                            && f.link_meta.as_deref() == Some(meta.name.as_str())
                            && f.outer_link_field.as_deref() == Some(old.name.as_str())
                    }) {
                        field.outer_link_field = Some(new.name.clone());
                    }
                }
                next
            }
            Operation::AddAction(action) => {
                let meta = require(current, self.kind())?;
                if meta.find_action(&action.name).is_some() {
                    return Err(MetaError::DuplicateAction {
                        meta: meta.name.clone(),
                        action: action.name.clone(),
                    }
                    .into());
                }
                let mut next = meta.clone();
                next.add_action(action.clone());
                next
            }
            Operation::RemoveAction(action) => {
                let meta = require(current, self.kind())?;
                let mut next = meta.clone();
                next.remove_action(&action.name)
                    .ok_or_else(|| action_not_found(meta, &action.name))?;
                next
            }
            Operation::UpdateAction { current: old, new } => {
                let meta = require(current, self.kind())?;
                let mut next = meta.clone();
                if !next.replace_action(&old.name, new.clone()) {
                    return Err(action_not_found(meta, &old.name));
                }
                next
            }
        };
        Ok(Some(next))
    }

    /// Write the next description to the store and return it.
    ///
    /// The candidate is resolved before it is written, so an invalid
    /// description never reaches the store. A rename also repoints every
    /// link of other types that targets the old name.
    pub fn sync_meta(
        &self,
        tx: &mut Transaction<'_>,
        current: Option<&MetaDescription>,
        explicit: bool,
    ) -> Result<Option<MetaDescription>, MigrationError> {
        let next = self.next_description(current, explicit)?;

        match (self, current, &next) {
            (Operation::CreateObject(_), _, Some(next)) => {
                if tx.get_meta(&next.name)?.is_some() {
                    return Err(MigrationError::invalid(format!("object '{}' already exists", next.name)));
                }
                Resolver::new(&CandidateLookup::new(&*tx, next)).resolve(next.clone())?;
                tx.create_meta(next.clone())?;
            }
            (Operation::RenameObject { name }, Some(meta), Some(next)) => {
                self.rename_meta(tx, meta, name, next)?;
            }
            (Operation::DeleteObject, Some(meta), None) => {
                for other in tx.list_metas()? {
                    if other.name == meta.name {
                        continue;
                    }
                    if let Some(field) = other.fields.iter().find(|f| links_to(f, &meta.name)) {
                        return Err(MigrationError::invalid(format!(
                            "object '{}' cannot be deleted: field '{}' of object '{}' links to it",
                            meta.name, field.name, other.name
                        )));
                    }
                }
                tx.remove_meta(&meta.name)?;
            }
            (_, Some(meta), Some(next)) => {
                Resolver::new(&CandidateLookup::new(&*tx, next)).resolve(next.clone())?;
                tx.update_meta(&meta.name, next.clone())?;
            }
            _ => return Err(MigrationError::invalid(format!("'{}' operation is inconsistent", self.kind()))),
        }

        Ok(next)
    }

    fn rename_meta(
        &self,
        tx: &mut Transaction<'_>,
        meta: &MetaDescription,
        name: &str,
        next: &MetaDescription,
    ) -> Result<(), MigrationError> {
        if tx.get_meta(name)?.is_some() {
            return Err(MigrationError::invalid(format!(
                "failed to rename object '{}' to '{}': object named '{}' already exists",
                meta.name, name, name
            )));
        }

        let mut referencing = Vec::new();
        for mut other in tx.list_metas()? {
            if other.name == meta.name {
                continue;
            }
            if other
                .fields
                .iter()
                .any(|f| f.field_type == FieldType::Objects && f.link_meta.as_deref() == Some(meta.name.as_str()))
            {
                return Err(MigrationError::not_implemented(format!(
                    "object '{}' is the target of a many-to-many link of object '{}' and cannot be renamed",
                    meta.name, other.name
                )));
            }
            if rewrite_references(&mut other, &meta.name, name) {
                referencing.push(other);
            }
        }

        tx.update_meta(&meta.name, next.clone())?;
        for other in referencing {
            debug!(meta = %other.name, from = %meta.name, to = %name, "repointing links");
            let other_name = other.name.clone();
            tx.update_meta(&other_name, other)?;
        }
        Resolver::new(&*tx).resolve(next.clone())?;
        Ok(())
    }

    /// Bring the physical catalog in line with the transition from
    /// `current` to `next`.
    pub fn sync_db(
        &self,
        tx: &mut Transaction<'_>,
        current: Option<&MetaDescription>,
        next: Option<&MetaDescription>,
        config: &ManagerConfig,
    ) -> Result<(), MigrationError> {
        let script = self.script(tx, current, next, config)?;
        tx.execute_all(&script)?;
        Ok(())
    }

    /// Statements of [`Operation::sync_db`], computed against the live catalog.
    pub fn script(
        &self,
        tx: &Transaction<'_>,
        current: Option<&MetaDescription>,
        next: Option<&MetaDescription>,
        config: &ManagerConfig,
    ) -> Result<Vec<DdlStatement>, MigrationError> {
        let synthesizer = Synthesizer::new(tx);

        let script = match (self, current, next) {
            (Operation::CreateObject(_), _, Some(next)) => {
                let schema = synthesizer.synthesize(next)?;
                match tx.introspect(&schema.table) {
                    Ok(live) => {
                        debug!(table = %schema.table, "table exists, reconciling");
                        SchemaDiff::compute(&live, &schema).script()
                    }
                    Err(Error::Ddl(e)) if e.is_not_found() => create_table_script(&schema),
                    Err(e) => return Err(e.into()),
                }
            }
            (Operation::RenameObject { .. }, Some(meta), Some(next)) => {
                let live = tx.introspect(&table_name(&meta.name))?;
                let schema = synthesizer.synthesize(next)?;
                rename_table_script(&live, &schema)
            }
            (Operation::DeleteObject, Some(meta), None) => match tx.introspect(&table_name(&meta.name)) {
                Ok(live) => drop_table_script(&live, config.cascade_drop),
                Err(Error::Ddl(e)) if e.is_not_found() => {
                    debug!(table = %table_name(&meta.name), "table already absent");
                    Vec::new()
                }
                Err(e) => return Err(e.into()),
            },
            (Operation::AddField(field), Some(_), Some(next)) => {
                let field = next.find_field(&field.name).ok_or_else(|| field_not_found(next, &field.name))?;
                let properties = synthesizer.field_properties(next, field)?;
                add_field_script(&table_name(&next.name), &properties)
            }
            (Operation::RemoveField(field), Some(meta), Some(_)) => {
                let table = table_name(&meta.name);
                let live = tx.introspect(&table)?;
                remove_field_script(&table, &FieldProperties::from_schema(&live, &field.name))
            }
            (Operation::UpdateField { current: old, new }, Some(meta), Some(next)) => {
                let table = table_name(&meta.name);
                let live = tx.introspect(&table)?;
                let from = FieldProperties::from_schema(&live, &old.name);
                let to = synthesizer.field_properties(next, new)?;
                update_field_script(&table, &new.name, &from, &to)?
            }
            (Operation::AddAction(_) | Operation::RemoveAction(_) | Operation::UpdateAction { .. }, _, _) => {
                Vec::new()
            }
            _ => return Err(MigrationError::invalid(format!("'{}' operation is inconsistent", self.kind()))),
        };
        Ok(script)
    }
}
