//! Companion migrations that keep links symmetric.
//!
//! Every inner link gets a reverse (outer) field on its target and every
//! many-to-many link gets a join type. The [`Normalizer`] derives, for one
//! operation, the spawned migrations to run before it (removals, so nothing
//! dangles) and after it (additions, once the owner exists).

use tracing::trace;

use super::description::{MigrationDescription, MigrationOperationDescription};
use super::error::MigrationError;
use super::operation::Operation;
use crate::meta::{
    join_type_description, join_type_name, reverse_field_name, Field, FieldType, MetaDescription,
    MetaLookup,
};

/// Spawned migrations of one operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spawned {
    /// Applied before the operation.
    pub run_before: Vec<MigrationDescription>,
    /// Applied after the operation.
    pub run_after: Vec<MigrationDescription>,
}

impl Spawned {
    /// Append another operation's companions.
    pub fn extend(&mut self, other: Spawned) {
        self.run_before.extend(other.run_before);
        self.run_after.extend(other.run_after);
    }

    /// Whether nothing was spawned.
    pub fn is_empty(&self) -> bool {
        self.run_before.is_empty() && self.run_after.is_empty()
    }

    fn before(&mut self, apply_to: &str, operation: MigrationOperationDescription) {
        trace!(apply_to, kind = operation.kind(), "spawning before");
        self.run_before.push(MigrationDescription::spawned(apply_to, operation));
    }

    fn after(&mut self, apply_to: &str, operation: MigrationOperationDescription) {
        trace!(apply_to, kind = operation.kind(), "spawning after");
        self.run_after.push(MigrationDescription::spawned(apply_to, operation));
    }
}

/// Reverse field a target receives for `field` of `owner`.
pub fn reverse_field(owner: &str, field: &Field) -> Field {
    let field_type = if field.is_inner_generic() {
        FieldType::Generic
    } else {
        FieldType::Array
    };
    Field::outer_link(reverse_field_name(owner), field_type, owner, field.name.clone()).with_modes(true, false)
}

/// Whether `candidate` reflects `field` of `owner`.
fn reflects(candidate: &Field, owner: &str, field: &str) -> bool {
    candidate.is_outer()
        && candidate.link_meta.as_deref() == Some(owner)
        && candidate.outer_link_field.as_deref() == Some(field)
}

/// Derives companion migrations against a store.
pub struct Normalizer<'a, L: ?Sized> {
    lookup: &'a L,
    explicit: bool,
}

impl<'a, L: MetaLookup + ?Sized> Normalizer<'a, L> {
    /// Normalize against `lookup`, for a spawned migration.
    pub fn new(lookup: &'a L) -> Self {
        Self { lookup, explicit: false }
    }

    /// Normalize for a user migration. Removing an explicit reverse field
    /// then brings back the generated one.
    pub fn with_explicit(mut self, explicit: bool) -> Self {
        self.explicit = explicit;
        self
    }

    /// A description by name, `current` standing in for its own name.
    fn find(&self, name: &str, current: Option<&MetaDescription>) -> Result<Option<MetaDescription>, MigrationError> {
        if let Some(meta) = current.filter(|m| m.name == name) {
            return Ok(Some(meta.clone()));
        }
        Ok(self.lookup.lookup(name)?)
    }

    /// The field of `target` reflecting `field` of `owner`.
    fn find_reverse(
        &self,
        target: &str,
        owner: &MetaDescription,
        field: &str,
    ) -> Result<Option<Field>, MigrationError> {
        let target = match self.find(target, Some(owner))? {
            Some(target) => target,
            None => return Ok(None),
        };
        Ok(target.fields.iter().find(|f| reflects(f, &owner.name, field)).cloned())
    }

    /// Companions of `operation`, applied to `current`.
    pub fn normalize(
        &self,
        current: Option<&MetaDescription>,
        operation: &Operation,
    ) -> Result<Spawned, MigrationError> {
        let mut spawned = Spawned::default();
        match (operation, current) {
            (Operation::CreateObject(object), _) => {
                for field in &object.fields {
                    self.spawn_reverse(&mut spawned, object, field)?;
                }
            }
            (Operation::AddField(field), Some(meta)) => {
                if field.is_outer() {
                    self.replace_automatic_reverse(&mut spawned, meta, field);
                }
                self.spawn_reverse(&mut spawned, meta, field)?;
            }
            (Operation::RemoveField(field), Some(meta)) => {
                self.remove_reverse(&mut spawned, meta, field, false)?;
                if self.explicit && field.is_outer() {
                    self.restore_automatic_reverse(&mut spawned, meta, field)?;
                }
            }
            (Operation::DeleteObject, Some(meta)) => {
                for field in &meta.fields {
                    self.remove_reverse(&mut spawned, meta, field, true)?;
                }
            }
            (Operation::UpdateField { current: old, new }, Some(meta)) => {
                self.update_reverse(&mut spawned, meta, old, new)?;
            }
            (Operation::RenameObject { name }, Some(meta)) => {
                self.rename_reverse(&mut spawned, meta, name)?;
            }
            _ => {}
        }
        Ok(spawned)
    }

    /// Reverse fields and join types for a new inner link of `owner`.
    fn spawn_reverse(&self, spawned: &mut Spawned, owner: &MetaDescription, field: &Field) -> Result<(), MigrationError> {
        if field.is_inner_object() {
            if let Some(target) = &field.link_meta {
                if self.find_reverse(target, owner, &field.name)?.is_none() {
                    spawned.after(target, MigrationOperationDescription::add_field(reverse_field(&owner.name, field)));
                }
            }
        } else if field.is_inner_generic() {
            let reverse = reverse_field(&owner.name, field);
            for target in &field.link_meta_list {
                if let Some(meta) = self.find(target, Some(owner))? {
                    if meta.find_field(&reverse.name).is_some() || meta.fields.iter().any(|f| reflects(f, &owner.name, &field.name)) {
                        continue;
                    }
                }
                spawned.after(target, MigrationOperationDescription::add_field(reverse.clone()));
            }
        } else if field.field_type == FieldType::Objects && field.is_inner() {
            if let Some(target) = &field.link_meta {
                if self.lookup.lookup(&join_type_name(&owner.name, target))?.is_none() {
                    spawned.after(
                        "",
                        MigrationOperationDescription::create_object(join_type_description(&owner.name, target)),
                    );
                }
            }
        }
        Ok(())
    }

    /// An explicit outer field replaces the generated one reflecting the same link.
    fn replace_automatic_reverse(&self, spawned: &mut Spawned, meta: &MetaDescription, field: &Field) {
        let Some(target) = field.link_meta.as_deref() else {
            return;
        };
        let automatic = meta.fields.iter().find(|f| {
            f.name == reverse_field_name(target)
                && f.field_type == field.field_type
                && field
                    .outer_link_field
                    .as_deref()
                    .is_some_and(|olf| reflects(f, target, olf))
        });
        if let Some(automatic) = automatic {
            spawned.before(&meta.name, MigrationOperationDescription::remove_field(automatic.clone()));
        }
    }

    /// The generated reverse field for the link an explicit outer `field`
    /// reflected, unless another field of `meta` still reflects it.
    fn restore_automatic_reverse(
        &self,
        spawned: &mut Spawned,
        meta: &MetaDescription,
        field: &Field,
    ) -> Result<(), MigrationError> {
        let (Some(target), Some(olf)) = (field.link_meta.as_deref(), field.outer_link_field.as_deref()) else {
            return Ok(());
        };
        let automatic = reverse_field_name(target);
        if field.name == automatic || meta.find_field(&automatic).is_some() {
            return Ok(());
        }
        if meta.fields.iter().any(|f| f.name != field.name && reflects(f, target, olf)) {
            return Ok(());
        }

        let Some(owner) = self.find(target, Some(meta))? else {
            return Ok(());
        };
        let Some(inner) = owner.find_field(olf) else {
            return Ok(());
        };
        let links_back = (inner.is_inner_object() && inner.link_meta.as_deref() == Some(meta.name.as_str()))
            || (inner.is_inner_generic() && inner.link_meta_list.iter().any(|t| *t == meta.name));
        if links_back {
            spawned.after(&meta.name, MigrationOperationDescription::add_field(reverse_field(target, inner)));
        }
        Ok(())
    }

    /// Removal of whatever `field` of `owner` spawned. A deleted owner
    /// takes its own fields along.
    fn remove_reverse(
        &self,
        spawned: &mut Spawned,
        owner: &MetaDescription,
        field: &Field,
        deleting: bool,
    ) -> Result<(), MigrationError> {
        let targets: Vec<&String> = if field.is_inner_object() {
            field.link_meta.iter().collect()
        } else if field.is_inner_generic() {
            field.link_meta_list.iter().collect()
        } else if field.field_type == FieldType::Objects && field.is_inner() {
            if let Some(target) = &field.link_meta {
                let join = join_type_name(&owner.name, target);
                if let Some(join) = self.lookup.lookup(&join)? {
                    let apply_to = join.name.clone();
                    spawned.before(&apply_to, MigrationOperationDescription::DeleteObject { object: join });
                }
            }
            return Ok(());
        } else {
            return Ok(());
        };

        for target in targets {
            if deleting && *target == owner.name {
                continue;
            }
            self.remove_reverse_on(spawned, owner, field, target)?;
        }
        Ok(())
    }

    fn remove_reverse_on(
        &self,
        spawned: &mut Spawned,
        owner: &MetaDescription,
        field: &Field,
        target: &str,
    ) -> Result<(), MigrationError> {
        if let Some(reverse) = self.find_reverse(target, owner, &field.name)? {
            spawned.before(target, MigrationOperationDescription::remove_field(reverse));
        }
        Ok(())
    }

    /// Keep reverse fields in step with a changed inner link.
    fn update_reverse(
        &self,
        spawned: &mut Spawned,
        meta: &MetaDescription,
        old: &Field,
        new: &Field,
    ) -> Result<(), MigrationError> {
        let objects = |f: &Field| f.field_type == FieldType::Objects;
        if objects(old) || objects(new) {
            if objects(old) != objects(new) || old.link_meta != new.link_meta {
                return Err(MigrationError::not_implemented(format!(
                    "changing the many-to-many link '{}' of object '{}'",
                    old.name, meta.name
                )));
            }
            return Ok(());
        }

        if old.is_inner_generic() {
            if !new.is_inner_generic() {
                return Err(MigrationError::not_implemented(format!(
                    "changing the type of generic inner link '{}' of object '{}'",
                    old.name, meta.name
                )));
            }
            return self.update_generic_reverse(spawned, meta, old, new);
        }

        match (old.is_inner_object(), new.is_inner_object()) {
            (true, true) if old.link_meta != new.link_meta => {
                self.remove_reverse(spawned, meta, old, false)?;
                self.spawn_reverse(spawned, meta, new)?;
            }
            (true, true) => {
                if let Some(target) = old.link_meta.as_deref() {
                    self.repoint_reverse(spawned, meta, old, new, target)?;
                }
            }
            (true, false) => self.remove_reverse(spawned, meta, old, false)?,
            (false, true) => self.spawn_reverse(spawned, meta, new)?,
            (false, false) if new.is_inner_generic() => self.spawn_reverse(spawned, meta, new)?,
            (false, false) => {}
        }
        Ok(())
    }

    fn update_generic_reverse(
        &self,
        spawned: &mut Spawned,
        meta: &MetaDescription,
        old: &Field,
        new: &Field,
    ) -> Result<(), MigrationError> {
        let reverse = reverse_field(&meta.name, new);
        for target in &old.link_meta_list {
            if new.link_meta_list.contains(target) {
                self.repoint_reverse(spawned, meta, old, new, target)?;
            } else {
                self.remove_reverse_on(spawned, meta, old, target)?;
            }
        }
        for target in &new.link_meta_list {
            if old.link_meta_list.contains(target) {
                continue;
            }
            if let Some(existing) = self.find(target, Some(meta))? {
                if existing.find_field(&reverse.name).is_some() {
                    continue;
                }
            }
            spawned.after(target, MigrationOperationDescription::add_field(reverse.clone()));
        }
        Ok(())
    }

    /// A renamed inner link keeps its reverse field pointing at it.
    fn repoint_reverse(
        &self,
        spawned: &mut Spawned,
        meta: &MetaDescription,
        old: &Field,
        new: &Field,
        target: &str,
    ) -> Result<(), MigrationError> {
        if old.name == new.name || target == meta.name {
            return Ok(());
        }
        if let Some(reverse) = self.find_reverse(target, meta, &old.name)? {
            let mut updated = reverse.clone();
            updated.outer_link_field = Some(new.name.clone());
            spawned.after(target, MigrationOperationDescription::update_field(updated, reverse.name));
        }
        Ok(())
    }

    /// Reverse fields follow the new name of their owner.
    fn rename_reverse(&self, spawned: &mut Spawned, meta: &MetaDescription, name: &str) -> Result<(), MigrationError> {
        if let Some(field) = meta.fields.iter().find(|f| f.field_type == FieldType::Objects) {
            return Err(MigrationError::not_implemented(format!(
                "renaming object '{}' which owns the many-to-many link '{}'",
                meta.name, field.name
            )));
        }

        let automatic = reverse_field_name(&meta.name);
        for field in meta.fields.iter().filter(|f| f.is_inner_object() || f.is_inner_generic()) {
            let targets: Vec<&String> = if field.is_inner_object() {
                field.link_meta.iter().collect()
            } else {
                field.link_meta_list.iter().collect()
            };
            for target in targets {
                let Some(reverse) = self.find_reverse(target, meta, &field.name)? else {
                    continue;
                };
                if reverse.name != automatic {
                    continue;
                }
                let mut updated = reverse.clone();
                updated.name = reverse_field_name(name);
                updated.link_meta = Some(name.to_string());
                let apply_to = if *target == meta.name { name } else { target.as_str() };
                spawned.after(apply_to, MigrationOperationDescription::update_field(updated, reverse.name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::meta::{DefaultValue, OnDelete};

    fn meta(name: &str) -> MetaDescription {
        MetaDescription::new(name, "id")
            .with_field(Field::optional("id", FieldType::Number).with_default(DefaultValue::nextval()))
    }

    fn link(name: &str, target: &str) -> Field {
        Field::inner_link(name, target).with_on_delete(OnDelete::Cascade)
    }

    fn store(metas: Vec<MetaDescription>) -> HashMap<String, MetaDescription> {
        metas.into_iter().map(|m| (m.name.clone(), m)).collect()
    }

    fn added_field(description: &MigrationDescription) -> &Field {
        &description.operations[0].field().unwrap().field
    }

    #[test]
    fn test_create_spawns_reverse_field() {
        let store = store(vec![meta("a")]);
        let b = meta("b").with_field(link("a", "a"));
        let spawned = Normalizer::new(&store).normalize(None, &Operation::CreateObject(b)).unwrap();

        assert!(spawned.run_before.is_empty());
        assert_eq!(spawned.run_after.len(), 1);
        let after = &spawned.run_after[0];
        assert_eq!(after.apply_to, "a");
        assert!(after.is_spawned());
        let field = added_field(after);
        assert_eq!(field.name, "b_set");
        assert_eq!(field.field_type, FieldType::Array);
        assert_eq!(field.outer_link_field.as_deref(), Some("a"));
        assert!(field.query_mode);
        assert!(!field.retrieve_mode);
    }

    #[test]
    fn test_generic_skips_targets_with_reverse() {
        let c = meta("c").with_field(Field::outer_link("b_set", FieldType::Generic, "b", "target"));
        let store = store(vec![meta("a"), c]);
        let b = meta("b").with_field(Field::generic_link("target", ["a", "c"]));
        let spawned = Normalizer::new(&store).normalize(None, &Operation::CreateObject(b)).unwrap();

        assert_eq!(spawned.run_after.len(), 1);
        assert_eq!(spawned.run_after[0].apply_to, "a");
        assert_eq!(added_field(&spawned.run_after[0]).field_type, FieldType::Generic);
    }

    #[test]
    fn test_objects_spawns_join_type() {
        let store = store(vec![meta("b")]);
        let a = meta("a").with_field(Field::objects_link("bs", "b"));
        let spawned = Normalizer::new(&store).normalize(None, &Operation::CreateObject(a)).unwrap();

        assert_eq!(spawned.run_after.len(), 1);
        let join = spawned.run_after[0].operations[0].object().unwrap();
        assert_eq!(join.name, "a__b");
    }

    #[test]
    fn test_remove_field_removes_reverse_first() {
        let a = meta("a").with_field(Field::outer_link("b_set", FieldType::Array, "b", "a"));
        let b = meta("b").with_field(link("a", "a"));
        let store = store(vec![a, b.clone()]);
        let operation = Operation::RemoveField(link("a", "a"));
        let spawned = Normalizer::new(&store).normalize(Some(&b), &operation).unwrap();

        assert!(spawned.run_after.is_empty());
        assert_eq!(spawned.run_before.len(), 1);
        assert_eq!(spawned.run_before[0].apply_to, "a");
        assert_eq!(spawned.run_before[0].operations[0].kind(), "removeField");
    }

    #[test]
    fn test_removing_explicit_reverse_restores_automatic() {
        let owners = Field::outer_link("owners", FieldType::Array, "b", "a");
        let a = meta("a").with_field(owners.clone());
        let store = store(vec![a.clone(), meta("b").with_field(link("a", "a"))]);
        let operation = Operation::RemoveField(owners);

        let spawned = Normalizer::new(&store)
            .with_explicit(true)
            .normalize(Some(&a), &operation)
            .unwrap();
        assert!(spawned.run_before.is_empty());
        assert_eq!(spawned.run_after.len(), 1);
        assert_eq!(spawned.run_after[0].apply_to, "a");
        let restored = added_field(&spawned.run_after[0]);
        assert_eq!(restored.name, "b_set");
        assert_eq!(restored.outer_link_field.as_deref(), Some("a"));

        // spawned removals never restore
        let spawned = Normalizer::new(&store).normalize(Some(&a), &operation).unwrap();
        assert!(spawned.is_empty());
    }

    #[test]
    fn test_removing_reverse_of_removed_link_restores_nothing() {
        let owners = Field::outer_link("owners", FieldType::Array, "b", "a");
        let a = meta("a").with_field(owners.clone());
        let store = store(vec![a.clone(), meta("b")]);
        let spawned = Normalizer::new(&store)
            .with_explicit(true)
            .normalize(Some(&a), &Operation::RemoveField(owners))
            .unwrap();
        assert!(spawned.is_empty());
    }

    #[test]
    fn test_explicit_outer_field_replaces_automatic() {
        let a = meta("a").with_field(Field::outer_link("b_set", FieldType::Array, "b", "a"));
        let store = store(vec![a.clone(), meta("b").with_field(link("a", "a"))]);
        let operation = Operation::AddField(Field::outer_link("owners", FieldType::Array, "b", "a"));
        let spawned = Normalizer::new(&store).normalize(Some(&a), &operation).unwrap();

        assert_eq!(spawned.run_before.len(), 1);
        assert_eq!(spawned.run_before[0].apply_to, "a");
        assert_eq!(spawned.run_before[0].operations[0].kind(), "removeField");
        assert_eq!(added_field(&spawned.run_before[0]).name, "b_set");
        assert!(spawned.run_after.is_empty());
    }

    #[test]
    fn test_generic_target_change() {
        let a = meta("a").with_field(Field::outer_link("b_set", FieldType::Generic, "b", "target"));
        let b = meta("b").with_field(Field::generic_link("target", ["a"]));
        let store = store(vec![a, b.clone(), meta("c")]);
        let operation = Operation::UpdateField {
            current: Field::generic_link("target", ["a"]),
            new: Field::generic_link("target", ["c"]),
        };
        let spawned = Normalizer::new(&store).normalize(Some(&b), &operation).unwrap();

        assert_eq!(spawned.run_before.len(), 1);
        assert_eq!(spawned.run_before[0].apply_to, "a");
        assert_eq!(spawned.run_after.len(), 1);
        assert_eq!(spawned.run_after[0].apply_to, "c");
    }

    #[test]
    fn test_generic_to_simple_not_implemented() {
        let b = meta("b").with_field(Field::generic_link("target", ["a"]));
        let store = store(vec![meta("a"), b.clone()]);
        let operation = Operation::UpdateField {
            current: Field::generic_link("target", ["a"]),
            new: Field::optional("target", FieldType::String),
        };
        let err = Normalizer::new(&store).normalize(Some(&b), &operation).unwrap_err();
        assert!(matches!(err, MigrationError::NotImplemented { .. }));
    }

    #[test]
    fn test_rename_renames_automatic_reverse() {
        let a = meta("a").with_field(Field::outer_link("b_set", FieldType::Array, "b", "a"));
        let b = meta("b").with_field(link("a", "a"));
        let store = store(vec![a, b.clone()]);
        let operation = Operation::RenameObject { name: "bb".to_string() };
        let spawned = Normalizer::new(&store).normalize(Some(&b), &operation).unwrap();

        assert_eq!(spawned.run_after.len(), 1);
        let update = spawned.run_after[0].operations[0].field().unwrap();
        assert_eq!(update.field.name, "bb_set");
        assert_eq!(update.field.link_meta.as_deref(), Some("bb"));
        assert_eq!(update.previous_name, "b_set");
    }

    #[test]
    fn test_rename_with_objects_not_implemented() {
        let a = meta("a").with_field(Field::objects_link("bs", "b"));
        let store = store(vec![a.clone(), meta("b")]);
        let operation = Operation::RenameObject { name: "aa".to_string() };
        let err = Normalizer::new(&store).normalize(Some(&a), &operation).unwrap_err();
        assert!(matches!(err, MigrationError::NotImplemented { .. }));
    }
}
