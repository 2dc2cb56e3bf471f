//! Resolution of migration descriptions into runnable migrations.

use tracing::{debug, instrument};

use super::description::MigrationDescription;
use super::error::MigrationError;
use super::normalization::{Normalizer, Spawned};
use super::operation::Operation;
use crate::meta::{MetaDescription, MetaLookup};

/// Direction a migration runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Applying; recording adds a history record.
    Forward,
    /// Rolling back; recording removes the history record.
    Backward,
}

/// A migration ready to run.
#[derive(Debug, Clone)]
pub struct Migration {
    /// The description it was built from.
    pub description: MigrationDescription,
    /// Direction.
    pub direction: Direction,
    /// State of the target type when the migration was built.
    pub apply_to: Option<MetaDescription>,
    /// Resolved operations, in order.
    pub operations: Vec<Operation>,
    /// Companion migrations.
    pub spawned: Spawned,
    /// State of the target type once every operation ran.
    pub projected: Option<MetaDescription>,
}

impl Migration {
    /// Whether this is a user migration rather than a spawned one.
    pub fn is_explicit(&self) -> bool {
        !self.description.is_spawned()
    }
}

/// Builds [`Migration`]s against a description lookup.
pub struct MigrationFactory<'a, L: ?Sized> {
    lookup: &'a L,
}

impl<'a, L: MetaLookup + ?Sized> MigrationFactory<'a, L> {
    /// Create a factory.
    pub fn new(lookup: &'a L) -> Self {
        Self { lookup }
    }

    /// Build a forward migration.
    pub fn forward(&self, description: MigrationDescription) -> Result<Migration, MigrationError> {
        self.build(description, Direction::Forward)
    }

    /// Build a backward migration from an already reverted description.
    pub fn backward(&self, description: MigrationDescription) -> Result<Migration, MigrationError> {
        self.build(description, Direction::Backward)
    }

    /// Resolve operations against the target type and collect companions.
    ///
    /// Each operation is resolved against the state the previous ones
    /// leave behind, so one migration may add a field and update it.
    #[instrument(skip(self, description), fields(migration_id = %description.id, apply_to = %description.apply_to))]
    pub fn build(&self, description: MigrationDescription, direction: Direction) -> Result<Migration, MigrationError> {
        if description.operations.is_empty() {
            return Err(MigrationError::invalid("migration has no operations"));
        }

        let apply_to = if description.apply_to.is_empty() {
            None
        } else {
            let meta = self.lookup.lookup(&description.apply_to)?.ok_or_else(|| {
                MigrationError::invalid(format!("object '{}' to apply the migration to does not exist", description.apply_to))
            })?;
            Some(meta)
        };

        let explicit = !description.is_spawned();
        let normalizer = Normalizer::new(self.lookup).with_explicit(explicit);
        let mut projected = apply_to.clone();
        let mut operations = Vec::with_capacity(description.operations.len());
        let mut spawned = Spawned::default();

        for operation_description in &description.operations {
            let operation = Operation::from_description(operation_description, projected.as_ref())?;
            spawned.extend(normalizer.normalize(projected.as_ref(), &operation)?);
            projected = operation.next_description(projected.as_ref(), explicit)?;
            operations.push(operation);
        }

        debug!(
            operations = operations.len(),
            run_before = spawned.run_before.len(),
            run_after = spawned.run_after.len(),
            "migration built"
        );

        Ok(Migration {
            description,
            direction,
            apply_to,
            operations,
            spawned,
            projected,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::meta::{DefaultValue, Field, FieldType};
    use crate::migration::description::MigrationOperationDescription;

    fn meta(name: &str) -> MetaDescription {
        MetaDescription::new(name, "id")
            .with_field(Field::optional("id", FieldType::Number).with_default(DefaultValue::nextval()))
    }

    fn store(metas: Vec<MetaDescription>) -> HashMap<String, MetaDescription> {
        metas.into_iter().map(|m| (m.name.clone(), m)).collect()
    }

    #[test]
    fn test_operations_see_earlier_ones() {
        let store = store(vec![meta("a")]);
        let description = MigrationDescription::new("m1")
            .with_apply_to("a")
            .with_operation(MigrationOperationDescription::add_field(Field::optional("x", FieldType::String)))
            .with_operation(MigrationOperationDescription::update_field(
                Field::optional("y", FieldType::String),
                "x",
            ));

        let migration = MigrationFactory::new(&store).forward(description).unwrap();
        assert_eq!(migration.operations.len(), 2);
        let projected = migration.projected.as_ref().unwrap();
        assert!(projected.find_field("x").is_none());
        assert!(projected.find_field("y").is_some());
        assert!(migration.is_explicit());
    }

    #[test]
    fn test_missing_apply_to() {
        let store = store(vec![]);
        let description = MigrationDescription::new("m1")
            .with_apply_to("a")
            .with_operation(MigrationOperationDescription::add_field(Field::optional("x", FieldType::String)));
        let err = MigrationFactory::new(&store).forward(description).unwrap_err();
        assert!(matches!(err, MigrationError::InvalidDescription { .. }));
    }

    #[test]
    fn test_create_collects_companions() {
        let store = store(vec![meta("a")]);
        let b = meta("b").with_field(Field::inner_link("a", "a"));
        let description = MigrationDescription::new("m1").with_operation(MigrationOperationDescription::create_object(b));

        let migration = MigrationFactory::new(&store).forward(description).unwrap();
        assert!(migration.apply_to.is_none());
        assert_eq!(migration.projected.unwrap().name, "b");
        assert_eq!(migration.spawned.run_after.len(), 1);
        assert_eq!(migration.spawned.run_after[0].apply_to, "a");
    }
}
