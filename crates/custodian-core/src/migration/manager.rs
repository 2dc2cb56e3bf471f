//! Transactional application and rollback of migrations.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::constructor::construct;
use super::description::{MigrationDescription, MigrationMetaDescription};
use super::error::MigrationError;
use super::factory::{Direction, Migration, MigrationFactory};
use super::reversion::revert;
use super::validation::{preceding_migrations, validate};
use crate::config::{ManagerConfig, StorageConfig};
use crate::ddl::{create_table_script, table_name, DdlStatement, PhysicalSchema, SchemaDiff, Synthesizer};
use crate::error::Error;
use crate::meta::MetaDescription;
use crate::store::{HistoryRecord, Storage, Transaction};

/// Applies and rolls back migrations, one transaction per call.
///
/// A migration either commits entirely (descriptions, physical catalog and
/// history) or leaves nothing behind.
pub struct MigrationManager {
    storage: Arc<Storage>,
    config: ManagerConfig,
}

impl MigrationManager {
    /// Manage migrations over `storage`.
    pub fn new(storage: Arc<Storage>, config: ManagerConfig) -> Self {
        Self { storage, config }
    }

    /// Open the storage described by `storage` and manage it.
    pub fn open(storage: StorageConfig, config: ManagerConfig) -> Result<Self, MigrationError> {
        Ok(Self::new(Arc::new(Storage::open(storage)?), config))
    }

    /// The underlying storage.
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// The configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Apply a migration and return the resulting description of its type,
    /// `None` if the migration deleted it.
    ///
    /// With `record` the migration is written to history. With `fake`
    /// nothing but history is touched: the resulting description is taken
    /// from `metaState` or computed without running any operation.
    #[instrument(skip(self, description), fields(migration_id = %description.id, apply_to = %description.apply_to))]
    pub fn apply(
        &self,
        description: MigrationDescription,
        record: bool,
        fake: bool,
    ) -> Result<Option<MetaDescription>, MigrationError> {
        if description.is_spawned() {
            return Err(MigrationError::invalid("migration id is empty"));
        }

        let mut tx = self.storage.begin();
        match self.apply_in(&mut tx, description, record, fake) {
            Ok(state) => {
                tx.commit()?;
                info!(
                    object = state.as_ref().map(|m| m.name.as_str()).unwrap_or_default(),
                    "migration applied"
                );
                Ok(state)
            }
            Err(e) => {
                warn!(error = %e, code = e.code(), "migration failed, changes discarded");
                Err(e)
            }
        }
    }

    fn apply_in(
        &self,
        tx: &mut Transaction<'_>,
        description: MigrationDescription,
        record: bool,
        fake: bool,
    ) -> Result<Option<MetaDescription>, MigrationError> {
        if tx.get_history(&description.id)?.is_some() {
            return Err(MigrationError::AlreadyApplied { id: description.id });
        }
        for parent in &description.depends_on {
            if tx.get_history(parent)?.is_none() {
                return Err(MigrationError::invalid(format!("parent migration '{}' does not exist", parent)));
            }
        }
        if self.config.validate_siblings {
            validate(tx, &description)?;
        }

        if fake {
            let state = match &description.meta_state {
                Some(state) => Some(state.clone()),
                None => MigrationFactory::new(&*tx).forward(description.clone())?.projected,
            };
            if record {
                self.record(tx, &description, Direction::Forward, state.as_ref())?;
            }
            debug!("faked");
            return Ok(state);
        }

        let migration = MigrationFactory::new(&*tx).forward(description)?;
        self.run(tx, migration, record)
    }

    /// Run companions and operations of `migration`, then record it.
    fn run(
        &self,
        tx: &mut Transaction<'_>,
        migration: Migration,
        record: bool,
    ) -> Result<Option<MetaDescription>, MigrationError> {
        let explicit = migration.is_explicit();

        for spawned in &migration.spawned.run_before {
            self.run_spawned(tx, spawned.clone())?;
        }

        // companions may have changed the target since the migration was built
        let mut current = match &migration.apply_to {
            Some(meta) => Some(tx.get_meta(&meta.name)?.ok_or_else(|| Error::NotFound(meta.name.clone()))?),
            None => None,
        };
        for operation in &migration.operations {
            debug!(kind = operation.kind(), "running operation");
            let next = operation.sync_meta(tx, current.as_ref(), explicit)?;
            operation.sync_db(tx, current.as_ref(), next.as_ref(), &self.config)?;
            current = next;
        }

        for spawned in &migration.spawned.run_after {
            self.run_spawned(tx, spawned.clone())?;
        }

        let state = match &current {
            Some(meta) => tx.get_meta(&meta.name)?,
            None => None,
        };
        if record {
            self.record(tx, &migration.description, migration.direction, state.as_ref())?;
        }
        Ok(state)
    }

    fn run_spawned(&self, tx: &mut Transaction<'_>, description: MigrationDescription) -> Result<(), MigrationError> {
        let migration = MigrationFactory::new(&*tx).forward(description)?;
        debug!(
            apply_to = %migration.description.apply_to,
            kind = migration.operations.first().map(|o| o.kind()).unwrap_or_default(),
            "running spawned migration"
        );
        self.run(tx, migration, false)?;
        Ok(())
    }

    fn record(
        &self,
        tx: &mut Transaction<'_>,
        description: &MigrationDescription,
        direction: Direction,
        state: Option<&MetaDescription>,
    ) -> Result<(), MigrationError> {
        match direction {
            Direction::Forward => {
                let (object, meta_state) = match state {
                    Some(meta) => (meta.name.clone(), serde_json::to_string(meta)?),
                    None => (description.meta_name()?, String::new()),
                };
                let record = HistoryRecord::new(
                    &description.id,
                    &description.apply_to,
                    object,
                    description.depends_on.clone(),
                    serde_json::to_string(&description.operations)?,
                    meta_state,
                    &description.description,
                );
                match tx.insert_history(record) {
                    Ok(order) => {
                        debug!(order, "history recorded");
                        Ok(())
                    }
                    Err(Error::AlreadyExists(id)) => Err(MigrationError::AlreadyApplied { id }),
                    Err(e) => Err(e.into()),
                }
            }
            Direction::Backward => match tx.remove_history(&description.id) {
                Ok(()) => Ok(()),
                Err(Error::NotFound(id)) => Err(MigrationError::NotFound { id }),
                Err(e) => Err(e.into()),
            },
        }
    }

    /// Roll back every migration applied after `id`, newest first, and
    /// return their ids. `id` itself stays applied.
    #[instrument(skip(self))]
    pub fn rollback_to(&self, id: &str, record: bool, fake: bool) -> Result<Vec<String>, MigrationError> {
        let tx = self.storage.begin();
        let records = applied_after(&tx, id)?;
        self.rollback_records(tx, records, record, fake)
    }

    /// Roll back `id` and every migration applied after it.
    #[instrument(skip(self))]
    pub fn rollback(&self, id: &str, record: bool, fake: bool) -> Result<Vec<String>, MigrationError> {
        let tx = self.storage.begin();
        let mut records = applied_after(&tx, id)?;
        let target = tx
            .get_history(id)?
            .ok_or_else(|| MigrationError::NotFound { id: id.to_string() })?;
        records.push(target);
        self.rollback_records(tx, records, record, fake)
    }

    fn rollback_records(
        &self,
        mut tx: Transaction<'_>,
        records: Vec<HistoryRecord>,
        record: bool,
        fake: bool,
    ) -> Result<Vec<String>, MigrationError> {
        let mut rolled_back = Vec::with_capacity(records.len());
        for history in records {
            let description = MigrationDescription::from_record(&history)?;
            let result = if fake {
                if record {
                    self.record(&mut tx, &description, Direction::Backward, None)
                } else {
                    Ok(())
                }
            } else {
                self.rollback_in(&mut tx, &description, record).map(|_| ())
            };
            if let Err(e) = result {
                warn!(migration_id = %history.id, error = %e, "rollback failed, changes discarded");
                return Err(e);
            }
            rolled_back.push(history.id);
        }
        tx.commit()?;
        info!(count = rolled_back.len(), "migrations rolled back");
        Ok(rolled_back)
    }

    /// Revert one applied migration against its parent's snapshot.
    fn rollback_in(
        &self,
        tx: &mut Transaction<'_>,
        description: &MigrationDescription,
        record: bool,
    ) -> Result<Option<MetaDescription>, MigrationError> {
        let previous = match description.depends_on.first() {
            Some(parent) => match tx.get_history(parent)? {
                Some(parent) => MigrationDescription::from_record(&parent)?.meta_state,
                None => None,
            },
            None => None,
        };
        let reverted = revert(previous.as_ref(), description)?;
        debug!(migration_id = %description.id, operations = reverted.operations.len(), "reverting");
        let migration = MigrationFactory::new(&*tx).backward(reverted)?;
        self.run(tx, migration, record)
    }

    /// Build the migration taking the type `apply_to` (empty for a new type)
    /// to `desired` (`None` to delete it), on top of its frontier.
    pub fn construct(
        &self,
        apply_to: &str,
        desired: Option<&MigrationMetaDescription>,
    ) -> Result<MigrationDescription, MigrationError> {
        let tx = self.storage.begin();
        let current = if apply_to.is_empty() {
            None
        } else {
            let meta = tx
                .get_meta(apply_to)?
                .ok_or_else(|| MigrationError::invalid(format!("object '{}' does not exist", apply_to)))?;
            Some(meta)
        };
        let object = match (current.as_ref(), desired) {
            (Some(meta), _) => meta.name.clone(),
            (None, Some(desired)) => desired.name.clone(),
            (None, None) => return Err(MigrationError::NoChangesDetected),
        };
        let depends_on = preceding_migrations(&tx, &object)?.into_iter().map(|r| r.id).collect();
        construct(current.as_ref(), desired, depends_on)
    }

    /// Every applied migration, in application order.
    pub fn list(&self) -> Result<Vec<HistoryRecord>, MigrationError> {
        Ok(self.storage.begin().list_history()?)
    }

    /// An applied migration.
    pub fn get(&self, id: &str) -> Result<HistoryRecord, MigrationError> {
        self.storage
            .begin()
            .get_history(id)?
            .ok_or_else(|| MigrationError::NotFound { id: id.to_string() })
    }

    /// An applied migration, as a description.
    pub fn get_description(&self, id: &str) -> Result<MigrationDescription, MigrationError> {
        MigrationDescription::from_record(&self.get(id)?)
    }

    /// The frontier of `object`: its latest migration and that
    /// migration's siblings.
    pub fn preceding_migrations(&self, object: &str) -> Result<Vec<HistoryRecord>, MigrationError> {
        preceding_migrations(&self.storage.begin(), object)
    }

    /// Migrations applied after `id`, newest first.
    pub fn applied_after(&self, id: &str) -> Result<Vec<HistoryRecord>, MigrationError> {
        applied_after(&self.storage.begin(), id)
    }

    /// Forget every history record. Descriptions and tables stay.
    #[instrument(skip(self))]
    pub fn drop_history(&self) -> Result<usize, MigrationError> {
        let mut tx = self.storage.begin();
        let dropped = tx.drop_history()?;
        tx.commit()?;
        info!(dropped, "history dropped");
        Ok(dropped)
    }

    /// The stored description of a type.
    pub fn describe(&self, name: &str) -> Result<Option<MetaDescription>, MigrationError> {
        Ok(self.storage.begin().get_meta(name)?)
    }

    /// Every stored description.
    pub fn list_metas(&self) -> Result<Vec<MetaDescription>, MigrationError> {
        Ok(self.storage.begin().list_metas()?)
    }

    /// The live physical schema of a type.
    pub fn physical_schema(&self, name: &str) -> Result<PhysicalSchema, MigrationError> {
        Ok(self.storage.begin().introspect(&table_name(name))?)
    }

    /// Statements that would bring the table of `name` in line with its
    /// description. Empty when they agree.
    pub fn pending_ddl(&self, name: &str) -> Result<Vec<DdlStatement>, MigrationError> {
        let tx = self.storage.begin();
        let meta = tx.get_meta(name)?.ok_or_else(|| Error::NotFound(name.to_string()))?;
        let schema = Synthesizer::new(&tx).synthesize(&meta)?;
        match tx.introspect(&schema.table) {
            Ok(live) => Ok(SchemaDiff::compute(&live, &schema).script()),
            Err(Error::Ddl(e)) if e.is_not_found() => Ok(create_table_script(&schema)),
            Err(e) => Err(e.into()),
        }
    }
}

/// History records applied after `id`, newest first.
fn applied_after(tx: &Transaction<'_>, id: &str) -> Result<Vec<HistoryRecord>, MigrationError> {
    let target = tx
        .get_history(id)?
        .ok_or_else(|| MigrationError::NotFound { id: id.to_string() })?;
    let mut records: Vec<HistoryRecord> = tx
        .list_history()?
        .into_iter()
        .filter(|r| r.order > target.order)
        .collect();
    records.reverse();
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{DefaultValue, Field, FieldType};
    use crate::migration::description::{MigrationFieldDescription, MigrationOperationDescription};

    fn manager() -> MigrationManager {
        MigrationManager::new(Arc::new(Storage::temporary().unwrap()), ManagerConfig::default())
    }

    fn meta(name: &str) -> MetaDescription {
        MetaDescription::new(name, "id")
            .with_field(Field::optional("id", FieldType::Number).with_default(DefaultValue::nextval()))
    }

    fn create(id: &str, meta: MetaDescription) -> MigrationDescription {
        MigrationDescription::new(id).with_operation(MigrationOperationDescription::create_object(meta))
    }

    #[test]
    fn test_apply_records_history() {
        let manager = manager();
        let state = manager.apply(create("m1", meta("a")), true, false).unwrap().unwrap();
        assert_eq!(state.name, "a");

        let record = manager.get("m1").unwrap();
        assert_eq!(record.object, "a");
        assert!(record.depends_on.is_empty());
        assert_eq!(manager.get_description("m1").unwrap().meta_state, Some(state));
        assert_eq!(manager.physical_schema("a").unwrap().column_names(), vec!["id"]);
        assert!(manager.pending_ddl("a").unwrap().is_empty());
    }

    #[test]
    fn test_apply_twice() {
        let manager = manager();
        manager.apply(create("m1", meta("a")), true, false).unwrap();
        let err = manager.apply(create("m1", meta("a")), true, false).unwrap_err();
        assert!(matches!(err, MigrationError::AlreadyApplied { .. }));
    }

    #[test]
    fn test_empty_id_rejected() {
        let manager = manager();
        let err = manager.apply(create("", meta("a")), true, false).unwrap_err();
        assert!(matches!(err, MigrationError::InvalidDescription { .. }));
    }

    #[test]
    fn test_fake_touches_only_history() {
        let manager = manager();
        let state = manager.apply(create("m1", meta("a")), true, true).unwrap().unwrap();
        assert_eq!(state.name, "a");
        assert!(manager.describe("a").unwrap().is_none());
        assert_eq!(manager.list().unwrap().len(), 1);

        let rolled_back = manager.rollback("m1", true, true).unwrap();
        assert_eq!(rolled_back, vec!["m1"]);
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_failed_migration_leaves_nothing() {
        let manager = manager();
        let broken = meta("b").with_field(Field::inner_link("a", "a"));
        let err = manager.apply(create("m1", broken), true, false).unwrap_err();
        assert_eq!(err.code(), "invalid_object");
        assert!(manager.describe("b").unwrap().is_none());
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_construct_uses_frontier() {
        let manager = manager();
        manager.apply(create("m1", meta("a")), true, false).unwrap();
        let mut desired = MigrationMetaDescription::from_meta(&meta("a"));
        desired
            .fields
            .push(MigrationFieldDescription::new(Field::optional("title", FieldType::String)));
        let description = manager.construct("a", Some(&desired)).unwrap();
        assert_eq!(description.depends_on, vec!["m1"]);
        assert_eq!(description.apply_to, "a");
    }
}
