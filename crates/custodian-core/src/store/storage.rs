//! The sled database behind descriptions, history and the physical catalog.

use parking_lot::Mutex;
use sled::{Db, Tree};
use tracing::debug;

use super::transaction::Transaction;
use crate::config::StorageConfig;
use crate::error::Error;

/// Tree name for object type descriptions (JSON by type name).
pub const METAS_TREE: &str = "custodian:metas";

/// Tree name for history records (rkyv by migration id).
pub const HISTORY_TREE: &str = "custodian:history";

/// Tree name for the history order index (big-endian order -> id).
pub const HISTORY_ORDER_TREE: &str = "custodian:history_order";

/// Tree name for the physical catalog (tables and sequences).
pub const PHYSICAL_TREE: &str = "custodian:physical";

/// Persistent state of the schema engine.
///
/// All access goes through a [`Transaction`]; only one transaction is
/// open at a time.
pub struct Storage {
    db: Db,
    metas: Tree,
    history: Tree,
    history_order: Tree,
    physical: Tree,
    writer: Mutex<()>,
}

impl Storage {
    /// Open or create the storage described by `config`.
    pub fn open(config: StorageConfig) -> Result<Self, Error> {
        let db = config.to_sled_config().open()?;
        Self::with_db(db)
    }

    /// Open a temporary storage, removed on drop.
    pub fn temporary() -> Result<Self, Error> {
        Self::open(StorageConfig::temporary())
    }

    /// Use an already opened sled database.
    pub fn with_db(db: Db) -> Result<Self, Error> {
        let metas = db.open_tree(METAS_TREE)?;
        let history = db.open_tree(HISTORY_TREE)?;
        let history_order = db.open_tree(HISTORY_ORDER_TREE)?;
        let physical = db.open_tree(PHYSICAL_TREE)?;
        debug!(recovered = db.was_recovered(), "storage opened");

        Ok(Self {
            db,
            metas,
            history,
            history_order,
            physical,
            writer: Mutex::new(()),
        })
    }

    /// Begin a transaction, waiting for any open one to finish.
    pub fn begin(&self) -> Transaction<'_> {
        Transaction::new(self, self.writer.lock())
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }

    /// Next value of the history order counter. Monotonic across restarts.
    pub(crate) fn next_order(&self) -> Result<u64, Error> {
        Ok(self.db.generate_id()?)
    }

    pub(crate) fn metas_tree(&self) -> &Tree {
        &self.metas
    }

    pub(crate) fn history_tree(&self) -> &Tree {
        &self.history
    }

    pub(crate) fn history_order_tree(&self) -> &Tree {
        &self.history_order
    }

    pub(crate) fn physical_tree(&self) -> &Tree {
        &self.physical
    }
}
