//! Persistent state over one sled database.
//!
//! - descriptions of object types (`custodian:metas`)
//! - history of applied migrations (`custodian:history`, `custodian:history_order`)
//! - the physical catalog of tables and sequences (`custodian:physical`)
//!
//! Every read and write goes through a [`Transaction`].

mod history;
mod physical;
mod storage;
mod transaction;

pub use history::{snapshot_digest, HistoryRecord};
pub use physical::{Row, SequenceState, TableState};
pub use storage::{Storage, HISTORY_ORDER_TREE, HISTORY_TREE, METAS_TREE, PHYSICAL_TREE};
pub use transaction::Transaction;
