//! Custodian Core - object type descriptions, DDL synthesis and migrations.
//!
//! Object types are described at runtime ([`meta`]), mapped to physical
//! tables ([`ddl`]) and evolved through reversible, dependency-tracked
//! migrations ([`migration`]) persisted in a sled database ([`store`]).

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod config;
pub mod ddl;
pub mod error;
pub mod meta;
pub mod migration;
pub mod store;

pub use config::{ManagerConfig, StorageConfig};
pub use ddl::{DdlError, DdlStatement, PhysicalSchema, SchemaDiff, Synthesizer};
pub use error::Error;
pub use meta::{
    Action, DefaultValue, Field, FieldType, LinkType, MetaDescription, MetaError, MetaGraph, MetaLookup, Method,
    OnDelete, Resolver,
};
pub use migration::{
    MigrationDescription, MigrationError, MigrationManager, MigrationMetaDescription, MigrationOperationDescription,
};
pub use store::{HistoryRecord, Storage, Transaction};
