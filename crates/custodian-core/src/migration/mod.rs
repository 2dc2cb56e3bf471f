//! Migration engine.
//!
//! A migration is a list of primitive operations on one object type, with
//! parents in the history of that type:
//!
//! | Operation | Target | Payload |
//! |-----------|--------|---------|
//! | `createObject` | new type | full description |
//! | `renameObject` | `applyTo` | description carrying the new name |
//! | `deleteObject` | `applyTo` | description being deleted |
//! | `addField` / `removeField` / `updateField` | `applyTo` | field (+ `previousName`) |
//! | `addAction` / `removeAction` / `updateAction` | `applyTo` | action (+ `previousName`) |
//!
//! Applying a migration resolves it ([`MigrationFactory`]), derives the
//! companion migrations keeping links symmetric ([`Normalizer`]), then runs
//! everything in a single transaction ([`MigrationManager`]). Rolling back
//! inverts applied migrations ([`revert`]) against the snapshot recorded by
//! their parent.
//!
//! # Example
//!
//! ```ignore
//! use custodian_core::migration::MigrationManager;
//!
//! let manager = MigrationManager::open(StorageConfig::new("./data"), ManagerConfig::default())?;
//!
//! let description = manager.construct("", Some(&desired))?;
//! manager.apply(description, true, false)?;
//! ```

pub mod constructor;
pub mod description;
pub mod error;
pub mod factory;
pub mod manager;
pub mod normalization;
pub mod operation;
pub mod reversion;
pub mod validation;

pub use constructor::construct;
pub use description::{
    generate_migration_id, MigrationActionDescription, MigrationDescription, MigrationFieldDescription,
    MigrationMetaDescription, MigrationOperationDescription, MIGRATION_ID_LENGTH,
};
pub use error::MigrationError;
pub use factory::{Direction, Migration, MigrationFactory};
pub use manager::MigrationManager;
pub use normalization::{reverse_field, Normalizer, Spawned};
pub use operation::Operation;
pub use reversion::revert;
pub use validation::{preceding_migrations, validate, validate_siblings};
