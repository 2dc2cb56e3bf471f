//! DDL synthesis and diff engine.
//!
//! A [`MetaDescription`](crate::meta::MetaDescription) maps to a
//! [`PhysicalSchema`]: one table named `o_<type>`, one or two columns per
//! stored field, real foreign keys for inner object links and bookkeeping
//! constraints for every reflected link. [`SchemaDiff`] compares the live
//! schema with a synthesized one and scripts the [`DdlStatement`]s that
//! reconcile them.

mod column;
mod diff;
mod error;
mod schema;
mod statement;

pub use column::{sequence_name, table_name, ColumnDefault, ColumnType, TABLE_PREFIX};
pub use diff::{
    add_field_script, create_table_script, drop_table_script, remove_field_script,
    rename_table_script, update_field_script, ColumnChange, SchemaDiff,
};
pub use error::DdlError;
pub use schema::{
    Column, FieldProperties, InnerForeignKey, OuterForeignKey, PhysicalSchema, Sequence, Synthesizer,
};
pub use statement::{unique_constraint_name, DdlStatement};
