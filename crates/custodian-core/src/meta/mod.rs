//! Type and link model.
//!
//! Object types ("metas") are described by [`MetaDescription`] values made
//! of [`Field`]s and [`Action`]s. Links between types come in three kinds:
//!
//! | Kind | Field type | Link type | Stored as |
//! |------|------------|-----------|-----------|
//! | single | `object` | `inner` | a referencing column |
//! | reflection | `array` / `object` | `outer` | nothing (virtual) |
//! | polymorphic | `generic` | `inner` | `<field>__type` + `<field>__key` |
//! | polymorphic reflection | `generic` | `outer` | nothing (virtual) |
//! | many-to-many | `objects` | `inner` | a join type |
//!
//! The [`Resolver`] turns a description into a [`MetaGraph`] whose
//! [`Meta`] views follow links by name.

mod action;
mod description;
mod error;
mod field;
mod resolver;
mod types;
mod value;

pub use action::Action;
pub use description::{MetaDescription, CAS_FIELD};
pub use error::MetaError;
pub use field::{
    generic_key_column, generic_type_column, join_type_name, reverse_field_name, DefaultValue,
    Field, REVERSE_FIELD_SUFFIX,
};
pub use resolver::{
    join_type_description, CandidateLookup, Meta, MetaGraph, MetaLookup, Resolver,
};
pub use types::{FieldType, LinkType, Method, OnDelete};
pub use value::{value_as_string, value_from_string};
