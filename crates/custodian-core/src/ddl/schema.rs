//! Physical schema of an object type and its synthesis from a description.

use serde::{Deserialize, Serialize};

use super::column::{table_name, ColumnDefault, ColumnType};
use super::error::DdlError;
use crate::error::Error;
use crate::meta::{
    generic_key_column, generic_type_column, join_type_name, Field, FieldType, LinkType,
    MetaDescription, MetaError, MetaLookup, OnDelete,
};

/// A table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// SQL type.
    pub column_type: ColumnType,
    /// Whether NULL is allowed.
    pub optional: bool,
    /// Whether values must be unique.
    pub unique: bool,
    /// Default clause.
    pub default: Option<ColumnDefault>,
}

impl Column {
    /// Create a column without default.
    pub fn new(name: impl Into<String>, column_type: ColumnType, optional: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            optional,
            unique: false,
            default: None,
        }
    }
}

/// A real foreign key stored on the owning table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerForeignKey {
    /// Referencing column.
    pub from_column: String,
    /// Referenced table.
    pub to_table: String,
    /// Referenced column.
    pub to_column: String,
    /// On-delete action.
    pub on_delete: OnDelete,
}

impl InnerForeignKey {
    /// Constraint name, `fk_<from>_<table>_<to>`.
    pub fn name(&self) -> String {
        format!("fk_{}_{}_{}", self.from_column, self.to_table, self.to_column)
    }
}

/// A foreign key on another table that references this one.
///
/// Outer links record these for bookkeeping only; they never produce DDL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OuterForeignKey {
    /// Referencing table.
    pub from_table: String,
    /// Referencing column.
    pub from_column: String,
    /// Referenced table.
    pub to_table: String,
    /// Referenced column.
    pub to_column: String,
}

impl OuterForeignKey {
    /// Constraint name, `fk_<from>_<table>_<to>`.
    pub fn name(&self) -> String {
        format!("fk_{}_{}_{}", self.from_column, self.to_table, self.to_column)
    }
}

/// A sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sequence {
    /// Sequence name.
    pub name: String,
}

impl Sequence {
    /// Create a sequence.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Everything one object type occupies in the physical store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalSchema {
    /// Table name.
    pub table: String,
    /// Columns, in field order.
    pub columns: Vec<Column>,
    /// Primary key column.
    pub primary_key: String,
    /// Foreign keys stored on this table.
    pub inner_constraints: Vec<InnerForeignKey>,
    /// Foreign keys on other tables that reference this one.
    pub outer_constraints: Vec<OuterForeignKey>,
    /// Sequences feeding column defaults.
    pub sequences: Vec<Sequence>,
}

impl PhysicalSchema {
    /// Find a column by name.
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names, in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// The physical footprint of a single field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldProperties {
    /// Columns backing the field.
    pub columns: Vec<Column>,
    /// Foreign key stored on the owning table.
    pub inner_constraint: Option<InnerForeignKey>,
    /// Bookkeeping constraint of an outer link.
    pub outer_constraint: Option<OuterForeignKey>,
    /// Sequence feeding the field's default.
    pub sequence: Option<Sequence>,
}

impl FieldProperties {
    /// Footprint of field `name` as found in a live schema.
    ///
    /// A column named after the field backs a simple field or an inner
    /// object link; otherwise the pair of generic columns is looked up.
    /// Outer links leave no trace, so their footprint is empty.
    pub fn from_schema(schema: &PhysicalSchema, name: &str) -> Self {
        let columns: Vec<Column> = match schema.find_column(name) {
            Some(column) => vec![column.clone()],
            None => [generic_type_column(name), generic_key_column(name)]
                .iter()
                .filter_map(|c| schema.find_column(c).cloned())
                .collect(),
        };
        let sequence = columns.iter().find_map(sequence_of);
        let inner_constraint = schema
            .inner_constraints
            .iter()
            .find(|fk| fk.from_column == name)
            .cloned();
        Self {
            columns,
            inner_constraint,
            outer_constraint: None,
            sequence,
        }
    }
}

/// Maps descriptions to physical schemas.
///
/// Inner links need the key type of their target; targets are read through
/// the lookup, except links from a type to itself which use `meta` directly.
pub struct Synthesizer<'a, L: ?Sized> {
    lookup: &'a L,
}

impl<'a, L: MetaLookup + ?Sized> Synthesizer<'a, L> {
    /// Create a synthesizer.
    pub fn new(lookup: &'a L) -> Self {
        Self { lookup }
    }

    /// Synthesize the whole schema of a type.
    pub fn synthesize(&self, meta: &MetaDescription) -> Result<PhysicalSchema, Error> {
        let mut schema = PhysicalSchema {
            table: table_name(&meta.name),
            columns: Vec::new(),
            primary_key: meta.key.clone(),
            inner_constraints: Vec::new(),
            outer_constraints: Vec::new(),
            sequences: Vec::new(),
        };
        for field in &meta.fields {
            let properties = self.field_properties(meta, field)?;
            schema.columns.extend(properties.columns);
            schema.inner_constraints.extend(properties.inner_constraint);
            schema.outer_constraints.extend(properties.outer_constraint);
            schema.sequences.extend(properties.sequence);
        }
        Ok(schema)
    }

    /// Physical footprint of one field of `meta`.
    pub fn field_properties(&self, meta: &MetaDescription, field: &Field) -> Result<FieldProperties, Error> {
        let table = table_name(&meta.name);
        let unsupported = |reason: String| DdlError::UnsupportedLinkType {
            table: table.clone(),
            field: field.name.clone(),
            reason,
        };

        if field.is_simple() {
            let column_type = ColumnType::from_field_type(field.field_type).ok_or_else(|| {
                DdlError::UnsupportedColumnType {
                    table: table.clone(),
                    field: field.name.clone(),
                    field_type: field.field_type.to_string(),
                }
            })?;
            let column = self.column(meta, field, column_type)?;
            let sequence = sequence_of(&column);
            return Ok(FieldProperties {
                columns: vec![column],
                sequence,
                ..Default::default()
            });
        }

        match (field.field_type, field.link_type) {
            (FieldType::Object, Some(LinkType::Inner)) => {
                let target = self.link_target(meta, field)?;
                let key = target.key_field().ok_or_else(|| MetaError::KeyNotFound {
                    meta: target.name.clone(),
                    key: target.key.clone(),
                })?;
                let column_type = ColumnType::from_field_type(key.field_type).ok_or_else(|| {
                    unsupported(format!("key of '{}' is not simple", target.name))
                })?;
                let column = self.column(meta, field, column_type)?;
                let sequence = sequence_of(&column);
                Ok(FieldProperties {
                    inner_constraint: Some(InnerForeignKey {
                        from_column: field.name.clone(),
                        to_table: table_name(&target.name),
                        to_column: target.key.clone(),
                        on_delete: field.on_delete_strategy(),
                    }),
                    columns: vec![column],
                    sequence,
                    ..Default::default()
                })
            }
            (FieldType::Object | FieldType::Array, Some(LinkType::Outer)) => {
                let (target, outer) = outer_parts(field).ok_or_else(|| {
                    unsupported("outer link without linkMeta or outerLinkField".to_string())
                })?;
                Ok(FieldProperties {
                    outer_constraint: Some(OuterForeignKey {
                        from_table: table_name(target),
                        from_column: outer.to_string(),
                        to_table: table.clone(),
                        to_column: meta.key.clone(),
                    }),
                    ..Default::default()
                })
            }
            (FieldType::Objects, _) => {
                let target = field
                    .link_meta
                    .as_deref()
                    .ok_or_else(|| unsupported("objects link without linkMeta".to_string()))?;
                Ok(FieldProperties {
                    outer_constraint: Some(OuterForeignKey {
                        from_table: table_name(&join_type_name(&meta.name, target)),
                        from_column: meta.name.clone(),
                        to_table: table.clone(),
                        to_column: meta.key.clone(),
                    }),
                    ..Default::default()
                })
            }
            (FieldType::Generic, Some(LinkType::Inner)) => {
                let type_column = Column::new(generic_type_column(&field.name), ColumnType::Text, field.optional);
                let key_column = Column::new(generic_key_column(&field.name), ColumnType::Text, field.optional);
                Ok(FieldProperties {
                    columns: vec![type_column, key_column],
                    ..Default::default()
                })
            }
            (FieldType::Generic, Some(LinkType::Outer)) => {
                let (target, outer) = outer_parts(field).ok_or_else(|| {
                    unsupported("generic outer link without linkMeta or outerLinkField".to_string())
                })?;
                Ok(FieldProperties {
                    outer_constraint: Some(OuterForeignKey {
                        from_table: table_name(target),
                        from_column: generic_key_column(outer),
                        to_table: table.clone(),
                        to_column: meta.key.clone(),
                    }),
                    ..Default::default()
                })
            }
            (field_type, link_type) => Err(unsupported(format!(
                "type '{}' with link type '{}'",
                field_type,
                link_type.map(|l| l.as_str()).unwrap_or("none")
            ))
            .into()),
        }
    }

    fn column(&self, meta: &MetaDescription, field: &Field, column_type: ColumnType) -> Result<Column, Error> {
        Ok(Column {
            name: field.name.clone(),
            column_type,
            optional: field.optional,
            unique: field.unique,
            default: ColumnDefault::for_field(&meta.name, field)?,
        })
    }

    fn link_target(&self, meta: &MetaDescription, field: &Field) -> Result<MetaDescription, Error> {
        let target = field.link_meta.as_deref().ok_or_else(|| DdlError::UnsupportedLinkType {
            table: table_name(&meta.name),
            field: field.name.clone(),
            reason: "inner link without linkMeta".to_string(),
        })?;
        if target == meta.name {
            return Ok(meta.clone());
        }
        self.lookup.lookup(target)?.ok_or_else(|| {
            MetaError::LinkTargetNotFound {
                meta: meta.name.clone(),
                field: field.name.clone(),
                target: target.to_string(),
            }
            .into()
        })
    }
}

fn outer_parts(field: &Field) -> Option<(&str, &str)> {
    Some((field.link_meta.as_deref()?, field.outer_link_field.as_deref()?))
}

fn sequence_of(column: &Column) -> Option<Sequence> {
    column
        .default
        .as_ref()
        .and_then(ColumnDefault::sequence)
        .map(Sequence::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::DefaultValue;
    use std::collections::HashMap;

    fn person() -> MetaDescription {
        MetaDescription::new("person", "login")
            .with_field(Field::new("login", FieldType::String))
            .with_field(Field::outer_link("order_set", FieldType::Array, "order", "owner"))
    }

    fn order() -> MetaDescription {
        MetaDescription::new("order", "id")
            .with_field(Field::optional("id", FieldType::Number).with_default(DefaultValue::nextval()))
            .with_field(Field::inner_link("owner", "person").with_on_delete(OnDelete::SetNull))
            .with_field(Field::generic_link("subject", ["person"]).with_optional(true))
            .with_field(Field::optional("created", FieldType::DateTime).with_default(DefaultValue::function("now")))
    }

    fn lookup() -> HashMap<String, MetaDescription> {
        [person(), order()].into_iter().map(|m| (m.name.clone(), m)).collect()
    }

    #[test]
    fn test_synthesize_inner_links() {
        let lookup = lookup();
        let schema = Synthesizer::new(&lookup).synthesize(&order()).unwrap();

        assert_eq!(schema.table, "o_order");
        assert_eq!(schema.primary_key, "id");
        assert_eq!(
            schema.column_names(),
            vec!["id", "owner", "subject__type", "subject__key", "created"]
        );
        // the link column takes the type of the target key
        assert_eq!(schema.find_column("owner").unwrap().column_type, ColumnType::Text);
        assert_eq!(schema.sequences, vec![Sequence::new("o_order_id_seq")]);

        let fk = &schema.inner_constraints[0];
        assert_eq!(fk.name(), "fk_owner_o_person_login");
        assert_eq!(fk.on_delete, OnDelete::SetNull);
        assert!(schema.outer_constraints.is_empty());
    }

    #[test]
    fn test_synthesize_outer_links_are_virtual() {
        let lookup = lookup();
        let schema = Synthesizer::new(&lookup).synthesize(&person()).unwrap();

        assert_eq!(schema.column_names(), vec!["login"]);
        assert_eq!(
            schema.outer_constraints,
            vec![OuterForeignKey {
                from_table: "o_order".to_string(),
                from_column: "owner".to_string(),
                to_table: "o_person".to_string(),
                to_column: "login".to_string(),
            }]
        );
    }

    #[test]
    fn test_objects_link_points_at_join_table() {
        let lookup = lookup();
        let meta = MetaDescription::new("tag", "id")
            .with_field(Field::new("id", FieldType::Number))
            .with_field(Field::objects_link("people", "person"));
        let schema = Synthesizer::new(&lookup).synthesize(&meta).unwrap();
        assert_eq!(schema.columns.len(), 1);
        assert_eq!(schema.outer_constraints[0].from_table, "o_tag__person");
        assert_eq!(schema.outer_constraints[0].from_column, "tag");
    }

    #[test]
    fn test_self_link_uses_own_key() {
        let lookup: HashMap<String, MetaDescription> = HashMap::new();
        let meta = MetaDescription::new("node", "id")
            .with_field(Field::new("id", FieldType::Number))
            .with_field(Field::inner_link("parent", "node").with_optional(true));
        let schema = Synthesizer::new(&lookup).synthesize(&meta).unwrap();
        assert_eq!(schema.find_column("parent").unwrap().column_type, ColumnType::Numeric);
    }

    #[test]
    fn test_field_properties_from_live_schema() {
        let lookup = lookup();
        let schema = Synthesizer::new(&lookup).synthesize(&order()).unwrap();

        let owner = FieldProperties::from_schema(&schema, "owner");
        assert_eq!(owner.columns.len(), 1);
        assert_eq!(owner.inner_constraint.unwrap().to_table, "o_person");

        let subject = FieldProperties::from_schema(&schema, "subject");
        let names: Vec<_> = subject.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["subject__type", "subject__key"]);

        let id = FieldProperties::from_schema(&schema, "id");
        assert_eq!(id.sequence, Some(Sequence::new("o_order_id_seq")));

        assert_eq!(FieldProperties::from_schema(&schema, "order_set"), FieldProperties::default());
    }

    #[test]
    fn test_unsupported_link_type() {
        let lookup = lookup();
        let mut field = Field::new("broken", FieldType::Array);
        field.link_type = Some(LinkType::Inner);
        let meta = MetaDescription::new("x", "id")
            .with_field(Field::new("id", FieldType::Number))
            .with_field(field);
        let err = Synthesizer::new(&lookup).synthesize(&meta).unwrap_err();
        assert!(matches!(err, Error::Ddl(DdlError::UnsupportedLinkType { .. })));
    }
}
