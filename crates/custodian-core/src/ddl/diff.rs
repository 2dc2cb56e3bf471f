//! Physical schema diffing and statement scripts.

use std::collections::HashSet;

use super::error::DdlError;
use super::schema::{Column, FieldProperties, InnerForeignKey, PhysicalSchema, Sequence};
use super::statement::DdlStatement;

/// A column present in both schemas whose definition changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnChange {
    /// Definition in the live catalog.
    pub from: Column,
    /// Desired definition.
    pub to: Column,
}

/// Difference between a live table and its desired schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDiff {
    /// Table being reconciled.
    pub table: String,
    /// Columns to add.
    pub columns_to_add: Vec<Column>,
    /// Columns to drop.
    pub columns_to_remove: Vec<Column>,
    /// Columns to alter.
    pub columns_to_alter: Vec<ColumnChange>,
    /// Foreign keys to add.
    pub constraints_to_add: Vec<InnerForeignKey>,
    /// Foreign keys to drop.
    pub constraints_to_remove: Vec<InnerForeignKey>,
    /// Sequences to create.
    pub sequences_to_add: Vec<Sequence>,
    /// Sequences to drop.
    pub sequences_to_remove: Vec<Sequence>,
}

impl SchemaDiff {
    /// Compute the diff from `old` (introspected) to `new` (synthesized).
    ///
    /// Columns and constraints are matched by name. Name-matched columns
    /// other than the primary key are altered when their type, nullability,
    /// default or uniqueness differ.
    pub fn compute(old: &PhysicalSchema, new: &PhysicalSchema) -> Self {
        let mut diff = SchemaDiff {
            table: new.table.clone(),
            ..Default::default()
        };

        let old_columns: HashSet<&str> = old.columns.iter().map(|c| c.name.as_str()).collect();
        let new_columns: HashSet<&str> = new.columns.iter().map(|c| c.name.as_str()).collect();
        diff.columns_to_add = new
            .columns
            .iter()
            .filter(|c| !old_columns.contains(c.name.as_str()))
            .cloned()
            .collect();
        diff.columns_to_remove = old
            .columns
            .iter()
            .filter(|c| !new_columns.contains(c.name.as_str()))
            .cloned()
            .collect();
        for to in &new.columns {
            if to.name == new.primary_key {
                continue;
            }
            if let Some(from) = old.find_column(&to.name) {
                if from != to {
                    diff.columns_to_alter.push(ColumnChange {
                        from: from.clone(),
                        to: to.clone(),
                    });
                }
            }
        }

        // a changed on-delete keeps the name, so compare whole constraints
        diff.constraints_to_add = new
            .inner_constraints
            .iter()
            .filter(|fk| !old.inner_constraints.contains(fk))
            .cloned()
            .collect();
        diff.constraints_to_remove = old
            .inner_constraints
            .iter()
            .filter(|fk| !new.inner_constraints.contains(fk))
            .cloned()
            .collect();

        let old_sequences: HashSet<&Sequence> = old.sequences.iter().collect();
        let new_sequences: HashSet<&Sequence> = new.sequences.iter().collect();
        diff.sequences_to_add = new
            .sequences
            .iter()
            .filter(|s| !old_sequences.contains(s))
            .cloned()
            .collect();
        diff.sequences_to_remove = old
            .sequences
            .iter()
            .filter(|s| !new_sequences.contains(s))
            .cloned()
            .collect();

        diff
    }

    /// Whether the live table already matches.
    pub fn is_empty(&self) -> bool {
        self.columns_to_add.is_empty()
            && self.columns_to_remove.is_empty()
            && self.columns_to_alter.is_empty()
            && self.constraints_to_add.is_empty()
            && self.constraints_to_remove.is_empty()
            && self.sequences_to_add.is_empty()
            && self.sequences_to_remove.is_empty()
    }

    /// Ordered statements applying the diff.
    pub fn script(&self) -> Vec<DdlStatement> {
        let table = &self.table;
        let mut script = Vec::new();

        script.extend(self.constraints_to_remove.iter().map(|fk| DdlStatement::DropForeignKey {
            table: table.clone(),
            name: fk.name(),
        }));
        script.extend(self.columns_to_remove.iter().map(|c| DdlStatement::DropColumn {
            table: table.clone(),
            column: c.name.clone(),
        }));
        script.extend(
            self.sequences_to_remove
                .iter()
                .map(|s| DdlStatement::DropSequence { name: s.name.clone() }),
        );
        script.extend(
            self.sequences_to_add
                .iter()
                .map(|s| DdlStatement::CreateSequence { name: s.name.clone() }),
        );
        script.extend(self.columns_to_add.iter().map(|c| DdlStatement::AddColumn {
            table: table.clone(),
            column: c.clone(),
        }));
        for change in &self.columns_to_alter {
            script.extend(alter_column(table, &change.from, &change.to));
        }
        script.extend(self.constraints_to_add.iter().map(|fk| DdlStatement::AddForeignKey {
            table: table.clone(),
            foreign_key: fk.clone(),
        }));

        script
    }
}

/// Statements turning column `from` into `to`, without renaming.
fn alter_column(table: &str, from: &Column, to: &Column) -> Vec<DdlStatement> {
    let mut statements = Vec::new();
    if from.column_type != to.column_type {
        statements.push(DdlStatement::AlterColumnType {
            table: table.to_string(),
            column: to.name.clone(),
            column_type: to.column_type,
        });
    }
    if from.default != to.default {
        statements.push(DdlStatement::AlterColumnDefault {
            table: table.to_string(),
            column: to.name.clone(),
            default: to.default.clone(),
        });
    }
    if from.optional != to.optional {
        statements.push(DdlStatement::AlterColumnNullability {
            table: table.to_string(),
            column: to.name.clone(),
            optional: to.optional,
        });
    }
    if from.unique != to.unique {
        statements.push(DdlStatement::AlterColumnUnique {
            table: table.to_string(),
            column: to.name.clone(),
            unique: to.unique,
        });
    }
    statements
}

/// Statements creating a table from scratch.
pub fn create_table_script(schema: &PhysicalSchema) -> Vec<DdlStatement> {
    let mut script: Vec<DdlStatement> = schema
        .sequences
        .iter()
        .map(|s| DdlStatement::CreateSequence { name: s.name.clone() })
        .collect();
    script.push(DdlStatement::CreateTable {
        table: schema.table.clone(),
        columns: schema.columns.clone(),
        primary_key: schema.primary_key.clone(),
        foreign_keys: schema.inner_constraints.clone(),
    });
    script
}

/// Statements dropping a table and its sequences.
pub fn drop_table_script(schema: &PhysicalSchema, cascade: bool) -> Vec<DdlStatement> {
    let mut script = vec![DdlStatement::DropTable {
        table: schema.table.clone(),
        cascade,
    }];
    script.extend(
        schema
            .sequences
            .iter()
            .map(|s| DdlStatement::DropSequence { name: s.name.clone() }),
    );
    script
}

/// Statements renaming table `old` to `new`, together with the dedicated
/// sequences whose names follow the table name.
pub fn rename_table_script(old: &PhysicalSchema, new: &PhysicalSchema) -> Vec<DdlStatement> {
    let mut script = vec![DdlStatement::RenameTable {
        table: old.table.clone(),
        new_name: new.table.clone(),
    }];
    for column in &new.columns {
        let renamed = old
            .find_column(&column.name)
            .and_then(|c| c.default.as_ref())
            .and_then(|d| d.sequence())
            .zip(column.default.as_ref().and_then(|d| d.sequence()));
        if let Some((from, to)) = renamed {
            if from != to {
                script.push(DdlStatement::RenameSequence {
                    name: from.to_string(),
                    new_name: to.to_string(),
                });
            }
        }
    }
    script
}

/// Statements adding one field to an existing table.
pub fn add_field_script(table: &str, properties: &FieldProperties) -> Vec<DdlStatement> {
    let mut script = Vec::new();
    if let Some(sequence) = &properties.sequence {
        script.push(DdlStatement::CreateSequence {
            name: sequence.name.clone(),
        });
    }
    script.extend(properties.columns.iter().map(|c| DdlStatement::AddColumn {
        table: table.to_string(),
        column: c.clone(),
    }));
    if let Some(fk) = &properties.inner_constraint {
        script.push(DdlStatement::AddForeignKey {
            table: table.to_string(),
            foreign_key: fk.clone(),
        });
    }
    script
}

/// Statements removing one field from an existing table.
pub fn remove_field_script(table: &str, properties: &FieldProperties) -> Vec<DdlStatement> {
    let mut script = Vec::new();
    if let Some(fk) = &properties.inner_constraint {
        script.push(DdlStatement::DropForeignKey {
            table: table.to_string(),
            name: fk.name(),
        });
    }
    script.extend(properties.columns.iter().map(|c| DdlStatement::DropColumn {
        table: table.to_string(),
        column: c.name.clone(),
    }));
    if let Some(sequence) = &properties.sequence {
        script.push(DdlStatement::DropSequence {
            name: sequence.name.clone(),
        });
    }
    script
}

/// Statements turning field footprint `from` into `to` in place.
///
/// Columns are paired by position, so the field must keep its column
/// layout; a sequence is created or renamed before the columns change and
/// dropped after them.
pub fn update_field_script(
    table: &str,
    field: &str,
    from: &FieldProperties,
    to: &FieldProperties,
) -> Result<Vec<DdlStatement>, DdlError> {
    if from.columns.len() != to.columns.len() {
        return Err(DdlError::UnsupportedLinkType {
            table: table.to_string(),
            field: field.to_string(),
            reason: format!(
                "field is backed by {} column(s) and cannot become {} column(s)",
                from.columns.len(),
                to.columns.len()
            ),
        });
    }

    let mut script = Vec::new();

    if let Some(fk) = &from.inner_constraint {
        if from.inner_constraint != to.inner_constraint {
            script.push(DdlStatement::DropForeignKey {
                table: table.to_string(),
                name: fk.name(),
            });
        }
    }

    let mut drop_sequence = None;
    match (&from.sequence, &to.sequence) {
        (None, Some(new)) => script.push(DdlStatement::CreateSequence {
            name: new.name.clone(),
        }),
        (Some(old), Some(new)) if old != new => script.push(DdlStatement::RenameSequence {
            name: old.name.clone(),
            new_name: new.name.clone(),
        }),
        (Some(old), None) => drop_sequence = Some(old.name.clone()),
        _ => {}
    }

    for (old, new) in from.columns.iter().zip(&to.columns) {
        if old.name != new.name {
            script.push(DdlStatement::RenameColumn {
                table: table.to_string(),
                column: old.name.clone(),
                new_name: new.name.clone(),
            });
        }
        script.extend(alter_column(table, old, new));
    }

    if let Some(name) = drop_sequence {
        script.push(DdlStatement::DropSequence { name });
    }

    if let Some(fk) = &to.inner_constraint {
        if from.inner_constraint != to.inner_constraint {
            script.push(DdlStatement::AddForeignKey {
                table: table.to_string(),
                foreign_key: fk.clone(),
            });
        }
    }

    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::{ColumnDefault, ColumnType};
    use crate::meta::OnDelete;
    use serde_json::Value;

    fn schema(columns: Vec<Column>) -> PhysicalSchema {
        PhysicalSchema {
            table: "o_a".to_string(),
            columns,
            primary_key: "id".to_string(),
            inner_constraints: Vec::new(),
            outer_constraints: Vec::new(),
            sequences: Vec::new(),
        }
    }

    fn id() -> Column {
        Column::new("id", ColumnType::Numeric, false)
    }

    #[test]
    fn test_identical_schemas() {
        let old = schema(vec![id(), Column::new("title", ColumnType::Text, true)]);
        let diff = SchemaDiff::compute(&old, &old.clone());
        assert!(diff.is_empty());
        assert!(diff.script().is_empty());
    }

    #[test]
    fn test_script_order() {
        let fk = InnerForeignKey {
            from_column: "owner".to_string(),
            to_table: "o_b".to_string(),
            to_column: "id".to_string(),
            on_delete: OnDelete::Cascade,
        };
        let mut old = schema(vec![
            id(),
            Column::new("owner", ColumnType::Numeric, false),
            Column::new("title", ColumnType::Text, true),
        ]);
        old.inner_constraints.push(fk.clone());
        old.sequences.push(Sequence::new("o_a_old_seq"));

        let mut new = schema(vec![
            id(),
            Column::new("owner", ColumnType::Numeric, false),
            Column::new("title", ColumnType::Text, false),
            Column::new("count", ColumnType::Numeric, true),
        ]);
        new.inner_constraints.push(InnerForeignKey {
            on_delete: OnDelete::SetNull,
            ..fk
        });
        new.sequences.push(Sequence::new("o_a_count_seq"));

        let names: Vec<String> = SchemaDiff::compute(&old, &new)
            .script()
            .iter()
            .map(DdlStatement::name)
            .collect();
        assert_eq!(
            names,
            vec![
                "drop_fk#o_a.fk_owner_o_b_id",
                "drop_seq#o_a_old_seq",
                "create_seq#o_a_count_seq",
                "add_column#o_a.count",
                "alter_column#o_a.title",
                "add_fk#o_a.fk_owner_o_b_id",
            ]
        );
    }

    #[test]
    fn test_primary_key_never_altered() {
        let old = schema(vec![id()]);
        let new = schema(vec![Column::new("id", ColumnType::Text, false)]);
        assert!(SchemaDiff::compute(&old, &new).columns_to_alter.is_empty());
    }

    #[test]
    fn test_default_change_is_an_alter() {
        let old = schema(vec![id(), Column::new("count", ColumnType::Numeric, true)]);
        let mut count = Column::new("count", ColumnType::Numeric, true);
        count.default = Some(ColumnDefault::Literal { value: Value::from(10) });
        let new = schema(vec![id(), count]);

        let script = SchemaDiff::compute(&old, &new).script();
        assert_eq!(script.len(), 1);
        assert!(matches!(
            &script[0],
            DdlStatement::AlterColumnDefault { default: Some(_), .. }
        ));
    }

    #[test]
    fn test_update_field_script_renames() {
        let from = FieldProperties {
            columns: vec![Column::new("title", ColumnType::Text, true)],
            ..Default::default()
        };
        let to = FieldProperties {
            columns: vec![Column::new("name", ColumnType::Text, false)],
            ..Default::default()
        };
        let script = update_field_script("o_a", "name", &from, &to).unwrap();
        assert_eq!(
            script.iter().map(DdlStatement::to_sql).collect::<Vec<_>>(),
            vec![
                "ALTER TABLE \"o_a\" RENAME \"title\" TO \"name\";",
                "ALTER TABLE \"o_a\" ALTER COLUMN \"name\" SET NOT NULL;",
            ]
        );
    }

    #[test]
    fn test_update_field_script_rejects_layout_change() {
        let from = FieldProperties {
            columns: vec![Column::new("target", ColumnType::Text, true)],
            ..Default::default()
        };
        let to = FieldProperties {
            columns: vec![
                Column::new("target__type", ColumnType::Text, true),
                Column::new("target__key", ColumnType::Text, true),
            ],
            ..Default::default()
        };
        let err = update_field_script("o_a", "target", &from, &to).unwrap_err();
        assert_eq!(err.code(), "unsupported_link_type");
    }

    #[test]
    fn test_rename_table_script_renames_sequences() {
        let mut id_column = id();
        id_column.default = Some(ColumnDefault::Sequence {
            name: "o_a_id_seq".to_string(),
        });
        let mut old = schema(vec![id_column.clone()]);
        old.sequences.push(Sequence::new("o_a_id_seq"));

        id_column.default = Some(ColumnDefault::Sequence {
            name: "o_b_id_seq".to_string(),
        });
        let mut new = schema(vec![id_column]);
        new.table = "o_b".to_string();

        let sql: Vec<String> = rename_table_script(&old, &new).iter().map(DdlStatement::to_sql).collect();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"o_a\" RENAME TO \"o_b\";",
                "ALTER SEQUENCE \"o_a_id_seq\" RENAME TO \"o_b_id_seq\";",
            ]
        );
    }
}
