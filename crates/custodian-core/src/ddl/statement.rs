//! Typed DDL statements.
//!
//! Statements are data: the physical store executes them directly and
//! [`DdlStatement::to_sql`] renders the PostgreSQL text for logs and dumps.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::column::{ColumnDefault, ColumnType};
use super::schema::{Column, InnerForeignKey};

/// One schema-changing statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DdlStatement {
    /// `CREATE TABLE`
    CreateTable {
        /// Table name.
        table: String,
        /// Columns, in order.
        columns: Vec<Column>,
        /// Primary key column.
        primary_key: String,
        /// Foreign keys declared with the table.
        foreign_keys: Vec<InnerForeignKey>,
    },
    /// `DROP TABLE`
    DropTable {
        /// Table name.
        table: String,
        /// Drop referencing constraints too instead of refusing.
        cascade: bool,
    },
    /// `ALTER TABLE .. RENAME TO`
    RenameTable {
        /// Current name.
        table: String,
        /// New name.
        new_name: String,
    },
    /// `ALTER TABLE .. ADD COLUMN`
    AddColumn {
        /// Table name.
        table: String,
        /// Column definition.
        column: Column,
    },
    /// `ALTER TABLE .. DROP COLUMN`
    DropColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// `ALTER TABLE .. RENAME column`
    RenameColumn {
        /// Table name.
        table: String,
        /// Current column name.
        column: String,
        /// New column name.
        new_name: String,
    },
    /// `ALTER COLUMN .. SET DATA TYPE`
    AlterColumnType {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// New type.
        column_type: ColumnType,
    },
    /// `ALTER COLUMN .. SET NOT NULL` / `DROP NOT NULL`
    AlterColumnNullability {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Whether NULL becomes allowed.
        optional: bool,
    },
    /// `ALTER COLUMN .. SET DEFAULT` / `DROP DEFAULT`
    AlterColumnDefault {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// New default, `None` drops it.
        default: Option<ColumnDefault>,
    },
    /// `ADD CONSTRAINT .. UNIQUE` / `DROP CONSTRAINT`
    AlterColumnUnique {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Whether the column becomes unique.
        unique: bool,
    },
    /// `ADD CONSTRAINT .. FOREIGN KEY`
    AddForeignKey {
        /// Owning table.
        table: String,
        /// Constraint.
        foreign_key: InnerForeignKey,
    },
    /// `DROP CONSTRAINT` of a foreign key
    DropForeignKey {
        /// Owning table.
        table: String,
        /// Constraint name.
        name: String,
    },
    /// `CREATE SEQUENCE`
    CreateSequence {
        /// Sequence name.
        name: String,
    },
    /// `DROP SEQUENCE`
    DropSequence {
        /// Sequence name.
        name: String,
    },
    /// `ALTER SEQUENCE .. RENAME TO`
    RenameSequence {
        /// Current name.
        name: String,
        /// New name.
        new_name: String,
    },
}

/// Name of the unique constraint of a column.
pub fn unique_constraint_name(table: &str, column: &str) -> String {
    format!("{}_{}_key", table, column)
}

fn column_sql(column: &Column) -> String {
    let mut sql = format!("\"{}\" {}", column.name, column.column_type);
    if !column.optional {
        sql.push_str(" NOT NULL");
    }
    if column.unique {
        sql.push_str(" UNIQUE");
    }
    if let Some(default) = &column.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&default.to_sql());
    }
    sql
}

fn foreign_key_sql(fk: &InnerForeignKey) -> String {
    format!(
        "CONSTRAINT {} FOREIGN KEY (\"{}\") REFERENCES \"{}\" (\"{}\") ON DELETE {}",
        fk.name(),
        fk.from_column,
        fk.to_table,
        fk.to_column,
        fk.on_delete.to_db_value()
    )
}

impl DdlStatement {
    /// Short identity, e.g. `add_column#o_a.title`.
    pub fn name(&self) -> String {
        match self {
            DdlStatement::CreateTable { table, .. } => format!("create_table#{}", table),
            DdlStatement::DropTable { table, .. } => format!("drop_table#{}", table),
            DdlStatement::RenameTable { table, new_name } => {
                format!("rename_table#{}->{}", table, new_name)
            }
            DdlStatement::AddColumn { table, column } => {
                format!("add_column#{}.{}", table, column.name)
            }
            DdlStatement::DropColumn { table, column } => format!("drop_column#{}.{}", table, column),
            DdlStatement::RenameColumn { table, column, new_name } => {
                format!("rename_column#{}.{}->{}", table, column, new_name)
            }
            DdlStatement::AlterColumnType { table, column, .. }
            | DdlStatement::AlterColumnNullability { table, column, .. }
            | DdlStatement::AlterColumnDefault { table, column, .. }
            | DdlStatement::AlterColumnUnique { table, column, .. } => {
                format!("alter_column#{}.{}", table, column)
            }
            DdlStatement::AddForeignKey { table, foreign_key } => {
                format!("add_fk#{}.{}", table, foreign_key.name())
            }
            DdlStatement::DropForeignKey { table, name } => format!("drop_fk#{}.{}", table, name),
            DdlStatement::CreateSequence { name } => format!("create_seq#{}", name),
            DdlStatement::DropSequence { name } => format!("drop_seq#{}", name),
            DdlStatement::RenameSequence { name, new_name } => {
                format!("rename_seq#{}->{}", name, new_name)
            }
        }
    }

    /// Table the statement touches, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            DdlStatement::CreateTable { table, .. }
            | DdlStatement::DropTable { table, .. }
            | DdlStatement::RenameTable { table, .. }
            | DdlStatement::AddColumn { table, .. }
            | DdlStatement::DropColumn { table, .. }
            | DdlStatement::RenameColumn { table, .. }
            | DdlStatement::AlterColumnType { table, .. }
            | DdlStatement::AlterColumnNullability { table, .. }
            | DdlStatement::AlterColumnDefault { table, .. }
            | DdlStatement::AlterColumnUnique { table, .. }
            | DdlStatement::AddForeignKey { table, .. }
            | DdlStatement::DropForeignKey { table, .. } => Some(table),
            DdlStatement::CreateSequence { .. }
            | DdlStatement::DropSequence { .. }
            | DdlStatement::RenameSequence { .. } => None,
        }
    }

    /// PostgreSQL text of the statement.
    pub fn to_sql(&self) -> String {
        match self {
            DdlStatement::CreateTable {
                table,
                columns,
                primary_key,
                foreign_keys,
            } => {
                let mut parts: Vec<String> = columns.iter().map(column_sql).collect();
                parts.extend(foreign_keys.iter().map(foreign_key_sql));
                parts.push(format!("PRIMARY KEY (\"{}\")", primary_key));
                format!("CREATE TABLE \"{}\" ({});", table, parts.join(", "))
            }
            DdlStatement::DropTable { table, cascade } => format!(
                "DROP TABLE \"{}\" {};",
                table,
                if *cascade { "CASCADE" } else { "RESTRICT" }
            ),
            DdlStatement::RenameTable { table, new_name } => {
                format!("ALTER TABLE \"{}\" RENAME TO \"{}\";", table, new_name)
            }
            DdlStatement::AddColumn { table, column } => {
                format!("ALTER TABLE \"{}\" ADD COLUMN {};", table, column_sql(column))
            }
            DdlStatement::DropColumn { table, column } => {
                format!("ALTER TABLE \"{}\" DROP COLUMN \"{}\";", table, column)
            }
            DdlStatement::RenameColumn {
                table,
                column,
                new_name,
            } => format!(
                "ALTER TABLE \"{}\" RENAME \"{}\" TO \"{}\";",
                table, column, new_name
            ),
            DdlStatement::AlterColumnType {
                table,
                column,
                column_type,
            } => format!(
                "ALTER TABLE \"{}\" ALTER COLUMN \"{}\" SET DATA TYPE {};",
                table, column, column_type
            ),
            DdlStatement::AlterColumnNullability {
                table,
                column,
                optional,
            } => format!(
                "ALTER TABLE \"{}\" ALTER COLUMN \"{}\" {} NOT NULL;",
                table,
                column,
                if *optional { "DROP" } else { "SET" }
            ),
            DdlStatement::AlterColumnDefault {
                table,
                column,
                default,
            } => match default {
                Some(default) => format!(
                    "ALTER TABLE \"{}\" ALTER COLUMN \"{}\" SET DEFAULT {};",
                    table,
                    column,
                    default.to_sql()
                ),
                None => format!(
                    "ALTER TABLE \"{}\" ALTER COLUMN \"{}\" DROP DEFAULT;",
                    table, column
                ),
            },
            DdlStatement::AlterColumnUnique {
                table,
                column,
                unique,
            } => {
                let constraint = unique_constraint_name(table, column);
                if *unique {
                    format!(
                        "ALTER TABLE \"{}\" ADD CONSTRAINT \"{}\" UNIQUE (\"{}\");",
                        table, constraint, column
                    )
                } else {
                    format!("ALTER TABLE \"{}\" DROP CONSTRAINT \"{}\";", table, constraint)
                }
            }
            DdlStatement::AddForeignKey { table, foreign_key } => {
                format!("ALTER TABLE \"{}\" ADD {};", table, foreign_key_sql(foreign_key))
            }
            DdlStatement::DropForeignKey { table, name } => {
                format!("ALTER TABLE \"{}\" DROP CONSTRAINT {};", table, name)
            }
            DdlStatement::CreateSequence { name } => format!("CREATE SEQUENCE \"{}\";", name),
            DdlStatement::DropSequence { name } => format!("DROP SEQUENCE \"{}\";", name),
            DdlStatement::RenameSequence { name, new_name } => {
                format!("ALTER SEQUENCE \"{}\" RENAME TO \"{}\";", name, new_name)
            }
        }
    }
}

impl fmt::Display for DdlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::OnDelete;
    use serde_json::Value;

    fn fk() -> InnerForeignKey {
        InnerForeignKey {
            from_column: "owner".to_string(),
            to_table: "o_person".to_string(),
            to_column: "id".to_string(),
            on_delete: OnDelete::Cascade,
        }
    }

    #[test]
    fn test_create_table_sql() {
        let mut id = Column::new("id", ColumnType::Numeric, true);
        id.default = Some(ColumnDefault::Sequence {
            name: "o_order_id_seq".to_string(),
        });
        let statement = DdlStatement::CreateTable {
            table: "o_order".to_string(),
            columns: vec![id, Column::new("owner", ColumnType::Numeric, false)],
            primary_key: "id".to_string(),
            foreign_keys: vec![fk()],
        };
        assert_eq!(
            statement.to_sql(),
            "CREATE TABLE \"o_order\" (\"id\" numeric DEFAULT nextval('o_order_id_seq'), \
             \"owner\" numeric NOT NULL, \
             CONSTRAINT fk_owner_o_person_id FOREIGN KEY (\"owner\") REFERENCES \"o_person\" (\"id\") ON DELETE CASCADE, \
             PRIMARY KEY (\"id\"));"
        );
        assert_eq!(statement.name(), "create_table#o_order");
    }

    #[test]
    fn test_alter_sql() {
        let mut count = Column::new("count", ColumnType::Numeric, true);
        count.default = Some(ColumnDefault::Literal { value: Value::from(10) });
        let add = DdlStatement::AddColumn {
            table: "o_a".to_string(),
            column: count,
        };
        assert_eq!(
            add.to_sql(),
            "ALTER TABLE \"o_a\" ADD COLUMN \"count\" numeric DEFAULT 10;"
        );
        assert_eq!(add.name(), "add_column#o_a.count");

        let nullability = DdlStatement::AlterColumnNullability {
            table: "o_a".to_string(),
            column: "count".to_string(),
            optional: false,
        };
        assert_eq!(
            nullability.to_sql(),
            "ALTER TABLE \"o_a\" ALTER COLUMN \"count\" SET NOT NULL;"
        );

        let drop = DdlStatement::DropTable {
            table: "o_a".to_string(),
            cascade: false,
        };
        assert_eq!(drop.to_sql(), "DROP TABLE \"o_a\" RESTRICT;");
        assert_eq!(
            DdlStatement::DropForeignKey {
                table: "o_order".to_string(),
                name: fk().name()
            }
            .to_sql(),
            "ALTER TABLE \"o_order\" DROP CONSTRAINT fk_owner_o_person_id;"
        );
        assert_eq!(DdlStatement::CreateSequence { name: "s".to_string() }.table(), None);
    }
}
