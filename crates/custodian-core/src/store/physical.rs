//! The physical catalog: tables, sequences and their rows.
//!
//! Statements follow PostgreSQL semantics for the subset the DDL engine
//! emits. Rows are kept inline with their table so back-fill, defaults and
//! constraints can be checked the way a live database would.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::debug;

use super::transaction::Transaction;
use crate::ddl::{
    unique_constraint_name, Column, ColumnDefault, ColumnType, DdlError, DdlStatement, InnerForeignKey,
    PhysicalSchema, Sequence,
};
use crate::error::Error;

/// A table row, by column name.
pub type Row = BTreeMap<String, Value>;

/// A stored table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableState {
    /// Table name.
    pub name: String,
    /// Columns, in order.
    pub columns: Vec<Column>,
    /// Primary key column.
    pub primary_key: String,
    /// Foreign keys owned by the table.
    pub foreign_keys: Vec<InnerForeignKey>,
    /// Rows.
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl TableState {
    fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Schema as seen by introspection.
    ///
    /// Sequences are those referenced by column defaults; outer links
    /// leave no trace in the catalog.
    pub fn schema(&self) -> PhysicalSchema {
        PhysicalSchema {
            table: self.name.clone(),
            columns: self.columns.clone(),
            primary_key: self.primary_key.clone(),
            inner_constraints: self.foreign_keys.clone(),
            outer_constraints: Vec::new(),
            sequences: self
                .columns
                .iter()
                .filter_map(|c| c.default.as_ref().and_then(ColumnDefault::sequence))
                .map(Sequence::new)
                .collect(),
        }
    }
}

/// A stored sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceState {
    /// Sequence name.
    pub name: String,
    /// Last value handed out, 0 before the first `nextval`.
    pub value: i64,
}

enum Failure {
    Rejected(String),
    Store(Error),
}

impl From<Error> for Failure {
    fn from(e: Error) -> Self {
        Failure::Store(e)
    }
}

impl Failure {
    fn into_error(self, statement: String) -> Error {
        match self {
            Failure::Rejected(message) => DdlError::Execution { statement, message }.into(),
            Failure::Store(e) => e,
        }
    }
}

type Outcome<T> = Result<T, Failure>;

fn rejected(message: impl Into<String>) -> Failure {
    Failure::Rejected(message.into())
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => a == b,
    }
}

fn parse_number(raw: &str) -> Option<Value> {
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Value::from(int));
    }
    raw.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
}

/// Convert a value to the representation of `column_type`.
fn coerce(value: &Value, column_type: ColumnType) -> Result<Value, String> {
    let invalid = || format!("invalid input syntax for type {}: {}", column_type, value);
    match (column_type, value) {
        (_, Value::Null) => Ok(Value::Null),
        (ColumnType::Text, Value::String(_)) => Ok(value.clone()),
        (ColumnType::Text, Value::Number(n)) => Ok(Value::String(n.to_string())),
        (ColumnType::Text, Value::Bool(b)) => Ok(Value::String(b.to_string())),
        (ColumnType::Numeric, Value::Number(_)) => Ok(value.clone()),
        (ColumnType::Numeric, Value::String(s)) => parse_number(s).ok_or_else(invalid),
        (ColumnType::Bool, Value::Bool(_)) => Ok(value.clone()),
        (ColumnType::Bool, Value::String(s)) => match s.as_str() {
            "true" | "t" => Ok(Value::Bool(true)),
            "false" | "f" => Ok(Value::Bool(false)),
            _ => Err(invalid()),
        },
        (ColumnType::Date, Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(|_| value.clone())
            .map_err(|_| invalid()),
        (ColumnType::Timestamp, Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|_| value.clone())
            .map_err(|_| invalid()),
        (ColumnType::Time, Value::String(s)) => NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S%.f%:z"))
            .map(|_| value.clone())
            .map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

/// Current time rendered for a column of `column_type`.
fn now_value(column_type: ColumnType) -> Value {
    let now = Utc::now();
    let text = match column_type {
        ColumnType::Date => now.format("%Y-%m-%d").to_string(),
        ColumnType::Time => now.format("%H:%M:%S").to_string(),
        _ => now.to_rfc3339(),
    };
    Value::String(text)
}

fn check_unique(table: &TableState, column: &str, rows: &[Row]) -> Outcome<()> {
    let mut seen: Vec<&Value> = Vec::new();
    for value in rows.iter().filter_map(|r| r.get(column)).filter(|v| !v.is_null()) {
        if seen.iter().any(|s| same_value(s, value)) {
            return Err(rejected(format!(
                "could not create unique index \"{}\": key ({})=({}) is duplicated",
                unique_constraint_name(&table.name, column),
                column,
                value
            )));
        }
        seen.push(value);
    }
    Ok(())
}

impl Transaction<'_> {
    /// Execute one statement against the catalog.
    pub fn execute(&mut self, statement: &DdlStatement) -> Result<(), Error> {
        debug!(statement = %statement.name(), sql = %statement.to_sql(), "executing ddl");
        self.apply_statement(statement)
            .map_err(|failure| failure.into_error(statement.name()))
    }

    /// Execute statements in order, stopping at the first failure.
    pub fn execute_all(&mut self, statements: &[DdlStatement]) -> Result<(), Error> {
        for statement in statements {
            self.execute(statement)?;
        }
        Ok(())
    }

    /// Read the live schema of `table`.
    ///
    /// A missing table is reported as [`DdlError::NotFound`].
    pub fn introspect(&self, table: &str) -> Result<PhysicalSchema, Error> {
        match self.load_table(table)? {
            Some(state) => Ok(state.schema()),
            None => Err(DdlError::NotFound {
                table: table.to_string(),
            }
            .into()),
        }
    }

    /// Whether a sequence exists.
    pub fn sequence_exists(&self, name: &str) -> Result<bool, Error> {
        Ok(self.load_sequence(name)?.is_some())
    }

    /// Rows of `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Result<Vec<Row>, Error> {
        match self.load_table(table)? {
            Some(state) => Ok(state.rows),
            None => Err(DdlError::NotFound {
                table: table.to_string(),
            }
            .into()),
        }
    }

    /// Insert a row, filling defaults and checking constraints.
    pub fn insert_row(&mut self, table: &str, values: Row) -> Result<Row, Error> {
        self.insert_row_checked(table, values)
            .map_err(|failure| failure.into_error(format!("insert#{}", table)))
    }

    fn insert_row_checked(&mut self, table: &str, values: Row) -> Outcome<Row> {
        let mut state = self.require_table(table)?;
        if let Some(unknown) = values.keys().find(|k| state.column(k).is_none()) {
            return Err(rejected(format!(
                "column \"{}\" of relation \"{}\" does not exist",
                unknown, table
            )));
        }

        let mut row = Row::new();
        for column in state.columns.clone() {
            let value = match values.get(&column.name) {
                Some(value) => coerce(value, column.column_type).map_err(Failure::Rejected)?,
                None => match &column.default {
                    Some(default) => self.evaluate_default(default, column.column_type)?,
                    None => Value::Null,
                },
            };
            let is_key = column.name == state.primary_key;
            if value.is_null() && (!column.optional || is_key) {
                return Err(rejected(format!(
                    "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    column.name, table
                )));
            }
            if !value.is_null()
                && (column.unique || is_key)
                && state
                    .rows
                    .iter()
                    .any(|r| r.get(&column.name).map_or(false, |v| same_value(v, &value)))
            {
                return Err(rejected(format!(
                    "duplicate key value violates unique constraint \"{}\"",
                    unique_constraint_name(table, &column.name)
                )));
            }
            row.insert(column.name.clone(), value);
        }

        for fk in &state.foreign_keys {
            let value = match row.get(&fk.from_column) {
                Some(value) if !value.is_null() => value,
                _ => continue,
            };
            let found = if fk.to_table == state.name {
                state
                    .rows
                    .iter()
                    .chain(std::iter::once(&row))
                    .any(|r| r.get(&fk.to_column).map_or(false, |v| same_value(v, value)))
            } else {
                self.require_table(&fk.to_table)?
                    .rows
                    .iter()
                    .any(|r| r.get(&fk.to_column).map_or(false, |v| same_value(v, value)))
            };
            if !found {
                return Err(rejected(format!(
                    "insert on table \"{}\" violates foreign key constraint \"{}\"",
                    table,
                    fk.name()
                )));
            }
        }

        state.rows.push(row.clone());
        self.put_table(table, Some(state));
        Ok(row)
    }

    fn require_table(&self, name: &str) -> Outcome<TableState> {
        self.load_table(name)?
            .ok_or_else(|| rejected(format!("relation \"{}\" does not exist", name)))
    }

    fn require_sequence(&self, name: &str) -> Outcome<SequenceState> {
        self.load_sequence(name)?
            .ok_or_else(|| rejected(format!("relation \"{}\" does not exist", name)))
    }

    fn nextval(&mut self, name: &str) -> Outcome<i64> {
        let mut sequence = self.require_sequence(name)?;
        sequence.value += 1;
        let value = sequence.value;
        self.put_sequence(name, Some(sequence));
        Ok(value)
    }

    fn check_default(&self, default: Option<&ColumnDefault>) -> Outcome<()> {
        if let Some(name) = default.and_then(ColumnDefault::sequence) {
            self.require_sequence(name)?;
        }
        Ok(())
    }

    fn evaluate_default(&mut self, default: &ColumnDefault, column_type: ColumnType) -> Outcome<Value> {
        let value = match default {
            ColumnDefault::Literal { value } => value.clone(),
            ColumnDefault::Sequence { name } => Value::from(self.nextval(name)?),
            ColumnDefault::CurrentDate => now_value(ColumnType::Date),
            ColumnDefault::CurrentTimestamp | ColumnDefault::Now => now_value(column_type),
            ColumnDefault::Function { name, .. } => {
                return Err(rejected(format!("function {}() does not exist", name)))
            }
        };
        coerce(&value, column_type).map_err(Failure::Rejected)
    }

    fn check_foreign_key(&self, owner: &TableState, fk: &InnerForeignKey) -> Outcome<()> {
        if owner.column(&fk.from_column).is_none() {
            return Err(rejected(format!(
                "column \"{}\" referenced in foreign key constraint does not exist",
                fk.from_column
            )));
        }
        if owner.foreign_keys.iter().any(|other| other.name() == fk.name()) {
            return Err(rejected(format!(
                "constraint \"{}\" for relation \"{}\" already exists",
                fk.name(),
                owner.name
            )));
        }

        let target = if fk.to_table == owner.name {
            owner.clone()
        } else {
            self.require_table(&fk.to_table)?
        };
        let to_column = target.column(&fk.to_column).ok_or_else(|| {
            rejected(format!(
                "column \"{}\" referenced in foreign key constraint does not exist",
                fk.to_column
            ))
        })?;
        if fk.to_column != target.primary_key && !to_column.unique {
            return Err(rejected(format!(
                "there is no unique constraint matching given keys for referenced table \"{}\"",
                target.name
            )));
        }

        for row in &owner.rows {
            let value = match row.get(&fk.from_column) {
                Some(value) if !value.is_null() => value,
                _ => continue,
            };
            let found = target
                .rows
                .iter()
                .any(|r| r.get(&fk.to_column).map_or(false, |v| same_value(v, value)));
            if !found {
                return Err(rejected(format!(
                    "insert or update on table \"{}\" violates foreign key constraint \"{}\"",
                    owner.name,
                    fk.name()
                )));
            }
        }
        Ok(())
    }

    /// Rewrite foreign keys of every table other than `skip`.
    fn update_referencing<F>(&mut self, skip: &str, rewrite: F) -> Outcome<()>
    where
        F: Fn(&mut InnerForeignKey) -> bool,
    {
        for name in self.tables()? {
            if name == skip {
                continue;
            }
            let mut other = self.require_table(&name)?;
            let mut changed = false;
            for fk in &mut other.foreign_keys {
                changed |= rewrite(fk);
            }
            if changed {
                self.put_table(&name, Some(other));
            }
        }
        Ok(())
    }

    fn apply_statement(&mut self, statement: &DdlStatement) -> Outcome<()> {
        match statement {
            DdlStatement::CreateTable {
                table,
                columns,
                primary_key,
                foreign_keys,
            } => {
                if self.load_table(table)?.is_some() {
                    return Err(rejected(format!("relation \"{}\" already exists", table)));
                }
                let mut names = HashSet::new();
                for column in columns {
                    if !names.insert(column.name.as_str()) {
                        return Err(rejected(format!(
                            "column \"{}\" specified more than once",
                            column.name
                        )));
                    }
                    self.check_default(column.default.as_ref())?;
                }
                if !names.contains(primary_key.as_str()) {
                    return Err(rejected(format!(
                        "column \"{}\" named in key does not exist",
                        primary_key
                    )));
                }
                let mut state = TableState {
                    name: table.clone(),
                    columns: columns.clone(),
                    primary_key: primary_key.clone(),
                    foreign_keys: Vec::new(),
                    rows: Vec::new(),
                };
                for fk in foreign_keys {
                    self.check_foreign_key(&state, fk)?;
                    state.foreign_keys.push(fk.clone());
                }
                self.put_table(table, Some(state));
            }

            DdlStatement::DropTable { table, cascade } => {
                self.require_table(table)?;
                for name in self.tables()? {
                    if name == *table {
                        continue;
                    }
                    let mut other = self.require_table(&name)?;
                    let dependent = other.foreign_keys.iter().find(|fk| fk.to_table == *table);
                    if let Some(fk) = dependent {
                        if !cascade {
                            return Err(rejected(format!(
                                "cannot drop table \"{}\" because constraint \"{}\" on table \"{}\" depends on it",
                                table,
                                fk.name(),
                                name
                            )));
                        }
                        other.foreign_keys.retain(|fk| fk.to_table != *table);
                        self.put_table(&name, Some(other));
                    }
                }
                self.put_table(table, None);
            }

            DdlStatement::RenameTable { table, new_name } => {
                let mut state = self.require_table(table)?;
                if self.load_table(new_name)?.is_some() {
                    return Err(rejected(format!("relation \"{}\" already exists", new_name)));
                }
                state.name = new_name.clone();
                for fk in &mut state.foreign_keys {
                    if fk.to_table == *table {
                        fk.to_table = new_name.clone();
                    }
                }
                self.put_table(table, None);
                self.put_table(new_name, Some(state));
                self.update_referencing(new_name, |fk| {
                    if fk.to_table == *table {
                        fk.to_table = new_name.clone();
                        true
                    } else {
                        false
                    }
                })?;
            }

            DdlStatement::AddColumn { table, column } => {
                let mut state = self.require_table(table)?;
                if state.column(&column.name).is_some() {
                    return Err(rejected(format!(
                        "column \"{}\" of relation \"{}\" already exists",
                        column.name, table
                    )));
                }
                self.check_default(column.default.as_ref())?;
                if !column.optional && column.default.is_none() && !state.rows.is_empty() {
                    return Err(rejected(format!(
                        "column \"{}\" of relation \"{}\" contains null values",
                        column.name, table
                    )));
                }
                for index in 0..state.rows.len() {
                    let value = match &column.default {
                        Some(default) => self.evaluate_default(default, column.column_type)?,
                        None => Value::Null,
                    };
                    state.rows[index].insert(column.name.clone(), value);
                }
                if column.unique {
                    check_unique(&state, &column.name, &state.rows)?;
                }
                state.columns.push(column.clone());
                self.put_table(table, Some(state));
            }

            DdlStatement::DropColumn { table, column } => {
                let mut state = self.require_table(table)?;
                if state.column(column).is_none() {
                    return Err(rejected(format!(
                        "column \"{}\" of relation \"{}\" does not exist",
                        column, table
                    )));
                }
                if *column == state.primary_key {
                    return Err(rejected(format!(
                        "cannot drop column \"{}\" of table \"{}\" because it is the primary key",
                        column, table
                    )));
                }
                for name in self.tables()? {
                    if name == *table {
                        continue;
                    }
                    let other = self.require_table(&name)?;
                    if let Some(fk) = other
                        .foreign_keys
                        .iter()
                        .find(|fk| fk.to_table == *table && fk.to_column == *column)
                    {
                        return Err(rejected(format!(
                            "cannot drop column \"{}\" of table \"{}\" because constraint \"{}\" depends on it",
                            column,
                            table,
                            fk.name()
                        )));
                    }
                }
                state.columns.retain(|c| c.name != *column);
                state
                    .foreign_keys
                    .retain(|fk| fk.from_column != *column && !(fk.to_table == *table && fk.to_column == *column));
                for row in &mut state.rows {
                    row.remove(column);
                }
                self.put_table(table, Some(state));
            }

            DdlStatement::RenameColumn {
                table,
                column,
                new_name,
            } => {
                let mut state = self.require_table(table)?;
                if state.column(new_name).is_some() {
                    return Err(rejected(format!(
                        "column \"{}\" of relation \"{}\" already exists",
                        new_name, table
                    )));
                }
                let renamed = state.column_mut(column).ok_or_else(|| {
                    rejected(format!("column \"{}\" of relation \"{}\" does not exist", column, table))
                })?;
                renamed.name = new_name.clone();
                if state.primary_key == *column {
                    state.primary_key = new_name.clone();
                }
                for fk in &mut state.foreign_keys {
                    if fk.from_column == *column {
                        fk.from_column = new_name.clone();
                    }
                    if fk.to_table == *table && fk.to_column == *column {
                        fk.to_column = new_name.clone();
                    }
                }
                for row in &mut state.rows {
                    if let Some(value) = row.remove(column) {
                        row.insert(new_name.clone(), value);
                    }
                }
                self.put_table(table, Some(state));
                self.update_referencing(table, |fk| {
                    if fk.to_table == *table && fk.to_column == *column {
                        fk.to_column = new_name.clone();
                        true
                    } else {
                        false
                    }
                })?;
            }

            DdlStatement::AlterColumnType {
                table,
                column,
                column_type,
            } => {
                let mut state = self.require_table(table)?;
                for row in &mut state.rows {
                    if let Some(value) = row.get_mut(column) {
                        *value = coerce(value, *column_type).map_err(Failure::Rejected)?;
                    }
                }
                let altered = state.column_mut(column).ok_or_else(|| {
                    rejected(format!("column \"{}\" of relation \"{}\" does not exist", column, table))
                })?;
                altered.column_type = *column_type;
                self.put_table(table, Some(state));
            }

            DdlStatement::AlterColumnNullability {
                table,
                column,
                optional,
            } => {
                let mut state = self.require_table(table)?;
                if !optional
                    && state
                        .rows
                        .iter()
                        .any(|r| r.get(column).map_or(true, Value::is_null))
                {
                    return Err(rejected(format!(
                        "column \"{}\" of relation \"{}\" contains null values",
                        column, table
                    )));
                }
                let altered = state.column_mut(column).ok_or_else(|| {
                    rejected(format!("column \"{}\" of relation \"{}\" does not exist", column, table))
                })?;
                altered.optional = *optional;
                self.put_table(table, Some(state));
            }

            DdlStatement::AlterColumnDefault {
                table,
                column,
                default,
            } => {
                let mut state = self.require_table(table)?;
                self.check_default(default.as_ref())?;
                let altered = state.column_mut(column).ok_or_else(|| {
                    rejected(format!("column \"{}\" of relation \"{}\" does not exist", column, table))
                })?;
                altered.default = default.clone();
                self.put_table(table, Some(state));
            }

            DdlStatement::AlterColumnUnique {
                table,
                column,
                unique,
            } => {
                let mut state = self.require_table(table)?;
                if *unique {
                    check_unique(&state, column, &state.rows)?;
                }
                let altered = state.column_mut(column).ok_or_else(|| {
                    rejected(format!("column \"{}\" of relation \"{}\" does not exist", column, table))
                })?;
                altered.unique = *unique;
                self.put_table(table, Some(state));
            }

            DdlStatement::AddForeignKey { table, foreign_key } => {
                let mut state = self.require_table(table)?;
                self.check_foreign_key(&state, foreign_key)?;
                state.foreign_keys.push(foreign_key.clone());
                self.put_table(table, Some(state));
            }

            DdlStatement::DropForeignKey { table, name } => {
                let mut state = self.require_table(table)?;
                let index = state
                    .foreign_keys
                    .iter()
                    .position(|fk| fk.name() == *name)
                    .ok_or_else(|| {
                        rejected(format!(
                            "constraint \"{}\" of relation \"{}\" does not exist",
                            name, table
                        ))
                    })?;
                state.foreign_keys.remove(index);
                self.put_table(table, Some(state));
            }

            DdlStatement::CreateSequence { name } => {
                if self.load_sequence(name)?.is_some() {
                    return Err(rejected(format!("relation \"{}\" already exists", name)));
                }
                self.put_sequence(
                    name,
                    Some(SequenceState {
                        name: name.clone(),
                        value: 0,
                    }),
                );
            }

            DdlStatement::DropSequence { name } => {
                self.require_sequence(name)?;
                self.put_sequence(name, None);
            }

            DdlStatement::RenameSequence { name, new_name } => {
                let mut sequence = self.require_sequence(name)?;
                if self.load_sequence(new_name)?.is_some() {
                    return Err(rejected(format!("relation \"{}\" already exists", new_name)));
                }
                sequence.name = new_name.clone();
                self.put_sequence(name, None);
                self.put_sequence(new_name, Some(sequence));

                for table in self.tables()? {
                    let mut state = self.require_table(&table)?;
                    let mut changed = false;
                    for column in &mut state.columns {
                        if column.default.as_ref().and_then(ColumnDefault::sequence) == Some(name.as_str()) {
                            column.default = Some(ColumnDefault::Sequence {
                                name: new_name.clone(),
                            });
                            changed = true;
                        }
                    }
                    if changed {
                        self.put_table(&table, Some(state));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::{create_table_script, Column};
    use crate::meta::OnDelete;
    use crate::store::Storage;

    fn storage() -> Storage {
        Storage::with_db(sled::Config::new().temporary(true).open().unwrap()).unwrap()
    }

    fn person_table() -> PhysicalSchema {
        let mut id = Column::new("id", ColumnType::Numeric, true);
        id.default = Some(ColumnDefault::Sequence {
            name: "o_person_id_seq".to_string(),
        });
        PhysicalSchema {
            table: "o_person".to_string(),
            columns: vec![id, Column::new("name", ColumnType::Text, true)],
            primary_key: "id".to_string(),
            inner_constraints: Vec::new(),
            outer_constraints: Vec::new(),
            sequences: vec![Sequence::new("o_person_id_seq")],
        }
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_create_insert_introspect() {
        let storage = storage();
        let mut tx = storage.begin();
        tx.execute_all(&create_table_script(&person_table())).unwrap();

        let first = tx.insert_row("o_person", row(&[("name", Value::from("ann"))])).unwrap();
        let second = tx.insert_row("o_person", Row::new()).unwrap();
        assert_eq!(first["id"], Value::from(1));
        assert_eq!(second["id"], Value::from(2));

        let schema = tx.introspect("o_person").unwrap();
        assert_eq!(schema, TableState {
            name: "o_person".to_string(),
            columns: person_table().columns,
            primary_key: "id".to_string(),
            foreign_keys: Vec::new(),
            rows: Vec::new(),
        }
        .schema());
        assert!(matches!(
            tx.introspect("o_missing"),
            Err(Error::Ddl(DdlError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_add_column_backfills_default() {
        let storage = storage();
        let mut tx = storage.begin();
        tx.execute_all(&create_table_script(&person_table())).unwrap();
        tx.insert_row("o_person", Row::new()).unwrap();

        let mut count = Column::new("count", ColumnType::Numeric, true);
        count.default = Some(ColumnDefault::Literal { value: Value::from(10) });
        tx.execute(&DdlStatement::AddColumn {
            table: "o_person".to_string(),
            column: count,
        })
        .unwrap();
        assert_eq!(tx.rows("o_person").unwrap()[0]["count"], Value::from(10));

        let err = tx
            .execute(&DdlStatement::AddColumn {
                table: "o_person".to_string(),
                column: Column::new("title", ColumnType::Text, false),
            })
            .unwrap_err();
        assert!(matches!(err, Error::Ddl(DdlError::Execution { ref statement, .. }) if statement == "add_column#o_person.title"));
    }

    #[test]
    fn test_set_not_null_checks_rows() {
        let storage = storage();
        let mut tx = storage.begin();
        tx.execute_all(&create_table_script(&person_table())).unwrap();
        tx.insert_row("o_person", Row::new()).unwrap();

        let err = tx.execute(&DdlStatement::AlterColumnNullability {
            table: "o_person".to_string(),
            column: "name".to_string(),
            optional: false,
        });
        assert!(err.is_err());
    }

    #[test]
    fn test_foreign_keys_and_restrict() {
        let storage = storage();
        let mut tx = storage.begin();
        tx.execute_all(&create_table_script(&person_table())).unwrap();
        let person = tx.insert_row("o_person", Row::new()).unwrap();

        let fk = InnerForeignKey {
            from_column: "owner".to_string(),
            to_table: "o_person".to_string(),
            to_column: "id".to_string(),
            on_delete: OnDelete::Cascade,
        };
        tx.execute(&DdlStatement::CreateTable {
            table: "o_order".to_string(),
            columns: vec![
                Column::new("id", ColumnType::Numeric, false),
                Column::new("owner", ColumnType::Numeric, false),
            ],
            primary_key: "id".to_string(),
            foreign_keys: vec![fk],
        })
        .unwrap();

        tx.insert_row("o_order", row(&[("id", Value::from(1)), ("owner", person["id"].clone())]))
            .unwrap();
        assert!(tx
            .insert_row("o_order", row(&[("id", Value::from(2)), ("owner", Value::from(99))]))
            .is_err());

        let restrict = DdlStatement::DropTable {
            table: "o_person".to_string(),
            cascade: false,
        };
        assert!(tx.execute(&restrict).is_err());

        tx.execute(&DdlStatement::RenameTable {
            table: "o_person".to_string(),
            new_name: "o_customer".to_string(),
        })
        .unwrap();
        let order = tx.introspect("o_order").unwrap();
        assert_eq!(order.inner_constraints[0].name(), "fk_owner_o_customer_id");

        tx.execute(&DdlStatement::DropTable {
            table: "o_customer".to_string(),
            cascade: true,
        })
        .unwrap();
        assert!(tx.introspect("o_order").unwrap().inner_constraints.is_empty());
    }

    #[test]
    fn test_rename_sequence_follows_defaults() {
        let storage = storage();
        let mut tx = storage.begin();
        tx.execute_all(&create_table_script(&person_table())).unwrap();
        tx.execute(&DdlStatement::RenameSequence {
            name: "o_person_id_seq".to_string(),
            new_name: "o_customer_id_seq".to_string(),
        })
        .unwrap();

        assert!(tx.sequence_exists("o_customer_id_seq").unwrap());
        assert!(!tx.sequence_exists("o_person_id_seq").unwrap());
        let schema = tx.introspect("o_person").unwrap();
        assert_eq!(schema.sequences, vec![Sequence::new("o_customer_id_seq")]);
    }

    #[test]
    fn test_alter_type_converts_rows() {
        let storage = storage();
        let mut tx = storage.begin();
        tx.execute_all(&create_table_script(&person_table())).unwrap();
        tx.insert_row("o_person", row(&[("name", Value::from("42"))])).unwrap();

        tx.execute(&DdlStatement::AlterColumnType {
            table: "o_person".to_string(),
            column: "name".to_string(),
            column_type: ColumnType::Numeric,
        })
        .unwrap();
        assert_eq!(tx.rows("o_person").unwrap()[0]["name"], Value::from(42));

        tx.insert_row("o_person", row(&[("name", Value::from(42))])).unwrap();
        let err = tx.execute(&DdlStatement::AlterColumnUnique {
            table: "o_person".to_string(),
            column: "name".to_string(),
            unique: true,
        });
        assert!(err.is_err());
    }
}
