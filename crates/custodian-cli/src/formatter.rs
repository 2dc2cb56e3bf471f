//! Output formatters.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use custodian_core::ddl::{DdlStatement, PhysicalSchema};
use custodian_core::meta::{Field, MetaDescription};
use custodian_core::store::HistoryRecord;
use serde_json::json;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format history records.
    fn format_history(&self, records: &[HistoryRecord]) -> String;

    /// Format the list of object types.
    fn format_metas(&self, metas: &[MetaDescription]) -> String;

    /// Format a single object type.
    fn format_meta(&self, meta: &MetaDescription) -> String;

    /// Format a physical schema.
    fn format_schema(&self, schema: &PhysicalSchema) -> String;

    /// Format DDL statements.
    fn format_statements(&self, statements: &[DdlStatement]) -> String;

    /// Format a simple message.
    fn format_message(&self, message: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_history(&self, records: &[HistoryRecord]) -> String {
        if records.is_empty() {
            return "No migrations".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec!["Id", "Object", "Apply to", "Depends on", "Applied at", "Description"]);
        for record in records {
            table.add_row(vec![
                Cell::new(&record.id),
                Cell::new(&record.object),
                Cell::new(&record.apply_to),
                Cell::new(record.depends_on.join(", ")),
                Cell::new(format_timestamp(record)),
                Cell::new(&record.description),
            ]);
        }
        table.to_string()
    }

    fn format_metas(&self, metas: &[MetaDescription]) -> String {
        if metas.is_empty() {
            return "No object types".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec!["Object", "Key", "Fields", "Actions"]);
        for meta in metas {
            table.add_row(vec![
                Cell::new(&meta.name),
                Cell::new(&meta.key),
                Cell::new(meta.fields.len()),
                Cell::new(meta.actions.len()),
            ]);
        }
        table.to_string()
    }

    fn format_meta(&self, meta: &MetaDescription) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Field", "Type", "Link", "Optional", "Default"]);
        for field in &meta.fields {
            table.add_row(vec![
                Cell::new(&field.name),
                Cell::new(field.field_type),
                Cell::new(format_link(field)),
                Cell::new(field.optional),
                Cell::new(field.default.as_ref().map(|d| json!(d).to_string()).unwrap_or_default()),
            ]);
        }

        let mut output = format!("{} (key: {})\n{}", meta.name, meta.key, table);
        if !meta.actions.is_empty() {
            let mut actions = Table::new();
            actions.set_header(vec!["Action", "Method", "Protocol"]);
            for action in &meta.actions {
                actions.add_row(vec![
                    Cell::new(&action.name),
                    Cell::new(action.method),
                    Cell::new(&action.protocol),
                ]);
            }
            output.push('\n');
            output.push_str(&actions.to_string());
        }
        output
    }

    fn format_schema(&self, schema: &PhysicalSchema) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Column", "Type", "Nullable", "Unique", "Default"]);
        for column in &schema.columns {
            table.add_row(vec![
                Cell::new(&column.name),
                Cell::new(column.column_type),
                Cell::new(column.optional),
                Cell::new(column.unique || column.name == schema.primary_key),
                Cell::new(column.default.as_ref().map(|d| d.to_string()).unwrap_or_default()),
            ]);
        }

        let mut output = format!("{}\n{}", schema.table, table);
        for fk in &schema.inner_constraints {
            output.push_str(&format!(
                "\n{}: {} -> {}({}) ON DELETE {}",
                fk.name(),
                fk.from_column,
                fk.to_table,
                fk.to_column,
                fk.on_delete
            ));
        }
        output
    }

    fn format_statements(&self, statements: &[DdlStatement]) -> String {
        if statements.is_empty() {
            return "Up to date".to_string();
        }
        statements
            .iter()
            .map(|s| format!("{};", s.to_sql()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_history(&self, records: &[HistoryRecord]) -> String {
        let records: Vec<serde_json::Value> = records.iter().map(history_to_json).collect();
        serde_json::to_string_pretty(&records).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_metas(&self, metas: &[MetaDescription]) -> String {
        serde_json::to_string_pretty(metas).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_meta(&self, meta: &MetaDescription) -> String {
        serde_json::to_string_pretty(meta).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_schema(&self, schema: &PhysicalSchema) -> String {
        serde_json::to_string_pretty(schema).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_statements(&self, statements: &[DdlStatement]) -> String {
        let statements: Vec<serde_json::Value> = statements
            .iter()
            .map(|s| json!({ "name": s.name(), "sql": s.to_sql() }))
            .collect();
        serde_json::to_string_pretty(&statements).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_message(&self, message: &str) -> String {
        json!({ "message": message }).to_string()
    }
}

fn history_to_json(record: &HistoryRecord) -> serde_json::Value {
    let meta_state: serde_json::Value = if record.meta_state.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(&record.meta_state).unwrap_or(serde_json::Value::Null)
    };
    json!({
        "id": record.id,
        "applyTo": record.apply_to,
        "object": record.object,
        "dependsOn": record.depends_on,
        "metaState": meta_state,
        "description": record.description,
        "appliedAt": format_timestamp(record),
        "order": record.order,
        "verified": record.verify(),
    })
}

/// Format the application time of a record for display.
fn format_timestamp(record: &HistoryRecord) -> String {
    record
        .created_at()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Format the link of a field for display.
fn format_link(field: &Field) -> String {
    let Some(link_type) = field.link_type else {
        return String::new();
    };
    let targets = match &field.link_meta {
        Some(target) => target.clone(),
        None => field.link_meta_list.join("|"),
    };
    match &field.outer_link_field {
        Some(olf) => format!("{} {}.{}", link_type, targets, olf),
        None => format!("{} {}", link_type, targets),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodian_core::meta::FieldType;

    #[test]
    fn test_format_link() {
        assert_eq!(format_link(&Field::optional("title", FieldType::String)), "");
        assert_eq!(format_link(&Field::inner_link("a", "a")), "inner a");
        assert_eq!(format_link(&Field::outer_link("b_set", FieldType::Array, "b", "a")), "outer b.a");
        assert_eq!(format_link(&Field::generic_link("target", ["a", "c"])), "inner a|c");
    }

    #[test]
    fn test_empty_outputs() {
        assert_eq!(TableFormatter.format_history(&[]), "No migrations");
        assert_eq!(TableFormatter.format_statements(&[]), "Up to date");
        assert_eq!(JsonFormatter.format_history(&[]), "[]");
    }

    #[test]
    fn test_json_history_parses_snapshot() {
        let record = HistoryRecord::new(
            "m1",
            "",
            "a",
            Vec::new(),
            "[]".to_string(),
            r#"{"name":"a","key":"id","fields":[]}"#.to_string(),
            "create a",
        );
        let value = history_to_json(&record);
        assert_eq!(value["metaState"]["name"], "a");
        assert_eq!(value["verified"], true);
        assert_eq!(value["dependsOn"], json!([]));
    }
}
