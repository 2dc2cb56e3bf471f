//! Concurrency validation of migrations against the history of their type.
//!
//! Migrations are built against the *frontier* of a type: its latest applied
//! migration together with every sibling sharing that migration's parents.
//! A migration whose parents are not the frontier may still be applied when
//! it has the same parents as the frontier and touches nothing the siblings
//! touch.

use std::collections::BTreeSet;

use tracing::debug;

use super::description::{MigrationDescription, MigrationOperationDescription};
use super::error::MigrationError;
use crate::store::{HistoryRecord, Transaction};

/// The frontier of `object`, in application order.
pub fn preceding_migrations(tx: &Transaction<'_>, object: &str) -> Result<Vec<HistoryRecord>, MigrationError> {
    let records: Vec<HistoryRecord> = tx
        .list_history()?
        .into_iter()
        .filter(|r| r.object == object)
        .collect();
    let Some(latest) = records.last() else {
        return Ok(Vec::new());
    };
    let parents = as_set(&latest.depends_on);
    Ok(records
        .iter()
        .filter(|r| as_set(&r.depends_on) == parents)
        .cloned()
        .collect())
}

fn as_set(ids: &[String]) -> BTreeSet<&str> {
    ids.iter().map(String::as_str).collect()
}

/// Check that `description` may be applied on top of the current history.
pub fn validate(tx: &Transaction<'_>, description: &MigrationDescription) -> Result<(), MigrationError> {
    let object = description.meta_name()?;
    let siblings = preceding_migrations(tx, &object)?;

    let frontier: BTreeSet<&str> = siblings.iter().map(|r| r.id.as_str()).collect();
    let parents = as_set(&description.depends_on);
    if frontier == parents {
        return Ok(());
    }
    if !frontier.is_disjoint(&parents) {
        return Err(MigrationError::ParentsChanged {
            id: description.id.clone(),
        });
    }

    let Some(latest) = siblings.last() else {
        return Err(not_actual(description, format!("object '{}' has no applied migrations", object)));
    };
    if as_set(&latest.depends_on) != parents {
        return Err(not_actual(description, format!("history of object '{}' has moved on", object)));
    }
    if parents.is_empty() {
        return Err(not_actual(description, "supposed to create an already existing object"));
    }

    debug!(object = %object, siblings = siblings.len(), "validating against siblings");
    let siblings = siblings
        .iter()
        .map(MigrationDescription::from_record)
        .collect::<Result<Vec<_>, _>>()?;
    validate_siblings(description, &siblings)
}

fn not_actual(description: &MigrationDescription, reason: impl Into<String>) -> MigrationError {
    MigrationError::IsNotActual {
        id: description.id.clone(),
        reason: reason.into(),
    }
}

/// Migrations sharing parents must be free of renames and deletions and
/// touch disjoint fields and actions.
pub fn validate_siblings(
    description: &MigrationDescription,
    siblings: &[MigrationDescription],
) -> Result<(), MigrationError> {
    let incompatible = |reason: String| MigrationError::NotCompatibleWithSiblings {
        id: description.id.clone(),
        reason,
    };

    check_standalone(description).map_err(incompatible)?;
    let fields = touched_fields(description);
    let actions = touched_actions(description);

    for sibling in siblings {
        check_standalone(sibling)
            .map_err(|reason| incompatible(format!("sibling '{}': {}", sibling.id, reason)))?;
        if let Some(field) = touched_fields(sibling).intersection(&fields).next() {
            return Err(incompatible(format!(
                "field '{}' is also changed by sibling '{}'",
                field, sibling.id
            )));
        }
        if let Some(action) = touched_actions(sibling).intersection(&actions).next() {
            return Err(incompatible(format!(
                "action '{}' is also changed by sibling '{}'",
                action, sibling.id
            )));
        }
    }
    Ok(())
}

fn check_standalone(description: &MigrationDescription) -> Result<(), String> {
    for operation in &description.operations {
        match operation {
            MigrationOperationDescription::RenameObject { .. } | MigrationOperationDescription::DeleteObject { .. } => {
                return Err(format!("'{}' operation", operation.kind()));
            }
            MigrationOperationDescription::UpdateField { field }
                if !field.previous_name.is_empty() && field.previous_name != field.field.name =>
            {
                return Err(format!("renaming field '{}' to '{}'", field.previous_name, field.field.name));
            }
            _ => {}
        }
    }
    Ok(())
}

fn touched_fields(description: &MigrationDescription) -> BTreeSet<String> {
    description
        .operations
        .iter()
        .filter_map(|o| o.field())
        .map(|f| f.field.name.clone())
        .collect()
}

fn touched_actions(description: &MigrationDescription) -> BTreeSet<String> {
    description
        .operations
        .iter()
        .filter_map(|o| o.action())
        .map(|a| a.action.name.clone())
        .collect()
}
