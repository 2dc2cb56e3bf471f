//! Inversion of applied migrations.

use super::description::{
    MigrationActionDescription, MigrationDescription, MigrationFieldDescription, MigrationOperationDescription,
};
use super::error::MigrationError;
use crate::meta::MetaDescription;

/// The migration undoing `description`, given the state of its type before
/// it was applied (`None` if the type did not exist).
///
/// Operations are inverted in reverse order and the result targets the
/// type as the original left it. Keeps the id and parents so that running
/// the result backward removes the original history record.
pub fn revert(
    previous: Option<&MetaDescription>,
    description: &MigrationDescription,
) -> Result<MigrationDescription, MigrationError> {
    let meta_name = description.meta_name()?;

    let mut apply_to = description.apply_to.clone();
    for operation in &description.operations {
        match operation {
            MigrationOperationDescription::CreateObject { object } | MigrationOperationDescription::RenameObject { object } => {
                apply_to = object.name.clone()
            }
            MigrationOperationDescription::DeleteObject { .. } => apply_to.clear(),
            _ => {}
        }
    }

    let mut operations = Vec::with_capacity(description.operations.len());
    for operation in description.operations.iter().rev() {
        operations.push(invert(previous, &meta_name, operation)?);
    }

    Ok(MigrationDescription {
        id: description.id.clone(),
        apply_to,
        depends_on: description.depends_on.clone(),
        operations,
        meta_state: previous.cloned(),
        description: description.description.clone(),
    })
}

fn previous_state<'p>(previous: Option<&'p MetaDescription>, kind: &str) -> Result<&'p MetaDescription, MigrationError> {
    previous.ok_or_else(|| MigrationError::invalid(format!("'{}' cannot be reverted without a previous state", kind)))
}

fn invert(
    previous: Option<&MetaDescription>,
    meta_name: &str,
    operation: &MigrationOperationDescription,
) -> Result<MigrationOperationDescription, MigrationError> {
    use MigrationOperationDescription as Op;

    let inverted = match operation {
        Op::CreateObject { object } => Op::DeleteObject { object: object.clone() },
        Op::DeleteObject { object } => Op::CreateObject { object: object.clone() },
        Op::RenameObject { object } => {
            let previous = previous_state(previous, operation.kind())?;
            let mut object = object.clone();
            object.name = previous.name.clone();
            Op::RenameObject { object }
        }
        Op::AddField { field } => Op::RemoveField {
            field: MigrationFieldDescription::new(field.field.clone()),
        },
        Op::RemoveField { field } => Op::AddField {
            field: MigrationFieldDescription::new(field.field.clone()),
        },
        Op::UpdateField { field } => {
            let previous = previous_state(previous, operation.kind())?;
            let lookup = field.lookup_name();
            let old = previous
                .find_field(lookup)
                .ok_or_else(|| MigrationError::PreviousStateFieldNotFound {
                    meta: meta_name.to_string(),
                    field: lookup.to_string(),
                })?;
            Op::UpdateField {
                field: MigrationFieldDescription::renamed(old.clone(), field.field.name.clone()),
            }
        }
        Op::AddAction { action } => Op::RemoveAction {
            action: MigrationActionDescription::new(action.action.clone()),
        },
        Op::RemoveAction { action } => Op::AddAction {
            action: MigrationActionDescription::new(action.action.clone()),
        },
        Op::UpdateAction { action } => {
            let previous = previous_state(previous, operation.kind())?;
            let lookup = action.lookup_name();
            let old = previous
                .find_action(lookup)
                .ok_or_else(|| MigrationError::PreviousStateActionNotFound {
                    meta: meta_name.to_string(),
                    action: lookup.to_string(),
                })?;
            Op::UpdateAction {
                action: MigrationActionDescription::renamed(old.clone(), action.action.name.clone()),
            }
        }
    };
    Ok(inverted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{Action, DefaultValue, Field, FieldType, Method};

    fn meta(name: &str) -> MetaDescription {
        MetaDescription::new(name, "id")
            .with_field(Field::optional("id", FieldType::Number).with_default(DefaultValue::nextval()))
    }

    #[test]
    fn test_revert_create() {
        let description = MigrationDescription::new("m1")
            .with_operation(MigrationOperationDescription::create_object(meta("a")));
        let reverted = revert(None, &description).unwrap();
        assert_eq!(reverted.id, "m1");
        assert_eq!(reverted.apply_to, "a");
        assert_eq!(reverted.operations[0].kind(), "deleteObject");
        assert!(reverted.meta_state.is_none());
    }

    #[test]
    fn test_revert_rename_and_delete_retarget() {
        let previous = meta("a");
        let description = MigrationDescription::new("m2")
            .with_apply_to("a")
            .with_operation(MigrationOperationDescription::RenameObject { object: meta("b") });
        let reverted = revert(Some(&previous), &description).unwrap();
        assert_eq!(reverted.apply_to, "b");
        assert_eq!(reverted.operations[0].object().unwrap().name, "a");

        let description = MigrationDescription::new("m3")
            .with_apply_to("a")
            .with_operation(MigrationOperationDescription::DeleteObject { object: meta("a") });
        let reverted = revert(Some(&previous), &description).unwrap();
        assert_eq!(reverted.apply_to, "");
        assert_eq!(reverted.operations[0].kind(), "createObject");
        assert_eq!(reverted.meta_name().unwrap(), "a");
    }

    #[test]
    fn test_revert_update_field_restores_previous() {
        let previous = meta("a").with_field(Field::optional("title", FieldType::String));
        let description = MigrationDescription::new("m2")
            .with_apply_to("a")
            .with_operation(MigrationOperationDescription::update_field(
                Field::new("name", FieldType::String),
                "title",
            ));
        let reverted = revert(Some(&previous), &description).unwrap();
        let field = reverted.operations[0].field().unwrap();
        assert_eq!(field.field.name, "title");
        assert!(field.field.optional);
        assert_eq!(field.previous_name, "name");
    }

    #[test]
    fn test_revert_reverses_order() {
        let previous = meta("a");
        let description = MigrationDescription::new("m2")
            .with_apply_to("a")
            .with_operation(MigrationOperationDescription::add_field(Field::optional("x", FieldType::String)))
            .with_operation(MigrationOperationDescription::AddAction {
                action: MigrationActionDescription::new(Action::new("notify", Method::Create, "REST")),
            });
        let reverted = revert(Some(&previous), &description).unwrap();
        let kinds: Vec<&str> = reverted.operations.iter().map(|o| o.kind()).collect();
        assert_eq!(kinds, vec!["removeAction", "removeField"]);
    }

    #[test]
    fn test_missing_previous_field() {
        let previous = meta("a");
        let description = MigrationDescription::new("m2")
            .with_apply_to("a")
            .with_operation(MigrationOperationDescription::update_field(
                Field::optional("name", FieldType::String),
                "title",
            ));
        let err = revert(Some(&previous), &description).unwrap_err();
        assert!(matches!(err, MigrationError::PreviousStateFieldNotFound { .. }));
    }
}
