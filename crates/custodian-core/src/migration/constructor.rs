//! Migration construction from a current and a desired description.

use tracing::debug;

use super::description::{
    generate_migration_id, MigrationActionDescription, MigrationDescription, MigrationFieldDescription,
    MigrationMetaDescription, MigrationOperationDescription,
};
use super::error::MigrationError;
use crate::meta::{Field, MetaDescription};

/// Whether two fields describe the same thing, ignoring the order of
/// generic link targets.
fn same_field(current: &Field, desired: &Field) -> bool {
    if !current.same_link_meta_list(desired) {
        return false;
    }
    let mut current = current.clone();
    current.normalize();
    let mut desired = desired.clone();
    desired.link_meta_list = current.link_meta_list.clone();
    current == desired
}

/// Build the migration taking `current` to `desired`.
///
/// `None` on either side means the type does not exist there. Object level
/// changes come first (create, rename, delete), then field additions,
/// removals and updates, then the same for actions. A field or action is
/// matched to the current one named by its `previousName`, or else to the
/// one with its own name.
pub fn construct(
    current: Option<&MetaDescription>,
    desired: Option<&MigrationMetaDescription>,
    depends_on: Vec<String>,
) -> Result<MigrationDescription, MigrationError> {
    use MigrationOperationDescription as Op;

    let mut description = MigrationDescription::new(generate_migration_id())
        .with_apply_to(current.map(|m| m.name.clone()).unwrap_or_default())
        .with_depends_on(depends_on);

    let (current, desired) = match (current, desired) {
        (None, None) => return Err(MigrationError::NoChangesDetected),
        (None, Some(desired)) => {
            description = description.with_operation(Op::create_object(desired.to_meta().normalized()));
            return Ok(description);
        }
        (Some(current), None) => {
            description = description.with_operation(Op::DeleteObject {
                object: current.clone(),
            });
            return Ok(description);
        }
        (Some(current), Some(desired)) => (current, desired),
    };

    if current.name != desired.name {
        description = description.with_operation(Op::RenameObject {
            object: desired.to_meta().normalized(),
        });
    }

    let desired_fields: Vec<MigrationFieldDescription> = desired
        .fields
        .iter()
        .map(|f| {
            let mut f = f.clone();
            f.field.normalize();
            f
        })
        .collect();
    let matched = |f: &MigrationFieldDescription| {
        current
            .find_field(f.lookup_name())
            .or_else(|| current.find_field(&f.field.name))
    };

    for field in desired_fields.iter().filter(|f| matched(f).is_none()) {
        description = description.with_operation(Op::add_field(field.field.clone()));
    }
    for field in &current.fields {
        let kept = desired_fields
            .iter()
            .any(|f| matched(f).is_some_and(|m| m.name == field.name));
        if !kept {
            description = description.with_operation(Op::remove_field(field.clone()));
        }
    }
    for field in &desired_fields {
        if let Some(existing) = matched(field) {
            if !same_field(existing, &field.field) {
                description = description.with_operation(Op::update_field(field.field.clone(), existing.name.clone()));
            }
        }
    }

    let matched = |a: &MigrationActionDescription| {
        current
            .find_action(a.lookup_name())
            .or_else(|| current.find_action(&a.action.name))
    };
    for action in desired.actions.iter().filter(|a| matched(a).is_none()) {
        description = description.with_operation(Op::AddAction {
            action: MigrationActionDescription::new(action.action.clone()),
        });
    }
    for action in &current.actions {
        let kept = desired
            .actions
            .iter()
            .any(|a| matched(a).is_some_and(|m| m.name == action.name));
        if !kept {
            description = description.with_operation(Op::RemoveAction {
                action: MigrationActionDescription::new(action.clone()),
            });
        }
    }
    for action in &desired.actions {
        if let Some(existing) = matched(action) {
            if *existing != action.action {
                description = description.with_operation(Op::UpdateAction {
                    action: MigrationActionDescription::renamed(action.action.clone(), existing.name.clone()),
                });
            }
        }
    }

    if description.operations.is_empty() {
        return Err(MigrationError::NoChangesDetected);
    }
    debug!(
        migration_id = %description.id,
        operations = description.operations.len(),
        "migration constructed"
    );
    Ok(description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{Action, DefaultValue, FieldType, Method};
    use crate::migration::description::MIGRATION_ID_LENGTH;

    fn meta(name: &str) -> MetaDescription {
        MetaDescription::new(name, "id")
            .with_field(Field::optional("id", FieldType::Number).with_default(DefaultValue::nextval()))
    }

    fn kinds(description: &MigrationDescription) -> Vec<&'static str> {
        description.operations.iter().map(|o| o.kind()).collect()
    }

    #[test]
    fn test_create() {
        let desired = MigrationMetaDescription::from_meta(&meta("a"));
        let description = construct(None, Some(&desired), Vec::new()).unwrap();
        assert_eq!(kinds(&description), vec!["createObject"]);
        assert_eq!(description.apply_to, "");
        assert_eq!(description.id.len(), MIGRATION_ID_LENGTH);
    }

    #[test]
    fn test_delete() {
        let current = meta("a");
        let description = construct(Some(&current), None, vec!["m1".to_string()]).unwrap();
        assert_eq!(kinds(&description), vec!["deleteObject"]);
        assert_eq!(description.apply_to, "a");
        assert_eq!(description.depends_on, vec!["m1"]);
    }

    #[test]
    fn test_no_changes() {
        let current = meta("a").with_field(Field::generic_link("target", ["b", "c"]));
        let mut desired = MigrationMetaDescription::from_meta(&current);
        desired.fields[1].field.link_meta_list = vec!["c".to_string(), "b".to_string()];
        let err = construct(Some(&current), Some(&desired), Vec::new()).unwrap_err();
        assert!(matches!(err, MigrationError::NoChangesDetected));
    }

    #[test]
    fn test_field_changes_in_order() {
        let current = meta("a")
            .with_field(Field::optional("old", FieldType::String))
            .with_field(Field::optional("title", FieldType::String))
            .with_field(Field::optional("count", FieldType::Number));
        let mut desired = MigrationMetaDescription::from_meta(&meta("a"));
        desired
            .fields
            .push(MigrationFieldDescription::renamed(Field::optional("name", FieldType::String), "title"));
        desired.fields.push(MigrationFieldDescription::new(
            Field::optional("count", FieldType::Number).with_default(DefaultValue::constant(10)),
        ));
        desired
            .fields
            .push(MigrationFieldDescription::new(Field::optional("added", FieldType::Bool)));

        let description = construct(Some(&current), Some(&desired), Vec::new()).unwrap();
        assert_eq!(kinds(&description), vec!["addField", "removeField", "updateField", "updateField"]);
        assert_eq!(description.operations[1].field().unwrap().field.name, "old");
        let rename = description.operations[2].field().unwrap();
        assert_eq!(rename.field.name, "name");
        assert_eq!(rename.previous_name, "title");
    }

    #[test]
    fn test_rename_object() {
        let current = meta("a");
        let desired = MigrationMetaDescription::from_meta(&meta("b"));
        let description = construct(Some(&current), Some(&desired), Vec::new()).unwrap();
        assert_eq!(kinds(&description), vec!["renameObject"]);
        assert_eq!(description.operations[0].object().unwrap().name, "b");
    }

    #[test]
    fn test_action_changes() {
        let current = meta("a").with_action(Action::new("notify", Method::Create, "REST"));
        let mut desired = MigrationMetaDescription::from_meta(&meta("a"));
        desired.actions.push(MigrationActionDescription::renamed(
            Action::new("announce", Method::Create, "REST"),
            "notify",
        ));
        let description = construct(Some(&current), Some(&desired), Vec::new()).unwrap();
        assert_eq!(kinds(&description), vec!["updateAction"]);
    }

    #[test]
    fn test_stale_previous_name_matches_by_name() {
        let current = meta("a")
            .with_field(Field::optional("x", FieldType::String))
            .with_action(Action::new("notify", Method::Create, "REST"));
        let mut desired = MigrationMetaDescription::from_meta(&current);
        desired.fields[1] = MigrationFieldDescription::renamed(Field::optional("x", FieldType::String), "y");
        desired.actions[0] =
            MigrationActionDescription::renamed(Action::new("notify", Method::Create, "REST"), "gone");

        let err = construct(Some(&current), Some(&desired), Vec::new()).unwrap_err();
        assert!(matches!(err, MigrationError::NoChangesDetected));

        desired.fields[1] = MigrationFieldDescription::renamed(Field::new("x", FieldType::String), "y");
        let description = construct(Some(&current), Some(&desired), Vec::new()).unwrap();
        assert_eq!(kinds(&description), vec!["updateField"]);
        assert_eq!(description.operations[0].field().unwrap().previous_name, "x");
    }

    #[test]
    fn test_previous_name_wins_over_own_name() {
        let current = meta("a")
            .with_field(Field::optional("x", FieldType::String))
            .with_field(Field::optional("y", FieldType::String));
        let mut desired = MigrationMetaDescription::from_meta(&meta("a"));
        desired
            .fields
            .push(MigrationFieldDescription::renamed(Field::optional("x", FieldType::String), "y"));

        let description = construct(Some(&current), Some(&desired), Vec::new()).unwrap();
        assert_eq!(kinds(&description), vec!["removeField", "updateField"]);
        assert_eq!(description.operations[0].field().unwrap().field.name, "x");
        assert_eq!(description.operations[1].field().unwrap().previous_name, "y");
    }
}
