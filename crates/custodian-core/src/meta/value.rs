//! String coercion of key values.
//!
//! Keys travel through request paths and filter expressions as text; these
//! helpers convert between that text and the native JSON value of a field.
//! Link fields delegate to the key of their target (or to the reflected
//! field for outer links).

use serde_json::{Number, Value};

use super::error::MetaError;
use super::field::Field;
use super::resolver::Meta;
use super::types::{FieldType, LinkType};

fn invalid(field: &Field, value: impl Into<String>, reason: impl Into<String>) -> MetaError {
    MetaError::InvalidValue {
        field: field.name.clone(),
        value: value.into(),
        reason: reason.into(),
    }
}

fn parse_number(field: &Field, raw: &str) -> Result<Value, MetaError> {
    if let Ok(int) = raw.parse::<i64>() {
        return Ok(Value::Number(int.into()));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| invalid(field, raw, "not a number"))
}

/// The field whose type governs values of `field`, following links.
fn value_field<'g>(owner: &Meta<'g>, field: &'g Field) -> Result<(Meta<'g>, &'g Field), MetaError> {
    if field.is_simple() {
        return Ok((*owner, field));
    }
    match (field.field_type, field.link_type) {
        (FieldType::Object, Some(LinkType::Inner)) => {
            let target = owner.link_meta(field).ok_or_else(|| invalid(field, "", "link target is not resolved"))?;
            let key = target
                .key_field()
                .ok_or_else(|| invalid(field, "", "link target has no key field"))?;
            Ok((target, key))
        }
        (FieldType::Object | FieldType::Array, Some(LinkType::Outer)) => {
            let target = owner.link_meta(field).ok_or_else(|| invalid(field, "", "link target is not resolved"))?;
            let paired = owner
                .outer_link_field(field)
                .ok_or_else(|| invalid(field, "", "reflected field is not resolved"))?;
            value_field(&target, paired)
        }
        _ => Err(invalid(field, "", format!("no key conversion for type '{}'", field.field_type))),
    }
}

/// Convert the textual form of a value into the native value of `field`.
pub fn value_from_string(owner: &Meta<'_>, field: &Field, raw: &str) -> Result<Value, MetaError> {
    match field.field_type {
        FieldType::String | FieldType::Date | FieldType::DateTime | FieldType::Time => {
            Ok(Value::String(raw.to_string()))
        }
        FieldType::Number => parse_number(field, raw),
        FieldType::Bool => raw
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|_| invalid(field, raw, "not a boolean")),
        FieldType::Generic => Ok(Value::String(raw.to_string())),
        FieldType::Object | FieldType::Array | FieldType::Objects => {
            let field = owner
                .find_field(&field.name)
                .ok_or_else(|| invalid(field, raw, "field does not belong to the object"))?;
            let (target, key) = value_field(owner, field)?;
            value_from_string(&target, key, raw)
        }
    }
}

/// Convert a native value of `field` to its textual form.
pub fn value_as_string(owner: &Meta<'_>, field: &Field, value: &Value) -> Result<String, MetaError> {
    match field.field_type {
        FieldType::String | FieldType::Date | FieldType::DateTime | FieldType::Time => value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| invalid(field, value.to_string(), "expected a string")),
        FieldType::Number => match value {
            Value::Number(n) => Ok(n.to_string()),
            Value::String(s) => Ok(s.clone()),
            other => Err(invalid(field, other.to_string(), "expected a number")),
        },
        FieldType::Bool => value
            .as_bool()
            .map(|b| b.to_string())
            .ok_or_else(|| invalid(field, value.to_string(), "expected a boolean")),
        FieldType::Generic => match value {
            Value::Number(n) => Ok(n.to_string()),
            Value::String(s) => Ok(s.clone()),
            other => Err(invalid(field, other.to_string(), "expected a key")),
        },
        FieldType::Object | FieldType::Array | FieldType::Objects => {
            let field = owner
                .find_field(&field.name)
                .ok_or_else(|| invalid(field, value.to_string(), "field does not belong to the object"))?;
            let (target, key) = value_field(owner, field)?;
            value_as_string(&target, key, value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{DefaultValue, MetaDescription, Resolver};
    use std::collections::HashMap;

    fn graph_fixture() -> crate::meta::MetaGraph {
        let person = MetaDescription::new("person", "login")
            .with_field(Field::new("login", FieldType::String))
            .with_field(Field::outer_link("order_set", FieldType::Array, "order", "owner"));
        let order = MetaDescription::new("order", "id")
            .with_field(Field::optional("id", FieldType::Number).with_default(DefaultValue::nextval()))
            .with_field(Field::inner_link("owner", "person"))
            .with_field(Field::new("paid", FieldType::Bool));
        let lookup: HashMap<_, _> = [("person".to_string(), person)].into_iter().collect();
        Resolver::new(&lookup).resolve(order).unwrap()
    }

    #[test]
    fn test_simple_values() {
        let graph = graph_fixture();
        let order = graph.root();
        let id = order.find_field("id").unwrap();
        let paid = order.find_field("paid").unwrap();

        assert_eq!(value_from_string(&order, id, "42").unwrap(), Value::from(42));
        assert_eq!(value_from_string(&order, id, "4.5").unwrap(), Value::from(4.5));
        assert!(value_from_string(&order, id, "four").is_err());
        assert_eq!(value_from_string(&order, paid, "true").unwrap(), Value::Bool(true));
        assert_eq!(value_as_string(&order, id, &Value::from(7)).unwrap(), "7");
        assert!(value_as_string(&order, paid, &Value::from("yes")).is_err());
    }

    #[test]
    fn test_link_values_follow_target_key() {
        let graph = graph_fixture();
        let order = graph.root();
        let owner = order.find_field("owner").unwrap();

        // person is keyed by a string login
        assert_eq!(
            value_from_string(&order, owner, "007").unwrap(),
            Value::String("007".to_string())
        );
        assert_eq!(
            value_as_string(&order, owner, &Value::from("bond")).unwrap(),
            "bond"
        );
    }
    #[test]
    fn test_outer_link_values_follow_reflected_field() {
        let order = MetaDescription::new("order", "id")
            .with_field(Field::optional("id", FieldType::Number).with_default(DefaultValue::nextval()))
            .with_field(Field::new("owner_login", FieldType::String));
        let person = MetaDescription::new("person", "login")
            .with_field(Field::new("login", FieldType::String))
            .with_field(Field::outer_link("orders", FieldType::Array, "order", "owner_login"));
        let lookup: HashMap<_, _> = [("order".to_string(), order)].into_iter().collect();
        let graph = Resolver::new(&lookup).resolve(person).unwrap();
        let person = graph.root();
        let orders = person.find_field("orders").unwrap();

        // owner_login is a string even though order is keyed by number
        assert_eq!(
            value_from_string(&person, orders, "007").unwrap(),
            Value::String("007".to_string())
        );
        assert!(value_as_string(&person, orders, &Value::from(7)).is_err());

        // reflecting an inner link ends at the key of the linking side
        let graph = graph_fixture();
        let order = graph.root();
        let owner = order.find_field("owner").unwrap();
        let people = order.link_meta(owner).unwrap();
        let order_set = people.find_field("order_set").unwrap();
        assert_eq!(
            value_from_string(&people, order_set, "007").unwrap(),
            Value::String("007".to_string())
        );
    }
}
