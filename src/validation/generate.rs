use std::collections::BTreeMap;
use tracing::debug;

use super::{FieldRule, ObjectSchema};
use crate::error::{OrbisError, OrbisResult};
use crate::metadata::{FieldDescriptor, FieldType, OrbisMetadata};

const MAX_NESTING: usize = 8;

/// Build the validation schema of every interface and object and store it in the registry.
///
/// Interfaces come first so objects can start from the schemas of the
/// interfaces they implement. Embedded object fields are nested last, once
/// every base schema exists. Existing schemas are replaced.
pub fn generate_schemas(metadata: &mut OrbisMetadata) -> OrbisResult<()> {
    let mut base: BTreeMap<String, ObjectSchema> = BTreeMap::new();

    for interface in metadata.interfaces() {
        let mut schema = shape(metadata, &interface.name, ObjectSchema::new())?;
        if let Some(extension) = &interface.schema {
            schema = extension(schema);
        }
        base.insert(interface.name.clone(), schema);
    }

    let mut objects = Vec::new();
    for object in metadata.objects() {
        let mut schema = ObjectSchema::new();
        for interface in &object.implements {
            if let Some(inherited) = base.get(interface) {
                schema = schema.concat(inherited);
            }
        }
        schema = shape(metadata, &object.name, schema)?;
        if let Some(extension) = &object.schema {
            schema = extension(schema);
        }
        base.insert(object.name.clone(), schema);
        objects.push(object.name.clone());
    }

    let mut generated: Vec<(String, ObjectSchema)> = base
        .iter()
        .filter(|(name, _)| !objects.contains(name))
        .map(|(name, schema)| (name.clone(), schema.clone()))
        .collect();
    for name in &objects {
        generated.push((name.clone(), with_embedded(metadata, &base, name, 0)));
    }

    debug!(count = generated.len(), "generated validation schemas");
    for (name, schema) in generated {
        metadata.add_schema(&name, schema);
    }
    Ok(())
}

fn shape(metadata: &OrbisMetadata, type_name: &str, mut schema: ObjectSchema) -> OrbisResult<ObjectSchema> {
    for field in metadata.fields(type_name) {
        if field.resolver.is_some() || field.is_relation() {
            continue;
        }

        let field_type = field.resolve_type();
        let rule = match field_type.item() {
            FieldType::Boolean => FieldRule::boolean(),
            FieldType::Number => FieldRule::number(),
            FieldType::String => {
                let rule = FieldRule::string();
                match field.column.as_ref().and_then(|c| c.length) {
                    Some(length) => rule.max_length(length),
                    None => rule,
                }
            }
            FieldType::Date => FieldRule::date(),
            FieldType::Enum(name) => {
                let values = metadata
                    .get_type(name)?
                    .enum_values()
                    .ok_or_else(|| OrbisError::InvalidField(format!("{} is not an enum", name)))?;
                FieldRule::one_of(values.iter().cloned())
            }
            FieldType::Object(_) | FieldType::List(_) => continue,
        };

        let rule = apply_nullability(rule, field, metadata.is_generated_field(type_name, &field.name));
        schema = schema.field(&field.name, wrap_list(rule, field_type, field));
    }
    Ok(schema)
}

fn with_embedded(
    metadata: &OrbisMetadata,
    base: &BTreeMap<String, ObjectSchema>,
    type_name: &str,
    depth: usize,
) -> ObjectSchema {
    let mut schema = base.get(type_name).cloned().unwrap_or_default();
    if depth >= MAX_NESTING {
        return schema;
    }

    for field in metadata.fields(type_name) {
        if field.resolver.is_some() || field.is_relation() {
            continue;
        }
        let field_type = field.resolve_type();
        let Some(name) = field_type.object_name() else {
            continue;
        };
        if !base.contains_key(name) {
            continue;
        }

        let nested = FieldRule::object(with_embedded(metadata, base, name, depth + 1));
        let rule = apply_nullability(nested, field, false);
        schema = schema.field(&field.name, wrap_list(rule, field_type, field));
    }
    schema
}

/// Explicitly nullable and generated fields accept null, everything else is required.
fn apply_nullability(rule: FieldRule, field: &FieldDescriptor, generated: bool) -> FieldRule {
    if field.nullable == Some(true) || generated {
        rule.nullable()
    } else {
        rule.required()
    }
}

fn wrap_list(rule: FieldRule, field_type: &FieldType, field: &FieldDescriptor) -> FieldRule {
    if !field_type.is_list() {
        return rule;
    }
    let list = FieldRule::array(rule.required());
    if field.nullable == Some(true) {
        list.nullable()
    } else {
        list.required()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::metadata::{FieldDefinition, ObjectDefinition};
    use serde_json::json;

    #[test]
    fn test_generated_entity_schema() {
        let mut metadata = fixtures::metadata();
        generate_schemas(&mut metadata).unwrap();

        let user = metadata.get_schema("User").unwrap();
        assert!(user.get("name").unwrap().required);
        assert!(user.get("id").unwrap().nullable);
        assert!(user.get("isActive").unwrap().nullable);
        assert!(user.get("providers").is_none());
        assert!(user.get("address").unwrap().nullable);

        user.validate(json!({"name": "Ada"}).as_object().unwrap()).unwrap();
        let err = user
            .validate(json!({"name": "Ada", "address": {"zip": "9000"}}).as_object().unwrap())
            .unwrap_err();
        assert_eq!(err.violations[0].path, "address.city");

        let provider = metadata.get_schema("Provider").unwrap();
        let err = provider
            .validate(json!({"type": "FACEBOOK", "email": "a@b.c"}).as_object().unwrap())
            .unwrap_err();
        assert_eq!(err.violations[0].path, "type");
    }

    #[test]
    fn test_interfaces_and_extensions() {
        let mut metadata = OrbisMetadata::new();
        metadata
            .register(
                ObjectDefinition::interface("Named")
                    .field(FieldDefinition::new("name", FieldType::String).column().length(3)),
            )
            .unwrap();
        metadata
            .register(
                ObjectDefinition::object("Pet")
                    .implements("Named")
                    .parent("Named")
                    .field(FieldDefinition::new("legs", FieldType::Number).column())
                    .schema(|schema| schema.update("legs", |rule| rule.range(0.0, 4.0))),
            )
            .unwrap();
        generate_schemas(&mut metadata).unwrap();

        let pet = metadata.get_schema("Pet").unwrap();
        let err = pet
            .validate(json!({"name": "Rexie", "legs": 6}).as_object().unwrap())
            .unwrap_err();
        let paths: Vec<&str> = err.violations.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, vec!["legs", "name"]);
        assert!(metadata.has_schema("Named"));
    }
}
