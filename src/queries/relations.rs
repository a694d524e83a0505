// Relation field resolution for records returned by the engines

use serde_json::{json, Value};

use crate::arguments::WhereArgument;
use crate::error::{OrbisError, OrbisResult};
use crate::metadata::{Record, RelationLink};
use crate::session::Session;

use super::{EntityList, FindManyArgs, FindOneArgs, OperationOptions};

impl<'o> Session<'o> {
    /// Resolve a to-many relation field of `parent`.
    ///
    /// Plain requests on an unscoped target reuse the values already loaded on
    /// the parent. Anything else runs a scoped `find_many` on the target,
    /// restricted to rows linked back to the parent through the inverse side.
    pub async fn resolve_relation_list(
        &self,
        type_name: &str,
        field_name: &str,
        parent: &Record,
        args: &FindManyArgs,
        options: &OperationOptions,
    ) -> OrbisResult<EntityList> {
        let metadata = self.metadata();
        let relation = metadata.resolve_relation(type_name, field_name)?;
        if !relation.is_to_many() {
            return Err(OrbisError::InvalidRelation(format!(
                "{}.{} is not a to-many relation",
                type_name, field_name
            )));
        }

        let scoped = relation.target.scope.is_some() && options.viewer().is_some();
        if args.is_plain() && !scoped {
            if let Some(Value::Array(values)) = parent.get(field_name) {
                let values: Vec<Record> = values.iter().filter_map(|v| v.as_object().cloned()).collect();
                return Ok(EntityList::new(values.len() as u64, values));
            }
        }

        let inverse = relation.inverse().ok_or_else(|| {
            OrbisError::InvalidRelation(format!(
                "{}.{} needs an inverse side to be filtered",
                type_name, field_name
            ))
        })?;
        let parent_id = parent_identifier(metadata, type_name, parent)?;
        let owner_pk = &relation.owner.primary_key;

        let mut linked = WhereArgument::new();
        linked.insert(inverse.to_string(), Value::Object(equals_filter(owner_pk, parent_id)));

        let mut args = args.clone();
        args.filter = Some(match args.filter.take().filter(|f| !f.is_empty()) {
            Some(filter) => {
                let mut conjunction = WhereArgument::new();
                conjunction.insert(
                    "AND".to_string(),
                    Value::Array(vec![Value::Object(linked), Value::Object(filter)]),
                );
                conjunction
            }
            None => linked,
        });

        self.find_many(&relation.target.type_name, &args, options).await
    }

    /// Resolve a to-one relation field of `parent`, loading it when it wasn't joined.
    pub async fn resolve_relation_one(
        &self,
        type_name: &str,
        field_name: &str,
        parent: &Record,
        options: &OperationOptions,
    ) -> OrbisResult<Option<Record>> {
        let metadata = self.metadata();
        let relation = metadata.resolve_relation(type_name, field_name)?;
        if relation.is_to_many() {
            return Err(OrbisError::InvalidRelation(format!(
                "{}.{} is not a to-one relation",
                type_name, field_name
            )));
        }

        match parent.get(field_name) {
            Some(Value::Object(loaded)) => return Ok(Some(loaded.clone())),
            Some(Value::Null) => return Ok(None),
            _ => {}
        }

        let target = relation.target;
        let options = OperationOptions {
            not_found_error: false,
            ..options.clone()
        };

        match &relation.link {
            RelationLink::OwnerColumn(column) => {
                let id = parent.get(column).cloned().unwrap_or(Value::Null);
                if id.is_null() {
                    return Ok(None);
                }
                let mut filter = WhereArgument::new();
                filter.insert(target.primary_key.clone(), id);
                self.find_one(&target.type_name, &FindOneArgs::new(filter), &options)
                    .await
            }
            _ => {
                let inverse = relation.inverse().ok_or_else(|| {
                    OrbisError::InvalidRelation(format!(
                        "{}.{} needs an inverse side to be loaded",
                        type_name, field_name
                    ))
                })?;
                let parent_id = parent_identifier(metadata, type_name, parent)?;
                let mut filter = WhereArgument::new();
                filter.insert(
                    inverse.to_string(),
                    Value::Object(equals_filter(&relation.owner.primary_key, parent_id)),
                );
                self.find_first(
                    &target.type_name,
                    &FindManyArgs::new().filter(filter),
                    &options,
                )
                .await
            }
        }
    }
}

/// `{field: {equals: value}}`
fn equals_filter(field: &str, value: Value) -> WhereArgument {
    let mut filter = WhereArgument::new();
    filter.insert(field.to_string(), json!({ "equals": value }));
    filter
}

fn parent_identifier(
    metadata: &crate::metadata::OrbisMetadata,
    type_name: &str,
    parent: &Record,
) -> OrbisResult<Value> {
    let entity = metadata.get_entity(type_name)?;
    parent
        .get(&entity.primary_key)
        .filter(|v| !v.is_null())
        .cloned()
        .ok_or_else(|| {
            OrbisError::BadRequest(format!(
                "{} record is missing its {}",
                type_name, entity.primary_key
            ))
        })
}
