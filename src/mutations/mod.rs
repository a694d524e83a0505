// Mutation engine - transactional create, update and delete with nested relation writes

mod relations;

pub use relations::RelationWrite;

use chrono::Utc;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::arguments::{DataArgument, UniqueWhereArgument};
use crate::error::{OrbisError, OrbisResult};
use crate::metadata::{
    ColumnKind, ColumnMapping, DateMode, EntityDescriptor, Generation, Record, RelationLink,
};
use crate::queries::{EntityList, FindManyArgs, FindOneArgs, OperationOptions};
use crate::query::{column_equals, column_in, DeleteQuery, InsertQuery, Predicate, UpdateQuery};
use crate::session::Session;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateOneArgs {
    pub data: DataArgument,
    #[serde(default)]
    pub relations: Vec<String>,
}

impl CreateOneArgs {
    pub fn new(data: DataArgument) -> Self {
        Self {
            data,
            relations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateOneArgs {
    #[serde(rename = "where")]
    pub filter: UniqueWhereArgument,
    pub data: DataArgument,
    #[serde(default)]
    pub relations: Vec<String>,
}

impl UpdateOneArgs {
    pub fn new(filter: UniqueWhereArgument, data: DataArgument) -> Self {
        Self {
            filter,
            data,
            relations: Vec::new(),
        }
    }
}

impl<'o> Session<'o> {
    /// Insert an entity with its nested relation writes and return it re-fetched.
    pub async fn create_one(
        &self,
        type_name: &str,
        args: &CreateOneArgs,
        options: &OperationOptions,
    ) -> OrbisResult<Option<Record>> {
        let id = self
            .transaction(false, || self.create_entity(type_name, args.data.clone(), options))
            .await?;
        info!(entity = %type_name, id = %id, "created");
        self.refetch(type_name, id, &args.relations, options).await
    }

    pub async fn update_one(
        &self,
        type_name: &str,
        args: &UpdateOneArgs,
        options: &OperationOptions,
    ) -> OrbisResult<Option<Record>> {
        let id = self
            .transaction(false, || async {
                let existing = self
                    .find_existing(type_name, FindOneArgs::new(args.filter.clone()), options)
                    .await?;
                self.update_entity(type_name, existing, &args.data, options).await
            })
            .await?;
        info!(entity = %type_name, id = %id, "updated");
        self.refetch(type_name, id, &args.relations, options).await
    }

    /// Delete one entity, returning it as it was before the delete.
    pub async fn delete_one(
        &self,
        type_name: &str,
        args: &FindOneArgs,
        options: &OperationOptions,
    ) -> OrbisResult<Record> {
        let metadata = self.metadata();
        let entity = metadata.get_entity(type_name)?;
        let pk_column = metadata.primary_column(entity)?;

        let record = self
            .transaction(false, || async {
                let record = self.find_existing(type_name, args.clone(), options).await?;
                let id = record.get(&entity.primary_key).cloned().unwrap_or(Value::Null);
                self.remove_rows(entity, column_equals(&entity.table, &pk_column, id))
                    .await?;
                Ok(record)
            })
            .await?;
        info!(entity = %type_name, "deleted one");
        Ok(record)
    }

    /// Delete every entity matched by `args`, returning the matched list.
    pub async fn delete_many(
        &self,
        type_name: &str,
        args: &FindManyArgs,
        options: &OperationOptions,
    ) -> OrbisResult<EntityList> {
        let metadata = self.metadata();
        let entity = metadata.get_entity(type_name)?;
        let pk_column = metadata.primary_column(entity)?;

        let list = self
            .transaction(false, || async {
                let list = self.find_many(type_name, args, options).await?;
                let ids: Vec<Value> = list
                    .values
                    .iter()
                    .filter_map(|record| record.get(&entity.primary_key).cloned())
                    .collect();
                if !ids.is_empty() {
                    self.remove_rows(entity, column_in(&entity.table, &pk_column, ids))
                        .await?;
                }
                Ok(list)
            })
            .await?;
        info!(entity = %type_name, count = list.values.len(), "deleted many");
        Ok(list)
    }

    /// Delete the matched rows, or stamp their delete date when the entity has one.
    async fn remove_rows(&self, entity: &EntityDescriptor, matched: Predicate) -> OrbisResult<u64> {
        let statement = match self.metadata().delete_date_column(entity) {
            Some(column) => UpdateQuery::new(&entity.table)
                .set(&column, Value::String(Utc::now().to_rfc3339()))
                .and_where(matched)
                .to_statement(),
            None => DeleteQuery::new(&entity.table).and_where(matched).to_statement(),
        };
        let affected = self.execute(statement).await?;
        debug!(entity = %entity.type_name, affected, "removed rows");
        Ok(affected)
    }

    /// Insert one row and run its relation writes, returning the new identifier.
    ///
    /// Owning to-one writes are resolved first so their foreign key lands in
    /// the insert. Every other relation write waits for the new identifier.
    pub(crate) fn create_entity<'a>(
        &'a self,
        type_name: &'a str,
        data: DataArgument,
        options: &'a OperationOptions,
    ) -> BoxFuture<'a, OrbisResult<Value>> {
        Box::pin(async move {
            let metadata = self.metadata();
            let entity = metadata.get_entity(type_name)?;
            let mut values = Record::new();
            let mut deferred: Vec<(String, Vec<Value>)> = Vec::new();

            for (field_name, value) in data {
                let field = metadata.get_field(type_name, &field_name)?;
                if field.is_relation() {
                    let relation = metadata.resolve_relation(type_name, &field_name)?;
                    if relation.is_to_many() {
                        match value {
                            Value::Array(writes) => deferred.push((field_name, writes)),
                            Value::Null => {}
                            _ => {
                                return Err(OrbisError::InvalidRelationWrite(format!(
                                    "{}.{} takes a list of relation writes",
                                    type_name, field_name
                                )))
                            }
                        }
                    } else if let RelationLink::OwnerColumn(column) = &relation.link {
                        let id = if value.is_null() {
                            Value::Null
                        } else {
                            self.update_relation(type_name, &field_name, &value, false, None, options)
                                .await?
                        };
                        values.insert(column.clone(), id);
                    } else if !value.is_null() {
                        deferred.push((field_name, vec![value]));
                    }
                } else if field.is_column() {
                    values.insert(field_name, value);
                } else {
                    return Err(OrbisError::BadRequest(format!(
                        "{}.{} is not stored",
                        type_name, field_name
                    )));
                }
            }

            let mut defaults = self.orbis().options().entity.create.clone();
            defaults.extend(entity.create.clone());
            for (field_name, default) in &defaults {
                if metadata.has_field(type_name, field_name) && !values.contains_key(field_name) {
                    let value = default.evaluate(&values);
                    values.insert(field_name.clone(), value);
                }
            }

            let now = Utc::now().to_rfc3339();
            for field in metadata.fields(type_name) {
                let Some(column) = &field.column else { continue };
                if values.contains_key(&field.name) {
                    continue;
                }
                let value = match (column.generated, column.date_mode) {
                    (Some(Generation::Uuid), _) => Value::String(Uuid::new_v4().to_string()),
                    (_, Some(DateMode::CreateDate | DateMode::UpdateDate)) => Value::String(now.clone()),
                    _ => match &column.default {
                        Some(default) => default.clone(),
                        None => continue,
                    },
                };
                values.insert(field.name.clone(), value);
            }

            if let Some(schema) = metadata.get_schema(type_name) {
                schema.validate(&values)?;
            }

            let pk_column = metadata.primary_column(entity)?;
            let mut insert = InsertQuery::new(&entity.table).returning(&pk_column);
            for (column, value) in column_values(&metadata.column_mappings(type_name)?, &values)? {
                insert = insert.value(&column, value);
            }
            let rows = self.fetch_all(insert.to_statement()).await?;
            let id = rows
                .first()
                .and_then(|row| row.get(&pk_column))
                .filter(|id| !id.is_null())
                .cloned()
                .ok_or_else(|| {
                    OrbisError::Internal(format!("insert into {} returned no identifier", entity.table))
                })?;
            debug!(entity = %type_name, id = %id, deferred = deferred.len(), "inserted");

            for (field_name, writes) in deferred {
                for write in writes {
                    self.update_relation(type_name, &field_name, &write, false, Some(&id), options)
                        .await?;
                }
            }
            Ok(id)
        })
    }

    /// Apply `data` to an existing record: relation writes immediately, plain values in one update.
    async fn update_entity(
        &self,
        type_name: &str,
        mut existing: Record,
        data: &DataArgument,
        options: &OperationOptions,
    ) -> OrbisResult<Value> {
        let metadata = self.metadata();
        let entity = metadata.get_entity(type_name)?;
        let id = existing.get(&entity.primary_key).cloned().unwrap_or(Value::Null);
        let mut values = Record::new();

        for (field_name, value) in data {
            let field = metadata.get_field(type_name, field_name)?;
            if field.is_relation() {
                let relation = metadata.resolve_relation(type_name, field_name)?;
                match (relation.is_to_many(), value) {
                    (true, Value::Array(writes)) => {
                        for write in writes {
                            self.update_relation(type_name, field_name, write, true, Some(&id), options)
                                .await?;
                        }
                    }
                    (false, Value::Object(_)) => {
                        self.update_relation(type_name, field_name, value, true, Some(&id), options)
                            .await?;
                    }
                    (to_many, _) => {
                        return Err(OrbisError::InvalidRelationWrite(format!(
                            "{}.{} takes {}",
                            type_name,
                            field_name,
                            if to_many {
                                "a list of relation writes"
                            } else {
                                "a single relation write"
                            }
                        )))
                    }
                }
            } else if field.is_column() {
                values.insert(field_name.clone(), value.clone());
                existing.insert(field_name.clone(), value.clone());
            } else {
                return Err(OrbisError::BadRequest(format!(
                    "{}.{} is not stored",
                    type_name, field_name
                )));
            }
        }

        let now = Utc::now().to_rfc3339();
        for field in metadata.fields(type_name) {
            let touched = field
                .column
                .as_ref()
                .map_or(false, |c| c.date_mode == Some(DateMode::UpdateDate));
            if touched && !values.is_empty() && !values.contains_key(&field.name) {
                values.insert(field.name.clone(), Value::String(now.clone()));
                existing.insert(field.name.clone(), Value::String(now.clone()));
            }
        }

        // Relation-only updates still check the merged record.
        if let Some(schema) = metadata.get_schema(type_name) {
            schema.validate(&existing)?;
        }
        if values.is_empty() {
            return Ok(id);
        }

        let pk_column = metadata.primary_column(entity)?;
        let mut update = UpdateQuery::new(&entity.table);
        for (column, value) in column_values(&metadata.column_mappings(type_name)?, &values)? {
            update = update.set(&column, value);
        }
        let statement = update
            .and_where(column_equals(&entity.table, &pk_column, id.clone()))
            .to_statement();
        let affected = self.execute(statement).await?;
        debug!(entity = %type_name, id = %id, affected, "updated row");
        Ok(id)
    }

    /// Unique lookup that fails with `NotFound` on a miss, honouring the caller's scope.
    async fn find_existing(
        &self,
        type_name: &str,
        args: FindOneArgs,
        options: &OperationOptions,
    ) -> OrbisResult<Record> {
        let lookup = OperationOptions {
            context: options.context.clone(),
            not_found_error: true,
        };
        let entity = self.metadata().get_entity(type_name)?;
        self.find_one(type_name, &args, &lookup)
            .await?
            .ok_or_else(|| OrbisError::NotFound(entity.not_found_key()))
    }

    async fn refetch(
        &self,
        type_name: &str,
        id: Value,
        relations: &[String],
        options: &OperationOptions,
    ) -> OrbisResult<Option<Record>> {
        let entity = self.metadata().get_entity(type_name)?;
        let mut filter = UniqueWhereArgument::new();
        filter.insert(entity.primary_key.clone(), id);
        let args = FindOneArgs {
            filter,
            relations: relations.to_vec(),
        };
        let options = OperationOptions {
            context: options.context.clone(),
            not_found_error: false,
        };
        self.find_one(type_name, &args, &options).await
    }
}

/// Column/value pairs for the keys present in `values`, embedded objects flattened.
fn column_values(mappings: &[ColumnMapping], values: &Record) -> OrbisResult<Vec<(String, Value)>> {
    let mut columns = Vec::new();
    for mapping in mappings {
        let Some(first) = mapping.path.first() else { continue };
        let Some(mut value) = values.get(first) else { continue };

        for segment in &mapping.path[1..] {
            value = match value {
                Value::Object(nested) => nested.get(segment).unwrap_or(&Value::Null),
                _ => &Value::Null,
            };
        }

        let value = match (mapping.kind, value) {
            (_, Value::Null) => Value::Null,
            (ColumnKind::Json, value) => Value::String(serde_json::to_string(value).map_err(|e| {
                OrbisError::BadRequest(format!("{} cannot be stored: {}", mapping.column, e))
            })?),
            (_, Value::Object(_) | Value::Array(_)) => {
                return Err(OrbisError::BadRequest(format!(
                    "{} takes a scalar value",
                    mapping.path.join(".")
                )))
            }
            (_, value) => value.clone(),
        };
        columns.push((mapping.column.clone(), value));
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use serde_json::json;

    #[test]
    fn test_column_values_flatten_embedded() {
        let metadata = fixtures::metadata();
        let mappings = metadata.column_mappings("User").unwrap();
        let values = json!({
            "id": "u1", "name": "Ada", "address": {"city": "Ghent"}, "tags": ["a", "b"]
        });
        let columns = column_values(&mappings, values.as_object().unwrap()).unwrap();

        assert!(columns.contains(&("addressCity".to_string(), json!("Ghent"))));
        assert!(columns.contains(&("addressZip".to_string(), Value::Null)));
        assert!(columns.contains(&("tags".to_string(), json!("[\"a\",\"b\"]"))));
        assert!(!columns.iter().any(|(c, _)| c == "age"));
    }

    #[test]
    fn test_column_values_null_embedded() {
        let metadata = fixtures::metadata();
        let mappings = metadata.column_mappings("User").unwrap();
        let values = json!({"address": null});
        let columns = column_values(&mappings, values.as_object().unwrap()).unwrap();
        assert_eq!(
            columns,
            vec![
                ("addressCity".to_string(), Value::Null),
                ("addressZip".to_string(), Value::Null)
            ]
        );
    }

    #[test]
    fn test_column_values_reject_objects_in_scalars() {
        let metadata = fixtures::metadata();
        let mappings = metadata.column_mappings("User").unwrap();
        let values = json!({"name": {"first": "Ada"}});
        assert!(matches!(
            column_values(&mappings, values.as_object().unwrap()),
            Err(OrbisError::BadRequest(_))
        ));
    }

    #[test]
    fn test_args_deserialize() {
        let args: UpdateOneArgs = serde_json::from_value(json!({
            "where": {"id": "u1"}, "data": {"name": "Ada"}
        }))
        .unwrap();
        assert_eq!(args.filter["id"], json!("u1"));
        assert!(args.relations.is_empty());
    }
}
