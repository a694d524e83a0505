// Relation writes - nested create, connect and disconnect against one relation field

use serde_json::{Map, Value};
use tracing::debug;

use crate::arguments::{DataArgument, UniqueWhereArgument};
use crate::error::{OrbisError, OrbisResult};
use crate::metadata::{RelationLink, ResolvedRelation};
use crate::queries::{FindOneArgs, OperationOptions};
use crate::query::{column_equals, DeleteQuery, InsertQuery, UpdateQuery};
use crate::session::Session;

/// A single-key relation payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationWrite {
    Create(DataArgument),
    Connect(UniqueWhereArgument),
    Disconnect(UniqueWhereArgument),
}

impl RelationWrite {
    /// Exactly one of `create`, `connect` or `disconnect`; the latter only when updating.
    pub fn parse(value: &Value, is_update: bool) -> OrbisResult<Self> {
        let expected = if is_update {
            "exactly one of create, connect or disconnect"
        } else {
            "exactly one of create or connect"
        };

        let object = value
            .as_object()
            .filter(|o| o.len() == 1)
            .ok_or_else(|| OrbisError::InvalidRelationWrite(format!("expected {}", expected)))?;
        let (key, payload) = object
            .iter()
            .next()
            .ok_or_else(|| OrbisError::InvalidRelationWrite(format!("expected {}", expected)))?;
        let payload = payload.as_object().cloned().ok_or_else(|| {
            OrbisError::InvalidRelationWrite(format!("{} takes an object", key))
        })?;

        match key.as_str() {
            "create" => Ok(RelationWrite::Create(payload)),
            "connect" => Ok(RelationWrite::Connect(payload)),
            "disconnect" if is_update => Ok(RelationWrite::Disconnect(payload)),
            _ => Err(OrbisError::InvalidRelationWrite(format!(
                "expected {}, got {}",
                expected, key
            ))),
        }
    }
}

impl<'o> Session<'o> {
    /// Apply one relation write of `type_name.field_name` and return the related identifier.
    ///
    /// Without `owner_id` nothing is linked: the caller stores the returned
    /// identifier itself, which is how owning to-one writes land in the
    /// owner's insert.
    pub async fn update_relation(
        &self,
        type_name: &str,
        field_name: &str,
        write: &Value,
        is_update: bool,
        owner_id: Option<&Value>,
        options: &OperationOptions,
    ) -> OrbisResult<Value> {
        let write = RelationWrite::parse(write, is_update)?;
        let metadata = self.metadata();
        let relation = metadata.resolve_relation(type_name, field_name)?;
        let target = relation.target;

        match write {
            RelationWrite::Create(mut data) => {
                let mut linked = false;
                if let (RelationLink::TargetColumn(_), Some(owner_id), Some(inverse)) =
                    (&relation.link, owner_id, relation.inverse())
                {
                    if !relation.is_to_many() {
                        self.clear_to_one(&relation, owner_id).await?;
                    }
                    data.insert(
                        inverse.to_string(),
                        connect_payload(&relation.owner.primary_key, owner_id.clone()),
                    );
                    linked = true;
                }

                let target_id = self.create_entity(&target.type_name, data, options).await?;
                if let (Some(owner_id), false) = (owner_id, linked) {
                    self.link(&relation, owner_id, &target_id).await?;
                }
                Ok(target_id)
            }
            RelationWrite::Connect(filter) => {
                let target_id = self.existing_id(&relation, filter, options).await?;
                if let Some(owner_id) = owner_id {
                    self.link(&relation, owner_id, &target_id).await?;
                }
                Ok(target_id)
            }
            RelationWrite::Disconnect(filter) => {
                let owner_id = owner_id.ok_or_else(|| {
                    OrbisError::InvalidRelationWrite("disconnect needs an existing entity".to_string())
                })?;
                let target_id = self.existing_id(&relation, filter, options).await?;
                self.unlink(&relation, owner_id, &target_id).await?;
                Ok(target_id)
            }
        }
    }

    async fn existing_id(
        &self,
        relation: &ResolvedRelation<'_>,
        filter: UniqueWhereArgument,
        options: &OperationOptions,
    ) -> OrbisResult<Value> {
        let lookup = OperationOptions {
            context: options.context.clone(),
            not_found_error: true,
        };
        let target = relation.target;
        let record = self
            .find_one(&target.type_name, &FindOneArgs::new(filter), &lookup)
            .await?
            .ok_or_else(|| OrbisError::NotFound(target.not_found_key()))?;
        Ok(record.get(&target.primary_key).cloned().unwrap_or(Value::Null))
    }

    /// Relation-set for to-one relations, relation-add for to-many.
    async fn link(
        &self,
        relation: &ResolvedRelation<'_>,
        owner_id: &Value,
        target_id: &Value,
    ) -> OrbisResult<()> {
        let metadata = self.metadata();
        let owner_pk = metadata.primary_column(relation.owner)?;
        let target_pk = metadata.primary_column(relation.target)?;

        let statement = match &relation.link {
            RelationLink::OwnerColumn(column) => UpdateQuery::new(&relation.owner.table)
                .set(column, target_id.clone())
                .and_where(column_equals(&relation.owner.table, &owner_pk, owner_id.clone()))
                .to_statement(),
            RelationLink::TargetColumn(column) => {
                if !relation.is_to_many() {
                    self.clear_to_one(relation, owner_id).await?;
                }
                UpdateQuery::new(&relation.target.table)
                    .set(column, owner_id.clone())
                    .and_where(column_equals(&relation.target.table, &target_pk, target_id.clone()))
                    .to_statement()
            }
            RelationLink::JoinTable {
                table,
                owner_column,
                target_column,
            } => InsertQuery::new(table)
                .value(owner_column, owner_id.clone())
                .value(target_column, target_id.clone())
                .ignore_conflicts()
                .to_statement(),
        };

        debug!(relation = %relation.field.name, owner = %owner_id, target = %target_id, "link");
        self.execute(statement).await?;
        Ok(())
    }

    /// Relation-set to null for to-one relations, relation-remove for to-many.
    async fn unlink(
        &self,
        relation: &ResolvedRelation<'_>,
        owner_id: &Value,
        target_id: &Value,
    ) -> OrbisResult<()> {
        let metadata = self.metadata();
        let owner_pk = metadata.primary_column(relation.owner)?;
        let target_pk = metadata.primary_column(relation.target)?;

        let statement = match &relation.link {
            RelationLink::OwnerColumn(column) => UpdateQuery::new(&relation.owner.table)
                .set(column, Value::Null)
                .and_where(column_equals(&relation.owner.table, &owner_pk, owner_id.clone()))
                .and_where(column_equals(&relation.owner.table, column, target_id.clone()))
                .to_statement(),
            RelationLink::TargetColumn(column) => UpdateQuery::new(&relation.target.table)
                .set(column, Value::Null)
                .and_where(column_equals(&relation.target.table, &target_pk, target_id.clone()))
                .and_where(column_equals(&relation.target.table, column, owner_id.clone()))
                .to_statement(),
            RelationLink::JoinTable {
                table,
                owner_column,
                target_column,
            } => DeleteQuery::new(table)
                .and_where(column_equals(table, owner_column, owner_id.clone()))
                .and_where(column_equals(table, target_column, target_id.clone()))
                .to_statement(),
        };

        debug!(relation = %relation.field.name, owner = %owner_id, target = %target_id, "unlink");
        self.execute(statement).await?;
        Ok(())
    }

    /// Detach whatever currently points at the owner through a one-to-one inverse column.
    async fn clear_to_one(&self, relation: &ResolvedRelation<'_>, owner_id: &Value) -> OrbisResult<()> {
        if let RelationLink::TargetColumn(column) = &relation.link {
            let statement = UpdateQuery::new(&relation.target.table)
                .set(column, Value::Null)
                .and_where(column_equals(&relation.target.table, column, owner_id.clone()))
                .to_statement();
            self.execute(statement).await?;
        }
        Ok(())
    }
}

/// `{connect: {<pk>: id}}`
fn connect_payload(primary_key: &str, id: Value) -> Value {
    let mut filter = Map::new();
    filter.insert(primary_key.to_string(), id);
    let mut payload = Map::new();
    payload.insert("connect".to_string(), Value::Object(filter));
    Value::Object(payload)
}
