// Query Engine - findOne, findFirst, findMany and relation field resolution
// Lists run in three steps: count, page of primary keys, hydration of the page

mod hydrate;
mod relations;

pub(crate) use hydrate::Projection;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::arguments::{
    compile_order_by, OrderByArgument, UniqueWhereArgument, WhereArgument, WhereCompiler,
};
use crate::error::{OrbisError, OrbisResult};
use crate::metadata::{EntityDescriptor, OrbisMetadata, Record};
use crate::query::{column_in, ColumnRef, Predicate, SelectExpr, SelectItem, SelectQuery};
use crate::session::Session;
use crate::viewer::{current_viewer, ViewerContext};

/// Per-call options shared by queries and mutations.
#[derive(Debug, Clone, Default)]
pub struct OperationOptions {
    /// Caller identity for entity scopes; falls back to the task-local viewer.
    pub context: Option<Arc<ViewerContext>>,
    /// Fail with `NotFound` instead of returning nothing.
    pub not_found_error: bool,
}

impl OperationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, context: Arc<ViewerContext>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn not_found_error(mut self) -> Self {
        self.not_found_error = true;
        self
    }

    pub fn viewer(&self) -> Option<Arc<ViewerContext>> {
        self.context.clone().or_else(current_viewer)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOneArgs {
    #[serde(rename = "where")]
    pub filter: UniqueWhereArgument,
    #[serde(default)]
    pub relations: Vec<String>,
}

impl FindOneArgs {
    pub fn new(filter: UniqueWhereArgument) -> Self {
        Self {
            filter,
            relations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindManyArgs {
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<WhereArgument>,
    #[serde(default)]
    pub order_by: OrderByArgument,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    #[serde(default)]
    pub relations: Vec<String>,
}

impl FindManyArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: WhereArgument) -> Self {
        self.filter = Some(filter);
        self
    }

    /// No filter, ordering or window.
    pub fn is_plain(&self) -> bool {
        self.filter.as_ref().map_or(true, |f| f.is_empty())
            && self.order_by.is_empty()
            && self.skip.is_none()
            && self.take.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListInfo {
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityList {
    pub info: ListInfo,
    pub values: Vec<Record>,
}

impl EntityList {
    pub fn new(count: u64, values: Vec<Record>) -> Self {
        Self {
            info: ListInfo { count },
            values,
        }
    }
}

/// Key used to match primary-key values across queries.
pub(crate) fn key_of(value: &Value) -> String {
    value.to_string()
}

/// Add `relations` paths relative to the entity, accepting the `<singular>.` prefix.
pub(crate) fn normalize_relation_paths(entity: &EntityDescriptor, relations: &[String]) -> Vec<String> {
    let prefix = format!("{}.", entity.singular_name);
    relations
        .iter()
        .filter(|path| **path != entity.singular_name)
        .map(|path| match path.strip_prefix(&prefix) {
            Some(stripped) if !entity.is_relation(&entity.singular_name) => stripped.to_string(),
            _ => path.clone(),
        })
        .collect()
}

/// Hide soft-deleted rows of `alias`.
pub(crate) fn exclude_deleted(
    metadata: &OrbisMetadata,
    query: &mut SelectQuery,
    entity: &EntityDescriptor,
    alias: &str,
) {
    if let Some(column) = metadata.delete_date_column(entity) {
        query.and_where(Predicate::IsNull(ColumnRef::new(alias, &column)));
    }
}

impl<'o> Session<'o> {
    /// AND the caller's scope filters for `entity` into `query`.
    pub(crate) fn apply_scope(
        &self,
        compiler: &mut WhereCompiler<'_>,
        query: &mut SelectQuery,
        entity: &EntityDescriptor,
        alias: &str,
        options: &OperationOptions,
    ) -> OrbisResult<()> {
        let Some(viewer) = options.viewer() else {
            return Ok(());
        };
        for filter in entity.scope_filters(&viewer) {
            let predicate = compiler.compile(query, &entity.type_name, alias, &filter)?;
            query.and_where(predicate);
        }
        Ok(())
    }

    pub async fn find_one(
        &self,
        type_name: &str,
        args: &FindOneArgs,
        options: &OperationOptions,
    ) -> OrbisResult<Option<Record>> {
        let metadata = self.metadata();
        let entity = metadata.get_entity(type_name)?;
        let alias = entity.singular_name.clone();

        let mut query = SelectQuery::new(&entity.table, &alias);
        let mut compiler = WhereCompiler::new(metadata);
        let unique = compiler.compile_unique(type_name, &alias, &args.filter)?;
        query.and_where(unique);
        exclude_deleted(metadata, &mut query, entity, &alias);
        self.apply_scope(&mut compiler, &mut query, entity, &alias, options)?;

        let relations = normalize_relation_paths(entity, &args.relations);
        let projection = Projection::build(metadata, &mut query, type_name, &alias, &relations)?;
        let rows = self.fetch_all(query.to_statement()).await?;
        let record = projection.fold(metadata, rows)?.into_iter().next();

        match record {
            None if options.not_found_error => Err(OrbisError::NotFound(entity.not_found_key())),
            record => Ok(record),
        }
    }

    pub async fn find_first(
        &self,
        type_name: &str,
        args: &FindManyArgs,
        options: &OperationOptions,
    ) -> OrbisResult<Option<Record>> {
        let mut args = args.clone();
        args.take = Some(1);
        let list = self.find_many(type_name, &args, options).await?;
        Ok(list.values.into_iter().next())
    }

    pub async fn find_many(
        &self,
        type_name: &str,
        args: &FindManyArgs,
        options: &OperationOptions,
    ) -> OrbisResult<EntityList> {
        let entity = self.metadata().get_entity(type_name)?;

        let mut filters = Vec::new();
        if let Some(viewer) = options.viewer() {
            filters.extend(entity.scope_filters(&viewer));
        }
        if let Some(filter) = args.filter.as_ref().filter(|f| !f.is_empty()) {
            filters.push(filter.clone());
        }

        let mut args = args.clone();
        args.filter = match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => {
                let mut conjunction = WhereArgument::new();
                conjunction.insert(
                    "AND".to_string(),
                    Value::Array(filters.into_iter().map(Value::Object).collect()),
                );
                Some(conjunction)
            }
        };
        self.resolve_list(type_name, &args).await
    }

    /// List without scopes: the arguments are taken as final.
    pub async fn resolve_list(&self, type_name: &str, args: &FindManyArgs) -> OrbisResult<EntityList> {
        let metadata = self.metadata();
        let entity = metadata.get_entity(type_name)?;
        let alias = entity.singular_name.clone();
        let pk = ColumnRef::new(&alias, &metadata.primary_column(entity)?);

        let mut query = SelectQuery::new(&entity.table, &alias);
        exclude_deleted(metadata, &mut query, entity, &alias);
        if let Some(filter) = &args.filter {
            let predicate = WhereCompiler::new(metadata).compile(&mut query, type_name, &alias, filter)?;
            query.and_where(predicate);
        }

        let windowed = args.skip.is_some() || args.take.is_some();
        let count = if windowed {
            let mut count_query = query.clone();
            count_query.select.push(SelectItem {
                expr: SelectExpr::CountDistinct(pk.clone()),
                label: "count".to_string(),
            });
            let rows = self.fetch_all(count_query.to_statement()).await?;
            Some(
                rows.first()
                    .and_then(|row| row.get("count"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
            )
        } else {
            None
        };

        // Joined rows are grouped back into one row per entity before the window
        // applies; columns reached through to-many joins sort by their MIN or MAX.
        compile_order_by(metadata, &mut query, type_name, &alias, &args.order_by)?;
        query.select_column(pk.clone(), "__pk".to_string());
        query.group_by(pk.clone());
        query.skip = args.skip;
        query.take = args.take;

        let ids: Vec<Value> = self
            .fetch_all(query.to_statement())
            .await?
            .into_iter()
            .map(|row| row.get("__pk").cloned().unwrap_or(Value::Null))
            .collect();

        let count = count.unwrap_or(ids.len() as u64);
        debug!(entity = %type_name, count, page = ids.len(), "resolved list");
        if ids.is_empty() {
            return Ok(EntityList::new(count, Vec::new()));
        }

        let values = self.hydrate(entity, &ids, &args.relations).await?;
        Ok(EntityList::new(count, values))
    }

    /// Load the records with the given primary keys, in that order.
    pub(crate) async fn hydrate(
        &self,
        entity: &EntityDescriptor,
        ids: &[Value],
        relations: &[String],
    ) -> OrbisResult<Vec<Record>> {
        let metadata = self.metadata();
        let alias = entity.singular_name.clone();
        let pk_column = metadata.primary_column(entity)?;

        let mut query = SelectQuery::new(&entity.table, &alias);
        query.and_where(column_in(&alias, &pk_column, ids.to_vec()));

        let relations = normalize_relation_paths(entity, relations);
        let projection = Projection::build(metadata, &mut query, &entity.type_name, &alias, &relations)?;
        let rows = self.fetch_all(query.to_statement()).await?;
        let mut records: std::collections::HashMap<String, Record> = projection
            .fold(metadata, rows)?
            .into_iter()
            .map(|record| {
                let key = key_of(record.get(&entity.primary_key).unwrap_or(&Value::Null));
                (key, record)
            })
            .collect();

        Ok(ids.iter().filter_map(|id| records.remove(&key_of(id))).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use serde_json::json;

    #[test]
    fn test_relation_paths_accept_singular_prefix() {
        let metadata = fixtures::metadata();
        let user = metadata.get_entity("User").unwrap();
        let paths = normalize_relation_paths(
            user,
            &["user.providers".to_string(), "posts".to_string(), "user".to_string()],
        );
        assert_eq!(paths, vec!["providers", "posts"]);
    }

    #[test]
    fn test_find_many_args_deserialize() {
        let args: FindManyArgs = serde_json::from_value(json!({
            "where": {"name": {"equals": "Ada"}},
            "orderBy": ["name", ["age", "desc"]],
            "take": 5
        }))
        .unwrap();
        assert!(args.filter.is_some());
        assert_eq!(args.order_by.len(), 2);
        assert_eq!(args.take, Some(5));
        assert!(!args.is_plain());
        assert!(FindManyArgs::new().is_plain());
    }
}
