// Hydration - left-join-and-select of requested relations, folded back into nested records

use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use crate::arguments::{join_relation, relation_path_to_var_name};
use crate::error::{OrbisError, OrbisResult};
use crate::metadata::{ColumnKind, ColumnMapping, Loading, OrbisMetadata, Record};
use crate::query::{ColumnRef, JoinKind, SelectQuery};
use crate::storage::Row;

use super::key_of;

const MAX_EAGER_DEPTH: usize = 3;

#[derive(Debug, Clone)]
struct Parent {
    index: usize,
    field: String,
    to_many: bool,
}

#[derive(Debug, Clone)]
struct AliasPlan {
    alias: String,
    type_name: String,
    path: String,
    pk_column: String,
    columns: Vec<ColumnMapping>,
    parent: Option<Parent>,
}

/// Selected aliases of one hydration query, root first.
#[derive(Debug, Clone)]
pub(crate) struct Projection {
    plans: Vec<AliasPlan>,
}

impl Projection {
    /// Join every relation path (parents first) and select the columns of each alias.
    pub(crate) fn build(
        metadata: &OrbisMetadata,
        query: &mut SelectQuery,
        type_name: &str,
        alias: &str,
        relations: &[String],
    ) -> OrbisResult<Self> {
        let entity = metadata.get_entity(type_name)?;
        let mut projection = Projection {
            plans: vec![AliasPlan {
                alias: alias.to_string(),
                type_name: type_name.to_string(),
                path: String::new(),
                pk_column: metadata.primary_column(entity)?,
                columns: metadata.column_mappings(type_name)?,
                parent: None,
            }],
        };

        for path in relations {
            let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
            let mut parent = 0;
            for depth in 1..=segments.len() {
                parent = projection.add(metadata, query, parent, &segments[..depth].join("."))?;
            }
        }
        projection.add_eager(metadata, query, 0, 0)?;

        for plan in &projection.plans {
            for mapping in &plan.columns {
                query.select_column(
                    ColumnRef::new(&plan.alias, &mapping.column),
                    format!("{}.{}", plan.alias, mapping.column),
                );
            }
        }
        Ok(projection)
    }

    fn add(
        &mut self,
        metadata: &OrbisMetadata,
        query: &mut SelectQuery,
        parent: usize,
        path: &str,
    ) -> OrbisResult<usize> {
        if let Some(index) = self.plans.iter().position(|p| p.path == path) {
            return Ok(index);
        }

        let field = path.rsplit('.').next().unwrap_or(path);
        let from = &self.plans[parent];
        let alias = relation_path_to_var_name(&format!("{}.{}", self.plans[0].alias, path));
        let relation = join_relation(
            metadata,
            query,
            &from.type_name,
            field,
            &from.alias,
            &alias,
            JoinKind::Left,
        )?;

        let target = relation.target;
        self.plans.push(AliasPlan {
            alias,
            type_name: target.type_name.clone(),
            path: path.to_string(),
            pk_column: metadata.primary_column(target)?,
            columns: metadata.column_mappings(&target.type_name)?,
            parent: Some(Parent {
                index: parent,
                field: field.to_string(),
                to_many: relation.is_to_many(),
            }),
        });
        Ok(self.plans.len() - 1)
    }

    /// Eager relations are always loaded, stopping at cycles back to an ancestor type.
    fn add_eager(
        &mut self,
        metadata: &OrbisMetadata,
        query: &mut SelectQuery,
        index: usize,
        depth: usize,
    ) -> OrbisResult<()> {
        if depth >= MAX_EAGER_DEPTH {
            return Ok(());
        }

        let type_name = self.plans[index].type_name.clone();
        let entity = metadata.get_entity(&type_name)?;
        for relation in &entity.relations {
            let field = metadata.get_field(&type_name, relation)?;
            let eager = field
                .relation
                .as_ref()
                .map_or(false, |r| r.loading == Loading::Eager);
            let target = field.resolve_type().object_name().unwrap_or_default();
            if !eager || self.is_ancestor(index, target) {
                continue;
            }

            let path = match self.plans[index].path.as_str() {
                "" => relation.clone(),
                parent => format!("{}.{}", parent, relation),
            };
            let child = self.add(metadata, query, index, &path)?;
            self.add_eager(metadata, query, child, depth + 1)?;
        }
        Ok(())
    }

    fn is_ancestor(&self, mut index: usize, type_name: &str) -> bool {
        loop {
            let plan = &self.plans[index];
            if plan.type_name == type_name {
                return true;
            }
            match &plan.parent {
                Some(parent) => index = parent.index,
                None => return false,
            }
        }
    }

    /// Fold joined rows into root records with their relations nested, in first-seen order.
    pub(crate) fn fold(&self, metadata: &OrbisMetadata, rows: Vec<Row>) -> OrbisResult<Vec<Record>> {
        let count = self.plans.len();
        let mut records: Vec<HashMap<String, Record>> = vec![HashMap::new(); count];
        let mut order: Vec<Vec<String>> = vec![Vec::new(); count];
        let mut links: Vec<Vec<(String, String)>> = vec![Vec::new(); count];
        let mut seen_links: Vec<HashSet<(String, String)>> = vec![HashSet::new(); count];

        for row in &rows {
            let keys: Vec<Option<String>> = self
                .plans
                .iter()
                .map(|plan| {
                    row.get(&format!("{}.{}", plan.alias, plan.pk_column))
                        .filter(|v| !v.is_null())
                        .map(key_of)
                })
                .collect();

            for (i, plan) in self.plans.iter().enumerate() {
                let Some(key) = &keys[i] else { continue };

                if !records[i].contains_key(key) {
                    records[i].insert(key.clone(), self.record_of(metadata, plan, row)?);
                    order[i].push(key.clone());
                }

                if let Some(parent) = &plan.parent {
                    if let Some(parent_key) = &keys[parent.index] {
                        let link = (parent_key.clone(), key.clone());
                        if seen_links[i].insert(link.clone()) {
                            links[i].push(link);
                        }
                    }
                }
            }
        }

        let folded = Folded {
            plans: &self.plans,
            records: &records,
            links: &links,
        };
        Ok(order[0].iter().map(|key| folded.assemble(0, key)).collect())
    }

    fn record_of(&self, metadata: &OrbisMetadata, plan: &AliasPlan, row: &Row) -> OrbisResult<Record> {
        let mut record = Record::new();
        let mut embedded = HashSet::new();

        for mapping in &plan.columns {
            let raw = row
                .get(&format!("{}.{}", plan.alias, mapping.column))
                .cloned()
                .unwrap_or(Value::Null);
            let value = normalize(mapping.kind, raw)?;
            if mapping.path.len() > 1 {
                embedded.insert(mapping.path[0].clone());
            }
            insert_path(&mut record, &mapping.path, value);
        }

        for name in embedded {
            let nullable = metadata
                .find_field(&plan.type_name, &name)
                .and_then(|f| f.nullable)
                .unwrap_or(false);
            let all_null = record
                .get(&name)
                .and_then(Value::as_object)
                .map_or(false, |o| o.values().all(Value::is_null));
            if nullable && all_null {
                record.insert(name, Value::Null);
            }
        }

        for field in metadata.fields(&plan.type_name).filter(|f| f.resolver.is_some()) {
            let value = field.resolve_value(&record)?;
            record.insert(field.name.clone(), value);
        }
        Ok(record)
    }
}

struct Folded<'p> {
    plans: &'p [AliasPlan],
    records: &'p [HashMap<String, Record>],
    links: &'p [Vec<(String, String)>],
}

impl<'p> Folded<'p> {
    fn assemble(&self, index: usize, key: &str) -> Record {
        let mut record = self.records[index].get(key).cloned().unwrap_or_default();

        for (child, plan) in self.plans.iter().enumerate() {
            let Some(parent) = plan.parent.as_ref().filter(|p| p.index == index) else {
                continue;
            };
            let children: Vec<Value> = self.links[child]
                .iter()
                .filter(|(parent_key, _)| parent_key == key)
                .map(|(_, child_key)| Value::Object(self.assemble(child, child_key)))
                .collect();

            let value = if parent.to_many {
                Value::Array(children)
            } else {
                children.into_iter().next().unwrap_or(Value::Null)
            };
            record.insert(parent.field.clone(), value);
        }
        record
    }
}

fn normalize(kind: ColumnKind, value: Value) -> OrbisResult<Value> {
    Ok(match (kind, value) {
        (_, Value::Null) => Value::Null,
        (ColumnKind::Boolean, Value::Number(n)) => Value::Bool(n.as_i64().unwrap_or(0) != 0),
        (ColumnKind::Json, Value::String(text)) => serde_json::from_str(&text).map_err(|e| {
            OrbisError::Database(format!("Failed to decode JSON column: {}", e))
        })?,
        (_, value) => value,
    })
}

fn insert_path(record: &mut Record, path: &[String], value: Value) {
    match path {
        [] => {}
        [name] => {
            record.insert(name.clone(), value);
        }
        [name, rest @ ..] => {
            let nested = record
                .entry(name.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(nested) = nested {
                insert_path(nested, rest, value);
            }
        }
    }
}
