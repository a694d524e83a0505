// Where-argument compiler - nested filter trees to bracketed SQL predicates

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::arguments::{join_relation, relation_path_to_var_name, UniqueWhereArgument, WhereArgument};
use crate::error::{OrbisError, OrbisResult};
use crate::metadata::{embedded_column_name, FieldDescriptor, FieldType, OrbisMetadata, RelationLink};
use crate::query::{ColumnRef, CompareOp, JoinKind, Param, Predicate, SelectQuery};

const WHERE_ALIAS_PREFIX: &str = "where__";

/// Position of a filter node: the type being filtered, its table alias and the
/// column prefix of the embedded object it sits in.
#[derive(Debug, Clone)]
struct Location {
    type_name: String,
    alias: String,
    prefix: String,
}

/// Compiles filter trees against one query. Parameter names and join aliases
/// are numbered per field and per relation path across every call on the
/// same compiler, so filters compiled into one query never collide.
pub struct WhereCompiler<'m> {
    metadata: &'m OrbisMetadata,
    indices: HashMap<String, usize>,
}

impl<'m> WhereCompiler<'m> {
    pub fn new(metadata: &'m OrbisMetadata) -> Self {
        Self {
            metadata,
            indices: HashMap::new(),
        }
    }

    pub fn compile(
        &mut self,
        query: &mut SelectQuery,
        type_name: &str,
        alias: &str,
        filter: &WhereArgument,
    ) -> OrbisResult<Predicate> {
        let location = Location {
            type_name: type_name.to_string(),
            alias: alias.to_string(),
            prefix: String::new(),
        };
        self.compile_node(query, &location, filter, false)
    }

    /// Equality on each given column, parameters named after the fields.
    pub fn compile_unique(
        &self,
        type_name: &str,
        alias: &str,
        filter: &UniqueWhereArgument,
    ) -> OrbisResult<Predicate> {
        if filter.is_empty() {
            return Err(OrbisError::InvalidFilterComposition(
                "unique where argument needs at least one field".to_string(),
            ));
        }

        let mut predicates = Vec::new();
        for (field_name, value) in filter {
            let field = self.metadata.get_field(type_name, field_name)?;
            if !field.is_column() || value.is_object() || value.is_array() {
                return Err(OrbisError::InvalidFilterComposition(format!(
                    "{}.{} can't be used in a unique where argument",
                    type_name, field_name
                )));
            }

            let column = ColumnRef::new(alias, &field.column_name());
            predicates.push(if value.is_null() {
                Predicate::IsNull(column)
            } else {
                Predicate::Compare {
                    column,
                    op: CompareOp::Eq,
                    param: Param::new(field_name.clone(), value.clone()),
                }
            });
        }
        Ok(Predicate::all(predicates))
    }

    fn next_index(&mut self, key: &str) -> usize {
        let index = self.indices.entry(key.to_string()).or_insert(0);
        *index += 1;
        *index
    }

    fn compile_node(
        &mut self,
        query: &mut SelectQuery,
        location: &Location,
        filter: &WhereArgument,
        disjunction: bool,
    ) -> OrbisResult<Predicate> {
        let keyword = ["AND", "OR"].into_iter().find(|k| filter.contains_key(*k));

        if let Some(keyword) = keyword {
            if filter.len() > 1 {
                return Err(OrbisError::InvalidFilterComposition(
                    "keywords AND and OR can't be combined with each other or with fields"
                        .to_string(),
                ));
            }

            let siblings = match &filter[keyword] {
                Value::Array(items) => items.clone(),
                Value::Object(_) => vec![filter[keyword].clone()],
                _ => {
                    return Err(OrbisError::InvalidFilterComposition(format!(
                        "keyword {} needs a list of where arguments",
                        keyword
                    )))
                }
            };

            let is_or = keyword == "OR";
            let mut children = Vec::with_capacity(siblings.len());
            for sibling in &siblings {
                let sibling = sibling.as_object().ok_or_else(|| {
                    OrbisError::InvalidFilterComposition(format!(
                        "keyword {} needs a list of where arguments",
                        keyword
                    ))
                })?;
                children.push(self.compile_node(query, location, sibling, disjunction || is_or)?);
            }

            return Ok(if is_or {
                Predicate::Or(children)
            } else {
                Predicate::And(children)
            });
        }

        let mut predicates = Vec::new();
        for (field_name, value) in filter {
            if value.is_null() {
                continue;
            }

            let field = self
                .metadata
                .find_field(&location.type_name, field_name)
                .ok_or_else(|| {
                    OrbisError::UnknownField(format!("{}.{}", location.type_name, field_name))
                })?;

            if field.is_relation() {
                predicates.push(self.compile_relation(query, location, field, value, disjunction)?);
                continue;
            }

            match field.resolve_type() {
                FieldType::Object(name) => {
                    if self.metadata.has_entity(name) {
                        return Err(OrbisError::NotARelation(format!(
                            "{}.{}",
                            location.type_name, field_name
                        )));
                    }
                    let nested = as_filter(value, &location.type_name, field_name)?;
                    let embedded = Location {
                        type_name: name.clone(),
                        alias: location.alias.clone(),
                        prefix: embedded_column_name(&location.prefix, &field.column_name()),
                    };
                    predicates.push(self.compile_node(query, &embedded, nested, disjunction)?);
                }
                FieldType::List(_) => {
                    return Err(OrbisError::UnsupportedOperator(format!(
                        "list field {}.{} can't be filtered",
                        location.type_name, field_name
                    )))
                }
                _ => predicates.extend(self.compile_scalar(location, field, value)?),
            }
        }
        Ok(Predicate::all(predicates))
    }

    fn compile_scalar(
        &mut self,
        location: &Location,
        field: &FieldDescriptor,
        value: &Value,
    ) -> OrbisResult<Vec<Predicate>> {
        let column = ColumnRef::new(
            &location.alias,
            &embedded_column_name(&location.prefix, &field.column_name()),
        );

        let operators = match value {
            Value::Object(operators) => operators.clone(),
            other => {
                let mut equals = Map::new();
                equals.insert("equals".to_string(), other.clone());
                equals
            }
        };

        let mut predicates = Vec::new();
        for (operator, operand) in operators {
            let name = format!("{}{}", field.name, self.next_index(&field.name));
            let column = column.clone();

            let predicate = match operator.as_str() {
                "equals" if operand.is_null() => Predicate::IsNull(column),
                "not" if operand.is_null() => Predicate::IsNotNull(column),
                "equals" | "not" | "lt" | "lte" | "gt" | "gte" => Predicate::Compare {
                    column,
                    op: match operator.as_str() {
                        "equals" => CompareOp::Eq,
                        "not" => CompareOp::NotEq,
                        "lt" => CompareOp::Lt,
                        "lte" => CompareOp::Lte,
                        "gt" => CompareOp::Gt,
                        _ => CompareOp::Gte,
                    },
                    param: Param::new(name, operand),
                },
                "contains" => Predicate::Like {
                    column,
                    param: Param::new(name, Value::from(format!("%{}%", as_text(&operand)))),
                },
                "startsWith" => Predicate::Like {
                    column,
                    param: Param::new(name, Value::from(format!("{}%", as_text(&operand)))),
                },
                "endsWith" => Predicate::Like {
                    column,
                    param: Param::new(name, Value::from(format!("%{}", as_text(&operand)))),
                },
                "in" | "notIn" => Predicate::In {
                    column,
                    negated: operator == "notIn",
                    param: Param::new(
                        name,
                        match operand {
                            Value::Array(values) => Value::Array(values),
                            single => Value::Array(vec![single]),
                        },
                    ),
                },
                other => return Err(OrbisError::UnsupportedOperator(other.to_string())),
            };
            predicates.push(predicate);
        }
        Ok(predicates)
    }

    fn compile_relation(
        &mut self,
        query: &mut SelectQuery,
        location: &Location,
        field: &FieldDescriptor,
        value: &Value,
        disjunction: bool,
    ) -> OrbisResult<Predicate> {
        let filter = as_filter(value, &location.type_name, &field.name)?;

        let relation_var = relation_path_to_var_name(&format!("{}.{}", location.alias, field.name));
        let mut alias = format!("{}{}", relation_var, self.next_index(&relation_var));
        if !alias.starts_with(WHERE_ALIAS_PREFIX) {
            alias = format!("{}{}", WHERE_ALIAS_PREFIX, alias);
        }

        let null_check = match (filter.get("isNull"), filter.get("notIsNull")) {
            (Some(Value::Bool(is_null)), None) => Some(*is_null),
            (None, Some(Value::Bool(not_null))) => Some(!*not_null),
            (None, None) => None,
            _ => {
                return Err(OrbisError::InvalidFilterComposition(format!(
                    "{}.{} takes either isNull or notIsNull as a boolean",
                    location.type_name, field.name
                )))
            }
        };

        if let Some(is_null) = null_check {
            if filter.len() > 1 {
                return Err(OrbisError::InvalidFilterComposition(format!(
                    "{}.{} null checks can't be combined with other filters",
                    location.type_name, field.name
                )));
            }

            let relation = self.metadata.resolve_relation(&location.type_name, &field.name)?;
            let column = match &relation.link {
                RelationLink::OwnerColumn(column) => ColumnRef::new(&location.alias, column),
                _ => {
                    let target_pk = self.metadata.primary_column(relation.target)?;
                    join_relation(
                        self.metadata,
                        query,
                        &location.type_name,
                        &field.name,
                        &location.alias,
                        &alias,
                        JoinKind::Left,
                    )?;
                    ColumnRef::new(&alias, &target_pk)
                }
            };
            return Ok(if is_null {
                Predicate::IsNull(column)
            } else {
                Predicate::IsNotNull(column)
            });
        }

        let nested = match filter.get("matches") {
            Some(matches) if filter.len() == 1 => as_filter(matches, &location.type_name, &field.name)?,
            Some(_) => {
                return Err(OrbisError::InvalidFilterComposition(format!(
                    "{}.{} matches can't be combined with other filters",
                    location.type_name, field.name
                )))
            }
            None => filter,
        };

        let kind = if disjunction {
            JoinKind::Left
        } else {
            JoinKind::Inner
        };
        let relation = join_relation(
            self.metadata,
            query,
            &location.type_name,
            &field.name,
            &location.alias,
            &alias,
            kind,
        )?;

        let related = Location {
            type_name: relation.target.type_name.clone(),
            alias,
            prefix: String::new(),
        };
        self.compile_node(query, &related, nested, disjunction)
    }
}

fn as_filter<'v>(value: &'v Value, type_name: &str, field_name: &str) -> OrbisResult<&'v WhereArgument> {
    value.as_object().ok_or_else(|| {
        OrbisError::InvalidFilterComposition(format!(
            "{}.{} needs a nested where argument",
            type_name, field_name
        ))
    })
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
