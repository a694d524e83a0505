// Order-by argument compiler

use serde::{Deserialize, Serialize};

use crate::arguments::{join_relation, relation_path_to_var_name};
use crate::error::{OrbisError, OrbisResult};
use crate::metadata::{embedded_column_name, FieldType, OrbisMetadata};
use crate::query::{ColumnRef, Direction, JoinKind, SelectQuery};

/// One sort key: `"name"` sorts ascending, `["providers", "email", "desc"]`
/// walks relations and embedded objects down to a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderByRule {
    Field(String),
    Path(Vec<String>),
}

impl OrderByRule {
    pub fn asc(field: &str) -> Self {
        OrderByRule::Field(field.to_string())
    }

    pub fn path<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        OrderByRule::Path(segments.into_iter().map(Into::into).collect())
    }

    fn split(&self) -> OrbisResult<(Vec<&str>, Direction)> {
        match self {
            OrderByRule::Field(field) => Ok((vec![field.as_str()], Direction::Asc)),
            OrderByRule::Path(segments) => match segments.as_slice() {
                [] => Err(OrbisError::InvalidOrderPath("empty order path".to_string())),
                [field] => Ok((vec![field.as_str()], Direction::Asc)),
                [fields @ .., last] => {
                    let direction = match last.to_lowercase().as_str() {
                        "asc" => Direction::Asc,
                        "desc" => Direction::Desc,
                        _ => return Err(OrbisError::InvalidOrderDirection(last.clone())),
                    };
                    Ok((fields.iter().map(String::as_str).collect(), direction))
                }
            },
        }
    }
}

/// Append the order clauses for `rules` to `query`, left-joining relations on the way.
pub fn compile_order_by(
    metadata: &OrbisMetadata,
    query: &mut SelectQuery,
    type_name: &str,
    alias: &str,
    rules: &[OrderByRule],
) -> OrbisResult<()> {
    for rule in rules {
        let (segments, direction) = rule.split()?;
        let column = resolve_path(metadata, query, type_name, alias, &segments)?;
        query.add_order_by(column, direction);
    }
    Ok(())
}

fn resolve_path(
    metadata: &OrbisMetadata,
    query: &mut SelectQuery,
    type_name: &str,
    alias: &str,
    segments: &[&str],
) -> OrbisResult<ColumnRef> {
    let mut current_type = type_name.to_string();
    let mut current_alias = alias.to_string();
    let mut prefix = String::new();
    let path = segments.join(".");

    for (i, segment) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();
        let field = metadata.get_field(&current_type, segment)?;

        if field.is_relation() {
            if last || !prefix.is_empty() {
                return Err(OrbisError::InvalidOrderPath(path));
            }
            let to_alias = relation_path_to_var_name(&format!("{}.{}", current_alias, segment));
            let relation = join_relation(
                metadata,
                query,
                &current_type,
                segment,
                &current_alias,
                &to_alias,
                JoinKind::Left,
            )?;
            current_type = relation.target.type_name.clone();
            current_alias = to_alias;
            continue;
        }

        if !field.is_column() {
            return Err(OrbisError::InvalidOrderPath(path));
        }

        let column = embedded_column_name(&prefix, &field.column_name());
        match field.resolve_type() {
            FieldType::Object(name) if metadata.is_embedded(name) => {
                if last {
                    return Err(OrbisError::InvalidOrderPath(path));
                }
                current_type = name.clone();
                prefix = column;
            }
            FieldType::List(_) | FieldType::Object(_) => {
                return Err(OrbisError::InvalidOrderPath(path))
            }
            _ if last => return Ok(ColumnRef::new(&current_alias, &column)),
            _ => return Err(OrbisError::InvalidOrderPath(path)),
        }
    }

    Err(OrbisError::InvalidOrderPath(path))
}
