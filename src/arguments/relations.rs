use crate::error::OrbisResult;
use crate::metadata::{OrbisMetadata, RelationLink, ResolvedRelation};
use crate::query::{ColumnRef, Join, JoinKind, SelectQuery};

/// `user.providers.tokens` -> `user_providers.tokens`
pub fn relation_path_to_var_path(path: &str) -> String {
    match path.rfind('.') {
        Some(last) => format!("{}{}", path[..last].replace('.', "_"), &path[last..]),
        None => path.to_string(),
    }
}

/// `user.providers.tokens` -> `user_providers_tokens`
pub fn relation_path_to_var_name(path: &str) -> String {
    path.replace('.', "_")
}

/// Join the relation `field_name` of the row aliased `from_alias` as `to_alias`.
/// Joins whose alias is already present are left untouched.
pub fn join_relation<'m>(
    metadata: &'m OrbisMetadata,
    query: &mut SelectQuery,
    owner_type: &str,
    field_name: &str,
    from_alias: &str,
    to_alias: &str,
    kind: JoinKind,
) -> OrbisResult<ResolvedRelation<'m>> {
    let relation = metadata.resolve_relation(owner_type, field_name)?;
    if query.has_alias(to_alias) {
        return Ok(relation);
    }

    let owner_pk = metadata.primary_column(relation.owner)?;
    let target_pk = metadata.primary_column(relation.target)?;
    let unset: Vec<ColumnRef> = metadata
        .delete_date_column(relation.target)
        .map(|column| ColumnRef::new(to_alias, &column))
        .into_iter()
        .collect();

    match &relation.link {
        RelationLink::OwnerColumn(column) => query.join(Join {
            kind,
            table: relation.target.table.clone(),
            alias: to_alias.to_string(),
            on: vec![(
                ColumnRef::new(to_alias, &target_pk),
                ColumnRef::new(from_alias, column),
            )],
            unset,
        }),
        RelationLink::TargetColumn(column) => query.join(Join {
            kind,
            table: relation.target.table.clone(),
            alias: to_alias.to_string(),
            on: vec![(
                ColumnRef::new(to_alias, column),
                ColumnRef::new(from_alias, &owner_pk),
            )],
            unset,
        }),
        RelationLink::JoinTable {
            table,
            owner_column,
            target_column,
        } => {
            let junction = format!("{}__jt", to_alias);
            query.join(Join {
                kind,
                table: table.clone(),
                alias: junction.clone(),
                on: vec![(
                    ColumnRef::new(&junction, owner_column),
                    ColumnRef::new(from_alias, &owner_pk),
                )],
                unset: Vec::new(),
            });
            query.join(Join {
                kind,
                table: relation.target.table.clone(),
                alias: to_alias.to_string(),
                on: vec![(
                    ColumnRef::new(to_alias, &target_pk),
                    ColumnRef::new(&junction, target_column),
                )],
                unset,
            });
        }
    }
    Ok(relation)
}
