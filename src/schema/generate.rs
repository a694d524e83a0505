use tracing::debug;

use super::{FieldDef, GeneratedSchema, TypeDef, TypeRef};
use crate::config::OrbisOptions;
use crate::error::OrbisResult;
use crate::metadata::{ColumnType, EntityDescriptor, FieldDescriptor, FieldType, Operation, OrbisMetadata, TypeKind};
use crate::util::first_upper;

const COMPARISONS: &[&str] = &["lt", "lte", "gt", "gte"];
const PATTERNS: &[&str] = &["contains", "startsWith", "endsWith"];

/// Derive output types, filter and mutation inputs and the root operations.
pub fn generate_schema(metadata: &OrbisMetadata, options: &OrbisOptions) -> OrbisResult<GeneratedSchema> {
    let mut builder = Builder {
        metadata,
        options,
        schema: GeneratedSchema::default(),
    };
    builder.scalar_filters();

    for descriptor in metadata.types() {
        let name = &descriptor.name;
        let def = match &descriptor.kind {
            TypeKind::Scalar => TypeDef::Scalar {
                description: descriptor.description.clone(),
            },
            TypeKind::Enum(values) => TypeDef::Enum {
                values: values.clone(),
            },
            TypeKind::Union(members) => TypeDef::Union {
                members: members.clone(),
            },
            TypeKind::Object => TypeDef::Object {
                implements: metadata
                    .get_object(name)
                    .map(|o| o.implements.clone())
                    .unwrap_or_default(),
                fields: builder.output_fields(name),
            },
            TypeKind::Interface => TypeDef::Interface {
                fields: builder.output_fields(name),
            },
            TypeKind::InputObject => TypeDef::Input {
                fields: builder.declared_input_fields(name),
            },
        };
        builder.schema.types.insert(name.clone(), def);
    }

    for entity in metadata.entities() {
        builder.entity(entity)?;
    }

    debug!(
        types = builder.schema.types.len(),
        queries = builder.schema.queries.len(),
        mutations = builder.schema.mutations.len(),
        "generated schema"
    );
    Ok(builder.schema)
}

struct Builder<'m> {
    metadata: &'m OrbisMetadata,
    options: &'m OrbisOptions,
    schema: GeneratedSchema,
}

impl<'m> Builder<'m> {
    fn scalar_filters(&mut self) {
        for (filter, scalar, patterns) in [
            ("StringFilter", "String", true),
            ("IntFilter", "Int", false),
            ("FloatFilter", "Float", false),
            ("DateTimeFilter", "DateTime", false),
        ] {
            let mut fields = equality_fields(scalar);
            fields.extend(COMPARISONS.iter().map(|op| FieldDef::new(op, TypeRef::named(scalar))));
            if patterns {
                fields.extend(PATTERNS.iter().map(|op| FieldDef::new(op, TypeRef::named(scalar))));
            }
            self.schema.types.insert(filter.to_string(), TypeDef::Input { fields });
        }
    }

    fn output_fields(&self, type_name: &str) -> Vec<FieldDef> {
        let mut fields = Vec::new();
        for field in self.metadata.fields(type_name).filter(|f| f.graphql) {
            let field_type = field.resolve_type();
            let name = scalar_name(field);
            let type_ref = type_of(field_type, &name).nullable(field.nullable == Some(true));
            let mut def = FieldDef::new(&field.name, type_ref);

            if field.is_relation() && field_type.is_list() {
                def = def
                    .arg("where", TypeRef::named(&format!("{}WhereInput", name)))
                    .arg("orderBy", TypeRef::list_of(&format!("{}OrderByInput", name)))
                    .arg("skip", TypeRef::named("Int"))
                    .arg("take", TypeRef::named("Int"));
            }
            fields.push(def);
        }
        fields
    }

    fn declared_input_fields(&self, type_name: &str) -> Vec<FieldDef> {
        self.metadata
            .fields(type_name)
            .filter(|f| f.graphql)
            .map(|field| {
                let type_ref = type_of(field.resolve_type(), &scalar_name(field));
                FieldDef::new(&field.name, type_ref.nullable(field.nullable == Some(true)))
            })
            .collect()
    }

    fn entity(&mut self, entity: &EntityDescriptor) -> OrbisResult<()> {
        let name = entity.type_name.clone();
        let list = format!("{}List", name);
        self.schema.types.insert(
            list.clone(),
            TypeDef::Object {
                implements: Vec::new(),
                fields: vec![
                    FieldDef::new("info", TypeRef::named("ListInfo").non_null()),
                    FieldDef::new("values", TypeRef::list_of(&name).non_null()),
                ],
            },
        );

        let unique = self.where_unique_input(&name);
        let filter = self.where_input(&name);
        let order = self.order_by_input(&name);
        let create = self.mutation_input(&name, false);
        let update = self.mutation_input(&name, true);

        let window = |def: FieldDef| {
            def.arg("where", TypeRef::named(&filter))
                .arg("orderBy", TypeRef::list_of(&order))
                .arg("skip", TypeRef::named("Int"))
                .arg("take", TypeRef::named("Int"))
        };
        let should = |operation| self.options.should_generate(entity, operation);

        let mut queries = Vec::new();
        if should(Operation::FindOne) {
            queries.push(
                FieldDef::new(&entity.singular_name, TypeRef::named(&name))
                    .arg("where", TypeRef::named(&unique).non_null()),
            );
        }
        if should(Operation::FindMany) {
            queries.push(window(FieldDef::new(&entity.plural_name, TypeRef::named(&list).non_null())));
        }

        let mut mutations = Vec::new();
        if should(Operation::CreateOne) {
            mutations.push(
                FieldDef::new(&format!("create{}", name), TypeRef::named(&name))
                    .arg("data", TypeRef::named(&create).non_null()),
            );
        }
        if should(Operation::UpdateOne) {
            mutations.push(
                FieldDef::new(&format!("update{}", name), TypeRef::named(&name))
                    .arg("where", TypeRef::named(&unique).non_null())
                    .arg("data", TypeRef::named(&update).non_null()),
            );
        }
        if should(Operation::DeleteOne) {
            mutations.push(
                FieldDef::new(&format!("delete{}", name), TypeRef::named(&name).non_null())
                    .arg("where", TypeRef::named(&unique).non_null()),
            );
        }
        if should(Operation::DeleteMany) {
            mutations.push(window(FieldDef::new(
                &format!("delete{}", first_upper(&entity.plural_name)),
                TypeRef::named(&list).non_null(),
            )));
        }

        self.schema.queries.extend(queries);
        self.schema.mutations.extend(mutations);
        Ok(())
    }

    /// Reserve `name`; false when it is already generated or being generated.
    fn reserve(&mut self, name: &str) -> bool {
        if self.schema.types.contains_key(name) {
            return false;
        }
        self.schema
            .types
            .insert(name.to_string(), TypeDef::Input { fields: Vec::new() });
        true
    }

    fn stored_fields(&self, type_name: &str) -> Vec<&'m FieldDescriptor> {
        let entity = self.metadata.has_entity(type_name);
        self.metadata
            .fields(type_name)
            .filter(|f| f.graphql && f.resolver.is_none())
            .filter(|f| !entity || f.is_column() || f.is_relation())
            .collect()
    }

    fn where_unique_input(&mut self, type_name: &str) -> String {
        let name = format!("{}WhereUniqueInput", type_name);
        if !self.reserve(&name) {
            return name;
        }

        let primary = self.metadata.get_entity(type_name).map(|e| e.primary_key.clone()).ok();
        let fields = self
            .stored_fields(type_name)
            .into_iter()
            .filter(|f| {
                let unique = f.column.as_ref().map_or(false, |c| c.unique);
                primary.as_deref() == Some(f.name.as_str()) || unique
            })
            .map(|f| FieldDef::new(&f.name, TypeRef::named(&scalar_name(f))))
            .collect();
        self.schema.types.insert(name.clone(), TypeDef::Input { fields });
        name
    }

    fn where_input(&mut self, type_name: &str) -> String {
        let name = format!("{}WhereInput", type_name);
        if !self.reserve(&name) {
            return name;
        }

        let mut fields = Vec::new();
        for field in self.stored_fields(type_name) {
            let field_type = field.resolve_type();
            if field_type.is_list() && !field.is_relation() {
                continue;
            }
            let filter = match field_type.item() {
                FieldType::Boolean => "Boolean".to_string(),
                FieldType::Number if field.float => "FloatFilter".to_string(),
                FieldType::Number => "IntFilter".to_string(),
                FieldType::String => "StringFilter".to_string(),
                FieldType::Date => "DateTimeFilter".to_string(),
                FieldType::Enum(enumeration) => self.enum_filter(enumeration),
                FieldType::Object(object) => self.where_input(object),
                FieldType::List(_) => continue,
            };
            fields.push(FieldDef::new(&field.name, TypeRef::named(&filter)));
        }
        fields.push(FieldDef::new("AND", TypeRef::list_of(&name)));
        fields.push(FieldDef::new("OR", TypeRef::list_of(&name)));

        self.schema.types.insert(name.clone(), TypeDef::Input { fields });
        name
    }

    fn enum_filter(&mut self, enumeration: &str) -> String {
        let name = format!("{}Filter", enumeration);
        if self.reserve(&name) {
            self.schema.types.insert(
                name.clone(),
                TypeDef::Input {
                    fields: equality_fields(enumeration),
                },
            );
        }
        name
    }

    fn order_by_input(&mut self, type_name: &str) -> String {
        let name = format!("{}OrderByInput", type_name);
        if !self.reserve(&name) {
            return name;
        }

        let mut fields = Vec::new();
        for field in self.stored_fields(type_name) {
            let order = match field.resolve_type() {
                FieldType::List(_) => continue,
                FieldType::Object(object) => self.order_by_input(object),
                _ => "OrderByArg".to_string(),
            };
            fields.push(FieldDef::new(&field.name, TypeRef::named(&order)));
        }

        self.schema.types.insert(name.clone(), TypeDef::Input { fields });
        name
    }

    /// Create inputs leave out what storage or defaults fill in; update inputs are all optional.
    fn mutation_input(&mut self, type_name: &str, is_update: bool) -> String {
        let name = if is_update {
            format!("{}UpdateInput", type_name)
        } else {
            format!("{}CreateInput", type_name)
        };
        if !self.reserve(&name) {
            return name;
        }

        let entity = self.metadata.get_entity(type_name).ok();
        let mut fields = Vec::new();
        for field in self.stored_fields(type_name) {
            let field_type = field.resolve_type();
            let optional_on_create = self.metadata.is_generated_field(type_name, &field.name)
                || entity.map_or(false, |e| self.options.has_create_default(e, &field.name))
                || (field.is_relation() && field_type.is_list());
            let nullable = is_update || field.nullable == Some(true) || optional_on_create;

            let input = match field_type.item() {
                FieldType::Object(object) if field.is_relation() => self.relation_input(object, is_update),
                FieldType::Object(object) => self.mutation_input(object, is_update),
                _ => scalar_name(field),
            };
            fields.push(FieldDef::new(&field.name, type_of(field_type, &input).nullable(nullable)));
        }

        self.schema.types.insert(name.clone(), TypeDef::Input { fields });
        name
    }

    fn relation_input(&mut self, type_name: &str, is_update: bool) -> String {
        let name = if is_update {
            format!("{}UpdateRelationInput", type_name)
        } else {
            format!("{}CreateRelationInput", type_name)
        };
        if !self.reserve(&name) {
            return name;
        }

        let create = self.mutation_input(type_name, false);
        let unique = self.where_unique_input(type_name);
        let mut fields = vec![
            FieldDef::new("create", TypeRef::named(&create)),
            FieldDef::new("connect", TypeRef::named(&unique)),
        ];
        if is_update {
            fields.push(FieldDef::new("disconnect", TypeRef::named(&unique)));
        }

        self.schema.types.insert(name.clone(), TypeDef::Input { fields });
        name
    }
}

fn equality_fields(scalar: &str) -> Vec<FieldDef> {
    vec![
        FieldDef::new("equals", TypeRef::named(scalar)),
        FieldDef::new("not", TypeRef::named(scalar)),
        FieldDef::new("in", TypeRef::list_of(scalar)),
        FieldDef::new("notIn", TypeRef::list_of(scalar)),
    ]
}

/// External name of the field's (item) type.
fn scalar_name(field: &FieldDescriptor) -> String {
    match field.resolve_type().item() {
        FieldType::Boolean => "Boolean".to_string(),
        FieldType::Number if field.float => "Float".to_string(),
        FieldType::Number => "Int".to_string(),
        FieldType::String => "String".to_string(),
        FieldType::Date => match field.column.as_ref().and_then(|c| c.column_type) {
            Some(ColumnType::Date) => "Date".to_string(),
            Some(ColumnType::Time) => "Time".to_string(),
            _ => "DateTime".to_string(),
        },
        FieldType::Enum(name) | FieldType::Object(name) => name.clone(),
        FieldType::List(_) => "String".to_string(),
    }
}

fn type_of(field_type: &FieldType, name: &str) -> TypeRef {
    if field_type.is_list() {
        TypeRef::list_of(name).non_null()
    } else {
        TypeRef::named(name).non_null()
    }
}
