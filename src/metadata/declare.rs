// Declaration API - explicit registration of types, fields and entities

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::arguments::WhereArgument;
use crate::error::{OrbisError, OrbisResult};
use crate::metadata::{
    DefaultValue, EntityDescriptor, EntityOperations, FieldDefinition, FieldType,
    InterfaceMetadata, ObjectMetadata, OrbisMetadata, Operation, Record, SchemaExtension,
    TypeDescriptor, TypeKind,
};
use crate::util::{first_lower, is_identifier, pluralize};
use crate::validation::ObjectSchema;
use crate::viewer::ViewerContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DefinitionKind {
    Object,
    Interface,
    InputObject,
    /// Field holder without its own external type, used as a parent.
    Base,
}

/// Storage-backed part of an object declaration.
#[derive(Clone, Default)]
pub struct EntityDefinition {
    pub table: Option<String>,
    pub operations: EntityOperations,
    pub create: BTreeMap<String, DefaultValue>,
    pub scope: Option<crate::metadata::ScopeFn>,
}

#[derive(Clone)]
pub struct ObjectDefinition {
    name: String,
    kind: DefinitionKind,
    description: Option<String>,
    parent: Option<String>,
    implements: Vec<String>,
    fields: Vec<FieldDefinition>,
    schema: Option<SchemaExtension>,
    entity: Option<EntityDefinition>,
}

impl ObjectDefinition {
    fn with_kind(name: &str, kind: DefinitionKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: None,
            parent: None,
            implements: Vec::new(),
            fields: Vec::new(),
            schema: None,
            entity: None,
        }
    }

    pub fn object(name: &str) -> Self {
        Self::with_kind(name, DefinitionKind::Object)
    }

    pub fn interface(name: &str) -> Self {
        Self::with_kind(name, DefinitionKind::Interface)
    }

    pub fn input(name: &str) -> Self {
        Self::with_kind(name, DefinitionKind::InputObject)
    }

    pub fn base(name: &str) -> Self {
        Self::with_kind(name, DefinitionKind::Base)
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Inherit the fields of an already registered type.
    pub fn parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.implements.push(interface.to_string());
        self
    }

    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn schema<F>(mut self, extension: F) -> Self
    where
        F: Fn(ObjectSchema) -> ObjectSchema + Send + Sync + 'static,
    {
        self.schema = Some(Arc::new(extension));
        self
    }

    fn entity_mut(&mut self) -> &mut EntityDefinition {
        self.entity.get_or_insert_with(EntityDefinition::default)
    }

    /// Back the type by a table named after it.
    pub fn entity(mut self) -> Self {
        self.entity_mut();
        self
    }

    pub fn table(mut self, table: &str) -> Self {
        self.entity_mut().table = Some(table.to_string());
        self
    }

    pub fn operation(mut self, operation: Operation, enabled: bool) -> Self {
        self.entity_mut().operations.set(operation, enabled);
        self
    }

    pub fn create_default(mut self, field: &str, value: DefaultValue) -> Self {
        self.entity_mut().create.insert(field.to_string(), value);
        self
    }

    pub fn create_literal(self, field: &str, value: Value) -> Self {
        self.create_default(field, DefaultValue::Literal(value))
    }

    pub fn create_computed<F>(self, field: &str, f: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        self.create_default(field, DefaultValue::computed(f))
    }

    pub fn scope<F>(mut self, scope: F) -> Self
    where
        F: Fn(&ViewerContext) -> Vec<WhereArgument> + Send + Sync + 'static,
    {
        self.entity_mut().scope = Some(Arc::new(scope));
        self
    }
}

impl OrbisMetadata {
    /// Register a declared object, interface, input object or base type.
    ///
    /// Nothing is kept when any part of the declaration is rejected.
    pub fn register(&mut self, definition: ObjectDefinition) -> OrbisResult<()> {
        let ObjectDefinition {
            name,
            kind,
            description,
            parent,
            implements,
            fields,
            schema,
            entity,
        } = definition;

        if !is_identifier(&name) {
            return Err(OrbisError::InvalidField(format!("{} is not a valid type name", name)));
        }
        let fields = fields
            .into_iter()
            .map(|field| field.build(&name))
            .collect::<OrbisResult<Vec<_>>>()?;

        let mut staged = self.clone();
        let type_kind = match kind {
            DefinitionKind::Object => Some(TypeKind::Object),
            DefinitionKind::Interface => Some(TypeKind::Interface),
            DefinitionKind::InputObject => Some(TypeKind::InputObject),
            DefinitionKind::Base => None,
        };
        if let Some(type_kind) = type_kind {
            let mut descriptor = TypeDescriptor::new(&name, type_kind);
            descriptor.description = description;
            staged.add_type(descriptor)?;
        }

        for descriptor in fields {
            staged.add_field(&name, descriptor)?;
        }

        if let Some(parent) = &parent {
            staged.merge_fields(parent, &name)?;
        }

        match kind {
            DefinitionKind::Object => staged.add_object(ObjectMetadata {
                name: name.clone(),
                implements,
                schema,
            })?,
            DefinitionKind::Interface => staged.add_interface(InterfaceMetadata {
                name: name.clone(),
                schema,
            })?,
            DefinitionKind::InputObject | DefinitionKind::Base => {}
        }

        if let Some(entity) = entity {
            let descriptor = staged.derive_entity(&name, entity)?;
            tracing::debug!(entity = %name, table = %descriptor.table, "registered entity");
            staged.add_entity(descriptor)?;
        }

        *self = staged;
        Ok(())
    }

    fn derive_entity(&self, name: &str, entity: EntityDefinition) -> OrbisResult<EntityDescriptor> {
        let mut columns = Vec::new();
        let mut relations = Vec::new();
        let mut primary_key = None;

        for field in self.fields(name) {
            if let Some(column) = &field.column {
                if column.primary && primary_key.is_none() {
                    primary_key = Some(field.name.clone());
                }
                columns.push(field.name.clone());
            } else if field.relation.is_some() {
                relations.push(field.name.clone());
            }
        }

        let primary_key = primary_key.ok_or_else(|| {
            OrbisError::InvalidField(format!("entity {} has no primary column", name))
        })?;

        let singular_name = first_lower(name);
        let plural_name = pluralize(&singular_name);

        Ok(EntityDescriptor {
            type_name: name.to_string(),
            table: entity.table.unwrap_or_else(|| name.to_string()),
            singular_name,
            plural_name,
            primary_key,
            columns,
            relations,
            operations: entity.operations,
            create: entity.create,
            scope: entity.scope,
        })
    }

    pub fn register_enum<I, S>(&mut self, name: &str, values: I) -> OrbisResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.add_type(TypeDescriptor::new(name, TypeKind::Enum(values)))
    }

    pub fn register_scalar(&mut self, name: &str, description: Option<&str>) -> OrbisResult<()> {
        let mut descriptor = TypeDescriptor::new(name, TypeKind::Scalar);
        descriptor.description = description.map(str::to_string);
        self.add_type(descriptor)
    }

    pub fn register_union<I, S>(&mut self, name: &str, members: I) -> OrbisResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let members = members.into_iter().map(Into::into).collect();
        self.add_type(TypeDescriptor::new(name, TypeKind::Union(members)))
    }

    /// Types every host registry starts with.
    pub fn register_builtins(&mut self) -> OrbisResult<()> {
        self.register_scalar("DateTime", Some("ISO-8601 date and time"))?;
        self.register_scalar("Date", Some("ISO-8601 calendar date"))?;
        self.register_scalar("Time", Some("ISO-8601 time of day"))?;
        self.register_enum("OrderByArg", ["asc", "desc"])?;
        self.register(
            ObjectDefinition::object("ListInfo")
                .field(FieldDefinition::new("count", FieldType::Number)),
        )
    }
}
