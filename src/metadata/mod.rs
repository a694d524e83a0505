// Metadata Registry - type, field, entity and schema descriptors
// Built once while declarations are processed, then read by every engine

pub mod declare;
pub mod entity;
pub mod field;
pub mod types;

pub use declare::{EntityDefinition, ObjectDefinition};
pub use entity::{DefaultValue, EntityDescriptor, EntityOperations, Operation, ScopeFn};
pub use field::{
    ColumnOptions, ColumnType, DateMode, FieldDefinition, FieldDescriptor, FieldResolver,
    FieldType, Generation, Loading, RelationKind, RelationOptions, TypeThunk,
};
pub use types::{InterfaceMetadata, ObjectMetadata, SchemaExtension, TypeDescriptor, TypeKind};

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{OrbisError, OrbisResult};
use crate::util::first_upper;
use crate::validation::ObjectSchema;

/// A stored or returned entity row, keyed by field name.
pub type Record = Map<String, Value>;

const MAX_EMBEDDING_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Value,
    Boolean,
    Json,
    ForeignKey,
}

/// One physical column of an entity table and where its value lives in a record.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    pub path: Vec<String>,
    pub column: String,
    pub kind: ColumnKind,
}

/// How two entities of a relation are linked in storage.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationLink {
    /// The owning row holds the foreign key.
    OwnerColumn(String),
    /// The related row holds a foreign key back to the owner.
    TargetColumn(String),
    JoinTable {
        table: String,
        owner_column: String,
        target_column: String,
    },
}

#[derive(Debug, Clone)]
pub struct ResolvedRelation<'m> {
    pub field: &'m FieldDescriptor,
    pub options: &'m RelationOptions,
    pub owner: &'m EntityDescriptor,
    pub target: &'m EntityDescriptor,
    pub link: RelationLink,
}

impl<'m> ResolvedRelation<'m> {
    pub fn is_to_many(&self) -> bool {
        self.options.kind.is_to_many()
    }

    pub fn inverse(&self) -> Option<&'m str> {
        self.options.inverse.as_deref()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrbisMetadata {
    types: BTreeMap<String, TypeDescriptor>,
    interfaces: BTreeMap<String, InterfaceMetadata>,
    objects: BTreeMap<String, ObjectMetadata>,
    entities: BTreeMap<String, EntityDescriptor>,
    fields: BTreeMap<String, BTreeMap<String, FieldDescriptor>>,
    schemas: BTreeMap<String, ObjectSchema>,
}

impl OrbisMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /* Types */

    pub fn add_type(&mut self, descriptor: TypeDescriptor) -> OrbisResult<()> {
        if self.types.contains_key(&descriptor.name) {
            return Err(OrbisError::DuplicateType(descriptor.name));
        }
        self.types.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    pub fn get_type(&self, name: &str) -> OrbisResult<&TypeDescriptor> {
        self.types
            .get(name)
            .ok_or_else(|| OrbisError::UnknownType(name.to_string()))
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn get_or_add_type(&mut self, name: &str, kind: TypeKind) -> &TypeDescriptor {
        self.types
            .entry(name.to_string())
            .or_insert_with(|| TypeDescriptor::new(name, kind))
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }

    /* Fields */

    pub fn add_field(&mut self, type_name: &str, field: FieldDescriptor) -> OrbisResult<()> {
        let fields = self.fields.entry(type_name.to_string()).or_default();
        if fields.contains_key(&field.name) {
            return Err(OrbisError::DuplicateField(format!("{}.{}", type_name, field.name)));
        }
        fields.insert(field.name.clone(), field);
        Ok(())
    }

    pub fn get_field(&self, type_name: &str, field_name: &str) -> OrbisResult<&FieldDescriptor> {
        self.find_field(type_name, field_name)
            .ok_or_else(|| OrbisError::UnknownField(format!("{}.{}", type_name, field_name)))
    }

    pub fn find_field(&self, type_name: &str, field_name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(type_name).and_then(|f| f.get(field_name))
    }

    pub fn has_field(&self, type_name: &str, field_name: &str) -> bool {
        self.find_field(type_name, field_name).is_some()
    }

    pub fn has_fields(&self, type_name: &str) -> bool {
        self.fields.contains_key(type_name)
    }

    /// Fields of a type in name order; empty for types without fields.
    pub fn fields(&self, type_name: &str) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.get(type_name).into_iter().flat_map(|f| f.values())
    }

    /// Copy the parent's fields into the child; fields the child already defines win.
    pub fn merge_fields(&mut self, parent: &str, child: &str) -> OrbisResult<()> {
        let inherited = self
            .fields
            .get(parent)
            .cloned()
            .ok_or_else(|| OrbisError::UnknownType(parent.to_string()))?;

        let fields = self.fields.entry(child.to_string()).or_default();
        for (name, field) in inherited {
            fields.entry(name).or_insert(field);
        }
        Ok(())
    }

    /* Entities */

    pub fn add_entity(&mut self, entity: EntityDescriptor) -> OrbisResult<()> {
        if self.entities.contains_key(&entity.type_name) {
            return Err(OrbisError::DuplicateEntity(entity.type_name));
        }
        self.entities.insert(entity.type_name.clone(), entity);
        Ok(())
    }

    pub fn get_entity(&self, type_name: &str) -> OrbisResult<&EntityDescriptor> {
        self.entities
            .get(type_name)
            .ok_or_else(|| OrbisError::UnknownEntity(type_name.to_string()))
    }

    pub fn has_entity(&self, type_name: &str) -> bool {
        self.entities.contains_key(type_name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.values()
    }

    /* Interfaces and objects */

    pub fn add_interface(&mut self, interface: InterfaceMetadata) -> OrbisResult<()> {
        if self.interfaces.contains_key(&interface.name) {
            return Err(OrbisError::DuplicateInterface(interface.name));
        }
        self.interfaces.insert(interface.name.clone(), interface);
        Ok(())
    }

    pub fn get_interface(&self, name: &str) -> Option<&InterfaceMetadata> {
        self.interfaces.get(name)
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &InterfaceMetadata> {
        self.interfaces.values()
    }

    pub fn add_object(&mut self, object: ObjectMetadata) -> OrbisResult<()> {
        if self.objects.contains_key(&object.name) {
            return Err(OrbisError::DuplicateObject(object.name));
        }
        self.objects.insert(object.name.clone(), object);
        Ok(())
    }

    pub fn get_object(&self, name: &str) -> Option<&ObjectMetadata> {
        self.objects.get(name)
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectMetadata> {
        self.objects.values()
    }

    /* Validation schemas */

    pub fn add_schema(&mut self, type_name: &str, schema: ObjectSchema) {
        self.schemas.insert(type_name.to_string(), schema);
    }

    pub fn get_schema(&self, type_name: &str) -> Option<&ObjectSchema> {
        self.schemas.get(type_name)
    }

    pub fn has_schema(&self, type_name: &str) -> bool {
        self.schemas.contains_key(type_name)
    }

    /// Union another registry into this one. Nothing is merged if any key collides.
    pub fn merge(&mut self, other: OrbisMetadata) -> OrbisResult<()> {
        if let Some(name) = other.types.keys().find(|k| self.types.contains_key(*k)) {
            return Err(OrbisError::DuplicateType(name.clone()));
        }
        if let Some(name) = other.interfaces.keys().find(|k| self.interfaces.contains_key(*k)) {
            return Err(OrbisError::DuplicateInterface(name.clone()));
        }
        if let Some(name) = other.objects.keys().find(|k| self.objects.contains_key(*k)) {
            return Err(OrbisError::DuplicateObject(name.clone()));
        }
        if let Some(name) = other.entities.keys().find(|k| self.entities.contains_key(*k)) {
            return Err(OrbisError::DuplicateEntity(name.clone()));
        }
        for (type_name, fields) in &other.fields {
            if let Some(existing) = self.fields.get(type_name) {
                if let Some(name) = fields.keys().find(|k| existing.contains_key(*k)) {
                    return Err(OrbisError::DuplicateField(format!("{}.{}", type_name, name)));
                }
            }
        }
        if let Some(name) = other.schemas.keys().find(|k| self.schemas.contains_key(*k)) {
            return Err(OrbisError::DuplicateSchema(name.clone()));
        }

        self.types.extend(other.types);
        self.interfaces.extend(other.interfaces);
        self.objects.extend(other.objects);
        self.entities.extend(other.entities);
        for (type_name, fields) in other.fields {
            self.fields.entry(type_name).or_default().extend(fields);
        }
        self.schemas.extend(other.schemas);
        Ok(())
    }

    /* Storage mapping */

    /// Whether storage or the engine supplies the field when the caller omits it.
    pub fn is_generated_field(&self, type_name: &str, field_name: &str) -> bool {
        self.find_field(type_name, field_name)
            .and_then(|f| f.column.as_ref())
            .map(|c| c.default.is_some() || c.generated.is_some() || c.date_mode.is_some())
            .unwrap_or(false)
    }

    /// Whether the type is a value object stored inline in its owner's row.
    pub fn is_embedded(&self, type_name: &str) -> bool {
        !self.has_entity(type_name) && self.has_fields(type_name)
    }

    pub fn primary_column(&self, entity: &EntityDescriptor) -> OrbisResult<String> {
        Ok(self.get_field(&entity.type_name, &entity.primary_key)?.column_name())
    }

    /// Column stamped on soft delete; rows with it set are hidden from reads.
    pub fn delete_date_column(&self, entity: &EntityDescriptor) -> Option<String> {
        self.fields(&entity.type_name)
            .find(|field| {
                field
                    .column
                    .as_ref()
                    .map_or(false, |c| c.date_mode == Some(DateMode::DeleteDate))
            })
            .map(FieldDescriptor::column_name)
    }

    /// Physical columns of an entity table, embedded objects flattened.
    pub fn column_mappings(&self, type_name: &str) -> OrbisResult<Vec<ColumnMapping>> {
        let mut mappings = Vec::new();
        self.collect_columns(type_name, &[], "", &mut mappings)?;

        let entity = self.get_entity(type_name)?;
        for relation in &entity.relations {
            let field = self.get_field(type_name, relation)?;
            if let Some(options) = &field.relation {
                let owns_column = matches!(options.kind, RelationKind::ManyToOne)
                    || (options.kind == RelationKind::OneToOne && options.owner);
                let column = field.join_column();
                if owns_column && !mappings.iter().any(|m| m.column == column) {
                    mappings.push(ColumnMapping {
                        path: vec![column.clone()],
                        column,
                        kind: ColumnKind::ForeignKey,
                    });
                }
            }
        }
        Ok(mappings)
    }

    fn collect_columns(
        &self,
        type_name: &str,
        path: &[String],
        prefix: &str,
        mappings: &mut Vec<ColumnMapping>,
    ) -> OrbisResult<()> {
        if path.len() > MAX_EMBEDDING_DEPTH {
            return Err(OrbisError::InvalidField(format!(
                "{} nests embedded objects too deeply",
                path.join(".")
            )));
        }

        for field in self.fields(type_name) {
            if !field.is_column() {
                continue;
            }
            let column = embedded_column_name(prefix, &field.column_name());
            let mut field_path = path.to_vec();
            field_path.push(field.name.clone());

            match field.resolve_type() {
                FieldType::Object(name) if !self.has_entity(name) => {
                    self.collect_columns(name, &field_path, &column, mappings)?;
                }
                FieldType::Boolean => mappings.push(ColumnMapping {
                    path: field_path,
                    column,
                    kind: ColumnKind::Boolean,
                }),
                FieldType::List(_) => mappings.push(ColumnMapping {
                    path: field_path,
                    column,
                    kind: ColumnKind::Json,
                }),
                _ => mappings.push(ColumnMapping {
                    path: field_path,
                    column,
                    kind: ColumnKind::Value,
                }),
            }
        }
        Ok(())
    }

    pub fn resolve_relation(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> OrbisResult<ResolvedRelation<'_>> {
        let field = self.get_field(type_name, field_name)?;
        let options = field
            .relation
            .as_ref()
            .ok_or_else(|| OrbisError::NotARelation(format!("{}.{}", type_name, field_name)))?;
        let owner = self.get_entity(type_name)?;
        let target_name = field.resolve_type().object_name().ok_or_else(|| {
            OrbisError::InvalidRelation(format!(
                "{}.{} must reference an entity type",
                type_name, field_name
            ))
        })?;
        let target = self.get_entity(target_name)?;

        let link = match options.kind {
            RelationKind::ManyToOne => RelationLink::OwnerColumn(field.join_column()),
            RelationKind::OneToOne if options.owner => RelationLink::OwnerColumn(field.join_column()),
            RelationKind::OneToOne | RelationKind::OneToMany => {
                let inverse = self.inverse_field(type_name, field, options, target)?;
                RelationLink::TargetColumn(inverse.join_column())
            }
            RelationKind::ManyToMany if options.owner => join_table(owner, field, options, target),
            RelationKind::ManyToMany => {
                let inverse = self.inverse_field(type_name, field, options, target)?;
                let inverse_options = inverse.relation.as_ref().ok_or_else(|| {
                    OrbisError::InvalidRelation(format!(
                        "{}.{} has no relation storage",
                        target.type_name, inverse.name
                    ))
                })?;
                match join_table(target, inverse, inverse_options, owner) {
                    RelationLink::JoinTable {
                        table,
                        owner_column,
                        target_column,
                    } => RelationLink::JoinTable {
                        table,
                        owner_column: target_column,
                        target_column: owner_column,
                    },
                    other => other,
                }
            }
        };

        Ok(ResolvedRelation {
            field,
            options,
            owner,
            target,
            link,
        })
    }

    fn inverse_field(
        &self,
        type_name: &str,
        field: &FieldDescriptor,
        options: &RelationOptions,
        target: &EntityDescriptor,
    ) -> OrbisResult<&FieldDescriptor> {
        let inverse = options.inverse.as_deref().ok_or_else(|| {
            OrbisError::InvalidRelation(format!(
                "{}.{} needs an inverse side on {}",
                type_name, field.name, target.type_name
            ))
        })?;
        let inverse_field = self.get_field(&target.type_name, inverse)?;
        if inverse_field.relation.is_none() {
            return Err(OrbisError::InvalidRelation(format!(
                "{}.{} is not a relation",
                target.type_name, inverse
            )));
        }
        Ok(inverse_field)
    }
}

pub(crate) fn embedded_column_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}{}", prefix, first_upper(name))
    }
}

fn join_table(
    owner: &EntityDescriptor,
    field: &FieldDescriptor,
    options: &RelationOptions,
    target: &EntityDescriptor,
) -> RelationLink {
    let table = options
        .join_table
        .clone()
        .unwrap_or_else(|| format!("{}_{}_{}", owner.table, field.name, target.table));

    let (owner_column, target_column) = if owner.table == target.table {
        (format!("{}Id_1", owner.table), format!("{}Id_2", target.table))
    } else {
        (format!("{}Id", owner.table), format!("{}Id", target.table))
    };

    RelationLink::JoinTable {
        table,
        owner_column,
        target_column,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(type_name: &str, name: &str, field_type: FieldType) -> FieldDescriptor {
        FieldDefinition::new(name, field_type).column().build(type_name).unwrap()
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut metadata = OrbisMetadata::new();
        metadata.add_type(TypeDescriptor::new("User", TypeKind::Object)).unwrap();
        metadata.add_type(TypeDescriptor::new("Post", TypeKind::Object)).unwrap();

        let result = metadata.add_type(TypeDescriptor::new("User", TypeKind::Object));
        assert!(matches!(result, Err(OrbisError::DuplicateType(name)) if name == "User"));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let mut metadata = OrbisMetadata::new();
        metadata.add_field("User", field("User", "name", FieldType::String)).unwrap();
        metadata.add_field("User", field("User", "email", FieldType::String)).unwrap();
        metadata.add_field("Post", field("Post", "name", FieldType::String)).unwrap();

        let result = metadata.add_field("User", field("User", "name", FieldType::String));
        assert!(matches!(result, Err(OrbisError::DuplicateField(name)) if name == "User.name"));
    }

    #[test]
    fn test_get_or_add_type_keeps_first() {
        let mut metadata = OrbisMetadata::new();
        metadata.get_or_add_type("Role", TypeKind::Enum(vec!["ADMIN".into()]));
        let existing = metadata.get_or_add_type("Role", TypeKind::Scalar);
        assert_eq!(existing.kind, TypeKind::Enum(vec!["ADMIN".into()]));
    }

    #[test]
    fn test_merge_fields_child_wins() {
        let mut metadata = OrbisMetadata::new();
        metadata.add_field("Base", field("Base", "name", FieldType::String)).unwrap();
        metadata.add_field("Base", field("Base", "age", FieldType::Number)).unwrap();
        metadata.add_field("Child", field("Child", "age", FieldType::String)).unwrap();

        metadata.merge_fields("Base", "Child").unwrap();

        assert!(metadata.has_field("Child", "name"));
        let age = metadata.get_field("Child", "age").unwrap();
        assert_eq!(age.resolve_type(), &FieldType::String);
        assert!(matches!(
            metadata.merge_fields("Missing", "Child"),
            Err(OrbisError::UnknownType(_))
        ));
    }

    #[test]
    fn test_merge_rejects_collisions_atomically() {
        let mut host = OrbisMetadata::new();
        host.add_type(TypeDescriptor::new("User", TypeKind::Object)).unwrap();

        let mut module = OrbisMetadata::new();
        module.add_type(TypeDescriptor::new("Provider", TypeKind::Object)).unwrap();
        module.add_type(TypeDescriptor::new("User", TypeKind::Object)).unwrap();

        assert!(matches!(host.merge(module), Err(OrbisError::DuplicateType(_))));
        assert!(!host.has_type("Provider"));

        let mut module = OrbisMetadata::new();
        module.add_type(TypeDescriptor::new("Provider", TypeKind::Object)).unwrap();
        host.merge(module).unwrap();
        assert!(host.has_type("Provider"));
    }

    #[test]
    fn test_embedded_column_name() {
        assert_eq!(embedded_column_name("", "city"), "city");
        assert_eq!(embedded_column_name("address", "city"), "addressCity");
    }
}
