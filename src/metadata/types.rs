use std::fmt;
use std::sync::Arc;

use crate::validation::ObjectSchema;

/// Hook that adjusts the generated validation schema of a type.
pub type SchemaExtension = Arc<dyn Fn(ObjectSchema) -> ObjectSchema + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Scalar,
    Enum(Vec<String>),
    InputObject,
    Interface,
    Object,
    Union(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    pub name: String,
    pub kind: TypeKind,
    pub description: Option<String>,
}

impl TypeDescriptor {
    pub fn new(name: &str, kind: TypeKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: None,
        }
    }

    pub fn enum_values(&self) -> Option<&[String]> {
        match &self.kind {
            TypeKind::Enum(values) => Some(values),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct InterfaceMetadata {
    pub name: String,
    pub schema: Option<SchemaExtension>,
}

#[derive(Clone)]
pub struct ObjectMetadata {
    pub name: String,
    pub implements: Vec<String>,
    pub schema: Option<SchemaExtension>,
}

impl fmt::Debug for InterfaceMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceMetadata")
            .field("name", &self.name)
            .field("schema", &self.schema.is_some())
            .finish()
    }
}

impl fmt::Debug for ObjectMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectMetadata")
            .field("name", &self.name)
            .field("implements", &self.implements)
            .field("schema", &self.schema.is_some())
            .finish()
    }
}
