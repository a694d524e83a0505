// Field descriptors - lazily typed fields with optional column or relation storage

use once_cell::sync::OnceCell;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::{OrbisError, OrbisResult};
use crate::metadata::Record;
use crate::util::is_identifier;

/// Deferred type reference, so fields can point at types declared later.
pub type TypeThunk = Arc<dyn Fn() -> FieldType + Send + Sync>;

/// Output value of a computed field.
pub type FieldResolver = Arc<dyn Fn(&Record) -> OrbisResult<Value> + Send + Sync>;

/// Resolved type of a field. Object and enum references carry the registered type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Boolean,
    Number,
    String,
    Date,
    Enum(String),
    Object(String),
    List(Box<FieldType>),
}

impl FieldType {
    pub fn object(name: &str) -> Self {
        FieldType::Object(name.to_string())
    }

    pub fn enumeration(name: &str) -> Self {
        FieldType::Enum(name.to_string())
    }

    pub fn list(item: FieldType) -> Self {
        FieldType::List(Box::new(item))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, FieldType::List(_))
    }

    /// Element type for lists, the type itself otherwise.
    pub fn item(&self) -> &FieldType {
        match self {
            FieldType::List(item) => item,
            other => other,
        }
    }

    pub fn object_name(&self) -> Option<&str> {
        match self.item() {
            FieldType::Object(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self.item(), FieldType::Object(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    Uuid,
    Increment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Date,
    Time,
    DateTime,
}

/// Timestamps maintained by the mutation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateMode {
    CreateDate,
    UpdateDate,
    DeleteDate,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnOptions {
    pub name: Option<String>,
    pub primary: bool,
    pub generated: Option<Generation>,
    pub default: Option<Value>,
    pub length: Option<usize>,
    pub unique: bool,
    pub column_type: Option<ColumnType>,
    pub date_mode: Option<DateMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    ManyToOne,
    OneToMany,
    OneToOne,
    ManyToMany,
}

impl RelationKind {
    pub fn is_to_many(&self) -> bool {
        matches!(self, RelationKind::OneToMany | RelationKind::ManyToMany)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Loading {
    #[default]
    Unset,
    Lazy,
    Eager,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationOptions {
    pub kind: RelationKind,
    pub inverse: Option<String>,
    pub loading: Loading,
    /// Side holding the join column (one-to-one) or join table (many-to-many).
    pub owner: bool,
    pub join_column: Option<String>,
    pub join_table: Option<String>,
}

impl RelationOptions {
    fn new(kind: RelationKind, inverse: Option<&str>) -> Self {
        Self {
            kind,
            inverse: inverse.map(str::to_string),
            loading: Loading::Unset,
            owner: matches!(kind, RelationKind::ManyToOne),
            join_column: None,
            join_table: None,
        }
    }
}

#[derive(Clone)]
pub struct FieldDescriptor {
    pub name: String,
    type_fn: TypeThunk,
    resolved: OnceCell<FieldType>,
    pub nullable: Option<bool>,
    pub float: bool,
    pub graphql: bool,
    pub resolver: Option<FieldResolver>,
    pub column: Option<ColumnOptions>,
    pub relation: Option<RelationOptions>,
}

impl FieldDescriptor {
    /// Invoke the type thunk on first use and return the cached type afterwards.
    pub fn resolve_type(&self) -> &FieldType {
        self.resolved.get_or_init(|| (self.type_fn)())
    }

    pub fn is_column(&self) -> bool {
        self.column.is_some()
    }

    pub fn is_relation(&self) -> bool {
        self.relation.is_some()
    }

    pub fn column_name(&self) -> String {
        self.column
            .as_ref()
            .and_then(|c| c.name.clone())
            .unwrap_or_else(|| self.name.clone())
    }

    /// Join column for relations whose foreign key lives on this side.
    pub fn join_column(&self) -> String {
        self.relation
            .as_ref()
            .and_then(|r| r.join_column.clone())
            .unwrap_or_else(|| format!("{}Id", self.name))
    }

    /// Value exposed to clients: the resolver output when present, the stored value otherwise.
    pub fn resolve_value(&self, record: &Record) -> OrbisResult<Value> {
        match &self.resolver {
            Some(resolver) => resolver(record),
            None => Ok(record.get(&self.name).cloned().unwrap_or(Value::Null)),
        }
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("resolved", &self.resolved.get())
            .field("nullable", &self.nullable)
            .field("float", &self.float)
            .field("graphql", &self.graphql)
            .field("resolver", &self.resolver.is_some())
            .field("column", &self.column)
            .field("relation", &self.relation)
            .finish()
    }
}

/// Builder for one declared field.
#[derive(Clone)]
pub struct FieldDefinition {
    name: String,
    type_fn: TypeThunk,
    nullable: Option<bool>,
    float: bool,
    graphql: bool,
    resolver: Option<FieldResolver>,
    column: Option<ColumnOptions>,
    relation: Option<RelationOptions>,
}

impl FieldDefinition {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self::lazy(name, move || field_type.clone())
    }

    /// Field whose type is computed on first resolution.
    pub fn lazy<F>(name: &str, type_fn: F) -> Self
    where
        F: Fn() -> FieldType + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            type_fn: Arc::new(type_fn),
            nullable: None,
            float: false,
            graphql: true,
            resolver: None,
            column: None,
            relation: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    pub fn float(mut self) -> Self {
        self.float = true;
        self
    }

    /// Keep the field out of the generated external schema.
    pub fn hidden(mut self) -> Self {
        self.graphql = false;
        self
    }

    pub fn resolve<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Record) -> OrbisResult<Value> + Send + Sync + 'static,
    {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    fn column_mut(&mut self) -> &mut ColumnOptions {
        self.column.get_or_insert_with(ColumnOptions::default)
    }

    /// Store the field in a column of the owning table.
    pub fn column(mut self) -> Self {
        self.column_mut();
        self
    }

    pub fn column_named(mut self, name: &str) -> Self {
        self.column_mut().name = Some(name.to_string());
        self
    }

    pub fn primary(mut self) -> Self {
        self.column_mut().primary = true;
        self
    }

    pub fn generated(mut self, generation: Generation) -> Self {
        self.column_mut().generated = Some(generation);
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.column_mut().default = Some(value);
        self
    }

    pub fn length(mut self, length: usize) -> Self {
        self.column_mut().length = Some(length);
        self
    }

    pub fn unique(mut self) -> Self {
        self.column_mut().unique = true;
        self
    }

    pub fn column_type(mut self, column_type: ColumnType) -> Self {
        self.column_mut().column_type = Some(column_type);
        self
    }

    pub fn create_date(mut self) -> Self {
        let column = self.column_mut();
        column.date_mode = Some(DateMode::CreateDate);
        column.column_type.get_or_insert(ColumnType::DateTime);
        self
    }

    pub fn update_date(mut self) -> Self {
        let column = self.column_mut();
        column.date_mode = Some(DateMode::UpdateDate);
        column.column_type.get_or_insert(ColumnType::DateTime);
        self
    }

    pub fn delete_date(mut self) -> Self {
        let column = self.column_mut();
        column.date_mode = Some(DateMode::DeleteDate);
        column.column_type.get_or_insert(ColumnType::DateTime);
        self
    }

    pub fn many_to_one(mut self, inverse: &str) -> Self {
        self.relation = Some(RelationOptions::new(RelationKind::ManyToOne, Some(inverse)));
        self
    }

    pub fn one_to_many(mut self, inverse: &str) -> Self {
        self.relation = Some(RelationOptions::new(RelationKind::OneToMany, Some(inverse)));
        self
    }

    pub fn one_to_one(mut self, inverse: Option<&str>) -> Self {
        self.relation = Some(RelationOptions::new(RelationKind::OneToOne, inverse));
        self
    }

    pub fn many_to_many(mut self, inverse: Option<&str>) -> Self {
        self.relation = Some(RelationOptions::new(RelationKind::ManyToMany, inverse));
        self
    }

    fn relation_mut(&mut self) -> Option<&mut RelationOptions> {
        self.relation.as_mut()
    }

    pub fn lazy_loaded(mut self) -> Self {
        if let Some(relation) = self.relation_mut() {
            relation.loading = Loading::Lazy;
        }
        self
    }

    pub fn eager(mut self) -> Self {
        if let Some(relation) = self.relation_mut() {
            relation.loading = Loading::Eager;
        }
        self
    }

    /// Mark this side as holding the join column or join table.
    pub fn owner(mut self) -> Self {
        if let Some(relation) = self.relation_mut() {
            relation.owner = true;
        }
        self
    }

    pub fn join_column(mut self, column: &str) -> Self {
        if let Some(relation) = self.relation_mut() {
            relation.join_column = Some(column.to_string());
            relation.owner = true;
        }
        self
    }

    pub fn join_table(mut self, table: &str) -> Self {
        if let Some(relation) = self.relation_mut() {
            relation.join_table = Some(table.to_string());
            relation.owner = true;
        }
        self
    }

    pub fn build(self, type_name: &str) -> OrbisResult<FieldDescriptor> {
        let path = format!("{}.{}", type_name, self.name);

        if !is_identifier(&self.name) {
            return Err(OrbisError::InvalidField(format!("{} is not a valid field name", path)));
        }
        if self.column.is_some() && self.relation.is_some() {
            return Err(OrbisError::InvalidField(format!(
                "{} can't be both a column and a relation",
                path
            )));
        }
        if let Some(relation) = &self.relation {
            if relation.loading == Loading::Unset {
                return Err(OrbisError::InvalidRelation(format!(
                    "{} must be declared lazy or eager",
                    path
                )));
            }
        }

        Ok(FieldDescriptor {
            name: self.name,
            type_fn: self.type_fn,
            resolved: OnceCell::new(),
            nullable: self.nullable,
            float: self.float,
            graphql: self.graphql,
            resolver: self.resolver,
            column: self.column,
            relation: self.relation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_type_resolution_is_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let field = FieldDefinition::lazy("user", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            FieldType::object("User")
        })
        .many_to_one("providers")
        .lazy_loaded()
        .build("Provider")
        .unwrap();

        let first = field.resolve_type();
        let second = field.resolve_type();

        assert!(std::ptr::eq(first, second));
        assert_eq!(first, &FieldType::object("User"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_column_and_relation_are_exclusive() {
        let result = FieldDefinition::new("user", FieldType::object("User"))
            .column()
            .many_to_one("providers")
            .lazy_loaded()
            .build("Provider");
        assert!(matches!(result, Err(OrbisError::InvalidField(_))));
    }

    #[test]
    fn test_relation_requires_loading_strategy() {
        let result = FieldDefinition::new("user", FieldType::object("User"))
            .many_to_one("providers")
            .build("Provider");
        assert!(matches!(result, Err(OrbisError::InvalidRelation(_))));

        let eager = FieldDefinition::new("user", FieldType::object("User"))
            .many_to_one("providers")
            .eager()
            .build("Provider")
            .unwrap();
        assert_eq!(eager.relation.unwrap().loading, Loading::Eager);
    }

    #[test]
    fn test_column_naming() {
        let field = FieldDefinition::new("email", FieldType::String)
            .column_named("email_address")
            .build("User")
            .unwrap();
        assert_eq!(field.column_name(), "email_address");

        let relation = FieldDefinition::new("author", FieldType::object("User"))
            .many_to_one("posts")
            .lazy_loaded()
            .build("Post")
            .unwrap();
        assert_eq!(relation.join_column(), "authorId");
        assert!(relation.relation.unwrap().owner);
    }

    #[test]
    fn test_resolver_overrides_stored_value() {
        let field = FieldDefinition::new("displayName", FieldType::String)
            .resolve(|record| {
                Ok(Value::from(format!(
                    "@{}",
                    record.get("name").and_then(Value::as_str).unwrap_or_default()
                )))
            })
            .build("User")
            .unwrap();

        let mut record = Record::new();
        record.insert("name".into(), Value::from("ada"));
        assert_eq!(field.resolve_value(&record).unwrap(), Value::from("@ada"));
    }
}
