use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::arguments::WhereArgument;
use crate::metadata::Record;
use crate::viewer::ViewerContext;

/// Row-visibility restriction computed from the caller's context.
pub type ScopeFn = Arc<dyn Fn(&ViewerContext) -> Vec<WhereArgument> + Send + Sync>;

/// Operations the schema front-end can generate for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    FindOne,
    FindMany,
    CreateOne,
    UpdateOne,
    DeleteOne,
    DeleteMany,
}

impl Operation {
    pub fn is_query(&self) -> bool {
        matches!(self, Operation::FindOne | Operation::FindMany)
    }
}

/// Explicit generation switches; operations without an entry fall through to the next level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityOperations {
    flags: BTreeMap<Operation, bool>,
}

impl EntityOperations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, operation: Operation, enabled: bool) {
        self.flags.insert(operation, enabled);
    }

    pub fn with(mut self, operation: Operation, enabled: bool) -> Self {
        self.set(operation, enabled);
        self
    }

    pub fn get(&self, operation: Operation) -> Option<bool> {
        self.flags.get(&operation).copied()
    }
}

/// Creation default: a literal, or a function of the values assembled so far.
#[derive(Clone)]
pub enum DefaultValue {
    Literal(Value),
    Computed(Arc<dyn Fn(&Record) -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        DefaultValue::Computed(Arc::new(f))
    }

    pub fn evaluate(&self, values: &Record) -> Value {
        match self {
            DefaultValue::Literal(value) => value.clone(),
            DefaultValue::Computed(f) => f(values),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Literal(value) => write!(f, "Literal({})", value),
            DefaultValue::Computed(_) => write!(f, "Computed(..)"),
        }
    }
}

#[derive(Clone)]
pub struct EntityDescriptor {
    pub type_name: String,
    pub table: String,
    pub singular_name: String,
    pub plural_name: String,
    pub primary_key: String,
    pub columns: Vec<String>,
    pub relations: Vec<String>,
    pub operations: EntityOperations,
    pub create: BTreeMap<String, DefaultValue>,
    pub scope: Option<ScopeFn>,
}

impl EntityDescriptor {
    pub fn is_column(&self, field: &str) -> bool {
        self.columns.iter().any(|c| c == field)
    }

    pub fn is_relation(&self, field: &str) -> bool {
        self.relations.iter().any(|r| r == field)
    }

    /// Scope filters for the caller, with empty trees dropped.
    pub fn scope_filters(&self, context: &ViewerContext) -> Vec<WhereArgument> {
        match &self.scope {
            Some(scope) => scope(context).into_iter().filter(|w| !w.is_empty()).collect(),
            None => Vec::new(),
        }
    }

    pub fn not_found_key(&self) -> String {
        format!("errors.notFound.{}", self.singular_name)
    }
}

impl fmt::Debug for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("type_name", &self.type_name)
            .field("table", &self.table)
            .field("singular_name", &self.singular_name)
            .field("plural_name", &self.plural_name)
            .field("primary_key", &self.primary_key)
            .field("columns", &self.columns)
            .field("relations", &self.relations)
            .field("operations", &self.operations)
            .field("create", &self.create)
            .field("scope", &self.scope.is_some())
            .finish()
    }
}
