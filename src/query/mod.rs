// Query builder - engine-neutral SQL statements rendered to positional SQLite SQL

mod render;

pub use render::Statement;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub alias: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(alias: &str, column: &str) -> Self {
        Self {
            alias: alias.to_string(),
            column: column.to_string(),
        }
    }
}

/// A bound value with the name it was generated under.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub value: Value,
}

impl Param {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Compare {
        column: ColumnRef,
        op: CompareOp,
        param: Param,
    },
    IsNull(ColumnRef),
    IsNotNull(ColumnRef),
    /// Case-insensitive pattern match.
    Like {
        column: ColumnRef,
        param: Param,
    },
    /// Set membership; the parameter value is an array expanded at render time.
    In {
        column: ColumnRef,
        negated: bool,
        param: Param,
    },
}

impl Predicate {
    /// Conjunction, flattening the trivial cases.
    pub fn all(mut predicates: Vec<Predicate>) -> Predicate {
        if predicates.len() == 1 {
            predicates.remove(0)
        } else {
            Predicate::And(predicates)
        }
    }

    pub fn params(&self) -> Vec<&Param> {
        match self {
            Predicate::And(children) | Predicate::Or(children) => {
                children.iter().flat_map(|c| c.params()).collect()
            }
            Predicate::Compare { param, .. }
            | Predicate::Like { param, .. }
            | Predicate::In { param, .. } => vec![param],
            Predicate::IsNull(_) | Predicate::IsNotNull(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: String,
    /// Equality pairs of (joined column, existing column).
    pub on: Vec<(ColumnRef, ColumnRef)>,
    /// Joined columns that must be null for a row to match.
    pub unset: Vec<ColumnRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectExpr {
    Column(ColumnRef),
    CountDistinct(ColumnRef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: SelectExpr,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderClause {
    pub column: ColumnRef,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub table: String,
    pub alias: String,
    pub select: Vec<SelectItem>,
    pub joins: Vec<Join>,
    pub conditions: Vec<Predicate>,
    /// When set, ordering aggregates each column per group: `MIN` ascending, `MAX` descending.
    pub group_by: Vec<ColumnRef>,
    pub order_by: Vec<OrderClause>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

impl SelectQuery {
    pub fn new(table: &str, alias: &str) -> Self {
        Self {
            table: table.to_string(),
            alias: alias.to_string(),
            select: Vec::new(),
            joins: Vec::new(),
            conditions: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            skip: None,
            take: None,
        }
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        self.alias == alias || self.joins.iter().any(|j| j.alias == alias)
    }

    pub fn join(&mut self, join: Join) {
        if !self.has_alias(&join.alias) {
            self.joins.push(join);
        }
    }

    pub fn and_where(&mut self, predicate: Predicate) {
        self.conditions.push(predicate);
    }

    pub fn select_column(&mut self, column: ColumnRef, label: String) {
        self.select.push(SelectItem {
            expr: SelectExpr::Column(column),
            label,
        });
    }

    pub fn group_by(&mut self, column: ColumnRef) {
        if !self.group_by.contains(&column) {
            self.group_by.push(column);
        }
    }

    pub fn add_order_by(&mut self, column: ColumnRef, direction: Direction) {
        self.order_by.push(OrderClause { column, direction });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertQuery {
    pub table: String,
    pub values: Vec<(String, Value)>,
    pub returning: Option<String>,
    pub ignore_conflicts: bool,
}

impl InsertQuery {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            values: Vec::new(),
            returning: None,
            ignore_conflicts: false,
        }
    }

    pub fn value(mut self, column: &str, value: Value) -> Self {
        self.values.push((column.to_string(), value));
        self
    }

    pub fn returning(mut self, column: &str) -> Self {
        self.returning = Some(column.to_string());
        self
    }

    pub fn ignore_conflicts(mut self) -> Self {
        self.ignore_conflicts = true;
        self
    }
}

/// Single-table UPDATE; predicates must reference the table by its own name.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateQuery {
    pub table: String,
    pub values: Vec<(String, Value)>,
    pub conditions: Vec<Predicate>,
}

impl UpdateQuery {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            values: Vec::new(),
            conditions: Vec::new(),
        }
    }

    pub fn set(mut self, column: &str, value: Value) -> Self {
        self.values.push((column.to_string(), value));
        self
    }

    pub fn and_where(mut self, predicate: Predicate) -> Self {
        self.conditions.push(predicate);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteQuery {
    pub table: String,
    pub conditions: Vec<Predicate>,
}

impl DeleteQuery {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            conditions: Vec::new(),
        }
    }

    pub fn and_where(mut self, predicate: Predicate) -> Self {
        self.conditions.push(predicate);
        self
    }
}

/// Equality on a table-level column, for UPDATE and DELETE conditions.
pub fn column_equals(table: &str, column: &str, value: Value) -> Predicate {
    let column = ColumnRef::new(table, column);
    if value.is_null() {
        return Predicate::IsNull(column);
    }
    Predicate::Compare {
        param: Param::new(column.column.clone(), value),
        column,
        op: CompareOp::Eq,
    }
}

pub fn column_in(table: &str, column: &str, values: Vec<Value>) -> Predicate {
    Predicate::In {
        param: Param::new(column, Value::Array(values)),
        column: ColumnRef::new(table, column),
        negated: false,
    }
}
