use serde_json::Value;

use super::{
    ColumnRef, DeleteQuery, Direction, InsertQuery, Join, JoinKind, Predicate, SelectExpr,
    SelectQuery, UpdateQuery,
};
use crate::util::quote_ident;

/// Rendered SQL with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

#[derive(Default)]
struct SqlWriter {
    sql: String,
    params: Vec<Value>,
}

impl SqlWriter {
    fn push(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }

    fn bind(&mut self, value: Value) {
        self.sql.push('?');
        self.params.push(value);
    }

    fn column(&mut self, column: &ColumnRef) {
        let rendered = format!("{}.{}", quote_ident(&column.alias), quote_ident(&column.column));
        self.push(&rendered);
    }

    fn predicate(&mut self, predicate: &Predicate) {
        match predicate {
            Predicate::And(children) => self.compound(children, " AND "),
            Predicate::Or(children) => self.compound(children, " OR "),
            Predicate::Compare { column, op, param } => {
                self.column(column);
                self.push(&format!(" {} ", op.as_sql()));
                self.bind(param.value.clone());
            }
            Predicate::IsNull(column) => {
                self.column(column);
                self.push(" IS NULL");
            }
            Predicate::IsNotNull(column) => {
                self.column(column);
                self.push(" IS NOT NULL");
            }
            Predicate::Like { column, param } => {
                self.push("LOWER(");
                self.column(column);
                self.push(") LIKE LOWER(");
                self.bind(param.value.clone());
                self.push(")");
            }
            Predicate::In {
                column,
                negated,
                param,
            } => {
                let values = match &param.value {
                    Value::Array(values) => values.clone(),
                    other => vec![other.clone()],
                };
                if values.is_empty() {
                    self.push(if *negated { "1 = 1" } else { "1 = 0" });
                    return;
                }
                self.column(column);
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                for (i, value) in values.into_iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.bind(value);
                }
                self.push(")");
            }
        }
    }

    fn compound(&mut self, children: &[Predicate], separator: &str) {
        if children.is_empty() {
            self.push("1 = 1");
            return;
        }
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                self.push(separator);
            }
            self.push("(");
            self.predicate(child);
            self.push(")");
        }
    }

    fn conditions(&mut self, conditions: &[Predicate]) {
        if conditions.is_empty() {
            return;
        }
        self.push(" WHERE ");
        self.compound(conditions, " AND ");
    }

    fn join(&mut self, join: &Join) {
        self.push(match join.kind {
            JoinKind::Inner => " INNER JOIN ",
            JoinKind::Left => " LEFT JOIN ",
        });
        self.push(&format!("{} {} ON ", quote_ident(&join.table), quote_ident(&join.alias)));
        for (i, (left, right)) in join.on.iter().enumerate() {
            if i > 0 {
                self.push(" AND ");
            }
            self.column(left);
            self.push(" = ");
            self.column(right);
        }
        for column in &join.unset {
            self.push(" AND ");
            self.column(column);
            self.push(" IS NULL");
        }
    }

    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

impl SelectQuery {
    pub fn to_statement(&self) -> Statement {
        let mut w = SqlWriter::default();
        w.push("SELECT ");

        if self.select.is_empty() {
            w.push(&format!("{}.*", quote_ident(&self.alias)));
        }
        for (i, item) in self.select.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            match &item.expr {
                SelectExpr::Column(column) => w.column(column),
                SelectExpr::CountDistinct(column) => {
                    w.push("COUNT(DISTINCT ");
                    w.column(column);
                    w.push(")");
                }
            }
            w.push(&format!(" AS {}", quote_ident(&item.label)));
        }

        w.push(&format!(" FROM {} {}", quote_ident(&self.table), quote_ident(&self.alias)));
        for join in &self.joins {
            w.join(join);
        }
        w.conditions(&self.conditions);

        if !self.group_by.is_empty() {
            w.push(" GROUP BY ");
            for (i, column) in self.group_by.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.column(column);
            }
        }

        if !self.order_by.is_empty() {
            w.push(" ORDER BY ");
            for (i, clause) in self.order_by.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                if self.group_by.is_empty() {
                    w.column(&clause.column);
                } else {
                    w.push(match clause.direction {
                        Direction::Asc => "MIN(",
                        Direction::Desc => "MAX(",
                    });
                    w.column(&clause.column);
                    w.push(")");
                }
                w.push(&format!(" {}", clause.direction.as_sql()));
            }
        }

        match (self.take, self.skip) {
            (Some(take), Some(skip)) => w.push(&format!(" LIMIT {} OFFSET {}", take, skip)),
            (Some(take), None) => w.push(&format!(" LIMIT {}", take)),
            (None, Some(skip)) => w.push(&format!(" LIMIT -1 OFFSET {}", skip)),
            (None, None) => {}
        }

        w.finish()
    }
}

impl InsertQuery {
    pub fn to_statement(&self) -> Statement {
        let mut w = SqlWriter::default();
        w.push(&format!("INSERT INTO {}", quote_ident(&self.table)));

        if self.values.is_empty() {
            w.push(" DEFAULT VALUES");
        } else {
            let columns: Vec<String> = self.values.iter().map(|(c, _)| quote_ident(c)).collect();
            w.push(&format!(" ({}) VALUES (", columns.join(", ")));
            for (i, (_, value)) in self.values.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.bind(value.clone());
            }
            w.push(")");
        }

        if self.ignore_conflicts {
            w.push(" ON CONFLICT DO NOTHING");
        }
        if let Some(returning) = &self.returning {
            w.push(&format!(" RETURNING {}", quote_ident(returning)));
        }
        w.finish()
    }
}

impl UpdateQuery {
    pub fn to_statement(&self) -> Statement {
        let mut w = SqlWriter::default();
        w.push(&format!("UPDATE {} SET ", quote_ident(&self.table)));
        for (i, (column, value)) in self.values.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push(&format!("{} = ", quote_ident(column)));
            w.bind(value.clone());
        }
        w.conditions(&self.conditions);
        w.finish()
    }
}

impl DeleteQuery {
    pub fn to_statement(&self) -> Statement {
        let mut w = SqlWriter::default();
        w.push(&format!("DELETE FROM {}", quote_ident(&self.table)));
        w.conditions(&self.conditions);
        w.finish()
    }
}
