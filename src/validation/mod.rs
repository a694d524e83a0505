// Validation schemas - object-shape rules checked before rows are written

mod generate;

pub use generate::generate_schemas;

use chrono::{DateTime, NaiveDate, NaiveTime};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// One failed rule, addressed by its dotted field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self
            .violations
            .iter()
            .map(|v| format!("{} {}", v.path, v.message))
            .collect();
        write!(f, "{}", messages.join(", "))
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum RuleKind {
    Boolean,
    Number,
    String,
    Date,
    OneOf(Vec<String>),
    Object(ObjectSchema),
    Array(Box<FieldRule>),
}

/// Constraints on a single value.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub kind: RuleKind,
    pub required: bool,
    pub nullable: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<Regex>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl FieldRule {
    fn of(kind: RuleKind) -> Self {
        Self {
            kind,
            required: false,
            nullable: false,
            min_length: None,
            max_length: None,
            pattern: None,
            min: None,
            max: None,
        }
    }

    pub fn boolean() -> Self {
        Self::of(RuleKind::Boolean)
    }

    pub fn number() -> Self {
        Self::of(RuleKind::Number)
    }

    pub fn string() -> Self {
        Self::of(RuleKind::String)
    }

    pub fn date() -> Self {
        Self::of(RuleKind::Date)
    }

    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::of(RuleKind::OneOf(values.into_iter().map(Into::into).collect()))
    }

    pub fn object(schema: ObjectSchema) -> Self {
        Self::of(RuleKind::Object(schema))
    }

    pub fn array(item: FieldRule) -> Self {
        Self::of(RuleKind::Array(Box::new(item)))
    }

    /// Missing and null values fail.
    pub fn required(mut self) -> Self {
        self.required = true;
        self.nullable = false;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self.required = false;
        self
    }

    pub fn min_length(mut self, length: usize) -> Self {
        self.min_length = Some(length);
        self
    }

    pub fn max_length(mut self, length: usize) -> Self {
        self.max_length = Some(length);
        self
    }

    pub fn matches(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    fn check(&self, path: &str, value: Option<&Value>, violations: &mut Vec<Violation>) {
        let value = match value {
            None | Some(Value::Null) => {
                if self.required {
                    fail(violations, path, "is a required field".to_string());
                } else if value.is_some() && !self.nullable {
                    fail(violations, path, "cannot be null".to_string());
                }
                return;
            }
            Some(value) => value,
        };

        match (&self.kind, value) {
            (RuleKind::Boolean, Value::Bool(_)) => {}
            (RuleKind::Number, Value::Number(n)) => {
                let n = n.as_f64().unwrap_or_default();
                if let Some(min) = self.min.filter(|min| n < *min) {
                    fail(violations, path, format!("must be greater than or equal to {}", min));
                }
                if let Some(max) = self.max.filter(|max| n > *max) {
                    fail(violations, path, format!("must be less than or equal to {}", max));
                }
            }
            (RuleKind::String, Value::String(s)) => {
                let length = s.chars().count();
                if let Some(min) = self.min_length.filter(|min| length < *min) {
                    fail(violations, path, format!("must be at least {} characters", min));
                }
                if let Some(max) = self.max_length.filter(|max| length > *max) {
                    fail(violations, path, format!("must be at most {} characters", max));
                }
                if let Some(pattern) = self.pattern.as_ref().filter(|p| !p.is_match(s)) {
                    fail(violations, path, format!("must match the following: \"{}\"", pattern.as_str()));
                }
            }
            (RuleKind::Date, Value::String(s)) if is_date(s) => {}
            (RuleKind::OneOf(values), Value::String(s)) => {
                if !values.contains(s) {
                    fail(violations, path, format!("must be one of the following values: {}", values.join(", ")));
                }
            }
            (RuleKind::Object(schema), Value::Object(object)) => {
                schema.collect(path, object, violations);
            }
            (RuleKind::Array(item), Value::Array(items)) => {
                for (i, value) in items.iter().enumerate() {
                    item.check(&format!("{}[{}]", path, i), Some(value), violations);
                }
            }
            (kind, _) => fail(violations, path, format!("must be a `{}` type", kind_name(kind))),
        }
    }
}

fn fail(violations: &mut Vec<Violation>, path: &str, message: String) {
    violations.push(Violation {
        path: path.to_string(),
        message,
    });
}

fn kind_name(kind: &RuleKind) -> &'static str {
    match kind {
        RuleKind::Boolean => "boolean",
        RuleKind::Number => "number",
        RuleKind::String | RuleKind::OneOf(_) => "string",
        RuleKind::Date => "date",
        RuleKind::Object(_) => "object",
        RuleKind::Array(_) => "array",
    }
}

fn is_date(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
        || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
        || NaiveTime::parse_from_str(value, "%H:%M:%S").is_ok()
}

/// Named field rules of one object. Keys without a rule are not checked.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    fields: BTreeMap<String, FieldRule>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, rule: FieldRule) -> Self {
        self.fields.insert(name.to_string(), rule);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldRule> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldRule)> {
        self.fields.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Rules of `other` added to this schema, replacing rules with the same name.
    pub fn concat(mut self, other: &ObjectSchema) -> Self {
        for (name, rule) in &other.fields {
            self.fields.insert(name.clone(), rule.clone());
        }
        self
    }

    /// Adjust an existing rule in place; unknown names are ignored.
    pub fn update<F>(mut self, name: &str, f: F) -> Self
    where
        F: FnOnce(FieldRule) -> FieldRule,
    {
        if let Some(rule) = self.fields.remove(name) {
            self.fields.insert(name.to_string(), f(rule));
        }
        self
    }

    pub fn validate(&self, value: &Map<String, Value>) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        self.collect("", value, &mut violations);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { violations })
        }
    }

    fn collect(&self, prefix: &str, value: &Map<String, Value>, violations: &mut Vec<Violation>) {
        for (name, rule) in &self.fields {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", prefix, name)
            };
            rule.check(&path, value.get(name), violations);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_schema() -> ObjectSchema {
        ObjectSchema::new()
            .field("name", FieldRule::string().max_length(5).required())
            .field("age", FieldRule::number().range(0.0, 150.0).nullable())
            .field("role", FieldRule::one_of(["ADMIN", "USER"]).required())
            .field(
                "address",
                FieldRule::object(ObjectSchema::new().field("city", FieldRule::string().required()))
                    .nullable(),
            )
            .field("tags", FieldRule::array(FieldRule::string().required()).nullable())
    }

    fn validate(value: Value) -> Result<(), ValidationError> {
        user_schema().validate(value.as_object().unwrap())
    }

    #[test]
    fn test_valid_object() {
        validate(json!({"name": "Ada", "role": "USER", "age": null, "extra": 1})).unwrap();
        validate(json!({"name": "Ada", "role": "ADMIN", "address": {"city": "Ghent"}, "tags": ["a"]}))
            .unwrap();
    }

    #[test]
    fn test_required_and_length() {
        let err = validate(json!({"name": "Grace Hopper"})).unwrap_err();
        let paths: Vec<&str> = err.violations.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, vec!["name", "role"]);
        assert!(err.to_string().contains("at most 5 characters"));
    }

    #[test]
    fn test_nested_paths() {
        let err = validate(json!({
            "name": "Ada", "role": "ROOT", "age": 200, "address": {}, "tags": [1]
        }))
        .unwrap_err();
        let paths: Vec<&str> = err.violations.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, vec!["address.city", "age", "role", "tags[0]"]);
    }

    #[test]
    fn test_dates_and_patterns() {
        let schema = ObjectSchema::new()
            .field("at", FieldRule::date().required())
            .field("code", FieldRule::string().matches(Regex::new("^[A-Z]{3}$").unwrap()));
        schema
            .validate(json!({"at": "2024-02-01T10:00:00Z", "code": "ABC"}).as_object().unwrap())
            .unwrap();
        assert!(schema
            .validate(json!({"at": "yesterday", "code": "abc"}).as_object().unwrap())
            .is_err());
    }
}
