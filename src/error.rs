use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

use crate::validation::ValidationError;

#[derive(Debug)]
pub enum OrbisError {
    // Registry errors, raised while declarations are processed
    DuplicateType(String),
    DuplicateField(String),
    DuplicateEntity(String),
    DuplicateInterface(String),
    DuplicateObject(String),
    DuplicateSchema(String),
    InvalidField(String),
    InvalidRelation(String),
    UnknownType(String),
    UnknownEntity(String),
    // Caller-supplied argument errors
    UnknownField(String),
    NotARelation(String),
    UnsupportedOperator(String),
    InvalidFilterComposition(String),
    InvalidOrderDirection(String),
    InvalidOrderPath(String),
    InvalidRelationWrite(String),
    NotFound(String),
    BadRequest(String),
    Validation(ValidationError),
    // Session and storage errors
    NestedTransaction,
    Database(String),
    Configuration(String),
    Internal(String),
}

impl OrbisError {
    /// Errors caused by malformed caller arguments rather than by the
    /// registry or the storage engine.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            OrbisError::UnknownField(_)
                | OrbisError::NotARelation(_)
                | OrbisError::UnsupportedOperator(_)
                | OrbisError::InvalidFilterComposition(_)
                | OrbisError::InvalidOrderDirection(_)
                | OrbisError::InvalidOrderPath(_)
                | OrbisError::InvalidRelationWrite(_)
                | OrbisError::BadRequest(_)
                | OrbisError::Validation(_)
        )
    }
}

impl fmt::Display for OrbisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrbisError::DuplicateType(name) => write!(f, "Type {} already exists", name),
            OrbisError::DuplicateField(name) => write!(f, "Field {} already exists", name),
            OrbisError::DuplicateEntity(name) => write!(f, "Entity {} already exists", name),
            OrbisError::DuplicateInterface(name) => write!(f, "Interface {} already exists", name),
            OrbisError::DuplicateObject(name) => write!(f, "Object {} already exists", name),
            OrbisError::DuplicateSchema(name) => write!(f, "Schema {} already exists", name),
            OrbisError::InvalidField(msg) => write!(f, "Invalid field: {}", msg),
            OrbisError::InvalidRelation(msg) => write!(f, "Invalid relation: {}", msg),
            OrbisError::UnknownType(name) => write!(f, "Unknown type {}", name),
            OrbisError::UnknownEntity(name) => write!(f, "Unknown entity {}", name),
            OrbisError::UnknownField(name) => write!(f, "Unknown field {}", name),
            OrbisError::NotARelation(name) => write!(f, "Field {} is not a relation", name),
            OrbisError::UnsupportedOperator(op) => write!(f, "Unsupported where operator {}", op),
            OrbisError::InvalidFilterComposition(msg) => {
                write!(f, "Invalid where argument: {}", msg)
            }
            OrbisError::InvalidOrderDirection(dir) => {
                write!(f, "Invalid order by argument: {}", dir)
            }
            OrbisError::InvalidOrderPath(msg) => write!(f, "Invalid order by path: {}", msg),
            OrbisError::InvalidRelationWrite(msg) => {
                write!(f, "Invalid relation argument: {}", msg)
            }
            OrbisError::NotFound(key) => write!(f, "Not found: {}", key),
            OrbisError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            OrbisError::Validation(err) => write!(f, "Validation error: {}", err),
            OrbisError::NestedTransaction => write!(f, "Transaction already active"),
            OrbisError::Database(msg) => write!(f, "Database error: {}", msg),
            OrbisError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            OrbisError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for OrbisError {}

impl IntoResponse for OrbisError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            OrbisError::NotFound(key) => (StatusCode::NOT_FOUND, key.clone()),
            OrbisError::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            err if err.is_request_error() => (StatusCode::BAD_REQUEST, err.to_string()),
            OrbisError::Database(msg) => {
                tracing::error!("Database error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            OrbisError::NestedTransaction => {
                tracing::error!("Nested transaction rejected");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            err => {
                tracing::error!("{}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for OrbisError {
    fn from(err: sqlx::Error) -> Self {
        OrbisError::Database(err.to_string())
    }
}

impl From<anyhow::Error> for OrbisError {
    fn from(err: anyhow::Error) -> Self {
        OrbisError::Internal(err.to_string())
    }
}

impl From<ValidationError> for OrbisError {
    fn from(err: ValidationError) -> Self {
        OrbisError::Validation(err)
    }
}

pub type OrbisResult<T> = Result<T, OrbisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_classification() {
        assert!(OrbisError::UnknownField("foo".into()).is_request_error());
        assert!(OrbisError::InvalidRelationWrite("x".into()).is_request_error());
        assert!(!OrbisError::NotFound("errors.notFound.user".into()).is_request_error());
        assert!(!OrbisError::Database("boom".into()).is_request_error());
    }

    #[test]
    fn test_status_mapping() {
        let response = OrbisError::NotFound("errors.notFound.user".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = OrbisError::UnsupportedOperator("like".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = OrbisError::Database("locked".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
