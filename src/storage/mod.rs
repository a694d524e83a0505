// Storage interface - the relational engine the query and mutation engines run against

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;

use crate::error::OrbisResult;
use crate::metadata::Record;
use crate::query::Statement;

/// A decoded result row keyed by column label.
pub type Row = Record;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn begin(&self) -> OrbisResult<Box<dyn StorageTransaction>>;

    async fn fetch_all(&self, statement: &Statement) -> OrbisResult<Vec<Row>>;

    /// Run a write and return the number of affected rows.
    async fn execute(&self, statement: &Statement) -> OrbisResult<u64>;
}

/// An open transaction. Dropping it without commit rolls it back.
#[async_trait]
pub trait StorageTransaction: Send {
    async fn fetch_all(&mut self, statement: &Statement) -> OrbisResult<Vec<Row>>;

    async fn execute(&mut self, statement: &Statement) -> OrbisResult<u64>;

    async fn commit(self: Box<Self>) -> OrbisResult<()>;

    async fn rollback(self: Box<Self>) -> OrbisResult<()>;
}
