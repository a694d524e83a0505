// Session - per-request handle holding at most one active transaction
// Every engine statement is routed through the active transaction when there is one

use std::future::Future;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{OrbisError, OrbisResult};
use crate::metadata::OrbisMetadata;
use crate::orbis::Orbis;
use crate::query::Statement;
use crate::storage::{Row, StorageTransaction};

pub struct Session<'o> {
    orbis: &'o Orbis,
    current: Mutex<Option<Box<dyn StorageTransaction>>>,
}

impl<'o> Session<'o> {
    pub fn new(orbis: &'o Orbis) -> Self {
        Self {
            orbis,
            current: Mutex::new(None),
        }
    }

    pub fn orbis(&self) -> &'o Orbis {
        self.orbis
    }

    pub fn metadata(&self) -> &'o OrbisMetadata {
        self.orbis.metadata()
    }

    pub async fn in_transaction(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// Run `operation` inside a transaction.
    ///
    /// If one is already active the call fails with `NestedTransaction` when
    /// `error_on_active` is set, otherwise the operation joins it and runs inline.
    /// A fresh transaction commits on success and rolls back on error; the
    /// session slot is restored to its previous value in both cases.
    pub async fn transaction<F, Fut, R>(&self, error_on_active: bool, operation: F) -> OrbisResult<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = OrbisResult<R>>,
    {
        let started = {
            let mut current = self.current.lock().await;
            if current.is_some() {
                if error_on_active {
                    return Err(OrbisError::NestedTransaction);
                }
                false
            } else {
                *current = Some(self.orbis.storage().begin().await?);
                trace!("transaction started");
                true
            }
        };

        if !started {
            return operation().await;
        }

        let result = operation().await;
        let tx = self.current.lock().await.take();

        match (result, tx) {
            (Ok(value), Some(tx)) => {
                tx.commit().await?;
                trace!("transaction committed");
                Ok(value)
            }
            (Err(err), Some(tx)) => {
                warn!(error = %err, "rolling back transaction");
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
            (result, None) => result,
        }
    }

    pub(crate) async fn fetch_all(&self, statement: Statement) -> OrbisResult<Vec<Row>> {
        debug!(sql = %statement.sql, params = statement.params.len(), "query");
        let mut current = self.current.lock().await;
        match current.as_mut() {
            Some(tx) => tx.fetch_all(&statement).await,
            None => {
                drop(current);
                self.orbis.storage().fetch_all(&statement).await
            }
        }
    }

    pub(crate) async fn execute(&self, statement: Statement) -> OrbisResult<u64> {
        debug!(sql = %statement.sql, params = statement.params.len(), "execute");
        let mut current = self.current.lock().await;
        match current.as_mut() {
            Some(tx) => tx.execute(&statement).await,
            None => {
                drop(current);
                self.orbis.storage().execute(&statement).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrbisOptions;
    use crate::storage::SqliteStorage;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn orbis(dir: &std::path::Path) -> Orbis {
        let storage = SqliteStorage::open_file(&dir.join("session.db")).await.unwrap();
        storage
            .execute_raw("CREATE TABLE item (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .await
            .unwrap();
        Orbis::new(Arc::new(storage), OrbisOptions::default()).unwrap()
    }

    fn insert(name: &str) -> Statement {
        Statement {
            sql: "INSERT INTO item (name) VALUES (?)".into(),
            params: vec![json!(name)],
        }
    }

    async fn count(session: &Session<'_>) -> usize {
        session
            .fetch_all(Statement::new("SELECT id FROM item"))
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn test_commit_on_success() {
        let dir = tempdir().unwrap();
        let orbis = orbis(dir.path()).await;
        let session = orbis.session();

        session
            .transaction(true, || async {
                session.execute(insert("pen")).await?;
                assert!(session.in_transaction().await);
                Ok::<_, OrbisError>(())
            })
            .await
            .unwrap();

        assert!(!session.in_transaction().await);
        assert_eq!(count(&session).await, 1);
    }

    #[tokio::test]
    async fn test_rollback_on_error() {
        let dir = tempdir().unwrap();
        let orbis = orbis(dir.path()).await;
        let session = orbis.session();

        let result: OrbisResult<()> = session
            .transaction(true, || async {
                session.execute(insert("pen")).await?;
                Err(OrbisError::Internal("boom".into()))
            })
            .await;

        assert!(matches!(result, Err(OrbisError::Internal(_))));
        assert!(!session.in_transaction().await);
        assert_eq!(count(&session).await, 0);
    }

    #[tokio::test]
    async fn test_nested_transaction() {
        let dir = tempdir().unwrap();
        let orbis = orbis(dir.path()).await;
        let session = orbis.session();

        let nested = session
            .transaction(true, || async {
                session
                    .transaction(true, || async { Ok::<_, OrbisError>(()) })
                    .await
            })
            .await;
        assert!(matches!(nested, Err(OrbisError::NestedTransaction)));

        session
            .transaction(true, || async {
                session.execute(insert("pen")).await?;
                session
                    .transaction(false, || async {
                        session.execute(insert("cup")).await?;
                        Ok::<_, OrbisError>(())
                    })
                    .await
            })
            .await
            .unwrap();
        assert_eq!(count(&session).await, 2);
    }
}
