//! Async access to a [`Database`].
//!
//! `rusqlite::Connection` is blocking and not `Sync`, so the handle lives
//! behind a mutex and every query runs on tokio's blocking pool.

use std::sync::{Arc, Mutex};

use crate::database::Database;
use crate::error::{Result, StoreError};

/// Cloneable, `Send + Sync` handle to one [`Database`].
#[derive(Clone)]
pub struct SharedDatabase {
    inner: Arc<Mutex<Database>>,
}

impl SharedDatabase {
    pub fn new(db: Database) -> Self {
        Self {
            inner: Arc::new(Mutex::new(db)),
        }
    }

    /// Run `f` against the database on the blocking thread pool.
    pub async fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let db = inner.lock().map_err(|_| StoreError::Poisoned)?;
            f(&db)
        })
        .await
        .map_err(|e| StoreError::TaskJoin(e.to_string()))?
    }
}

impl std::fmt::Debug for SharedDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedDatabase").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn call_runs_on_blocking_pool() {
        let db = SharedDatabase::new(Database::open_in_memory().unwrap());
        let id = db.call(|db| db.insert_user("alice")).await.unwrap();

        let clone = db.clone();
        let name = clone.call(move |db| db.get_username(id)).await.unwrap();
        assert_eq!(name.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn errors_propagate() {
        let db = SharedDatabase::new(Database::open_in_memory().unwrap());
        let result = db
            .call(|db| db.conn().execute("INSERT INTO nope VALUES (1)", []).map_err(Into::into))
            .await;
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
    }
}
