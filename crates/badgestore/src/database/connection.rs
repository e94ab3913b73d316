/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Low-level database handle supporting both PostgreSQL and SQLite.
//!
//! [`Database`] wraps a `deadpool-diesel` pool holding exactly one
//! connection. It knows how to probe, tune, checkpoint, migrate and close
//! that connection, and how to run a blocking diesel closure on it. It has
//! no notion of connection *state*; that belongs to
//! [`ConnectionManager`](crate::database::ConnectionManager), which is the
//! only component that should hold a `Database`.
//!
//! # Example
//!
//! ```rust,ignore
//! use badgestore::database::Database;
//!
//! let db = Database::new("sqlite:///var/lib/badges/badges.db")?;
//! db.ping().await?;
//! ```

mod backend;

pub use backend::{AnyPool, BackendType};

use deadpool_diesel::postgres::{Manager as PgManager, Pool as PgPool, Runtime as PgRuntime};
use deadpool_diesel::sqlite::{
    Manager as SqliteManager, Pool as SqlitePool, Runtime as SqliteRuntime,
};
use diesel::connection::SimpleConnection;
use diesel::{PgConnection, RunQueryDsl, SqliteConnection};
use tracing::{debug, info};

use crate::database::tuning::{apply_settings, ApplicationResult, TuningSetting};
use crate::error::{DatabaseError, TuningError};

/// Number of connections held by the pool.
const POOL_SIZE: usize = 1;

/// Represents the single database handle.
///
/// `Database` is `Clone`; clones share the same underlying pool, so closing
/// one closes all of them.
#[derive(Clone, Debug)]
pub struct Database {
    /// The connection pool (PostgreSQL or SQLite)
    pool: AnyPool,
    /// The detected backend type
    backend: BackendType,
}

impl Database {
    /// Creates the pool with automatic backend detection.
    ///
    /// No connection is opened here; the first probe establishes it.
    pub fn new(connection_string: &str) -> Result<Self, DatabaseError> {
        let backend = BackendType::from_url(connection_string)?;

        let pool = match backend {
            BackendType::Postgres => {
                let manager = PgManager::new(connection_string, PgRuntime::Tokio1);
                let pool = PgPool::builder(manager)
                    .max_size(POOL_SIZE)
                    .build()
                    .map_err(|e| {
                        DatabaseError::Pool(format!("Failed to create PostgreSQL pool: {}", e))
                    })?;
                AnyPool::Postgres(pool)
            }
            BackendType::Sqlite => {
                let connection_url = Self::build_sqlite_url(connection_string);
                let manager = SqliteManager::new(connection_url, SqliteRuntime::Tokio1);
                let pool = SqlitePool::builder(manager)
                    .max_size(POOL_SIZE)
                    .build()
                    .map_err(|e| {
                        DatabaseError::Pool(format!("Failed to create SQLite pool: {}", e))
                    })?;
                AnyPool::Sqlite(pool)
            }
        };

        info!(backend = %backend, "Database pool initialized (size: {})", POOL_SIZE);
        Ok(Self { pool, backend })
    }

    /// Returns the detected backend type.
    pub fn backend(&self) -> BackendType {
        self.backend
    }

    /// Returns a clone of the connection pool.
    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    /// Builds a SQLite connection URL.
    fn build_sqlite_url(connection_string: &str) -> String {
        if let Some(path) = connection_string.strip_prefix("sqlite://") {
            path.to_string()
        } else {
            connection_string.to_string()
        }
    }

    /// Runs `f` on the SQLite connection.
    pub async fn interact_sqlite<F, R>(&self, f: F) -> Result<R, DatabaseError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<R, DatabaseError> + Send + 'static,
        R: Send + 'static,
    {
        let pool = self.pool.as_sqlite().ok_or(DatabaseError::BackendMismatch {
            expected: BackendType::Sqlite,
            actual: self.backend,
        })?;
        let conn = pool.get().await?;
        conn.interact(f).await?
    }

    /// Runs `f` on the PostgreSQL connection.
    pub async fn interact_postgres<F, R>(&self, f: F) -> Result<R, DatabaseError>
    where
        F: FnOnce(&mut PgConnection) -> Result<R, DatabaseError> + Send + 'static,
        R: Send + 'static,
    {
        let pool = self.pool.as_postgres().ok_or(DatabaseError::BackendMismatch {
            expected: BackendType::Postgres,
            actual: self.backend,
        })?;
        let conn = pool.get().await?;
        conn.interact(f).await?
    }

    /// Issues a `SELECT 1` round trip, opening the connection if needed.
    pub async fn ping(&self) -> Result<(), DatabaseError> {
        match self.backend {
            BackendType::Sqlite => {
                self.interact_sqlite(|conn| {
                    diesel::sql_query("SELECT 1").execute(conn)?;
                    Ok(())
                })
                .await
            }
            BackendType::Postgres => {
                self.interact_postgres(|conn| {
                    diesel::sql_query("SELECT 1").execute(conn)?;
                    Ok(())
                })
                .await
            }
        }
    }

    /// Applies tuning settings on the connection.
    pub async fn apply_tuning(
        &self,
        settings: Vec<TuningSetting>,
    ) -> Result<ApplicationResult, TuningError> {
        let backend = self.backend;
        let handle_error = |e: DatabaseError| TuningError::Handle(e.to_string());
        match backend {
            BackendType::Sqlite => self
                .interact_sqlite(move |conn| Ok(apply_settings(conn, backend, &settings)))
                .await
                .map_err(handle_error)?,
            BackendType::Postgres => self
                .interact_postgres(move |conn| Ok(apply_settings(conn, backend, &settings)))
                .await
                .map_err(handle_error)?,
        }
    }

    /// Flushes the SQLite write-ahead log into the main database file.
    /// PostgreSQL checkpoints are server-side, so this is a no-op there.
    pub async fn checkpoint(&self) -> Result<(), DatabaseError> {
        match self.backend {
            BackendType::Sqlite => {
                self.interact_sqlite(|conn| {
                    conn.batch_execute("PRAGMA wal_checkpoint(TRUNCATE);")?;
                    Ok(())
                })
                .await?;
                debug!("WAL checkpoint completed");
                Ok(())
            }
            BackendType::Postgres => Ok(()),
        }
    }

    /// Runs pending database migrations for the appropriate backend.
    pub async fn run_migrations(&self) -> Result<usize, DatabaseError> {
        use diesel_migrations::MigrationHarness;

        let applied = match self.backend {
            BackendType::Sqlite => {
                self.interact_sqlite(|conn| {
                    conn.run_pending_migrations(crate::database::SQLITE_MIGRATIONS)
                        .map(|versions| versions.len())
                        .map_err(|e| DatabaseError::Migration(e.to_string()))
                })
                .await?
            }
            BackendType::Postgres => {
                self.interact_postgres(|conn| {
                    conn.run_pending_migrations(crate::database::POSTGRES_MIGRATIONS)
                        .map(|versions| versions.len())
                        .map_err(|e| DatabaseError::Migration(e.to_string()))
                })
                .await?
            }
        };

        info!(backend = %self.backend, applied, "Database migrations complete");
        Ok(applied)
    }

    /// Closes the pool. Later `interact_*` calls fail with
    /// [`DatabaseError::ClosedConnection`].
    pub fn close(&self) {
        self.pool.close();
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::database::tuning::settings_for;

    #[test]
    fn test_sqlite_connection_strings() {
        assert_eq!(
            Database::build_sqlite_url("/path/to/database.db"),
            "/path/to/database.db"
        );
        assert_eq!(Database::build_sqlite_url(":memory:"), ":memory:");
        assert_eq!(
            Database::build_sqlite_url("sqlite:///path/to/db.sqlite"),
            "/path/to/db.sqlite"
        );
    }

    #[test]
    fn test_unknown_url_is_rejected() {
        assert!(matches!(
            Database::new("mysql://localhost/badges"),
            Err(DatabaseError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_database_round_trip() {
        let db = Database::new(":memory:").unwrap();
        assert_eq!(db.backend(), BackendType::Sqlite);
        db.ping().await.unwrap();

        let settings = settings_for(db.backend(), &ConnectionConfig::default());
        let result = db.apply_tuning(settings).await.unwrap();
        assert!(result.all_critical_applied);

        assert!(db.run_migrations().await.unwrap() > 0);
        assert_eq!(db.run_migrations().await.unwrap(), 0);
        db.checkpoint().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_database_refuses_work() {
        let db = Database::new(":memory:").unwrap();
        db.ping().await.unwrap();
        db.close();
        assert!(db.is_closed());
        assert!(matches!(db.ping().await, Err(DatabaseError::ClosedConnection)));
    }

    #[tokio::test]
    async fn test_backend_mismatch() {
        let db = Database::new(":memory:").unwrap();
        let err = db.interact_postgres(|_| Ok(())).await.unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::BackendMismatch {
                expected: BackendType::Postgres,
                actual: BackendType::Sqlite
            }
        ));
    }
}
