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

//! Database backend types and runtime backend selection.

use std::fmt;

use deadpool_diesel::postgres::Pool as PgPool;
use deadpool_diesel::sqlite::Pool as SqlitePool;
use serde::Serialize;

use crate::error::ConfigError;

/// Represents the database backend type, detected at runtime from the connection URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// PostgreSQL backend
    Postgres,
    /// SQLite backend
    Sqlite,
}

impl BackendType {
    /// Detect the backend type from a connection URL.
    ///
    /// SQLite URLs can be a `sqlite://` prefix, a `file:` URI, a relative or
    /// absolute path, or `:memory:`.
    pub fn from_url(url: &str) -> Result<Self, ConfigError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(BackendType::Postgres);
        }

        if url.starts_with("sqlite://")
            || url.starts_with("file:")
            || url.starts_with('/')
            || url.starts_with("./")
            || url.starts_with("../")
            || url == ":memory:"
            || url.ends_with(".db")
            || url.ends_with(".sqlite")
            || url.ends_with(".sqlite3")
        {
            return Ok(BackendType::Sqlite);
        }

        Err(ConfigError::UnknownBackend(url.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Postgres => "postgres",
            BackendType::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pool enum that wraps both PostgreSQL and SQLite connection pools.
///
/// Both pools are sized to a single connection: the manager owns exactly one
/// handle and every operation borrows it for the duration of one call.
#[derive(Clone)]
pub enum AnyPool {
    /// PostgreSQL connection pool
    Postgres(PgPool),
    /// SQLite connection pool
    Sqlite(SqlitePool),
}

impl fmt::Debug for AnyPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyPool::Postgres(_) => write!(f, "AnyPool::Postgres(...)"),
            AnyPool::Sqlite(_) => write!(f, "AnyPool::Sqlite(...)"),
        }
    }
}

impl AnyPool {
    /// Returns a reference to the PostgreSQL pool if this is a PostgreSQL backend.
    pub fn as_postgres(&self) -> Option<&PgPool> {
        match self {
            AnyPool::Postgres(pool) => Some(pool),
            _ => None,
        }
    }

    /// Returns a reference to the SQLite pool if this is a SQLite backend.
    pub fn as_sqlite(&self) -> Option<&SqlitePool> {
        match self {
            AnyPool::Sqlite(pool) => Some(pool),
            _ => None,
        }
    }

    /// Stops handing out the connection. Idle connections are dropped.
    pub fn close(&self) {
        match self {
            AnyPool::Postgres(pool) => pool.close(),
            AnyPool::Sqlite(pool) => pool.close(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            AnyPool::Postgres(pool) => pool.is_closed(),
            AnyPool::Sqlite(pool) => pool.is_closed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_type_detection() {
        assert_eq!(
            BackendType::from_url("postgres://localhost/db").unwrap(),
            BackendType::Postgres
        );
        assert_eq!(
            BackendType::from_url("postgresql://localhost/db").unwrap(),
            BackendType::Postgres
        );
        assert_eq!(
            BackendType::from_url("sqlite:///path/to/db").unwrap(),
            BackendType::Sqlite
        );
        assert_eq!(
            BackendType::from_url("/absolute/path.db").unwrap(),
            BackendType::Sqlite
        );
        assert_eq!(BackendType::from_url(":memory:").unwrap(), BackendType::Sqlite);
        assert_eq!(
            BackendType::from_url("badges.sqlite3").unwrap(),
            BackendType::Sqlite
        );
    }

    #[test]
    fn test_unknown_backend_is_an_error() {
        assert_eq!(
            BackendType::from_url("mysql://localhost/db").unwrap_err(),
            ConfigError::UnknownBackend("mysql://localhost/db".to_string())
        );
    }
}
