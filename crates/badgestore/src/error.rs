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

//! Error types for the storage layer.
//!
//! Every public operation returns [`DatabaseError`]. The narrower enums
//! ([`ConnectionError`], [`ValidationError`], [`ConversionError`],
//! [`TuningError`], [`ConfigError`]) describe one failure domain each and
//! convert into [`DatabaseError`] with `?`.
//!
//! Raw diesel errors are translated exactly once, in
//! `impl From<diesel::result::Error> for DatabaseError`, so constraint
//! violations reach callers as dedicated variants instead of engine text.

use diesel::result::DatabaseErrorKind;
use thiserror::Error;

use crate::database::manager::ConnectionState;
use crate::database::BackendType;
use crate::models::EntityType;

/// Outcome of a failed connection sequence.
///
/// This type is `Clone` because it is the output of the shared in-flight
/// connect future that every concurrent `connect()` caller awaits.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// All probe attempts failed.
    #[error("Failed to connect after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    /// The manager reached the terminal `closed` state.
    #[error("Connection manager is closed")]
    Closed,

    /// A CRITICAL tuning setting could not be applied.
    #[error("Critical tuning setting '{setting}' failed: {message}")]
    CriticalSetting { setting: String, message: String },
}

/// Input rejected before any I/O is attempted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: String },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Invalid pagination (limit {limit}, offset {offset}): {reason}")]
    InvalidPagination {
        limit: i64,
        offset: i64,
        reason: String,
    },
}

/// Failure converting between the in-memory representation and an engine's
/// native column encoding.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Timestamp out of range: {0} ms")]
    InvalidTimestamp(i64),

    #[error("Invalid JSON in column '{column}': {source}")]
    InvalidJson {
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid boolean encoding: {0} (expected 0 or 1)")]
    InvalidBool(i32),

    #[error("Unknown value '{value}' in column '{column}'")]
    UnknownVariant { column: &'static str, value: String },

    #[error("Column '{column}' must hold a JSON {expected}")]
    UnexpectedJsonShape {
        column: &'static str,
        expected: &'static str,
    },
}

/// Failure raised by the tuning manager.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TuningError {
    /// A CRITICAL setting failed; startup must halt.
    #[error("Critical setting '{setting}' could not be applied: {message}")]
    CriticalSetting { setting: String, message: String },

    /// The handle needed to apply settings could not be reached.
    #[error("Unable to reach database handle for tuning: {0}")]
    Handle(String),
}

/// Invalid configuration value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {value} ({reason})")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Missing configuration value: {0}")]
    Missing(&'static str),

    #[error("Unable to detect database backend from URL '{0}'")]
    UnknownBackend(String),
}

/// The error returned by every storage operation.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Connection(ConnectionError),

    #[error("Operation attempted after the connection manager was closed")]
    ClosedConnection,

    #[error("Not connected (current state: {state})")]
    NotConnected { state: ConnectionState },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Unique constraint violated: {message}")]
    UniqueViolation { message: String },

    #[error("Foreign key constraint violated: {message}")]
    ForeignKeyViolation { message: String },

    #[error("A platform with client identifier '{0}' already exists")]
    DuplicateClientId(String),

    #[error("{entity} '{id}' does not exist")]
    MissingParent { entity: EntityType, id: String },

    #[error("Status list '{id}' has no free entries ({used}/{total} used)")]
    StatusListExhausted { id: String, used: i32, total: i32 },

    #[error(
        "Transaction {transaction_id} aborted after {steps_completed} step(s) and {elapsed_ms} ms: {source}"
    )]
    TransactionAborted {
        transaction_id: String,
        steps_completed: usize,
        elapsed_ms: u128,
        #[source]
        source: Box<DatabaseError>,
    },

    #[error("Invalid {entity} row: {source}")]
    Conversion {
        entity: EntityType,
        #[source]
        source: ConversionError,
    },

    #[error(transparent)]
    Tuning(#[from] TuningError),

    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("Query failed: {0}")]
    Query(diesel::result::Error),

    #[error("Operation requires the {expected} backend but the database is {actual}")]
    BackendMismatch {
        expected: BackendType,
        actual: BackendType,
    },

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl DatabaseError {
    /// Returns the innermost error, peeling any `TransactionAborted` context.
    pub fn root(&self) -> &DatabaseError {
        match self {
            DatabaseError::TransactionAborted { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the root cause is a uniqueness violation of any kind.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self.root(),
            DatabaseError::UniqueViolation { .. } | DatabaseError::DuplicateClientId(_)
        )
    }

    pub(crate) fn conversion(entity: EntityType) -> impl FnOnce(ConversionError) -> Self {
        move |source| DatabaseError::Conversion { entity, source }
    }
}

impl From<ConnectionError> for DatabaseError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Closed => DatabaseError::ClosedConnection,
            other => DatabaseError::Connection(other),
        }
    }
}

impl From<diesel::result::Error> for DatabaseError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                DatabaseError::UniqueViolation {
                    message: info.message().to_string(),
                }
            }
            diesel::result::Error::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                DatabaseError::ForeignKeyViolation {
                    message: info.message().to_string(),
                }
            }
            other => DatabaseError::Query(other),
        }
    }
}

impl From<deadpool::managed::PoolError<deadpool_diesel::Error>> for DatabaseError {
    fn from(err: deadpool::managed::PoolError<deadpool_diesel::Error>) -> Self {
        match err {
            deadpool::managed::PoolError::Closed => DatabaseError::ClosedConnection,
            other => DatabaseError::Pool(other.to_string()),
        }
    }
}

impl From<deadpool_diesel::InteractError> for DatabaseError {
    fn from(err: deadpool_diesel::InteractError) -> Self {
        DatabaseError::Pool(format!("interaction with connection failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_connection_error_maps_to_closed_variant() {
        let err: DatabaseError = ConnectionError::Closed.into();
        assert!(matches!(err, DatabaseError::ClosedConnection));

        let err: DatabaseError = ConnectionError::Exhausted {
            attempts: 3,
            last_error: "refused".to_string(),
        }
        .into();
        assert!(matches!(
            err,
            DatabaseError::Connection(ConnectionError::Exhausted { attempts: 3, .. })
        ));
    }

    #[test]
    fn test_root_peels_transaction_context() {
        let inner = DatabaseError::UniqueViolation {
            message: "UNIQUE constraint failed: assertions.id".to_string(),
        };
        let wrapped = DatabaseError::TransactionAborted {
            transaction_id: "tx".to_string(),
            steps_completed: 2,
            elapsed_ms: 4,
            source: Box::new(inner),
        };
        assert!(matches!(wrapped.root(), DatabaseError::UniqueViolation { .. }));
        assert!(wrapped.is_unique_violation());
    }

    #[test]
    fn test_not_found_is_not_a_constraint_violation() {
        let err: DatabaseError = diesel::result::Error::NotFound.into();
        assert!(matches!(err, DatabaseError::Query(diesel::result::Error::NotFound)));
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn test_connection_error_display_carries_attempts() {
        let err = ConnectionError::Exhausted {
            attempts: 5,
            last_error: "unable to open database file".to_string(),
        };
        assert!(err.to_string().contains("5 attempt(s)"));
    }
}
