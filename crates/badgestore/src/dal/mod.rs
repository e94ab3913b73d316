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

//! Data Access Layer with runtime backend selection
//!
//! - `sqlite_dal` / `postgres_dal`: synchronous, backend-specific queries
//!   that take a `&mut` connection. They never open their own connection,
//!   so the coordinator can chain several of them inside one transaction.
//! - [`unified`]: the async repositories callers use. Each operation
//!   validates its input, then dispatches to the backend module through the
//!   [`ConnectionManager`](crate::database::ConnectionManager).
//! - [`coordinator`]: multi-entity transactions.

pub mod coordinator;
pub mod unified;

mod postgres_dal;
mod sqlite_dal;

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{ConversionError, DatabaseError, ValidationError};
use crate::models::EntityType;

pub use coordinator::{
    CascadeDeleteResult, CoordinatorHealth, EcosystemResult, RepositoryCoordinator,
};
pub use unified::DAL;

/// Default page size for `find_all`.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Largest page size accepted by `find_all`.
pub const MAX_PAGE_SIZE: i64 = 1000;

/// Bounded window over an ordered result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: i64, offset: i64) -> Result<Self, ValidationError> {
        let page = Self { limit, offset };
        page.validate()?;
        Ok(page)
    }

    /// Page `page` (0-based) of `size` rows.
    pub fn page(page: i64, size: i64) -> Result<Self, ValidationError> {
        Self::new(size, page.saturating_mul(size))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.limit < 1 || self.limit > MAX_PAGE_SIZE {
            return Err(ValidationError::InvalidPagination {
                limit: self.limit,
                offset: self.offset,
                reason: format!("limit must be between 1 and {}", MAX_PAGE_SIZE),
            });
        }
        if self.offset < 0 {
            return Err(ValidationError::InvalidPagination {
                limit: self.limit,
                offset: self.offset,
                reason: "offset must not be negative".to_string(),
            });
        }
        Ok(())
    }
}

/// Runs a backend-specific closure on the connection owned by `$manager`.
///
/// The first closure receives `&mut SqliteConnection`, the second
/// `&mut PgConnection`. Only the closure for the active backend is built.
///
/// ```rust,ignore
/// dispatch_backend!(
///     self.dal.manager(),
///     move |conn| sqlite_dal::issuer::find_by_id(conn, &id),
///     move |conn| postgres_dal::issuer::find_by_id(conn, &id)
/// )
/// ```
#[macro_export]
macro_rules! dispatch_backend {
    ($manager:expr, $sqlite:expr, $postgres:expr) => {
        match $manager.backend() {
            $crate::database::BackendType::Sqlite => $manager.interact_sqlite($sqlite).await,
            $crate::database::BackendType::Postgres => $manager.interact_postgres($postgres).await,
        }
    };
}

/// Converts one stored row into its domain type.
pub(crate) fn to_domain<R, T>(entity: EntityType, row: R) -> Result<T, DatabaseError>
where
    T: TryFrom<R, Error = ConversionError>,
{
    T::try_from(row).map_err(DatabaseError::conversion(entity))
}

/// Converts stored rows into domain types, failing on the first corrupt row.
pub(crate) fn to_domain_all<R, T>(entity: EntityType, rows: Vec<R>) -> Result<Vec<T>, DatabaseError>
where
    T: TryFrom<R, Error = ConversionError>,
{
    rows.into_iter().map(|row| to_domain(entity, row)).collect()
}

/// Logs the outcome of one repository operation and passes it through.
pub(crate) fn observe<T>(
    entity_type: EntityType,
    operation: &'static str,
    entity_id: Option<&str>,
    started: Instant,
    result: Result<T, DatabaseError>,
) -> Result<T, DatabaseError> {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => debug!(
            %entity_type,
            operation,
            entity_id,
            elapsed_ms,
            "Repository operation completed"
        ),
        Err(e) => error!(
            %entity_type,
            operation,
            entity_id,
            elapsed_ms,
            error = %e,
            "Repository operation failed"
        ),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults_and_bounds() {
        assert_eq!(Pagination::default(), Pagination { limit: 50, offset: 0 });
        assert!(Pagination::new(1000, 0).is_ok());
        assert!(Pagination::new(0, 0).is_err());
        assert!(Pagination::new(1001, 0).is_err());
        assert!(matches!(
            Pagination::new(10, -1),
            Err(ValidationError::InvalidPagination { offset: -1, .. })
        ));
        assert_eq!(Pagination::page(2, 25).unwrap().offset, 50);
    }
}
