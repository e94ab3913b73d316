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

//! # badgestore
//!
//! Storage layer for an Open Badges credential service, running on SQLite or
//! PostgreSQL selected at runtime from the database URL.
//!
//! ## Layers
//!
//! - [`database::ConnectionManager`]: owns the single database handle and
//!   its `disconnected -> connecting -> connected | error -> closed` state
//!   machine. `connect()` is idempotent and shares one in-flight attempt
//!   between concurrent callers, retrying with exponential backoff.
//! - [`database::tuning`]: engine settings applied on every connect, each
//!   tagged CRITICAL (failure aborts the connect) or OPTIONAL (failure is
//!   logged and skipped).
//! - [`dal::DAL`]: one repository per entity with validated identifiers,
//!   bounded pagination, and read-modify-write updates in one transaction.
//! - [`dal::RepositoryCoordinator`]: multi-entity writes that commit or roll
//!   back as a unit, including the issuer cascade delete with exact counts.
//! - [`service::DatabaseService`]: wires the above together.
//!
//! ## Example
//!
//! ```rust,ignore
//! use badgestore::{DatabaseConfig, DatabaseService};
//!
//! let service = DatabaseService::new(DatabaseConfig::from_env()?)?;
//! service.initialize().await?;
//!
//! let removed = service
//!     .coordinator()
//!     .delete_issuer_cascade("urn:uuid:7f1d2d3a-6a4e-4b8a-9d7c-0e9e2a1b3c4d")
//!     .await?;
//! println!("{} assertions removed", removed.assertions_deleted);
//! ```

pub mod config;
pub mod dal;
pub mod database;
pub mod error;
pub mod models;
pub mod service;

pub use config::{ConnectionConfig, DatabaseConfig};
pub use dal::{
    CascadeDeleteResult, CoordinatorHealth, EcosystemResult, Pagination, RepositoryCoordinator,
    DAL,
};
pub use database::{
    BackendType, ConnectionHealth, ConnectionManager, ConnectionState, Database,
};
pub use error::{
    ConfigError, ConnectionError, ConversionError, DatabaseError, TuningError, ValidationError,
};
pub use models::EntityType;
pub use service::DatabaseService;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `level` (or `info`). Later calls are no-ops.
pub fn init_logging(level: Option<tracing::Level>) {
    let fallback = level.unwrap_or(tracing::Level::INFO).to_string();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init();
}
