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

//! Database layer: handle, connection lifecycle, tuning, schema and type
//! conversion.
//!
//! - [`connection`]: the pooled single handle and backend detection
//! - [`manager`]: the connection state machine every repository goes through
//! - [`tuning`]: CRITICAL/OPTIONAL engine settings applied on connect
//! - [`schema`]: diesel table definitions per backend
//! - [`universal_types`]: conversions between domain and column types

pub mod connection;
pub mod manager;
pub mod schema;
pub mod tuning;
pub mod universal_types;

use diesel_migrations::{embed_migrations, EmbeddedMigrations};

pub use connection::{AnyPool, BackendType, Database};
pub use manager::{
    ConnectionHealth, ConnectionManager, ConnectionProbe, ConnectionState, QueryProbe,
};
pub use tuning::{ApplicationResult, Criticality, TuningSetting};
pub use universal_types::{
    current_timestamp, generate_id, validate_identifier, UniversalBool, UniversalJson,
    UniversalTimestamp, UniversalUuid,
};

/// Embedded SQLite migrations.
pub const SQLITE_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/sqlite");

/// Embedded PostgreSQL migrations.
pub const POSTGRES_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/postgres");
