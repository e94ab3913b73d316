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

//! SQLite queries.
//!
//! Functions here take `&mut SqliteConnection` and never open a connection
//! themselves. Multi-statement operations use `conn.transaction`, which
//! becomes a savepoint when the caller already holds a transaction.
//! Standalone writes go through [`immediate`] so the write lock is taken
//! before the first read.

pub(crate) mod assertion;
pub(crate) mod badge_class;
pub(crate) mod issuer;
pub(crate) mod models;
pub(crate) mod platform;
pub(crate) mod status_list;
pub(crate) mod user_assertion;

use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use crate::database::schema::sqlite::{assertions, badge_classes, issuers};
use crate::error::DatabaseError;
use crate::models::EntityType;

/// Runs `op` inside `BEGIN IMMEDIATE`.
///
/// A deferred transaction that reads first cannot upgrade to a write lock
/// once another connection has written, and SQLite fails it without
/// consulting `busy_timeout`. Taking the lock up front makes contention wait.
pub(crate) fn immediate<T, F>(conn: &mut SqliteConnection, op: F) -> Result<T, DatabaseError>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T, DatabaseError>,
{
    conn.immediate_transaction(op)
}

fn parent_check(found: bool, entity: EntityType, id: &str) -> Result<(), DatabaseError> {
    if found {
        Ok(())
    } else {
        Err(DatabaseError::MissingParent {
            entity,
            id: id.to_string(),
        })
    }
}

pub(crate) fn require_issuer(conn: &mut SqliteConnection, id: &str) -> Result<(), DatabaseError> {
    let found = diesel::select(exists(issuers::table.find(id))).get_result::<bool>(conn)?;
    parent_check(found, EntityType::Issuer, id)
}

pub(crate) fn require_badge_class(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<(), DatabaseError> {
    let found = diesel::select(exists(badge_classes::table.find(id))).get_result::<bool>(conn)?;
    parent_check(found, EntityType::BadgeClass, id)
}

pub(crate) fn require_assertion(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<(), DatabaseError> {
    let found = diesel::select(exists(assertions::table.find(id))).get_result::<bool>(conn)?;
    parent_check(found, EntityType::Assertion, id)
}
