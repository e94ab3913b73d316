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

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use super::models::{NewSqliteUserAssertion, SqliteUserAssertion, SqliteUserAssertionChanges};
use super::require_assertion;
use crate::dal::{to_domain, to_domain_all, Pagination};
use crate::database::schema::sqlite::user_assertions;
use crate::database::universal_types::{current_timestamp, generate_id};
use crate::error::DatabaseError;
use crate::models::{EntityType, NewUserAssertion, UserAssertion, UserAssertionPatch};

pub(crate) fn create(
    conn: &mut SqliteConnection,
    new: NewUserAssertion,
) -> Result<UserAssertion, DatabaseError> {
    let now = current_timestamp().to_millis();
    let row = NewSqliteUserAssertion {
        id: new.id.unwrap_or_else(generate_id),
        user_id: new.user_id,
        assertion_id: new.assertion_id,
        status: new.status.as_str().to_string(),
        metadata: new.metadata.to_string(),
        added_at: now,
        updated_at: now,
    };

    conn.transaction::<_, DatabaseError, _>(|conn| {
        require_assertion(conn, &row.assertion_id)?;
        diesel::insert_into(user_assertions::table)
            .values(&row)
            .execute(conn)?;
        let stored = user_assertions::table
            .find(&row.id)
            .select(SqliteUserAssertion::as_select())
            .first::<SqliteUserAssertion>(conn)?;
        to_domain(EntityType::UserAssertion, stored)
    })
}

pub(crate) fn find_by_id(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<UserAssertion>, DatabaseError> {
    user_assertions::table
        .find(id)
        .select(SqliteUserAssertion::as_select())
        .first::<SqliteUserAssertion>(conn)
        .optional()?
        .map(|row| to_domain(EntityType::UserAssertion, row))
        .transpose()
}

pub(crate) fn find_by_user(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Vec<UserAssertion>, DatabaseError> {
    let rows = user_assertions::table
        .filter(user_assertions::user_id.eq(user_id))
        .order((user_assertions::added_at.asc(), user_assertions::id.asc()))
        .select(SqliteUserAssertion::as_select())
        .load::<SqliteUserAssertion>(conn)?;
    to_domain_all(EntityType::UserAssertion, rows)
}

pub(crate) fn find_by_user_and_assertion(
    conn: &mut SqliteConnection,
    user_id: &str,
    assertion_id: &str,
) -> Result<Option<UserAssertion>, DatabaseError> {
    user_assertions::table
        .filter(user_assertions::user_id.eq(user_id))
        .filter(user_assertions::assertion_id.eq(assertion_id))
        .select(SqliteUserAssertion::as_select())
        .first::<SqliteUserAssertion>(conn)
        .optional()?
        .map(|row| to_domain(EntityType::UserAssertion, row))
        .transpose()
}

pub(crate) fn find_all(
    conn: &mut SqliteConnection,
    page: Option<Pagination>,
) -> Result<Vec<UserAssertion>, DatabaseError> {
    let mut query = user_assertions::table
        .order((user_assertions::added_at.asc(), user_assertions::id.asc()))
        .select(SqliteUserAssertion::as_select())
        .into_boxed();
    if let Some(page) = page {
        query = query.limit(page.limit).offset(page.offset);
    }
    let rows = query.load::<SqliteUserAssertion>(conn)?;
    to_domain_all(EntityType::UserAssertion, rows)
}

pub(crate) fn update(
    conn: &mut SqliteConnection,
    id: &str,
    patch: UserAssertionPatch,
) -> Result<Option<UserAssertion>, DatabaseError> {
    conn.transaction::<_, DatabaseError, _>(|conn| {
        let Some(mut entry) = find_by_id(conn, id)? else {
            return Ok(None);
        };
        patch.apply_to(&mut entry);
        entry.updated_at = current_timestamp();

        let updated = diesel::update(user_assertions::table.find(id))
            .set(&SqliteUserAssertionChanges::from(&entry))
            .execute(conn)?;
        if updated == 0 {
            return Ok(None);
        }
        find_by_id(conn, id)
    })
}

pub(crate) fn delete(conn: &mut SqliteConnection, id: &str) -> Result<bool, DatabaseError> {
    let deleted = diesel::delete(user_assertions::table.find(id)).execute(conn)?;
    Ok(deleted > 0)
}
