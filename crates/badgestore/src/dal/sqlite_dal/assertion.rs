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

use super::models::{
    optional_json_to_text, NewSqliteAssertion, SqliteAssertion, SqliteAssertionChanges,
};
use super::require_badge_class;
use crate::dal::{to_domain, to_domain_all, Pagination};
use crate::database::schema::sqlite::{assertions, badge_classes};
use crate::database::universal_types::{current_timestamp, generate_id, UniversalBool};
use crate::error::DatabaseError;
use crate::models::{Assertion, AssertionPatch, EntityType, NewAssertion};

pub(crate) fn create(
    conn: &mut SqliteConnection,
    new: NewAssertion,
) -> Result<Assertion, DatabaseError> {
    let now = current_timestamp();
    let row = NewSqliteAssertion {
        id: new.id.unwrap_or_else(generate_id),
        badge_class_id: new.badge_class_id,
        recipient: new.recipient.to_string(),
        issued_on: new.issued_on.unwrap_or(now).to_millis(),
        expires: new.expires.map(|t| t.to_millis()),
        evidence: optional_json_to_text(&new.evidence),
        verification: optional_json_to_text(&new.verification),
        revoked: UniversalBool::new(false).to_i32(),
        revocation_reason: None,
        additional_fields: new.additional_fields.to_string(),
        created_at: now.to_millis(),
        updated_at: now.to_millis(),
    };

    conn.transaction::<_, DatabaseError, _>(|conn| {
        require_badge_class(conn, &row.badge_class_id)?;
        diesel::insert_into(assertions::table)
            .values(&row)
            .execute(conn)?;
        let stored = assertions::table
            .find(&row.id)
            .select(SqliteAssertion::as_select())
            .first::<SqliteAssertion>(conn)?;
        to_domain(EntityType::Assertion, stored)
    })
}

pub(crate) fn find_by_id(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Assertion>, DatabaseError> {
    assertions::table
        .find(id)
        .select(SqliteAssertion::as_select())
        .first::<SqliteAssertion>(conn)
        .optional()?
        .map(|row| to_domain(EntityType::Assertion, row))
        .transpose()
}

pub(crate) fn find_by_badge_class(
    conn: &mut SqliteConnection,
    badge_class_id: &str,
) -> Result<Vec<Assertion>, DatabaseError> {
    let rows = assertions::table
        .filter(assertions::badge_class_id.eq(badge_class_id))
        .order((assertions::issued_on.asc(), assertions::id.asc()))
        .select(SqliteAssertion::as_select())
        .load::<SqliteAssertion>(conn)?;
    to_domain_all(EntityType::Assertion, rows)
}

/// Number of assertions issued under any badge class of `issuer_id`.
pub(crate) fn count_by_issuer(
    conn: &mut SqliteConnection,
    issuer_id: &str,
) -> Result<i64, DatabaseError> {
    let owned_badge_classes = badge_classes::table
        .filter(badge_classes::issuer_id.eq(issuer_id))
        .select(badge_classes::id);
    Ok(assertions::table
        .filter(assertions::badge_class_id.eq_any(owned_badge_classes))
        .count()
        .get_result::<i64>(conn)?)
}

pub(crate) fn find_all(
    conn: &mut SqliteConnection,
    page: Option<Pagination>,
) -> Result<Vec<Assertion>, DatabaseError> {
    let mut query = assertions::table
        .order((assertions::created_at.asc(), assertions::id.asc()))
        .select(SqliteAssertion::as_select())
        .into_boxed();
    if let Some(page) = page {
        query = query.limit(page.limit).offset(page.offset);
    }
    let rows = query.load::<SqliteAssertion>(conn)?;
    to_domain_all(EntityType::Assertion, rows)
}

pub(crate) fn update(
    conn: &mut SqliteConnection,
    id: &str,
    patch: AssertionPatch,
) -> Result<Option<Assertion>, DatabaseError> {
    conn.transaction::<_, DatabaseError, _>(|conn| {
        let Some(mut assertion) = find_by_id(conn, id)? else {
            return Ok(None);
        };
        patch.apply_to(&mut assertion);
        assertion.updated_at = current_timestamp();

        let updated = diesel::update(assertions::table.find(id))
            .set(&SqliteAssertionChanges::from(&assertion))
            .execute(conn)?;
        if updated == 0 {
            return Ok(None);
        }
        find_by_id(conn, id)
    })
}

pub(crate) fn delete(conn: &mut SqliteConnection, id: &str) -> Result<bool, DatabaseError> {
    let deleted = diesel::delete(assertions::table.find(id)).execute(conn)?;
    Ok(deleted > 0)
}
