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

use diesel::pg::PgConnection;
use diesel::prelude::*;

use super::models::{NewPgAssertion, PgAssertion, PgAssertionChanges};
use super::require_badge_class;
use crate::dal::{to_domain, to_domain_all, Pagination};
use crate::database::schema::postgres::{assertions, badge_classes};
use crate::database::universal_types::{current_timestamp, generate_id, UniversalTimestamp};
use crate::error::DatabaseError;
use crate::models::{Assertion, AssertionPatch, EntityType, NewAssertion};

pub(crate) fn create(
    conn: &mut PgConnection,
    new: NewAssertion,
) -> Result<Assertion, DatabaseError> {
    let now = current_timestamp();
    let row = NewPgAssertion {
        id: new.id.unwrap_or_else(generate_id),
        badge_class_id: new.badge_class_id,
        recipient: new.recipient,
        issued_on: new.issued_on.unwrap_or(now).into_inner(),
        expires: new.expires.map(UniversalTimestamp::into_inner),
        evidence: new.evidence,
        verification: new.verification,
        revoked: false,
        revocation_reason: None,
        additional_fields: new.additional_fields,
        created_at: now.into_inner(),
        updated_at: now.into_inner(),
    };

    conn.transaction::<_, DatabaseError, _>(|conn| {
        require_badge_class(conn, &row.badge_class_id)?;
        diesel::insert_into(assertions::table)
            .values(&row)
            .execute(conn)?;
        let stored = assertions::table
            .find(&row.id)
            .select(PgAssertion::as_select())
            .first::<PgAssertion>(conn)?;
        to_domain(EntityType::Assertion, stored)
    })
}

pub(crate) fn find_by_id(
    conn: &mut PgConnection,
    id: &str,
) -> Result<Option<Assertion>, DatabaseError> {
    assertions::table
        .find(id)
        .select(PgAssertion::as_select())
        .first::<PgAssertion>(conn)
        .optional()?
        .map(|row| to_domain(EntityType::Assertion, row))
        .transpose()
}

/// Reads the row and holds its lock until the enclosing transaction ends.
fn lock_by_id(conn: &mut PgConnection, id: &str) -> Result<Option<Assertion>, DatabaseError> {
    assertions::table
        .find(id)
        .select(PgAssertion::as_select())
        .for_update()
        .first::<PgAssertion>(conn)
        .optional()?
        .map(|row| to_domain(EntityType::Assertion, row))
        .transpose()
}

pub(crate) fn find_by_badge_class(
    conn: &mut PgConnection,
    badge_class_id: &str,
) -> Result<Vec<Assertion>, DatabaseError> {
    let rows = assertions::table
        .filter(assertions::badge_class_id.eq(badge_class_id))
        .order((assertions::issued_on.asc(), assertions::id.asc()))
        .select(PgAssertion::as_select())
        .load::<PgAssertion>(conn)?;
    to_domain_all(EntityType::Assertion, rows)
}

/// Number of assertions issued under any badge class of `issuer_id`.
pub(crate) fn count_by_issuer(
    conn: &mut PgConnection,
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
    conn: &mut PgConnection,
    page: Option<Pagination>,
) -> Result<Vec<Assertion>, DatabaseError> {
    let mut query = assertions::table
        .order((assertions::created_at.asc(), assertions::id.asc()))
        .select(PgAssertion::as_select())
        .into_boxed();
    if let Some(page) = page {
        query = query.limit(page.limit).offset(page.offset);
    }
    let rows = query.load::<PgAssertion>(conn)?;
    to_domain_all(EntityType::Assertion, rows)
}

pub(crate) fn update(
    conn: &mut PgConnection,
    id: &str,
    patch: AssertionPatch,
) -> Result<Option<Assertion>, DatabaseError> {
    conn.transaction::<_, DatabaseError, _>(|conn| {
        let Some(mut assertion) = lock_by_id(conn, id)? else {
            return Ok(None);
        };
        patch.apply_to(&mut assertion);
        assertion.updated_at = current_timestamp();

        let updated = diesel::update(assertions::table.find(id))
            .set(&PgAssertionChanges::from(&assertion))
            .execute(conn)?;
        if updated == 0 {
            return Ok(None);
        }
        find_by_id(conn, id)
    })
}

pub(crate) fn delete(conn: &mut PgConnection, id: &str) -> Result<bool, DatabaseError> {
    let deleted = diesel::delete(assertions::table.find(id)).execute(conn)?;
    Ok(deleted > 0)
}
