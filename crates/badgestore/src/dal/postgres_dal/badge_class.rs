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

use super::models::{tags_to_json, NewPgBadgeClass, PgBadgeClass, PgBadgeClassChanges};
use super::require_issuer;
use crate::dal::{to_domain, to_domain_all, Pagination};
use crate::database::schema::postgres::badge_classes;
use crate::database::universal_types::{current_timestamp, generate_id};
use crate::error::DatabaseError;
use crate::models::{BadgeClass, BadgeClassPatch, EntityType, NewBadgeClass};

pub(crate) fn create(
    conn: &mut PgConnection,
    new: NewBadgeClass,
) -> Result<BadgeClass, DatabaseError> {
    let now = current_timestamp().into_inner();
    let row = NewPgBadgeClass {
        id: new.id.unwrap_or_else(generate_id),
        issuer_id: new.issuer_id,
        name: new.name,
        description: new.description,
        image: new.image,
        criteria: new.criteria,
        alignment: new.alignment,
        tags: tags_to_json(&new.tags),
        additional_fields: new.additional_fields,
        created_at: now,
        updated_at: now,
    };

    conn.transaction::<_, DatabaseError, _>(|conn| {
        require_issuer(conn, &row.issuer_id)?;
        diesel::insert_into(badge_classes::table)
            .values(&row)
            .execute(conn)?;
        let stored = badge_classes::table
            .find(&row.id)
            .select(PgBadgeClass::as_select())
            .first::<PgBadgeClass>(conn)?;
        to_domain(EntityType::BadgeClass, stored)
    })
}

pub(crate) fn find_by_id(
    conn: &mut PgConnection,
    id: &str,
) -> Result<Option<BadgeClass>, DatabaseError> {
    badge_classes::table
        .find(id)
        .select(PgBadgeClass::as_select())
        .first::<PgBadgeClass>(conn)
        .optional()?
        .map(|row| to_domain(EntityType::BadgeClass, row))
        .transpose()
}

/// Reads the row and holds its lock until the enclosing transaction ends.
fn lock_by_id(conn: &mut PgConnection, id: &str) -> Result<Option<BadgeClass>, DatabaseError> {
    badge_classes::table
        .find(id)
        .select(PgBadgeClass::as_select())
        .for_update()
        .first::<PgBadgeClass>(conn)
        .optional()?
        .map(|row| to_domain(EntityType::BadgeClass, row))
        .transpose()
}

pub(crate) fn find_by_issuer(
    conn: &mut PgConnection,
    issuer_id: &str,
) -> Result<Vec<BadgeClass>, DatabaseError> {
    let rows = badge_classes::table
        .filter(badge_classes::issuer_id.eq(issuer_id))
        .order((badge_classes::created_at.asc(), badge_classes::id.asc()))
        .select(PgBadgeClass::as_select())
        .load::<PgBadgeClass>(conn)?;
    to_domain_all(EntityType::BadgeClass, rows)
}

/// Number of badge classes owned by `issuer_id`.
pub(crate) fn count_by_issuer(
    conn: &mut PgConnection,
    issuer_id: &str,
) -> Result<i64, DatabaseError> {
    Ok(badge_classes::table
        .filter(badge_classes::issuer_id.eq(issuer_id))
        .count()
        .get_result::<i64>(conn)?)
}

pub(crate) fn find_all(
    conn: &mut PgConnection,
    page: Option<Pagination>,
) -> Result<Vec<BadgeClass>, DatabaseError> {
    let mut query = badge_classes::table
        .order((badge_classes::created_at.asc(), badge_classes::id.asc()))
        .select(PgBadgeClass::as_select())
        .into_boxed();
    if let Some(page) = page {
        query = query.limit(page.limit).offset(page.offset);
    }
    let rows = query.load::<PgBadgeClass>(conn)?;
    to_domain_all(EntityType::BadgeClass, rows)
}

pub(crate) fn update(
    conn: &mut PgConnection,
    id: &str,
    patch: BadgeClassPatch,
) -> Result<Option<BadgeClass>, DatabaseError> {
    conn.transaction::<_, DatabaseError, _>(|conn| {
        let Some(mut badge) = lock_by_id(conn, id)? else {
            return Ok(None);
        };
        patch.apply_to(&mut badge);
        badge.updated_at = current_timestamp();

        let updated = diesel::update(badge_classes::table.find(id))
            .set(&PgBadgeClassChanges::from(&badge))
            .execute(conn)?;
        if updated == 0 {
            return Ok(None);
        }
        find_by_id(conn, id)
    })
}

pub(crate) fn delete(conn: &mut PgConnection, id: &str) -> Result<bool, DatabaseError> {
    let deleted = diesel::delete(badge_classes::table.find(id)).execute(conn)?;
    Ok(deleted > 0)
}
