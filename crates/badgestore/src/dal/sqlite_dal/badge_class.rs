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
    optional_json_to_text, tags_to_text, NewSqliteBadgeClass, SqliteBadgeClass,
    SqliteBadgeClassChanges,
};
use super::require_issuer;
use crate::dal::{to_domain, to_domain_all, Pagination};
use crate::database::schema::sqlite::badge_classes;
use crate::database::universal_types::{current_timestamp, generate_id};
use crate::error::DatabaseError;
use crate::models::{BadgeClass, BadgeClassPatch, EntityType, NewBadgeClass};

pub(crate) fn create(
    conn: &mut SqliteConnection,
    new: NewBadgeClass,
) -> Result<BadgeClass, DatabaseError> {
    let now = current_timestamp().to_millis();
    let row = NewSqliteBadgeClass {
        id: new.id.unwrap_or_else(generate_id),
        issuer_id: new.issuer_id,
        name: new.name,
        description: new.description,
        image: new.image,
        criteria: new.criteria.to_string(),
        alignment: optional_json_to_text(&new.alignment),
        tags: tags_to_text(&new.tags),
        additional_fields: new.additional_fields.to_string(),
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
            .select(SqliteBadgeClass::as_select())
            .first::<SqliteBadgeClass>(conn)?;
        to_domain(EntityType::BadgeClass, stored)
    })
}

pub(crate) fn find_by_id(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<BadgeClass>, DatabaseError> {
    badge_classes::table
        .find(id)
        .select(SqliteBadgeClass::as_select())
        .first::<SqliteBadgeClass>(conn)
        .optional()?
        .map(|row| to_domain(EntityType::BadgeClass, row))
        .transpose()
}

pub(crate) fn find_by_issuer(
    conn: &mut SqliteConnection,
    issuer_id: &str,
) -> Result<Vec<BadgeClass>, DatabaseError> {
    let rows = badge_classes::table
        .filter(badge_classes::issuer_id.eq(issuer_id))
        .order((badge_classes::created_at.asc(), badge_classes::id.asc()))
        .select(SqliteBadgeClass::as_select())
        .load::<SqliteBadgeClass>(conn)?;
    to_domain_all(EntityType::BadgeClass, rows)
}

/// Number of badge classes owned by `issuer_id`.
pub(crate) fn count_by_issuer(
    conn: &mut SqliteConnection,
    issuer_id: &str,
) -> Result<i64, DatabaseError> {
    Ok(badge_classes::table
        .filter(badge_classes::issuer_id.eq(issuer_id))
        .count()
        .get_result::<i64>(conn)?)
}

pub(crate) fn find_all(
    conn: &mut SqliteConnection,
    page: Option<Pagination>,
) -> Result<Vec<BadgeClass>, DatabaseError> {
    let mut query = badge_classes::table
        .order((badge_classes::created_at.asc(), badge_classes::id.asc()))
        .select(SqliteBadgeClass::as_select())
        .into_boxed();
    if let Some(page) = page {
        query = query.limit(page.limit).offset(page.offset);
    }
    let rows = query.load::<SqliteBadgeClass>(conn)?;
    to_domain_all(EntityType::BadgeClass, rows)
}

pub(crate) fn update(
    conn: &mut SqliteConnection,
    id: &str,
    patch: BadgeClassPatch,
) -> Result<Option<BadgeClass>, DatabaseError> {
    conn.transaction::<_, DatabaseError, _>(|conn| {
        let Some(mut badge) = find_by_id(conn, id)? else {
            return Ok(None);
        };
        patch.apply_to(&mut badge);
        badge.updated_at = current_timestamp();

        let updated = diesel::update(badge_classes::table.find(id))
            .set(&SqliteBadgeClassChanges::from(&badge))
            .execute(conn)?;
        if updated == 0 {
            return Ok(None);
        }
        find_by_id(conn, id)
    })
}

pub(crate) fn delete(conn: &mut SqliteConnection, id: &str) -> Result<bool, DatabaseError> {
    let deleted = diesel::delete(badge_classes::table.find(id)).execute(conn)?;
    Ok(deleted > 0)
}
