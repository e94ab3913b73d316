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

use diesel::dsl::exists;
use diesel::pg::PgConnection;
use diesel::prelude::*;

use super::models::{NewPgPlatform, PgPlatform, PgPlatformChanges};
use crate::dal::{to_domain, to_domain_all, Pagination};
use crate::database::schema::postgres::platforms;
use crate::database::universal_types::{current_timestamp, generate_id};
use crate::error::DatabaseError;
use crate::models::{EntityType, NewPlatform, Platform, PlatformPatch};

/// Fails with `DuplicateClientId` if another platform already uses `client_id`.
fn require_free_client_id(
    conn: &mut PgConnection,
    client_id: &str,
    own_id: &str,
) -> Result<(), DatabaseError> {
    let taken = diesel::select(exists(
        platforms::table
            .filter(platforms::client_id.eq(client_id))
            .filter(platforms::id.ne(own_id)),
    ))
    .get_result::<bool>(conn)?;
    if taken {
        return Err(DatabaseError::DuplicateClientId(client_id.to_string()));
    }
    Ok(())
}

pub(crate) fn create(conn: &mut PgConnection, new: NewPlatform) -> Result<Platform, DatabaseError> {
    let now = current_timestamp().into_inner();
    let row = NewPgPlatform {
        id: new.id.unwrap_or_else(generate_id),
        name: new.name,
        client_id: new.client_id,
        public_key: new.public_key,
        webhook_url: new.webhook_url,
        status: new.status.as_str().to_string(),
        metadata: new.metadata,
        created_at: now,
        updated_at: now,
    };

    conn.transaction::<_, DatabaseError, _>(|conn| {
        require_free_client_id(conn, &row.client_id, &row.id)?;
        diesel::insert_into(platforms::table)
            .values(&row)
            .execute(conn)?;
        let stored = platforms::table
            .find(&row.id)
            .select(PgPlatform::as_select())
            .first::<PgPlatform>(conn)?;
        to_domain(EntityType::Platform, stored)
    })
}

pub(crate) fn find_by_id(
    conn: &mut PgConnection,
    id: &str,
) -> Result<Option<Platform>, DatabaseError> {
    platforms::table
        .find(id)
        .select(PgPlatform::as_select())
        .first::<PgPlatform>(conn)
        .optional()?
        .map(|row| to_domain(EntityType::Platform, row))
        .transpose()
}

/// Reads the row and holds its lock until the enclosing transaction ends.
fn lock_by_id(conn: &mut PgConnection, id: &str) -> Result<Option<Platform>, DatabaseError> {
    platforms::table
        .find(id)
        .select(PgPlatform::as_select())
        .for_update()
        .first::<PgPlatform>(conn)
        .optional()?
        .map(|row| to_domain(EntityType::Platform, row))
        .transpose()
}

pub(crate) fn find_by_client_id(
    conn: &mut PgConnection,
    client_id: &str,
) -> Result<Option<Platform>, DatabaseError> {
    platforms::table
        .filter(platforms::client_id.eq(client_id))
        .select(PgPlatform::as_select())
        .first::<PgPlatform>(conn)
        .optional()?
        .map(|row| to_domain(EntityType::Platform, row))
        .transpose()
}

pub(crate) fn find_all(
    conn: &mut PgConnection,
    page: Option<Pagination>,
) -> Result<Vec<Platform>, DatabaseError> {
    let mut query = platforms::table
        .order((platforms::created_at.asc(), platforms::id.asc()))
        .select(PgPlatform::as_select())
        .into_boxed();
    if let Some(page) = page {
        query = query.limit(page.limit).offset(page.offset);
    }
    let rows = query.load::<PgPlatform>(conn)?;
    to_domain_all(EntityType::Platform, rows)
}

pub(crate) fn update(
    conn: &mut PgConnection,
    id: &str,
    patch: PlatformPatch,
) -> Result<Option<Platform>, DatabaseError> {
    conn.transaction::<_, DatabaseError, _>(|conn| {
        let Some(mut platform) = lock_by_id(conn, id)? else {
            return Ok(None);
        };
        patch.apply_to(&mut platform);
        platform.updated_at = current_timestamp();
        require_free_client_id(conn, &platform.client_id, id)?;

        let updated = diesel::update(platforms::table.find(id))
            .set(&PgPlatformChanges::from(&platform))
            .execute(conn)?;
        if updated == 0 {
            return Ok(None);
        }
        find_by_id(conn, id)
    })
}

pub(crate) fn delete(conn: &mut PgConnection, id: &str) -> Result<bool, DatabaseError> {
    let deleted = diesel::delete(platforms::table.find(id)).execute(conn)?;
    Ok(deleted > 0)
}
