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

use super::models::{NewSqliteStatusList, SqliteStatusList, SqliteStatusListChanges};
use super::require_issuer;
use crate::dal::{to_domain, to_domain_all, Pagination};
use crate::database::schema::sqlite::status_lists;
use crate::database::universal_types::{current_timestamp, generate_id};
use crate::error::DatabaseError;
use crate::models::{EntityType, NewStatusList, StatusList, StatusListPatch, StatusPurpose};

pub(crate) fn create(
    conn: &mut SqliteConnection,
    new: NewStatusList,
) -> Result<StatusList, DatabaseError> {
    let now = current_timestamp().to_millis();
    let row = NewSqliteStatusList {
        id: new.id.unwrap_or_else(generate_id),
        issuer_id: new.issuer_id,
        purpose: new.purpose.as_str().to_string(),
        status_size: new.status_size,
        encoded_list: new.encoded_list,
        ttl_ms: new.ttl_ms,
        total_entries: new.total_entries,
        used_entries: 0,
        metadata: new.metadata.to_string(),
        created_at: now,
        updated_at: now,
    };

    conn.transaction::<_, DatabaseError, _>(|conn| {
        require_issuer(conn, &row.issuer_id)?;
        diesel::insert_into(status_lists::table)
            .values(&row)
            .execute(conn)?;
        let stored = status_lists::table
            .find(&row.id)
            .select(SqliteStatusList::as_select())
            .first::<SqliteStatusList>(conn)?;
        to_domain(EntityType::StatusList, stored)
    })
}

pub(crate) fn find_by_id(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<StatusList>, DatabaseError> {
    status_lists::table
        .find(id)
        .select(SqliteStatusList::as_select())
        .first::<SqliteStatusList>(conn)
        .optional()?
        .map(|row| to_domain(EntityType::StatusList, row))
        .transpose()
}

pub(crate) fn find_by_issuer(
    conn: &mut SqliteConnection,
    issuer_id: &str,
    purpose: Option<StatusPurpose>,
) -> Result<Vec<StatusList>, DatabaseError> {
    let mut query = status_lists::table
        .filter(status_lists::issuer_id.eq(issuer_id))
        .order((status_lists::created_at.asc(), status_lists::id.asc()))
        .select(SqliteStatusList::as_select())
        .into_boxed();
    if let Some(purpose) = purpose {
        query = query.filter(status_lists::purpose.eq(purpose.as_str()));
    }
    let rows = query.load::<SqliteStatusList>(conn)?;
    to_domain_all(EntityType::StatusList, rows)
}

pub(crate) fn count_by_issuer(
    conn: &mut SqliteConnection,
    issuer_id: &str,
) -> Result<i64, DatabaseError> {
    Ok(status_lists::table
        .filter(status_lists::issuer_id.eq(issuer_id))
        .count()
        .get_result::<i64>(conn)?)
}

pub(crate) fn find_all(
    conn: &mut SqliteConnection,
    page: Option<Pagination>,
) -> Result<Vec<StatusList>, DatabaseError> {
    let mut query = status_lists::table
        .order((status_lists::created_at.asc(), status_lists::id.asc()))
        .select(SqliteStatusList::as_select())
        .into_boxed();
    if let Some(page) = page {
        query = query.limit(page.limit).offset(page.offset);
    }
    let rows = query.load::<SqliteStatusList>(conn)?;
    to_domain_all(EntityType::StatusList, rows)
}

fn write_back(conn: &mut SqliteConnection, list: &StatusList) -> Result<usize, DatabaseError> {
    Ok(diesel::update(status_lists::table.find(&list.id))
        .set(&SqliteStatusListChanges::from(list))
        .execute(conn)?)
}

pub(crate) fn update(
    conn: &mut SqliteConnection,
    id: &str,
    patch: StatusListPatch,
) -> Result<Option<StatusList>, DatabaseError> {
    conn.transaction::<_, DatabaseError, _>(|conn| {
        let Some(mut list) = find_by_id(conn, id)? else {
            return Ok(None);
        };
        patch.apply_to(&mut list);
        list.updated_at = current_timestamp();

        if write_back(conn, &list)? == 0 {
            return Ok(None);
        }
        find_by_id(conn, id)
    })
}

/// Reserves `count` entries, refusing to pass `total_entries`.
pub(crate) fn record_allocation(
    conn: &mut SqliteConnection,
    id: &str,
    count: i32,
) -> Result<Option<StatusList>, DatabaseError> {
    conn.transaction::<_, DatabaseError, _>(|conn| {
        let Some(mut list) = find_by_id(conn, id)? else {
            return Ok(None);
        };
        if count > list.available_entries() {
            return Err(DatabaseError::StatusListExhausted {
                id: list.id,
                used: list.used_entries,
                total: list.total_entries,
            });
        }
        list.used_entries += count;
        list.updated_at = current_timestamp();

        if write_back(conn, &list)? == 0 {
            return Ok(None);
        }
        find_by_id(conn, id)
    })
}

pub(crate) fn delete(conn: &mut SqliteConnection, id: &str) -> Result<bool, DatabaseError> {
    let deleted = diesel::delete(status_lists::table.find(id)).execute(conn)?;
    Ok(deleted > 0)
}
