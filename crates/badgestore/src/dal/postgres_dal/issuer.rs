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

use super::models::{NewPgIssuer, PgIssuer, PgIssuerChanges};
use crate::dal::{to_domain, to_domain_all, Pagination};
use crate::database::schema::postgres::issuers;
use crate::database::universal_types::{current_timestamp, generate_id};
use crate::error::DatabaseError;
use crate::models::{EntityType, Issuer, IssuerPatch, NewIssuer};

pub(crate) fn create(conn: &mut PgConnection, new: NewIssuer) -> Result<Issuer, DatabaseError> {
    let now = current_timestamp().into_inner();
    let row = NewPgIssuer {
        id: new.id.unwrap_or_else(generate_id),
        name: new.name,
        url: new.url,
        email: new.email,
        description: new.description,
        image: new.image,
        public_key: new.public_key,
        additional_fields: new.additional_fields,
        created_at: now,
        updated_at: now,
    };

    conn.transaction::<_, DatabaseError, _>(|conn| {
        diesel::insert_into(issuers::table)
            .values(&row)
            .execute(conn)?;
        let stored = issuers::table
            .find(&row.id)
            .select(PgIssuer::as_select())
            .first::<PgIssuer>(conn)?;
        to_domain(EntityType::Issuer, stored)
    })
}

pub(crate) fn find_by_id(
    conn: &mut PgConnection,
    id: &str,
) -> Result<Option<Issuer>, DatabaseError> {
    issuers::table
        .find(id)
        .select(PgIssuer::as_select())
        .first::<PgIssuer>(conn)
        .optional()?
        .map(|row| to_domain(EntityType::Issuer, row))
        .transpose()
}

/// Reads the row and holds its lock until the enclosing transaction ends.
fn lock_by_id(conn: &mut PgConnection, id: &str) -> Result<Option<Issuer>, DatabaseError> {
    issuers::table
        .find(id)
        .select(PgIssuer::as_select())
        .for_update()
        .first::<PgIssuer>(conn)
        .optional()?
        .map(|row| to_domain(EntityType::Issuer, row))
        .transpose()
}

pub(crate) fn exists(conn: &mut PgConnection, id: &str) -> Result<bool, DatabaseError> {
    Ok(diesel::select(diesel::dsl::exists(issuers::table.find(id))).get_result::<bool>(conn)?)
}

pub(crate) fn find_by_url(
    conn: &mut PgConnection,
    url: &str,
) -> Result<Option<Issuer>, DatabaseError> {
    issuers::table
        .filter(issuers::url.eq(url))
        .order((issuers::created_at.asc(), issuers::id.asc()))
        .select(PgIssuer::as_select())
        .first::<PgIssuer>(conn)
        .optional()?
        .map(|row| to_domain(EntityType::Issuer, row))
        .transpose()
}

pub(crate) fn find_all(
    conn: &mut PgConnection,
    page: Option<Pagination>,
) -> Result<Vec<Issuer>, DatabaseError> {
    let mut query = issuers::table
        .order((issuers::created_at.asc(), issuers::id.asc()))
        .select(PgIssuer::as_select())
        .into_boxed();
    if let Some(page) = page {
        query = query.limit(page.limit).offset(page.offset);
    }
    let rows = query.load::<PgIssuer>(conn)?;
    to_domain_all(EntityType::Issuer, rows)
}

pub(crate) fn update(
    conn: &mut PgConnection,
    id: &str,
    patch: IssuerPatch,
) -> Result<Option<Issuer>, DatabaseError> {
    conn.transaction::<_, DatabaseError, _>(|conn| {
        let Some(mut issuer) = lock_by_id(conn, id)? else {
            return Ok(None);
        };
        patch.apply_to(&mut issuer);
        issuer.updated_at = current_timestamp();

        let updated = diesel::update(issuers::table.find(id))
            .set(&PgIssuerChanges::from(&issuer))
            .execute(conn)?;
        if updated == 0 {
            return Ok(None);
        }
        find_by_id(conn, id)
    })
}

pub(crate) fn delete(conn: &mut PgConnection, id: &str) -> Result<bool, DatabaseError> {
    let deleted = diesel::delete(issuers::table.find(id)).execute(conn)?;
    Ok(deleted > 0)
}
