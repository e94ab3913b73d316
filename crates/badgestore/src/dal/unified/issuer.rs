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

//! Unified Issuer DAL with runtime backend selection

use std::time::Instant;

use super::{warn_unbounded, DAL};
use crate::dal::{observe, postgres_dal, sqlite_dal, Pagination};
use crate::database::universal_types::validate_identifier;
use crate::error::{DatabaseError, ValidationError};
use crate::models::{EntityType, Issuer, IssuerPatch, NewIssuer};

const ENTITY: EntityType = EntityType::Issuer;

/// Data access layer for issuers.
#[derive(Clone)]
pub struct IssuerDAL<'a> {
    dal: &'a DAL,
}

impl<'a> IssuerDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Inserts an issuer, generating its identifier when absent, and returns
    /// the stored row.
    pub async fn create(&self, new_issuer: NewIssuer) -> Result<Issuer, DatabaseError> {
        let started = Instant::now();
        new_issuer.validate()?;
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| {
                sqlite_dal::immediate(conn, move |conn| {
                    sqlite_dal::issuer::create(conn, new_issuer)
                })
            },
            move |conn| postgres_dal::issuer::create(conn, new_issuer)
        );
        let id = result.as_ref().ok().map(|issuer| issuer.id.clone());
        observe(ENTITY, "create", id.as_deref(), started, result)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Issuer>, DatabaseError> {
        let started = Instant::now();
        validate_identifier(id)?;
        let owned = id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::issuer::find_by_id(conn, &owned),
            move |conn| postgres_dal::issuer::find_by_id(conn, &owned)
        );
        observe(ENTITY, "find_by_id", Some(id), started, result)
    }

    /// Oldest issuer registered under `url`.
    pub async fn find_by_url(&self, url: &str) -> Result<Option<Issuer>, DatabaseError> {
        let started = Instant::now();
        if url.trim().is_empty() {
            return Err(ValidationError::MissingField("url").into());
        }
        let owned = url.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::issuer::find_by_url(conn, &owned),
            move |conn| postgres_dal::issuer::find_by_url(conn, &owned)
        );
        observe(ENTITY, "find_by_url", None, started, result)
    }

    pub async fn find_all(&self, page: Pagination) -> Result<Vec<Issuer>, DatabaseError> {
        let started = Instant::now();
        page.validate()?;
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::issuer::find_all(conn, Some(page)),
            move |conn| postgres_dal::issuer::find_all(conn, Some(page))
        );
        observe(ENTITY, "find_all", None, started, result)
    }

    /// Every issuer, without pagination. Logs a warning on each call.
    pub async fn find_all_unbounded(&self) -> Result<Vec<Issuer>, DatabaseError> {
        let started = Instant::now();
        warn_unbounded(ENTITY);
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::issuer::find_all(conn, None),
            move |conn| postgres_dal::issuer::find_all(conn, None)
        );
        observe(ENTITY, "find_all_unbounded", None, started, result)
    }

    /// Merges `patch` over the current row inside one transaction. Returns
    /// `None` when the issuer does not exist.
    pub async fn update(
        &self,
        id: &str,
        patch: IssuerPatch,
    ) -> Result<Option<Issuer>, DatabaseError> {
        let started = Instant::now();
        validate_identifier(id)?;
        patch.validate()?;
        let owned = id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| {
                sqlite_dal::immediate(conn, move |conn| {
                    sqlite_dal::issuer::update(conn, &owned, patch)
                })
            },
            move |conn| postgres_dal::issuer::update(conn, &owned, patch)
        );
        observe(ENTITY, "update", Some(id), started, result)
    }

    /// Deletes the issuer. Badge classes, their assertions and the issuer's
    /// status lists go with it through the foreign-key cascade.
    pub async fn delete(&self, id: &str) -> Result<bool, DatabaseError> {
        let started = Instant::now();
        validate_identifier(id)?;
        let owned = id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::issuer::delete(conn, &owned),
            move |conn| postgres_dal::issuer::delete(conn, &owned)
        );
        observe(ENTITY, "delete", Some(id), started, result)
    }
}
