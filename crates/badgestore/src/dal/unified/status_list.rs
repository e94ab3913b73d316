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

//! Unified Status List DAL with runtime backend selection

use std::time::Instant;

use super::{warn_unbounded, DAL};
use crate::dal::{observe, postgres_dal, sqlite_dal, Pagination};
use crate::database::universal_types::validate_identifier;
use crate::error::{DatabaseError, ValidationError};
use crate::models::{EntityType, NewStatusList, StatusList, StatusListPatch, StatusPurpose};

const ENTITY: EntityType = EntityType::StatusList;

/// Data access layer for issuer status lists.
#[derive(Clone)]
pub struct StatusListDAL<'a> {
    dal: &'a DAL,
}

impl<'a> StatusListDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Inserts a status list with no entries in use.
    pub async fn create(&self, new_list: NewStatusList) -> Result<StatusList, DatabaseError> {
        let started = Instant::now();
        new_list.validate()?;
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| {
                sqlite_dal::immediate(conn, move |conn| {
                    sqlite_dal::status_list::create(conn, new_list)
                })
            },
            move |conn| postgres_dal::status_list::create(conn, new_list)
        );
        let id = result.as_ref().ok().map(|list| list.id.clone());
        observe(ENTITY, "create", id.as_deref(), started, result)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<StatusList>, DatabaseError> {
        let started = Instant::now();
        validate_identifier(id)?;
        let owned = id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::status_list::find_by_id(conn, &owned),
            move |conn| postgres_dal::status_list::find_by_id(conn, &owned)
        );
        observe(ENTITY, "find_by_id", Some(id), started, result)
    }

    /// Status lists owned by `issuer_id`, optionally narrowed to one purpose.
    pub async fn find_by_issuer(
        &self,
        issuer_id: &str,
        purpose: Option<StatusPurpose>,
    ) -> Result<Vec<StatusList>, DatabaseError> {
        let started = Instant::now();
        validate_identifier(issuer_id)?;
        let owned = issuer_id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::status_list::find_by_issuer(conn, &owned, purpose),
            move |conn| postgres_dal::status_list::find_by_issuer(conn, &owned, purpose)
        );
        observe(ENTITY, "find_by_issuer", Some(issuer_id), started, result)
    }

    pub async fn find_all(&self, page: Pagination) -> Result<Vec<StatusList>, DatabaseError> {
        let started = Instant::now();
        page.validate()?;
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::status_list::find_all(conn, Some(page)),
            move |conn| postgres_dal::status_list::find_all(conn, Some(page))
        );
        observe(ENTITY, "find_all", None, started, result)
    }

    pub async fn find_all_unbounded(&self) -> Result<Vec<StatusList>, DatabaseError> {
        let started = Instant::now();
        warn_unbounded(ENTITY);
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::status_list::find_all(conn, None),
            move |conn| postgres_dal::status_list::find_all(conn, None)
        );
        observe(ENTITY, "find_all_unbounded", None, started, result)
    }

    pub async fn update(
        &self,
        id: &str,
        patch: StatusListPatch,
    ) -> Result<Option<StatusList>, DatabaseError> {
        let started = Instant::now();
        validate_identifier(id)?;
        patch.validate()?;
        let owned = id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| {
                sqlite_dal::immediate(conn, move |conn| {
                    sqlite_dal::status_list::update(conn, &owned, patch)
                })
            },
            move |conn| postgres_dal::status_list::update(conn, &owned, patch)
        );
        observe(ENTITY, "update", Some(id), started, result)
    }

    /// Reserves `count` entries. The index of the first reserved entry is the
    /// returned list's `used_entries - count`. Fails with
    /// `StatusListExhausted` rather than passing `total_entries`.
    pub async fn record_allocation(
        &self,
        id: &str,
        count: i32,
    ) -> Result<Option<StatusList>, DatabaseError> {
        let started = Instant::now();
        validate_identifier(id)?;
        if count < 1 {
            return Err(ValidationError::InvalidField {
                field: "count",
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        let owned = id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| {
                sqlite_dal::immediate(conn, move |conn| {
                    sqlite_dal::status_list::record_allocation(conn, &owned, count)
                })
            },
            move |conn| postgres_dal::status_list::record_allocation(conn, &owned, count)
        );
        observe(ENTITY, "record_allocation", Some(id), started, result)
    }

    pub async fn delete(&self, id: &str) -> Result<bool, DatabaseError> {
        let started = Instant::now();
        validate_identifier(id)?;
        let owned = id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::status_list::delete(conn, &owned),
            move |conn| postgres_dal::status_list::delete(conn, &owned)
        );
        observe(ENTITY, "delete", Some(id), started, result)
    }
}
