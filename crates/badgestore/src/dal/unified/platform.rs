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

//! Unified Platform DAL with runtime backend selection
//!
//! `client_id` is unique across platforms. Both `create` and `update` check
//! it inside their transaction and report a clash as
//! [`DatabaseError::DuplicateClientId`]; the table's unique index backs this
//! up against writers outside this crate.

use std::time::Instant;

use super::{warn_unbounded, DAL};
use crate::dal::{observe, postgres_dal, sqlite_dal, Pagination};
use crate::database::universal_types::validate_identifier;
use crate::error::{DatabaseError, ValidationError};
use crate::models::{EntityType, NewPlatform, Platform, PlatformPatch};

const ENTITY: EntityType = EntityType::Platform;

/// Translates a unique-index violation on `client_id` into the dedicated
/// variant. Other errors pass through.
fn client_id_clash(client_id: Option<String>) -> impl FnOnce(DatabaseError) -> DatabaseError {
    move |err| {
        if let (DatabaseError::UniqueViolation { message }, Some(client_id)) = (&err, &client_id) {
            if message.contains("client_id") {
                return DatabaseError::DuplicateClientId(client_id.clone());
            }
        }
        err
    }
}

/// Data access layer for registered platforms.
#[derive(Clone)]
pub struct PlatformDAL<'a> {
    dal: &'a DAL,
}

impl<'a> PlatformDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    pub async fn create(&self, new_platform: NewPlatform) -> Result<Platform, DatabaseError> {
        let started = Instant::now();
        new_platform.validate()?;
        let client_id = new_platform.client_id.clone();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| {
                sqlite_dal::immediate(conn, move |conn| {
                    sqlite_dal::platform::create(conn, new_platform)
                })
            },
            move |conn| postgres_dal::platform::create(conn, new_platform)
        )
        .map_err(client_id_clash(Some(client_id)));
        let id = result.as_ref().ok().map(|platform| platform.id.clone());
        observe(ENTITY, "create", id.as_deref(), started, result)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Platform>, DatabaseError> {
        let started = Instant::now();
        validate_identifier(id)?;
        let owned = id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::platform::find_by_id(conn, &owned),
            move |conn| postgres_dal::platform::find_by_id(conn, &owned)
        );
        observe(ENTITY, "find_by_id", Some(id), started, result)
    }

    pub async fn find_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<Platform>, DatabaseError> {
        let started = Instant::now();
        if client_id.trim().is_empty() {
            return Err(ValidationError::MissingField("client_id").into());
        }
        let owned = client_id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::platform::find_by_client_id(conn, &owned),
            move |conn| postgres_dal::platform::find_by_client_id(conn, &owned)
        );
        observe(ENTITY, "find_by_client_id", None, started, result)
    }

    pub async fn find_all(&self, page: Pagination) -> Result<Vec<Platform>, DatabaseError> {
        let started = Instant::now();
        page.validate()?;
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::platform::find_all(conn, Some(page)),
            move |conn| postgres_dal::platform::find_all(conn, Some(page))
        );
        observe(ENTITY, "find_all", None, started, result)
    }

    pub async fn find_all_unbounded(&self) -> Result<Vec<Platform>, DatabaseError> {
        let started = Instant::now();
        warn_unbounded(ENTITY);
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::platform::find_all(conn, None),
            move |conn| postgres_dal::platform::find_all(conn, None)
        );
        observe(ENTITY, "find_all_unbounded", None, started, result)
    }

    pub async fn update(
        &self,
        id: &str,
        patch: PlatformPatch,
    ) -> Result<Option<Platform>, DatabaseError> {
        let started = Instant::now();
        validate_identifier(id)?;
        patch.validate()?;
        let client_id = patch.client_id.clone();
        let owned = id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| {
                sqlite_dal::immediate(conn, move |conn| {
                    sqlite_dal::platform::update(conn, &owned, patch)
                })
            },
            move |conn| postgres_dal::platform::update(conn, &owned, patch)
        )
        .map_err(client_id_clash(client_id));
        observe(ENTITY, "update", Some(id), started, result)
    }

    pub async fn delete(&self, id: &str) -> Result<bool, DatabaseError> {
        let started = Instant::now();
        validate_identifier(id)?;
        let owned = id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::platform::delete(conn, &owned),
            move |conn| postgres_dal::platform::delete(conn, &owned)
        );
        observe(ENTITY, "delete", Some(id), started, result)
    }
}
