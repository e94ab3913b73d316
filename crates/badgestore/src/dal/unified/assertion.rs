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

//! Unified Assertion DAL with runtime backend selection

use std::time::Instant;

use tracing::info;

use super::{warn_unbounded, DAL};
use crate::dal::{observe, postgres_dal, sqlite_dal, Pagination};
use crate::database::universal_types::validate_identifier;
use crate::error::DatabaseError;
use crate::models::{Assertion, AssertionPatch, EntityType, NewAssertion};

const ENTITY: EntityType = EntityType::Assertion;

/// Data access layer for issued assertions.
#[derive(Clone)]
pub struct AssertionDAL<'a> {
    dal: &'a DAL,
}

impl<'a> AssertionDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Inserts an assertion. `issued_on` defaults to the insert time.
    pub async fn create(&self, new_assertion: NewAssertion) -> Result<Assertion, DatabaseError> {
        let started = Instant::now();
        new_assertion.validate()?;
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| {
                sqlite_dal::immediate(conn, move |conn| {
                    sqlite_dal::assertion::create(conn, new_assertion)
                })
            },
            move |conn| postgres_dal::assertion::create(conn, new_assertion)
        );
        let id = result.as_ref().ok().map(|assertion| assertion.id.clone());
        observe(ENTITY, "create", id.as_deref(), started, result)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Assertion>, DatabaseError> {
        let started = Instant::now();
        validate_identifier(id)?;
        let owned = id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::assertion::find_by_id(conn, &owned),
            move |conn| postgres_dal::assertion::find_by_id(conn, &owned)
        );
        observe(ENTITY, "find_by_id", Some(id), started, result)
    }

    pub async fn find_by_badge_class(
        &self,
        badge_class_id: &str,
    ) -> Result<Vec<Assertion>, DatabaseError> {
        let started = Instant::now();
        validate_identifier(badge_class_id)?;
        let owned = badge_class_id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::assertion::find_by_badge_class(conn, &owned),
            move |conn| postgres_dal::assertion::find_by_badge_class(conn, &owned)
        );
        observe(ENTITY, "find_by_badge_class", Some(badge_class_id), started, result)
    }

    pub async fn find_all(&self, page: Pagination) -> Result<Vec<Assertion>, DatabaseError> {
        let started = Instant::now();
        page.validate()?;
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::assertion::find_all(conn, Some(page)),
            move |conn| postgres_dal::assertion::find_all(conn, Some(page))
        );
        observe(ENTITY, "find_all", None, started, result)
    }

    pub async fn find_all_unbounded(&self) -> Result<Vec<Assertion>, DatabaseError> {
        let started = Instant::now();
        warn_unbounded(ENTITY);
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::assertion::find_all(conn, None),
            move |conn| postgres_dal::assertion::find_all(conn, None)
        );
        observe(ENTITY, "find_all_unbounded", None, started, result)
    }

    pub async fn update(
        &self,
        id: &str,
        patch: AssertionPatch,
    ) -> Result<Option<Assertion>, DatabaseError> {
        let started = Instant::now();
        validate_identifier(id)?;
        patch.validate()?;
        let owned = id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| {
                sqlite_dal::immediate(conn, move |conn| {
                    sqlite_dal::assertion::update(conn, &owned, patch)
                })
            },
            move |conn| postgres_dal::assertion::update(conn, &owned, patch)
        );
        observe(ENTITY, "update", Some(id), started, result)
    }

    /// Marks the assertion revoked. Revoking twice keeps the assertion revoked
    /// and replaces the reason.
    pub async fn revoke(
        &self,
        id: &str,
        reason: Option<String>,
    ) -> Result<Option<Assertion>, DatabaseError> {
        let revoked = self.update(id, AssertionPatch::revocation(reason)).await?;
        if revoked.is_some() {
            info!(entity_id = id, "Assertion revoked");
        }
        Ok(revoked)
    }

    pub async fn delete(&self, id: &str) -> Result<bool, DatabaseError> {
        let started = Instant::now();
        validate_identifier(id)?;
        let owned = id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::assertion::delete(conn, &owned),
            move |conn| postgres_dal::assertion::delete(conn, &owned)
        );
        observe(ENTITY, "delete", Some(id), started, result)
    }
}
