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

//! Unified Badge Class DAL with runtime backend selection

use std::time::Instant;

use super::{warn_unbounded, DAL};
use crate::dal::{observe, postgres_dal, sqlite_dal, Pagination};
use crate::database::universal_types::validate_identifier;
use crate::error::DatabaseError;
use crate::models::{BadgeClass, BadgeClassPatch, EntityType, NewBadgeClass};

const ENTITY: EntityType = EntityType::BadgeClass;

/// Data access layer for badge classes.
#[derive(Clone)]
pub struct BadgeClassDAL<'a> {
    dal: &'a DAL,
}

impl<'a> BadgeClassDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Inserts a badge class. Fails with `MissingParent` when the issuer
    /// does not exist.
    pub async fn create(&self, new_badge: NewBadgeClass) -> Result<BadgeClass, DatabaseError> {
        let started = Instant::now();
        new_badge.validate()?;
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| {
                sqlite_dal::immediate(conn, move |conn| {
                    sqlite_dal::badge_class::create(conn, new_badge)
                })
            },
            move |conn| postgres_dal::badge_class::create(conn, new_badge)
        );
        let id = result.as_ref().ok().map(|badge| badge.id.clone());
        observe(ENTITY, "create", id.as_deref(), started, result)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<BadgeClass>, DatabaseError> {
        let started = Instant::now();
        validate_identifier(id)?;
        let owned = id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::badge_class::find_by_id(conn, &owned),
            move |conn| postgres_dal::badge_class::find_by_id(conn, &owned)
        );
        observe(ENTITY, "find_by_id", Some(id), started, result)
    }

    pub async fn find_by_issuer(&self, issuer_id: &str) -> Result<Vec<BadgeClass>, DatabaseError> {
        let started = Instant::now();
        validate_identifier(issuer_id)?;
        let owned = issuer_id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::badge_class::find_by_issuer(conn, &owned),
            move |conn| postgres_dal::badge_class::find_by_issuer(conn, &owned)
        );
        observe(ENTITY, "find_by_issuer", Some(issuer_id), started, result)
    }

    pub async fn find_all(&self, page: Pagination) -> Result<Vec<BadgeClass>, DatabaseError> {
        let started = Instant::now();
        page.validate()?;
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::badge_class::find_all(conn, Some(page)),
            move |conn| postgres_dal::badge_class::find_all(conn, Some(page))
        );
        observe(ENTITY, "find_all", None, started, result)
    }

    pub async fn find_all_unbounded(&self) -> Result<Vec<BadgeClass>, DatabaseError> {
        let started = Instant::now();
        warn_unbounded(ENTITY);
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::badge_class::find_all(conn, None),
            move |conn| postgres_dal::badge_class::find_all(conn, None)
        );
        observe(ENTITY, "find_all_unbounded", None, started, result)
    }

    pub async fn update(
        &self,
        id: &str,
        patch: BadgeClassPatch,
    ) -> Result<Option<BadgeClass>, DatabaseError> {
        let started = Instant::now();
        validate_identifier(id)?;
        patch.validate()?;
        let owned = id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| {
                sqlite_dal::immediate(conn, move |conn| {
                    sqlite_dal::badge_class::update(conn, &owned, patch)
                })
            },
            move |conn| postgres_dal::badge_class::update(conn, &owned, patch)
        );
        observe(ENTITY, "update", Some(id), started, result)
    }

    pub async fn delete(&self, id: &str) -> Result<bool, DatabaseError> {
        let started = Instant::now();
        validate_identifier(id)?;
        let owned = id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::badge_class::delete(conn, &owned),
            move |conn| postgres_dal::badge_class::delete(conn, &owned)
        );
        observe(ENTITY, "delete", Some(id), started, result)
    }
}
