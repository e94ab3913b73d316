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

//! Unified User Assertion DAL with runtime backend selection

use std::time::Instant;

use super::{warn_unbounded, DAL};
use crate::dal::{observe, postgres_dal, sqlite_dal, Pagination};
use crate::database::universal_types::validate_identifier;
use crate::error::{DatabaseError, ValidationError};
use crate::models::{
    EntityType, NewUserAssertion, UserAssertion, UserAssertionPatch, UserAssertionStatus,
};

const ENTITY: EntityType = EntityType::UserAssertion;

fn require_user_id(user_id: &str) -> Result<(), ValidationError> {
    if user_id.trim().is_empty() {
        return Err(ValidationError::MissingField("user_id"));
    }
    Ok(())
}

/// Data access layer for assertions held in user backpacks.
#[derive(Clone)]
pub struct UserAssertionDAL<'a> {
    dal: &'a DAL,
}

impl<'a> UserAssertionDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Adds an assertion to a user's backpack. A user holds each assertion
    /// at most once; a second add fails with `UniqueViolation`.
    pub async fn create(
        &self,
        new_entry: NewUserAssertion,
    ) -> Result<UserAssertion, DatabaseError> {
        let started = Instant::now();
        new_entry.validate()?;
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| {
                sqlite_dal::immediate(conn, move |conn| {
                    sqlite_dal::user_assertion::create(conn, new_entry)
                })
            },
            move |conn| postgres_dal::user_assertion::create(conn, new_entry)
        );
        let id = result.as_ref().ok().map(|entry| entry.id.clone());
        observe(ENTITY, "create", id.as_deref(), started, result)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<UserAssertion>, DatabaseError> {
        let started = Instant::now();
        validate_identifier(id)?;
        let owned = id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::user_assertion::find_by_id(conn, &owned),
            move |conn| postgres_dal::user_assertion::find_by_id(conn, &owned)
        );
        observe(ENTITY, "find_by_id", Some(id), started, result)
    }

    /// Every backpack entry of `user_id`, oldest first.
    pub async fn find_by_user(&self, user_id: &str) -> Result<Vec<UserAssertion>, DatabaseError> {
        let started = Instant::now();
        require_user_id(user_id)?;
        let owned = user_id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::user_assertion::find_by_user(conn, &owned),
            move |conn| postgres_dal::user_assertion::find_by_user(conn, &owned)
        );
        observe(ENTITY, "find_by_user", None, started, result)
    }

    pub async fn find_by_user_and_assertion(
        &self,
        user_id: &str,
        assertion_id: &str,
    ) -> Result<Option<UserAssertion>, DatabaseError> {
        let started = Instant::now();
        require_user_id(user_id)?;
        validate_identifier(assertion_id)?;
        let user = user_id.to_string();
        let assertion = assertion_id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| {
                sqlite_dal::user_assertion::find_by_user_and_assertion(conn, &user, &assertion)
            },
            move |conn| {
                postgres_dal::user_assertion::find_by_user_and_assertion(conn, &user, &assertion)
            }
        );
        observe(
            ENTITY,
            "find_by_user_and_assertion",
            Some(assertion_id),
            started,
            result,
        )
    }

    pub async fn find_all(&self, page: Pagination) -> Result<Vec<UserAssertion>, DatabaseError> {
        let started = Instant::now();
        page.validate()?;
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::user_assertion::find_all(conn, Some(page)),
            move |conn| postgres_dal::user_assertion::find_all(conn, Some(page))
        );
        observe(ENTITY, "find_all", None, started, result)
    }

    pub async fn find_all_unbounded(&self) -> Result<Vec<UserAssertion>, DatabaseError> {
        let started = Instant::now();
        warn_unbounded(ENTITY);
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::user_assertion::find_all(conn, None),
            move |conn| postgres_dal::user_assertion::find_all(conn, None)
        );
        observe(ENTITY, "find_all_unbounded", None, started, result)
    }

    pub async fn update(
        &self,
        id: &str,
        patch: UserAssertionPatch,
    ) -> Result<Option<UserAssertion>, DatabaseError> {
        let started = Instant::now();
        validate_identifier(id)?;
        patch.validate()?;
        let owned = id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| {
                sqlite_dal::immediate(conn, move |conn| {
                    sqlite_dal::user_assertion::update(conn, &owned, patch)
                })
            },
            move |conn| postgres_dal::user_assertion::update(conn, &owned, patch)
        );
        observe(ENTITY, "update", Some(id), started, result)
    }

    pub async fn update_status(
        &self,
        id: &str,
        status: UserAssertionStatus,
    ) -> Result<Option<UserAssertion>, DatabaseError> {
        self.update(
            id,
            UserAssertionPatch {
                status: Some(status),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, DatabaseError> {
        let started = Instant::now();
        validate_identifier(id)?;
        let owned = id.to_string();
        let result = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| sqlite_dal::user_assertion::delete(conn, &owned),
            move |conn| postgres_dal::user_assertion::delete(conn, &owned)
        );
        observe(ENTITY, "delete", Some(id), started, result)
    }
}
