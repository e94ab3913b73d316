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

//! Multi-entity operations that must commit or roll back as a unit.
//!
//! Each operation runs every step on one connection inside one transaction.
//! On SQLite the transaction is `BEGIN IMMEDIATE`, so the write lock is held
//! from the first read. Steps are recorded in a [`TransactionContext`] whose
//! summary is logged on commit and abort; aborted operations surface as
//! [`DatabaseError::TransactionAborted`] wrapping the original failure.
//!
//! Before doing any work the coordinator makes one implicit `connect()`
//! attempt if the manager is not connected.

mod context;

pub use context::{OperationContext, TransactionContext};

use std::collections::BTreeMap;
use std::time::Instant;

use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;
use tracing::{info, warn};

use super::{postgres_dal, sqlite_dal, Pagination, DAL};
use crate::database::universal_types::{generate_id, validate_identifier};
use crate::database::ConnectionHealth;
use crate::error::DatabaseError;
use crate::models::{
    Assertion, BadgeClass, EntityType, Issuer, NewAssertion, NewBadgeClass, NewIssuer,
};

/// The three entities written by [`RepositoryCoordinator::create_ecosystem`].
#[derive(Debug, Clone, Serialize)]
pub struct EcosystemResult {
    pub issuer: Issuer,
    pub badge_class: BadgeClass,
    pub assertion: Assertion,
}

/// Rows removed by [`RepositoryCoordinator::delete_issuer_cascade`], counted
/// before the delete ran.
///
/// Backpack entries referencing removed assertions are deleted by the same
/// cascade but are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CascadeDeleteResult {
    pub issuer_deleted: bool,
    pub badge_classes_deleted: u64,
    pub assertions_deleted: u64,
    pub status_lists_deleted: u64,
}

/// Aggregate health of the connection and every repository.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorHealth {
    pub healthy: bool,
    pub connection: ConnectionHealth,
    pub repositories: BTreeMap<EntityType, bool>,
}

/// Runs cross-repository operations atomically.
#[derive(Clone, Debug)]
pub struct RepositoryCoordinator {
    dal: DAL,
}

impl RepositoryCoordinator {
    pub fn new(dal: DAL) -> Self {
        Self { dal }
    }

    pub fn dal(&self) -> &DAL {
        &self.dal
    }

    async fn ensure_connection(&self) -> Result<(), DatabaseError> {
        let manager = self.dal.manager();
        if manager.is_connected() {
            return Ok(());
        }
        info!(
            state = %manager.state(),
            "Coordinator found the connection down; attempting one implicit connect"
        );
        manager.connect().await
    }

    /// Creates an issuer, a badge class under it and an assertion of that
    /// badge class in one transaction.
    ///
    /// The foreign keys of `badge_class` and `assertion` are overwritten with
    /// the identifiers of the rows created before them. If any step fails,
    /// nothing is left behind.
    pub async fn create_ecosystem(
        &self,
        mut issuer: NewIssuer,
        mut badge_class: NewBadgeClass,
        mut assertion: NewAssertion,
    ) -> Result<EcosystemResult, DatabaseError> {
        let issuer_id = issuer.id.get_or_insert_with(generate_id).clone();
        badge_class.issuer_id = issuer_id;
        let badge_class_id = badge_class.id.get_or_insert_with(generate_id).clone();
        assertion.badge_class_id = badge_class_id;

        issuer.validate()?;
        badge_class.validate()?;
        assertion.validate()?;

        self.ensure_connection().await?;

        let ctx = TransactionContext::new("create_ecosystem");
        let fallback = ctx.clone();
        let outcome = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| {
                let mut ctx = ctx;
                let result = conn.immediate_transaction::<_, DatabaseError, _>(|conn| {
                    sqlite_ecosystem(conn, &mut ctx, issuer, badge_class, assertion)
                });
                Ok((ctx, result))
            },
            move |conn| {
                let mut ctx = ctx;
                let result = conn.transaction::<_, DatabaseError, _>(|conn| {
                    postgres_ecosystem(conn, &mut ctx, issuer, badge_class, assertion)
                });
                Ok((ctx, result))
            }
        );
        settle(fallback, outcome)
    }

    /// Deletes an issuer and, through the foreign-key cascade, its badge
    /// classes, their assertions and the issuer's status lists.
    ///
    /// Counts are taken inside the transaction before the delete. A missing
    /// issuer is not an error: the result reports `issuer_deleted: false`
    /// with zero counts.
    pub async fn delete_issuer_cascade(
        &self,
        issuer_id: &str,
    ) -> Result<CascadeDeleteResult, DatabaseError> {
        validate_identifier(issuer_id)?;
        self.ensure_connection().await?;

        let ctx = TransactionContext::new("delete_issuer_cascade");
        let fallback = ctx.clone();
        let id = issuer_id.to_string();
        let outcome = crate::dispatch_backend!(
            self.dal.manager(),
            move |conn| {
                let mut ctx = ctx;
                // Pragmas are ignored inside a transaction.
                conn.batch_execute("PRAGMA foreign_keys = ON;")?;
                let result = conn.immediate_transaction::<_, DatabaseError, _>(|conn| {
                    sqlite_cascade(conn, &mut ctx, &id)
                });
                Ok((ctx, result))
            },
            move |conn| {
                let mut ctx = ctx;
                let result = conn.transaction::<_, DatabaseError, _>(|conn| {
                    postgres_cascade(conn, &mut ctx, &id)
                });
                Ok((ctx, result))
            }
        );
        let result = settle(fallback, outcome)?;
        if result.issuer_deleted {
            info!(
                entity_id = issuer_id,
                badge_classes = result.badge_classes_deleted,
                assertions = result.assertions_deleted,
                status_lists = result.status_lists_deleted,
                "Issuer deleted with cascade"
            );
        } else {
            info!(entity_id = issuer_id, "Issuer not found; nothing deleted");
        }
        Ok(result)
    }

    /// Connection health plus a one-row read against every repository.
    ///
    /// Never fails: a failed probe marks its own repository unhealthy.
    pub async fn health_check(&self) -> CoordinatorHealth {
        let connection = self.dal.manager().get_health().await;
        let mut repositories = BTreeMap::new();
        for entity in EntityType::ALL {
            let ok = connection.connected && self.probe(entity).await;
            repositories.insert(entity, ok);
        }
        let healthy = connection.connected && repositories.values().all(|ok| *ok);
        CoordinatorHealth {
            healthy,
            connection,
            repositories,
        }
    }

    async fn probe(&self, entity: EntityType) -> bool {
        let page = Pagination {
            limit: 1,
            offset: 0,
        };
        let result = match entity {
            EntityType::Issuer => self.dal.issuer().find_all(page).await.map(|_| ()),
            EntityType::BadgeClass => self.dal.badge_class().find_all(page).await.map(|_| ()),
            EntityType::Assertion => self.dal.assertion().find_all(page).await.map(|_| ()),
            EntityType::UserAssertion => {
                self.dal.user_assertion().find_all(page).await.map(|_| ())
            }
            EntityType::Platform => self.dal.platform().find_all(page).await.map(|_| ()),
            EntityType::StatusList => self.dal.status_list().find_all(page).await.map(|_| ()),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(entity_type = %entity, error = %e, "Repository health probe failed");
                false
            }
        }
    }
}

/// Logs the transaction outcome and attaches its context to failures.
fn settle<T>(
    fallback: TransactionContext,
    outcome: Result<(TransactionContext, Result<T, DatabaseError>), DatabaseError>,
) -> Result<T, DatabaseError> {
    match outcome {
        Ok((ctx, Ok(value))) => {
            ctx.log_commit();
            Ok(value)
        }
        Ok((ctx, Err(e))) => Err(ctx.abort(e)),
        Err(e) => Err(fallback.abort(e)),
    }
}

fn sqlite_ecosystem(
    conn: &mut SqliteConnection,
    ctx: &mut TransactionContext,
    issuer: NewIssuer,
    badge_class: NewBadgeClass,
    assertion: NewAssertion,
) -> Result<EcosystemResult, DatabaseError> {
    let started = Instant::now();
    let issuer = sqlite_dal::issuer::create(conn, issuer)?;
    ctx.record("create", EntityType::Issuer, Some(&issuer.id), started);

    let started = Instant::now();
    let badge_class = sqlite_dal::badge_class::create(conn, badge_class)?;
    ctx.record("create", EntityType::BadgeClass, Some(&badge_class.id), started);

    let started = Instant::now();
    let assertion = sqlite_dal::assertion::create(conn, assertion)?;
    ctx.record("create", EntityType::Assertion, Some(&assertion.id), started);

    Ok(EcosystemResult {
        issuer,
        badge_class,
        assertion,
    })
}

fn postgres_ecosystem(
    conn: &mut PgConnection,
    ctx: &mut TransactionContext,
    issuer: NewIssuer,
    badge_class: NewBadgeClass,
    assertion: NewAssertion,
) -> Result<EcosystemResult, DatabaseError> {
    let started = Instant::now();
    let issuer = postgres_dal::issuer::create(conn, issuer)?;
    ctx.record("create", EntityType::Issuer, Some(&issuer.id), started);

    let started = Instant::now();
    let badge_class = postgres_dal::badge_class::create(conn, badge_class)?;
    ctx.record("create", EntityType::BadgeClass, Some(&badge_class.id), started);

    let started = Instant::now();
    let assertion = postgres_dal::assertion::create(conn, assertion)?;
    ctx.record("create", EntityType::Assertion, Some(&assertion.id), started);

    Ok(EcosystemResult {
        issuer,
        badge_class,
        assertion,
    })
}

/// Fails the transaction if dependent badge classes survived the issuer
/// delete, which happens when foreign-key enforcement is off.
fn require_cascaded(remaining: i64, issuer_id: &str) -> Result<(), DatabaseError> {
    if remaining > 0 {
        return Err(DatabaseError::ForeignKeyViolation {
            message: format!(
                "{} badge class(es) of issuer '{}' survived the cascade; foreign keys are not enforced",
                remaining, issuer_id
            ),
        });
    }
    Ok(())
}

fn sqlite_cascade(
    conn: &mut SqliteConnection,
    ctx: &mut TransactionContext,
    issuer_id: &str,
) -> Result<CascadeDeleteResult, DatabaseError> {
    let started = Instant::now();
    let found = sqlite_dal::issuer::exists(conn, issuer_id)?;
    ctx.record("lookup", EntityType::Issuer, Some(issuer_id), started);
    if !found {
        return Ok(CascadeDeleteResult::default());
    }

    let started = Instant::now();
    let badge_classes = sqlite_dal::badge_class::count_by_issuer(conn, issuer_id)?;
    ctx.record("count", EntityType::BadgeClass, None, started);

    let started = Instant::now();
    let assertions = sqlite_dal::assertion::count_by_issuer(conn, issuer_id)?;
    ctx.record("count", EntityType::Assertion, None, started);

    let started = Instant::now();
    let status_lists = sqlite_dal::status_list::count_by_issuer(conn, issuer_id)?;
    ctx.record("count", EntityType::StatusList, None, started);

    let started = Instant::now();
    let deleted = sqlite_dal::issuer::delete(conn, issuer_id)?;
    ctx.record("delete", EntityType::Issuer, Some(issuer_id), started);
    if !deleted {
        return Ok(CascadeDeleteResult::default());
    }
    require_cascaded(sqlite_dal::badge_class::count_by_issuer(conn, issuer_id)?, issuer_id)?;

    Ok(CascadeDeleteResult {
        issuer_deleted: true,
        badge_classes_deleted: badge_classes as u64,
        assertions_deleted: assertions as u64,
        status_lists_deleted: status_lists as u64,
    })
}

fn postgres_cascade(
    conn: &mut PgConnection,
    ctx: &mut TransactionContext,
    issuer_id: &str,
) -> Result<CascadeDeleteResult, DatabaseError> {
    let started = Instant::now();
    let found = postgres_dal::issuer::exists(conn, issuer_id)?;
    ctx.record("lookup", EntityType::Issuer, Some(issuer_id), started);
    if !found {
        return Ok(CascadeDeleteResult::default());
    }

    let started = Instant::now();
    let badge_classes = postgres_dal::badge_class::count_by_issuer(conn, issuer_id)?;
    ctx.record("count", EntityType::BadgeClass, None, started);

    let started = Instant::now();
    let assertions = postgres_dal::assertion::count_by_issuer(conn, issuer_id)?;
    ctx.record("count", EntityType::Assertion, None, started);

    let started = Instant::now();
    let status_lists = postgres_dal::status_list::count_by_issuer(conn, issuer_id)?;
    ctx.record("count", EntityType::StatusList, None, started);

    let started = Instant::now();
    let deleted = postgres_dal::issuer::delete(conn, issuer_id)?;
    ctx.record("delete", EntityType::Issuer, Some(issuer_id), started);
    if !deleted {
        return Ok(CascadeDeleteResult::default());
    }
    require_cascaded(postgres_dal::badge_class::count_by_issuer(conn, issuer_id)?, issuer_id)?;

    Ok(CascadeDeleteResult {
        issuer_deleted: true,
        badge_classes_deleted: badge_classes as u64,
        assertions_deleted: assertions as u64,
        status_lists_deleted: status_lists as u64,
    })
}
