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

//! Single entry point wiring the manager, repositories and coordinator.

use tracing::info;

use crate::config::DatabaseConfig;
use crate::dal::{CoordinatorHealth, RepositoryCoordinator, DAL};
use crate::database::{ConnectionManager, Database};
use crate::error::DatabaseError;

/// Owns one [`ConnectionManager`] and the repositories built on it.
///
/// ```rust,ignore
/// let service = DatabaseService::new(DatabaseConfig::from_env()?)?;
/// service.initialize().await?;
/// let issuer = service.dal().issuer().find_by_id(&id).await?;
/// service.shutdown().await;
/// ```
#[derive(Clone, Debug)]
pub struct DatabaseService {
    manager: ConnectionManager,
    dal: DAL,
    coordinator: RepositoryCoordinator,
}

impl DatabaseService {
    /// Builds the handle for `config.database_url`. No connection is made
    /// until [`initialize`](Self::initialize).
    pub fn new(config: DatabaseConfig) -> Result<Self, DatabaseError> {
        let database = Database::new(&config.database_url)?;
        Ok(Self::from_manager(ConnectionManager::new(
            database,
            config.connection,
        )))
    }

    pub fn from_manager(manager: ConnectionManager) -> Self {
        let dal = DAL::new(manager.clone());
        let coordinator = RepositoryCoordinator::new(dal.clone());
        Self {
            manager,
            dal,
            coordinator,
        }
    }

    /// Connects and applies pending migrations.
    pub async fn initialize(&self) -> Result<(), DatabaseError> {
        self.manager.connect().await?;
        let applied = self.manager.run_migrations().await?;
        info!(
            backend = %self.manager.backend(),
            migrations_applied = applied,
            "Database service initialized"
        );
        Ok(())
    }

    /// Closes the manager. Further calls fail with `ClosedConnection`.
    pub async fn shutdown(&self) {
        self.manager.close().await;
        info!("Database service shut down");
    }

    pub async fn health(&self) -> CoordinatorHealth {
        self.coordinator.health_check().await
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn dal(&self) -> &DAL {
        &self.dal
    }

    pub fn coordinator(&self) -> &RepositoryCoordinator {
        &self.coordinator
    }
}
