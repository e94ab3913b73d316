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

//! Unified repositories with runtime backend selection
//!
//! [`DAL`] wraps a [`ConnectionManager`] and hands out one lightweight
//! repository per entity. Repositories hold no connection state; every call
//! goes back through the manager, so a `close()` or `reconnect()` elsewhere
//! is observed on the next call.
//!
//! ```rust,ignore
//! let dal = DAL::new(manager);
//! let issuer = dal.issuer().create(NewIssuer::new("Example U", "https://example.edu")).await?;
//! let classes = dal.badge_class().find_by_issuer(&issuer.id).await?;
//! ```

mod assertion;
mod badge_class;
mod issuer;
mod platform;
mod status_list;
mod user_assertion;

pub use assertion::AssertionDAL;
pub use badge_class::BadgeClassDAL;
pub use issuer::IssuerDAL;
pub use platform::PlatformDAL;
pub use status_list::StatusListDAL;
pub use user_assertion::UserAssertionDAL;

use tracing::warn;

use crate::database::{BackendType, ConnectionManager};
use crate::models::EntityType;

/// Entry point to the per-entity repositories.
#[derive(Clone, Debug)]
pub struct DAL {
    manager: ConnectionManager,
}

impl DAL {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn backend(&self) -> BackendType {
        self.manager.backend()
    }

    pub fn issuer(&self) -> IssuerDAL<'_> {
        IssuerDAL::new(self)
    }

    pub fn badge_class(&self) -> BadgeClassDAL<'_> {
        BadgeClassDAL::new(self)
    }

    pub fn assertion(&self) -> AssertionDAL<'_> {
        AssertionDAL::new(self)
    }

    pub fn platform(&self) -> PlatformDAL<'_> {
        PlatformDAL::new(self)
    }

    pub fn user_assertion(&self) -> UserAssertionDAL<'_> {
        UserAssertionDAL::new(self)
    }

    pub fn status_list(&self) -> StatusListDAL<'_> {
        StatusListDAL::new(self)
    }
}

/// Emitted on every unpaginated scan.
pub(crate) fn warn_unbounded(entity_type: EntityType) {
    warn!(
        %entity_type,
        operation = "find_all_unbounded",
        "Unbounded scan requested; use find_all with pagination on growing tables"
    );
}
