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

//! An assertion held in a user's backpack.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{require_object, require_text};
use crate::database::universal_types::{validate_identifier, UniversalTimestamp};
use crate::error::{ConversionError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserAssertionStatus {
    Active,
    Hidden,
    Archived,
}

impl UserAssertionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserAssertionStatus::Active => "active",
            UserAssertionStatus::Hidden => "hidden",
            UserAssertionStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for UserAssertionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserAssertionStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserAssertionStatus::Active),
            "hidden" => Ok(UserAssertionStatus::Hidden),
            "archived" => Ok(UserAssertionStatus::Archived),
            other => Err(ConversionError::UnknownVariant {
                column: "status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAssertion {
    pub id: String,
    pub user_id: String,
    pub assertion_id: String,
    pub status: UserAssertionStatus,
    pub metadata: Value,
    pub added_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUserAssertion {
    pub id: Option<String>,
    pub user_id: String,
    pub assertion_id: String,
    pub status: UserAssertionStatus,
    pub metadata: Value,
}

impl NewUserAssertion {
    pub fn new(user_id: impl Into<String>, assertion_id: impl Into<String>) -> Self {
        Self {
            id: None,
            user_id: user_id.into(),
            assertion_id: assertion_id.into(),
            status: UserAssertionStatus::Active,
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(id) = &self.id {
            validate_identifier(id)?;
        }
        require_text("user_id", &self.user_id)?;
        validate_identifier(&self.assertion_id)?;
        require_object("metadata", &self.metadata)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserAssertionPatch {
    pub status: Option<UserAssertionStatus>,
    pub metadata: Option<Value>,
}

impl UserAssertionPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(metadata) = &self.metadata {
            require_object("metadata", metadata)?;
        }
        Ok(())
    }

    pub fn apply_to(self, current: &mut UserAssertion) {
        if let Some(status) = self.status {
            current.status = status;
        }
        if let Some(metadata) = self.metadata {
            current.metadata = metadata;
        }
    }
}
