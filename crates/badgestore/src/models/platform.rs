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

//! Platform: an external client integrating with the badge store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{require_http_url, require_object, require_text};
use crate::database::universal_types::{validate_identifier, UniversalTimestamp};
use crate::error::{ConversionError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformStatus {
    Active,
    Inactive,
    Suspended,
}

impl PlatformStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformStatus::Active => "active",
            PlatformStatus::Inactive => "inactive",
            PlatformStatus::Suspended => "suspended",
        }
    }
}

impl fmt::Display for PlatformStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PlatformStatus::Active),
            "inactive" => Ok(PlatformStatus::Inactive),
            "suspended" => Ok(PlatformStatus::Suspended),
            other => Err(ConversionError::UnknownVariant {
                column: "status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub public_key: String,
    pub webhook_url: Option<String>,
    pub status: PlatformStatus,
    pub metadata: Value,
    pub created_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPlatform {
    pub id: Option<String>,
    pub name: String,
    pub client_id: String,
    pub public_key: String,
    pub webhook_url: Option<String>,
    pub status: PlatformStatus,
    pub metadata: Value,
}

impl NewPlatform {
    pub fn new(
        name: impl Into<String>,
        client_id: impl Into<String>,
        public_key: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            client_id: client_id.into(),
            public_key: public_key.into(),
            webhook_url: None,
            status: PlatformStatus::Active,
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(id) = &self.id {
            validate_identifier(id)?;
        }
        require_text("name", &self.name)?;
        require_text("client_id", &self.client_id)?;
        require_text("public_key", &self.public_key)?;
        if let Some(url) = &self.webhook_url {
            require_http_url("webhook_url", url)?;
        }
        require_object("metadata", &self.metadata)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformPatch {
    pub name: Option<String>,
    pub client_id: Option<String>,
    pub public_key: Option<String>,
    pub webhook_url: Option<Option<String>>,
    pub status: Option<PlatformStatus>,
    pub metadata: Option<Value>,
}

impl PlatformPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            require_text("name", name)?;
        }
        if let Some(client_id) = &self.client_id {
            require_text("client_id", client_id)?;
        }
        if let Some(key) = &self.public_key {
            require_text("public_key", key)?;
        }
        if let Some(Some(url)) = &self.webhook_url {
            require_http_url("webhook_url", url)?;
        }
        if let Some(metadata) = &self.metadata {
            require_object("metadata", metadata)?;
        }
        Ok(())
    }

    pub fn apply_to(self, current: &mut Platform) {
        if let Some(name) = self.name {
            current.name = name;
        }
        if let Some(client_id) = self.client_id {
            current.client_id = client_id;
        }
        if let Some(key) = self.public_key {
            current.public_key = key;
        }
        if let Some(url) = self.webhook_url {
            current.webhook_url = url;
        }
        if let Some(status) = self.status {
            current.status = status;
        }
        if let Some(metadata) = self.metadata {
            current.metadata = metadata;
        }
    }
}
