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

//! Bitstring status list owned by an issuer.
//!
//! Only the bookkeeping columns are interpreted here (`total_entries`,
//! `used_entries`); the encoded bitstring is stored opaquely.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{require_object, require_text};
use crate::database::universal_types::{validate_identifier, UniversalTimestamp};
use crate::error::{ConversionError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusPurpose {
    Revocation,
    Suspension,
}

impl StatusPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusPurpose::Revocation => "revocation",
            StatusPurpose::Suspension => "suspension",
        }
    }
}

impl fmt::Display for StatusPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusPurpose {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "revocation" => Ok(StatusPurpose::Revocation),
            "suspension" => Ok(StatusPurpose::Suspension),
            other => Err(ConversionError::UnknownVariant {
                column: "purpose",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusList {
    pub id: String,
    pub issuer_id: String,
    pub purpose: StatusPurpose,
    pub status_size: i32,
    pub encoded_list: String,
    pub ttl_ms: Option<i64>,
    pub total_entries: i32,
    pub used_entries: i32,
    pub metadata: Value,
    pub created_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
}

impl StatusList {
    pub fn available_entries(&self) -> i32 {
        self.total_entries - self.used_entries
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStatusList {
    pub id: Option<String>,
    pub issuer_id: String,
    pub purpose: StatusPurpose,
    pub status_size: i32,
    pub encoded_list: String,
    pub ttl_ms: Option<i64>,
    pub total_entries: i32,
    pub metadata: Value,
}

impl NewStatusList {
    pub fn new(
        issuer_id: impl Into<String>,
        purpose: StatusPurpose,
        encoded_list: impl Into<String>,
        total_entries: i32,
    ) -> Self {
        Self {
            id: None,
            issuer_id: issuer_id.into(),
            purpose,
            status_size: 1,
            encoded_list: encoded_list.into(),
            ttl_ms: None,
            total_entries,
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(id) = &self.id {
            validate_identifier(id)?;
        }
        validate_identifier(&self.issuer_id)?;
        require_text("encoded_list", &self.encoded_list)?;
        if !matches!(self.status_size, 1 | 2 | 4 | 8) {
            return Err(ValidationError::InvalidField {
                field: "status_size",
                reason: format!("{} is not one of 1, 2, 4, 8", self.status_size),
            });
        }
        if self.total_entries <= 0 {
            return Err(ValidationError::InvalidField {
                field: "total_entries",
                reason: "must be positive".to_string(),
            });
        }
        validate_ttl(self.ttl_ms)?;
        require_object("metadata", &self.metadata)
    }
}

/// Mutable status list fields. Purpose, size and capacity are fixed at
/// creation; `used_entries` only moves through `record_allocation`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusListPatch {
    pub encoded_list: Option<String>,
    pub ttl_ms: Option<Option<i64>>,
    pub metadata: Option<Value>,
}

impl StatusListPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(list) = &self.encoded_list {
            require_text("encoded_list", list)?;
        }
        if let Some(ttl) = self.ttl_ms {
            validate_ttl(ttl)?;
        }
        if let Some(metadata) = &self.metadata {
            require_object("metadata", metadata)?;
        }
        Ok(())
    }

    pub fn apply_to(self, current: &mut StatusList) {
        if let Some(list) = self.encoded_list {
            current.encoded_list = list;
        }
        if let Some(ttl) = self.ttl_ms {
            current.ttl_ms = ttl;
        }
        if let Some(metadata) = self.metadata {
            current.metadata = metadata;
        }
    }
}

fn validate_ttl(ttl_ms: Option<i64>) -> Result<(), ValidationError> {
    match ttl_ms {
        Some(ttl) if ttl <= 0 => Err(ValidationError::InvalidField {
            field: "ttl_ms",
            reason: "must be positive".to_string(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_list_validation() {
        let issuer_id = "urn:uuid:7f1d2d3a-6a4e-4b8a-9d7c-0e9e2a1b3c4d";
        let list = NewStatusList::new(issuer_id, StatusPurpose::Revocation, "H4sIAAAA", 131072);
        assert!(list.validate().is_ok());

        let mut bad = list.clone();
        bad.status_size = 3;
        assert!(bad.validate().is_err());

        let mut bad = list.clone();
        bad.total_entries = 0;
        assert!(bad.validate().is_err());

        let mut bad = list;
        bad.ttl_ms = Some(-1);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_purpose_text_encoding() {
        assert_eq!(
            "suspension".parse::<StatusPurpose>().unwrap(),
            StatusPurpose::Suspension
        );
        assert!("refresh".parse::<StatusPurpose>().is_err());
    }
}
