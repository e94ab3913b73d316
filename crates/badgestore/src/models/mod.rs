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

//! Domain models persisted by the repositories.
//!
//! Each entity module defines three shapes:
//! - the persisted entity (`Issuer`, `BadgeClass`, ...)
//! - a `New*` input used by `create`, whose `id` is optional
//! - a `*Patch` input used by `update`, carrying only mutable fields
//!
//! Identifiers and creation timestamps never appear in patches, so the
//! immutable columns cannot reach an update's write-set.

pub mod assertion;
pub mod badge_class;
pub mod issuer;
pub mod platform;
pub mod status_list;
pub mod user_assertion;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

pub use assertion::{Assertion, AssertionPatch, NewAssertion};
pub use badge_class::{BadgeClass, BadgeClassPatch, NewBadgeClass};
pub use issuer::{Issuer, IssuerPatch, NewIssuer};
pub use platform::{NewPlatform, Platform, PlatformPatch, PlatformStatus};
pub use status_list::{NewStatusList, StatusList, StatusListPatch, StatusPurpose};
pub use user_assertion::{NewUserAssertion, UserAssertion, UserAssertionPatch, UserAssertionStatus};

/// Explicit tag naming the entity an operation touches.
///
/// Callers pass this tag alongside each operation rather than having it
/// inferred from log labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Issuer,
    BadgeClass,
    Assertion,
    UserAssertion,
    Platform,
    StatusList,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::Issuer,
        EntityType::BadgeClass,
        EntityType::Assertion,
        EntityType::UserAssertion,
        EntityType::Platform,
        EntityType::StatusList,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Issuer => "issuer",
            EntityType::BadgeClass => "badge_class",
            EntityType::Assertion => "assertion",
            EntityType::UserAssertion => "user_assertion",
            EntityType::Platform => "platform",
            EntityType::StatusList => "status_list",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejects empty or whitespace-only required text fields.
pub(crate) fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

/// Requires a JSON value to be an object (free-form metadata columns).
pub(crate) fn require_object(
    field: &'static str,
    value: &serde_json::Value,
) -> Result<(), ValidationError> {
    if !value.is_object() {
        return Err(ValidationError::InvalidField {
            field,
            reason: "expected a JSON object".to_string(),
        });
    }
    Ok(())
}

/// Requires an http(s) URL.
pub(crate) fn require_http_url(field: &'static str, value: &str) -> Result<(), ValidationError> {
    match url::Url::parse(value) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => Ok(()),
        Ok(parsed) => Err(ValidationError::InvalidField {
            field,
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        }),
        Err(e) => Err(ValidationError::InvalidField {
            field,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_type_labels_are_stable() {
        assert_eq!(EntityType::BadgeClass.to_string(), "badge_class");
        assert_eq!(EntityType::ALL.len(), 6);
        assert_eq!(
            serde_json::to_string(&EntityType::UserAssertion).unwrap(),
            "\"user_assertion\""
        );
    }

    #[test]
    fn test_field_helpers() {
        assert!(require_text("name", "Example").is_ok());
        assert_eq!(
            require_text("name", "   "),
            Err(ValidationError::MissingField("name"))
        );
        assert!(require_object("metadata", &json!({"a": 1})).is_ok());
        assert!(require_object("metadata", &json!([1, 2])).is_err());
        assert!(require_http_url("url", "https://issuer.example.org").is_ok());
        assert!(require_http_url("url", "ftp://issuer.example.org").is_err());
        assert!(require_http_url("url", "not a url").is_err());
    }
}
