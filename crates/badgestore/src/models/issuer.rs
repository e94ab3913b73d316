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

//! Issuer profile: the organisation that awards badges.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{require_http_url, require_object, require_text};
use crate::database::universal_types::{validate_identifier, UniversalTimestamp};
use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issuer {
    pub id: String,
    pub name: String,
    pub url: String,
    pub email: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub public_key: Option<Value>,
    pub additional_fields: Value,
    pub created_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIssuer {
    /// Generated when absent.
    pub id: Option<String>,
    pub name: String,
    pub url: String,
    pub email: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub public_key: Option<Value>,
    pub additional_fields: Value,
}

impl NewIssuer {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            url: url.into(),
            email: None,
            description: None,
            image: None,
            public_key: None,
            additional_fields: Value::Object(Default::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(id) = &self.id {
            validate_identifier(id)?;
        }
        require_text("name", &self.name)?;
        require_http_url("url", &self.url)?;
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        require_object("additional_fields", &self.additional_fields)
    }
}

/// Mutable issuer fields. `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssuerPatch {
    pub name: Option<String>,
    pub url: Option<String>,
    pub email: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub image: Option<Option<String>>,
    pub public_key: Option<Option<Value>>,
    pub additional_fields: Option<Value>,
}

impl IssuerPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            require_text("name", name)?;
        }
        if let Some(url) = &self.url {
            require_http_url("url", url)?;
        }
        if let Some(Some(email)) = &self.email {
            validate_email(email)?;
        }
        if let Some(fields) = &self.additional_fields {
            require_object("additional_fields", fields)?;
        }
        Ok(())
    }

    /// Merges the patch over `current`, leaving `id` and `created_at` alone.
    pub fn apply_to(self, current: &mut Issuer) {
        if let Some(name) = self.name {
            current.name = name;
        }
        if let Some(url) = self.url {
            current.url = url;
        }
        if let Some(email) = self.email {
            current.email = email;
        }
        if let Some(description) = self.description {
            current.description = description;
        }
        if let Some(image) = self.image {
            current.image = image;
        }
        if let Some(public_key) = self.public_key {
            current.public_key = public_key;
        }
        if let Some(fields) = self.additional_fields {
            current.additional_fields = fields;
        }
    }
}

fn validate_email(email: &str) -> Result<(), ValidationError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ValidationError::InvalidField {
            field: "email",
            reason: format!("'{}' is not an email address", email),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_issuer_validation() {
        let issuer = NewIssuer::new("Example University", "https://example.edu");
        assert!(issuer.validate().is_ok());

        let mut bad = issuer.clone();
        bad.url = "example.edu".to_string();
        assert!(bad.validate().is_err());

        let mut bad = issuer.clone();
        bad.id = Some("not an id".to_string());
        assert!(matches!(
            bad.validate(),
            Err(ValidationError::InvalidIdentifier { .. })
        ));

        let mut bad = issuer;
        bad.email = Some("nobody".to_string());
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_patch_clears_nullable_fields() {
        let now = UniversalTimestamp::now();
        let mut issuer = Issuer {
            id: "urn:uuid:7f1d2d3a-6a4e-4b8a-9d7c-0e9e2a1b3c4d".to_string(),
            name: "Before".to_string(),
            url: "https://example.edu".to_string(),
            email: Some("badges@example.edu".to_string()),
            description: None,
            image: None,
            public_key: None,
            additional_fields: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };
        IssuerPatch {
            name: Some("After".to_string()),
            email: Some(None),
            ..Default::default()
        }
        .apply_to(&mut issuer);
        assert_eq!(issuer.name, "After");
        assert_eq!(issuer.email, None);
        assert_eq!(issuer.created_at, now);
    }
}
