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

//! Badge class: the achievement definition an issuer awards.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{require_object, require_text};
use crate::database::universal_types::{validate_identifier, UniversalTimestamp};
use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeClass {
    pub id: String,
    pub issuer_id: String,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub criteria: Value,
    pub alignment: Option<Value>,
    pub tags: Vec<String>,
    pub additional_fields: Value,
    pub created_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBadgeClass {
    pub id: Option<String>,
    pub issuer_id: String,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub criteria: Value,
    pub alignment: Option<Value>,
    pub tags: Vec<String>,
    pub additional_fields: Value,
}

impl NewBadgeClass {
    pub fn new(
        issuer_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            issuer_id: issuer_id.into(),
            name: name.into(),
            description: description.into(),
            image: None,
            criteria: Value::Object(Default::default()),
            alignment: None,
            tags: Vec::new(),
            additional_fields: Value::Object(Default::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(id) = &self.id {
            validate_identifier(id)?;
        }
        validate_identifier(&self.issuer_id)?;
        require_text("name", &self.name)?;
        require_text("description", &self.description)?;
        require_object("criteria", &self.criteria)?;
        if let Some(alignment) = &self.alignment {
            validate_alignment(alignment)?;
        }
        require_object("additional_fields", &self.additional_fields)
    }
}

/// Mutable badge class fields. The owning issuer cannot be changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BadgeClassPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<Option<String>>,
    pub criteria: Option<Value>,
    pub alignment: Option<Option<Value>>,
    pub tags: Option<Vec<String>>,
    pub additional_fields: Option<Value>,
}

impl BadgeClassPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            require_text("name", name)?;
        }
        if let Some(description) = &self.description {
            require_text("description", description)?;
        }
        if let Some(criteria) = &self.criteria {
            require_object("criteria", criteria)?;
        }
        if let Some(Some(alignment)) = &self.alignment {
            validate_alignment(alignment)?;
        }
        if let Some(fields) = &self.additional_fields {
            require_object("additional_fields", fields)?;
        }
        Ok(())
    }

    pub fn apply_to(self, current: &mut BadgeClass) {
        if let Some(name) = self.name {
            current.name = name;
        }
        if let Some(description) = self.description {
            current.description = description;
        }
        if let Some(image) = self.image {
            current.image = image;
        }
        if let Some(criteria) = self.criteria {
            current.criteria = criteria;
        }
        if let Some(alignment) = self.alignment {
            current.alignment = alignment;
        }
        if let Some(tags) = self.tags {
            current.tags = tags;
        }
        if let Some(fields) = self.additional_fields {
            current.additional_fields = fields;
        }
    }
}

fn validate_alignment(alignment: &Value) -> Result<(), ValidationError> {
    if alignment.is_array() {
        Ok(())
    } else {
        Err(ValidationError::InvalidField {
            field: "alignment",
            reason: "expected a JSON array".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_badge_class_validation() {
        let issuer_id = "urn:uuid:7f1d2d3a-6a4e-4b8a-9d7c-0e9e2a1b3c4d";
        let badge = NewBadgeClass::new(issuer_id, "Rustacean", "Wrote some Rust");
        assert!(badge.validate().is_ok());

        let mut bad = badge.clone();
        bad.issuer_id = String::new();
        assert!(bad.validate().is_err());

        let mut bad = badge.clone();
        bad.alignment = Some(json!({"targetName": "x"}));
        assert!(bad.validate().is_err());

        let mut bad = badge;
        bad.description = " ".to_string();
        assert_eq!(
            bad.validate(),
            Err(ValidationError::MissingField("description"))
        );
    }
}
