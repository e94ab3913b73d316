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

//! Assertion: one award of a badge class to a recipient.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::require_object;
use crate::database::universal_types::{validate_identifier, UniversalTimestamp};
use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    pub id: String,
    pub badge_class_id: String,
    pub recipient: Value,
    pub issued_on: UniversalTimestamp,
    pub expires: Option<UniversalTimestamp>,
    pub evidence: Option<Value>,
    pub verification: Option<Value>,
    pub revoked: bool,
    pub revocation_reason: Option<String>,
    pub additional_fields: Value,
    pub created_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAssertion {
    pub id: Option<String>,
    pub badge_class_id: String,
    pub recipient: Value,
    /// Defaults to the insert time.
    pub issued_on: Option<UniversalTimestamp>,
    pub expires: Option<UniversalTimestamp>,
    pub evidence: Option<Value>,
    pub verification: Option<Value>,
    pub additional_fields: Value,
}

impl NewAssertion {
    pub fn new(badge_class_id: impl Into<String>, recipient: Value) -> Self {
        Self {
            id: None,
            badge_class_id: badge_class_id.into(),
            recipient,
            issued_on: None,
            expires: None,
            evidence: None,
            verification: None,
            additional_fields: Value::Object(Default::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(id) = &self.id {
            validate_identifier(id)?;
        }
        validate_identifier(&self.badge_class_id)?;
        validate_recipient(&self.recipient)?;
        if let (Some(issued), Some(expires)) = (&self.issued_on, &self.expires) {
            if expires <= issued {
                return Err(ValidationError::InvalidField {
                    field: "expires",
                    reason: "must be later than issued_on".to_string(),
                });
            }
        }
        require_object("additional_fields", &self.additional_fields)
    }
}

/// Mutable assertion fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssertionPatch {
    pub recipient: Option<Value>,
    pub expires: Option<Option<UniversalTimestamp>>,
    pub evidence: Option<Option<Value>>,
    pub verification: Option<Option<Value>>,
    pub revoked: Option<bool>,
    pub revocation_reason: Option<Option<String>>,
    pub additional_fields: Option<Value>,
}

impl AssertionPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(recipient) = &self.recipient {
            validate_recipient(recipient)?;
        }
        if let Some(fields) = &self.additional_fields {
            require_object("additional_fields", fields)?;
        }
        Ok(())
    }

    /// Patch that marks an assertion revoked.
    pub fn revocation(reason: Option<String>) -> Self {
        Self {
            revoked: Some(true),
            revocation_reason: Some(reason),
            ..Default::default()
        }
    }

    pub fn apply_to(self, current: &mut Assertion) {
        if let Some(recipient) = self.recipient {
            current.recipient = recipient;
        }
        if let Some(expires) = self.expires {
            current.expires = expires;
        }
        if let Some(evidence) = self.evidence {
            current.evidence = evidence;
        }
        if let Some(verification) = self.verification {
            current.verification = verification;
        }
        if let Some(revoked) = self.revoked {
            current.revoked = revoked;
        }
        if let Some(reason) = self.revocation_reason {
            current.revocation_reason = reason;
        }
        if let Some(fields) = self.additional_fields {
            current.additional_fields = fields;
        }
    }
}

/// A recipient is an identity object carrying at least `identity`.
fn validate_recipient(recipient: &Value) -> Result<(), ValidationError> {
    let identity = recipient
        .as_object()
        .and_then(|obj| obj.get("identity"))
        .and_then(Value::as_str);
    match identity {
        Some(identity) if !identity.trim().is_empty() => Ok(()),
        _ => Err(ValidationError::InvalidField {
            field: "recipient",
            reason: "expected an object with a non-empty 'identity'".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assertion_validation() {
        let badge_class_id = "https://example.edu/badges/rust";
        let assertion = NewAssertion::new(
            badge_class_id,
            json!({"type": "email", "identity": "learner@example.edu", "hashed": false}),
        );
        assert!(assertion.validate().is_ok());

        let mut bad = assertion.clone();
        bad.recipient = json!({"type": "email"});
        assert!(bad.validate().is_err());

        let mut bad = assertion;
        let now = UniversalTimestamp::now();
        bad.issued_on = Some(now);
        bad.expires = Some(now);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_revocation_patch() {
        let patch = AssertionPatch::revocation(Some("issued in error".to_string()));
        assert_eq!(patch.revoked, Some(true));
        assert_eq!(
            patch.revocation_reason,
            Some(Some("issued in error".to_string()))
        );
    }
}
