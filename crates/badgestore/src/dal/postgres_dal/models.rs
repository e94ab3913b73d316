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

//! PostgreSQL-specific database models
//!
//! PostgreSQL has native TIMESTAMPTZ, JSONB and BOOLEAN columns, so the only
//! fallible conversions are JSON shape checks and enum text columns.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

use crate::database::schema::postgres::*;
use crate::database::universal_types::UniversalTimestamp;
use crate::error::ConversionError;
use crate::models::{Assertion, BadgeClass, Issuer, Platform, StatusList, UserAssertion};

fn object(column: &'static str, value: Value) -> Result<Value, ConversionError> {
    if value.is_object() {
        Ok(value)
    } else {
        Err(ConversionError::UnexpectedJsonShape {
            column,
            expected: "object",
        })
    }
}

fn tags_from_json(value: Value) -> Result<Vec<String>, ConversionError> {
    serde_json::from_value(value).map_err(|source| ConversionError::InvalidJson {
        column: "tags",
        source,
    })
}

pub(crate) fn tags_to_json(tags: &[String]) -> Value {
    Value::from(tags.to_vec())
}

// ============================================================================
// Issuer Models
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = issuers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PgIssuer {
    pub id: String,
    pub name: String,
    pub url: String,
    pub email: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub public_key: Option<Value>,
    pub additional_fields: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = issuers)]
pub struct NewPgIssuer {
    pub id: String,
    pub name: String,
    pub url: String,
    pub email: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub public_key: Option<Value>,
    pub additional_fields: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = issuers)]
#[diesel(treat_none_as_null = true)]
pub struct PgIssuerChanges {
    pub name: String,
    pub url: String,
    pub email: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub public_key: Option<Value>,
    pub additional_fields: Value,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PgIssuer> for Issuer {
    type Error = ConversionError;

    fn try_from(row: PgIssuer) -> Result<Self, Self::Error> {
        Ok(Issuer {
            id: row.id,
            name: row.name,
            url: row.url,
            email: row.email,
            description: row.description,
            image: row.image,
            public_key: row.public_key,
            additional_fields: object("additional_fields", row.additional_fields)?,
            created_at: UniversalTimestamp::from(row.created_at),
            updated_at: UniversalTimestamp::from(row.updated_at),
        })
    }
}

impl From<&Issuer> for PgIssuerChanges {
    fn from(issuer: &Issuer) -> Self {
        Self {
            name: issuer.name.clone(),
            url: issuer.url.clone(),
            email: issuer.email.clone(),
            description: issuer.description.clone(),
            image: issuer.image.clone(),
            public_key: issuer.public_key.clone(),
            additional_fields: issuer.additional_fields.clone(),
            updated_at: issuer.updated_at.into_inner(),
        }
    }
}

// ============================================================================
// Badge Class Models
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = badge_classes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PgBadgeClass {
    pub id: String,
    pub issuer_id: String,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub criteria: Value,
    pub alignment: Option<Value>,
    pub tags: Value,
    pub additional_fields: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = badge_classes)]
pub struct NewPgBadgeClass {
    pub id: String,
    pub issuer_id: String,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub criteria: Value,
    pub alignment: Option<Value>,
    pub tags: Value,
    pub additional_fields: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = badge_classes)]
#[diesel(treat_none_as_null = true)]
pub struct PgBadgeClassChanges {
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub criteria: Value,
    pub alignment: Option<Value>,
    pub tags: Value,
    pub additional_fields: Value,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PgBadgeClass> for BadgeClass {
    type Error = ConversionError;

    fn try_from(row: PgBadgeClass) -> Result<Self, Self::Error> {
        Ok(BadgeClass {
            id: row.id,
            issuer_id: row.issuer_id,
            name: row.name,
            description: row.description,
            image: row.image,
            criteria: object("criteria", row.criteria)?,
            alignment: row.alignment,
            tags: tags_from_json(row.tags)?,
            additional_fields: object("additional_fields", row.additional_fields)?,
            created_at: UniversalTimestamp::from(row.created_at),
            updated_at: UniversalTimestamp::from(row.updated_at),
        })
    }
}

impl From<&BadgeClass> for PgBadgeClassChanges {
    fn from(badge: &BadgeClass) -> Self {
        Self {
            name: badge.name.clone(),
            description: badge.description.clone(),
            image: badge.image.clone(),
            criteria: badge.criteria.clone(),
            alignment: badge.alignment.clone(),
            tags: tags_to_json(&badge.tags),
            additional_fields: badge.additional_fields.clone(),
            updated_at: badge.updated_at.into_inner(),
        }
    }
}

// ============================================================================
// Assertion Models
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = assertions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PgAssertion {
    pub id: String,
    pub badge_class_id: String,
    pub recipient: Value,
    pub issued_on: DateTime<Utc>,
    pub expires: Option<DateTime<Utc>>,
    pub evidence: Option<Value>,
    pub verification: Option<Value>,
    pub revoked: bool,
    pub revocation_reason: Option<String>,
    pub additional_fields: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = assertions)]
pub struct NewPgAssertion {
    pub id: String,
    pub badge_class_id: String,
    pub recipient: Value,
    pub issued_on: DateTime<Utc>,
    pub expires: Option<DateTime<Utc>>,
    pub evidence: Option<Value>,
    pub verification: Option<Value>,
    pub revoked: bool,
    pub revocation_reason: Option<String>,
    pub additional_fields: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = assertions)]
#[diesel(treat_none_as_null = true)]
pub struct PgAssertionChanges {
    pub recipient: Value,
    pub expires: Option<DateTime<Utc>>,
    pub evidence: Option<Value>,
    pub verification: Option<Value>,
    pub revoked: bool,
    pub revocation_reason: Option<String>,
    pub additional_fields: Value,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PgAssertion> for Assertion {
    type Error = ConversionError;

    fn try_from(row: PgAssertion) -> Result<Self, Self::Error> {
        Ok(Assertion {
            id: row.id,
            badge_class_id: row.badge_class_id,
            recipient: object("recipient", row.recipient)?,
            issued_on: UniversalTimestamp::from(row.issued_on),
            expires: row.expires.map(UniversalTimestamp::from),
            evidence: row.evidence,
            verification: row.verification,
            revoked: row.revoked,
            revocation_reason: row.revocation_reason,
            additional_fields: object("additional_fields", row.additional_fields)?,
            created_at: UniversalTimestamp::from(row.created_at),
            updated_at: UniversalTimestamp::from(row.updated_at),
        })
    }
}

impl From<&Assertion> for PgAssertionChanges {
    fn from(assertion: &Assertion) -> Self {
        Self {
            recipient: assertion.recipient.clone(),
            expires: assertion.expires.map(UniversalTimestamp::into_inner),
            evidence: assertion.evidence.clone(),
            verification: assertion.verification.clone(),
            revoked: assertion.revoked,
            revocation_reason: assertion.revocation_reason.clone(),
            additional_fields: assertion.additional_fields.clone(),
            updated_at: assertion.updated_at.into_inner(),
        }
    }
}

// ============================================================================
// Platform Models
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = platforms)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PgPlatform {
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub public_key: String,
    pub webhook_url: Option<String>,
    pub status: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = platforms)]
pub struct NewPgPlatform {
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub public_key: String,
    pub webhook_url: Option<String>,
    pub status: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = platforms)]
#[diesel(treat_none_as_null = true)]
pub struct PgPlatformChanges {
    pub name: String,
    pub client_id: String,
    pub public_key: String,
    pub webhook_url: Option<String>,
    pub status: String,
    pub metadata: Value,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PgPlatform> for Platform {
    type Error = ConversionError;

    fn try_from(row: PgPlatform) -> Result<Self, Self::Error> {
        Ok(Platform {
            id: row.id,
            name: row.name,
            client_id: row.client_id,
            public_key: row.public_key,
            webhook_url: row.webhook_url,
            status: row.status.parse()?,
            metadata: object("metadata", row.metadata)?,
            created_at: UniversalTimestamp::from(row.created_at),
            updated_at: UniversalTimestamp::from(row.updated_at),
        })
    }
}

impl From<&Platform> for PgPlatformChanges {
    fn from(platform: &Platform) -> Self {
        Self {
            name: platform.name.clone(),
            client_id: platform.client_id.clone(),
            public_key: platform.public_key.clone(),
            webhook_url: platform.webhook_url.clone(),
            status: platform.status.as_str().to_string(),
            metadata: platform.metadata.clone(),
            updated_at: platform.updated_at.into_inner(),
        }
    }
}

// ============================================================================
// User Assertion Models
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = user_assertions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PgUserAssertion {
    pub id: String,
    pub user_id: String,
    pub assertion_id: String,
    pub status: String,
    pub metadata: Value,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_assertions)]
pub struct NewPgUserAssertion {
    pub id: String,
    pub user_id: String,
    pub assertion_id: String,
    pub status: String,
    pub metadata: Value,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = user_assertions)]
pub struct PgUserAssertionChanges {
    pub status: String,
    pub metadata: Value,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PgUserAssertion> for UserAssertion {
    type Error = ConversionError;

    fn try_from(row: PgUserAssertion) -> Result<Self, Self::Error> {
        Ok(UserAssertion {
            id: row.id,
            user_id: row.user_id,
            assertion_id: row.assertion_id,
            status: row.status.parse()?,
            metadata: object("metadata", row.metadata)?,
            added_at: UniversalTimestamp::from(row.added_at),
            updated_at: UniversalTimestamp::from(row.updated_at),
        })
    }
}

impl From<&UserAssertion> for PgUserAssertionChanges {
    fn from(entry: &UserAssertion) -> Self {
        Self {
            status: entry.status.as_str().to_string(),
            metadata: entry.metadata.clone(),
            updated_at: entry.updated_at.into_inner(),
        }
    }
}

// ============================================================================
// Status List Models
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = status_lists)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PgStatusList {
    pub id: String,
    pub issuer_id: String,
    pub purpose: String,
    pub status_size: i32,
    pub encoded_list: String,
    pub ttl_ms: Option<i64>,
    pub total_entries: i32,
    pub used_entries: i32,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = status_lists)]
pub struct NewPgStatusList {
    pub id: String,
    pub issuer_id: String,
    pub purpose: String,
    pub status_size: i32,
    pub encoded_list: String,
    pub ttl_ms: Option<i64>,
    pub total_entries: i32,
    pub used_entries: i32,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = status_lists)]
#[diesel(treat_none_as_null = true)]
pub struct PgStatusListChanges {
    pub encoded_list: String,
    pub ttl_ms: Option<i64>,
    pub used_entries: i32,
    pub metadata: Value,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PgStatusList> for StatusList {
    type Error = ConversionError;

    fn try_from(row: PgStatusList) -> Result<Self, Self::Error> {
        Ok(StatusList {
            id: row.id,
            issuer_id: row.issuer_id,
            purpose: row.purpose.parse()?,
            status_size: row.status_size,
            encoded_list: row.encoded_list,
            ttl_ms: row.ttl_ms,
            total_entries: row.total_entries,
            used_entries: row.used_entries,
            metadata: object("metadata", row.metadata)?,
            created_at: UniversalTimestamp::from(row.created_at),
            updated_at: UniversalTimestamp::from(row.updated_at),
        })
    }
}

impl From<&StatusList> for PgStatusListChanges {
    fn from(list: &StatusList) -> Self {
        Self {
            encoded_list: list.encoded_list.clone(),
            ttl_ms: list.ttl_ms,
            used_entries: list.used_entries,
            metadata: list.metadata.clone(),
            updated_at: list.updated_at.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_non_object_metadata_is_rejected() {
        let now = Utc::now();
        let row = PgPlatform {
            id: "urn:uuid:7f1d2d3a-6a4e-4b8a-9d7c-0e9e2a1b3c4d".to_string(),
            name: "LMS".to_string(),
            client_id: "lms".to_string(),
            public_key: "key".to_string(),
            webhook_url: None,
            status: "active".to_string(),
            metadata: json!([1, 2]),
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(
            Platform::try_from(row),
            Err(ConversionError::UnexpectedJsonShape {
                column: "metadata",
                ..
            })
        ));
    }

    #[test]
    fn test_tags_decode_from_jsonb_array() {
        assert_eq!(
            tags_from_json(json!(["a", "b"])).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(tags_from_json(json!({"a": 1})).is_err());
    }
}
