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

//! SQLite-specific database models
//!
//! Timestamps are stored as BIGINT epoch milliseconds, JSON documents as
//! TEXT, and booleans as INTEGER (0/1). Rows convert to domain types with
//! `TryFrom`, since stored text may not decode.

use diesel::prelude::*;

use crate::database::schema::sqlite::*;
use crate::database::universal_types::{
    optional_json_from_text, optional_timestamp_from_millis, UniversalBool, UniversalJson,
    UniversalTimestamp,
};
use crate::error::ConversionError;
use crate::models::{
    Assertion, BadgeClass, Issuer, Platform, StatusList, UserAssertion,
};

fn tags_from_text(text: &str) -> Result<Vec<String>, ConversionError> {
    serde_json::from_str(text).map_err(|source| ConversionError::InvalidJson {
        column: "tags",
        source,
    })
}

pub(crate) fn tags_to_text(tags: &[String]) -> String {
    serde_json::Value::from(tags.to_vec()).to_string()
}

pub(crate) fn optional_json_to_text(value: &Option<serde_json::Value>) -> Option<String> {
    value.as_ref().map(|v| v.to_string())
}

// ============================================================================
// Issuer Models
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = issuers)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteIssuer {
    pub id: String,
    pub name: String,
    pub url: String,
    pub email: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub public_key: Option<String>,
    pub additional_fields: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = issuers)]
pub struct NewSqliteIssuer {
    pub id: String,
    pub name: String,
    pub url: String,
    pub email: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub public_key: Option<String>,
    pub additional_fields: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = issuers)]
#[diesel(treat_none_as_null = true)]
pub struct SqliteIssuerChanges {
    pub name: String,
    pub url: String,
    pub email: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub public_key: Option<String>,
    pub additional_fields: String,
    pub updated_at: i64,
}

impl TryFrom<SqliteIssuer> for Issuer {
    type Error = ConversionError;

    fn try_from(row: SqliteIssuer) -> Result<Self, Self::Error> {
        Ok(Issuer {
            id: row.id,
            name: row.name,
            url: row.url,
            email: row.email,
            description: row.description,
            image: row.image,
            public_key: optional_json_from_text("public_key", row.public_key.as_deref())?,
            additional_fields: UniversalJson::object_from_text(
                "additional_fields",
                &row.additional_fields,
            )?
            .into_inner(),
            created_at: UniversalTimestamp::from_millis(row.created_at)?,
            updated_at: UniversalTimestamp::from_millis(row.updated_at)?,
        })
    }
}

impl From<&Issuer> for SqliteIssuerChanges {
    fn from(issuer: &Issuer) -> Self {
        Self {
            name: issuer.name.clone(),
            url: issuer.url.clone(),
            email: issuer.email.clone(),
            description: issuer.description.clone(),
            image: issuer.image.clone(),
            public_key: optional_json_to_text(&issuer.public_key),
            additional_fields: issuer.additional_fields.to_string(),
            updated_at: issuer.updated_at.to_millis(),
        }
    }
}

// ============================================================================
// Badge Class Models
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = badge_classes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteBadgeClass {
    pub id: String,
    pub issuer_id: String,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub criteria: String,
    pub alignment: Option<String>,
    pub tags: String,
    pub additional_fields: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = badge_classes)]
pub struct NewSqliteBadgeClass {
    pub id: String,
    pub issuer_id: String,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub criteria: String,
    pub alignment: Option<String>,
    pub tags: String,
    pub additional_fields: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = badge_classes)]
#[diesel(treat_none_as_null = true)]
pub struct SqliteBadgeClassChanges {
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub criteria: String,
    pub alignment: Option<String>,
    pub tags: String,
    pub additional_fields: String,
    pub updated_at: i64,
}

impl TryFrom<SqliteBadgeClass> for BadgeClass {
    type Error = ConversionError;

    fn try_from(row: SqliteBadgeClass) -> Result<Self, Self::Error> {
        Ok(BadgeClass {
            id: row.id,
            issuer_id: row.issuer_id,
            name: row.name,
            description: row.description,
            image: row.image,
            criteria: UniversalJson::object_from_text("criteria", &row.criteria)?.into_inner(),
            alignment: optional_json_from_text("alignment", row.alignment.as_deref())?,
            tags: tags_from_text(&row.tags)?,
            additional_fields: UniversalJson::object_from_text(
                "additional_fields",
                &row.additional_fields,
            )?
            .into_inner(),
            created_at: UniversalTimestamp::from_millis(row.created_at)?,
            updated_at: UniversalTimestamp::from_millis(row.updated_at)?,
        })
    }
}

impl From<&BadgeClass> for SqliteBadgeClassChanges {
    fn from(badge: &BadgeClass) -> Self {
        Self {
            name: badge.name.clone(),
            description: badge.description.clone(),
            image: badge.image.clone(),
            criteria: badge.criteria.to_string(),
            alignment: optional_json_to_text(&badge.alignment),
            tags: tags_to_text(&badge.tags),
            additional_fields: badge.additional_fields.to_string(),
            updated_at: badge.updated_at.to_millis(),
        }
    }
}

// ============================================================================
// Assertion Models
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = assertions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteAssertion {
    pub id: String,
    pub badge_class_id: String,
    pub recipient: String,
    pub issued_on: i64,
    pub expires: Option<i64>,
    pub evidence: Option<String>,
    pub verification: Option<String>,
    pub revoked: i32,
    pub revocation_reason: Option<String>,
    pub additional_fields: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = assertions)]
pub struct NewSqliteAssertion {
    pub id: String,
    pub badge_class_id: String,
    pub recipient: String,
    pub issued_on: i64,
    pub expires: Option<i64>,
    pub evidence: Option<String>,
    pub verification: Option<String>,
    pub revoked: i32,
    pub revocation_reason: Option<String>,
    pub additional_fields: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = assertions)]
#[diesel(treat_none_as_null = true)]
pub struct SqliteAssertionChanges {
    pub recipient: String,
    pub expires: Option<i64>,
    pub evidence: Option<String>,
    pub verification: Option<String>,
    pub revoked: i32,
    pub revocation_reason: Option<String>,
    pub additional_fields: String,
    pub updated_at: i64,
}

impl TryFrom<SqliteAssertion> for Assertion {
    type Error = ConversionError;

    fn try_from(row: SqliteAssertion) -> Result<Self, Self::Error> {
        Ok(Assertion {
            id: row.id,
            badge_class_id: row.badge_class_id,
            recipient: UniversalJson::object_from_text("recipient", &row.recipient)?.into_inner(),
            issued_on: UniversalTimestamp::from_millis(row.issued_on)?,
            expires: optional_timestamp_from_millis(row.expires)?,
            evidence: optional_json_from_text("evidence", row.evidence.as_deref())?,
            verification: optional_json_from_text("verification", row.verification.as_deref())?,
            revoked: UniversalBool::from_i32(row.revoked)?.into(),
            revocation_reason: row.revocation_reason,
            additional_fields: UniversalJson::object_from_text(
                "additional_fields",
                &row.additional_fields,
            )?
            .into_inner(),
            created_at: UniversalTimestamp::from_millis(row.created_at)?,
            updated_at: UniversalTimestamp::from_millis(row.updated_at)?,
        })
    }
}

impl From<&Assertion> for SqliteAssertionChanges {
    fn from(assertion: &Assertion) -> Self {
        Self {
            recipient: assertion.recipient.to_string(),
            expires: assertion.expires.map(|t| t.to_millis()),
            evidence: optional_json_to_text(&assertion.evidence),
            verification: optional_json_to_text(&assertion.verification),
            revoked: UniversalBool::new(assertion.revoked).to_i32(),
            revocation_reason: assertion.revocation_reason.clone(),
            additional_fields: assertion.additional_fields.to_string(),
            updated_at: assertion.updated_at.to_millis(),
        }
    }
}

// ============================================================================
// Platform Models
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = platforms)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqlitePlatform {
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub public_key: String,
    pub webhook_url: Option<String>,
    pub status: String,
    pub metadata: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = platforms)]
pub struct NewSqlitePlatform {
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub public_key: String,
    pub webhook_url: Option<String>,
    pub status: String,
    pub metadata: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = platforms)]
#[diesel(treat_none_as_null = true)]
pub struct SqlitePlatformChanges {
    pub name: String,
    pub client_id: String,
    pub public_key: String,
    pub webhook_url: Option<String>,
    pub status: String,
    pub metadata: String,
    pub updated_at: i64,
}

impl TryFrom<SqlitePlatform> for Platform {
    type Error = ConversionError;

    fn try_from(row: SqlitePlatform) -> Result<Self, Self::Error> {
        Ok(Platform {
            id: row.id,
            name: row.name,
            client_id: row.client_id,
            public_key: row.public_key,
            webhook_url: row.webhook_url,
            status: row.status.parse()?,
            metadata: UniversalJson::object_from_text("metadata", &row.metadata)?.into_inner(),
            created_at: UniversalTimestamp::from_millis(row.created_at)?,
            updated_at: UniversalTimestamp::from_millis(row.updated_at)?,
        })
    }
}

impl From<&Platform> for SqlitePlatformChanges {
    fn from(platform: &Platform) -> Self {
        Self {
            name: platform.name.clone(),
            client_id: platform.client_id.clone(),
            public_key: platform.public_key.clone(),
            webhook_url: platform.webhook_url.clone(),
            status: platform.status.as_str().to_string(),
            metadata: platform.metadata.to_string(),
            updated_at: platform.updated_at.to_millis(),
        }
    }
}

// ============================================================================
// User Assertion Models
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = user_assertions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteUserAssertion {
    pub id: String,
    pub user_id: String,
    pub assertion_id: String,
    pub status: String,
    pub metadata: String,
    pub added_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_assertions)]
pub struct NewSqliteUserAssertion {
    pub id: String,
    pub user_id: String,
    pub assertion_id: String,
    pub status: String,
    pub metadata: String,
    pub added_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = user_assertions)]
pub struct SqliteUserAssertionChanges {
    pub status: String,
    pub metadata: String,
    pub updated_at: i64,
}

impl TryFrom<SqliteUserAssertion> for UserAssertion {
    type Error = ConversionError;

    fn try_from(row: SqliteUserAssertion) -> Result<Self, Self::Error> {
        Ok(UserAssertion {
            id: row.id,
            user_id: row.user_id,
            assertion_id: row.assertion_id,
            status: row.status.parse()?,
            metadata: UniversalJson::object_from_text("metadata", &row.metadata)?.into_inner(),
            added_at: UniversalTimestamp::from_millis(row.added_at)?,
            updated_at: UniversalTimestamp::from_millis(row.updated_at)?,
        })
    }
}

impl From<&UserAssertion> for SqliteUserAssertionChanges {
    fn from(entry: &UserAssertion) -> Self {
        Self {
            status: entry.status.as_str().to_string(),
            metadata: entry.metadata.to_string(),
            updated_at: entry.updated_at.to_millis(),
        }
    }
}

// ============================================================================
// Status List Models
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = status_lists)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteStatusList {
    pub id: String,
    pub issuer_id: String,
    pub purpose: String,
    pub status_size: i32,
    pub encoded_list: String,
    pub ttl_ms: Option<i64>,
    pub total_entries: i32,
    pub used_entries: i32,
    pub metadata: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = status_lists)]
pub struct NewSqliteStatusList {
    pub id: String,
    pub issuer_id: String,
    pub purpose: String,
    pub status_size: i32,
    pub encoded_list: String,
    pub ttl_ms: Option<i64>,
    pub total_entries: i32,
    pub used_entries: i32,
    pub metadata: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = status_lists)]
#[diesel(treat_none_as_null = true)]
pub struct SqliteStatusListChanges {
    pub encoded_list: String,
    pub ttl_ms: Option<i64>,
    pub used_entries: i32,
    pub metadata: String,
    pub updated_at: i64,
}

impl TryFrom<SqliteStatusList> for StatusList {
    type Error = ConversionError;

    fn try_from(row: SqliteStatusList) -> Result<Self, Self::Error> {
        Ok(StatusList {
            id: row.id,
            issuer_id: row.issuer_id,
            purpose: row.purpose.parse()?,
            status_size: row.status_size,
            encoded_list: row.encoded_list,
            ttl_ms: row.ttl_ms,
            total_entries: row.total_entries,
            used_entries: row.used_entries,
            metadata: UniversalJson::object_from_text("metadata", &row.metadata)?.into_inner(),
            created_at: UniversalTimestamp::from_millis(row.created_at)?,
            updated_at: UniversalTimestamp::from_millis(row.updated_at)?,
        })
    }
}

impl From<&StatusList> for SqliteStatusListChanges {
    fn from(list: &StatusList) -> Self {
        Self {
            encoded_list: list.encoded_list.clone(),
            ttl_ms: list.ttl_ms,
            used_entries: list.used_entries,
            metadata: list.metadata.to_string(),
            updated_at: list.updated_at.to_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupt_boolean_is_rejected() {
        let row = SqliteAssertion {
            id: "urn:uuid:7f1d2d3a-6a4e-4b8a-9d7c-0e9e2a1b3c4d".to_string(),
            badge_class_id: "https://example.edu/badges/1".to_string(),
            recipient: r#"{"identity":"a@example.edu"}"#.to_string(),
            issued_on: 1_700_000_000_000,
            expires: None,
            evidence: None,
            verification: None,
            revoked: 2,
            revocation_reason: None,
            additional_fields: "{}".to_string(),
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
        };
        assert!(matches!(
            Assertion::try_from(row),
            Err(ConversionError::InvalidBool(2))
        ));
    }

    #[test]
    fn test_tags_text_encoding() {
        let tags = vec!["rust".to_string(), "systems".to_string()];
        assert_eq!(tags_to_text(&tags), r#"["rust","systems"]"#);
        assert_eq!(tags_from_text(&tags_to_text(&tags)).unwrap(), tags);
        assert!(tags_from_text("{}").is_err());
    }
}
