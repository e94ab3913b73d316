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

//! Universal type wrappers for cross-database compatibility
//!
//! Domain models use these wrappers; backend-specific row models hold the
//! engine's native column types and convert at the DAL boundary.
//!
//! | Wrapper              | SQLite column        | PostgreSQL column |
//! |----------------------|----------------------|-------------------|
//! | `UniversalTimestamp` | `BIGINT` epoch ms    | `TIMESTAMPTZ`     |
//! | `UniversalBool`      | `INTEGER` 0/1        | `BOOLEAN`         |
//! | `UniversalJson`      | `TEXT`               | `JSONB`           |
//! | `UniversalUuid`      | `TEXT` (`urn:uuid:`) | `TEXT`            |
//!
//! Every conversion here is pure. Decoding stored values is fallible and
//! reports a [`ConversionError`]; encoding never fails.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ConversionError, ValidationError};

/// Longest identifier accepted by [`validate_identifier`].
pub const MAX_IDENTIFIER_LEN: usize = 2048;

const URN_UUID_PREFIX: &str = "urn:uuid:";

/// Universal UUID wrapper.
///
/// Entity identifiers are opaque strings; generated ones take the
/// `urn:uuid:<v4>` form.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct UniversalUuid(pub Uuid);

impl UniversalUuid {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Renders the `urn:uuid:` form used for generated entity identifiers.
    pub fn to_urn(&self) -> String {
        format!("{}{}", URN_UUID_PREFIX, self.0.hyphenated())
    }

    /// Parses either a bare UUID or its `urn:uuid:` form.
    pub fn parse(value: &str) -> Result<Self, uuid::Error> {
        let bare = value.strip_prefix(URN_UUID_PREFIX).unwrap_or(value);
        Uuid::parse_str(bare).map(UniversalUuid)
    }
}

impl fmt::Display for UniversalUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UniversalUuid {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Generates a fresh entity identifier.
pub fn generate_id() -> String {
    UniversalUuid::new_v4().to_urn()
}

/// Universal timestamp wrapper.
///
/// Values are truncated to millisecond precision on construction so that a
/// timestamp read back from SQLite's epoch-millisecond column compares equal
/// to the one written.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UniversalTimestamp(pub DateTime<Utc>);

impl UniversalTimestamp {
    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    pub fn into_inner(self) -> DateTime<Utc> {
        self.0
    }

    /// Convert to epoch milliseconds for SQLite BIGINT storage
    pub fn to_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Create from epoch milliseconds (SQLite BIGINT)
    pub fn from_millis(millis: i64) -> Result<Self, ConversionError> {
        DateTime::from_timestamp_millis(millis)
            .map(UniversalTimestamp)
            .ok_or(ConversionError::InvalidTimestamp(millis))
    }
}

impl fmt::Display for UniversalTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for UniversalTimestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt.trunc_subsecs(3))
    }
}

impl From<UniversalTimestamp> for DateTime<Utc> {
    fn from(wrapper: UniversalTimestamp) -> Self {
        wrapper.0
    }
}

/// Helper function for current timestamp
pub fn current_timestamp() -> UniversalTimestamp {
    UniversalTimestamp::now()
}

/// Universal boolean wrapper.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct UniversalBool(pub bool);

impl UniversalBool {
    pub fn new(value: bool) -> Self {
        Self(value)
    }

    pub fn is_true(&self) -> bool {
        self.0
    }

    /// Convert to i32 for SQLite INTEGER storage
    pub fn to_i32(&self) -> i32 {
        if self.0 {
            1
        } else {
            0
        }
    }

    /// Create from i32 (SQLite INTEGER). Anything other than 0 or 1 is a
    /// corrupted row rather than a truthy value.
    pub fn from_i32(value: i32) -> Result<Self, ConversionError> {
        match value {
            0 => Ok(Self(false)),
            1 => Ok(Self(true)),
            other => Err(ConversionError::InvalidBool(other)),
        }
    }
}

impl From<bool> for UniversalBool {
    fn from(value: bool) -> Self {
        Self(value)
    }
}

impl From<UniversalBool> for bool {
    fn from(wrapper: UniversalBool) -> Self {
        wrapper.0
    }
}

/// Universal JSON wrapper for free-form document columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniversalJson(pub serde_json::Value);

impl UniversalJson {
    pub fn empty_object() -> Self {
        Self(serde_json::Value::Object(serde_json::Map::new()))
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }

    /// Convert to compact JSON text for SQLite TEXT storage
    pub fn to_text(&self) -> String {
        self.0.to_string()
    }

    /// Create from JSON text (SQLite TEXT). `column` names the source column
    /// in the error.
    pub fn from_text(column: &'static str, text: &str) -> Result<Self, ConversionError> {
        serde_json::from_str(text)
            .map(UniversalJson)
            .map_err(|source| ConversionError::InvalidJson { column, source })
    }

    /// Like [`UniversalJson::from_text`] but additionally requires an object.
    pub fn object_from_text(column: &'static str, text: &str) -> Result<Self, ConversionError> {
        let json = Self::from_text(column, text)?;
        if !json.0.is_object() {
            return Err(ConversionError::UnexpectedJsonShape {
                column,
                expected: "object",
            });
        }
        Ok(json)
    }

    /// Like [`UniversalJson::from_text`] but additionally requires an array.
    pub fn array_from_text(column: &'static str, text: &str) -> Result<Self, ConversionError> {
        let json = Self::from_text(column, text)?;
        if !json.0.is_array() {
            return Err(ConversionError::UnexpectedJsonShape {
                column,
                expected: "array",
            });
        }
        Ok(json)
    }
}

impl From<serde_json::Value> for UniversalJson {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl From<UniversalJson> for serde_json::Value {
    fn from(wrapper: UniversalJson) -> Self {
        wrapper.0
    }
}

/// Decodes an optional SQLite JSON TEXT column.
pub fn optional_json_from_text(
    column: &'static str,
    text: Option<&str>,
) -> Result<Option<serde_json::Value>, ConversionError> {
    text.map(|t| UniversalJson::from_text(column, t).map(UniversalJson::into_inner))
        .transpose()
}

/// Decodes an optional SQLite BIGINT millisecond column.
pub fn optional_timestamp_from_millis(
    millis: Option<i64>,
) -> Result<Option<UniversalTimestamp>, ConversionError> {
    millis.map(UniversalTimestamp::from_millis).transpose()
}

/// Checks that `value` is usable as an entity identifier.
///
/// Accepted forms are a bare UUID, `urn:uuid:<uuid>`, or any absolute IRI
/// with a scheme (`https://issuer.example.org/badges/1`, `did:web:...`).
pub fn validate_identifier(value: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidIdentifier {
        value: value.chars().take(64).collect(),
        reason: reason.to_string(),
    };

    if value.is_empty() {
        return Err(invalid("identifier is empty"));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(invalid("identifier is too long"));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid("identifier contains whitespace or control characters"));
    }
    if Uuid::parse_str(value).is_ok() {
        return Ok(());
    }
    if let Some(rest) = value.strip_prefix(URN_UUID_PREFIX) {
        return Uuid::parse_str(rest)
            .map(|_| ())
            .map_err(|_| invalid("malformed urn:uuid identifier"));
    }
    match url::Url::parse(value) {
        Ok(_) => Ok(()),
        Err(_) => Err(invalid("identifier is neither a UUID nor an absolute IRI")),
    }
}
