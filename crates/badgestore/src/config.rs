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

//! Configuration types for the connection manager.
//!
//! [`ConnectionConfig`] is validated once by its builder and is immutable
//! afterwards. [`DatabaseConfig`] pairs it with the database URL and can be
//! loaded from the environment.
//!
//! ```rust,ignore
//! let config = ConnectionConfig::builder()
//!     .max_connection_attempts(5)
//!     .connection_retry_delay(Duration::from_millis(250))
//!     .build()?;
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_MAX_CONNECTION_ATTEMPTS: u32 = 3;
pub const DEFAULT_CONNECTION_RETRY_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_SYNC_MODE: &str = "NORMAL";
pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5000;
pub const DEFAULT_CACHE_SIZE: i64 = -64000;
pub const DEFAULT_JOURNAL_MODE: &str = "WAL";
pub const DEFAULT_TEMP_STORE: &str = "MEMORY";
pub const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_CONNECTION_ATTEMPTS: u32 = 20;
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);
const MAX_BUSY_TIMEOUT_MS: u32 = 600_000;

/// Connection manager configuration.
///
/// `sync_mode` and `busy_timeout_ms` back CRITICAL tuning settings; the
/// journal, cache and temp-store values back OPTIONAL ones. Engine vocabulary
/// for the string values is checked when the settings are applied, since it
/// differs between SQLite and PostgreSQL.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ConnectionConfig {
    max_connection_attempts: u32,
    connection_retry_delay: Duration,
    sync_mode: String,
    busy_timeout_ms: u32,
    cache_size: i64,
    journal_mode: String,
    temp_store: String,
    health_check_timeout: Duration,
}

impl ConnectionConfig {
    /// Creates a new configuration builder with default values.
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// Maximum number of probe attempts per `connect()`.
    pub fn max_connection_attempts(&self) -> u32 {
        self.max_connection_attempts
    }

    /// Base delay for exponential backoff between attempts.
    pub fn connection_retry_delay(&self) -> Duration {
        self.connection_retry_delay
    }

    pub fn sync_mode(&self) -> &str {
        &self.sync_mode
    }

    pub fn busy_timeout_ms(&self) -> u32 {
        self.busy_timeout_ms
    }

    /// Page cache size. Negative values are KiB, positive values are pages.
    pub fn cache_size(&self) -> i64 {
        self.cache_size
    }

    pub fn journal_mode(&self) -> &str {
        &self.journal_mode
    }

    pub fn temp_store(&self) -> &str {
        &self.temp_store
    }

    /// Upper bound on the probe issued by `get_health()`.
    pub fn health_check_timeout(&self) -> Duration {
        self.health_check_timeout
    }

    /// Delay slept before `attempt` (1-based). The first attempt is immediate;
    /// attempt `n >= 2` waits `base * 2^(n-1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.connection_retry_delay.saturating_mul(factor)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfigBuilder::default().unchecked()
    }
}

/// Builder for [`ConnectionConfig`].
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl Default for ConnectionConfigBuilder {
    fn default() -> Self {
        Self {
            config: ConnectionConfig {
                max_connection_attempts: DEFAULT_MAX_CONNECTION_ATTEMPTS,
                connection_retry_delay: DEFAULT_CONNECTION_RETRY_DELAY,
                sync_mode: DEFAULT_SYNC_MODE.to_string(),
                busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
                cache_size: DEFAULT_CACHE_SIZE,
                journal_mode: DEFAULT_JOURNAL_MODE.to_string(),
                temp_store: DEFAULT_TEMP_STORE.to_string(),
                health_check_timeout: DEFAULT_HEALTH_CHECK_TIMEOUT,
            },
        }
    }
}

impl ConnectionConfigBuilder {
    /// Sets the maximum number of connection attempts (1..=20).
    pub fn max_connection_attempts(mut self, value: u32) -> Self {
        self.config.max_connection_attempts = value;
        self
    }

    /// Sets the base retry delay (at most 60 seconds).
    pub fn connection_retry_delay(mut self, value: Duration) -> Self {
        self.config.connection_retry_delay = value;
        self
    }

    /// Sets the synchronous / commit durability mode.
    pub fn sync_mode(mut self, value: impl Into<String>) -> Self {
        self.config.sync_mode = value.into();
        self
    }

    /// Sets the lock-wait timeout in milliseconds (1..=600000).
    pub fn busy_timeout_ms(mut self, value: u32) -> Self {
        self.config.busy_timeout_ms = value;
        self
    }

    /// Sets the cache size hint.
    pub fn cache_size(mut self, value: i64) -> Self {
        self.config.cache_size = value;
        self
    }

    /// Sets the journal mode.
    pub fn journal_mode(mut self, value: impl Into<String>) -> Self {
        self.config.journal_mode = value.into();
        self
    }

    /// Sets the temp-store location.
    pub fn temp_store(mut self, value: impl Into<String>) -> Self {
        self.config.temp_store = value.into();
        self
    }

    /// Sets the health probe timeout.
    pub fn health_check_timeout(mut self, value: Duration) -> Self {
        self.config.health_check_timeout = value;
        self
    }

    /// Validates ranges and builds the configuration.
    pub fn build(self) -> Result<ConnectionConfig, ConfigError> {
        let c = &self.config;
        if c.max_connection_attempts == 0 || c.max_connection_attempts > MAX_CONNECTION_ATTEMPTS {
            return Err(ConfigError::InvalidValue {
                field: "max_connection_attempts",
                value: c.max_connection_attempts.to_string(),
                reason: "must be between 1 and 20",
            });
        }
        if c.connection_retry_delay > MAX_RETRY_DELAY {
            return Err(ConfigError::InvalidValue {
                field: "connection_retry_delay",
                value: format!("{}ms", c.connection_retry_delay.as_millis()),
                reason: "must be at most 60 seconds",
            });
        }
        if c.busy_timeout_ms == 0 || c.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
            return Err(ConfigError::InvalidValue {
                field: "busy_timeout_ms",
                value: c.busy_timeout_ms.to_string(),
                reason: "must be between 1 and 600000",
            });
        }
        if c.cache_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache_size",
                value: "0".to_string(),
                reason: "must be non-zero",
            });
        }
        for (field, value) in [
            ("sync_mode", &c.sync_mode),
            ("journal_mode", &c.journal_mode),
            ("temp_store", &c.temp_store),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field,
                    value: value.clone(),
                    reason: "must not be empty",
                });
            }
        }
        if c.health_check_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "health_check_timeout",
                value: "0ms".to_string(),
                reason: "must be greater than zero",
            });
        }
        Ok(self.config)
    }

    fn unchecked(self) -> ConnectionConfig {
        self.config
    }
}

/// Database URL plus connection manager settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub connection: ConnectionConfig,
}

impl DatabaseConfig {
    pub fn new(database_url: impl Into<String>, connection: ConnectionConfig) -> Self {
        Self {
            database_url: database_url.into(),
            connection,
        }
    }

    /// Loads `.env` (if present) and reads:
    ///
    /// - `DATABASE_URL` (required)
    /// - `BADGESTORE_DB_MAX_CONNECTION_ATTEMPTS`
    /// - `BADGESTORE_DB_RETRY_DELAY_MS`
    /// - `BADGESTORE_DB_SYNC_MODE`
    /// - `BADGESTORE_DB_BUSY_TIMEOUT_MS`
    /// - `BADGESTORE_DB_CACHE_SIZE`
    /// - `BADGESTORE_DB_JOURNAL_MODE`
    /// - `BADGESTORE_DB_TEMP_STORE`
    /// - `BADGESTORE_DB_HEALTH_CHECK_TIMEOUT_MS`
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let mut builder = ConnectionConfig::builder();
        if let Some(v) = parse_var::<u32>(&lookup, "BADGESTORE_DB_MAX_CONNECTION_ATTEMPTS")? {
            builder = builder.max_connection_attempts(v);
        }
        if let Some(v) = parse_var::<u64>(&lookup, "BADGESTORE_DB_RETRY_DELAY_MS")? {
            builder = builder.connection_retry_delay(Duration::from_millis(v));
        }
        if let Some(v) = lookup("BADGESTORE_DB_SYNC_MODE") {
            builder = builder.sync_mode(v);
        }
        if let Some(v) = parse_var::<u32>(&lookup, "BADGESTORE_DB_BUSY_TIMEOUT_MS")? {
            builder = builder.busy_timeout_ms(v);
        }
        if let Some(v) = parse_var::<i64>(&lookup, "BADGESTORE_DB_CACHE_SIZE")? {
            builder = builder.cache_size(v);
        }
        if let Some(v) = lookup("BADGESTORE_DB_JOURNAL_MODE") {
            builder = builder.journal_mode(v);
        }
        if let Some(v) = lookup("BADGESTORE_DB_TEMP_STORE") {
            builder = builder.temp_store(v);
        }
        if let Some(v) = parse_var::<u64>(&lookup, "BADGESTORE_DB_HEALTH_CHECK_TIMEOUT_MS")? {
            builder = builder.health_check_timeout(Duration::from_millis(v));
        }

        Ok(Self {
            database_url,
            connection: builder.build()?,
        })
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                field: key,
                value: raw,
                reason: "not a valid number",
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::builder().build().unwrap();
        assert_eq!(config.max_connection_attempts(), 3);
        assert_eq!(config.connection_retry_delay(), Duration::from_millis(1000));
        assert_eq!(config.sync_mode(), "NORMAL");
        assert_eq!(config.busy_timeout_ms(), 5000);
        assert_eq!(config.cache_size(), -64000);
        assert_eq!(config.journal_mode(), "WAL");
        assert_eq!(config.temp_store(), "MEMORY");
        assert_eq!(config, ConnectionConfig::default());
    }

    #[test]
    fn test_range_validation() {
        let err = ConnectionConfig::builder()
            .max_connection_attempts(0)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "max_connection_attempts",
                ..
            }
        ));

        assert!(ConnectionConfig::builder()
            .connection_retry_delay(Duration::from_secs(61))
            .build()
            .is_err());
        assert!(ConnectionConfig::builder().busy_timeout_ms(0).build().is_err());
        assert!(ConnectionConfig::builder().cache_size(0).build().is_err());
        assert!(ConnectionConfig::builder().sync_mode(" ").build().is_err());
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let config = ConnectionConfig::builder()
            .connection_retry_delay(Duration::from_millis(100))
            .build()
            .unwrap();
        assert_eq!(config.backoff_delay(1), Duration::ZERO);
        assert_eq!(config.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("DATABASE_URL", "sqlite:///tmp/badges.db"),
            ("BADGESTORE_DB_MAX_CONNECTION_ATTEMPTS", "5"),
            ("BADGESTORE_DB_SYNC_MODE", "FULL"),
            ("BADGESTORE_DB_RETRY_DELAY_MS", "250"),
        ]
        .into_iter()
        .collect();
        let config =
            DatabaseConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.database_url, "sqlite:///tmp/badges.db");
        assert_eq!(config.connection.max_connection_attempts(), 5);
        assert_eq!(config.connection.sync_mode(), "FULL");
        assert_eq!(
            config.connection.connection_retry_delay(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_from_lookup_errors() {
        assert_eq!(
            DatabaseConfig::from_lookup(|_| None).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );

        let err = DatabaseConfig::from_lookup(|k| match k {
            "DATABASE_URL" => Some("sqlite://:memory:".to_string()),
            "BADGESTORE_DB_BUSY_TIMEOUT_MS" => Some("soon".to_string()),
            _ => None,
        })
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "BADGESTORE_DB_BUSY_TIMEOUT_MS",
                ..
            }
        ));
    }
}
