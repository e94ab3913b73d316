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

//! Engine tuning applied when a connection is opened.
//!
//! Settings are a declarative, ordered list of [`TuningSetting`]s built by
//! [`settings_for`]. [`apply_settings`] walks the list once:
//!
//! - a CRITICAL failure stops the walk and returns
//!   [`TuningError::CriticalSetting`]
//! - an OPTIONAL failure is recorded, logged as a warning, and skipped
//!
//! Each value is checked against the engine's vocabulary before the statement
//! is issued. SQLite accepts unknown pragma values silently, so without this
//! check an invalid durability mode would never surface as a failure.

use diesel::connection::SimpleConnection;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::ConnectionConfig;
use crate::database::BackendType;
use crate::error::TuningError;

/// Whether a failed setting halts startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    Critical,
    Optional,
}

/// Accepted values for a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRule {
    /// Case-insensitive keyword from a fixed list.
    OneOf(&'static [&'static str]),
    /// Integer within an inclusive range.
    Integer { min: i64, max: i64 },
    /// Any integer except zero.
    NonZeroInteger,
    /// A PostgreSQL memory quantity such as `64MB`.
    Memory,
}

impl ValueRule {
    fn check(&self, value: &str) -> Result<(), String> {
        match self {
            ValueRule::OneOf(allowed) => {
                if allowed.iter().any(|a| a.eq_ignore_ascii_case(value)) {
                    Ok(())
                } else {
                    Err(format!(
                        "'{}' is not one of [{}]",
                        value,
                        allowed.join(", ")
                    ))
                }
            }
            ValueRule::Integer { min, max } => match value.parse::<i64>() {
                Ok(v) if v >= *min && v <= *max => Ok(()),
                Ok(v) => Err(format!("{} is outside {}..={}", v, min, max)),
                Err(_) => Err(format!("'{}' is not an integer", value)),
            },
            ValueRule::NonZeroInteger => match value.parse::<i64>() {
                Ok(0) => Err("value must be non-zero".to_string()),
                Ok(_) => Ok(()),
                Err(_) => Err(format!("'{}' is not an integer", value)),
            },
            ValueRule::Memory => {
                let digits = value.trim_end_matches(|c: char| c.is_ascii_alphabetic());
                let unit = &value[digits.len()..];
                match (digits.parse::<u64>(), unit) {
                    (Ok(n), "kB" | "MB" | "GB") if n > 0 => Ok(()),
                    _ => Err(format!("'{}' is not a memory quantity (e.g. 64MB)", value)),
                }
            }
        }
    }
}

/// One engine setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuningSetting {
    pub name: &'static str,
    pub value: String,
    pub criticality: Criticality,
    pub rule: ValueRule,
}

impl TuningSetting {
    pub fn critical(name: &'static str, value: impl Into<String>, rule: ValueRule) -> Self {
        Self {
            name,
            value: value.into(),
            criticality: Criticality::Critical,
            rule,
        }
    }

    pub fn optional(name: &'static str, value: impl Into<String>, rule: ValueRule) -> Self {
        Self {
            name,
            value: value.into(),
            criticality: Criticality::Optional,
            rule,
        }
    }

    /// Renders the statement for `backend`. Only call after the value passed
    /// its rule, which restricts it to keywords, integers and memory units.
    fn statement(&self, backend: BackendType) -> String {
        match backend {
            BackendType::Sqlite => format!("PRAGMA {} = {};", self.name, self.value),
            BackendType::Postgres => format!("SET {} = '{}';", self.name, self.value),
        }
    }
}

/// A setting that was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedSetting {
    pub setting: String,
    pub value: String,
}

/// A setting that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingFailure {
    pub setting: String,
    pub error: String,
    pub category: Criticality,
}

/// Outcome of [`apply_settings`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplicationResult {
    pub applied: Vec<AppliedSetting>,
    pub failed: Vec<SettingFailure>,
    pub all_critical_applied: bool,
}

const SQLITE_JOURNAL_MODES: &[&str] = &["DELETE", "TRUNCATE", "PERSIST", "MEMORY", "WAL", "OFF"];
const SQLITE_SYNC_MODES: &[&str] = &["OFF", "NORMAL", "FULL", "EXTRA", "0", "1", "2", "3"];
const SQLITE_TEMP_STORES: &[&str] = &["DEFAULT", "FILE", "MEMORY", "0", "1", "2"];
const PG_SYNC_COMMIT: &[&str] = &["on", "off", "local", "remote_write", "remote_apply"];

/// Builds the ordered setting list for `backend`.
///
/// PostgreSQL has no journal or temp-store equivalents, and enforces foreign
/// keys unconditionally, so its list is shorter.
pub fn settings_for(backend: BackendType, config: &ConnectionConfig) -> Vec<TuningSetting> {
    match backend {
        BackendType::Sqlite => vec![
            TuningSetting::critical("foreign_keys", "ON", ValueRule::OneOf(&["ON"])),
            TuningSetting::optional(
                "journal_mode",
                config.journal_mode(),
                ValueRule::OneOf(SQLITE_JOURNAL_MODES),
            ),
            TuningSetting::critical(
                "synchronous",
                config.sync_mode(),
                ValueRule::OneOf(SQLITE_SYNC_MODES),
            ),
            TuningSetting::critical(
                "busy_timeout",
                config.busy_timeout_ms().to_string(),
                ValueRule::Integer {
                    min: 1,
                    max: 600_000,
                },
            ),
            TuningSetting::optional(
                "cache_size",
                config.cache_size().to_string(),
                ValueRule::NonZeroInteger,
            ),
            TuningSetting::optional(
                "temp_store",
                config.temp_store(),
                ValueRule::OneOf(SQLITE_TEMP_STORES),
            ),
        ],
        BackendType::Postgres => vec![
            TuningSetting::critical(
                "synchronous_commit",
                postgres_synchronous_commit(config.sync_mode()),
                ValueRule::OneOf(PG_SYNC_COMMIT),
            ),
            TuningSetting::critical(
                "lock_timeout",
                config.busy_timeout_ms().to_string(),
                ValueRule::Integer {
                    min: 1,
                    max: 600_000,
                },
            ),
            TuningSetting::optional(
                "work_mem",
                postgres_work_mem(config.cache_size()),
                ValueRule::Memory,
            ),
        ],
    }
}

/// Maps the SQLite durability vocabulary onto `synchronous_commit`. Native
/// PostgreSQL values pass through unchanged.
fn postgres_synchronous_commit(mode: &str) -> String {
    match mode.to_ascii_uppercase().as_str() {
        "OFF" | "0" => "off".to_string(),
        "NORMAL" | "1" => "local".to_string(),
        "FULL" | "EXTRA" | "2" | "3" => "on".to_string(),
        _ => mode.to_ascii_lowercase(),
    }
}

/// Negative cache sizes are KiB; positive ones are 4 KiB pages.
fn postgres_work_mem(cache_size: i64) -> String {
    let kib = if cache_size < 0 {
        cache_size.unsigned_abs()
    } else {
        cache_size.unsigned_abs().saturating_mul(4)
    };
    format!("{}kB", kib)
}

/// Applies `settings` in order on `conn`.
pub fn apply_settings<C: SimpleConnection>(
    conn: &mut C,
    backend: BackendType,
    settings: &[TuningSetting],
) -> Result<ApplicationResult, TuningError> {
    let mut result = ApplicationResult::default();

    for setting in settings {
        let outcome = setting
            .rule
            .check(&setting.value)
            .and_then(|_| {
                conn.batch_execute(&setting.statement(backend))
                    .map_err(|e| e.to_string())
            });

        match outcome {
            Ok(()) => {
                debug!(setting = setting.name, value = %setting.value, "Applied tuning setting");
                result.applied.push(AppliedSetting {
                    setting: setting.name.to_string(),
                    value: setting.value.clone(),
                });
            }
            Err(message) => {
                result.failed.push(SettingFailure {
                    setting: setting.name.to_string(),
                    error: message.clone(),
                    category: setting.criticality,
                });
                match setting.criticality {
                    Criticality::Critical => {
                        error!(
                            setting = setting.name,
                            value = %setting.value,
                            error = %message,
                            "Critical tuning setting failed; refusing to continue"
                        );
                        return Err(TuningError::CriticalSetting {
                            setting: setting.name.to_string(),
                            message,
                        });
                    }
                    Criticality::Optional => {
                        warn!(
                            setting = setting.name,
                            value = %setting.value,
                            error = %message,
                            "Optional tuning setting failed; continuing with engine default"
                        );
                    }
                }
            }
        }
    }

    result.all_critical_applied = true;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::{Connection, RunQueryDsl, SqliteConnection};
    use tracing_test::traced_test;

    #[derive(diesel::QueryableByName)]
    struct PragmaValue {
        #[diesel(sql_type = diesel::sql_types::BigInt)]
        value: i64,
    }

    fn memory_connection() -> SqliteConnection {
        SqliteConnection::establish(":memory:").unwrap()
    }

    #[test]
    fn test_sqlite_settings_order_and_criticality() {
        let settings = settings_for(BackendType::Sqlite, &ConnectionConfig::default());
        let names: Vec<_> = settings.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "foreign_keys",
                "journal_mode",
                "synchronous",
                "busy_timeout",
                "cache_size",
                "temp_store"
            ]
        );
        let critical: Vec<_> = settings
            .iter()
            .filter(|s| s.criticality == Criticality::Critical)
            .map(|s| s.name)
            .collect();
        assert_eq!(critical, vec!["foreign_keys", "synchronous", "busy_timeout"]);
    }

    #[test]
    fn test_postgres_settings_translate_vocabulary() {
        let settings = settings_for(BackendType::Postgres, &ConnectionConfig::default());
        assert_eq!(settings[0].name, "synchronous_commit");
        assert_eq!(settings[0].value, "local");
        assert_eq!(settings[1].value, "5000");
        assert_eq!(settings[2].value, "64000kB");
        assert!(settings.iter().all(|s| s.rule.check(&s.value).is_ok()));
        assert_eq!(
            settings[1].statement(BackendType::Postgres),
            "SET lock_timeout = '5000';"
        );
    }

    #[test]
    fn test_default_settings_apply_cleanly() {
        let mut conn = memory_connection();
        let settings = settings_for(BackendType::Sqlite, &ConnectionConfig::default());
        let result = apply_settings(&mut conn, BackendType::Sqlite, &settings).unwrap();
        assert!(result.all_critical_applied);
        assert!(result.failed.is_empty());
        assert_eq!(result.applied.len(), 6);

        let busy: PragmaValue =
            diesel::sql_query("SELECT timeout AS value FROM pragma_busy_timeout")
                .get_result(&mut conn)
                .unwrap();
        assert_eq!(busy.value, 5000);
        let fk: PragmaValue =
            diesel::sql_query("SELECT foreign_keys AS value FROM pragma_foreign_keys")
                .get_result(&mut conn)
                .unwrap();
        assert_eq!(fk.value, 1);
    }

    #[test]
    fn test_invalid_sync_mode_is_fatal() {
        let mut conn = memory_connection();
        let config = ConnectionConfig::builder().sync_mode("BOGUS").build().unwrap();
        let settings = settings_for(BackendType::Sqlite, &config);
        let err = apply_settings(&mut conn, BackendType::Sqlite, &settings).unwrap_err();
        assert!(matches!(
            err,
            TuningError::CriticalSetting { ref setting, .. } if setting == "synchronous"
        ));
    }

    #[test]
    #[traced_test]
    fn test_optional_failure_warns_and_continues() {
        let mut conn = memory_connection();
        let settings = vec![
            TuningSetting::optional("cache_size", "lots", ValueRule::NonZeroInteger),
            TuningSetting::critical(
                "busy_timeout",
                "250",
                ValueRule::Integer { min: 1, max: 600_000 },
            ),
        ];
        let result = apply_settings(&mut conn, BackendType::Sqlite, &settings).unwrap();
        assert!(result.all_critical_applied);
        assert_eq!(result.applied.len(), 1);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].setting, "cache_size");
        assert_eq!(result.failed[0].category, Criticality::Optional);
        assert!(logs_contain("Optional tuning setting failed"));
    }

    #[test]
    fn test_value_rules() {
        assert!(ValueRule::OneOf(SQLITE_SYNC_MODES).check("normal").is_ok());
        assert!(ValueRule::OneOf(SQLITE_SYNC_MODES).check("sometimes").is_err());
        assert!(ValueRule::Integer { min: 1, max: 10 }.check("11").is_err());
        assert!(ValueRule::NonZeroInteger.check("-2000").is_ok());
        assert!(ValueRule::NonZeroInteger.check("0").is_err());
        assert!(ValueRule::Memory.check("64MB").is_ok());
        assert!(ValueRule::Memory.check("64").is_err());
        assert!(ValueRule::Memory.check("MB").is_err());
        assert!(ValueRule::Memory.check("64MB; DROP TABLE x").is_err());
    }
}
