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

//! Connection lifecycle against a real SQLite file.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use badgestore::database::ConnectionProbe;
use badgestore::{
    ConnectionConfig, ConnectionError, ConnectionManager, ConnectionState, Database,
    DatabaseError,
};
use serial_test::serial;
use tempfile::TempDir;

use crate::fixtures::{fast_config, initialized_fixture, sample_issuer, sqlite_fixture};

/// Counts probe calls and holds each one open long enough for concurrent
/// callers to pile up behind it.
struct SlowCountingProbe {
    calls: AtomicU32,
    hold: Duration,
}

#[async_trait]
impl ConnectionProbe for SlowCountingProbe {
    async fn probe(&self, database: &Database) -> Result<(), DatabaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        database.ping().await
    }
}

/// Fails every probe without touching the database.
struct AlwaysFailingProbe {
    calls: AtomicU32,
}

#[async_trait]
impl ConnectionProbe for AlwaysFailingProbe {
    async fn probe(&self, _database: &Database) -> Result<(), DatabaseError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Err(DatabaseError::Pool(format!("probe {} refused", call)))
    }
}

/// Fails the first `failures` probes and records when each probe ran.
struct FlakyTimedProbe {
    failures: u32,
    calls: parking_lot::Mutex<Vec<Instant>>,
}

#[async_trait]
impl ConnectionProbe for FlakyTimedProbe {
    async fn probe(&self, database: &Database) -> Result<(), DatabaseError> {
        let call = {
            let mut calls = self.calls.lock();
            calls.push(Instant::now());
            calls.len() as u32
        };
        if call <= self.failures {
            return Err(DatabaseError::Pool(format!("probe {} refused", call)));
        }
        database.ping().await
    }
}

fn file_database(dir: &TempDir) -> Database {
    let path = dir.path().join("badges.db");
    Database::new(&path.to_string_lossy()).expect("Failed to build database handle")
}

#[tokio::test]
async fn test_concurrent_connects_share_one_attempt() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let probe = Arc::new(SlowCountingProbe {
        calls: AtomicU32::new(0),
        hold: Duration::from_millis(50),
    });
    let manager = ConnectionManager::with_probe(file_database(&dir), fast_config(), probe.clone());

    let callers: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.connect().await })
        })
        .collect();
    for caller in futures::future::join_all(callers).await {
        caller
            .expect("connect task panicked")
            .expect("concurrent connect failed");
    }

    assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    assert_eq!(manager.state(), ConnectionState::Connected);

    manager.connect().await.expect("connect while connected failed");
    assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
#[serial]
async fn test_retries_back_off_exponentially() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = ConnectionConfig::builder()
        .max_connection_attempts(3)
        .connection_retry_delay(Duration::from_millis(20))
        .build()
        .expect("Failed to build config");
    let probe = Arc::new(AlwaysFailingProbe {
        calls: AtomicU32::new(0),
    });
    let manager = ConnectionManager::with_probe(file_database(&dir), config, probe.clone());

    let started = Instant::now();
    let err = manager.connect().await.unwrap_err();
    let elapsed = started.elapsed();

    // Immediate first attempt, then 40ms and 80ms.
    assert!(
        elapsed >= Duration::from_millis(120),
        "backoff too short: {:?}",
        elapsed
    );
    assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
    match err {
        DatabaseError::Connection(ConnectionError::Exhausted {
            attempts,
            last_error,
        }) => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("probe 3 refused"), "{}", last_error);
        }
        other => panic!("expected exhausted attempts, got {other:?}"),
    }
    assert_eq!(manager.state(), ConnectionState::Error);
}

#[tokio::test]
#[serial]
async fn test_recovers_on_final_attempt_after_backoff() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = ConnectionConfig::builder()
        .max_connection_attempts(3)
        .connection_retry_delay(Duration::from_millis(25))
        .build()
        .expect("Failed to build config");
    let probe = Arc::new(FlakyTimedProbe {
        failures: 2,
        calls: parking_lot::Mutex::new(Vec::new()),
    });
    let manager = ConnectionManager::with_probe(file_database(&dir), config, probe.clone());

    manager
        .connect()
        .await
        .expect("third attempt should succeed");
    assert!(manager.is_connected());
    assert_eq!(manager.get_health().await.connection_attempts, 3);

    let calls = probe.calls.lock().clone();
    assert_eq!(calls.len(), 3);
    let before_second = calls[1] - calls[0];
    let before_third = calls[2] - calls[1];
    assert!(before_second >= Duration::from_millis(50), "{:?}", before_second);
    assert!(before_third >= Duration::from_millis(100), "{:?}", before_third);
}

#[tokio::test]
async fn test_unreachable_file_exhausts_attempts() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("missing").join("badges.db");
    let manager = ConnectionManager::from_url(&path.to_string_lossy(), fast_config())
        .expect("Failed to build manager");

    let err = manager.connect().await.unwrap_err();
    assert!(matches!(
        err,
        DatabaseError::Connection(ConnectionError::Exhausted { attempts: 3, .. })
    ));
    assert_eq!(manager.state(), ConnectionState::Error);

    let health = manager.get_health().await;
    assert!(!health.connected);
    assert_eq!(health.state, ConnectionState::Error);
    assert_eq!(health.connection_attempts, 3);
    assert!(health.last_error.is_some());

    // The error state is retryable; a second sequence fails the same way.
    assert!(manager.connect().await.is_err());
    assert_eq!(manager.state(), ConnectionState::Error);
}

#[tokio::test]
async fn test_invalid_critical_setting_aborts_connect() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = ConnectionConfig::builder()
        .connection_retry_delay(Duration::from_millis(10))
        .sync_mode("BOGUS")
        .build()
        .expect("Failed to build config");
    let manager = ConnectionManager::new(file_database(&dir), config);

    let err = manager.connect().await.unwrap_err();
    match err {
        DatabaseError::Connection(ConnectionError::CriticalSetting { setting, .. }) => {
            assert_eq!(setting, "synchronous");
        }
        other => panic!("expected a critical setting failure, got {other:?}"),
    }
    assert_eq!(manager.state(), ConnectionState::Error);
    assert!(matches!(
        manager.ensure_connected(),
        Err(DatabaseError::NotConnected {
            state: ConnectionState::Error
        })
    ));
}

#[tokio::test]
async fn test_invalid_optional_setting_is_skipped() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = ConnectionConfig::builder()
        .connection_retry_delay(Duration::from_millis(10))
        .temp_store("BOGUS")
        .build()
        .expect("Failed to build config");
    let manager = ConnectionManager::new(file_database(&dir), config);

    manager
        .connect()
        .await
        .expect("optional setting failure must not block connect");
    assert!(manager.is_connected());

    let tuning = manager
        .get_health()
        .await
        .tuning
        .expect("tuning result recorded on connect");
    assert!(tuning.all_critical_applied);
    assert_eq!(tuning.failed.len(), 1);
    assert_eq!(tuning.failed[0].setting, "temp_store");
    assert!(tuning.applied.iter().any(|s| s.setting == "synchronous"));
}

#[tokio::test]
async fn test_health_reports_latency_when_connected() {
    let fixture = initialized_fixture().await;
    let health = fixture.service.manager().get_health().await;

    assert!(health.connected);
    assert_eq!(health.state, ConnectionState::Connected);
    assert!(health.latency.is_some());
    assert!(health.uptime.is_some());
    assert!(health.last_error.is_none());
    assert_eq!(health.connection_attempts, 1);
}

#[tokio::test]
async fn test_reconnect_preserves_data() {
    let fixture = initialized_fixture().await;
    let issuer = fixture
        .service
        .dal()
        .issuer()
        .create(sample_issuer("Reconnect University"))
        .await
        .expect("Failed to create issuer");

    fixture
        .service
        .manager()
        .reconnect()
        .await
        .expect("Failed to reconnect");
    assert!(fixture.service.manager().is_connected());

    let found = fixture
        .service
        .dal()
        .issuer()
        .find_by_id(&issuer.id)
        .await
        .expect("Failed to read issuer after reconnect");
    assert_eq!(found, Some(issuer));
}

#[tokio::test]
async fn test_disconnected_repositories_refuse_work() {
    let fixture = initialized_fixture().await;
    fixture.service.manager().disconnect().await;
    assert_eq!(fixture.service.manager().state(), ConnectionState::Disconnected);

    let err = fixture
        .service
        .dal()
        .issuer()
        .find_all_unbounded()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DatabaseError::NotConnected {
            state: ConnectionState::Disconnected
        }
    ));
}

#[tokio::test]
async fn test_shutdown_is_terminal() {
    let fixture = initialized_fixture().await;
    fixture.service.shutdown().await;
    let manager = fixture.service.manager();

    assert_eq!(manager.state(), ConnectionState::Closed);
    assert!(matches!(
        manager.connect().await,
        Err(DatabaseError::ClosedConnection)
    ));
    assert!(matches!(
        manager.reconnect().await,
        Err(DatabaseError::ClosedConnection)
    ));
    assert!(matches!(
        fixture
            .service
            .dal()
            .issuer()
            .create(sample_issuer("Too Late"))
            .await,
        Err(DatabaseError::ClosedConnection)
    ));

    // Closing twice is harmless.
    fixture.service.shutdown().await;
    assert_eq!(manager.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_operations_before_initialize_are_rejected() {
    let fixture = sqlite_fixture();
    let err = fixture
        .service
        .dal()
        .issuer()
        .create(sample_issuer("Early Bird"))
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::NotConnected { .. }));
}
