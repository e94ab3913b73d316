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

//! Connection lifecycle state machine.
//!
//! [`ConnectionManager`] owns the single [`Database`] handle and is the only
//! path repositories use to reach it.
//!
//! ```text
//! disconnected --connect--> connecting --success--> connected
//!                           connecting --exhausted/critical--> error
//! error --connect--> connecting
//! connected --disconnect--> disconnected
//! any --close--> closed   (terminal)
//! ```
//!
//! Concurrent `connect()` calls share one in-flight attempt: the first caller
//! installs a [`Shared`] future in the state and later callers await a clone
//! of it instead of starting their own probe sequence.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use diesel::{PgConnection, SqliteConnection};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::ConnectionConfig;
use crate::database::connection::{BackendType, Database};
use crate::database::tuning::{settings_for, ApplicationResult};
use crate::error::{ConnectionError, DatabaseError, TuningError};

/// Externally visible connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
            ConnectionState::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Performs one connectivity probe against the database.
///
/// The default [`QueryProbe`] issues `SELECT 1`. Alternative probes let
/// callers add their own readiness checks.
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    async fn probe(&self, database: &Database) -> Result<(), DatabaseError>;
}

/// Probe issuing a `SELECT 1` round trip.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryProbe;

#[async_trait]
impl ConnectionProbe for QueryProbe {
    async fn probe(&self, database: &Database) -> Result<(), DatabaseError> {
        database.ping().await
    }
}

type ConnectAttempt = Shared<BoxFuture<'static, Result<(), ConnectionError>>>;

enum Phase {
    Disconnected,
    Connecting(ConnectAttempt),
    Connected,
    Error,
    Closed,
}

impl Phase {
    fn state(&self) -> ConnectionState {
        match self {
            Phase::Disconnected => ConnectionState::Disconnected,
            Phase::Connecting(_) => ConnectionState::Connecting,
            Phase::Connected => ConnectionState::Connected,
            Phase::Error => ConnectionState::Error,
            Phase::Closed => ConnectionState::Closed,
        }
    }
}

struct ManagerStatus {
    phase: Phase,
    last_error: Option<String>,
    attempts: u32,
    connected_at: Option<Instant>,
    tuning: Option<ApplicationResult>,
}

struct ManagerInner {
    database: Database,
    config: ConnectionConfig,
    probe: Arc<dyn ConnectionProbe>,
    status: Mutex<ManagerStatus>,
}

/// Point-in-time health report. Produced by [`ConnectionManager::get_health`],
/// which never fails.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionHealth {
    pub connected: bool,
    pub state: ConnectionState,
    pub backend: BackendType,
    /// Round-trip time of the health probe, when one was issued and succeeded.
    pub latency: Option<Duration>,
    pub last_error: Option<String>,
    /// Attempts made by the most recent connect sequence.
    pub connection_attempts: u32,
    pub uptime: Option<Duration>,
    /// Settings applied when the current connection was established.
    pub tuning: Option<ApplicationResult>,
}

/// Owns the database handle and its connection state.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("backend", &self.inner.database.backend())
            .field("state", &self.state())
            .finish()
    }
}

impl ConnectionManager {
    /// Creates a manager in the `disconnected` state using [`QueryProbe`].
    pub fn new(database: Database, config: ConnectionConfig) -> Self {
        Self::with_probe(database, config, Arc::new(QueryProbe))
    }

    /// Creates a manager with a custom connectivity probe.
    pub fn with_probe(
        database: Database,
        config: ConnectionConfig,
        probe: Arc<dyn ConnectionProbe>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                database,
                config,
                probe,
                status: Mutex::new(ManagerStatus {
                    phase: Phase::Disconnected,
                    last_error: None,
                    attempts: 0,
                    connected_at: None,
                    tuning: None,
                }),
            }),
        }
    }

    /// Builds the database handle from `url` and wraps it in a manager.
    pub fn from_url(url: &str, config: ConnectionConfig) -> Result<Self, DatabaseError> {
        Ok(Self::new(Database::new(url)?, config))
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.status.lock().phase.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn backend(&self) -> BackendType {
        self.inner.database.backend()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Establishes the connection.
    ///
    /// A no-op when already connected. While another call is connecting this
    /// awaits the same attempt. Fails with [`DatabaseError::ClosedConnection`]
    /// once the manager is closed.
    pub async fn connect(&self) -> Result<(), DatabaseError> {
        let attempt = {
            let mut status = self.inner.status.lock();
            match &status.phase {
                Phase::Connected => return Ok(()),
                Phase::Closed => return Err(DatabaseError::ClosedConnection),
                Phase::Connecting(attempt) => {
                    debug!("Connection attempt already in flight; awaiting it");
                    attempt.clone()
                }
                Phase::Disconnected | Phase::Error => {
                    let inner = Arc::clone(&self.inner);
                    let attempt = async move { inner.run_connect_sequence().await }
                        .boxed()
                        .shared();
                    status.phase = Phase::Connecting(attempt.clone());
                    attempt
                }
            }
        };

        attempt.await.map_err(DatabaseError::from)
    }

    /// Moves to `disconnected`, checkpointing first where the engine supports
    /// it. The handle stays reusable. Checkpoint failures are logged only.
    pub async fn disconnect(&self) {
        let pending = {
            let status = self.inner.status.lock();
            match &status.phase {
                Phase::Disconnected | Phase::Closed => return,
                Phase::Connecting(attempt) => Some(attempt.clone()),
                Phase::Connected | Phase::Error => None,
            }
        };
        if let Some(attempt) = pending {
            let _ = attempt.await;
        }

        let was_connected = match self.state() {
            ConnectionState::Connected => true,
            ConnectionState::Error => false,
            _ => return,
        };
        if was_connected {
            self.inner.checkpoint_best_effort().await;
        }

        let mut status = self.inner.status.lock();
        if matches!(status.phase, Phase::Connected | Phase::Error) {
            status.phase = Phase::Disconnected;
            status.connected_at = None;
            info!("Database disconnected");
        }
    }

    /// Moves to the terminal `closed` state and invalidates the handle.
    /// Calling it again is a no-op.
    pub async fn close(&self) {
        let was_connected = {
            let mut status = self.inner.status.lock();
            if matches!(status.phase, Phase::Closed) {
                return;
            }
            let was_connected = matches!(status.phase, Phase::Connected);
            status.phase = Phase::Closed;
            status.connected_at = None;
            was_connected
        };

        if was_connected {
            self.inner.checkpoint_best_effort().await;
        }
        self.inner.database.close();
        info!("Database connection closed");
    }

    /// Disconnects (best effort) and connects again.
    pub async fn reconnect(&self) -> Result<(), DatabaseError> {
        if self.state() == ConnectionState::Closed {
            return Err(DatabaseError::ClosedConnection);
        }
        self.disconnect().await;
        self.connect().await
    }

    /// Fails unless the state is exactly `connected`.
    pub fn ensure_connected(&self) -> Result<(), DatabaseError> {
        match self.state() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Closed => Err(DatabaseError::ClosedConnection),
            state => Err(DatabaseError::NotConnected { state }),
        }
    }

    /// Reports connectivity without ever failing.
    pub async fn get_health(&self) -> ConnectionHealth {
        let (state, mut last_error, attempts, connected_at, tuning) = {
            let status = self.inner.status.lock();
            (
                status.phase.state(),
                status.last_error.clone(),
                status.attempts,
                status.connected_at,
                status.tuning.clone(),
            )
        };

        let mut connected = false;
        let mut latency = None;
        if state == ConnectionState::Connected {
            let started = Instant::now();
            let timeout = self.inner.config.health_check_timeout();
            match tokio::time::timeout(timeout, self.inner.database.ping()).await {
                Ok(Ok(())) => {
                    connected = true;
                    latency = Some(started.elapsed());
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Health probe failed");
                    last_error = Some(e.to_string());
                }
                Err(_) => {
                    warn!(timeout_ms = timeout.as_millis() as u64, "Health probe timed out");
                    last_error = Some(format!(
                        "health probe timed out after {}ms",
                        timeout.as_millis()
                    ));
                }
            }
        }

        ConnectionHealth {
            connected,
            state,
            backend: self.backend(),
            latency,
            last_error,
            connection_attempts: attempts,
            uptime: connected_at.map(|at| at.elapsed()),
            tuning,
        }
    }

    /// Runs `f` on the SQLite connection after checking the state.
    pub async fn interact_sqlite<F, R>(&self, f: F) -> Result<R, DatabaseError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<R, DatabaseError> + Send + 'static,
        R: Send + 'static,
    {
        self.ensure_connected()?;
        self.inner.database.interact_sqlite(f).await
    }

    /// Runs `f` on the PostgreSQL connection after checking the state.
    pub async fn interact_postgres<F, R>(&self, f: F) -> Result<R, DatabaseError>
    where
        F: FnOnce(&mut PgConnection) -> Result<R, DatabaseError> + Send + 'static,
        R: Send + 'static,
    {
        self.ensure_connected()?;
        self.inner.database.interact_postgres(f).await
    }

    /// Applies pending migrations. Requires a connection.
    pub async fn run_migrations(&self) -> Result<usize, DatabaseError> {
        self.ensure_connected()?;
        self.inner.database.run_migrations().await
    }
}

impl ManagerInner {
    fn is_closed(&self) -> bool {
        matches!(self.status.lock().phase, Phase::Closed)
    }

    /// Sets the phase unless the manager was closed meanwhile.
    fn settle(&self, outcome: &Result<ApplicationResult, ConnectionError>) {
        let mut status = self.status.lock();
        if matches!(status.phase, Phase::Closed) {
            return;
        }
        match outcome {
            Ok(tuning) => {
                status.phase = Phase::Connected;
                status.connected_at = Some(Instant::now());
                status.last_error = None;
                status.tuning = Some(tuning.clone());
            }
            Err(e) => {
                status.phase = Phase::Error;
                status.connected_at = None;
                status.last_error = Some(e.to_string());
            }
        }
    }

    async fn run_connect_sequence(self: Arc<Self>) -> Result<(), ConnectionError> {
        let started = Instant::now();
        let outcome = self.attempt_connections().await;
        self.settle(&outcome);

        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }

        let backend = self.database.backend().as_str();
        match outcome {
            Ok(_) => {
                metrics::histogram!("badgestore_connect_duration_seconds", "backend" => backend)
                    .record(started.elapsed().as_secs_f64());
                info!(
                    backend,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Database connected"
                );
                Ok(())
            }
            Err(e) => {
                metrics::counter!("badgestore_connect_failures_total", "backend" => backend)
                    .increment(1);
                error!(backend, error = %e, "Database connection failed");
                Err(e)
            }
        }
    }

    async fn attempt_connections(&self) -> Result<ApplicationResult, ConnectionError> {
        let max_attempts = self.config.max_connection_attempts();
        let backend = self.database.backend();
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=max_attempts {
            let delay = self.config.backoff_delay(attempt);
            if !delay.is_zero() {
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Backing off before next connection attempt"
                );
                tokio::time::sleep(delay).await;
            }
            if self.is_closed() {
                return Err(ConnectionError::Closed);
            }

            self.status.lock().attempts = attempt;
            metrics::counter!("badgestore_connect_attempts_total", "backend" => backend.as_str())
                .increment(1);

            if let Err(e) = self.probe.probe(&self.database).await {
                if matches!(e, DatabaseError::ClosedConnection) {
                    return Err(ConnectionError::Closed);
                }
                last_error = e.to_string();
                warn!(
                    attempt,
                    max_attempts,
                    error = %last_error,
                    "Connection attempt failed"
                );
                continue;
            }

            match self
                .database
                .apply_tuning(settings_for(backend, &self.config))
                .await
            {
                Ok(result) => return Ok(result),
                Err(TuningError::CriticalSetting { setting, message }) => {
                    return Err(ConnectionError::CriticalSetting { setting, message });
                }
                Err(TuningError::Handle(message)) => {
                    last_error = message;
                    warn!(
                        attempt,
                        max_attempts,
                        error = %last_error,
                        "Could not reach connection to apply tuning"
                    );
                }
            }
        }

        Err(ConnectionError::Exhausted {
            attempts: max_attempts,
            last_error,
        })
    }

    async fn checkpoint_best_effort(&self) {
        if let Err(e) = self.database.checkpoint().await {
            warn!(error = %e, "Checkpoint before disconnect failed; continuing");
        }
    }
}
