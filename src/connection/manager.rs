// ABOUTME: Owns the single store connection: shared connects, bounded retries,
// ABOUTME: a background health probe, and timeout-bounded store round trips.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::CoordConfig;
use crate::error::{CoordError, StoreError};
use crate::store::{Connector, Store};

type ConnectFuture = Shared<BoxFuture<'static, Result<Arc<dyn Store>, StoreError>>>;

/// Delay before retry number `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(u64::from(attempt) * 100).min(Duration::from_millis(1000))
}

enum Slot {
    Empty,
    Connecting { id: u64, attempt: ConnectFuture },
    Ready(Arc<dyn Store>),
}

struct State {
    slot: Slot,
    next_id: u64,
}

/// Result of a health check.
#[derive(Debug, Clone)]
pub struct Health {
    pub healthy: bool,
    pub latency: Duration,
    pub error: Option<String>,
}

/// Manages the connection to the coordination store.
///
/// # Connection semantics
///
/// - **Shared connects:** callers arriving while a connect is in flight await
///   that same attempt instead of starting their own.
/// - **Bounded retries:** a connect makes at most `connect_attempts` tries,
///   each capped by `connect_timeout`, sleeping `backoff_delay` in between.
/// - **Invalidation:** connection-class failures and failed probes drop the
///   handle; the next caller reconnects.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    connect_attempts: u32,
    operation_timeout: Duration,
    health_interval: Duration,
    state: Mutex<State>,
    probe: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a manager. No connection is made until first use or `open`.
    pub fn new(connector: Arc<dyn Connector>, config: &CoordConfig) -> Self {
        Self {
            connector,
            connect_timeout: config.connect_timeout,
            connect_attempts: config.connect_attempts.max(1),
            operation_timeout: config.operation_timeout,
            health_interval: config.health_interval,
            state: Mutex::new(State {
                slot: Slot::Empty,
                next_id: 0,
            }),
            probe: Mutex::new(None),
        }
    }

    /// Connect eagerly and start the background health probe.
    pub async fn open(self: &Arc<Self>) -> Result<(), CoordError> {
        self.get_connection().await?;
        self.start_probe();
        Ok(())
    }

    /// Stop the probe and drop the connection.
    pub fn close(&self) {
        if let Some(handle) = self.probe.lock().take() {
            handle.abort();
        }
        self.invalidate();
        tracing::info!(store = %self.connector.describe(), "coordination store connection closed");
    }

    /// Whether a ready handle is currently held.
    pub fn is_connected(&self) -> bool {
        matches!(self.state.lock().slot, Slot::Ready(_))
    }

    /// The held handle, without connecting.
    pub fn current(&self) -> Option<Arc<dyn Store>> {
        match &self.state.lock().slot {
            Slot::Ready(store) => Some(Arc::clone(store)),
            _ => None,
        }
    }

    /// Return a ready connection, connecting if needed.
    pub async fn get_connection(&self) -> Result<Arc<dyn Store>, CoordError> {
        let (id, attempt) = {
            let mut state = self.state.lock();
            match &state.slot {
                Slot::Ready(store) => return Ok(Arc::clone(store)),
                Slot::Connecting { id, attempt } => (*id, attempt.clone()),
                Slot::Empty => {
                    state.next_id += 1;
                    let id = state.next_id;
                    let attempt = self.connect_with_retry().shared();
                    state.slot = Slot::Connecting {
                        id,
                        attempt: attempt.clone(),
                    };
                    (id, attempt)
                }
            }
        };

        let result = attempt.await;

        let mut state = self.state.lock();
        if matches!(&state.slot, Slot::Connecting { id: current, .. } if *current == id) {
            state.slot = match &result {
                Ok(store) => Slot::Ready(Arc::clone(store)),
                Err(_) => Slot::Empty,
            };
        }
        drop(state);

        result.map_err(|e| CoordError::StoreUnavailable {
            operation: "connect".into(),
            key: self.connector.describe(),
            at: Utc::now(),
            reason: e.to_string(),
        })
    }

    fn connect_with_retry(&self) -> BoxFuture<'static, Result<Arc<dyn Store>, StoreError>> {
        let connector = Arc::clone(&self.connector);
        let timeout = self.connect_timeout;
        let attempts = self.connect_attempts;

        async move {
            let addr = connector.describe();
            let mut last = String::new();
            for attempt in 1..=attempts {
                let outcome = match tokio::time::timeout(timeout, connector.connect()).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(StoreError::Timeout(timeout.as_millis() as u64)),
                };
                match outcome {
                    Ok(handle) => {
                        tracing::info!(%addr, attempt, "connected to coordination store");
                        return Ok(handle);
                    }
                    Err(e) => {
                        tracing::warn!(%addr, attempt, error = %e, "store connect attempt failed");
                        last = e.to_string();
                        if attempt < attempts {
                            tokio::time::sleep(backoff_delay(attempt)).await;
                        }
                    }
                }
            }
            tracing::error!(%addr, attempts, "giving up on coordination store connect");
            Err(StoreError::Exhausted { attempts, last })
        }
        .boxed()
    }

    /// Drop the current handle so the next caller reconnects.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        if matches!(state.slot, Slot::Ready(_)) {
            tracing::warn!(store = %self.connector.describe(), "dropping coordination store connection");
        }
        state.slot = Slot::Empty;
    }

    /// Run one store round trip with a timeout and typed error context.
    ///
    /// A timeout reports `CoordError::Timeout`: for writes the outcome is
    /// unknown and callers should re-read rather than assume failure.
    pub async fn call<T, F>(&self, operation: &str, key: &str, fut: F) -> Result<T, CoordError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                if e.is_connection() {
                    self.invalidate();
                }
                tracing::warn!(operation, key, error = %e, "store call failed");
                Err(CoordError::StoreUnavailable {
                    operation: operation.to_string(),
                    key: key.to_string(),
                    at: Utc::now(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                tracing::warn!(operation, key, "store call timed out");
                Err(CoordError::Timeout {
                    operation: operation.to_string(),
                    key: key.to_string(),
                    at: Utc::now(),
                })
            }
        }
    }

    /// Ping the store through the regular connection path.
    pub async fn health(&self) -> Health {
        let started = Instant::now();
        let outcome = match self.get_connection().await {
            Ok(store) => self.call("ping", "", store.ping()).await,
            Err(e) => Err(e),
        };
        Health {
            healthy: outcome.is_ok(),
            latency: started.elapsed(),
            error: outcome.err().map(|e| e.to_string()),
        }
    }

    /// Start the periodic ping. Replaces any probe already running.
    pub fn start_probe(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let interval = self.health_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                manager.probe_once().await;
            }
        });
        if let Some(previous) = self.probe.lock().replace(handle) {
            previous.abort();
        }
    }

    /// One probe tick: ping a held handle, drop it on failure.
    ///
    /// Does nothing when no handle is held; reconnecting is left to callers.
    pub async fn probe_once(&self) -> bool {
        let store = {
            let state = self.state.lock();
            match &state.slot {
                Slot::Ready(store) => Arc::clone(store),
                _ => return false,
            }
        };
        match tokio::time::timeout(self.operation_timeout, store.ping()).await {
            Ok(Ok(())) => {
                tracing::debug!("coordination store probe ok");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "coordination store probe failed");
                self.invalidate();
                false
            }
            Err(_) => {
                tracing::warn!("coordination store probe timed out");
                self.invalidate();
                false
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.probe.get_mut().take() {
            handle.abort();
        }
    }
}
