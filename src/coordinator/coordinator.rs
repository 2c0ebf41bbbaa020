// ABOUTME: Coordination facade: decodes named operations and routes them to the
// ABOUTME: registry or lock manager, recording metrics and normalizing errors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use super::catalog::{OperationDef, catalog};
use super::envelope::ErrorEnvelope;
use super::metrics::Metrics;
use super::operation::Operation;
use crate::agent::{AgentRegistry, StatusUpdate};
use crate::clock;
use crate::config::CoordConfig;
use crate::connection::ConnectionManager;
use crate::error::{CoordError, StoreError};
use crate::lock::LockManager;
use crate::store::{Connector, Keys, connector_for};

/// Default number of conflict records returned by `lock_conflicts`.
const DEFAULT_CONFLICT_LIMIT: usize = 20;

/// Entry point for callers.
///
/// Owns the connection manager and injects it into the registry and the
/// lock manager. The host calls `open` at startup and `close` at shutdown;
/// operations issued before `open` connect on demand.
pub struct Coordinator {
    connection: Arc<ConnectionManager>,
    agents: AgentRegistry,
    locks: LockManager,
    metrics: Metrics,
    keys: Keys,
    persist_metrics: bool,
    operation_timeout: Duration,
}

impl Coordinator {
    /// Build a coordinator for the store named in `config.store_url`.
    pub fn from_config(config: &CoordConfig) -> Result<Self, CoordError> {
        let connector = connector_for(&config.store_url)
            .map_err(|e| CoordError::InvalidParams(format!("unusable store url: {e}")))?;
        Ok(Self::with_connector(connector, config))
    }

    pub fn with_connector(connector: Arc<dyn Connector>, config: &CoordConfig) -> Self {
        let connection = Arc::new(ConnectionManager::new(connector, config));
        Self {
            agents: AgentRegistry::new(Arc::clone(&connection), config),
            locks: LockManager::new(Arc::clone(&connection), config),
            connection,
            metrics: Metrics::new(),
            keys: Keys::new(config.key_prefix.clone()),
            persist_metrics: config.persist_metrics,
            operation_timeout: config.operation_timeout,
        }
    }

    /// Connect and start the background health probe.
    pub async fn open(&self) -> Result<(), CoordError> {
        self.connection.open().await
    }

    pub fn close(&self) {
        self.connection.close();
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Definitions of every operation `dispatch` accepts.
    pub fn operations(&self) -> Vec<OperationDef> {
        catalog()
    }

    /// Run a named operation with JSON arguments.
    ///
    /// Every call is timed and counted, success or not. Failures come back
    /// as an `ErrorEnvelope`.
    pub async fn dispatch(&self, name: &str, arguments: Value) -> Result<Value, ErrorEnvelope> {
        let started = Instant::now();
        let outcome = match Operation::parse(name, arguments) {
            Ok(operation) => self.execute(operation).await,
            Err(e) => Err(e),
        };
        let elapsed = started.elapsed();

        let label = if Operation::NAMES.contains(&name) {
            name
        } else {
            "unknown"
        };
        self.metrics.record(label, elapsed, outcome.is_ok());
        if self.persist_metrics {
            self.persist_metric(label, elapsed, outcome.is_ok());
        }

        outcome.map_err(|e| {
            tracing::debug!(operation = name, error = %e, "operation failed");
            ErrorEnvelope::new(name, &e)
        })
    }

    /// Run a decoded operation.
    pub async fn execute(&self, operation: Operation) -> Result<Value, CoordError> {
        match operation {
            Operation::AgentRegister(args) => {
                let status = self
                    .agents
                    .register(&args.agent_id, args.capabilities, args.current_task)
                    .await?;
                Ok(json!({
                    "success": true,
                    "agentId": status.agent_id,
                    "registeredAt": status.registered_at,
                }))
            }
            Operation::AgentUpdateStatus(args) => {
                let update = StatusUpdate {
                    status: Some(args.status),
                    current_task: args.current_task,
                    progress: args.progress,
                };
                let status = self.agents.update_status(&args.agent_id, update).await?;
                Ok(json!({
                    "success": true,
                    "agentId": status.agent_id,
                    "status": status.status,
                    "updatedAt": status.last_seen,
                }))
            }
            Operation::AgentHeartbeat(args) => {
                let status = self.agents.heartbeat(&args.agent_id).await?;
                Ok(json!({
                    "success": true,
                    "agentId": status.agent_id,
                    "lastSeen": status.last_seen,
                }))
            }
            Operation::AgentList(args) => {
                let agents = self.agents.list_agents(args.include_inactive).await?;
                Ok(json!({ "total": agents.len(), "agents": agents }))
            }
            Operation::AgentGetStatus(args) => match self.agents.get_status(&args.agent_id).await? {
                Some(status) => {
                    let mut value = json!(status);
                    value["found"] = json!(true);
                    Ok(value)
                }
                None => Ok(json!({ "found": false, "agentId": args.agent_id })),
            },
            Operation::AgentDetectConflicts(args) => {
                let conflicts = self
                    .locks
                    .detect_conflicts(&args.agent_id, &args.files)
                    .await?;
                Ok(json!({
                    "agentId": args.agent_id,
                    "hasConflicts": !conflicts.is_empty(),
                    "conflicts": conflicts,
                }))
            }
            Operation::LockAcquire(args) => {
                let ttl = clock::ttl_from_secs(args.ttl);
                let lock = self
                    .locks
                    .acquire(&args.file, &args.agent_id, &args.reason, ttl)
                    .await?;
                Ok(json!({
                    "success": true,
                    "file": lock.file,
                    "agentId": lock.agent_id,
                    "lockedAt": lock.locked_at,
                    "expiresAt": lock.expires_at,
                }))
            }
            Operation::LockAcquireMany(args) => {
                let ttl = clock::ttl_from_secs(args.ttl);
                let locks = self
                    .locks
                    .acquire_many(&args.files, &args.agent_id, &args.reason, ttl)
                    .await?;
                Ok(json!({ "success": true, "locks": locks }))
            }
            Operation::LockRenew(args) => {
                let lock = self
                    .locks
                    .renew(&args.file, &args.agent_id, clock::ttl_from_secs(args.ttl))
                    .await?;
                Ok(json!({
                    "success": true,
                    "file": lock.file,
                    "expiresAt": lock.expires_at,
                }))
            }
            Operation::LockRelease(args) => {
                self.locks.release(&args.file, &args.agent_id).await?;
                Ok(json!({ "success": true }))
            }
            Operation::LockReleaseMany(args) => {
                let outcomes = self.locks.release_many(&args.files, &args.agent_id).await;
                let all_released = outcomes.iter().all(|(_, r)| r.is_ok());
                let results: Vec<Value> = outcomes
                    .into_iter()
                    .map(|(file, outcome)| match outcome {
                        Ok(()) => json!({ "file": file, "success": true }),
                        Err(e) => json!({
                            "file": file,
                            "success": false,
                            "error": e.code(),
                            "message": e.to_string(),
                        }),
                    })
                    .collect();
                Ok(json!({ "success": all_released, "results": results }))
            }
            Operation::LockCheck(args) => {
                let lock = self.locks.check(&args.file).await?;
                Ok(json!({ "file": args.file, "locked": lock.is_some(), "lock": lock }))
            }
            Operation::LockBatchCheck(args) => {
                let locks = self.locks.batch_check(&args.files).await?;
                Ok(json!(locks))
            }
            Operation::LockList(args) => {
                let locks = self
                    .locks
                    .list(args.agent_id.as_deref(), args.pattern.as_deref())
                    .await?;
                Ok(json!({ "total": locks.len(), "locks": locks }))
            }
            Operation::LockConflicts(args) => {
                let limit = args.limit.unwrap_or(DEFAULT_CONFLICT_LIMIT);
                let conflicts = self.locks.conflicts(&args.agent_id, limit).await?;
                Ok(json!({
                    "agentId": args.agent_id,
                    "total": conflicts.len(),
                    "conflicts": conflicts,
                }))
            }
            Operation::MetricsGet(args) => {
                let metrics = self.metrics.snapshot(args.tool.as_deref());
                Ok(json!({ "metrics": metrics }))
            }
            Operation::HealthCheck(_) => Ok(self.health_check().await),
        }
    }

    /// Store reachability, ping latency and cache statistics.
    pub async fn health_check(&self) -> Value {
        let health = self.connection.health().await;
        json!({
            "healthy": health.healthy,
            "store": {
                "connected": self.connection.is_connected(),
                "latencyMs": health.latency.as_secs_f64() * 1000.0,
                "error": health.error,
            },
            "cache": {
                "locks": self.locks.cache().stats(),
                "agents": self.agents.cache().stats(),
            },
        })
    }

    /// Mirror one call into the store's counters without waiting for it.
    fn persist_metric(&self, operation: &str, elapsed: Duration, success: bool) {
        let Some(store) = self.connection.current() else {
            return;
        };
        let key = self.keys.metrics(operation);
        let timeout = self.operation_timeout;
        let micros = i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX);

        tokio::spawn(async move {
            let writes = async {
                store.hash_incr(&key, "calls", 1).await?;
                if !success {
                    store.hash_incr(&key, "errors", 1).await?;
                }
                store.hash_incr(&key, "totalMicros", micros).await?;
                Ok::<(), StoreError>(())
            };
            match tokio::time::timeout(timeout, writes).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(%key, error = %e, "metrics persistence failed"),
                Err(_) => tracing::debug!(%key, "metrics persistence timed out"),
            }
        });
    }
}
