// ABOUTME: Prelude module - convenient imports for common use cases.
// ABOUTME: Use `use agent_coord::prelude::*;` to get started quickly.

pub use crate::agent::{AgentRegistry, AgentState, AgentStatus, StatusUpdate};
pub use crate::cache::{CacheStats, Lookup, ReadThroughCache};
pub use crate::config::CoordConfig;
pub use crate::connection::{ConnectionManager, Health};
pub use crate::coordinator::{Coordinator, ErrorEnvelope, Operation, OperationDef};
pub use crate::error::{ConfigError, CoordError, StoreError};
pub use crate::lock::{ConflictRecord, LockInfo, LockManager, normalize_path};
pub use crate::rpc::{RpcServer, ToolCallResult};
pub use crate::store::{Connector, Keys, MemoryConnector, MemoryStore, RedisConnector, Store};
