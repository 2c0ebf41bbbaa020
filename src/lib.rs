// ABOUTME: Root module for agent-coord - shared coordination for concurrent agents.
// ABOUTME: Re-exports the coordinator facade and the types callers handle most.

pub mod agent;
pub mod cache;
mod clock;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod lock;
pub mod prelude;
pub mod rpc;
pub mod store;

pub use config::CoordConfig;
pub use coordinator::Coordinator;
pub use error::{CoordError, StoreError};
