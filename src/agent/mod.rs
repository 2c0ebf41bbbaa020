// ABOUTME: Agent module - who is working, on what, and when they were last seen.
// ABOUTME: Provides AgentStatus records and the store-backed AgentRegistry.

mod registry;
mod status;

pub use registry::{AgentRegistry, StatusUpdate};
pub use status::{AgentState, AgentStatus};
