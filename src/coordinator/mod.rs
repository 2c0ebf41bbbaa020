// ABOUTME: Coordinator module - the facade callers talk to.
// ABOUTME: Typed operations, the discovery catalog, metrics and error envelopes.

mod catalog;
mod coordinator;
mod envelope;
mod metrics;
mod operation;

pub use catalog::{OperationDef, catalog};
pub use coordinator::Coordinator;
pub use envelope::ErrorEnvelope;
pub use metrics::{Metrics, OperationMetrics, SAMPLE_WINDOW};
pub use operation::{
    AcquireArgs, AcquireManyArgs, AgentArgs, ConflictsArgs, FileAgentArgs, FileArgs,
    FilesAgentArgs, FilesArgs, ListAgentsArgs, ListLocksArgs, MetricsArgs, NoArgs, Operation,
    RegisterArgs, RenewArgs, UpdateStatusArgs,
};

#[cfg(test)]
mod metrics_test;
#[cfg(test)]
mod operation_test;
