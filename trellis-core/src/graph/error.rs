//! Structural graph errors.
//!
//! These indicate wiring bugs, not runtime conditions: a caller that hits one
//! should treat it as fatal. Recoverable async failures never appear here;
//! they are data (`AsyncValue::Error`).

use thiserror::Error;

use super::key::ProviderId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The key was never declared in this container.
    #[error("provider {} is not registered in this container", .0.raw())]
    NotRegistered(ProviderId),

    /// A node read itself, directly or transitively, during evaluation.
    #[error("dependency cycle detected while evaluating provider {}", .0.raw())]
    CycleDetected(ProviderId),

    /// `set` was called on a node kind that does not accept writes.
    #[error("provider {} is not writable; only cell and notifier nodes accept set", .0.raw())]
    NotWritable(ProviderId),

    /// An async or stream node was first accessed outside a tokio runtime,
    /// so its operation has nowhere to run.
    #[error("provider {} requires a tokio runtime to start its asynchronous operation", .0.raw())]
    RuntimeUnavailable(ProviderId),
}
