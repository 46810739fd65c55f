//! State-Provider Graph
//!
//! This module implements the observable state graph: a registry of named,
//! typed provider nodes with dependency tracking, lazy evaluation, and eager
//! invalidation propagation.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph (DAG) where:
//!
//! - Source nodes hold state: constants, mutable cells, notifier-backed
//!   objects, async computations, and stream subscriptions.
//! - Derived nodes are pure functions of other nodes; their dependency set is
//!   recomputed on every evaluation from the reads they actually made.
//! - Edges carry change notifications from a node to its dependents and
//!   external watchers, in registration order.
//!
//! # Design Decisions
//!
//! 1. The container is an explicit object handed to collaborators, never a
//!    hidden process-wide registry.
//!
//! 2. Dependency discovery goes through a scoped evaluation recorder rather
//!    than an ambient thread-local, so what a node depends on is always the
//!    committed result of one observable evaluation.
//!
//! 3. Structural errors (unregistered key, cycle) are fatal `Err`s; failures
//!    of the operations behind async and stream nodes are values
//!    ([`AsyncValue::Error`]) so callers can render them and retry.

mod container;
mod error;
mod key;
mod node;
mod scope;
mod value;

pub use container::{Ctx, ProviderContainer};
pub use error::GraphError;
pub use key::{FamilyKey, NodeKey, ProviderId, ProviderKey};
pub use node::{NodeKind, SubscriptionId};
pub use value::{AsyncValue, OperationFailure};
