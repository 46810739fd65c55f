//! Trellis Core
//!
//! This crate provides the UI-free core of the Trellis demo application:
//!
//! - An observable state-provider graph (constants, cells, notifiers, derived
//!   values, async computations, stream subscriptions) with dependency
//!   tracking, lazy evaluation, and synchronous invalidation propagation
//! - Session state driven through a notifier node
//! - A guarded-navigation decision function with redirect-based protection
//!
//! Widgets, theming, and screen layout are external collaborators: they call
//! into the graph through `read`/`watch`/`set`/`invalidate` and into the
//! router through `decide`, and are out of scope here.
//!
//! # Architecture
//!
//! The crate is organized into three modules:
//!
//! - `graph`: the provider container and its node kinds
//! - `auth`: the auth notifier node and its controller
//! - `router`: the navigation guard and the router host adapter
//!
//! # Example
//!
//! ```rust
//! use trellis_core::graph::ProviderContainer;
//!
//! let container = ProviderContainer::new();
//!
//! // A mutable cell and a value derived from it.
//! let count = container.cell(0i64);
//! let doubled = container.derived(move |ctx| Ok(ctx.watch(count)? * 2));
//!
//! assert_eq!(container.read(doubled)?, 0);
//!
//! // set propagates synchronously: the derived node is fresh before
//! // control returns.
//! container.set(count, 5)?;
//! assert_eq!(container.read(doubled)?, 10);
//! # Ok::<(), trellis_core::graph::GraphError>(())
//! ```

pub mod auth;
pub mod graph;
pub mod router;

pub use auth::{AuthController, AuthState, LoginOutcome};
pub use graph::{AsyncValue, GraphError, OperationFailure, ProviderContainer};
pub use router::{NavigationDecision, RouteRules, RouterHost};
