//! Node slots
//!
//! A slot is the runtime state of one provider node (or one family member):
//! its current type-erased value, its dirty flag, the dependency set committed
//! by its last evaluation, and its listener list.
//!
//! Listener order is registration order; notification walks the list front to
//! back, so external watchers observe FIFO delivery and dependent nodes are
//! re-evaluated depth-first.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;
use tokio::task::AbortHandle;

use super::key::NodeKey;

/// Type-erased node value. Always an immutable snapshot; mutation goes
/// through `set` on the owning container.
pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;

/// Callback invoked with a node's new value after a change.
pub(crate) type NotifyFn = Arc<dyn Fn(&AnyValue) + Send + Sync>;

/// The kind of a provider node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Computed once on first access, then fixed.
    Constant,
    /// Mutable value replaced wholesale via `set`.
    Cell,
    /// Mutable object state replaced wholesale via `set`; distinguished from
    /// `Cell` only by intent (a named-operation controller owns it).
    Notifier,
    /// Pure function of other nodes, re-evaluated when they change.
    Derived,
    /// Starts an asynchronous operation; value is an `AsyncValue`.
    AsyncComputation,
    /// Subscribes to an external element stream; value is an `AsyncValue`.
    StreamSubscription,
}

impl NodeKind {
    /// Whether `set` is legal for this kind.
    pub fn is_writable(&self) -> bool {
        matches!(self, NodeKind::Cell | NodeKind::Notifier)
    }
}

/// Identity of one external watch registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// One entry in a node's listener list.
#[derive(Clone)]
pub(crate) enum Listener {
    /// Another node that read this one during its last evaluation.
    Dependent(NodeKey),
    /// An external watcher registered through `watch`.
    External {
        id: SubscriptionId,
        notify: NotifyFn,
    },
}

/// Mutable runtime state of a slot, behind one lock.
pub(crate) struct NodeState {
    /// Current value; `None` until first evaluation.
    pub(crate) value: Option<AnyValue>,
    /// Forces re-evaluation on next access.
    pub(crate) dirty: bool,
    /// Dependency set committed by the last evaluation.
    pub(crate) deps: SmallVec<[NodeKey; 4]>,
    /// Bumped on every restart; an async result settles only if its
    /// generation is still current (stale-result suppression).
    pub(crate) generation: u64,
    /// Abort handle for the slot's stream pump, if one is running.
    pub(crate) task: Option<AbortHandle>,
}

pub(crate) struct NodeSlot {
    pub(crate) key: NodeKey,
    pub(crate) kind: NodeKind,
    pub(crate) state: RwLock<NodeState>,
    pub(crate) listeners: RwLock<Vec<Listener>>,
}

impl NodeSlot {
    pub(crate) fn new(key: NodeKey, kind: NodeKind) -> Self {
        Self {
            key,
            kind,
            state: RwLock::new(NodeState {
                value: None,
                dirty: true,
                deps: SmallVec::new(),
                generation: 0,
                task: None,
            }),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot the listener list so notification never holds the lock while
    /// callbacks run (a callback may rewire this very list).
    pub(crate) fn listeners_snapshot(&self) -> Vec<Listener> {
        self.listeners.read().clone()
    }

    pub(crate) fn has_listeners(&self) -> bool {
        !self.listeners.read().is_empty()
    }

    pub(crate) fn remove_dependent(&self, key: &NodeKey) {
        self.listeners
            .write()
            .retain(|listener| !matches!(listener, Listener::Dependent(k) if k == key));
    }

    pub(crate) fn remove_external(&self, id: SubscriptionId) {
        self.listeners
            .write()
            .retain(|listener| !matches!(listener, Listener::External { id: other, .. } if *other == id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::key::ProviderId;

    #[test]
    fn only_cell_and_notifier_are_writable() {
        assert!(NodeKind::Cell.is_writable());
        assert!(NodeKind::Notifier.is_writable());
        assert!(!NodeKind::Constant.is_writable());
        assert!(!NodeKind::Derived.is_writable());
        assert!(!NodeKind::AsyncComputation.is_writable());
        assert!(!NodeKind::StreamSubscription.is_writable());
    }

    #[test]
    fn subscription_ids_are_unique() {
        let a = SubscriptionId::next();
        let b = SubscriptionId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn slots_start_dirty_and_empty() {
        let slot = NodeSlot::new(NodeKey::plain(ProviderId::next()), NodeKind::Derived);
        {
            let state = slot.state.read();
            assert!(state.dirty);
            assert!(state.value.is_none());
            assert!(state.deps.is_empty());
        }
        assert!(!slot.has_listeners());
    }

    #[test]
    fn remove_dependent_filters_only_matching_edges() {
        let slot = NodeSlot::new(NodeKey::plain(ProviderId::next()), NodeKind::Cell);
        let a = NodeKey::plain(ProviderId::next());
        let b = NodeKey::plain(ProviderId::next());

        slot.listeners.write().push(Listener::Dependent(a.clone()));
        slot.listeners.write().push(Listener::Dependent(b.clone()));

        slot.remove_dependent(&a);

        let remaining = slot.listeners_snapshot();
        assert_eq!(remaining.len(), 1);
        assert!(matches!(&remaining[0], Listener::Dependent(k) if *k == b));
    }
}
