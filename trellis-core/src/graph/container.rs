//! Provider Container
//!
//! The container is the explicit owner of the state graph: a registry of
//! provider definitions plus the node slots created from them on first access.
//! It is passed by reference to everything that needs graph access; there is
//! no process-wide singleton.
//!
//! # Evaluation model
//!
//! Derived nodes run their computation against a [`Ctx`] evaluation context.
//! Reads made through [`Ctx::watch`] are recorded into a scoped frame and
//! committed afterwards as the node's dependency set, so a node's dependencies
//! are exactly what it actually read on its last evaluation.
//!
//! # Propagation
//!
//! `set` replaces a value wholesale and then notifies the node's listeners in
//! registration order. A dependent derived node re-evaluates immediately and
//! notifies its own listeners in turn: propagation is depth-first and finishes
//! entirely before `set` returns. Async and stream nodes settle later through
//! the runtime; a settled result is accepted only if the node's generation has
//! not moved on (stale-result suppression).
//!
//! # Threading
//!
//! The graph assumes the cooperative single-logical-thread model of a UI event
//! loop. Locks exist so slots can be touched from runtime tasks, not to
//! support concurrent mutation of the same node.

use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use indexmap::IndexMap;
use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::{debug, error, trace};

use super::error::GraphError;
use super::key::{FamilyArg, FamilyKey, NodeKey, ProviderId, ProviderKey};
use super::node::{AnyValue, Listener, NodeKind, NodeSlot, NotifyFn, SubscriptionId};
use super::scope::EvalStack;
use super::value::{AsyncValue, OperationFailure};

type InitFn = Arc<dyn Fn() -> AnyValue + Send + Sync>;
type ComputeFn = Arc<dyn Fn(&Ctx<'_>, Option<&FamilyArg>) -> Result<AnyValue, GraphError> + Send + Sync>;
type StartFn = Arc<dyn Fn(Option<&FamilyArg>) -> BoxFuture<'static, AnyValue> + Send + Sync>;
type OpenFn = Arc<dyn Fn() -> BoxStream<'static, StreamItem> + Send + Sync>;

/// One element delivered by a stream node's source, already erased.
/// `failed` marks the error element that terminates the subscription.
pub(crate) struct StreamItem {
    value: AnyValue,
    failed: bool,
}

/// How a provider produces its value. Registered once; slots are created from
/// the definition lazily, per family argument where applicable.
enum NodeDef {
    Constant { init: InitFn },
    Cell { initial: AnyValue },
    Notifier { initial: AnyValue },
    Derived { compute: ComputeFn },
    AsyncComputation { loading: InitFn, start: StartFn },
    StreamSubscription { loading: InitFn, open: OpenFn },
}

impl NodeDef {
    fn kind(&self) -> NodeKind {
        match self {
            NodeDef::Constant { .. } => NodeKind::Constant,
            NodeDef::Cell { .. } => NodeKind::Cell,
            NodeDef::Notifier { .. } => NodeKind::Notifier,
            NodeDef::Derived { .. } => NodeKind::Derived,
            NodeDef::AsyncComputation { .. } => NodeKind::AsyncComputation,
            NodeDef::StreamSubscription { .. } => NodeKind::StreamSubscription,
        }
    }
}

struct ContainerInner {
    defs: RwLock<IndexMap<ProviderId, Arc<NodeDef>>>,
    nodes: RwLock<IndexMap<NodeKey, Arc<NodeSlot>>>,
    eval: EvalStack,
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        // Stream pumps hold only a weak reference back to the container, but
        // one parked on a quiet source would never wake to notice.
        for slot in self.nodes.get_mut().values() {
            if let Some(task) = slot.state.write().task.take() {
                task.abort();
            }
        }
    }
}

/// The state graph. Cheap to clone; clones share the same graph.
#[derive(Clone)]
pub struct ProviderContainer {
    inner: Arc<ContainerInner>,
}

impl Default for ProviderContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ProviderContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderContainer")
            .field("providers", &self.inner.defs.read().len())
            .field("nodes", &self.inner.nodes.read().len())
            .finish()
    }
}

impl ProviderContainer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                defs: RwLock::new(IndexMap::new()),
                nodes: RwLock::new(IndexMap::new()),
                eval: EvalStack::new(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Declare a provider computed once on first access.
    pub fn constant<T, F>(&self, init: F) -> ProviderKey<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let key = ProviderKey::new();
        let init: InitFn = Arc::new(move || Arc::new(init()) as AnyValue);
        self.insert_def(key.id(), NodeDef::Constant { init });
        key
    }

    /// Declare a mutable cell holding `initial`.
    pub fn cell<T>(&self, initial: T) -> ProviderKey<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let key = ProviderKey::new();
        self.insert_def(
            key.id(),
            NodeDef::Cell {
                initial: Arc::new(initial),
            },
        );
        key
    }

    /// Declare a notifier-backed object state node. Behaves like a cell; the
    /// mutation interface lives in whatever controller owns the key.
    pub fn notifier<T>(&self, initial: T) -> ProviderKey<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let key = ProviderKey::new();
        self.insert_def(
            key.id(),
            NodeDef::Notifier {
                initial: Arc::new(initial),
            },
        );
        key
    }

    /// Declare a pure derived node. The computation must be deterministic in
    /// the values it reads through the context and free of side effects.
    pub fn derived<T, F>(&self, compute: F) -> ProviderKey<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&Ctx<'_>) -> Result<T, GraphError> + Send + Sync + 'static,
    {
        let key = ProviderKey::new();
        let compute: ComputeFn = Arc::new(move |ctx, _arg| {
            compute(ctx).map(|value| Arc::new(value) as AnyValue)
        });
        self.insert_def(key.id(), NodeDef::Derived { compute });
        key
    }

    /// Declare a family of derived nodes, one per distinct argument value.
    pub fn family_derived<A, T, F>(&self, compute: F) -> FamilyKey<A, T>
    where
        A: Clone + Eq + Hash + Debug + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        F: Fn(&Ctx<'_>, &A) -> Result<T, GraphError> + Send + Sync + 'static,
    {
        let key = FamilyKey::new();
        let compute: ComputeFn = Arc::new(move |ctx, arg| {
            let arg = arg
                .and_then(FamilyArg::downcast_ref::<A>)
                .expect("family node evaluated without its argument");
            compute(ctx, arg).map(|value| Arc::new(value) as AnyValue)
        });
        self.insert_def(key.id(), NodeDef::Derived { compute });
        key
    }

    /// Declare an async computation. The node starts in `Loading`, settles to
    /// `Data` or `Error`, and restarts on `invalidate`. First access must
    /// happen inside a tokio runtime; without one it fails with
    /// [`GraphError::RuntimeUnavailable`].
    pub fn async_computation<T, F>(&self, start: F) -> ProviderKey<AsyncValue<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> BoxFuture<'static, Result<T, OperationFailure>> + Send + Sync + 'static,
    {
        let key = ProviderKey::new();
        let loading: InitFn = Arc::new(|| Arc::new(AsyncValue::<T>::Loading) as AnyValue);
        let start: StartFn = Arc::new(move |_arg| {
            let future = start();
            async move {
                match future.await {
                    Ok(value) => Arc::new(AsyncValue::Data(value)) as AnyValue,
                    Err(failure) => Arc::new(AsyncValue::<T>::Error(failure)) as AnyValue,
                }
            }
            .boxed()
        });
        self.insert_def(key.id(), NodeDef::AsyncComputation { loading, start });
        key
    }

    /// Declare a family of async computations keyed by argument value.
    pub fn family_async_computation<A, T, F>(&self, start: F) -> FamilyKey<A, AsyncValue<T>>
    where
        A: Clone + Eq + Hash + Debug + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        F: Fn(A) -> BoxFuture<'static, Result<T, OperationFailure>> + Send + Sync + 'static,
    {
        let key = FamilyKey::new();
        let loading: InitFn = Arc::new(|| Arc::new(AsyncValue::<T>::Loading) as AnyValue);
        let start: StartFn = Arc::new(move |arg| {
            let arg = arg
                .and_then(FamilyArg::downcast_ref::<A>)
                .expect("family node evaluated without its argument")
                .clone();
            let future = start(arg);
            async move {
                match future.await {
                    Ok(value) => Arc::new(AsyncValue::Data(value)) as AnyValue,
                    Err(failure) => Arc::new(AsyncValue::<T>::Error(failure)) as AnyValue,
                }
            }
            .boxed()
        });
        self.insert_def(key.id(), NodeDef::AsyncComputation { loading, start });
        key
    }

    /// Declare a subscription to an element stream. Each element transitions
    /// the node to `Data`; a source failure transitions it to `Error` and ends
    /// the subscription. As with async computations, first access requires an
    /// ambient tokio runtime.
    pub fn stream_subscription<T, F>(&self, open: F) -> ProviderKey<AsyncValue<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> BoxStream<'static, Result<T, OperationFailure>> + Send + Sync + 'static,
    {
        let key = ProviderKey::new();
        let loading: InitFn = Arc::new(|| Arc::new(AsyncValue::<T>::Loading) as AnyValue);
        let open: OpenFn = Arc::new(move || {
            open()
                .map(|item| match item {
                    Ok(value) => StreamItem {
                        value: Arc::new(AsyncValue::Data(value)) as AnyValue,
                        failed: false,
                    },
                    Err(failure) => StreamItem {
                        value: Arc::new(AsyncValue::<T>::Error(failure)) as AnyValue,
                        failed: true,
                    },
                })
                .boxed()
        });
        self.insert_def(key.id(), NodeDef::StreamSubscription { loading, open });
        key
    }

    fn insert_def(&self, id: ProviderId, def: NodeDef) {
        debug!(provider = id.raw(), kind = ?def.kind(), "registered provider");
        self.inner.defs.write().insert(id, Arc::new(def));
    }

    // ------------------------------------------------------------------
    // Graph API
    // ------------------------------------------------------------------

    /// Current value without establishing a listening relationship.
    pub fn read<T>(&self, key: ProviderKey<T>) -> Result<T, GraphError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let value = self.current_value(&NodeKey::plain(key.id()))?;
        Ok(downcast::<T>(&value))
    }

    /// Current value of one family member, creating it on first access.
    pub fn read_family<A, T>(&self, key: FamilyKey<A, T>, arg: &A) -> Result<T, GraphError>
    where
        A: Clone + Eq + Hash + Debug + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let node_key = NodeKey::family(key.id(), FamilyArg::new(arg.clone()));
        let value = self.current_value(&node_key)?;
        Ok(downcast::<T>(&value))
    }

    /// Current value plus a live subscription. `on_change` fires on every
    /// subsequent value change, in registration (FIFO) order per node.
    pub fn watch<T, F>(&self, key: ProviderKey<T>, on_change: F) -> Result<(T, SubscriptionId), GraphError>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.watch_key(NodeKey::plain(key.id()), on_change)
    }

    /// `watch` for one family member.
    pub fn watch_family<A, T, F>(
        &self,
        key: FamilyKey<A, T>,
        arg: &A,
        on_change: F,
    ) -> Result<(T, SubscriptionId), GraphError>
    where
        A: Clone + Eq + Hash + Debug + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.watch_key(NodeKey::family(key.id(), FamilyArg::new(arg.clone())), on_change)
    }

    fn watch_key<T, F>(&self, node_key: NodeKey, on_change: F) -> Result<(T, SubscriptionId), GraphError>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        // Evaluate first, attach second, so the new watcher is not notified
        // with the value it is about to receive as the return.
        let value = self.current_value(&node_key)?;
        let slot = self.slot(&node_key)?;
        let id = SubscriptionId::next();
        let notify: NotifyFn = Arc::new(move |value: &AnyValue| {
            if let Some(typed) = value.downcast_ref::<T>() {
                on_change(typed);
            }
        });
        slot.listeners.write().push(Listener::External { id, notify });
        Ok((downcast::<T>(&value), id))
    }

    /// Remove an external watcher.
    pub fn unwatch<T>(&self, key: ProviderKey<T>, subscription: SubscriptionId) -> Result<(), GraphError> {
        self.unwatch_key(&NodeKey::plain(key.id()), subscription)
    }

    /// Remove an external watcher from one family member.
    pub fn unwatch_family<A, T>(
        &self,
        key: FamilyKey<A, T>,
        arg: &A,
        subscription: SubscriptionId,
    ) -> Result<(), GraphError>
    where
        A: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    {
        self.unwatch_key(
            &NodeKey::family(key.id(), FamilyArg::new(arg.clone())),
            subscription,
        )
    }

    fn unwatch_key(&self, node_key: &NodeKey, subscription: SubscriptionId) -> Result<(), GraphError> {
        if !self.is_registered(node_key.id) {
            return Err(GraphError::NotRegistered(node_key.id));
        }
        if let Some(slot) = self.existing_slot(node_key) {
            slot.remove_external(subscription);
        }
        Ok(())
    }

    /// Replace a cell or notifier value and propagate synchronously.
    pub fn set<T>(&self, key: ProviderKey<T>, value: T) -> Result<(), GraphError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let kind = self.kind_of(key.id())?;
        if !kind.is_writable() {
            return Err(GraphError::NotWritable(key.id()));
        }
        let slot = self.slot(&NodeKey::plain(key.id()))?;
        {
            let mut state = slot.state.write();
            state.value = Some(Arc::new(value));
            state.dirty = false;
        }
        trace!(provider = key.id().raw(), "set value, propagating");
        self.notify(&slot)
    }

    /// Force re-evaluation. Nodes with live listeners re-evaluate immediately
    /// (async nodes restart their operation and return to `Loading`); others
    /// re-evaluate on next read or watch.
    pub fn invalidate<T>(&self, key: ProviderKey<T>) -> Result<(), GraphError> {
        self.invalidate_key(&NodeKey::plain(key.id()))
    }

    /// `invalidate` for one family member.
    pub fn invalidate_family<A, T>(&self, key: FamilyKey<A, T>, arg: &A) -> Result<(), GraphError>
    where
        A: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    {
        self.invalidate_key(&NodeKey::family(key.id(), FamilyArg::new(arg.clone())))
    }

    fn invalidate_key(&self, node_key: &NodeKey) -> Result<(), GraphError> {
        if !self.is_registered(node_key.id) {
            return Err(GraphError::NotRegistered(node_key.id));
        }
        let Some(slot) = self.existing_slot(node_key) else {
            // Never accessed; first access will evaluate anyway.
            return Ok(());
        };
        {
            let mut state = slot.state.write();
            state.dirty = true;
            // Orphan any in-flight operation right away, not at restart time.
            state.generation += 1;
        }
        trace!(provider = node_key.id.raw(), kind = ?slot.kind, "invalidated");
        if slot.has_listeners() {
            self.evaluate(&slot)?;
        }
        Ok(())
    }

    /// Drop one family member: abort its tasks, detach its dependency edges,
    /// forget its state. The next access recreates it from scratch, and
    /// derived nodes that depended on the member are dirtied so they pick up
    /// the rebuilt slot.
    pub fn dispose_family_member<A, T>(&self, key: FamilyKey<A, T>, arg: &A) -> Result<(), GraphError>
    where
        A: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    {
        if !self.is_registered(key.id()) {
            return Err(GraphError::NotRegistered(key.id()));
        }
        let node_key = NodeKey::family(key.id(), FamilyArg::new(arg.clone()));
        let removed = self.inner.nodes.write().shift_remove(&node_key);
        if let Some(slot) = removed {
            let (task, deps) = {
                let mut state = slot.state.write();
                (state.task.take(), std::mem::take(&mut state.deps))
            };
            if let Some(task) = task {
                task.abort();
            }
            for dep in deps {
                if let Some(dep_slot) = self.existing_slot(&dep) {
                    dep_slot.remove_dependent(&node_key);
                }
            }
            debug!(provider = key.id().raw(), arg = ?arg, "disposed family member");

            // Dependents still name the disposed key in their committed sets.
            // Prune it and dirty them so their next evaluation rebuilds the
            // member and rewires the edge to the fresh slot.
            for dependent in slot.listeners_snapshot() {
                let Listener::Dependent(dependent) = dependent else {
                    continue;
                };
                let Some(dep_slot) = self.existing_slot(&dependent) else {
                    continue;
                };
                {
                    let mut state = dep_slot.state.write();
                    state.deps.retain(|dep| dep != &node_key);
                    state.dirty = true;
                }
                if dep_slot.has_listeners() {
                    self.evaluate(&dep_slot)?;
                }
            }
        }
        Ok(())
    }

    /// Number of live node slots (family members counted individually).
    pub fn node_count(&self) -> usize {
        self.inner.nodes.read().len()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn is_registered(&self, id: ProviderId) -> bool {
        self.inner.defs.read().contains_key(&id)
    }

    fn kind_of(&self, id: ProviderId) -> Result<NodeKind, GraphError> {
        self.inner
            .defs
            .read()
            .get(&id)
            .map(|def| def.kind())
            .ok_or(GraphError::NotRegistered(id))
    }

    fn existing_slot(&self, key: &NodeKey) -> Option<Arc<NodeSlot>> {
        self.inner.nodes.read().get(key).cloned()
    }

    /// Slot for `key`, created on first access.
    fn slot(&self, key: &NodeKey) -> Result<Arc<NodeSlot>, GraphError> {
        let kind = self.kind_of(key.id)?;
        if let Some(slot) = self.existing_slot(key) {
            return Ok(slot);
        }
        let mut nodes = self.inner.nodes.write();
        let slot = nodes
            .entry(key.clone())
            .or_insert_with(|| Arc::new(NodeSlot::new(key.clone(), kind)))
            .clone();
        Ok(slot)
    }

    fn current_value(&self, key: &NodeKey) -> Result<AnyValue, GraphError> {
        let slot = self.slot(key)?;
        let fresh = {
            let state = slot.state.read();
            !state.dirty && state.value.is_some()
        };
        if !fresh {
            self.evaluate(&slot)?;
        }
        let state = slot.state.read();
        Ok(state
            .value
            .clone()
            .expect("evaluated node has a value"))
    }

    fn evaluate(&self, slot: &Arc<NodeSlot>) -> Result<(), GraphError> {
        let def = self
            .inner
            .defs
            .read()
            .get(&slot.key.id)
            .cloned()
            .ok_or(GraphError::NotRegistered(slot.key.id))?;

        match &*def {
            NodeDef::Constant { init } => {
                let mut state = slot.state.write();
                if state.value.is_none() {
                    state.value = Some(init());
                }
                state.dirty = false;
            }
            NodeDef::Cell { initial } | NodeDef::Notifier { initial } => {
                let mut state = slot.state.write();
                if state.value.is_none() {
                    state.value = Some(initial.clone());
                }
                state.dirty = false;
            }
            NodeDef::Derived { compute } => {
                self.inner.eval.push(slot.key.clone())?;
                let ctx = Ctx { container: self };
                let result = compute(&ctx, slot.key.arg.as_ref());
                let reads = self.inner.eval.pop(&slot.key);
                let value = result?;
                self.commit_deps(slot, reads);
                {
                    let mut state = slot.state.write();
                    state.value = Some(value);
                    state.dirty = false;
                }
                self.notify(slot)?;
            }
            NodeDef::AsyncComputation { loading, start } => {
                let runtime = tokio::runtime::Handle::try_current()
                    .map_err(|_| GraphError::RuntimeUnavailable(slot.key.id))?;
                let generation = {
                    let mut state = slot.state.write();
                    state.generation += 1;
                    state.value = Some(loading());
                    state.dirty = false;
                    state.generation
                };
                debug!(provider = slot.key.id.raw(), generation, "starting async operation");
                let future = start(slot.key.arg.as_ref());
                let weak = Arc::downgrade(&self.inner);
                let key = slot.key.clone();
                let handle = runtime.spawn(async move {
                    let settled = future.await;
                    if let Some(inner) = weak.upgrade() {
                        ProviderContainer { inner }.settle(&key, generation, settled);
                    }
                });
                slot.state.write().task = Some(handle.abort_handle());
                self.notify(slot)?;
            }
            NodeDef::StreamSubscription { loading, open } => {
                let runtime = tokio::runtime::Handle::try_current()
                    .map_err(|_| GraphError::RuntimeUnavailable(slot.key.id))?;
                let generation = {
                    let mut state = slot.state.write();
                    state.generation += 1;
                    state.value = Some(loading());
                    state.dirty = false;
                    // Resubscribing detaches the old pump entirely.
                    if let Some(task) = state.task.take() {
                        task.abort();
                    }
                    state.generation
                };
                debug!(provider = slot.key.id.raw(), generation, "subscribing to stream source");
                let mut stream = open();
                let weak = Arc::downgrade(&self.inner);
                let key = slot.key.clone();
                let handle = runtime.spawn(async move {
                    while let Some(item) = stream.next().await {
                        let Some(inner) = weak.upgrade() else { break };
                        let failed = item.failed;
                        ProviderContainer { inner }.settle(&key, generation, item.value);
                        if failed {
                            break;
                        }
                    }
                });
                slot.state.write().task = Some(handle.abort_handle());
                self.notify(slot)?;
            }
        }
        Ok(())
    }

    /// Accept a settled async result, unless the node has moved on.
    fn settle(&self, key: &NodeKey, generation: u64, value: AnyValue) {
        let Some(slot) = self.existing_slot(key) else {
            return; // disposed while the operation was in flight
        };
        {
            let mut state = slot.state.write();
            if state.generation != generation {
                debug!(
                    provider = key.id.raw(),
                    generation,
                    current = state.generation,
                    "dropping stale async result"
                );
                return;
            }
            state.value = Some(value);
            state.dirty = false;
        }
        if let Err(err) = self.notify(&slot) {
            error!(provider = key.id.raw(), %err, "propagation failed after async settle");
        }
    }

    /// Replace the node's dependency set with what its latest evaluation
    /// actually read, rewiring dependent edges to match.
    fn commit_deps(&self, slot: &Arc<NodeSlot>, reads: Vec<NodeKey>) {
        let mut new_deps: SmallVec<[NodeKey; 4]> = SmallVec::new();
        for key in reads {
            if !new_deps.contains(&key) {
                new_deps.push(key);
            }
        }
        let old_deps = {
            let mut state = slot.state.write();
            std::mem::replace(&mut state.deps, new_deps.clone())
        };
        for dep in old_deps.iter().filter(|dep| !new_deps.contains(dep)) {
            if let Some(dep_slot) = self.existing_slot(dep) {
                dep_slot.remove_dependent(&slot.key);
            }
        }
        for dep in new_deps.iter().filter(|dep| !old_deps.contains(dep)) {
            if let Some(dep_slot) = self.existing_slot(dep) {
                dep_slot
                    .listeners
                    .write()
                    .push(Listener::Dependent(slot.key.clone()));
            }
        }
    }

    /// Notify listeners in registration order; dependent nodes re-evaluate
    /// depth-first before later listeners are reached.
    fn notify(&self, slot: &Arc<NodeSlot>) -> Result<(), GraphError> {
        let Some(value) = slot.state.read().value.clone() else {
            return Ok(());
        };
        let listeners = slot.listeners_snapshot();
        if listeners.is_empty() {
            return Ok(());
        }
        trace!(
            provider = slot.key.id.raw(),
            listeners = listeners.len(),
            "notifying listeners"
        );
        for listener in listeners {
            match listener {
                Listener::External { notify, .. } => notify(&value),
                Listener::Dependent(key) => {
                    if let Some(dependent) = self.existing_slot(&key) {
                        dependent.state.write().dirty = true;
                        self.evaluate(&dependent)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Evaluation context handed to derived computations.
///
/// Reads made through [`Ctx::watch`] become the node's dependencies; reads
/// made through [`Ctx::read`] do not.
pub struct Ctx<'a> {
    container: &'a ProviderContainer,
}

impl Ctx<'_> {
    /// Read a value and record it as a dependency of the evaluating node.
    pub fn watch<T>(&self, key: ProviderKey<T>) -> Result<T, GraphError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let node_key = NodeKey::plain(key.id());
        let value = self.container.current_value(&node_key)?;
        self.container.inner.eval.record(node_key);
        Ok(downcast::<T>(&value))
    }

    /// Read a family member and record it as a dependency.
    pub fn watch_family<A, T>(&self, key: FamilyKey<A, T>, arg: &A) -> Result<T, GraphError>
    where
        A: Clone + Eq + Hash + Debug + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let node_key = NodeKey::family(key.id(), FamilyArg::new(arg.clone()));
        let value = self.container.current_value(&node_key)?;
        self.container.inner.eval.record(node_key);
        Ok(downcast::<T>(&value))
    }

    /// Read a value without establishing a dependency.
    pub fn read<T>(&self, key: ProviderKey<T>) -> Result<T, GraphError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let value = self.container.current_value(&NodeKey::plain(key.id()))?;
        Ok(downcast::<T>(&value))
    }
}

fn downcast<T: Clone + Send + Sync + 'static>(value: &AnyValue) -> T {
    value
        .downcast_ref::<T>()
        .cloned()
        .expect("provider value type does not match its key")
}
