//! Provider Identity
//!
//! Every provider declared in a [`ProviderContainer`] is addressed through a
//! typed key. Keys are cheap `Copy` handles: the container owns the node state,
//! the key only names it.
//!
//! Family providers add a second level of identity: the argument value. Two
//! reads with equal arguments (by value equality) must land on the identical
//! node instance, so the argument is erased into [`FamilyArg`], a wrapper that
//! preserves `Eq` and `Hash` across the type boundary.
//!
//! [`ProviderContainer`]: crate::graph::ProviderContainer

use std::any::{Any, TypeId};
use std::fmt::{self, Debug};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for a declared provider.
///
/// Uses an atomic counter to ensure uniqueness across threads and containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(u64);

impl ProviderId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Typed handle to a non-family provider holding a value of type `T`.
///
/// Returned by the registration methods on `ProviderContainer`. The phantom
/// type parameter lets `read`/`watch`/`set` stay statically typed while the
/// container stores values type-erased.
pub struct ProviderKey<T> {
    id: ProviderId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ProviderKey<T> {
    pub(crate) fn new() -> Self {
        Self {
            id: ProviderId::next(),
            _marker: PhantomData,
        }
    }

    /// The provider's identity within its container.
    pub fn id(&self) -> ProviderId {
        self.id
    }
}

// Manual impls: derives would demand `T: Clone`/`T: Copy`, but the key itself
// is always copyable regardless of the value type.
impl<T> Clone for ProviderKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ProviderKey<T> {}

impl<T> Debug for ProviderKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderKey").field("id", &self.id).finish()
    }
}

/// Typed handle to a family provider: one independent node per distinct
/// argument value `A`.
pub struct FamilyKey<A, T> {
    id: ProviderId,
    _marker: PhantomData<fn(A) -> T>,
}

impl<A, T> FamilyKey<A, T> {
    pub(crate) fn new() -> Self {
        Self {
            id: ProviderId::next(),
            _marker: PhantomData,
        }
    }

    /// The family's identity within its container.
    pub fn id(&self) -> ProviderId {
        self.id
    }
}

impl<A, T> Clone for FamilyKey<A, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A, T> Copy for FamilyKey<A, T> {}

impl<A, T> Debug for FamilyKey<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FamilyKey").field("id", &self.id).finish()
    }
}

/// Object-safe view of a family argument value.
///
/// Lets the container compare and hash arguments of arbitrary concrete type.
pub(crate) trait ArgValue: Any + Debug + Send + Sync {
    fn eq_dyn(&self, other: &dyn ArgValue) -> bool;
    fn hash_dyn(&self, state: &mut dyn Hasher);
    fn as_any(&self) -> &dyn Any;
}

impl<A> ArgValue for A
where
    A: Any + Debug + Eq + Hash + Send + Sync,
{
    fn eq_dyn(&self, other: &dyn ArgValue) -> bool {
        other
            .as_any()
            .downcast_ref::<A>()
            .map_or(false, |other| self == other)
    }

    fn hash_dyn(&self, mut state: &mut dyn Hasher) {
        // Hash the type first so equal bit patterns of different types
        // cannot collide into the same family member.
        TypeId::of::<A>().hash(&mut state);
        self.hash(&mut state);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Type-erased family argument with value-equality semantics.
#[derive(Clone)]
pub struct FamilyArg(Arc<dyn ArgValue>);

impl FamilyArg {
    pub(crate) fn new<A>(arg: A) -> Self
    where
        A: Any + Debug + Eq + Hash + Send + Sync,
    {
        Self(Arc::new(arg))
    }

    pub(crate) fn downcast_ref<A: 'static>(&self) -> Option<&A> {
        self.0.as_any().downcast_ref::<A>()
    }
}

impl PartialEq for FamilyArg {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_dyn(&*other.0)
    }
}

impl Eq for FamilyArg {}

impl Hash for FamilyArg {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash_dyn(state);
    }
}

impl Debug for FamilyArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Full identity of a node slot: provider plus optional family argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub(crate) id: ProviderId,
    pub(crate) arg: Option<FamilyArg>,
}

impl NodeKey {
    pub(crate) fn plain(id: ProviderId) -> Self {
        Self { id, arg: None }
    }

    pub(crate) fn family(id: ProviderId, arg: FamilyArg) -> Self {
        Self { id, arg: Some(arg) }
    }

    /// The provider's identity, ignoring any family argument.
    pub fn provider(&self) -> ProviderId {
        self.id
    }
}
