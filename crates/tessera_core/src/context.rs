//! Context identity tokens.
//!
//! A GPU object namespace is identified by a [`ContextRef`]. Several render
//! contexts can share one namespace (shared GL contexts), in which case they
//! hold clones of the same `ContextRef` and compare equal.
//!
//! - [`ContextRef`]: strong, keeps the namespace alive
//! - [`WeakContextRef`]: held by resource caches, does not keep it alive
//! - [`ContextId`]: plain `Copy` token, used as a map key and in delete batches

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, comparable, hashable identity of one GPU object namespace.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    #[inline]
    #[must_use]
    pub fn to_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextId({})", self.0)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

#[derive(Debug)]
struct ContextIdentity {
    id: ContextId,
}

/// Strong reference to a GPU object namespace.
#[derive(Debug, Clone)]
pub struct ContextRef(Arc<ContextIdentity>);

impl ContextRef {
    /// Allocates a fresh namespace.
    #[must_use]
    pub fn new() -> Self {
        let id = ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed));
        Self(Arc::new(ContextIdentity { id }))
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.0.id
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakContextRef {
        WeakContextRef {
            id: self.0.id,
            inner: Arc::downgrade(&self.0),
        }
    }
}

impl Default for ContextRef {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ContextRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for ContextRef {}

impl std::hash::Hash for ContextRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

/// Weak reference to a GPU object namespace.
///
/// The id stays readable after the namespace is gone, so stale entries can
/// still be reported and pruned.
#[derive(Debug, Clone)]
pub struct WeakContextRef {
    id: ContextId,
    inner: Weak<ContextIdentity>,
}

impl WeakContextRef {
    #[inline]
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Returns `true` while at least one [`ContextRef`] to the namespace exists.
    #[inline]
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    #[must_use]
    pub fn upgrade(&self) -> Option<ContextRef> {
        self.inner.upgrade().map(ContextRef)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_identity() {
        let a = ContextRef::new();
        let b = a.clone();
        let c = ContextRef::new();
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn weak_dies_with_last_strong() {
        let a = ContextRef::new();
        let weak = a.downgrade();
        let id = a.id();
        assert!(weak.is_alive());
        drop(a);
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
        assert_eq!(weak.id(), id);
    }
}
