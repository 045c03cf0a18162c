use super::AnyDerivation;
use core::{fmt::Debug, hash::Hash};
use std::sync::{Arc, Weak};

/// Converts this type to its type-erased equivalent.
pub trait ToAnyObservable {
    /// Converts this type to its type-erased equivalent.
    fn to_any_observable(&self) -> AnyObservable;
}

/// Describes the behavior of any node that can be depended upon: an atom, or
/// a computed value acting as a source for downstream derivations.
pub trait Observable: Send + Sync {
    /// The debug name of this node.
    fn name(&self) -> Arc<str>;

    /// Adds an observer to this node's observer set.
    fn add_observer(&self, observer: AnyDerivation);

    /// Removes an observer from this node's observer set.
    fn remove_observer(&self, observer: &AnyDerivation);

    /// Snapshot of the current observer set, in subscription order.
    fn observers(&self) -> Vec<AnyDerivation>;

    /// Scratch flag used by dependency reconciliation. Zero whenever no
    /// reconciliation is in progress.
    fn diff_flag(&self) -> i32;

    /// Sets the reconciliation scratch flag.
    fn set_diff_flag(&self, flag: i32);

    /// Whether this node currently sits inside an open stale interval, i.e.
    /// it has broadcast `stale` but not yet the matching `ready`.
    fn is_stale(&self) -> bool {
        false
    }

    /// The derivation half of this node, if it has one. Computed values play
    /// both roles; atoms return `None`.
    fn as_derivation(&self) -> Option<AnyDerivation> {
        None
    }
}

/// A type-erased handle to an [`Observable`] node.
///
/// The `usize` is the address of the underlying allocation and serves as the
/// node's stable identity; the weak pointer lets handles outlive the node
/// without keeping it alive.
#[derive(Clone)]
pub struct AnyObservable(
    pub(crate) usize,
    pub(crate) Weak<dyn Observable + Send + Sync>,
);

impl Debug for AnyObservable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AnyObservable").field(&self.0).finish()
    }
}

impl Hash for AnyObservable {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialEq for AnyObservable {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for AnyObservable {}

impl ToAnyObservable for AnyObservable {
    fn to_any_observable(&self) -> AnyObservable {
        self.clone()
    }
}

impl Observable for AnyObservable {
    fn name(&self) -> Arc<str> {
        match self.1.upgrade() {
            Some(inner) => inner.name(),
            None => Arc::from("<dropped>"),
        }
    }

    fn add_observer(&self, observer: AnyDerivation) {
        if let Some(inner) = self.1.upgrade() {
            inner.add_observer(observer);
        }
    }

    fn remove_observer(&self, observer: &AnyDerivation) {
        if let Some(inner) = self.1.upgrade() {
            inner.remove_observer(observer);
        }
    }

    fn observers(&self) -> Vec<AnyDerivation> {
        match self.1.upgrade() {
            Some(inner) => inner.observers(),
            None => Vec::new(),
        }
    }

    fn diff_flag(&self) -> i32 {
        match self.1.upgrade() {
            Some(inner) => inner.diff_flag(),
            None => 0,
        }
    }

    fn set_diff_flag(&self, flag: i32) {
        if let Some(inner) = self.1.upgrade() {
            inner.set_diff_flag(flag);
        }
    }

    fn is_stale(&self) -> bool {
        match self.1.upgrade() {
            Some(inner) => inner.is_stale(),
            None => false,
        }
    }

    fn as_derivation(&self) -> Option<AnyDerivation> {
        self.1.upgrade().and_then(|inner| inner.as_derivation())
    }
}
