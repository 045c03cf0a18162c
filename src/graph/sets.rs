//! The set type that holds the observers affiliated with an observable node.
//!
//! This is implemented as an insertion-ordered set built on [`IndexSet`]. The
//! M:N relationship between observables and their observers usually consists
//! of fairly small numbers, and insertion order matters: stale and ready
//! notifications must reach observers in the order they subscribed, so that
//! nested derivations settle outside-in.

use super::AnyDerivation;
use indexmap::IndexSet;
use rustc_hash::FxHasher;
use std::{hash::BuildHasherDefault, mem};

type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;

/// The observers currently subscribed to a single observable node.
#[derive(Debug, Default, Clone)]
pub struct ObserverSet(FxIndexSet<AnyDerivation>);

impl ObserverSet {
    pub(crate) fn new() -> Self {
        Self(FxIndexSet::with_capacity_and_hasher(2, Default::default()))
    }

    pub(crate) fn subscribe(&mut self, observer: AnyDerivation) {
        self.0.insert(observer);
    }

    pub(crate) fn unsubscribe(&mut self, observer: &AnyDerivation) {
        // note: do not use `.swap_remove()` here.
        // using `.shift_remove()` is slower because it shifts other items,
        // but it maintains the order of the observers, which matters when
        // derivations are nested: the outer one must settle before the
        // inner one it created.
        self.0.shift_remove(observer);
    }

    pub(crate) fn take(&mut self) -> FxIndexSet<AnyDerivation> {
        mem::take(&mut self.0)
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Snapshot of the current membership, in subscription order.
    ///
    /// Propagation iterates over snapshots so that observers added or removed
    /// mid-wave do not invalidate the iteration.
    pub(crate) fn snapshot(&self) -> Vec<AnyDerivation> {
        self.0.iter().cloned().collect()
    }
}

impl IntoIterator for ObserverSet {
    type Item = AnyDerivation;
    type IntoIter = <FxIndexSet<AnyDerivation> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ObserverSet {
    type Item = &'a AnyDerivation;
    type IntoIter = <&'a FxIndexSet<AnyDerivation> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
