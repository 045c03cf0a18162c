//! The leaf node of the reactive graph.
//!
//! An [`Atom`] carries no value of its own; it is the unit of observability
//! that value-bearing containers embed. Upper layers call
//! [`report_observed`](Atom::report_observed) whenever the state guarded by
//! the atom is read and [`report_changed`](Atom::report_changed) whenever it
//! is mutated; everything else follows from the graph.

use crate::{
    errors::Result,
    graph::{
        propagate_changed, AnyDerivation, AnyObservable, Observable,
        ObserverSet, ToAnyObservable,
    },
    runtime,
    traits::{DefinedAt, IsDisposed, Track, Trigger},
};
use core::fmt::{Debug, Formatter};
use or_poisoned::OrPoisoned;
use std::{
    panic::Location,
    sync::{Arc, RwLock, Weak},
};

type Hook = Arc<dyn Fn() + Send + Sync>;

/// A leaf observable: the source of truth every derivation ultimately rests
/// on.
///
/// Atoms fire two optional hooks when their observer set transitions across
/// empty, which upper layers use to acquire and release resources exactly
/// while somebody is watching.
pub struct Atom {
    #[cfg(debug_assertions)]
    defined_at: &'static Location<'static>,
    inner: Arc<RwLock<AtomInner>>,
}

pub(crate) struct AtomInner {
    name: Arc<str>,
    observers: ObserverSet,
    diff_flag: i32,
    on_become_observed: Option<Hook>,
    on_become_unobserved: Option<Hook>,
}

impl Clone for Atom {
    fn clone(&self) -> Self {
        Self {
            #[cfg(debug_assertions)]
            defined_at: self.defined_at,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Debug for Atom {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Atom")
            .field("name", &self.name())
            .field("data", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Atom {}

impl Atom {
    /// Creates a named atom.
    #[track_caller]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self::with_hooks(name, None, None)
    }

    /// Creates a named atom with become-observed/become-unobserved hooks.
    ///
    /// `on_become_observed` fires when the observer set goes from empty to
    /// non-empty, `on_become_unobserved` on the way back.
    #[track_caller]
    pub fn with_hooks(
        name: impl Into<Arc<str>>,
        on_become_observed: Option<Hook>,
        on_become_unobserved: Option<Hook>,
    ) -> Self {
        Self {
            #[cfg(debug_assertions)]
            defined_at: Location::caller(),
            inner: Arc::new(RwLock::new(AtomInner {
                name: name.into(),
                observers: ObserverSet::new(),
                diff_flag: 0,
                on_become_observed,
                on_become_unobserved,
            })),
        }
    }

    /// The debug name of this atom.
    pub fn name(&self) -> Arc<str> {
        self.inner.read().or_poisoned().name.clone()
    }

    /// Whether at least one derivation currently observes this atom.
    pub fn is_observed(&self) -> bool {
        !self.inner.read().or_poisoned().observers.is_empty()
    }

    /// Reports that the state guarded by this atom was read.
    ///
    /// If a derivation is currently tracking, the atom is captured into its
    /// observing list; otherwise this is a no-op. Idempotent within a run.
    pub fn report_observed(&self) {
        self.track();
    }

    /// Reports that the state guarded by this atom changed, propagating a
    /// full stale/ready wave through the graph.
    ///
    /// If no batch is open, a single-write batch is opened around the wave,
    /// so reactions still only run once the wave has settled.
    pub fn try_report_changed(&self) -> Result<()> {
        runtime::check_state_mutation(&self.name())?;
        let _batch = runtime::batch();
        propagate_changed(&*self.inner);
        Ok(())
    }

    /// Panicking variant of [`try_report_changed`](Self::try_report_changed).
    #[track_caller]
    pub fn report_changed(&self) {
        self.try_report_changed()
            .unwrap_or_else(|err| panic!("{err}"));
    }
}

impl DefinedAt for Atom {
    #[inline(always)]
    fn defined_at(&self) -> Option<&'static Location<'static>> {
        #[cfg(debug_assertions)]
        {
            Some(self.defined_at)
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    }
}

impl IsDisposed for Atom {
    #[inline(always)]
    fn is_disposed(&self) -> bool {
        false
    }
}

impl Trigger for Atom {
    #[track_caller]
    fn trigger(&self) {
        self.report_changed();
    }
}

impl ToAnyObservable for Atom {
    fn to_any_observable(&self) -> AnyObservable {
        AnyObservable(
            Arc::as_ptr(&self.inner) as usize,
            Arc::downgrade(&self.inner) as Weak<dyn Observable + Send + Sync>,
        )
    }
}

impl Observable for RwLock<AtomInner> {
    fn name(&self) -> Arc<str> {
        self.read().or_poisoned().name.clone()
    }

    fn add_observer(&self, observer: AnyDerivation) {
        let hook = {
            let mut lock = self.write().or_poisoned();
            let was_empty = lock.observers.is_empty();
            lock.observers.subscribe(observer);
            if was_empty && !lock.observers.is_empty() {
                lock.on_become_observed.clone()
            } else {
                None
            }
        };
        if let Some(hook) = hook {
            hook();
        }
    }

    fn remove_observer(&self, observer: &AnyDerivation) {
        let hook = {
            let mut lock = self.write().or_poisoned();
            let was_empty = lock.observers.is_empty();
            lock.observers.unsubscribe(observer);
            if !was_empty && lock.observers.is_empty() {
                lock.on_become_unobserved.clone()
            } else {
                None
            }
        };
        if let Some(hook) = hook {
            hook();
        }
    }

    fn observers(&self) -> Vec<AnyDerivation> {
        self.read().or_poisoned().observers.snapshot()
    }

    fn diff_flag(&self) -> i32 {
        self.read().or_poisoned().diff_flag
    }

    fn set_diff_flag(&self, flag: i32) {
        self.write().or_poisoned().diff_flag = flag;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atoms_have_stable_names() {
        let atom = Atom::new("counter");
        assert_eq!(&*atom.name(), "counter");
    }

    #[test]
    fn report_changed_outside_a_derivation_is_a_quiet_no_op() {
        let atom = Atom::new("lonely");
        // no observers, no batch: the implicit single-write batch opens and
        // closes without anything to do
        atom.report_changed();
        assert!(!atom.is_observed());
    }
}
