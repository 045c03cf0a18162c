use super::{AnyObservable, Observable};
use crate::runtime;
use core::{fmt::Debug, hash::Hash};
use std::{cell::RefCell, mem, sync::Arc, sync::Weak};

thread_local! {
    static OBSERVER: RefCell<Option<ObserverState>> = const { RefCell::new(None) };
}

#[derive(Debug)]
struct ObserverState {
    derivation: AnyDerivation,
    untracked: bool,
}

/// The current reactive observer.
///
/// The observer is whatever derivation is currently tracking its
/// dependencies. For example, while a reaction runs, that reaction is the
/// observer, which means every atom read during the run is captured into its
/// observing list.
pub struct Observer;

#[derive(Debug)]
struct RestoreObserverOnDrop(Option<ObserverState>);

impl Drop for RestoreObserverOnDrop {
    fn drop(&mut self) {
        OBSERVER.with_borrow_mut(|o| *o = self.0.take());
    }
}

impl Observer {
    /// Returns the current observer, unless tracking is suspended.
    pub fn get() -> Option<AnyDerivation> {
        OBSERVER.with_borrow(|obs| {
            obs.as_ref().and_then(|obs| {
                if obs.untracked {
                    None
                } else {
                    Some(obs.derivation.clone())
                }
            })
        })
    }

    /// Whether any derivation is on the stack, tracking or not.
    pub fn is_active() -> bool {
        OBSERVER.with_borrow(|obs| obs.is_some())
    }

    fn take() -> RestoreObserverOnDrop {
        RestoreObserverOnDrop(OBSERVER.with_borrow_mut(Option::take))
    }

    fn replace(derivation: AnyDerivation) -> RestoreObserverOnDrop {
        RestoreObserverOnDrop(OBSERVER.with(|o| {
            mem::replace(
                &mut *o.borrow_mut(),
                Some(ObserverState {
                    derivation,
                    untracked: false,
                }),
            )
        }))
    }
}

/// Suspends dependency tracking while running the given function.
///
/// Atom reads inside `fun` are not captured by the surrounding derivation, so
/// changes to them will not re-trigger it.
///
/// ```rust
/// use observable_graph::{
///     graph::untracked, prelude::*, reaction::autorun, Computed,
///     ObservableValue,
/// };
///
/// let a = ObservableValue::new(0);
/// let b = ObservableValue::new(0);
/// let c = Computed::new({
///     let (a, b) = (a.clone(), b.clone());
///     // this computed will *only* update when `a` changes
///     move |_| a.get() + untracked(|| b.get())
/// });
/// // observe `c` so it caches instead of recomputing per read
/// let _watch = autorun({
///     let c = c.clone();
///     move || {
///         c.get();
///     }
/// });
///
/// assert_eq!(c.get(), 0);
/// a.set(1);
/// assert_eq!(c.get(), 1);
/// b.set(1);
/// // hasn't updated, because we untracked before reading b
/// assert_eq!(c.get(), 1);
/// a.set(2);
/// assert_eq!(c.get(), 3);
/// ```
pub fn untracked<T>(fun: impl FnOnce() -> T) -> T {
    let _prev = Observer::take();
    fun()
}

/// Hands a freshly read `source` to the tracking derivation, if one is
/// active. Duplicates within one run are collapsed when the run reconciles.
pub(crate) fn report_observed(source: AnyObservable) {
    if let Some(observer) = Observer::get() {
        observer.capture_dependency(source);
    }
}

/// Converts this type to its type-erased equivalent.
pub trait ToAnyDerivation {
    /// Converts this type to its type-erased equivalent.
    fn to_any_derivation(&self) -> AnyDerivation;
}

/// Describes the behavior of any node that tracks dependencies: a computed
/// value or a reaction.
pub trait Derivation: Send + Sync {
    /// The debug name of this node.
    fn name(&self) -> Arc<str>;

    /// An upstream dependency entered its stale interval.
    fn on_dependency_stale(&self);

    /// An upstream dependency left its stale interval. `changed` reports
    /// whether it actually produced a new value.
    fn on_dependency_ready(&self, changed: bool);

    /// Records a read of `source` during the current tracked run. Duplicates
    /// are tolerated here and collapsed when the run is reconciled.
    fn capture_dependency(&self, source: AnyObservable);

    /// Begins a tracked run: resets the capture buffer and stamps the run id.
    fn start_tracking(&self, run_id: u64);

    /// Ends a tracked run: reconciles the captured dependencies against the
    /// previous run and returns the sources that became fresh and the sources
    /// that were dropped, in that order.
    fn stop_tracking(&self) -> (Vec<AnyObservable>, Vec<AnyObservable>);

    /// Snapshot of the currently bound dependencies.
    fn observing(&self) -> Vec<AnyObservable>;

    /// The observable half of this node, if it has one. Computed values play
    /// both roles; reactions return `None`.
    fn as_observable(&self) -> Option<AnyObservable> {
        None
    }
}

/// A type-erased handle to a [`Derivation`] node.
#[derive(Clone)]
pub struct AnyDerivation(
    pub(crate) usize,
    pub(crate) Weak<dyn Derivation + Send + Sync>,
);

impl Debug for AnyDerivation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AnyDerivation").field(&self.0).finish()
    }
}

impl Hash for AnyDerivation {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialEq for AnyDerivation {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for AnyDerivation {}

impl ToAnyDerivation for AnyDerivation {
    fn to_any_derivation(&self) -> AnyDerivation {
        self.clone()
    }
}

impl Derivation for AnyDerivation {
    fn name(&self) -> Arc<str> {
        match self.1.upgrade() {
            Some(inner) => inner.name(),
            None => Arc::from("<dropped>"),
        }
    }

    fn on_dependency_stale(&self) {
        if let Some(inner) = self.1.upgrade() {
            inner.on_dependency_stale();
        }
    }

    fn on_dependency_ready(&self, changed: bool) {
        if let Some(inner) = self.1.upgrade() {
            inner.on_dependency_ready(changed);
        }
    }

    fn capture_dependency(&self, source: AnyObservable) {
        if let Some(inner) = self.1.upgrade() {
            inner.capture_dependency(source);
        }
    }

    fn start_tracking(&self, run_id: u64) {
        if let Some(inner) = self.1.upgrade() {
            inner.start_tracking(run_id);
        }
    }

    fn stop_tracking(&self) -> (Vec<AnyObservable>, Vec<AnyObservable>) {
        match self.1.upgrade() {
            Some(inner) => inner.stop_tracking(),
            None => (Vec::new(), Vec::new()),
        }
    }

    fn observing(&self) -> Vec<AnyObservable> {
        match self.1.upgrade() {
            Some(inner) => inner.observing(),
            None => Vec::new(),
        }
    }

    fn as_observable(&self) -> Option<AnyObservable> {
        self.1.upgrade().and_then(|inner| inner.as_observable())
    }
}

/// Runs code with some derivation as the thread-local [`Observer`].
pub trait WithObserver {
    /// Runs the given function with this derivation as the thread-local
    /// [`Observer`], restoring the previous observer on all exit paths.
    fn with_observer<T>(&self, fun: impl FnOnce() -> T) -> T;
}

impl WithObserver for AnyDerivation {
    fn with_observer<T>(&self, fun: impl FnOnce() -> T) -> T {
        let _prev = Observer::replace(self.clone());
        fun()
    }
}

/// Runs `fun` as the tracked body of `derivation` and reconciles its
/// dependency edges afterwards.
///
/// While `fun` runs, `derivation` is the thread-local observer, so every
/// observable read inside appends itself to the capture buffer. When `fun`
/// returns, the captured list is diffed against the previous run: fresh
/// sources gain this derivation as an observer, dropped sources lose it, and
/// unchanged sources are left untouched.
///
/// If `fun` panics, the capture buffer is discarded and the previous
/// dependency edges stay bound, so no observer leak occurs; the thread-local
/// observer is restored by a drop guard either way.
pub(crate) fn track_derived_function<T>(
    derivation: &AnyDerivation,
    fun: impl FnOnce() -> T,
) -> T {
    derivation.start_tracking(runtime::next_run_id());
    let value = derivation.with_observer(fun);
    let (fresh, dropped) = derivation.stop_tracking();
    for source in fresh {
        source.add_observer(derivation.clone());
        // A source that is mid-wave has already broadcast `stale` to its
        // previous observers; the newcomer needs the matching mark so the
        // upcoming `ready` leaves its counters balanced.
        if source.is_stale() {
            derivation.on_dependency_stale();
        }
    }
    for source in dropped {
        let was_stale = source.is_stale();
        source.remove_observer(derivation);
        // The converse: a `stale` already arrived from this source, but its
        // `ready` never will.
        if was_stale {
            derivation.on_dependency_ready(false);
        }
    }
    value
}
