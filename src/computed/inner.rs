use crate::{
    errors::{Error, Result},
    graph::{
        propagate_ready_to, propagate_stale_to, track_derived_function,
        AnyDerivation, AnyObservable, Derivation, DerivationState, Observable,
        ObserverSet,
    },
    runtime,
};
use or_poisoned::OrPoisoned;
use std::sync::{Arc, RwLock};

pub(crate) type Getter<T> =
    Arc<dyn Fn(Option<&T>) -> Result<T> + Send + Sync>;
pub(crate) type Setter<T> = Arc<dyn Fn(T) + Send + Sync>;

/// The state shared by all handles to one computed value.
///
/// A computed value plays both graph roles at once: it observes the sources
/// its getter reads, and it is observed by whatever reads it. The cached
/// value is valid exactly while `is_bound` holds and no dependency has
/// signalled a change since the last computation.
pub struct ComputedInner<T> {
    pub(crate) name: Arc<str>,
    pub(crate) value: Option<T>,
    pub(crate) last_error: Option<Error>,
    pub(crate) getter: Getter<T>,
    pub(crate) setter: Option<Setter<T>>,
    pub(crate) compare_with: fn(&T, &T) -> bool,
    /// Cycle guard: set for the duration of a getter run.
    pub(crate) is_computing: bool,
    /// Whether this node currently holds edges to its dependencies. Unbound
    /// (cold) computed values recompute on every read.
    pub(crate) is_bound: bool,
    pub(crate) deps: DerivationState,
    pub(crate) observers: ObserverSet,
    pub(crate) diff_flag: i32,
    pub(crate) any_derivation: AnyDerivation,
    pub(crate) any_observable: AnyObservable,
}

impl<T> core::fmt::Debug for ComputedInner<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ComputedInner")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Clears the cycle guard on all exit paths, a panicking getter included.
struct ResetComputing<'a, T>(&'a RwLock<ComputedInner<T>>);

impl<T> Drop for ResetComputing<'_, T> {
    fn drop(&mut self) {
        self.0.write().or_poisoned().is_computing = false;
    }
}

/// Runs the getter as a tracked function, rebinding dependency edges, and
/// caches the outcome. Returns whether the cached value actually changed.
pub(super) fn track_and_compute<T: Send + Sync + 'static>(
    this: &RwLock<ComputedInner<T>>,
) -> bool {
    let (getter, prev_value, prev_error, compare_with, any_derivation) = {
        let mut lock = this.write().or_poisoned();
        if lock.is_computing {
            lock.last_error = Some(Error::CycleDetected {
                name: lock.name.clone(),
            });
            return true;
        }
        lock.is_computing = true;
        (
            lock.getter.clone(),
            lock.value.take(),
            lock.last_error.take(),
            lock.compare_with,
            lock.any_derivation.clone(),
        )
    };
    let _reset = ResetComputing(this);

    // Getters are pure: no writes to observed state while one runs.
    let result = track_derived_function(&any_derivation, || {
        runtime::allow_state_changes(false, || getter(prev_value.as_ref()))
    });

    let mut lock = this.write().or_poisoned();
    lock.is_bound = true;
    match result {
        Ok(new_value) => {
            let changed = match (&prev_value, prev_error.is_some()) {
                (Some(prev), false) => !compare_with(prev, &new_value),
                // first computation, or recovery from a cached error
                _ => true,
            };
            lock.value = Some(new_value);
            lock.last_error = None;
            changed
        }
        Err(error) => {
            // keep the last good value around, but surface the error on
            // every read until a dependency changes
            lock.value = prev_value;
            lock.last_error = Some(error);
            true
        }
    }
}

/// Runs the getter once, untracked and unbound; the regime for reads while
/// nobody observes this node. Refreshes the cache but leaves the node cold.
pub(super) fn peek<T: Send + Sync + 'static>(
    this: &RwLock<ComputedInner<T>>,
) -> Result<()> {
    let (getter, prev_value) = {
        let mut lock = this.write().or_poisoned();
        if lock.is_computing {
            return Err(Error::CycleDetected {
                name: lock.name.clone(),
            });
        }
        lock.is_computing = true;
        (lock.getter.clone(), lock.value.take())
    };
    let _reset = ResetComputing(this);

    let result = crate::graph::untracked(|| {
        runtime::allow_state_changes(false, || getter(prev_value.as_ref()))
    });

    let mut lock = this.write().or_poisoned();
    match result {
        Ok(new_value) => {
            lock.value = Some(new_value);
            lock.last_error = None;
            Ok(())
        }
        Err(error) => {
            lock.value = prev_value;
            lock.last_error = Some(error.clone());
            Err(error)
        }
    }
}

impl<T: Send + Sync + 'static> Observable for RwLock<ComputedInner<T>> {
    fn name(&self) -> Arc<str> {
        self.read().or_poisoned().name.clone()
    }

    fn add_observer(&self, observer: AnyDerivation) {
        self.write().or_poisoned().observers.subscribe(observer);
    }

    fn remove_observer(&self, observer: &AnyDerivation) {
        // Losing the last observer sends the node cold: its dependency edges
        // are released so upstream sources can go cold in turn, and the next
        // read recomputes from scratch.
        let suspended = {
            let mut lock = self.write().or_poisoned();
            lock.observers.unsubscribe(observer);
            if lock.observers.is_empty() && lock.is_bound {
                lock.is_bound = false;
                Some((lock.deps.clear(), lock.any_derivation.clone()))
            } else {
                None
            }
        };
        if let Some((sources, this)) = suspended {
            for source in sources {
                source.remove_observer(&this);
            }
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

    fn is_stale(&self) -> bool {
        self.read().or_poisoned().deps.stale_count > 0
    }

    fn as_derivation(&self) -> Option<AnyDerivation> {
        Some(self.read().or_poisoned().any_derivation.clone())
    }
}

impl<T: Send + Sync + 'static> Derivation for RwLock<ComputedInner<T>> {
    fn name(&self) -> Arc<str> {
        self.read().or_poisoned().name.clone()
    }

    fn on_dependency_stale(&self) {
        let entered_stale = {
            let mut lock = self.write().or_poisoned();
            lock.deps.stale_count += 1;
            (lock.deps.stale_count == 1).then(|| lock.observers.snapshot())
        };
        // Forward the stale mark the first time only; observers count their
        // inputs, not the writes behind them.
        if let Some(observers) = entered_stale {
            propagate_stale_to(observers);
        }
    }

    fn on_dependency_ready(&self, changed: bool) {
        let settled = {
            let mut lock = self.write().or_poisoned();
            // A node that suspended mid-wave may still sit in a ready
            // snapshot taken before it unsubscribed; nothing is owed then.
            if lock.deps.stale_count == 0 {
                return;
            }
            if changed {
                lock.deps.changed_count += 1;
            }
            lock.deps.stale_count -= 1;
            debug_assert!(
                lock.deps.stale_count >= 0,
                "`{}` received more ready than stale notifications",
                lock.name
            );
            if lock.deps.stale_count == 0 {
                let had_changes = lock.deps.changed_count > 0;
                lock.deps.changed_count = 0;
                Some(had_changes)
            } else {
                None
            }
        };
        match settled {
            // every input has settled and at least one changed: revalidate
            // now, then forward our own changed flag
            Some(true) => {
                let changed = track_and_compute(self);
                let observers = self.read().or_poisoned().observers.snapshot();
                propagate_ready_to(observers, changed);
            }
            // inputs settled without producing anything new
            Some(false) => {
                let observers = self.read().or_poisoned().observers.snapshot();
                propagate_ready_to(observers, false);
            }
            None => {}
        }
    }

    fn capture_dependency(&self, source: AnyObservable) {
        self.write().or_poisoned().deps.capture(source);
    }

    fn start_tracking(&self, run_id: u64) {
        self.write().or_poisoned().deps.start(run_id);
    }

    fn stop_tracking(&self) -> (Vec<AnyObservable>, Vec<AnyObservable>) {
        self.write().or_poisoned().deps.reconcile()
    }

    fn observing(&self) -> Vec<AnyObservable> {
        self.read().or_poisoned().deps.observing_snapshot()
    }

    fn as_observable(&self) -> Option<AnyObservable> {
        Some(self.read().or_poisoned().any_observable.clone())
    }
}
