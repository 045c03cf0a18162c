//! Reactions: eager derivations that run side effects.
//!
//! A [`Reaction`] is the terminal node of the graph. It never produces a
//! value for anything downstream; instead, whenever its dependencies settle
//! with a change, it schedules itself onto the runtime's pending queue and,
//! once the outermost batch closes, its `on_invalidate` callback runs. The
//! callback decides what to do — usually it calls [`Reaction::track`] to
//! re-run an effect function and rebind dependencies.
//!
//! [`autorun`] packages the common case: a closure that is tracked on every
//! invalidation and once immediately on creation.

use crate::{
    graph::{
        track_derived_function, AnyDerivation, AnyObservable, Derivation,
        DerivationState, Observable, ToAnyDerivation,
    },
    runtime,
    spy::{self, SpyEvent},
    traits::{DefinedAt, Dispose, IsDisposed},
};
use core::fmt::{Debug, Formatter};
use or_poisoned::OrPoisoned;
use std::{
    panic::Location,
    sync::{Arc, RwLock, Weak},
};

type InvalidateFn = dyn Fn(&Reaction) + Send + Sync;

/// An effectful observer of the reactive graph.
pub struct Reaction {
    inner: Arc<RwLock<ReactionInner>>,
}

pub(crate) struct ReactionInner {
    #[cfg(debug_assertions)]
    defined_at: &'static Location<'static>,
    name: Arc<str>,
    on_invalidate: Arc<InvalidateFn>,
    deps: DerivationState,
    is_scheduled: bool,
    is_track_pending: bool,
    is_running: bool,
    is_disposed: bool,
    any_derivation: AnyDerivation,
    this: Weak<RwLock<ReactionInner>>,
}

impl Clone for Reaction {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Debug for Reaction {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Reaction")
            .field("name", &self.name())
            .field("data", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

impl PartialEq for Reaction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Reaction {}

impl Reaction {
    /// Creates a reaction. `on_invalidate` runs every time the reaction's
    /// dependencies settle with a change; it receives the reaction itself so
    /// it can call [`track`](Self::track) (or not, to skip a run).
    ///
    /// The reaction does nothing until it is scheduled or tracked for the
    /// first time.
    #[track_caller]
    pub fn new(
        name: impl Into<Arc<str>>,
        on_invalidate: impl Fn(&Reaction) + Send + Sync + 'static,
    ) -> Self {
        #[cfg(debug_assertions)]
        let defined_at = Location::caller();
        let inner =
            Arc::new_cyclic(|weak: &Weak<RwLock<ReactionInner>>| {
                let any_derivation = AnyDerivation(
                    weak.as_ptr() as usize,
                    Weak::clone(weak) as Weak<dyn Derivation + Send + Sync>,
                );
                RwLock::new(ReactionInner {
                    #[cfg(debug_assertions)]
                    defined_at,
                    name: name.into(),
                    on_invalidate: Arc::new(on_invalidate),
                    deps: DerivationState::new(),
                    is_scheduled: false,
                    is_track_pending: false,
                    is_running: false,
                    is_disposed: false,
                    any_derivation,
                    this: Weak::clone(weak),
                })
            });
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<RwLock<ReactionInner>>) -> Self {
        Self { inner }
    }

    /// The debug name of this reaction.
    pub fn name(&self) -> Arc<str> {
        self.inner.read().or_poisoned().name.clone()
    }

    /// Whether this reaction currently sits in the pending queue.
    pub fn is_scheduled(&self) -> bool {
        self.inner.read().or_poisoned().is_scheduled
    }

    /// Appends this reaction to the pending queue and triggers a drain,
    /// unless a batch is open or a drain is already running. Scheduling an
    /// already scheduled or disposed reaction is a no-op.
    pub fn schedule(&self) {
        let name = {
            let mut lock = self.inner.write().or_poisoned();
            if lock.is_disposed || lock.is_scheduled {
                return;
            }
            lock.is_scheduled = true;
            lock.name.clone()
        };
        if spy::is_enabled() {
            spy::report(SpyEvent::ScheduledReaction { name });
        }
        runtime::schedule_reaction(self.clone());
    }

    /// Runs the `on_invalidate` callback; called by the queue drain.
    pub(crate) fn run_pending(&self) {
        let callback = {
            let mut lock = self.inner.write().or_poisoned();
            lock.is_scheduled = false;
            if lock.is_disposed {
                None
            } else {
                lock.is_track_pending = true;
                Some((lock.on_invalidate.clone(), lock.name.clone()))
            }
        };
        let Some((callback, name)) = callback else {
            return;
        };
        if spy::is_enabled() {
            spy::report_start(SpyEvent::Reaction { name });
        }
        callback(self);
        self.inner.write().or_poisoned().is_track_pending = false;
        if spy::is_enabled() {
            spy::report_end();
        }
    }

    /// Runs `fun` as this reaction's tracked body, inside a batch.
    ///
    /// Every observable read by `fun` becomes a dependency; dependencies of
    /// the previous run that `fun` no longer reads are released. If the
    /// reaction was disposed while `fun` ran, the deferred cleanup happens
    /// now.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn track(&self, fun: impl FnOnce()) {
        let any_derivation = {
            let mut lock = self.inner.write().or_poisoned();
            if lock.is_disposed {
                return;
            }
            lock.is_running = true;
            lock.any_derivation.clone()
        };
        let _batch = runtime::batch();
        track_derived_function(&any_derivation, fun);
        let dispose_now = {
            let mut lock = self.inner.write().or_poisoned();
            lock.is_running = false;
            lock.is_track_pending = false;
            lock.is_disposed
        };
        if dispose_now {
            self.clear_observing();
        }
    }

    /// Detaches this reaction from the graph. Safe to call at any time,
    /// including from inside the reaction's own body, in which case the
    /// cleanup is deferred until the body returns. Idempotent.
    pub fn dispose(&self) {
        let clear_now = {
            let mut lock = self.inner.write().or_poisoned();
            if lock.is_disposed {
                false
            } else {
                lock.is_disposed = true;
                !lock.is_running
            }
        };
        if clear_now {
            let _batch = runtime::batch();
            self.clear_observing();
        }
    }

    pub(crate) fn clear_scheduled_flag(&self) {
        self.inner.write().or_poisoned().is_scheduled = false;
    }

    fn clear_observing(&self) {
        let (sources, this) = {
            let mut lock = self.inner.write().or_poisoned();
            (lock.deps.clear(), lock.any_derivation.clone())
        };
        for source in sources {
            source.remove_observer(&this);
        }
    }
}

impl DefinedAt for Reaction {
    fn defined_at(&self) -> Option<&'static Location<'static>> {
        #[cfg(debug_assertions)]
        {
            Some(self.inner.read().or_poisoned().defined_at)
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    }
}

impl IsDisposed for Reaction {
    fn is_disposed(&self) -> bool {
        self.inner.read().or_poisoned().is_disposed
    }
}

impl Dispose for Reaction {
    fn dispose(self) {
        Reaction::dispose(&self);
    }
}

impl ToAnyDerivation for Reaction {
    fn to_any_derivation(&self) -> AnyDerivation {
        self.inner.read().or_poisoned().any_derivation.clone()
    }
}

impl Derivation for RwLock<ReactionInner> {
    fn name(&self) -> Arc<str> {
        self.read().or_poisoned().name.clone()
    }

    fn on_dependency_stale(&self) {
        let mut lock = self.write().or_poisoned();
        if lock.is_disposed {
            return;
        }
        lock.deps.stale_count += 1;
    }

    fn on_dependency_ready(&self, changed: bool) {
        let fire = {
            let mut lock = self.write().or_poisoned();
            // A reaction that rebound away mid-wave may still sit in a ready
            // snapshot taken before it unsubscribed; nothing is owed then.
            if lock.is_disposed || lock.deps.stale_count == 0 {
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
            if lock.deps.stale_count == 0 && lock.deps.changed_count > 0 {
                lock.deps.changed_count = 0;
                true
            } else {
                false
            }
        };
        // reactions never propagate further; they only reschedule themselves
        if fire {
            if let Some(inner) = self.read().or_poisoned().this.upgrade() {
                Reaction::from_inner(inner).schedule();
            }
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
}

/// Creates a reaction that tracks `fun`, runs it once immediately, and runs
/// it again whenever a dependency of the previous run changes.
///
/// The returned [`Reaction`] handle keeps the effect alive; call
/// [`dispose`](Reaction::dispose) to stop it.
///
/// ```rust
/// use observable_graph::{prelude::*, reaction::autorun, ObservableValue};
/// use std::sync::{Arc, RwLock};
///
/// let a = ObservableValue::new(1);
/// let b = ObservableValue::new(2);
/// let log = Arc::new(RwLock::new(Vec::new()));
///
/// let _sum = autorun({
///     let (a, b, log) = (a.clone(), b.clone(), log.clone());
///     move || log.write().unwrap().push(a.get() + b.get())
/// });
/// assert_eq!(*log.read().unwrap(), vec![3]);
///
/// a.set(4);
/// assert_eq!(*log.read().unwrap(), vec![3, 7]);
///
/// // writing the value already held does not wake the reaction
/// a.set(4);
/// assert_eq!(*log.read().unwrap(), vec![3, 7]);
/// ```
#[track_caller]
pub fn autorun(fun: impl Fn() + Send + Sync + 'static) -> Reaction {
    autorun_named(runtime::generated_name("Autorun"), fun)
}

/// Like [`autorun`], with an explicit name for the spy channel and the
/// introspection trees.
#[track_caller]
pub fn autorun_named(
    name: impl Into<Arc<str>>,
    fun: impl Fn() + Send + Sync + 'static,
) -> Reaction {
    let reaction = Reaction::new(name, move |reaction| reaction.track(&fun));
    reaction.schedule();
    reaction
}
