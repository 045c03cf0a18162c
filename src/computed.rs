//! Lazy, memoized, cached derivations.
//!
//! A [`Computed`] owns a pure getter over other observables. While observed
//! it is *hot*: the cached value is kept up to date by the propagation wave
//! and reads are free. While unobserved it is *cold*: every read runs the
//! getter once, untracked, so an idle computed holds no edges into the graph
//! and costs nothing between reads.

mod inner;

pub use inner::ComputedInner;
use inner::{Getter, Setter};

use crate::{
    errors::{Error, Result},
    graph::{
        AnyDerivation, AnyObservable, Derivation, DerivationState, Observable,
        Observer, ObserverSet, ToAnyDerivation, ToAnyObservable,
    },
    runtime,
    traits::{DefinedAt, IsDisposed, Set, Track},
    value::guards::ReadGuard,
};
use core::fmt::Debug;
use or_poisoned::OrPoisoned;
use std::{
    panic::Location,
    sync::{Arc, RwLock, Weak},
};

/// A value derived from other observables by a pure getter.
///
/// ```rust
/// use observable_graph::{prelude::*, Computed, ObservableValue};
///
/// let count = ObservableValue::new(1);
/// let double_count = Computed::new({
///     let count = count.clone();
///     move |_| count.get() * 2
/// });
///
/// assert_eq!(double_count.get(), 2);
/// count.set(3);
/// assert_eq!(double_count.get(), 6);
/// ```
pub struct Computed<T> {
    #[cfg(debug_assertions)]
    defined_at: &'static Location<'static>,
    inner: Arc<RwLock<ComputedInner<T>>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            #[cfg(debug_assertions)]
            defined_at: self.defined_at,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("type", &std::any::type_name::<T>())
            .field("data", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

impl<T: Send + Sync + 'static> Computed<T> {
    /// Creates a computed value with a generated name, comparing
    /// recomputations with `PartialEq`. The getter receives the previously
    /// cached value, if any.
    #[track_caller]
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn new(fun: impl Fn(Option<&T>) -> T + Send + Sync + 'static) -> Self
    where
        T: PartialEq,
    {
        Self::new_with_compare(fun, |lhs, rhs| lhs == rhs)
    }

    /// Creates a named computed value.
    #[track_caller]
    pub fn named(
        name: impl Into<Arc<str>>,
        fun: impl Fn(Option<&T>) -> T + Send + Sync + 'static,
    ) -> Self
    where
        T: PartialEq,
    {
        Self::with_options(
            name.into(),
            Arc::new(move |prev| Ok(fun(prev))),
            |lhs, rhs| lhs == rhs,
            None,
        )
    }

    /// Creates a computed value with a custom equality predicate; a
    /// recomputation the predicate accepts as equal does not wake observers.
    #[track_caller]
    pub fn new_with_compare(
        fun: impl Fn(Option<&T>) -> T + Send + Sync + 'static,
        compare_with: fn(&T, &T) -> bool,
    ) -> Self {
        Self::with_options(
            runtime::generated_name("Computed"),
            Arc::new(move |prev| Ok(fun(prev))),
            compare_with,
            None,
        )
    }

    /// Creates a computed value whose getter may fail. A returned error is
    /// memoized and surfaces on every read until a dependency changes.
    #[track_caller]
    pub fn new_fallible<E>(
        fun: impl Fn(Option<&T>) -> Result<T, E> + Send + Sync + 'static,
    ) -> Self
    where
        T: PartialEq,
        E: std::error::Error + Send + Sync + 'static,
    {
        let name = runtime::generated_name("Computed");
        let getter = {
            let name = name.clone();
            Arc::new(move |prev: Option<&T>| {
                fun(prev).map_err(|error| Error::ComputedFailed {
                    name: name.clone(),
                    source: Arc::new(error),
                })
            })
        };
        Self::with_options(name, getter, |lhs, rhs| lhs == rhs, None)
    }

    /// Creates a computed value with an inverse function; [`Set::set`]
    /// routes through it, wrapped in an action.
    #[track_caller]
    pub fn new_with_setter(
        fun: impl Fn(Option<&T>) -> T + Send + Sync + 'static,
        setter: impl Fn(T) + Send + Sync + 'static,
    ) -> Self
    where
        T: PartialEq,
    {
        Self::with_options(
            runtime::generated_name("Computed"),
            Arc::new(move |prev| Ok(fun(prev))),
            |lhs, rhs| lhs == rhs,
            Some(Arc::new(setter)),
        )
    }

    #[track_caller]
    fn with_options(
        name: Arc<str>,
        getter: Getter<T>,
        compare_with: fn(&T, &T) -> bool,
        setter: Option<Setter<T>>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<RwLock<ComputedInner<T>>>| {
            let any_derivation = AnyDerivation(
                weak.as_ptr() as usize,
                Weak::clone(weak) as Weak<dyn Derivation + Send + Sync>,
            );
            let any_observable = AnyObservable(
                weak.as_ptr() as usize,
                Weak::clone(weak) as Weak<dyn Observable + Send + Sync>,
            );
            RwLock::new(ComputedInner {
                name,
                value: None,
                last_error: None,
                getter,
                setter,
                compare_with,
                is_computing: false,
                is_bound: false,
                deps: DerivationState::new(),
                observers: ObserverSet::new(),
                diff_flag: 0,
                any_derivation,
                any_observable,
            })
        });
        Self {
            #[cfg(debug_assertions)]
            defined_at: Location::caller(),
            inner,
        }
    }

    /// The debug name of this computed value.
    pub fn name(&self) -> Arc<str> {
        self.inner.read().or_poisoned().name.clone()
    }

    /// Whether at least one derivation currently observes this node, i.e.
    /// whether its cache is being kept hot.
    pub fn is_observed(&self) -> bool {
        !self.inner.read().or_poisoned().observers.is_empty()
    }

    /// Brings the cached value up to date for the current read regime.
    ///
    /// Three regimes:
    /// 1. read under a tracking derivation: report this node to the tracker
    ///    and recompute with dependency binding if the cache is unusable;
    /// 2. untracked read while observed: the wave keeps the cache fresh, so
    ///    this is (almost always) a no-op;
    /// 3. untracked read while unobserved: run the getter once, untracked
    ///    and unbound.
    fn refresh(&self) -> Result<()> {
        {
            let lock = self.inner.read().or_poisoned();
            if lock.is_computing {
                return Err(Error::CycleDetected {
                    name: lock.name.clone(),
                });
            }
        }
        let tracking = Observer::get().is_some();
        if tracking {
            self.track();
        }
        let hot = !self.inner.read().or_poisoned().observers.is_empty();
        if tracking || hot {
            let needs_compute = {
                let lock = self.inner.read().or_poisoned();
                !lock.is_bound
                    || (lock.value.is_none() && lock.last_error.is_none())
            };
            if needs_compute {
                inner::track_and_compute(&self.inner);
            }
            let lock = self.inner.read().or_poisoned();
            match &lock.last_error {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        } else {
            inner::peek(&self.inner)
        }
    }

    /// Applies a closure to the current value, or returns why it cannot be
    /// produced (a dependency cycle, or a memoized getter failure).
    pub fn try_with_value<U>(
        &self,
        fun: impl FnOnce(&T) -> U,
    ) -> Result<U> {
        self.refresh()?;
        let lock = self.inner.read().or_poisoned();
        match (&lock.last_error, &lock.value) {
            (Some(error), _) => Err(error.clone()),
            (None, Some(value)) => Ok(fun(value)),
            (None, None) => Err(Error::InvariantViolation(format!(
                "computed `{}` has no cached value after refresh",
                lock.name
            ))),
        }
    }

    /// Clones the current value, or returns why it cannot be produced.
    pub fn try_get_value(&self) -> Result<T>
    where
        T: Clone,
    {
        self.try_with_value(T::clone)
    }

    /// Applies a closure to the current value, panicking if it cannot be
    /// produced.
    #[track_caller]
    pub fn with<U>(&self, fun: impl FnOnce(&T) -> U) -> U {
        self.try_with_value(fun)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    /// Clones the current value, panicking if it cannot be produced.
    #[track_caller]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.try_get_value().unwrap_or_else(|err| panic!("{err}"))
    }

    /// Returns a read guard over the cached value.
    ///
    /// The guard holds the node's lock: dropping it before triggering any
    /// write is required, or the propagation wave will deadlock.
    pub fn try_read(&self) -> Result<ReadGuard<ComputedInner<T>, T>> {
        self.refresh()?;
        ReadGuard::lent(Arc::clone(&self.inner), |inner| {
            // refresh() only returns Ok when a value is cached
            inner.value.as_ref().unwrap()
        })
        .ok_or_else(|| {
            Error::InvariantViolation(format!(
                "lock of `{}` is poisoned",
                self.name()
            ))
        })
    }

    /// Panicking variant of [`try_read`](Self::try_read).
    #[track_caller]
    pub fn read(&self) -> ReadGuard<ComputedInner<T>, T> {
        self.try_read().unwrap_or_else(|err| panic!("{err}"))
    }
}

impl<T> DefinedAt for Computed<T> {
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

impl<T> IsDisposed for Computed<T> {
    #[inline(always)]
    fn is_disposed(&self) -> bool {
        false
    }
}

impl<T: Send + Sync + 'static> ToAnyObservable for Computed<T> {
    fn to_any_observable(&self) -> AnyObservable {
        AnyObservable(
            Arc::as_ptr(&self.inner) as usize,
            Arc::downgrade(&self.inner) as Weak<dyn Observable + Send + Sync>,
        )
    }
}

impl<T: Send + Sync + 'static> ToAnyDerivation for Computed<T> {
    fn to_any_derivation(&self) -> AnyDerivation {
        AnyDerivation(
            Arc::as_ptr(&self.inner) as usize,
            Arc::downgrade(&self.inner) as Weak<dyn Derivation + Send + Sync>,
        )
    }
}

impl<T: Send + Sync + 'static> Set for Computed<T> {
    type Value = T;

    #[track_caller]
    fn set(&self, value: impl Into<T>) {
        self.try_set(value).unwrap_or_else(|err| panic!("{err}"));
    }

    fn try_set(&self, value: impl Into<T>) -> Result<()> {
        let (setter, name) = {
            let lock = self.inner.read().or_poisoned();
            (lock.setter.clone(), lock.name.clone())
        };
        let Some(setter) = setter else {
            return Err(Error::InvariantViolation(format!(
                "computed `{name}` has no setter"
            )));
        };
        // the inverse function may only write to observable values, and only
        // inside an action
        runtime::run_in_action(name, || setter(value.into()));
        Ok(())
    }
}
