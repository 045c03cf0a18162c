//! An observable value: an [`Atom`] paired with the state it guards.
//!
//! Reads go through the usual access traits ([`Get`](crate::traits::Get),
//! [`With`](crate::traits::With), [`Read`](crate::traits::Read)); writes are
//! filtered through an equality predicate so that assigning the value it
//! already holds does not wake any observers, and optionally through an
//! *enhancer* that may wrap freshly assigned values.

pub mod guards;

use crate::{
    atom::Atom,
    errors::{Error, Result},
    graph::{AnyObservable, ToAnyObservable},
    runtime,
    spy::{self, SpyEvent},
    traits::{DefinedAt, IsDisposed, Read, Set, Trigger, Writeable},
};
use core::fmt::{Debug, Formatter};
use guards::{ReadGuard, SilentWriteGuard, WriteGuard};
use or_poisoned::OrPoisoned;
use std::{
    hash::Hash,
    panic::Location,
    sync::{Arc, RwLock},
};

type Enhancer<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

/// A mutable reactive value.
///
/// ```rust
/// use observable_graph::{prelude::*, ObservableValue};
///
/// let count = ObservableValue::new(1);
/// assert_eq!(count.get(), 1);
/// count.set(2);
/// assert_eq!(count.get(), 2);
/// ```
pub struct ObservableValue<T> {
    #[cfg(debug_assertions)]
    defined_at: &'static Location<'static>,
    value: Arc<RwLock<T>>,
    atom: Atom,
    equals: fn(&T, &T) -> bool,
    enhancer: Option<Enhancer<T>>,
}

impl<T> Clone for ObservableValue<T> {
    fn clone(&self) -> Self {
        Self {
            #[cfg(debug_assertions)]
            defined_at: self.defined_at,
            value: Arc::clone(&self.value),
            atom: self.atom.clone(),
            equals: self.equals,
            enhancer: self.enhancer.clone(),
        }
    }
}

impl<T> Debug for ObservableValue<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ObservableValue")
            .field("type", &std::any::type_name::<T>())
            .field("name", &self.atom.name())
            .field("data", &Arc::as_ptr(&self.value))
            .finish()
    }
}

impl<T> PartialEq for ObservableValue<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl<T> Eq for ObservableValue<T> {}

impl<T> Hash for ObservableValue<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::ptr::hash(&Arc::as_ptr(&self.value), state);
    }
}

impl<T> Default for ObservableValue<T>
where
    T: Default + PartialEq,
{
    #[track_caller]
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: PartialEq> ObservableValue<T> {
    /// Creates an observable value with a generated name, comparing writes
    /// with `PartialEq`.
    #[track_caller]
    pub fn new(value: T) -> Self {
        Self::named(runtime::generated_name("ObservableValue"), value)
    }

    /// Creates a named observable value, comparing writes with `PartialEq`.
    #[track_caller]
    pub fn named(name: impl Into<Arc<str>>, value: T) -> Self {
        Self::with_options(name, value, |lhs, rhs| lhs == rhs, None)
    }

    /// Creates an observable value whose freshly assigned values are first
    /// passed through `enhancer` (used by collection layers to make nested
    /// structures observable). The initial value is enhanced as well.
    #[track_caller]
    pub fn new_with_enhancer(
        value: T,
        enhancer: impl Fn(T) -> T + Send + Sync + 'static,
    ) -> Self {
        Self::with_options(
            runtime::generated_name("ObservableValue"),
            value,
            |lhs, rhs| lhs == rhs,
            Some(Arc::new(enhancer)),
        )
    }
}

impl<T> ObservableValue<T> {
    /// Creates an observable value with a custom equality predicate; writes
    /// the predicate accepts as equal do not wake observers.
    #[track_caller]
    pub fn new_with_compare(value: T, equals: fn(&T, &T) -> bool) -> Self {
        Self::with_options(
            runtime::generated_name("ObservableValue"),
            value,
            equals,
            None,
        )
    }

    /// Creates an observable value from all its parts.
    #[track_caller]
    pub fn with_options(
        name: impl Into<Arc<str>>,
        value: T,
        equals: fn(&T, &T) -> bool,
        enhancer: Option<Enhancer<T>>,
    ) -> Self {
        let value = match &enhancer {
            Some(enhance) => enhance(value),
            None => value,
        };
        Self {
            #[cfg(debug_assertions)]
            defined_at: Location::caller(),
            value: Arc::new(RwLock::new(value)),
            atom: Atom::new(name),
            equals,
            enhancer,
        }
    }

    /// The debug name of this value.
    pub fn name(&self) -> Arc<str> {
        self.atom.name()
    }

    /// The atom that carries this value's observers.
    pub fn atom(&self) -> &Atom {
        &self.atom
    }

    /// Runs the incoming value through the enhancer and the equality
    /// predicate. Returns `None` when the write is a no-op, or the value to
    /// commit through [`set_new_value`](Self::set_new_value).
    pub fn prepare_new_value(&self, value: T) -> Option<T> {
        let value = match &self.enhancer {
            Some(enhance) => enhance(value),
            None => value,
        };
        let unchanged = {
            let lock = self.value.read().or_poisoned();
            (self.equals)(&lock, &value)
        };
        if unchanged {
            None
        } else {
            Some(value)
        }
    }

    /// Commits a prepared value unconditionally and broadcasts the change.
    pub fn try_set_new_value(&self, value: T) -> Result<()> {
        runtime::check_state_mutation(&self.atom.name())?;
        {
            let mut lock = self.value.write().or_poisoned();
            *lock = value;
        }
        if spy::is_enabled() {
            spy::report(SpyEvent::Update {
                name: self.atom.name(),
            });
        }
        self.atom.try_report_changed()
    }

    /// Panicking variant of [`try_set_new_value`](Self::try_set_new_value).
    #[track_caller]
    pub fn set_new_value(&self, value: T) {
        self.try_set_new_value(value)
            .unwrap_or_else(|err| panic!("{err}"));
    }
}

impl<T> DefinedAt for ObservableValue<T> {
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

impl<T> IsDisposed for ObservableValue<T> {
    #[inline(always)]
    fn is_disposed(&self) -> bool {
        false
    }
}

impl<T> ToAnyObservable for ObservableValue<T> {
    fn to_any_observable(&self) -> AnyObservable {
        self.atom.to_any_observable()
    }
}

impl<T: 'static> Read for ObservableValue<T> {
    type Guard = ReadGuard<T>;

    fn try_read_untracked(&self) -> Option<Self::Guard> {
        ReadGuard::plain(Arc::clone(&self.value))
    }
}

impl<T> Trigger for ObservableValue<T> {
    #[track_caller]
    fn trigger(&self) {
        self.atom.report_changed();
    }
}

impl<T: 'static> Writeable for ObservableValue<T> {
    type Value = T;

    fn try_write(&self) -> Result<WriteGuard<'_, Self, T>> {
        let guard = self.try_write_untracked()?;
        Ok(WriteGuard::new(self, guard))
    }

    fn try_write_untracked(&self) -> Result<SilentWriteGuard<T>> {
        runtime::check_state_mutation(&self.atom.name())?;
        SilentWriteGuard::try_new(Arc::clone(&self.value)).ok_or_else(|| {
            Error::InvariantViolation(format!(
                "lock of `{}` is poisoned",
                self.atom.name()
            ))
        })
    }
}

impl<T: 'static> Set for ObservableValue<T> {
    type Value = T;

    #[track_caller]
    fn set(&self, value: impl Into<T>) {
        self.try_set(value).unwrap_or_else(|err| panic!("{err}"));
    }

    fn try_set(&self, value: impl Into<T>) -> Result<()> {
        runtime::check_state_mutation(&self.atom.name())?;
        if let Some(value) = self.prepare_new_value(value.into()) {
            self.try_set_new_value(value)?;
        }
        Ok(())
    }
}
