//! The access traits shared by the reactive primitives.
//!
//! Each primitive implements one small base surface and inherits the rest.
//! On the read side, [`Read`] hands out lock guards and needs a single
//! method; [`With`] (closure access) and [`Get`] (clone-out access) are
//! derived from it by blanket impls, and every one of them comes in a
//! tracked and an untracked flavor. On the write side, [`Writeable`] yields
//! guards and [`Update`]/[`Set`] build closure- and value-level mutation on
//! top of it.
//!
//! The two sides fail differently, and the signatures say so. Nothing in
//! this crate is arena-allocated, so a read cannot outlive its node; the
//! only way a read fails is a poisoned lock, which the `try_` variants
//! report as `None` and the plain variants turn into a panic. A write can
//! be *rejected* — strict mode outside an action, or a mutation attempted
//! while a getter is tracking — so every write path returns a [`Result`]
//! carrying the reason.

use crate::{
    errors::Result,
    graph::{report_observed, ToAnyObservable},
    value::guards::{SilentWriteGuard, WriteGuard},
};
use std::{ops::Deref, panic::Location};

/// Reports a read of this node to the tracking derivation, if one is
/// active.
pub trait Track {
    /// Captures this node into the current observer's dependency list; a
    /// no-op outside a tracked run.
    fn track(&self);
}

impl<T: ToAnyObservable> Track for T {
    #[track_caller]
    fn track(&self) {
        report_observed(self.to_any_observable());
    }
}

/// Broadcasts a change wave from this node.
pub trait Trigger {
    /// Notifies every observer of this node that it has changed.
    fn trigger(&self);
}

/// Guarded access to the value this node carries.
///
/// Implementors provide [`try_read_untracked`](Self::try_read_untracked);
/// the tracked and panicking flavors follow from it.
pub trait Read: Track + DefinedAt {
    /// The guard handed to readers; keeps the node's lock held.
    type Guard: Deref;

    /// Borrows the value without capturing a dependency, or `None` if the
    /// backing lock is poisoned.
    fn try_read_untracked(&self) -> Option<Self::Guard>;

    /// Captures this node as a dependency, then borrows the value.
    #[track_caller]
    fn try_read(&self) -> Option<Self::Guard> {
        self.track();
        self.try_read_untracked()
    }

    /// Borrows the value with dependency capture; panics on a poisoned
    /// lock.
    #[track_caller]
    fn read(&self) -> Self::Guard {
        self.try_read()
            .unwrap_or_else(|| poisoned_lock(self.defined_at()))
    }

    /// Borrows the value without dependency capture; panics on a poisoned
    /// lock.
    #[track_caller]
    fn read_untracked(&self) -> Self::Guard {
        self.try_read_untracked()
            .unwrap_or_else(|| poisoned_lock(self.defined_at()))
    }
}

/// Applies a closure to the value this node carries.
pub trait With: DefinedAt {
    /// The value the closure sees.
    type Value: ?Sized;

    /// Captures this node as a dependency, then applies the closure, or
    /// `None` if the backing lock is poisoned.
    fn try_with<U>(&self, fun: impl FnOnce(&Self::Value) -> U) -> Option<U>;

    /// Applies the closure without capturing a dependency.
    fn try_with_untracked<U>(
        &self,
        fun: impl FnOnce(&Self::Value) -> U,
    ) -> Option<U>;

    /// Panicking flavor of [`try_with`](Self::try_with).
    #[track_caller]
    fn with<U>(&self, fun: impl FnOnce(&Self::Value) -> U) -> U {
        self.try_with(fun)
            .unwrap_or_else(|| poisoned_lock(self.defined_at()))
    }

    /// Panicking flavor of
    /// [`try_with_untracked`](Self::try_with_untracked).
    #[track_caller]
    fn with_untracked<U>(&self, fun: impl FnOnce(&Self::Value) -> U) -> U {
        self.try_with_untracked(fun)
            .unwrap_or_else(|| poisoned_lock(self.defined_at()))
    }
}

impl<T: Read> With for T {
    type Value = <T::Guard as Deref>::Target;

    fn try_with<U>(&self, fun: impl FnOnce(&Self::Value) -> U) -> Option<U> {
        self.try_read().map(|guard| fun(&*guard))
    }

    fn try_with_untracked<U>(
        &self,
        fun: impl FnOnce(&Self::Value) -> U,
    ) -> Option<U> {
        self.try_read_untracked().map(|guard| fun(&*guard))
    }
}

/// Clones the value this node carries.
pub trait Get: DefinedAt {
    /// The value returned.
    type Value: Clone;

    /// Captures this node as a dependency, then clones the value, or `None`
    /// if the backing lock is poisoned.
    fn try_get(&self) -> Option<Self::Value>;

    /// Clones the value without capturing a dependency.
    fn try_get_untracked(&self) -> Option<Self::Value>;

    /// Panicking flavor of [`try_get`](Self::try_get).
    #[track_caller]
    fn get(&self) -> Self::Value {
        self.try_get()
            .unwrap_or_else(|| poisoned_lock(self.defined_at()))
    }

    /// Panicking flavor of
    /// [`try_get_untracked`](Self::try_get_untracked).
    #[track_caller]
    fn get_untracked(&self) -> Self::Value {
        self.try_get_untracked()
            .unwrap_or_else(|| poisoned_lock(self.defined_at()))
    }
}

impl<T> Get for T
where
    T: With,
    T::Value: Clone,
{
    type Value = <T as With>::Value;

    fn try_get(&self) -> Option<Self::Value> {
        self.try_with(Self::Value::clone)
    }

    fn try_get_untracked(&self) -> Option<Self::Value> {
        self.try_with_untracked(Self::Value::clone)
    }
}

/// Mutable access to the value behind this node.
pub trait Writeable: Sized + DefinedAt + Trigger {
    /// The value being written.
    type Value: Sized + 'static;

    /// Returns a guard that broadcasts one change wave when dropped, or the
    /// reason the write is not allowed right now.
    fn try_write(
        &self,
    ) -> Result<WriteGuard<'_, Self, Self::Value>>;

    /// Returns a guard that notifies nobody, or the reason the write is not
    /// allowed right now.
    fn try_write_untracked(&self) -> Result<SilentWriteGuard<Self::Value>>;

    /// Panicking variant of [`try_write`](Self::try_write).
    #[track_caller]
    fn write(&self) -> WriteGuard<'_, Self, Self::Value> {
        self.try_write().unwrap_or_else(|err| panic!("{err}"))
    }

    /// Panicking variant of
    /// [`try_write_untracked`](Self::try_write_untracked).
    #[track_caller]
    fn write_untracked(&self) -> SilentWriteGuard<Self::Value> {
        self.try_write_untracked()
            .unwrap_or_else(|err| panic!("{err}"))
    }
}

/// Applies a closure to the current value to update it, without notifying
/// observers.
pub trait UpdateUntracked: DefinedAt {
    /// The value being updated.
    type Value;

    /// Applies the closure, or returns the reason the write is not allowed.
    fn try_update_untracked<U>(
        &self,
        fun: impl FnOnce(&mut Self::Value) -> U,
    ) -> Result<U>;

    /// Panicking variant of
    /// [`try_update_untracked`](Self::try_update_untracked).
    #[track_caller]
    fn update_untracked<U>(
        &self,
        fun: impl FnOnce(&mut Self::Value) -> U,
    ) -> U {
        self.try_update_untracked(fun)
            .unwrap_or_else(|err| panic!("{err}"))
    }
}

impl<T> UpdateUntracked for T
where
    T: Writeable,
{
    type Value = <Self as Writeable>::Value;

    fn try_update_untracked<U>(
        &self,
        fun: impl FnOnce(&mut Self::Value) -> U,
    ) -> Result<U> {
        let mut guard = self.try_write_untracked()?;
        Ok(fun(&mut guard))
    }
}

/// Applies a closure to the current value to update it, notifying
/// observers.
pub trait Update {
    /// The value being updated.
    type Value;

    /// Applies the closure and notifies observers. Panics if the write is
    /// not allowed.
    #[track_caller]
    fn update(&self, fun: impl FnOnce(&mut Self::Value)) {
        self.try_update(fun).unwrap_or_else(|err| panic!("{err}"));
    }

    /// Applies the closure; the returned `bool` decides whether observers
    /// are notified.
    #[track_caller]
    fn maybe_update(&self, fun: impl FnOnce(&mut Self::Value) -> bool) {
        self.try_maybe_update(|val| {
            let did_update = fun(val);
            (did_update, ())
        })
        .unwrap_or_else(|err| panic!("{err}"));
    }

    /// Applies the closure and notifies observers, or returns the reason
    /// the write is not allowed.
    fn try_update<U>(
        &self,
        fun: impl FnOnce(&mut Self::Value) -> U,
    ) -> Result<U> {
        self.try_maybe_update(|val| (true, fun(val)))
    }

    /// Applies the closure; the `bool` half of its return value decides
    /// whether observers are notified.
    fn try_maybe_update<U>(
        &self,
        fun: impl FnOnce(&mut Self::Value) -> (bool, U),
    ) -> Result<U>;
}

impl<T> Update for T
where
    T: UpdateUntracked + Trigger,
{
    type Value = <Self as UpdateUntracked>::Value;

    fn try_maybe_update<U>(
        &self,
        fun: impl FnOnce(&mut Self::Value) -> (bool, U),
    ) -> Result<U> {
        let (did_update, val) = self.try_update_untracked(fun)?;
        if did_update {
            self.trigger();
        }
        Ok(val)
    }
}

/// Replaces the current value.
pub trait Set {
    /// The value being replaced.
    type Value;

    /// Replaces the value and notifies observers. Panics if the write is
    /// not allowed.
    #[track_caller]
    fn set(&self, value: impl Into<Self::Value>);

    /// Replaces the value and notifies observers, or returns the reason the
    /// write is not allowed.
    fn try_set(&self, value: impl Into<Self::Value>) -> Result<()>;
}

/// Consumes this node and detaches it from the graph.
pub trait Dispose {
    /// Consumes this node and detaches it from the graph.
    fn dispose(self);
}

/// Whether this node has been detached from the graph.
pub trait IsDisposed {
    /// Whether this node has been detached from the graph.
    fn is_disposed(&self) -> bool;
}

/// The source location a node was created at, for debug panic messages.
pub trait DefinedAt {
    /// The creation site, if debug info is recorded.
    fn defined_at(&self) -> Option<&'static Location<'static>>;
}

#[doc(hidden)]
#[cold]
#[track_caller]
pub fn poisoned_lock(
    defined_at: Option<&'static Location<'static>>,
) -> ! {
    match defined_at {
        Some(defined_at) => panic!(
            "the lock backing the reactive value defined at {defined_at} is \
             poisoned"
        ),
        None => panic!("the lock backing a reactive value is poisoned"),
    }
}
