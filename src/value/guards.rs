//! Lock guards handed out by the read and write traits.
//!
//! A [`ReadGuard`] keeps the node's backing lock held for shared access and
//! can project to a field of the guarded state, which is how a computed
//! value lends out the cached slice of its inner state. Writes come in two
//! flavors: a [`WriteGuard`] broadcasts exactly one change wave when it
//! drops (after releasing the lock, so the wave can re-read the value), and
//! a [`SilentWriteGuard`] releases the lock and tells nobody.

use crate::traits::Trigger;
use core::fmt;
use guardian::{ArcRwLockReadGuardian, ArcRwLockWriteGuardian};
use std::{
    ops::{Deref, DerefMut},
    sync::{Arc, RwLock},
};

/// Shared access to a value while the node's lock is held.
///
/// `S` is the guarded state, `T` what the guard lends out; for plain values
/// the two coincide.
pub struct ReadGuard<S: 'static, T = S> {
    guard: ArcRwLockReadGuardian<S>,
    lend: fn(&S) -> &T,
}

impl<S: 'static> ReadGuard<S> {
    /// Locks `state` for shared access, lending out the whole of it.
    pub(crate) fn plain(state: Arc<RwLock<S>>) -> Option<Self> {
        Self::lent(state, |state| state)
    }
}

impl<S: 'static, T> ReadGuard<S, T> {
    /// Locks `state` for shared access, lending out the part `lend` picks.
    ///
    /// Returns `None` when the lock is poisoned.
    pub(crate) fn lent(
        state: Arc<RwLock<S>>,
        lend: fn(&S) -> &T,
    ) -> Option<Self> {
        ArcRwLockReadGuardian::take(state)
            .ok()
            .map(|guard| Self { guard, lend })
    }
}

impl<S, T> Deref for ReadGuard<S, T> {
    type Target = T;

    fn deref(&self) -> &T {
        (self.lend)(&self.guard)
    }
}

impl<S, T: fmt::Debug> fmt::Debug for ReadGuard<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<S, T: fmt::Display> fmt::Display for ReadGuard<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

impl<S, T: PartialEq> PartialEq<T> for ReadGuard<S, T> {
    fn eq(&self, other: &T) -> bool {
        **self == *other
    }
}

/// Exclusive access to a value; one change wave fires when the guard drops.
///
/// Every mutation made through the guard is folded into that single wave.
/// Call [`silence`](Self::silence) to keep the mutation and skip the wave.
pub struct WriteGuard<'a, S, T: 'static>
where
    S: Trigger,
{
    node: Option<&'a S>,
    guard: Option<SilentWriteGuard<T>>,
}

impl<'a, S, T: 'static> WriteGuard<'a, S, T>
where
    S: Trigger,
{
    pub(crate) fn new(node: &'a S, guard: SilentWriteGuard<T>) -> Self {
        Self {
            node: Some(node),
            guard: Some(guard),
        }
    }

    /// Keeps the write but skips the change wave on drop.
    pub fn silence(&mut self) {
        self.node = None;
    }
}

impl<S, T: 'static> Deref for WriteGuard<'_, S, T>
where
    S: Trigger,
{
    type Target = T;

    fn deref(&self) -> &T {
        self.guard
            .as_ref()
            .expect("lock released while the write guard was still live")
    }
}

impl<S, T: 'static> DerefMut for WriteGuard<'_, S, T>
where
    S: Trigger,
{
    fn deref_mut(&mut self) -> &mut T {
        self.guard
            .as_mut()
            .expect("lock released while the write guard was still live")
    }
}

impl<S, T: 'static> Drop for WriteGuard<'_, S, T>
where
    S: Trigger,
{
    fn drop(&mut self) {
        // unlock before broadcasting; the wave may read this value back
        drop(self.guard.take());
        if let Some(node) = self.node.take() {
            node.trigger();
        }
    }
}

/// Exclusive access to a value with no notification on drop.
///
/// The escape hatch for writes that must stay invisible to the graph;
/// observers keep whatever they last saw until a real change wave reaches
/// them.
pub struct SilentWriteGuard<T: 'static> {
    guard: ArcRwLockWriteGuardian<T>,
}

impl<T: 'static> SilentWriteGuard<T> {
    /// Locks `state` for exclusive access. Returns `None` when the lock is
    /// poisoned.
    pub(crate) fn try_new(state: Arc<RwLock<T>>) -> Option<Self> {
        ArcRwLockWriteGuardian::take(state)
            .ok()
            .map(|guard| Self { guard })
    }
}

impl<T> Deref for SilentWriteGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for SilentWriteGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
