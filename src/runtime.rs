//! The per-thread runtime: transaction depth, the pending-reaction queue,
//! run-id allocation, and the strict-mode switches.
//!
//! All of it lives in a single thread-local structure with explicit
//! [`reset_global_state`] teardown. Every scoped region (batch, action,
//! allow-state-changes) is entered through an RAII guard, so the state is
//! restored on all exit paths, panics included.

use crate::{
    errors::{Error, Result},
    reaction::Reaction,
    spy::{self, SpyEvent},
};
use std::{cell::RefCell, mem, sync::Arc};

/// How many times the reaction drain may refill before it gives up and
/// reports [`Error::ReactionDivergence`].
pub const MAX_REACTION_ITERATIONS: usize = 100;

thread_local! {
    static RUNTIME: RefCell<RuntimeState> = RefCell::new(RuntimeState::new());
}

#[derive(Debug)]
struct RuntimeState {
    run_id: u64,
    next_node_id: u64,
    batch_depth: u32,
    action_depth: u32,
    pending_reactions: Vec<Reaction>,
    is_running_reactions: bool,
    allow_state_changes: bool,
    enforce_actions: bool,
}

impl RuntimeState {
    fn new() -> Self {
        Self {
            run_id: 0,
            next_node_id: 0,
            batch_depth: 0,
            action_depth: 0,
            pending_reactions: Vec::new(),
            is_running_reactions: false,
            allow_state_changes: true,
            enforce_actions: false,
        }
    }
}

pub(crate) fn next_run_id() -> u64 {
    RUNTIME.with_borrow_mut(|state| {
        state.run_id += 1;
        state.run_id
    })
}

pub(crate) fn next_node_id() -> u64 {
    RUNTIME.with_borrow_mut(|state| {
        state.next_node_id += 1;
        state.next_node_id
    })
}

/// Generates a `prefix@id` debug name for a node created without one.
pub(crate) fn generated_name(prefix: &str) -> Arc<str> {
    Arc::from(format!("{prefix}@{}", next_node_id()))
}

/// Whether a batch is currently open on this thread.
pub fn in_batch() -> bool {
    RUNTIME.with_borrow(|state| state.batch_depth > 0)
}

/// Turns strict mode on or off.
///
/// While strict mode is on, observed state may only be mutated inside an
/// action; plain writes fail with [`Error::StateMutationDisallowed`].
pub fn set_enforce_actions(enforce: bool) {
    RUNTIME.with_borrow_mut(|state| state.enforce_actions = enforce);
}

/// Restores the runtime to factory defaults: closes all batches, drops any
/// pending reactions, and clears the strict-mode switches.
///
/// Intended for tests and for recovery after a panic escaped a batch.
pub fn reset_global_state() {
    let pending = RUNTIME.with_borrow_mut(|state| {
        let pending = mem::take(&mut state.pending_reactions);
        *state = RuntimeState::new();
        pending
    });
    for reaction in pending {
        reaction.clear_scheduled_flag();
    }
}

pub(crate) fn check_state_mutation(name: &Arc<str>) -> Result<()> {
    RUNTIME.with_borrow(|state| {
        if !state.allow_state_changes {
            return Err(Error::StateMutationDisallowed { name: name.clone() });
        }
        if state.enforce_actions && state.action_depth == 0 {
            return Err(Error::StateMutationDisallowed { name: name.clone() });
        }
        Ok(())
    })
}

/// Holds a batch open; reactions scheduled inside are deferred until the
/// outermost guard drops.
#[derive(Debug)]
#[must_use = "dropping the guard immediately closes the batch"]
pub struct BatchGuard(());

impl Drop for BatchGuard {
    fn drop(&mut self) {
        end_batch();
    }
}

/// Opens a batch and returns the guard that closes it.
///
/// Prefer [`transaction`] when the batch can wrap a closure; the guard form
/// exists for control flow that cannot.
pub fn batch() -> BatchGuard {
    start_batch();
    BatchGuard(())
}

pub(crate) fn start_batch() {
    RUNTIME.with_borrow_mut(|state| state.batch_depth += 1);
}

pub(crate) fn end_batch() {
    let drained = RUNTIME.with_borrow_mut(|state| {
        debug_assert!(state.batch_depth > 0, "unbalanced end_batch");
        state.batch_depth = state.batch_depth.saturating_sub(1);
        state.batch_depth == 0
    });
    if drained {
        run_reactions();
    }
}

/// Runs `fun` inside a batch: every atom write inside still propagates
/// through the computed graph synchronously, but reaction side effects are
/// deferred until the outermost batch closes.
///
/// ```rust
/// use observable_graph::{
///     prelude::*, reaction::autorun, runtime::transaction, ObservableValue,
/// };
/// use std::sync::{Arc, RwLock};
///
/// let a = ObservableValue::new(1);
/// let b = ObservableValue::new(2);
/// let log = Arc::new(RwLock::new(Vec::new()));
/// let _sum = autorun({
///     let (a, b, log) = (a.clone(), b.clone(), log.clone());
///     move || log.write().unwrap().push(a.get() + b.get())
/// });
///
/// transaction(|| {
///     a.set(10);
///     b.set(20);
/// });
/// // one update for the whole batch, not one per write
/// assert_eq!(*log.read().unwrap(), vec![3, 30]);
/// ```
pub fn transaction<T>(fun: impl FnOnce() -> T) -> T {
    let _batch = batch();
    fun()
}

struct AllowStateChangesGuard(bool);

impl Drop for AllowStateChangesGuard {
    fn drop(&mut self) {
        RUNTIME.with_borrow_mut(|state| state.allow_state_changes = self.0);
    }
}

/// Runs `fun` with the mutation permission overridden to `allow`, restoring
/// the previous permission afterwards.
pub fn allow_state_changes<T>(allow: bool, fun: impl FnOnce() -> T) -> T {
    let _prev = AllowStateChangesGuard(RUNTIME.with_borrow_mut(|state| {
        mem::replace(&mut state.allow_state_changes, allow)
    }));
    fun()
}

struct ActionGuard;

impl Drop for ActionGuard {
    fn drop(&mut self) {
        RUNTIME.with_borrow_mut(|state| {
            state.action_depth = state.action_depth.saturating_sub(1);
        });
    }
}

/// Runs `fun` as a named action: a batch that also grants the mutation
/// permission and suspends dependency tracking, reported on the spy channel.
pub fn run_in_action<T>(
    name: impl Into<Arc<str>>,
    fun: impl FnOnce() -> T,
) -> T {
    let name = name.into();
    if spy::is_enabled() {
        spy::report_start(SpyEvent::Action { name });
    }
    let value = {
        let _batch = batch();
        RUNTIME.with_borrow_mut(|state| state.action_depth += 1);
        let _action = ActionGuard;
        let _allow = AllowStateChangesGuard(RUNTIME.with_borrow_mut(
            |state| mem::replace(&mut state.allow_state_changes, true),
        ));
        crate::graph::untracked(fun)
        // guards drop here, innermost first; closing the batch drains the
        // reactions outside the action's mutation permission
    };
    if spy::is_enabled() {
        spy::report_end();
    }
    value
}

/// Runs `fun` as an anonymous action.
pub fn action<T>(fun: impl FnOnce() -> T) -> T {
    run_in_action(generated_name("action"), fun)
}

struct RunnerGuard;

impl Drop for RunnerGuard {
    fn drop(&mut self) {
        RUNTIME.with_borrow_mut(|state| state.is_running_reactions = false);
    }
}

pub(crate) fn schedule_reaction(reaction: Reaction) {
    RUNTIME.with_borrow_mut(|state| state.pending_reactions.push(reaction));
    run_reactions();
}

/// Drains the pending-reaction queue.
///
/// A no-op while a batch is open or a drain is already running. Reactions
/// run in FIFO order of their scheduling; reactions scheduled by reactions
/// join the same drain. If the queue refills more than
/// [`MAX_REACTION_ITERATIONS`] times, the drain panics with
/// [`Error::ReactionDivergence`] naming the first offender.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "trace", skip_all)
)]
pub fn run_reactions() {
    let proceed = RUNTIME.with_borrow_mut(|state| {
        if state.batch_depth > 0
            || state.is_running_reactions
            || state.pending_reactions.is_empty()
        {
            false
        } else {
            state.is_running_reactions = true;
            true
        }
    });
    if !proceed {
        return;
    }
    let _runner = RunnerGuard;
    let mut iterations = 0usize;
    loop {
        let pending = RUNTIME
            .with_borrow_mut(|state| mem::take(&mut state.pending_reactions));
        if pending.is_empty() {
            break;
        }
        iterations += 1;
        if iterations > MAX_REACTION_ITERATIONS {
            let error = Error::ReactionDivergence {
                name: pending[0].name(),
                iterations: MAX_REACTION_ITERATIONS,
            };
            if spy::is_enabled() {
                spy::report(SpyEvent::Error {
                    message: error.to_string(),
                });
            }
            crate::log_warning(format_args!("{error}"));
            for reaction in &pending {
                reaction.clear_scheduled_flag();
            }
            panic!("{error}");
        }
        for reaction in pending {
            reaction.run_pending();
        }
    }
}
