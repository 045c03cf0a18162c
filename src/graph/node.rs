//! Shared dependency bookkeeping embedded in every derivation, and the
//! two-phase propagation helpers.
//!
//! A change wave has two phases. First the source broadcasts *stale* through
//! the graph: every derivation counts how many of its upstream dependencies
//! are currently unsettled. Then the source broadcasts *ready(changed)*: each
//! derivation decrements its counter and, once it reaches zero, knows that
//! every input has settled and whether any of them actually changed. Only
//! then does it revalidate, so no derivation ever reads a half-updated
//! graph and none revalidates more than once per wave.

use super::{AnyDerivation, AnyObservable, Derivation, Observable};

/// The dependency ledger every derivation carries.
#[derive(Debug, Default)]
pub(crate) struct DerivationState {
    /// Dependencies bound during the previous tracked run, deduplicated.
    pub observing: Vec<AnyObservable>,
    /// Dependencies captured mid-run; duplicates allowed until reconciled.
    pub new_observing: Vec<AnyObservable>,
    /// Set while a tracked run is accumulating into `new_observing`.
    pub is_collecting: bool,
    /// Monotonic stamp of the latest tracked run.
    pub run_id: u64,
    /// Number of upstream dependencies currently inside their stale interval.
    pub stale_count: i32,
    /// Number of upstream dependencies that produced a new value during the
    /// current stale interval.
    pub changed_count: i32,
}

impl DerivationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, run_id: u64) {
        self.new_observing.clear();
        self.is_collecting = true;
        self.run_id = run_id;
    }

    pub fn capture(&mut self, source: AnyObservable) {
        if self.is_collecting {
            self.new_observing.push(source);
        }
    }

    /// Reconciles the captured run against the previous one.
    ///
    /// Three passes over the diff flags, O(|old| + |new|):
    /// 1. walk the captured list; a source whose flag is 0 is a first
    ///    occurrence, flip it to 1 and keep it (later occurrences are
    ///    duplicates and dropped);
    /// 2. walk the previous list; a flag still at 0 means the source was not
    ///    re-captured, so it goes to `dropped`; survivors get reset to 0;
    /// 3. walk the deduplicated list; a flag still at 1 means the source was
    ///    not in the previous list, so it goes to `fresh` and is reset.
    ///
    /// Every flag ends at zero, so no cleanup pass is needed before the next
    /// run. Returns `(fresh, dropped)`.
    pub fn reconcile(&mut self) -> (Vec<AnyObservable>, Vec<AnyObservable>) {
        self.is_collecting = false;
        let mut captured = std::mem::take(&mut self.new_observing);

        let mut kept = 0;
        for i in 0..captured.len() {
            let source = captured[i].clone();
            if source.diff_flag() == 0 {
                source.set_diff_flag(1);
                if kept != i {
                    captured.swap(kept, i);
                }
                kept += 1;
            }
        }
        captured.truncate(kept);

        let mut dropped = Vec::new();
        for source in self.observing.drain(..) {
            if source.diff_flag() == 0 {
                dropped.push(source);
            } else {
                source.set_diff_flag(0);
            }
        }

        let mut fresh = Vec::new();
        for source in &captured {
            if source.diff_flag() == 1 {
                source.set_diff_flag(0);
                fresh.push(source.clone());
            }
        }

        self.observing = captured;
        (fresh, dropped)
    }

    /// Drops the whole ledger; used when a derivation is disposed or a
    /// computed value goes cold. Returns the previously bound sources so the
    /// caller can unsubscribe from them without holding its own lock.
    pub fn clear(&mut self) -> Vec<AnyObservable> {
        self.new_observing.clear();
        self.is_collecting = false;
        self.stale_count = 0;
        self.changed_count = 0;
        std::mem::take(&mut self.observing)
    }

    pub fn observing_snapshot(&self) -> Vec<AnyObservable> {
        self.observing.clone()
    }
}

/// First phase of a change wave: every observer is told that one of its
/// inputs has become unsettled.
pub(crate) fn propagate_stale_to(observers: Vec<AnyDerivation>) {
    for observer in observers {
        observer.on_dependency_stale();
    }
}

/// Second phase of a change wave: every observer is told that the input has
/// settled, and whether it produced a new value.
pub(crate) fn propagate_ready_to(observers: Vec<AnyDerivation>, changed: bool) {
    for observer in observers {
        observer.on_dependency_ready(changed);
    }
}

/// Runs the full wave for a leaf observable whose value just changed: stale
/// to every observer, then ready with the changed mark. Computed values
/// re-broadcast their own phases from inside `on_dependency_ready`, so the
/// wave reaches the whole affected subgraph before any reaction runs.
pub(crate) fn propagate_changed(source: &dyn Observable) {
    propagate_stale_to(source.observers());
    propagate_ready_to(source.observers(), true);
}
